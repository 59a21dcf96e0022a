use std::fmt;

/// Identifies a snapshot of a partition's state at a particular point in its
/// replicated log.
///
/// The four fields are also the total order over snapshots: `index` is the
/// primary key, ties broken by `term`, then `processed_position`, then
/// `exported_position`. This is exactly the order `#[derive(Ord)]` produces
/// for a struct whose fields are declared in that order, so comparisons and
/// sorting need no hand-written `Ord` impl.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId {
    pub index: u64,
    pub term: u64,
    pub processed_position: u64,
    pub exported_position: u64,
}

impl SnapshotId {
    pub fn new(index: u64, term: u64, processed_position: u64, exported_position: u64) -> Self {
        Self {
            index,
            term,
            processed_position,
            exported_position,
        }
    }

    /// Parse a canonical `"<index>-<term>-<processed>-<exported>"` filename.
    ///
    /// Rejects anything that doesn't split into exactly four components,
    /// each consisting solely of ASCII digits (no sign, no whitespace, no
    /// leading `+`).
    pub fn parse(name: &str) -> Option<Self> {
        let mut parts = name.split('-');
        let index = parse_component(parts.next()?)?;
        let term = parse_component(parts.next()?)?;
        let processed_position = parse_component(parts.next()?)?;
        let exported_position = parse_component(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(index, term, processed_position, exported_position))
    }

    /// Render the canonical filename for this id.
    pub fn format(&self) -> String {
        format!("{}-{}-{}-{}", self.index, self.term, self.processed_position, self.exported_position)
    }
}

fn parse_component(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let ids = [
            SnapshotId::new(0, 0, 0, 0),
            SnapshotId::new(1, 2, 3, 4),
            SnapshotId::new(u64::MAX, 0, 1, 2),
        ];
        for id in ids {
            assert_eq!(SnapshotId::parse(&id.format()), Some(id));
        }
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in [
            "",
            "1-2-3",
            "1-2-3-4-5",
            "1-2-3-",
            "-1-2-3",
            "1-2-3-a",
            "1-2-3-+4",
            "1-2-3- 4",
            "1 -2-3-4",
            "1--2-3-4",
        ] {
            assert_eq!(SnapshotId::parse(bad), None, "expected {bad:?} to be rejected");
        }
    }

    #[test]
    fn accepts_leading_zeros() {
        assert_eq!(SnapshotId::parse("007-0-0-0"), Some(SnapshotId::new(7, 0, 0, 0)));
    }

    #[test]
    fn orders_lexicographically_on_the_four_tuple() {
        let a = SnapshotId::new(1, 9, 9, 9);
        let b = SnapshotId::new(2, 0, 0, 0);
        assert!(a < b, "index is the primary ordering key");

        let c = SnapshotId::new(1, 1, 9, 9);
        let d = SnapshotId::new(1, 2, 0, 0);
        assert!(c < d, "term breaks ties in index");

        let e = SnapshotId::new(1, 1, 1, 9);
        let f = SnapshotId::new(1, 1, 2, 0);
        assert!(e < f, "processed_position breaks ties in index and term");

        let g = SnapshotId::new(1, 1, 1, 1);
        let h = SnapshotId::new(1, 1, 1, 2);
        assert!(g < h, "exported_position is the final tiebreaker");
    }

    #[test]
    fn format_rejects_nothing_it_produces() {
        let id = SnapshotId::new(1, 2, 3, 4);
        assert_eq!(id.format(), "1-2-3-4");
        assert_eq!(SnapshotId::parse(&id.format()), Some(id));
    }
}
