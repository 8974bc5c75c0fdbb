//! Lightweight identifier for the workers of a run.
//!
//! Every partition is assigned a sequential, 1-based `WorkerId`. The id is the
//! partition key for everything a worker persists: its interim success file,
//! its interim error file and its free-text log all carry the id in their name,
//! so no two workers ever write to the same file.
//!
//! Id `0` is reserved for the orchestrator itself and is only used for the run
//! log (`logs/0-log.txt`).

use std::fmt;

/// Unique numeric identifier for one worker (one partition) of a run.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct WorkerId(usize);

impl WorkerId {
    /// The orchestrator's own id; never assigned to a partition.
    pub const RUN: WorkerId = WorkerId(0);

    /// The first id handed to a partition.
    pub const FIRST: WorkerId = WorkerId(1);

    /// Create a `WorkerId` from its numeric value.
    pub fn new(v: usize) -> Self {
        Self(v)
    }

    /// Return the underlying numeric value.
    pub fn raw(&self) -> usize {
        self.0
    }

    /// The id that follows this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Iterate the partition ids `1..=count` in ascending order.
    pub fn range(count: usize) -> impl Iterator<Item = WorkerId> {
        (1..=count).map(WorkerId)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for WorkerId {
    fn from(v: usize) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_one_based_and_ascending() {
        let ids: Vec<usize> = WorkerId::range(3).map(|w| w.raw()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(WorkerId::range(0).count(), 0);
    }

    #[test]
    fn next_and_display() {
        let id = WorkerId::FIRST.next();
        assert_eq!(id.raw(), 2);
        assert_eq!(id.to_string(), "2");
        assert!(WorkerId::RUN < WorkerId::FIRST);
    }
}
