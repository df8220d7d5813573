//! Traversal bookkeeping: the visited set and the level-by-level frontier

use std::collections::HashSet;
use tracing::trace;

use netcrawl_core::{DeviceAddress, FrontierEntry};

/// Addresses already attempted, successfully or not
#[derive(Debug, Default)]
pub struct VisitedSet {
    seen: HashSet<DeviceAddress>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test-and-mark: returns `true` only the first time `address` is marked
    pub fn mark(&mut self, address: DeviceAddress) -> bool {
        self.seen.insert(address)
    }

    pub fn contains(&self, address: &DeviceAddress) -> bool {
        self.seen.contains(address)
    }
}

/// Pending visits, one depth level at a time
///
/// Every address is accepted at most once over the whole traversal, so a
/// device that several neighbors report is queued only by the first.
#[derive(Debug)]
pub struct Frontier {
    next: Vec<FrontierEntry>,
    queued: HashSet<DeviceAddress>,
}

impl Frontier {
    /// Frontier holding only the seed
    pub fn new(seed: FrontierEntry) -> Self {
        let mut queued = HashSet::new();
        queued.insert(seed.address);
        Self {
            next: vec![seed],
            queued,
        }
    }

    /// Queue an entry for the next level; `false` if the address was ever queued
    pub fn push(&mut self, entry: FrontierEntry) -> bool {
        if !self.queued.insert(entry.address) {
            trace!(ip = %entry.address, "Already queued, skipping");
            return false;
        }
        debug_assert!(self.next.iter().all(|e| e.depth == entry.depth));
        self.next.push(entry);
        true
    }

    pub fn is_queued(&self, address: &DeviceAddress) -> bool {
        self.queued.contains(address)
    }

    /// Take the whole next level in FIFO order, `None` once nothing is pending
    pub fn next_level(&mut self) -> Option<Vec<FrontierEntry>> {
        if self.next.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.next))
        }
    }

    /// Entries waiting for the next level
    pub fn pending(&self) -> usize {
        self.next.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netcrawl_core::NeighborRecord;

    fn addr(s: &str) -> DeviceAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_visited_mark_once() {
        let mut visited = VisitedSet::new();
        assert!(visited.mark(addr("10.0.0.1")));
        assert!(!visited.mark(addr("10.0.0.1")));
        assert!(visited.contains(&addr("10.0.0.1")));
        assert!(!visited.contains(&addr("10.0.0.2")));
    }

    #[test]
    fn test_levels_are_fifo_and_unique() {
        let seed = FrontierEntry::seed(addr("10.0.0.1"));
        let mut frontier = Frontier::new(seed.clone());

        let level0 = frontier.next_level().unwrap();
        assert_eq!(level0, vec![seed.clone()]);
        assert!(frontier.next_level().is_none());

        let b = FrontierEntry::from_neighbor(&seed, &NeighborRecord::new(addr("10.0.0.3")));
        let c = FrontierEntry::from_neighbor(&seed, &NeighborRecord::new(addr("10.0.0.2")));
        assert!(frontier.push(b.clone()));
        assert!(frontier.push(c.clone()));
        assert!(!frontier.push(b.clone()));
        // The seed reported back by a neighbor
        assert!(!frontier.push(FrontierEntry::from_neighbor(
            &b,
            &NeighborRecord::new(addr("10.0.0.1"))
        )));
        assert_eq!(frontier.pending(), 2);

        let level1 = frontier.next_level().unwrap();
        assert_eq!(level1, vec![b, c]);
        assert!(level1.iter().all(|e| e.depth == 1));
        assert!(frontier.is_queued(&addr("10.0.0.2")));
    }
}
