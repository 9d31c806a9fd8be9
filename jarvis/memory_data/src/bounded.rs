use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Records that carry a creation instant.
pub trait Timestamped {
    /// When the record was created.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Rolling buffer that evicts oldest-first once a cap is exceeded.
///
/// The cap is passed per insert so a configuration swap applies on the next
/// write. Every operation holds the single lock for its whole
/// read-modify-write sequence.
#[derive(Debug)]
pub struct BoundedLog<T> {
    entries: RwLock<VecDeque<T>>,
}

impl<T> Default for BoundedLog<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
        }
    }
}

impl<T: Clone> BoundedLog<T> {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry` and evicts from the front until at most `cap` remain.
    /// Returns the number of evicted entries.
    pub fn push(&self, entry: T, cap: usize) -> usize {
        let cap = cap.max(1);
        let mut entries = self.entries.write();
        entries.push_back(entry);
        let mut evicted = 0;
        while entries.len() > cap {
            entries.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Oldest-first copy of every entry.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.read().iter().cloned().collect()
    }

    /// Oldest-first copy of the entries matching `predicate`.
    pub fn filter<F>(&self, mut predicate: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        self.entries
            .read()
            .iter()
            .filter(|entry| predicate(*entry))
            .cloned()
            .collect()
    }

    /// Newest entry matching `predicate`.
    pub fn find_newest<F>(&self, mut predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        self.entries
            .read()
            .iter()
            .rev()
            .find(|entry| predicate(*entry))
            .cloned()
    }

    /// Keeps only entries matching `keep`; returns the number removed.
    pub fn retain<F>(&self, keep: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(keep);
        before - entries.len()
    }

    /// Removes everything.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl<T: Clone + Timestamped> BoundedLog<T> {
    /// Entries created at or after `since`.
    #[must_use]
    pub fn since(&self, since: DateTime<Utc>) -> Vec<T> {
        self.filter(|entry| entry.timestamp() >= since)
    }

    /// Removes entries created before `cutoff`; returns the number removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        self.retain(|entry| entry.timestamp() >= cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Stamp(u32, DateTime<Utc>);

    impl Timestamped for Stamp {
        fn timestamp(&self) -> DateTime<Utc> {
            self.1
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let log = BoundedLog::new();
        let now = Utc::now();
        for idx in 0..3 {
            log.push(Stamp(idx, now), 2);
        }
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].0, 1);
        assert_eq!(snapshot[1].0, 2);
    }

    #[test]
    fn shrinking_cap_evicts_backlog_on_next_push() {
        let log = BoundedLog::new();
        let now = Utc::now();
        for idx in 0..10 {
            log.push(Stamp(idx, now), 10);
        }
        assert_eq!(log.push(Stamp(10, now), 4), 7);
        assert_eq!(log.snapshot().first().map(|s| s.0), Some(7));
    }

    #[test]
    fn prunes_by_age() {
        let log = BoundedLog::new();
        let now = Utc::now();
        log.push(Stamp(0, now - Duration::hours(5)), 10);
        log.push(Stamp(1, now - Duration::hours(1)), 10);
        log.push(Stamp(2, now), 10);
        assert_eq!(log.since(now - Duration::hours(1)).len(), 2);
        assert_eq!(log.prune_before(now - Duration::hours(2)), 1);
        assert_eq!(log.find_newest(|_| true).map(|s| s.0), Some(2));
        assert_eq!(log.len(), 2);
    }

    proptest! {
        #[test]
        fn never_exceeds_cap(cap in 1usize..20, inserts in 0usize..100) {
            let log = BoundedLog::new();
            let now = Utc::now();
            for idx in 0..inserts {
                log.push(Stamp(u32::try_from(idx).unwrap(), now), cap);
                prop_assert!(log.len() <= cap);
            }
            let snapshot = log.snapshot();
            if inserts > 0 {
                let newest = u32::try_from(inserts - 1).unwrap();
                prop_assert_eq!(snapshot.last().map(|s| s.0), Some(newest));
                let oldest_kept = u32::try_from(inserts.saturating_sub(cap)).unwrap();
                prop_assert_eq!(snapshot.first().map(|s| s.0), Some(oldest_kept));
            }
        }
    }
}
