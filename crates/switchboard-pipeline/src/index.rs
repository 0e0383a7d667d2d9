//! Advisory in-memory index of ready job ids.
//!
//! The index keeps `(process_after, job_id)` pairs in a `BTreeSet` so the
//! queue can tell cheaply whether anything is due without touching the
//! store. It is a hint only: entries are added on enqueue/release and
//! consumed on lease, and a missing or stale entry is always corrected by
//! the store's conditional dequeue. The queue works identically with the
//! index absent.

use parking_lot::Mutex;
use std::collections::BTreeSet;

/// Ordered set of `(process_after, job_id)` hints.
#[derive(Default)]
pub struct ReadyIndex {
    entries: Mutex<BTreeSet<(i64, i64)>>,
}

impl ReadyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a job becoming pending.
    pub fn insert(&self, process_after: i64, job_id: i64) {
        self.entries.lock().insert((process_after, job_id));
    }

    /// Whether any hinted job is due at `now`.
    pub fn has_ready(&self, now: i64) -> bool {
        self.entries
            .lock()
            .first()
            .is_some_and(|(after, _)| *after <= now)
    }

    /// Pop up to `limit` due job ids, in `(process_after, id)` order.
    ///
    /// Popped hints are gone even if the store declines the lease; that
    /// only costs a future store probe, never correctness.
    pub fn take_ready(&self, now: i64, limit: usize) -> Vec<i64> {
        let mut entries = self.entries.lock();
        let mut taken = Vec::new();
        while taken.len() < limit {
            match entries.first().copied() {
                Some((after, id)) if after <= now => {
                    entries.remove(&(after, id));
                    taken.push(id);
                }
                _ => break,
            }
        }
        taken
    }

    /// Number of hinted jobs (due or not).
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_take_in_order() {
        let index = ReadyIndex::new();
        index.insert(300, 3);
        index.insert(100, 1);
        index.insert(200, 2);

        assert!(index.has_ready(150));
        assert_eq!(index.take_ready(250, 10), vec![1, 2]);
        assert_eq!(index.len(), 1);
        assert!(!index.has_ready(250));
    }

    #[test]
    fn test_take_respects_limit() {
        let index = ReadyIndex::new();
        for id in 1..=5 {
            index.insert(0, id);
        }
        assert_eq!(index.take_ready(10, 2), vec![1, 2]);
        assert_eq!(index.take_ready(10, 10), vec![3, 4, 5]);
        assert!(index.is_empty());
    }

    #[test]
    fn test_future_jobs_not_ready() {
        let index = ReadyIndex::new();
        index.insert(1000, 1);
        assert!(!index.has_ready(999));
        assert!(index.take_ready(999, 10).is_empty());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_ties_ordered_by_job_id() {
        let index = ReadyIndex::new();
        index.insert(100, 9);
        index.insert(100, 3);
        assert_eq!(index.take_ready(100, 10), vec![3, 9]);
    }
}
