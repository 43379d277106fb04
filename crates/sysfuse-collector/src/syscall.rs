use std::sync::{Mutex, MutexGuard};
use sysfuse_common::types::SyscallCounts;

/// Concurrency-safe syscall counter store.
///
/// Ingestion may happen from any number of tasks at once while a single
/// scheduler task periodically takes the accumulated counts. Every operation
/// goes through the same lock, and [`snapshot_and_reset`](Self::snapshot_and_reset)
/// swaps the whole map out in one critical section, so an increment lands
/// either in the returned window or in the next one, never both and never
/// neither.
#[derive(Debug, Default)]
pub struct SyscallAggregator {
    counts: Mutex<SyscallCounts>,
}

impl SyscallAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the counter map, recovering from a poisoned Mutex if necessary.
    fn lock_counts(&self) -> MutexGuard<'_, SyscallCounts> {
        self.counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records one occurrence of `name`. Empty names are ignored.
    pub fn ingest(&self, name: &str) {
        if name.is_empty() {
            return;
        }
        let mut counts = self.lock_counts();
        match counts.get_mut(name) {
            Some(count) => *count += 1,
            None => {
                counts.insert(name.to_string(), 1);
            }
        }
    }

    /// Returns the counts accumulated since the previous call and leaves the
    /// live store empty.
    pub fn snapshot_and_reset(&self) -> SyscallCounts {
        std::mem::take(&mut *self.lock_counts())
    }

    /// Total increments pending in the current window.
    pub fn pending(&self) -> u64 {
        self.lock_counts().values().sum()
    }
}
