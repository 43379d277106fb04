//! Durable, append-only log of combined snapshots.
//!
//! The default implementation ([`engine::CsvPersistence`]) writes one CSV file
//! per UTC calendar day (`<YYYY-MM-DD>.csv`). Each file's header is fixed by
//! the first snapshot written to it that day.

pub mod engine;
pub mod error;
pub mod partition;
pub mod record;


pub use engine::CsvPersistence;
pub use error::{Result, StorageError};

use sysfuse_common::types::CombinedSnapshot;

/// Persistence backend for combined snapshots.
///
/// Implementations must be safe to share across threads (`Send + Sync`): the
/// scheduler writes from a blocking worker thread while the retention task
/// may run concurrently.
pub trait SnapshotStore: Send + Sync {
    /// Appends one row for `snapshot` and syncs it to disk before returning.
    fn write(&self, snapshot: &CombinedSnapshot) -> Result<()>;

    /// Removes partitions older than `retention_days`. Returns the number of
    /// partitions removed.
    fn cleanup(&self, retention_days: u32) -> Result<u32>;

    /// Returns information about every partition on disk, oldest first.
    fn list_partitions(&self) -> Result<Vec<PartitionInfo>>;
}

/// Information about a storage partition (one day's CSV file).
#[derive(Debug, Clone, serde::Serialize)]
pub struct PartitionInfo {
    pub date: String,
    pub size_bytes: u64,
    pub path: String,
}
