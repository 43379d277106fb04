use crate::error::{Result, StorageError};
use crate::partition::{self, DayPartition, TIMESTAMP_COLUMN};
use crate::{PartitionInfo, SnapshotStore};
use chrono::{SecondsFormat, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use sysfuse_common::types::CombinedSnapshot;

const SYSCALL_PREFIX: &str = "syscall_";
const RESOURCE_PREFIX: &str = "resource_";

/// Daily CSV log of combined snapshots.
///
/// The open file handle and its frozen header live behind one lock owned by
/// this type alone; it is never held together with the syscall counter lock.
pub struct CsvPersistence {
    data_dir: PathBuf,
    current: Mutex<Option<DayPartition>>,
}

impl CsvPersistence {
    /// Creates `data_dir` if needed and opens today's partition.
    ///
    /// # Errors
    ///
    /// Fails if the directory or today's file cannot be created. Callers treat
    /// this as fatal: the agent must not run without its durable log.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir).map_err(StorageError::io(data_dir))?;
        let today = DayPartition::open(data_dir, Utc::now().date_naive())?;
        tracing::info!(partition = %partition::partition_key(today.date()), "Opened partition");
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            current: Mutex::new(Some(today)),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Lock the open partition, recovering from a poisoned Mutex if necessary.
    fn lock_current(&self) -> MutexGuard<'_, Option<DayPartition>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SnapshotStore for CsvPersistence {
    fn write(&self, snapshot: &CombinedSnapshot) -> Result<()> {
        let date = snapshot.date();
        let mut current = self.lock_current();

        let day = match current.take() {
            Some(day) if day.date() == date => day,
            previous => {
                if let Some(previous) = previous {
                    previous.close();
                }
                let day = DayPartition::open(&self.data_dir, date)?;
                tracing::info!(partition = %partition::partition_key(date), "Opened partition");
                day
            }
        };
        let day = current.insert(day);

        if day.header().is_none() {
            day.write_header(header_for(snapshot))?;
        }
        let header = day.header().unwrap_or_default();

        let mut values = column_values(snapshot);
        let row: Vec<String> = header
            .iter()
            .map(|column| values.remove(column.as_str()).unwrap_or_default())
            .collect();

        if !values.is_empty() {
            let mut dropped: Vec<&str> = values.keys().map(String::as_str).collect();
            dropped.sort_unstable();
            tracing::debug!(
                partition = %partition::partition_key(date),
                columns = ?dropped,
                "Columns not in today's header, value dropped"
            );
        }

        day.write_row(&row)
    }

    fn cleanup(&self, retention_days: u32) -> Result<u32> {
        let keep = self.lock_current().as_ref().map(DayPartition::date);
        partition::remove_older_than(&self.data_dir, retention_days, keep)
    }

    fn list_partitions(&self) -> Result<Vec<PartitionInfo>> {
        partition::list(&self.data_dir)
    }
}

/// `timestamp`, then sorted `syscall_<name>`, then sorted `resource_<name>`.
fn header_for(snapshot: &CombinedSnapshot) -> Vec<String> {
    std::iter::once(TIMESTAMP_COLUMN.to_string())
        .chain(
            snapshot
                .syscalls()
                .keys()
                .map(|name| format!("{SYSCALL_PREFIX}{name}")),
        )
        .chain(
            snapshot
                .resource_metrics()
                .keys()
                .map(|name| format!("{RESOURCE_PREFIX}{name}")),
        )
        .collect()
}

/// Every column this snapshot has a value for, keyed by column name.
fn column_values(snapshot: &CombinedSnapshot) -> HashMap<String, String> {
    let mut values = HashMap::new();
    values.insert(
        TIMESTAMP_COLUMN.to_string(),
        snapshot
            .timestamp()
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    );
    for (name, count) in snapshot.syscalls() {
        values.insert(format!("{SYSCALL_PREFIX}{name}"), count.to_string());
    }
    for (name, value) in snapshot.resource_metrics() {
        values.insert(format!("{RESOURCE_PREFIX}{name}"), value.to_string());
    }
    values
}
