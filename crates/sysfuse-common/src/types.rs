use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Syscall name to number of occurrences within one window.
///
/// Ordered so that CSV columns and JSON payloads come out sorted.
pub type SyscallCounts = BTreeMap<String, u64>;

/// Resource metric name to scalar value, extracted from one exposition blob.
///
/// A metric that could not be found is absent, never present as zero or NaN.
pub type ResourceMetricSet = BTreeMap<String, f64>;

/// Point-in-time view of both metric sources for one window.
///
/// Built once per flush and never mutated afterwards; sinks receive it behind
/// an `Arc` and only ever read from it.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use sysfuse_common::types::{CombinedSnapshot, ResourceMetricSet, SyscallCounts};
///
/// let mut syscalls = SyscallCounts::new();
/// syscalls.insert("openat".into(), 3);
/// let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
/// let snapshot = CombinedSnapshot::new(ts, syscalls, ResourceMetricSet::new());
///
/// assert_eq!(snapshot.syscall_total(), 3);
/// assert_eq!(snapshot.date().to_string(), "2024-05-01");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedSnapshot {
    timestamp: DateTime<Utc>,
    syscalls: SyscallCounts,
    resource_metrics: ResourceMetricSet,
}

impl CombinedSnapshot {
    pub fn new(
        timestamp: DateTime<Utc>,
        syscalls: SyscallCounts,
        resource_metrics: ResourceMetricSet,
    ) -> Self {
        Self {
            timestamp,
            syscalls,
            resource_metrics,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// UTC calendar date the snapshot belongs to.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    pub fn syscalls(&self) -> &SyscallCounts {
        &self.syscalls
    }

    pub fn resource_metrics(&self) -> &ResourceMetricSet {
        &self.resource_metrics
    }

    /// Total number of syscall events captured in the window.
    pub fn syscall_total(&self) -> u64 {
        self.syscalls.values().sum()
    }

    /// JSON payload sent to the central server:
    /// `{"timestamp": RFC3339, "syscalls": {..}, "resource_metrics": {..}}`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
