use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use sysfuse_collector::{MetricSelection, MetricsSource, SyscallAggregator};
use sysfuse_common::types::{CombinedSnapshot, ResourceMetricSet};

/// Captures one window's view of both metric sources.
pub struct CombinedSnapshotBuilder {
    source: Arc<dyn MetricsSource>,
    selection: MetricSelection,
    aggregator: Arc<SyscallAggregator>,
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl CombinedSnapshotBuilder {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        selection: MetricSelection,
        aggregator: Arc<SyscallAggregator>,
    ) -> Self {
        Self {
            source,
            selection,
            aggregator,
            last_timestamp: Mutex::new(None),
        }
    }

    /// Pulls and parses resource metrics, then takes and resets the syscall
    /// counters and stamps the window.
    ///
    /// A failed pull yields an empty resource set; the window is still built.
    pub async fn build(&self) -> CombinedSnapshot {
        let resources = match self.source.fetch().await {
            Ok(text) => self.selection.extract(&text),
            Err(e) => {
                tracing::warn!(
                    source = self.source.name(),
                    error = %format_args!("{e:#}"),
                    "Resource metrics pull failed, continuing without resource data"
                );
                ResourceMetricSet::new()
            }
        };

        // Reset and timestamp back to back so the window boundary is sharp.
        let syscalls = self.aggregator.snapshot_and_reset();
        let timestamp = self.stamp(Utc::now());

        CombinedSnapshot::new(timestamp, syscalls, resources)
    }

    /// Clamps `now` so timestamps never go backwards across windows.
    fn stamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = self
            .last_timestamp
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let stamped = match *last {
            Some(prev) if prev > now => {
                tracing::warn!(previous = %prev, now = %now, "Wall clock went backwards, reusing previous timestamp");
                prev
            }
            _ => now,
        };
        *last = Some(stamped);
        stamped
    }
}
