use crate::snapshot::CombinedSnapshotBuilder;
use std::sync::Arc;
use std::time::Instant;
use sysfuse_common::types::CombinedSnapshot;
use sysfuse_forward::Forwarder;
use sysfuse_storage::SnapshotStore;

/// One flush cycle: build the window's snapshot, persist it, forward it.
///
/// Every step after the counter reset is best-effort: a failed write or a
/// failed forward is logged and the window moves on.
pub struct FlushPipeline {
    builder: CombinedSnapshotBuilder,
    store: Arc<dyn SnapshotStore>,
    forwarder: Arc<dyn Forwarder>,
}

impl FlushPipeline {
    pub fn new(
        builder: CombinedSnapshotBuilder,
        store: Arc<dyn SnapshotStore>,
        forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        Self {
            builder,
            store,
            forwarder,
        }
    }

    /// Builds the snapshot and appends it to the durable log.
    ///
    /// The disk write runs on the blocking pool so a slow sync never stalls
    /// the runtime threads serving webhook ingestion.
    pub async fn collect_and_persist(&self) -> Arc<CombinedSnapshot> {
        let t0 = Instant::now();
        let snapshot = Arc::new(self.builder.build().await);

        let store = self.store.clone();
        let row = snapshot.clone();
        match tokio::task::spawn_blocking(move || store.write(&row)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, timestamp = %snapshot.timestamp(), "Failed to persist snapshot, row dropped");
            }
            Err(e) => {
                tracing::error!(error = %e, "Persist task panicked, row dropped");
            }
        }

        tracing::debug!(
            timestamp = %snapshot.timestamp(),
            syscalls = snapshot.syscall_total(),
            resources = snapshot.resource_metrics().len(),
            duration_ms = t0.elapsed().as_millis() as u64,
            "Window flushed"
        );
        snapshot
    }

    /// Sends the snapshot to the central server once; failures are dropped.
    pub async fn forward(&self, snapshot: &CombinedSnapshot) {
        if let Err(e) = self.forwarder.forward(snapshot).await {
            tracing::warn!(
                target_url = self.forwarder.target(),
                timestamp = %snapshot.timestamp(),
                error = %e,
                "Failed to forward snapshot, dropping"
            );
        }
    }

    /// Runs a complete cycle inline.
    pub async fn flush(&self) -> Arc<CombinedSnapshot> {
        let snapshot = self.collect_and_persist().await;
        self.forward(&snapshot).await;
        snapshot
    }
}
