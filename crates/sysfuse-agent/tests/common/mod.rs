#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysfuse_agent::pipeline::FlushPipeline;
use sysfuse_agent::snapshot::CombinedSnapshotBuilder;
use sysfuse_collector::{MetricSelection, MetricsSource, SyscallAggregator};
use sysfuse_common::types::CombinedSnapshot;
use sysfuse_forward::Forwarder;
use sysfuse_storage::{PartitionInfo, SnapshotStore};

pub const NODE_EXPORTER_TEXT: &str = "\
# HELP node_load1 1m load average.
# TYPE node_load1 gauge
node_load1 0.5
# HELP node_cpu_seconds_total Seconds the CPUs spent in each mode.
# TYPE node_cpu_seconds_total counter
node_cpu_seconds_total{cpu=\"0\",mode=\"idle\"} 100
node_cpu_seconds_total{cpu=\"0\",mode=\"user\"} 20
";

pub fn test_selection() -> MetricSelection {
    MetricSelection {
        direct: vec!["node_load1".to_string()],
        aggregated: vec!["node_cpu_seconds_total".to_string()],
    }
}

pub struct StaticSource(pub &'static str);

#[async_trait]
impl MetricsSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> anyhow::Result<String> {
        Ok(self.0.to_string())
    }
}

/// In-memory store that can be slowed down and tracks write overlap.
#[derive(Default)]
pub struct RecordingStore {
    pub delay: Duration,
    pub rows: Mutex<Vec<CombinedSnapshot>>,
    pub started: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl RecordingStore {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn written(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

impl SnapshotStore for RecordingStore {
    fn write(&self, snapshot: &CombinedSnapshot) -> sysfuse_storage::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        std::thread::sleep(self.delay);
        self.rows.lock().unwrap().push(snapshot.clone());

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn cleanup(&self, _retention_days: u32) -> sysfuse_storage::Result<u32> {
        Ok(0)
    }

    fn list_partitions(&self) -> sysfuse_storage::Result<Vec<PartitionInfo>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct RecordingForwarder {
    pub delay: Duration,
    pub sent: Mutex<Vec<CombinedSnapshot>>,
}

impl RecordingForwarder {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn forward(&self, snapshot: &CombinedSnapshot) -> sysfuse_forward::Result<()> {
        tokio::time::sleep(self.delay).await;
        self.sent.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    fn target(&self) -> &str {
        "memory://recording"
    }
}

pub struct TestPipeline {
    pub aggregator: Arc<SyscallAggregator>,
    pub store: Arc<RecordingStore>,
    pub forwarder: Arc<RecordingForwarder>,
    pub pipeline: Arc<FlushPipeline>,
}

pub fn build_test_pipeline(store: RecordingStore, forwarder: RecordingForwarder) -> TestPipeline {
    let aggregator = Arc::new(SyscallAggregator::new());
    let store = Arc::new(store);
    let forwarder = Arc::new(forwarder);
    let builder = CombinedSnapshotBuilder::new(
        Arc::new(StaticSource(NODE_EXPORTER_TEXT)),
        test_selection(),
        aggregator.clone(),
    );
    let pipeline = Arc::new(FlushPipeline::new(builder, store.clone(), forwarder.clone()));
    TestPipeline {
        aggregator,
        store,
        forwarder,
        pipeline,
    }
}
