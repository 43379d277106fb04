mod common;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use common::{test_selection, NODE_EXPORTER_TEXT};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysfuse_agent::ingest::{build_http_app, FALCO_WEBHOOK_PATH};
use sysfuse_agent::pipeline::FlushPipeline;
use sysfuse_agent::snapshot::CombinedSnapshotBuilder;
use sysfuse_collector::{HttpMetricsSource, SyscallAggregator};
use sysfuse_forward::HttpForwarder;
use sysfuse_storage::partition::partition_path;
use sysfuse_storage::CsvPersistence;
use tempfile::TempDir;
use tower::util::ServiceExt;

type Received = Arc<Mutex<Vec<(Option<String>, Value)>>>;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn start_metrics_server() -> String {
    let app = Router::new().route("/metrics", get(|| async { NODE_EXPORTER_TEXT }));
    format!("{}/metrics", serve(app).await)
}

async fn start_central_server(status: StatusCode) -> (String, Received) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let app = Router::new().route(
        "/ingest",
        post(move |headers: HeaderMap, body: String| {
            let sink = sink.clone();
            async move {
                let node = headers
                    .get("x-node-id")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                sink.lock().unwrap().push((node, serde_json::from_str(&body).unwrap()));
                status
            }
        }),
    );
    (format!("{}/ingest", serve(app).await), received)
}

struct Agent {
    _dir: TempDir,
    dir: std::path::PathBuf,
    aggregator: Arc<SyscallAggregator>,
    pipeline: FlushPipeline,
}

async fn build_agent(central_url: &str) -> Agent {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();
    let aggregator = Arc::new(SyscallAggregator::new());

    let source = HttpMetricsSource::new(&start_metrics_server().await, Duration::from_secs(2)).unwrap();
    let forwarder = HttpForwarder::new(central_url, "node-7", Duration::from_secs(2)).unwrap();
    let store = CsvPersistence::new(&path).unwrap();

    let builder = CombinedSnapshotBuilder::new(Arc::new(source), test_selection(), aggregator.clone());
    let pipeline = FlushPipeline::new(builder, Arc::new(store), Arc::new(forwarder));
    Agent {
        _dir: dir,
        dir: path,
        aggregator,
        pipeline,
    }
}

async fn post_event(app: &Router, syscall: &str) {
    let body = serde_json::json!({
        "rule": "syscall trace",
        "priority": "Informational",
        "output_fields": { "syscall.type": syscall, "proc.name": "bash" }
    });
    let req = Request::builder()
        .method("POST")
        .uri(FALCO_WEBHOOK_PATH)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn window_is_persisted_and_forwarded() {
    let (central_url, received) = start_central_server(StatusCode::OK).await;
    let agent = build_agent(&central_url).await;
    let app = build_http_app(agent.aggregator.clone());

    for _ in 0..3 {
        post_event(&app, "openat").await;
    }
    post_event(&app, "execve").await;

    let snapshot = agent.pipeline.flush().await;
    assert_eq!(snapshot.syscalls().get("openat"), Some(&3));
    assert_eq!(snapshot.syscalls().get("execve"), Some(&1));
    assert_eq!(snapshot.resource_metrics().get("node_load1"), Some(&0.5));
    assert_eq!(snapshot.resource_metrics().get("node_cpu_seconds_total"), Some(&100.0));

    let received = received.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    let (node, payload) = &received[0];
    assert_eq!(node.as_deref(), Some("node-7"));
    assert_eq!(payload["syscalls"]["openat"], 3);
    assert_eq!(payload["syscalls"]["execve"], 1);
    assert_eq!(payload["resource_metrics"]["node_load1"], 0.5);
    assert_eq!(payload["resource_metrics"]["node_cpu_seconds_total"], 100.0);
    assert!(payload["timestamp"].is_string());

    let csv = std::fs::read_to_string(partition_path(&agent.dir, snapshot.date())).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "timestamp,syscall_execve,syscall_openat,resource_node_cpu_seconds_total,resource_node_load1"
    );
    assert_eq!(lines.len(), 2);
    assert!(lines[1].ends_with(",1,3,100,0.5"), "unexpected row: {}", lines[1]);
}

#[tokio::test]
async fn next_window_starts_from_zero() {
    let (central_url, received) = start_central_server(StatusCode::OK).await;
    let agent = build_agent(&central_url).await;

    agent.aggregator.ingest("openat");
    let first = agent.pipeline.flush().await;
    let second = agent.pipeline.flush().await;

    assert_eq!(first.syscall_total(), 1);
    assert!(second.syscalls().is_empty());
    assert!(second.timestamp() >= first.timestamp());
    assert_eq!(received.lock().unwrap().len(), 2);

    let csv = std::fs::read_to_string(partition_path(&agent.dir, second.date())).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    // Header frozen by the first window; the quiet window leaves the count empty.
    assert_eq!(lines[0], "timestamp,syscall_openat,resource_node_cpu_seconds_total,resource_node_load1");
    assert!(lines[2].ends_with(",,100,0.5"), "unexpected row: {}", lines[2]);
}

#[tokio::test]
async fn rejected_forward_still_persists() {
    let (central_url, received) = start_central_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    let agent = build_agent(&central_url).await;

    agent.aggregator.ingest("read");
    let snapshot = agent.pipeline.flush().await;

    assert_eq!(received.lock().unwrap().len(), 1);
    let csv = std::fs::read_to_string(partition_path(&agent.dir, snapshot.date())).unwrap();
    assert_eq!(csv.lines().count(), 2);
}

#[tokio::test]
async fn unreachable_metrics_endpoint_keeps_syscalls() {
    let (central_url, received) = start_central_server(StatusCode::OK).await;
    let dir = tempfile::tempdir().unwrap();
    let aggregator = Arc::new(SyscallAggregator::new());

    // Nothing listens on the discard port.
    let source = HttpMetricsSource::new("http://127.0.0.1:9/metrics", Duration::from_millis(500)).unwrap();
    let forwarder = HttpForwarder::new(&central_url, "node-7", Duration::from_secs(2)).unwrap();
    let store = CsvPersistence::new(dir.path()).unwrap();
    let builder = CombinedSnapshotBuilder::new(Arc::new(source), test_selection(), aggregator.clone());
    let pipeline = FlushPipeline::new(builder, Arc::new(store), Arc::new(forwarder));

    aggregator.ingest("execve");
    let snapshot = pipeline.flush().await;

    assert_eq!(snapshot.syscalls().get("execve"), Some(&1));
    assert!(snapshot.resource_metrics().is_empty());
    assert_eq!(received.lock().unwrap().len(), 1);
}
