//! Delivery against a stub plugin manager.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use keystroke_agent::core::Aggregator;
use keystroke_agent::delivery::{CompanionClient, CompanionConfig, DeliveryError, DeliverySink};
use keystroke_agent::feed::{ContentChange, DocumentRef, EditorEvent, ProjectRef};
use keystroke_agent::notice::{FailureNotice, UserNotifier};
use keystroke_agent::scheduler::KeystrokeService;
use keystroke_agent::stats::ActivityStats;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Received {
    bodies: Mutex<Vec<serde_json::Value>>,
    plugin_ids: Mutex<Vec<String>>,
}

#[derive(Clone)]
struct StubState {
    received: Arc<Received>,
    status: StatusCode,
}

async fn data(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    if let Some(id) = headers.get("x-swdc-plugin-id").and_then(|v| v.to_str().ok()) {
        state.received.plugin_ids.lock().unwrap().push(id.to_string());
    }
    state.received.bodies.lock().unwrap().push(body);
    state.status
}

async fn ping() -> &'static str {
    "pong"
}

/// Start a stub plugin manager answering `/data` with `status`.
async fn stub(status: StatusCode) -> (SocketAddr, Arc<Received>) {
    let received = Arc::new(Received::default());
    let app = Router::new()
        .route("/api/v1/data", post(data))
        .route("/api/v1/ping", get(ping))
        .with_state(StubState {
            received: received.clone(),
            status,
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, received)
}

fn client(addr: SocketAddr) -> CompanionClient {
    let config = CompanionConfig::new(format!("http://{addr}/api/v1"));
    CompanionClient::new(config, "0.1.4", "test-install").unwrap()
}

fn event(kind: &str, project: Option<&str>, file: &str) -> EditorEvent {
    let document = DocumentRef::file(file);
    let project = project.map(ProjectRef::new);
    match kind {
        "open" => EditorEvent::Open { document, project },
        "close" => EditorEvent::Close { document, project },
        _ => EditorEvent::Change {
            document,
            project,
            changes: vec![ContentChange::insert(1)],
        },
    }
}

#[derive(Default)]
struct CountingNotifier(Mutex<usize>);

impl UserNotifier for CountingNotifier {
    fn warn_user(&self, _message: &str) {
        *self.0.lock().unwrap() += 1;
    }
}

#[tokio::test]
async fn test_ping_reports_available() {
    let (addr, _) = stub(StatusCode::OK).await;
    assert!(client(addr).is_available().await);
}

#[tokio::test]
async fn test_payload_reaches_plugin_manager() {
    let (addr, received) = stub(StatusCode::OK).await;

    let mut aggregator = Aggregator::new(60);
    aggregator.handle_event(&event("open", Some("/work/app"), "/work/app/a.rs"));
    aggregator.handle_event(&event("change", Some("/work/app"), "/work/app/a.rs"));
    aggregator.handle_event(&event("change", Some("/work/app"), "/work/app/a.rs"));
    let record = aggregator.drain().ready.pop().unwrap();

    client(addr)
        .deliver(record.to_payload("0.1.4"))
        .await
        .unwrap();

    let bodies = received.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["type"], "Events");
    assert_eq!(body["data"], "2");
    assert_eq!(body["pluginId"], 2);
    assert_eq!(body["project"]["directory"], "/work/app");
    assert_eq!(body["source"]["/work/app/a.rs"]["keys"], 2);
    assert_eq!(body["source"]["/work/app/a.rs"]["open"], 1);
    assert_eq!(
        body["end"].as_i64().unwrap() - body["start"].as_i64().unwrap(),
        60
    );
    assert_eq!(received.plugin_ids.lock().unwrap().as_slice(), &["2"]);
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let (addr, _) = stub(StatusCode::INTERNAL_SERVER_ERROR).await;

    let mut aggregator = Aggregator::new(60);
    aggregator.handle_event(&event("close", None, "/tmp/notes.txt"));
    let record = aggregator.drain().ready.pop().unwrap();

    let err = client(addr)
        .deliver(record.to_payload("0.1.4"))
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Server { status: 500, .. }));
}

#[tokio::test]
async fn test_flush_end_to_end() {
    let (addr, received) = stub(StatusCode::OK).await;
    let service = KeystrokeService::new(
        Aggregator::new(60),
        Arc::new(client(addr)),
        Arc::new(FailureNotice::default()),
        Arc::new(ActivityStats::new()),
    );

    service.handle_event(&event("change", Some("/a"), "/a/x.rs"));
    service.handle_event(&event("change", None, "/tmp/y.rs"));

    for handle in service.flush() {
        handle.await.unwrap();
    }

    let bodies = received.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 2);
    assert!(bodies.iter().any(|b| b["project"].is_null()));
    assert!(bodies.iter().any(|b| b["project"]["directory"] == "/a"));
    assert_eq!(service.stats().snapshot().records_delivered, 2);
    assert_eq!(service.with_aggregator(|agg| agg.len()), 0);
}

#[tokio::test]
async fn test_rejected_records_warn_once() {
    let (addr, received) = stub(StatusCode::SERVICE_UNAVAILABLE).await;
    let notifier = Arc::new(CountingNotifier::default());
    let service = KeystrokeService::new(
        Aggregator::new(60),
        Arc::new(client(addr)),
        Arc::new(FailureNotice::new(notifier.clone())),
        Arc::new(ActivityStats::new()),
    );

    for _ in 0..3 {
        service.handle_event(&event("change", Some("/a"), "/a/x.rs"));
        for handle in service.flush() {
            handle.await.unwrap();
        }
        assert_eq!(service.with_aggregator(|agg| agg.len()), 0);
    }

    assert_eq!(received.bodies.lock().unwrap().len(), 3);
    assert_eq!(*notifier.0.lock().unwrap(), 1);
    assert_eq!(service.stats().snapshot().records_failed, 3);
}
