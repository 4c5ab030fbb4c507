//! Integration tests for HttpReportTransport
//!
//! Spins up a loopback axum collector and posts real reports to it.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use floorwatch::models::{EventStackType, FloorSettings, ReportEnvelope};
use floorwatch::transport::{HttpReportTransport, ReportTransport};

#[derive(Clone, Default)]
struct Collector {
    bodies: Arc<Mutex<Vec<Value>>>,
}

async fn collect_with_update(State(c): State<Collector>, Json(body): Json<Value>) -> String {
    c.bodies.lock().push(body);
    json!({
        "infoString": "srv-1",
        "config": {"p1": {"x": {"key": "floor", "value": 1.25, "usesRemaining": 2}}}
    })
    .to_string()
}

async fn collect_silently(State(c): State<Collector>, Json(body): Json<Value>) -> StatusCode {
    c.bodies.lock().push(body);
    StatusCode::NO_CONTENT
}

async fn collect_broken() -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance")
}

async fn collect_garbage() -> &'static str {
    "<html>not json</html>"
}

async fn spawn_collector() -> (String, Collector) {
    let collector = Collector::default();
    let app = Router::new()
        .route("/update", post(collect_with_update))
        .route("/silent", post(collect_silently))
        .route("/broken", post(collect_broken))
        .route("/garbage", post(collect_garbage))
        .with_state(collector.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), collector)
}

fn report() -> ReportEnvelope {
    ReportEnvelope {
        time: 1_700_000_000_000,
        info_string: "abc".to_string(),
        price_floor_settings: FloorSettings::new(),
        events: Vec::new(),
        event_stack_type: EventStackType::Impression,
        session_id: Some("s-1".to_string()),
        utm_tag_data: None,
        event_history: None,
    }
}

#[tokio::test]
async fn test_post_returns_reconcile_payload() {
    let (base, collector) = spawn_collector().await;
    let transport = HttpReportTransport::new(format!("{}/update", base), None).unwrap();

    let payload = transport.send(&report()).await.unwrap().unwrap();
    assert_eq!(payload.info_string.as_deref(), Some("srv-1"));
    assert_eq!(payload.config.unwrap()["p1"]["x"].value, 1.25);

    let bodies = collector.bodies.lock();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["infoString"], "abc");
    assert_eq!(bodies[0]["eventStackType"], "impression");
    assert_eq!(bodies[0]["sessionId"], "s-1");
    assert!(bodies[0].get("eventHistory").is_none());
}

#[tokio::test]
async fn test_empty_response_is_no_update() {
    let (base, collector) = spawn_collector().await;
    let transport = HttpReportTransport::new(format!("{}/silent", base), None).unwrap();

    assert!(transport.send(&report()).await.unwrap().is_none());
    assert_eq!(collector.bodies.lock().len(), 1);
}

#[tokio::test]
async fn test_non_success_status_is_error() {
    let (base, _collector) = spawn_collector().await;
    let transport = HttpReportTransport::new(format!("{}/broken", base), None).unwrap();

    let err = transport.send(&report()).await.unwrap_err();
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_malformed_response_is_error() {
    let (base, _collector) = spawn_collector().await;
    let transport = HttpReportTransport::new(format!("{}/garbage", base), None).unwrap();
    assert!(transport.send(&report()).await.is_err());
}

#[tokio::test]
async fn test_unreachable_collector_is_error() {
    let transport = HttpReportTransport::new(
        "http://127.0.0.1:9/collect",
        Some(std::time::Duration::from_millis(500)),
    )
    .unwrap();
    assert!(transport.send(&report()).await.is_err());
}
