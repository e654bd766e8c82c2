use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_test::TestServer;
use serde_json::{json, Value};
use tollgate::{AccessLogLayer, AccessRecord, NoCacheLayer, RecordSink};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};

/// Test sink that collects every emitted record for verification.
#[derive(Clone, Default)]
struct MemorySink {
    records: Arc<Mutex<Vec<AccessRecord>>>,
}

impl MemorySink {
    fn records(&self) -> Vec<AccessRecord> {
        self.records.lock().unwrap().clone()
    }

    fn single_record(&self) -> AccessRecord {
        let records = self.records();
        assert_eq!(records.len(), 1, "expected exactly one record per request");
        records.into_iter().next().unwrap()
    }
}

impl RecordSink for MemorySink {
    fn emit(&self, record: &AccessRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

// Scaffold handlers

async fn echo(headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

async fn status() -> StatusCode {
    StatusCode::OK
}

/// Never sets a status explicitly; the framework fills in 200.
async fn info() -> Json<Value> {
    Json(json!({"service": "tollgate-scaffold", "status": "ok"}))
}

async fn missing() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})))
}

fn scaffold() -> (TestServer, MemorySink) {
    let sink = MemorySink::default();
    let app = Router::new()
        .route("/check/echo", post(echo))
        .route("/check/status", get(status))
        .route("/check/info", get(info))
        .route("/check/missing", get(missing))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(NoCacheLayer)
                .layer(AccessLogLayer::new(sink.clone()))
                .into_inner(),
        );
    (TestServer::new(app).unwrap(), sink)
}

#[tokio::test]
async fn echo_round_trip_logs_json_bodies() {
    let (server, sink) = scaffold();

    let response = server.post("/check/echo").json(&json!({"a": 1})).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({"a": 1}));

    let record = sink.single_record();
    assert_eq!(record.method, "POST");
    assert!(record.uri.ends_with("/check/echo"));
    assert!(record.content_type.starts_with("application/json"));
    assert_eq!(record.request_body, Some(json!({"a": 1})));
    assert_eq!(record.response_body, Some(json!({"a": 1})));
    assert_eq!(record.status, 200);
    assert!(record.unsupported_content_type.is_none());
}

#[tokio::test]
async fn unsupported_content_type_skips_bodies() {
    let (server, sink) = scaffold();

    let response = server
        .post("/check/echo")
        .content_type("text/plain")
        .bytes(Bytes::from_static(b"hello"))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "hello");

    let record = sink.single_record();
    assert!(record.request_body.is_none());
    assert!(record.response_body.is_none());
    assert_eq!(record.unsupported_content_type.as_deref(), Some("text/plain"));
    assert_eq!(record.status, 200);
}

#[tokio::test]
async fn absent_content_type_is_flagged() {
    let (server, sink) = scaffold();

    let response = server.get("/check/status").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let record = sink.single_record();
    assert!(record.request_body.is_none());
    assert!(record.response_body.is_none());
    assert_eq!(record.unsupported_content_type.as_deref(), Some(""));
}

#[tokio::test]
async fn implicit_status_is_recorded_as_ok() {
    let (server, sink) = scaffold();

    let response = server.get("/check/info").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let record = sink.single_record();
    assert_eq!(record.status, 200);
    assert_eq!(record.method, "GET");
}

#[tokio::test]
async fn handler_status_is_recorded() {
    let (server, sink) = scaffold();

    let response = server.get("/check/missing").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let record = sink.single_record();
    assert_eq!(record.status, 404);
}

#[tokio::test]
async fn malformed_json_is_served_and_unlogged() {
    let (server, sink) = scaffold();

    let response = server
        .post("/check/echo")
        .content_type("application/json")
        .bytes(Bytes::from_static(b"{not json"))
        .await;
    // The handler still receives and echoes the full body; only the log
    // record goes without the unparseable payload.
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "{not json");

    let record = sink.single_record();
    assert!(record.request_body.is_none());
    assert!(record.response_body.is_none());
    assert!(record.unsupported_content_type.is_none());
    assert_eq!(record.status, 200);
}

#[tokio::test]
async fn xml_bodies_are_captured() {
    let (server, sink) = scaffold();

    let payload = "<note><to>world</to><message>hello</message></note>";
    let response = server
        .post("/check/echo")
        .content_type("text/xml")
        .bytes(Bytes::from_static(payload.as_bytes()))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), payload);

    let record = sink.single_record();
    assert!(record.request_body.is_some());
    assert!(record.response_body.is_some());
    assert!(record.unsupported_content_type.is_none());
}

#[tokio::test]
async fn no_cache_headers_are_stamped() {
    let (server, _sink) = scaffold();

    let response = server.get("/check/status").await;
    let headers = response.headers();
    assert_eq!(
        headers.get(header::CACHE_CONTROL).unwrap(),
        "no-cache,no-store,must-revalidate"
    );
    assert_eq!(headers.get(header::PRAGMA).unwrap(), "no-cache");
    assert_eq!(headers.get(header::EXPIRES).unwrap(), "0");
}

#[tokio::test]
async fn request_id_is_propagated_into_records() {
    let (server, sink) = scaffold();

    server.post("/check/echo").json(&json!({"a": 1})).await;

    let record = sink.single_record();
    let request_id = record.request_id.expect("request id assigned upstream");
    assert!(!request_id.is_empty());
}

#[tokio::test]
async fn every_request_emits_exactly_one_record() {
    let (server, sink) = scaffold();

    server.post("/check/echo").json(&json!({"n": 1})).await;
    server.get("/check/status").await;
    server.get("/check/info").await;

    let records = sink.records();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].method, "POST");
    assert_eq!(records[1].method, "GET");
    assert_eq!(records[2].method, "GET");
}

#[tokio::test]
async fn timing_reflects_handler_work() {
    async fn delayed() -> StatusCode {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        StatusCode::OK
    }

    let sink = MemorySink::default();
    let app = Router::new()
        .route("/delayed", get(delayed))
        .layer(AccessLogLayer::new(sink.clone()));
    let server = TestServer::new(app).unwrap();

    server.get("/delayed").await;

    let record = sink.single_record();
    assert!(
        record.duration_ms >= 40,
        "duration was {}ms",
        record.duration_ms
    );
}
