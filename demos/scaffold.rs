//! Demo server wiring the tollgate middleware stack and worker pool into a
//! small health-check API.
//!
//! Run with `cargo run --example scaffold`, then:
//!
//! ```text
//! curl -X POST -H 'Content-Type: application/json' -d '{"a":1}' http://localhost:8080/check/echo
//! curl http://localhost:8080/check/status
//! curl http://localhost:8080/check/info
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tollgate::{AccessLogLayer, NoCacheLayer, TracingSink, WorkerPool};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tracing::info;

#[derive(Clone)]
struct AppState {
    pool: Arc<WorkerPool>,
}

/// Echoes the request body back with the same content type, and offloads a
/// small piece of follow-up work to the pool.
async fn echo(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let size = body.len();
    state
        .pool
        .submit(async move {
            info!(size, "echo payload processed in the background");
        })
        .await;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

async fn status() -> StatusCode {
    StatusCode::OK
}

async fn info_view() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().json().init();

    let pool = Arc::new(WorkerPool::new(64));
    let state = AppState { pool: pool.clone() };

    let app = Router::new()
        .route("/check/echo", post(echo))
        .route("/check/status", get(status))
        .route("/check/info", get(info_view))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(CatchPanicLayer::new())
                .layer(NoCacheLayer)
                .layer(AccessLogLayer::new(TracingSink))
                .into_inner(),
        );

    let address: SocketAddr = "0.0.0.0:8080".parse()?;
    let listener = TcpListener::bind(address).await?;
    info!(%address, "serving");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    info!("draining background tasks");
    pool.shutdown().await;

    Ok(())
}
