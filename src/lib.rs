//! # Tollgate
//!
//! Axum middleware that records every request/response pair as a single
//! structured log line — method, peer address, user agent, URI, timing,
//! status, and (for JSON and XML payloads) the decoded request and response
//! bodies — plus a bounded worker pool for offloading fire-and-forget work
//! from handlers.
//!
//! ## Features
//!
//! - **One record per request**: assembled when the request arrives, emitted
//!   synchronously after the downstream handler has fully returned
//! - **Body capture without body theft**: the handler reads the same bytes it
//!   would have seen without the middleware
//! - **Best-effort decoding**: malformed payloads are logged without a body
//!   field instead of failing the request; unrecognized content types are
//!   flagged explicitly rather than silently skipped
//! - **Pluggable sinks**: `tracing` events, JSON-lines writers, or your own
//!   [`RecordSink`]
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use axum::{routing::post, Router};
//! use tollgate::{AccessLogLayer, NoCacheLayer, TracingSink};
//! use tower::ServiceBuilder;
//!
//! async fn echo(body: axum::body::Bytes) -> axum::body::Bytes {
//!     body
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .route("/check/echo", post(echo))
//!         .layer(
//!             ServiceBuilder::new()
//!                 .layer(NoCacheLayer)
//!                 .layer(AccessLogLayer::new(TracingSink))
//!                 .into_inner(),
//!         );
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! ## Custom sinks
//!
//! Implement [`RecordSink`] to route finished records anywhere:
//!
//! ```rust
//! use tollgate::{AccessRecord, RecordSink};
//!
//! #[derive(Debug)]
//! struct StdoutSink;
//!
//! impl RecordSink for StdoutSink {
//!     fn emit(&self, record: &AccessRecord) {
//!         println!("{} {} -> {}", record.method, record.uri, record.status);
//!     }
//! }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::http::header;
use axum::response::Response;
use chrono::Utc;
use tower::{Layer, Service};
use tower_http::request_id::RequestId;
use tracing::warn;

pub mod capture;
pub mod no_cache;
pub mod pool;
pub mod record;
pub mod sink;

pub use capture::CaptureError;
use capture::{buffer_body, decode_body};
pub use no_cache::{NoCacheLayer, NoCacheService};
pub use pool::WorkerPool;
pub use record::{AccessRecord, BodyKind};
pub use sink::{JsonLinesSink, RecordSink, TracingSink};

/// Tower layer for the access-log middleware.
///
/// Wraps every request/response pair flowing through the stack, assembles an
/// [`AccessRecord`] and hands it to the supplied [`RecordSink`] once the
/// downstream handler has fully returned.
///
/// # Examples
///
/// ```rust
/// use tollgate::{AccessLogLayer, TracingSink};
///
/// let layer = AccessLogLayer::new(TracingSink);
/// ```
#[derive(Clone)]
pub struct AccessLogLayer {
    sink: Arc<dyn RecordSink>,
}

impl AccessLogLayer {
    /// Create the layer around a sink.
    pub fn new<S: RecordSink>(sink: S) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService {
            inner,
            sink: self.sink.clone(),
        }
    }
}

/// Tower service produced by [`AccessLogLayer`].
///
/// Captures request metadata up front, buffers JSON/XML bodies on both sides
/// of the inner call while handing the pipeline an untouched copy, and emits
/// one record per request. Capture problems never reach the response; the
/// worst outcome is a record with a missing body field.
#[derive(Clone)]
pub struct AccessLogService<S> {
    inner: S,
    sink: Arc<dyn RecordSink>,
}

impl<S> Service<Request> for AccessLogService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        // Body buffering happens inside the future, so hand the call to the
        // clone and keep the instance that signalled readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let sink = self.sink.clone();

        Box::pin(async move {
            let started = Instant::now();
            let timestamp = Utc::now();

            let method = request.method().to_string();
            let remote_addr = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.to_string())
                .unwrap_or_default();
            let user_agent = header_str(&request, header::USER_AGENT);
            let content_type = header_str(&request, header::CONTENT_TYPE);
            let uri = qualified_uri(&request);
            let request_id = request_id(&request);
            let kind = BodyKind::from_content_type(&content_type);

            let request_body = if kind.captures_bodies() {
                let body = std::mem::replace(request.body_mut(), Body::empty());
                match buffer_body(body).await {
                    Ok(bytes) => {
                        let decoded = decode_body(kind, &bytes);
                        *request.body_mut() = Body::from(bytes);
                        decoded
                    }
                    Err(error) => {
                        // The source stream is gone; the handler sees an
                        // empty body.
                        warn!(%error, "request body capture failed");
                        None
                    }
                }
            } else {
                None
            };

            let response = inner.call(request).await?;

            // Response decoding is keyed on the request's declared content
            // type, matching the request-side dispatch.
            let (response, response_body) = if kind.captures_bodies() {
                let (parts, body) = response.into_parts();
                match buffer_body(body).await {
                    Ok(bytes) => {
                        let decoded = decode_body(kind, &bytes);
                        (Response::from_parts(parts, Body::from(bytes)), decoded)
                    }
                    Err(error) => {
                        warn!(%error, "response body capture failed");
                        (Response::from_parts(parts, Body::empty()), None)
                    }
                }
            } else {
                (response, None)
            };

            let record = AccessRecord {
                timestamp,
                request_id,
                method,
                remote_addr,
                user_agent,
                uri,
                request_body,
                response_body,
                unsupported_content_type: (!kind.captures_bodies())
                    .then(|| content_type.clone()),
                content_type,
                status: response.status().as_u16(),
                duration_ms: started.elapsed().as_millis() as u64,
            };
            sink.emit(&record);

            Ok(response)
        })
    }
}

fn header_str(request: &Request, name: header::HeaderName) -> String {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}

/// Rebuild the scheme-qualified URI the client asked for. The scheme falls
/// back to `http` and the authority to the `Host` header, since a
/// server-side request URI usually carries only the path and query.
fn qualified_uri(request: &Request) -> String {
    let uri = request.uri();
    let scheme = uri.scheme_str().unwrap_or("http");
    let authority = uri
        .authority()
        .map(|authority| authority.as_str().to_owned())
        .unwrap_or_else(|| header_str(request, header::HOST));
    let path_and_query = uri.path_and_query().map_or(uri.path(), |paq| paq.as_str());
    format!("{scheme}://{authority}{path_and_query}")
}

/// Correlation id assigned upstream, if any: the request-id extension set by
/// `tower_http::request_id`, falling back to a bare `x-request-id` header.
fn request_id(request: &Request) -> Option<String> {
    request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .map(str::to_owned)
        .or_else(|| {
            request
                .headers()
                .get("x-request-id")
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        })
}
