//! Record emission.
//!
//! [`RecordSink`] is the seam between the middleware and whatever consumes
//! the access log. The middleware calls [`RecordSink::emit`] synchronously,
//! exactly once per request, after the downstream handler has returned.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use tracing::info;

use crate::record::AccessRecord;

/// Consumer of finished access records.
///
/// Implementations must tolerate concurrent callers (one per in-flight
/// request) and must not panic; failures should be swallowed or logged,
/// never surfaced to the request.
pub trait RecordSink: Send + Sync + 'static {
    /// Receive one finished record.
    fn emit(&self, record: &AccessRecord);
}

/// Default sink: one structured `tracing` event per record.
///
/// With `tracing-subscriber`'s JSON formatter installed this produces the
/// one-JSON-object-per-line stream the access log promises.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl RecordSink for TracingSink {
    fn emit(&self, record: &AccessRecord) {
        let request_body = record.request_body.as_ref().map(|body| body.to_string());
        let response_body = record.response_body.as_ref().map(|body| body.to_string());
        info!(
            target: "tollgate::access",
            timestamp = %record.timestamp.to_rfc3339(),
            request_id = record.request_id.as_deref().unwrap_or(""),
            method = %record.method,
            remote_addr = %record.remote_addr,
            user_agent = %record.user_agent,
            uri = %record.uri,
            content_type = %record.content_type,
            request_body = request_body.as_deref().unwrap_or(""),
            response_body = response_body.as_deref().unwrap_or(""),
            unsupported_content_type = record.unsupported_content_type.as_deref().unwrap_or(""),
            status = record.status,
            duration_ms = record.duration_ms,
            "request served"
        );
    }
}

/// Sink that serializes each record as one JSON object per line to any
/// writer: stdout, a log file, or [`std::io::sink`] to discard.
///
/// Write failures are dropped on the floor; an unwritable log destination
/// must not fail traffic.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl JsonLinesSink<std::io::Stdout> {
    /// Sink writing to standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send + 'static> RecordSink for JsonLinesSink<W> {
    fn emit(&self, record: &AccessRecord) {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if serde_json::to_writer(&mut *writer, record).is_ok() {
            let _ = writeln!(writer);
        }
    }
}
