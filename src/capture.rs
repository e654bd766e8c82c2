//! Body buffering and best-effort decoding.
//!
//! The access log needs to read bodies that the downstream handler (or the
//! client) must still be able to consume. Bodies are collected into an owned
//! [`Bytes`] buffer and an identical copy is handed back to the pipeline, so
//! both readers see the same bytes with independent cursors.

use axum::body::Body;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::Value;

use crate::record::BodyKind;

/// Error raised while draining a body into the capture buffer.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to buffer body: {0}")]
    Buffer(axum::Error),
}

/// Collect an entire body into memory.
pub(crate) async fn buffer_body(body: Body) -> Result<Bytes, CaptureError> {
    body.collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(CaptureError::Buffer)
}

/// Decode captured bytes into a generic structured value.
///
/// Returns `None` for empty bodies, unsupported kinds, and malformed input.
/// Decode failures are swallowed rather than surfaced; logging must never
/// fail a request.
pub(crate) fn decode_body(kind: BodyKind, bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    match kind {
        BodyKind::Json => serde_json::from_slice(bytes).ok(),
        BodyKind::Xml => quick_xml::de::from_reader(bytes).ok(),
        BodyKind::Unsupported => None,
    }
}
