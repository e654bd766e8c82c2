//! Per-request record types for the access log.
//!
//! This module contains the structured record assembled for every request
//! that passes through the access-log middleware, along with the
//! content-type dispatch that decides whether bodies are captured.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// One request/response pair, flattened into the named fields that make up a
/// single structured log entry.
///
/// A record is created when a request enters the middleware and emitted
/// through a [`RecordSink`](crate::RecordSink) once the downstream handler
/// has fully returned. Optional fields are omitted from the serialized form
/// when unset, so a record for an unsupported content type carries no
/// `request_body` or `response_body` keys at all.
#[derive(Debug, Clone, Serialize)]
pub struct AccessRecord {
    /// When the request entered the middleware.
    pub timestamp: DateTime<Utc>,
    /// Correlation identifier assigned upstream (request-id extension or
    /// `x-request-id` header); absent when no upstream layer assigned one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// HTTP method, verbatim.
    pub method: String,
    /// Peer address; empty when the server was built without connect info.
    pub remote_addr: String,
    /// `User-Agent` header; empty when absent.
    pub user_agent: String,
    /// Scheme-qualified request URI.
    pub uri: String,
    /// Declared `Content-Type` of the request body, verbatim.
    pub content_type: String,
    /// Request body decoded into a generic tree, when the content type is
    /// supported and the payload parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    /// Response body, decoded the same way and keyed on the same declared
    /// content type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Value>,
    /// Set to the declared content type (possibly empty) when body capture
    /// was skipped because the type is not supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsupported_content_type: Option<String>,
    /// Status code the downstream handler produced.
    pub status: u16,
    /// Wall-clock time from middleware entry to record emission.
    pub duration_ms: u64,
}

/// Content-type dispatch for body capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// `application/json` payloads, decoded with `serde_json`.
    Json,
    /// `text/xml` payloads, decoded with `quick-xml`.
    Xml,
    /// Anything else; bodies pass through untouched and unlogged.
    Unsupported,
}

impl BodyKind {
    /// Classify a declared content type by prefix match, so parameterized
    /// types like `application/json; charset=utf-8` still count.
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("application/json") {
            Self::Json
        } else if content_type.starts_with("text/xml") {
            Self::Xml
        } else {
            Self::Unsupported
        }
    }

    /// Whether request and response bodies are buffered and decoded for this
    /// kind.
    pub fn captures_bodies(self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}
