//! Resumable cursor encoding.
//!
//! A cursor is URL-safe base64 over a small JSON payload:
//!
//! ```text
//! {"v":1,"qh":"<sha256 of query+format>","rs":{"mode":"streaming",...},"ts":1700000000000}
//! ```
//!
//! The query hash binds a cursor to the exact query and output format it was
//! issued for. Cursors carry no credentials and expire after
//! [`CURSOR_TTL_SECONDS`].

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::query::Query;

/// Payload layout version.
pub const CURSOR_VERSION: u32 = 1;

/// Cursor lifetime.
pub const CURSOR_TTL_SECONDS: u64 = 3600;

/// Result type for cursor operations.
pub type CursorResult<T> = Result<T, CursorError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CursorError {
    #[error("Invalid cursor format")]
    InvalidFormat,

    #[error("Unsupported cursor version: {0}")]
    UnsupportedVersion(u64),

    #[error("Query or format does not match the cursor. Re-run the query without a cursor")]
    QueryMismatch,

    #[error("Cursor has expired ({age_seconds}s old, limit {ttl_seconds}s)")]
    Expired { age_seconds: u64, ttl_seconds: u64 },

    #[error("failed to hash query: {0}")]
    Hash(String),
}

/// Where a resumed execution picks up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ResumeState {
    /// The base fetch stopped early at a page boundary.
    Streaming {
        /// Remote page token of the page to re-read. `None` is the first page.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page_token: Option<String>,
        /// Records of that page already delivered.
        skip: usize,
        /// Index of the parent (list) being read.
        #[serde(default)]
        parent_index: usize,
        /// Records delivered over all previous pages.
        delivered: usize,
    },
    /// The full result was computed; resume by skipping delivered rows.
    FullFetch {
        skip: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<usize>,
    },
}

impl ResumeState {
    pub fn mode(&self) -> &'static str {
        match self {
            ResumeState::Streaming { .. } => "streaming",
            ResumeState::FullFetch { .. } => "full-fetch",
        }
    }

    /// Rows delivered before this cursor.
    pub fn delivered(&self) -> usize {
        match self {
            ResumeState::Streaming { delivered, .. } => *delivered,
            ResumeState::FullFetch { skip, .. } => *skip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorPayload {
    pub v: u32,
    #[serde(rename = "qh")]
    pub query_hash: String,
    #[serde(rename = "rs")]
    pub resume_state: ResumeState,
    /// Issue time, milliseconds since the Unix epoch.
    #[serde(rename = "ts")]
    pub issued_at: u64,
}

impl CursorPayload {
    /// A payload issued now.
    pub fn new(query_hash: impl Into<String>, resume_state: ResumeState) -> Self {
        Self::issued_at(query_hash, resume_state, now_millis())
    }

    pub fn issued_at(
        query_hash: impl Into<String>,
        resume_state: ResumeState,
        issued_at: u64,
    ) -> Self {
        Self {
            v: CURSOR_VERSION,
            query_hash: query_hash.into(),
            resume_state,
            issued_at,
        }
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// SHA256 hex over the canonical JSON of a query and its output format.
pub fn hash_query(query: &Query, format: &str) -> CursorResult<String> {
    let canonical = serde_json::to_string(&json!({ "query": query, "format": format }))
        .map_err(|e| CursorError::Hash(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Encode a payload into an opaque token.
pub fn encode(payload: &CursorPayload) -> CursorResult<String> {
    let bytes = serde_json::to_vec(payload).map_err(|e| CursorError::Hash(e.to_string()))?;
    Ok(BASE64.encode(bytes))
}

/// Decode a token issued for `query` in `format`, checking hash and age.
pub fn decode(token: &str, query: &Query, format: &str) -> CursorResult<CursorPayload> {
    decode_at(token, &hash_query(query, format)?, now_millis())
}

/// Decode against an expected query hash at a given wall-clock time.
pub fn decode_at(token: &str, expected_hash: &str, now_ms: u64) -> CursorResult<CursorPayload> {
    let bytes = BASE64
        .decode(token.trim())
        .map_err(|_| CursorError::InvalidFormat)?;
    let raw: Value = serde_json::from_slice(&bytes).map_err(|_| CursorError::InvalidFormat)?;

    match raw.get("v").and_then(Value::as_u64) {
        Some(v) if v == u64::from(CURSOR_VERSION) => {}
        Some(other) => return Err(CursorError::UnsupportedVersion(other)),
        None => return Err(CursorError::InvalidFormat),
    }

    let payload: CursorPayload =
        serde_json::from_value(raw).map_err(|_| CursorError::InvalidFormat)?;

    if payload.query_hash != expected_hash {
        return Err(CursorError::QueryMismatch);
    }

    let age_seconds = now_ms.saturating_sub(payload.issued_at) / 1000;
    if now_ms.saturating_sub(payload.issued_at) > CURSOR_TTL_SECONDS * 1000 {
        return Err(CursorError::Expired {
            age_seconds,
            ttl_seconds: CURSOR_TTL_SECONDS,
        });
    }

    log::debug!(
        "resuming from {} cursor ({} rows delivered)",
        payload.resume_state.mode(),
        payload.resume_state.delivered()
    );
    Ok(payload)
}

/// One NDJSON line announcing a cursor, for stderr.
pub fn emit_cursor_line(cursor: &str, mode: &str) -> String {
    json!({ "type": "cursor", "cursor": cursor, "mode": mode }).to_string()
}
