use crmql::cursor::{
    decode, decode_at, emit_cursor_line, encode, hash_query, now_millis, CursorError, CursorPayload,
    ResumeState, CURSOR_TTL_SECONDS,
};
use crmql::query::{parse_query, Query};
use serde_json::{json, Value};

fn query() -> Query {
    parse_query(&json!({"$version": "1.0", "from": "persons", "limit": 10}), None)
        .unwrap()
        .query
}

fn streaming() -> ResumeState {
    ResumeState::Streaming {
        page_token: Some("offset:100".into()),
        skip: 10,
        parent_index: 0,
        delivered: 10,
    }
}

#[test]
fn test_token_resumes_same_query() {
    let q = query();
    let hash = hash_query(&q, "toon").unwrap();
    let token = encode(&CursorPayload::new(hash, streaming())).unwrap();
    assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));

    let payload = decode(&token, &q, "toon").unwrap();
    assert_eq!(payload.resume_state, streaming());
    assert_eq!(payload.resume_state.mode(), "streaming");
    assert_eq!(payload.resume_state.delivered(), 10);
}

#[test]
fn test_query_mismatch() {
    let hash = hash_query(&query(), "toon").unwrap();
    let token = encode(&CursorPayload::new(hash, streaming())).unwrap();

    let mut other = query();
    other.limit = Some(20);
    assert!(matches!(decode(&token, &other, "toon"), Err(CursorError::QueryMismatch)));
    assert!(matches!(decode(&token, &query(), "csv"), Err(CursorError::QueryMismatch)));
}

#[test]
fn test_expiry_boundary() {
    let issued = 1_700_000_000_000;
    let token = encode(&CursorPayload::issued_at("h", streaming(), issued)).unwrap();
    let ttl_ms = CURSOR_TTL_SECONDS * 1000;

    assert!(decode_at(&token, "h", issued + ttl_ms).is_ok());
    match decode_at(&token, "h", issued + ttl_ms + 1) {
        Err(CursorError::Expired { ttl_seconds, .. }) => {
            assert_eq!(ttl_seconds, CURSOR_TTL_SECONDS)
        }
        other => panic!("expected expiry, got {:?}", other),
    }
}

#[test]
fn test_malformed_tokens() {
    assert!(matches!(
        decode_at("not base64!!", "h", now_millis()),
        Err(CursorError::InvalidFormat)
    ));

    let garbage = encode_raw(&json!(["not", "an", "object"]));
    assert!(matches!(decode_at(&garbage, "h", now_millis()), Err(CursorError::InvalidFormat)));
}

#[test]
fn test_unsupported_version() {
    let mut payload = CursorPayload::new("h", streaming());
    payload.v = 7;
    let token = encode(&payload).unwrap();
    assert!(matches!(
        decode_at(&token, "h", now_millis()),
        Err(CursorError::UnsupportedVersion(7))
    ));
}

#[test]
fn test_full_fetch_state_shape() {
    let state = ResumeState::FullFetch {
        skip: 40,
        total: Some(100),
    };
    let payload = CursorPayload::issued_at("h", state, 5);
    let value = serde_json::to_value(&payload).unwrap();
    assert_eq!(
        value,
        json!({"v": 1, "qh": "h", "rs": {"mode": "full-fetch", "skip": 40, "total": 100}, "ts": 5})
    );
}

#[test]
fn test_cursor_line() {
    let line: Value = serde_json::from_str(&emit_cursor_line("abc", "full-fetch")).unwrap();
    assert_eq!(line, json!({"type": "cursor", "cursor": "abc", "mode": "full-fetch"}));
}

fn encode_raw(value: &Value) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    URL_SAFE_NO_PAD.encode(value.to_string())
}
