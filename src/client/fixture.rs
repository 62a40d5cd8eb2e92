//! In-memory client backed by a JSON document.
//!
//! ```json
//! {
//!   "entities": {"persons": [{"id": 1, "firstName": "Ada"}]},
//!   "listEntries": {"12": [{"id": 100, "entityId": 1}]},
//!   "lists": [{"id": 12, "name": "Deals"}],
//!   "associations": {"persons.get_associated_company_ids": {"1": [10, 11]}},
//!   "expansions": {"persons.interactionDates": {"1": {"lastInteraction": "2024-01-02"}}},
//!   "pageSize": 50
//! }
//! ```
//!
//! Page tokens are `offset:<n>`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ClientError, ClientResult, CrmClient, ListInfo, ListRequest, Page};
use crate::filter::values_equal;

fn default_page_size() -> usize {
    100
}

/// Fixture document layout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureData {
    #[serde(default)]
    pub entities: BTreeMap<String, Vec<Value>>,
    /// List id → entries.
    #[serde(default)]
    pub list_entries: BTreeMap<String, Vec<Value>>,
    #[serde(default)]
    pub lists: Vec<ListInfo>,
    /// `"<entity>.<method>"` → source id → related ids or records.
    #[serde(default)]
    pub associations: BTreeMap<String, BTreeMap<String, Vec<Value>>>,
    /// `"<entity>.<expansion>"` → source id → enrichment.
    #[serde(default)]
    pub expansions: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// A [`CrmClient`] serving fixture data.
#[derive(Debug, Default)]
pub struct FixtureClient {
    data: FixtureData,
    calls: AtomicUsize,
}

/// Map key for an id value: strings verbatim, everything else as JSON.
fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_offset(cursor: Option<&str>) -> ClientResult<usize> {
    match cursor {
        None => Ok(0),
        Some(token) => token
            .strip_prefix("offset:")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| ClientError::Request(format!("invalid page token '{}'", token))),
    }
}

fn field_matches(record: &Value, field: &str, expected: &Value) -> bool {
    match record.get(field) {
        Some(Value::Array(items)) => items.iter().any(|i| values_equal(Some(i), Some(expected))),
        other => values_equal(other, Some(expected)),
    }
}

impl FixtureClient {
    pub fn new(data: FixtureData) -> Self {
        Self {
            data,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn from_value(value: Value) -> ClientResult<Self> {
        let data = serde_json::from_value(value).map_err(|e| ClientError::Fixture(e.to_string()))?;
        Ok(Self::new(data))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> ClientResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| ClientError::Fixture(format!("{}: {}", path.display(), e)))?;
        let data = serde_json::from_str(&text)
            .map_err(|e| ClientError::Fixture(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(data))
    }

    /// Number of remote calls served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn source(&self, entity: &str, request: &ListRequest) -> ClientResult<&[Value]> {
        if entity == "listEntries" {
            let parent = request
                .parent_id
                .as_ref()
                .ok_or_else(|| ClientError::Request("listEntries requires a list id".into()))?;
            return self
                .data
                .list_entries
                .get(&id_key(parent))
                .map(Vec::as_slice)
                .ok_or_else(|| ClientError::NotFound(format!("list {}", parent)));
        }
        Ok(self
            .data
            .entities
            .get(entity)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }
}

#[async_trait]
impl CrmClient for FixtureClient {
    async fn list(&self, entity: &str, request: &ListRequest) -> ClientResult<Page> {
        self.record_call();
        let matching: Vec<&Value> = self
            .source(entity, request)?
            .iter()
            .filter(|r| {
                request
                    .filters
                    .iter()
                    .all(|(field, expected)| field_matches(r, field, expected))
            })
            .collect();

        let offset = parse_offset(request.cursor.as_deref())?;
        let size = request
            .limit
            .unwrap_or(self.data.page_size)
            .clamp(1, self.data.page_size.max(1));
        let end = (offset + size).min(matching.len());
        let data = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|v| (*v).clone())
            .collect();
        let next_cursor = (end < matching.len()).then(|| format!("offset:{}", end));
        Ok(Page { data, next_cursor })
    }

    async fn get(&self, entity: &str, id: &Value) -> ClientResult<Value> {
        self.record_call();
        self.data
            .entities
            .get(entity)
            .and_then(|rows| {
                rows.iter()
                    .find(|r| values_equal(r.get("id"), Some(id)))
            })
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("{}/{}", entity, id)))
    }

    async fn associated(&self, entity: &str, method: &str, id: &Value) -> ClientResult<Vec<Value>> {
        self.record_call();
        let key = format!("{}.{}", entity, method);
        let table = self
            .data
            .associations
            .get(&key)
            .ok_or_else(|| ClientError::unsupported(key.clone()))?;
        Ok(table.get(&id_key(id)).cloned().unwrap_or_default())
    }

    async fn expansion(&self, entity: &str, name: &str, id: &Value) -> ClientResult<Value> {
        self.record_call();
        let key = format!("{}.{}", entity, name);
        let table = self
            .data
            .expansions
            .get(&key)
            .ok_or_else(|| ClientError::unsupported(key.clone()))?;
        Ok(table.get(&id_key(id)).cloned().unwrap_or(Value::Null))
    }

    async fn lists(&self) -> ClientResult<Vec<ListInfo>> {
        self.record_call();
        Ok(self.data.lists.clone())
    }
}
