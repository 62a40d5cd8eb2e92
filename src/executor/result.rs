//! Query results.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Continuation metadata attached to a partial result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub has_more: bool,
    pub cursor: String,
    /// `streaming` or `full-fetch`.
    pub mode: String,
}

/// Execution statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMeta {
    pub execution_time_ms: u64,
    pub records_fetched: usize,
    pub api_calls: usize,
}

/// Output of one query execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Primary records, or aggregate rows.
    pub data: Vec<Value>,
    /// Related records requested via `include`, keyed by relationship.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub included: BTreeMap<String, Vec<Value>>,
    /// Aggregate values of an ungrouped aggregate query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregates: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub meta: ResultMeta,
}

impl QueryResult {
    pub fn new(data: Vec<Value>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.pagination.as_ref().is_some_and(|p| p.has_more)
    }
}
