//! Per-execution state.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crate::cursor::ResumeState;
use crate::filter::equality_key;

/// A working record and the relationship rows fetched for it.
#[derive(Debug, Clone)]
pub(crate) struct Row {
    pub record: Value,
    pub related: BTreeMap<String, Vec<Value>>,
}

impl Row {
    pub fn new(record: Value) -> Self {
        Self {
            record,
            related: BTreeMap::new(),
        }
    }

    /// The record with related rows merged in under their relationship names,
    /// so `exists`, `all`/`none` and `_count` can resolve them.
    pub fn view(&self) -> Value {
        if self.related.is_empty() {
            return self.record.clone();
        }
        let mut merged = match &self.record {
            Value::Object(obj) => obj.clone(),
            _ => Map::new(),
        };
        for (name, rows) in &self.related {
            merged.insert(name.clone(), Value::Array(rows.clone()));
        }
        Value::Object(merged)
    }
}

/// Counters shared by the concurrent tasks of one step.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    api_calls: AtomicUsize,
    records: AtomicUsize,
}

impl Counters {
    pub fn record_call(&self) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Add fetched records, returning the new total.
    pub fn add_records(&self, n: usize) -> usize {
        self.records.fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn api_calls(&self) -> usize {
        self.api_calls.load(Ordering::Relaxed)
    }

    pub fn records(&self) -> usize {
        self.records.load(Ordering::Relaxed)
    }
}

pub(crate) struct ExecutionContext {
    pub rows: Vec<Row>,
    pub included: BTreeMap<String, Vec<Value>>,
    /// Dedupe keys of the rows in `included`, per relationship.
    included_keys: BTreeMap<String, HashSet<String>>,
    pub aggregates: Option<Map<String, Value>>,
    pub counters: Counters,
    pub warnings: Vec<String>,
    pub started: Instant,
    /// State this execution resumes from.
    pub resume: Option<ResumeState>,
    /// State a follow-up execution should resume from.
    pub next_resume: Option<ResumeState>,
}

impl ExecutionContext {
    pub fn new(resume: Option<ResumeState>, warnings: Vec<String>) -> Self {
        Self {
            rows: Vec::new(),
            included: BTreeMap::new(),
            included_keys: BTreeMap::new(),
            aggregates: None,
            counters: Counters::default(),
            warnings,
            started: Instant::now(),
            resume,
            next_resume: None,
        }
    }

    /// Append included rows, skipping ones already present by `id`.
    ///
    /// Rows without an id dedupe on their whole JSON value.
    pub fn add_included(&mut self, name: &str, rows: Vec<Value>) {
        let target = self.included.entry(name.to_string()).or_default();
        let seen = self.included_keys.entry(name.to_string()).or_default();
        for row in rows {
            let key = match row.get("id").filter(|id| !id.is_null()) {
                Some(id) => format!("id:{}", equality_key(id)),
                None => format!("row:{}", row),
            };
            if seen.insert(key) {
                target.push(row);
            }
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
