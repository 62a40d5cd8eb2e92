//! Client-side aggregation, grouping and `having`.
//!
//! Primitive aggregates are computed first in declaration order, then
//! derived arithmetic is evaluated over the already-computed values:
//!
//! ```text
//! records ──▶ sum/avg/count/min/max/percentile/first/last ──▶ add/subtract/multiply/divide ──▶ row
//! ```

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::cmp::Ordering;

use crate::filter::{equality_key, matches, ordering, resolve_path};
use crate::query::WhereClause;

/// Group label for records whose group key is absent or null.
pub const NO_VALUE: &str = "(no value)";

/// `count` target: `true` counts records, a field counts non-null values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CountTarget {
    Records(bool),
    Field(String),
}

/// Operand of a derived aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Literal(f64),
    Name(String),
}

/// One aggregate function, in its JSON shape (`{"sum": "amount"}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunc {
    Sum(String),
    Avg(String),
    Count(CountTarget),
    Min(String),
    Max(String),
    Percentile { field: String, p: f64 },
    First(String),
    Last(String),
    Multiply(Vec<Operand>),
    Divide(Vec<Operand>),
    Add(Vec<Operand>),
    Subtract(Vec<Operand>),
}

impl AggregateFunc {
    pub fn is_derived(&self) -> bool {
        matches!(
            self,
            AggregateFunc::Multiply(_)
                | AggregateFunc::Divide(_)
                | AggregateFunc::Add(_)
                | AggregateFunc::Subtract(_)
        )
    }

    /// Record field this aggregate reads, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            AggregateFunc::Sum(f)
            | AggregateFunc::Avg(f)
            | AggregateFunc::Min(f)
            | AggregateFunc::Max(f)
            | AggregateFunc::First(f)
            | AggregateFunc::Last(f)
            | AggregateFunc::Count(CountTarget::Field(f))
            | AggregateFunc::Percentile { field: f, .. } => Some(f),
            _ => None,
        }
    }

    /// Operands of a derived aggregate; empty for primitives.
    pub fn operands(&self) -> &[Operand] {
        match self {
            AggregateFunc::Multiply(ops)
            | AggregateFunc::Divide(ops)
            | AggregateFunc::Add(ops)
            | AggregateFunc::Subtract(ops) => ops,
            _ => &[],
        }
    }
}

/// Named aggregates in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aggregates(Vec<(String, AggregateFunc)>);

impl Aggregates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, func: AggregateFunc) -> Self {
        self.push(name, func);
        self
    }

    /// Insert or replace an aggregate, keeping its original position.
    pub fn push(&mut self, name: impl Into<String>, func: AggregateFunc) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = func,
            None => self.0.push((name, func)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AggregateFunc> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AggregateFunc)> {
        self.0.iter().map(|(n, f)| (n.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Aggregates {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, func) in &self.0 {
            map.serialize_entry(name, func)?;
        }
        map.end()
    }
}

fn numbers<'a>(records: &'a [Value], field: &'a str) -> impl Iterator<Item = f64> + 'a {
    records
        .iter()
        .filter_map(move |r| resolve_path(r, field))
        .filter_map(Value::as_f64)
}

fn float(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn extreme(records: &[Value], field: &str, want: Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for value in records
        .iter()
        .filter_map(|r| resolve_path(r, field))
        .filter(|v| !v.is_null())
    {
        best = match best {
            None => Some(value),
            Some(current) if ordering(Some(value), Some(current)) == Some(want) => Some(value),
            keep => keep,
        };
    }
    best.cloned().unwrap_or(Value::Null)
}

/// Linear interpolation percentile over sorted values, `p` in `[0, 100]`.
pub fn percentile(values: &mut [f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let rank = (values.len() - 1) as f64 * (p.clamp(0.0, 100.0) / 100.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(values[lower] + (values[upper] - values[lower]) * weight)
}

fn compute_primitive(records: &[Value], func: &AggregateFunc) -> Value {
    match func {
        AggregateFunc::Sum(field) => float(numbers(records, field).sum()),
        AggregateFunc::Avg(field) => {
            let (total, n) = numbers(records, field)
                .fold((0.0, 0usize), |(t, n), v| (t + v, n + 1));
            if n == 0 {
                Value::Null
            } else {
                float(total / n as f64)
            }
        }
        AggregateFunc::Count(CountTarget::Records(_)) => Value::from(records.len()),
        AggregateFunc::Count(CountTarget::Field(field)) => Value::from(
            records
                .iter()
                .filter(|r| resolve_path(r, field).is_some_and(|v| !v.is_null()))
                .count(),
        ),
        AggregateFunc::Min(field) => extreme(records, field, Ordering::Less),
        AggregateFunc::Max(field) => extreme(records, field, Ordering::Greater),
        AggregateFunc::Percentile { field, p } => {
            let mut values: Vec<f64> = numbers(records, field).collect();
            percentile(&mut values, *p).map_or(Value::Null, float)
        }
        AggregateFunc::First(field) => records
            .iter()
            .find_map(|r| resolve_path(r, field))
            .cloned()
            .unwrap_or(Value::Null),
        AggregateFunc::Last(field) => records
            .iter()
            .rev()
            .find_map(|r| resolve_path(r, field))
            .cloned()
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn compute_derived(func: &AggregateFunc, computed: &Map<String, Value>) -> Option<f64> {
    let values: Vec<f64> = func
        .operands()
        .iter()
        .map(|op| match op {
            Operand::Literal(n) => Some(*n),
            Operand::Name(name) => computed.get(name).and_then(Value::as_f64),
        })
        .collect::<Option<_>>()?;
    let (first, rest) = values.split_first()?;
    match func {
        AggregateFunc::Add(_) => Some(values.iter().sum()),
        AggregateFunc::Multiply(_) => Some(values.iter().product()),
        AggregateFunc::Subtract(_) => Some(rest.iter().fold(*first, |acc, v| acc - v)),
        AggregateFunc::Divide(_) => rest.iter().try_fold(*first, |acc, v| {
            if *v == 0.0 {
                None
            } else {
                Some(acc / v)
            }
        }),
        _ => None,
    }
}

/// Compute every aggregate over `records`.
///
/// Empty input yields `sum = 0.0`, `avg = null`, `count = 0`. Division by a
/// zero aggregate yields `null`.
pub fn compute_aggregates(records: &[Value], aggregates: &Aggregates) -> Map<String, Value> {
    let mut computed = Map::new();
    for (name, func) in aggregates.iter().filter(|(_, f)| !f.is_derived()) {
        computed.insert(name.to_string(), compute_primitive(records, func));
    }
    for (name, func) in aggregates.iter().filter(|(_, f)| f.is_derived()) {
        let value = compute_derived(func, &computed).map_or(Value::Null, float);
        computed.insert(name.to_string(), value);
    }

    // Declaration order, not evaluation order.
    aggregates
        .iter()
        .map(|(name, _)| {
            let value = computed.get(name).cloned().unwrap_or(Value::Null);
            (name.to_string(), value)
        })
        .collect()
}

/// Group records by `group_field` and aggregate each group.
///
/// Keys compare like `eq` in a where clause: numbers by value, everything
/// else by raw JSON equality. Groups keep first-seen order, except the
/// single `(no value)` group for absent or null keys, which is always last.
pub fn group_and_aggregate(
    records: &[Value],
    group_field: &str,
    aggregates: &Aggregates,
) -> Vec<Value> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
    let mut missing: Vec<Value> = Vec::new();

    for record in records {
        match resolve_path(record, group_field) {
            Some(key) if !key.is_null() => {
                let slot = *index.entry(equality_key(key)).or_insert_with(|| {
                    groups.push((key.clone(), Vec::new()));
                    groups.len() - 1
                });
                groups[slot].1.push(record.clone());
            }
            _ => missing.push(record.clone()),
        }
    }

    let mut rows = Vec::with_capacity(groups.len() + 1);
    for (key, members) in groups {
        rows.push(group_row(group_field, key, &members, aggregates));
    }
    if !missing.is_empty() {
        rows.push(group_row(
            group_field,
            Value::String(NO_VALUE.to_string()),
            &missing,
            aggregates,
        ));
    }
    rows
}

fn group_row(field: &str, key: Value, members: &[Value], aggregates: &Aggregates) -> Value {
    let mut row = Map::new();
    row.insert(field.to_string(), key);
    row.extend(compute_aggregates(members, aggregates));
    Value::Object(row)
}

/// Keep aggregated rows matching `having`.
pub fn apply_having(rows: Vec<Value>, having: &WhereClause) -> Vec<Value> {
    rows.into_iter()
        .filter(|row| matches(row, Some(having)))
        .collect()
}
