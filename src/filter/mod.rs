//! Client-side filter evaluation.
//!
//! Two entry points with identical semantics: [`compile`] turns a clause into
//! a reusable boxed predicate, [`matches`] walks the tree directly.

mod compare;
mod path;

pub use compare::{compare, equality_key, ordering, values_equal};
pub use path::{resolve_path, resolve_value, COUNT_SUFFIX, FIELDS_PREFIX};

use serde_json::Value;

use crate::query::{Condition, Exists, Quantifier, WhereClause};

/// A compiled filter.
pub type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// Compile a where clause into a predicate.
pub fn compile(clause: &WhereClause) -> Predicate {
    match clause {
        WhereClause::Comparison(condition) => {
            let Condition { path, op, value } = condition.clone();
            Box::new(move |record| {
                compare(resolve_value(record, &path).as_deref(), op, value.as_ref())
            })
        }
        WhereClause::And { and } => {
            let parts: Vec<Predicate> = and.iter().map(compile).collect();
            Box::new(move |record| parts.iter().all(|p| p(record)))
        }
        WhereClause::Or { or } => {
            let parts: Vec<Predicate> = or.iter().map(compile).collect();
            Box::new(move |record| parts.iter().any(|p| p(record)))
        }
        WhereClause::Not { not } => {
            let inner = compile(not);
            Box::new(move |record| !inner(record))
        }
        WhereClause::All { all } => {
            let path = all.path.clone();
            let inner = compile(&all.condition);
            Box::new(move |record| elements(record, &path).iter().all(|e| inner(e)))
        }
        WhereClause::None { none } => {
            let path = none.path.clone();
            let inner = compile(&none.condition);
            Box::new(move |record| !elements(record, &path).iter().any(|e| inner(e)))
        }
        WhereClause::Exists { exists } => {
            let key = exists.key().to_string();
            let inner = exists.condition.as_deref().map(compile);
            Box::new(move |record| {
                let rows = elements(record, &key);
                match &inner {
                    Some(pred) => rows.iter().any(|e| pred(e)),
                    None => !rows.is_empty(),
                }
            })
        }
    }
}

/// Evaluate a clause against one record. No clause matches everything.
pub fn matches(record: &Value, clause: Option<&WhereClause>) -> bool {
    clause.map_or(true, |c| evaluate(record, c))
}

fn evaluate(record: &Value, clause: &WhereClause) -> bool {
    match clause {
        WhereClause::Comparison(c) => compare(
            resolve_value(record, &c.path).as_deref(),
            c.op,
            c.value.as_ref(),
        ),
        WhereClause::And { and } => and.iter().all(|c| evaluate(record, c)),
        WhereClause::Or { or } => or.iter().any(|c| evaluate(record, c)),
        WhereClause::Not { not } => !evaluate(record, not),
        WhereClause::All {
            all: Quantifier { path, condition },
        } => elements(record, path).iter().all(|e| evaluate(e, condition)),
        WhereClause::None {
            none: Quantifier { path, condition },
        } => !elements(record, path).iter().any(|e| evaluate(e, condition)),
        WhereClause::Exists { exists } => exists_in(record, exists),
    }
}

fn exists_in(record: &Value, exists: &Exists) -> bool {
    let rows = elements(record, exists.key());
    match &exists.condition {
        Some(inner) => rows.iter().any(|e| evaluate(e, inner)),
        None => !rows.is_empty(),
    }
}

/// Elements a quantifier ranges over. Absent or null is empty; a scalar or
/// object is a single element.
fn elements<'a>(record: &'a Value, path: &str) -> &'a [Value] {
    match resolve_path(record, path) {
        Some(Value::Array(items)) => items.as_slice(),
        Some(Value::Null) | None => &[],
        Some(other) => std::slice::from_ref(other),
    }
}
