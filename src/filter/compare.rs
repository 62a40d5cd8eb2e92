//! Operator semantics over resolved JSON values.

use serde_json::Value;
use std::cmp::Ordering;

use crate::query::Operator;

/// Evaluate `field op target`. An absent field behaves like `null`.
pub fn compare(field: Option<&Value>, op: Operator, target: Option<&Value>) -> bool {
    let field = field.filter(|v| !v.is_null());
    match op {
        Operator::Eq => values_equal(field, target),
        Operator::Neq => !values_equal(field, target),
        Operator::Gt => ordering(field, target) == Some(Ordering::Greater),
        Operator::Gte => matches!(
            ordering(field, target),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::Lt => ordering(field, target) == Some(Ordering::Less),
        Operator::Lte => matches!(
            ordering(field, target),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Contains => string_test(field, target, |hay, needle| hay.contains(needle)),
        Operator::StartsWith => string_test(field, target, |hay, needle| hay.starts_with(needle)),
        Operator::EndsWith => string_test(field, target, |hay, needle| hay.ends_with(needle)),
        Operator::In => match target {
            Some(Value::Array(options)) => options.iter().any(|o| values_equal(field, Some(o))),
            _ => false,
        },
        Operator::Between => match target {
            Some(Value::Array(bounds)) if bounds.len() == 2 => {
                matches!(
                    ordering(field, Some(&bounds[0])),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && matches!(
                    ordering(field, Some(&bounds[1])),
                    Some(Ordering::Less | Ordering::Equal)
                )
            }
            _ => false,
        },
        Operator::IsNull => field.is_none(),
        Operator::IsNotNull => field.is_some(),
        Operator::IsEmpty => match field {
            None => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        },
        Operator::ContainsAny => term_test(field, target, false),
        Operator::ContainsAll => term_test(field, target, true),
        Operator::HasAny => membership(field, target, false),
        Operator::HasAll => membership(field, target, true),
    }
}

/// Null-aware equality. Numbers compare by value regardless of int/float.
pub fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => true,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x.as_f64() == y.as_f64(),
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Hashable key consistent with [`values_equal`]: numbers key by their
/// `f64` value, so `1` and `1.0` share a key while `"1"` does not.
pub fn equality_key(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) => f.to_string(),
            None => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Typed ordering. Mismatched types and nulls are unordered.
pub fn ordering(a: Option<&Value>, b: Option<&Value>) -> Option<Ordering> {
    match (a?, b?) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn string_test(
    field: Option<&Value>,
    target: Option<&Value>,
    test: fn(&str, &str) -> bool,
) -> bool {
    match (field, target) {
        (Some(Value::String(hay)), Some(Value::String(needle))) => {
            test(&hay.to_lowercase(), &needle.to_lowercase())
        }
        _ => false,
    }
}

fn lowered_terms(target: Option<&Value>) -> Option<Vec<String>> {
    match target {
        Some(Value::Array(terms)) => Some(
            terms
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_lowercase)
                .collect(),
        ),
        Some(Value::String(term)) => Some(vec![term.to_lowercase()]),
        _ => None,
    }
}

/// Substring-set test. The scalar string field is the primary case; a list of
/// strings matches a term when any element contains it.
fn term_test(field: Option<&Value>, target: Option<&Value>, require_all: bool) -> bool {
    let Some(terms) = lowered_terms(target) else {
        return false;
    };
    let haystacks: Vec<String> = match field {
        Some(Value::String(s)) => vec![s.to_lowercase()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_lowercase)
            .collect(),
        _ => return false,
    };
    let hit = |term: &String| haystacks.iter().any(|h| h.contains(term.as_str()));
    if require_all {
        terms.iter().all(hit)
    } else {
        terms.iter().any(hit)
    }
}

/// Exact element membership over a list-valued field.
fn membership(field: Option<&Value>, target: Option<&Value>, require_all: bool) -> bool {
    let (Some(Value::Array(items)), Some(Value::Array(wanted))) = (field, target) else {
        return false;
    };
    let present = |w: &Value| items.iter().any(|i| values_equal(Some(i), Some(w)));
    if require_all {
        wanted.iter().all(present)
    } else {
        wanted.iter().any(present)
    }
}
