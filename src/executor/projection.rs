//! Record shaping: list-entry field normalization, computed fields and
//! `select` projection.

use serde_json::{Map, Value};

use crate::filter::{resolve_path, FIELDS_PREFIX};

/// Lift `entity.fields.data` of a list entry into a top-level `fields` map
/// keyed by field name.
///
/// Dropdown values become their text; multi-select values become a list of
/// texts. Records without field data are returned unchanged.
pub fn normalize_list_entry_fields(mut record: Value) -> Value {
    let Some(data) = record
        .get("entity")
        .and_then(|e| e.get("fields"))
        .and_then(|f| f.get("data"))
        .and_then(Value::as_object)
    else {
        return record;
    };

    let mut fields = Map::new();
    for field in data.values() {
        let Some(name) = field.get("name").and_then(Value::as_str) else {
            continue;
        };
        fields.insert(name.to_string(), field_value(field.get("value")));
    }

    if !fields.is_empty() {
        if let Some(obj) = record.as_object_mut() {
            obj.insert("fields".to_string(), Value::Object(fields));
        }
    }
    record
}

fn dropdown_text(value: &Value) -> Value {
    match value.get("text") {
        Some(text) if value.is_object() => text.clone(),
        _ => value.clone(),
    }
}

fn field_value(wrapper: Option<&Value>) -> Value {
    match wrapper {
        None | Some(Value::Null) => Value::Null,
        Some(Value::Object(obj)) => match obj.get("data") {
            Some(Value::Array(items)) => Value::Array(items.iter().map(dropdown_text).collect()),
            Some(data) => dropdown_text(data),
            None => Value::Null,
        },
        Some(other) => other.clone(),
    }
}

/// Derive `firstEmail`/`lastEmail` from `emails` when absent.
pub fn add_computed_fields(mut record: Value) -> Value {
    let emails: Vec<Value> = match record.get("emails") {
        Some(Value::Array(items)) => items.iter().filter(|e| e.is_string()).cloned().collect(),
        _ => return record,
    };
    if let Some(obj) = record.as_object_mut() {
        if let Some(first) = emails.first() {
            obj.entry("firstEmail").or_insert_with(|| first.clone());
        }
        if let Some(last) = emails.last() {
            obj.entry("lastEmail").or_insert_with(|| last.clone());
        }
    }
    record
}

/// Write `value` at a dotted path, creating intermediate objects.
///
/// A `fields.` path keeps the rest as one key, matching how it is read.
pub fn set_nested(target: &mut Map<String, Value>, path: &str, value: Value) {
    let parts: Vec<&str> = match path.strip_prefix(FIELDS_PREFIX) {
        Some(name) => vec!["fields", name],
        None => path.split('.').collect(),
    };
    let Some((last, parents)) = parts.split_last() else {
        return;
    };
    let mut current = target;
    for part in parents {
        let slot = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => current = map,
            _ => return,
        }
    }
    current.insert(last.to_string(), value);
}

/// Keep only the selected paths of every record.
///
/// `fields.*` copies the whole custom-field map. Absent and null values are
/// left out.
pub fn project(records: Vec<Value>, select: &[String]) -> Vec<Value> {
    if select.is_empty() {
        return records;
    }
    let all_fields = select.iter().any(|p| p == "fields.*");
    records
        .iter()
        .map(|record| {
            let mut out = Map::new();
            for path in select.iter().filter(|p| *p != "fields.*") {
                match resolve_path(record, path) {
                    Some(Value::Null) | None => {}
                    Some(value) => set_nested(&mut out, path, value.clone()),
                }
            }
            if all_fields {
                if let Some(fields) = record.get("fields") {
                    out.insert("fields".to_string(), fields.clone());
                }
            }
            Value::Object(out)
        })
        .collect()
}
