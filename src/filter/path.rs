//! Field path resolution against JSON records.

use serde_json::Value;
use std::borrow::Cow;

/// Prefix for tenant-defined custom fields on list entries.
pub const FIELDS_PREFIX: &str = "fields.";

/// Suffix that turns a relationship path into its row count.
pub const COUNT_SUFFIX: &str = "._count";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

fn segments(path: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    for part in path.split('.') {
        let mut rest = part;
        while !rest.is_empty() {
            match rest.find('[') {
                Some(0) => match rest.find(']') {
                    Some(end) => {
                        let inner = &rest[1..end];
                        out.push(match inner.parse::<usize>() {
                            Ok(idx) => Segment::Index(idx),
                            Err(_) => Segment::Key(inner),
                        });
                        rest = &rest[end + 1..];
                    }
                    None => {
                        out.push(Segment::Key(rest));
                        rest = "";
                    }
                },
                Some(open) => {
                    out.push(Segment::Key(&rest[..open]));
                    rest = &rest[open..];
                }
                None => {
                    out.push(Segment::Key(rest));
                    rest = "";
                }
            }
        }
    }
    out
}

/// Resolve a dotted path such as `address.city`, `emails[0]` or `fields.Status`.
///
/// Returns `None` when any segment is missing or an index is out of range.
/// A present JSON `null` resolves to `Some(&Value::Null)`.
pub fn resolve_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    if let Some(name) = path.strip_prefix(FIELDS_PREFIX) {
        return record.get("fields")?.get(name);
    }

    let mut current = record;
    for segment in segments(path) {
        current = match segment {
            Segment::Key(key) => current.as_object()?.get(key)?,
            Segment::Index(idx) => current.as_array()?.get(idx)?,
        };
    }
    Some(current)
}

/// Like [`resolve_path`], but also answers `<path>._count` with the length of
/// the array at `<path>`. An absent array counts as zero.
pub fn resolve_value<'a>(record: &'a Value, path: &str) -> Option<Cow<'a, Value>> {
    if let Some(base) = path.strip_suffix(COUNT_SUFFIX) {
        let count = match resolve_path(record, base) {
            Some(Value::Array(items)) => items.len(),
            Some(Value::Null) | None => 0,
            Some(_) => return None,
        };
        return Some(Cow::Owned(Value::from(count)));
    }
    resolve_path(record, path).map(Cow::Borrowed)
}
