//! JSON query parsing and validation.
//!
//! Validation order: JSON shape, `$version`, `from`, `where`, the list
//! entry selector, `aggregate`/`groupBy`, option conflicts, `having`,
//! `include`/`expand`, `select`, `orderBy`, `limit`. Nothing here touches the
//! network.

use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use super::error::{EngineResult, QueryError};
use super::model::{
    Condition, Direction, Exists, Operator, OrderBy, Quantifier, Query, WhereClause,
    CURRENT_VERSION, SUPPORTED_VERSIONS,
};
use crate::aggregate::{AggregateFunc, Aggregates, CountTarget, Operand};
use crate::planner;
use crate::schema::{self, EntityFetch, EntitySchema};

const QUERY_KEYS: &[&str] = &[
    "$version",
    "from",
    "where",
    "select",
    "include",
    "expand",
    "orderBy",
    "groupBy",
    "aggregate",
    "having",
    "limit",
];

const COMPOUND_KEYS: &[&str] = &["and", "or", "not", "all", "none", "exists"];

/// A parsed query plus non-fatal warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    pub query: Query,
    pub warnings: Vec<String>,
}

/// What a where-clause path is checked against.
#[derive(Clone, Copy)]
enum Scope<'a> {
    Entity(&'static EntitySchema),
    /// Aggregated rows: only these column names exist.
    Rows(&'a [String]),
    /// Elements of an array field without a static schema.
    Any,
}

/// Parse JSON text into a validated query.
pub fn parse_query_str(text: &str, version_override: Option<&str>) -> EngineResult<ParseResult> {
    let raw: Value = serde_json::from_str(text)
        .map_err(|e| QueryError::parse(format!("Invalid JSON: {}", e)))?;
    parse_query(&raw, version_override)
}

/// Read and parse a query file.
pub fn parse_query_file(path: &Path, version_override: Option<&str>) -> EngineResult<ParseResult> {
    let text = fs::read_to_string(path).map_err(|e| {
        QueryError::parse(format!(
            "Failed to read query file '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse_query_str(&text, version_override)
}

/// Validate a raw JSON query.
pub fn parse_query(raw: &Value, version_override: Option<&str>) -> EngineResult<ParseResult> {
    let obj = raw
        .as_object()
        .ok_or_else(|| QueryError::parse("Query must be a JSON object"))?;
    let mut warnings = Vec::new();

    let version = parse_version(obj, version_override, &mut warnings)?;
    let entity = parse_from(obj)?;

    if let Some(key) = obj.keys().find(|k| !QUERY_KEYS.contains(&k.as_str())) {
        return Err(QueryError::validation_at(
            format!(
                "Unknown query key '{}'. Valid keys: {}",
                key,
                QUERY_KEYS.join(", ")
            ),
            key.clone(),
        ));
    }

    let filter = present(obj, "where")
        .map(|w| parse_where(w, Scope::Entity(entity)))
        .transpose()?;

    if let EntityFetch::RequiresParent {
        filter_field,
        name_field,
    } = entity.fetch
    {
        let selector = match &filter {
            Some(w) => planner::parent_selector(w, filter_field, name_field)?,
            None => None,
        };
        if !selector.is_some_and(|s| !s.is_empty()) {
            return Err(missing_selector(entity.name, filter_field, name_field));
        }
    }

    let aggregate = present(obj, "aggregate")
        .map(|a| parse_aggregates(a, entity))
        .transpose()?;
    let group_by = present(obj, "groupBy")
        .map(|g| {
            let field = as_string(g, "groupBy")?;
            check_path(Scope::Entity(entity), &field)?;
            Ok::<_, QueryError>(field)
        })
        .transpose()?;
    let include = string_list(present(obj, "include"), "include")?;

    if aggregate.is_some() && !include.is_empty() {
        return Err(QueryError::validation_at(
            "Cannot use 'aggregate' with 'include'. Aggregation collapses records, so included relationships have nothing to attach to.",
            "include",
        ));
    }
    if aggregate.is_none() {
        if group_by.is_some() {
            return Err(QueryError::validation_at("'groupBy' requires 'aggregate'", "groupBy"));
        }
        if present(obj, "having").is_some() {
            return Err(QueryError::validation_at("'having' requires 'aggregate'", "having"));
        }
    }

    // Columns of an aggregated row.
    let row_columns: Vec<String> = aggregate
        .iter()
        .flat_map(|aggs| aggs.iter().map(|(name, _)| name.to_string()))
        .chain(group_by.iter().cloned())
        .collect();

    let having = present(obj, "having")
        .map(|h| parse_where(h, Scope::Rows(&row_columns)))
        .transpose()?;

    for name in &include {
        if !entity.relationships.contains_key(name.as_str()) {
            return Err(QueryError::validation_at(
                format!(
                    "Unknown relationship '{}' for entity '{}'. Available: {}",
                    name,
                    entity.name,
                    schema::get_entity_relationships(entity.name).join(", ")
                ),
                "include",
            ));
        }
    }

    let expand = string_list(present(obj, "expand"), "expand")?;
    for name in &expand {
        check_expansion(entity, name)?;
    }

    let select = present(obj, "select")
        .map(|s| string_list(Some(s), "select"))
        .transpose()?;
    if let Some(paths) = &select {
        for path in paths {
            let known = if aggregate.is_some() {
                row_columns.contains(path)
            } else {
                path == "fields.*"
                    || include.contains(path)
                    || expand.contains(path)
                    || schema::is_valid_field_path(entity.name, path)
            };
            if !known {
                return Err(QueryError::validation_at(
                    format!("Unknown field '{}' in select", path),
                    "select",
                ));
            }
        }
    }

    let order_scope = if aggregate.is_some() {
        Scope::Rows(&row_columns)
    } else {
        Scope::Entity(entity)
    };
    let order_by = match present(obj, "orderBy") {
        Some(value) => parse_order_by(value, order_scope)?,
        None => Vec::new(),
    };

    let limit = parse_limit(present(obj, "limit"), &mut warnings)?;

    let query = Query {
        version,
        from: entity.name.to_string(),
        filter,
        select,
        include,
        expand,
        order_by,
        group_by,
        aggregate,
        having,
        limit,
    };
    Ok(ParseResult { query, warnings })
}

/// Treat explicit `null` like an absent key.
fn present<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn parse_version(
    obj: &Map<String, Value>,
    version_override: Option<&str>,
    warnings: &mut Vec<String>,
) -> EngineResult<String> {
    let version = match (version_override, obj.get("$version")) {
        (Some(v), _) => v.to_string(),
        (None, None) => {
            warnings.push(format!(
                "Query missing '$version' field. Assuming version {}. Add \"$version\": \"{}\" to silence this warning.",
                CURRENT_VERSION, CURRENT_VERSION
            ));
            CURRENT_VERSION.to_string()
        }
        (None, Some(Value::String(v))) => v.clone(),
        (None, Some(other)) => other.to_string(),
    };

    if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
        return Err(QueryError::parse(format!(
            "Unsupported version: {}. Supported versions: {}",
            version,
            SUPPORTED_VERSIONS.join(", ")
        )));
    }
    Ok(version)
}

fn parse_from(obj: &Map<String, Value>) -> EngineResult<&'static EntitySchema> {
    let name = match obj.get("from") {
        Some(Value::String(name)) => name,
        Some(_) => return Err(QueryError::parse("'from' must be an entity name string")),
        None => {
            return Err(QueryError::parse(format!(
                "Query must specify 'from'. Supported entities: {}",
                schema::get_supported_entities().join(", ")
            )))
        }
    };
    schema::get_entity_schema(name).ok_or_else(|| {
        QueryError::validation_at(
            format!(
                "Unknown entity '{}'. Supported entities: {}",
                name,
                schema::get_supported_entities().join(", ")
            ),
            "from",
        )
    })
}

fn missing_selector(entity: &str, id_field: &str, name_field: &str) -> QueryError {
    QueryError::parse(format!(
        "Query for '{entity}' requires a '{id_field}' or '{name_field}' filter.\n\n\
         By ID:\n  {{\"from\": \"{entity}\", \"where\": {{\"path\": \"{id_field}\", \"op\": \"eq\", \"value\": 12345}}}}\n\n\
         By name:\n  {{\"from\": \"{entity}\", \"where\": {{\"path\": \"{name_field}\", \"op\": \"eq\", \"value\": \"My Pipeline\"}}}}"
    ))
}

fn parse_where(value: &Value, scope: Scope<'_>) -> EngineResult<WhereClause> {
    let obj = value
        .as_object()
        .ok_or_else(|| QueryError::validation("Where clause must be a JSON object"))?;

    let is_condition = obj.contains_key("op") || obj.contains_key("path");
    let kinds: Vec<&str> = COMPOUND_KEYS
        .iter()
        .copied()
        .filter(|k| obj.contains_key(*k))
        .collect();

    match (is_condition, kinds.as_slice()) {
        (true, []) => parse_condition(obj, scope).map(WhereClause::Comparison),
        (false, ["and"]) => Ok(WhereClause::and(parse_clause_list(&obj["and"], "and", scope)?)),
        (false, ["or"]) => Ok(WhereClause::or(parse_clause_list(&obj["or"], "or", scope)?)),
        (false, ["not"]) => Ok(WhereClause::negate(parse_where(&obj["not"], scope)?)),
        (false, ["all"]) => Ok(WhereClause::All {
            all: parse_quantifier(&obj["all"], "all", scope)?,
        }),
        (false, ["none"]) => Ok(WhereClause::None {
            none: parse_quantifier(&obj["none"], "none", scope)?,
        }),
        (false, ["exists"]) => Ok(WhereClause::Exists {
            exists: parse_exists(&obj["exists"], scope)?,
        }),
        (false, []) => Err(QueryError::validation(
            "Where clause is empty. Expected a condition or one of: and, or, not, all, none, exists",
        )),
        _ => Err(QueryError::validation(
            "Where clause must contain exactly one of: condition, and, or, not, all, none, exists",
        )),
    }
}

fn parse_clause_list(value: &Value, key: &str, scope: Scope<'_>) -> EngineResult<Vec<WhereClause>> {
    let items = value
        .as_array()
        .ok_or_else(|| QueryError::validation(format!("'{}' must be an array of clauses", key)))?;
    items.iter().map(|item| parse_where(item, scope)).collect()
}

fn parse_condition(obj: &Map<String, Value>, scope: Scope<'_>) -> EngineResult<Condition> {
    let op = match obj.get("op") {
        Some(Value::String(name)) => Operator::from_name(name).ok_or_else(|| {
            let supported: Vec<&str> = Operator::ALL.iter().map(Operator::as_str).collect();
            QueryError::parse(format!(
                "Unknown operator '{}'. Supported operators: {}",
                name,
                supported.join(", ")
            ))
        })?,
        Some(other) => {
            return Err(QueryError::parse(format!(
                "Unknown operator '{}'. Operators are strings",
                other
            )))
        }
        None => return Err(QueryError::validation("Condition requires an 'op'")),
    };

    let path = match obj.get("path") {
        Some(Value::String(path)) if !path.is_empty() => path.clone(),
        _ => {
            return Err(QueryError::validation(format!(
                "Condition with operator '{}' requires a 'path'",
                op
            )))
        }
    };

    let value = obj.get("value").cloned();
    check_operands(op, &path, value.as_ref())?;
    check_path(scope, &path)?;

    let value = if op.is_unary() { None } else { value };
    Ok(Condition { path, op, value })
}

fn check_operands(op: Operator, path: &str, value: Option<&Value>) -> EngineResult<()> {
    if op.is_unary() {
        return Ok(());
    }
    let Some(value) = value else {
        return Err(QueryError::validation_at(
            format!("Operator '{}' requires a 'value'", op),
            path,
        ));
    };
    match (op, value) {
        (Operator::Between, Value::Array(bounds)) if bounds.len() == 2 => Ok(()),
        (Operator::Between, _) => Err(QueryError::validation_at(
            format!(
                "Operator 'between' requires an array of exactly 2 values [low, high], got {}",
                value
            ),
            path,
        )),
        (Operator::In, Value::Array(_)) => Ok(()),
        (Operator::In, _) => Err(QueryError::validation_at(
            format!("Operator 'in' requires a list of values, got {}", value),
            path,
        )),
        (op, Value::Array(_)) if op.takes_list() => Ok(()),
        (op, _) if op.takes_list() => Err(QueryError::validation_at(
            format!("Operator '{}' requires a list of values, got {}", op, value),
            path,
        )),
        _ => Ok(()),
    }
}

fn check_path(scope: Scope<'_>, path: &str) -> EngineResult<()> {
    match scope {
        Scope::Entity(entity) if !schema::is_valid_field_path(entity.name, path) => {
            Err(QueryError::validation_at(
                format!(
                    "Unknown field '{}' for entity '{}'. Custom fields are addressed as 'fields.<name>'",
                    path, entity.name
                ),
                path,
            ))
        }
        Scope::Rows(columns) if !columns.iter().any(|c| c == path) => {
            Err(QueryError::validation_at(
                format!(
                    "Unknown column '{}' for aggregated rows. Available: {}",
                    path,
                    columns.join(", ")
                ),
                path,
            ))
        }
        _ => Ok(()),
    }
}

/// Scope for sub-clauses evaluated against the rows under `key`.
fn nested_scope(scope: Scope<'_>, key: &str, clause: &str) -> EngineResult<Scope<'static>> {
    match scope {
        Scope::Entity(entity) => {
            if let Some(rel) = entity.relationships.get(key) {
                schema::get_entity_schema(rel.target_entity)
                    .map(Scope::Entity)
                    .ok_or_else(|| QueryError::validation(format!("Unknown entity '{}'", rel.target_entity)))
            } else if schema::is_valid_field_path(entity.name, key) {
                Ok(Scope::Any)
            } else {
                Err(QueryError::validation_at(
                    format!(
                        "'{}' must reference a relationship or array field of '{}', got '{}'",
                        clause, entity.name, key
                    ),
                    key,
                ))
            }
        }
        Scope::Rows(_) => Err(QueryError::validation(format!(
            "'{}' is not supported on aggregated rows",
            clause
        ))),
        Scope::Any => Ok(Scope::Any),
    }
}

fn parse_quantifier(value: &Value, key: &str, scope: Scope<'_>) -> EngineResult<Quantifier> {
    let obj = value.as_object().ok_or_else(|| {
        QueryError::validation(format!("'{}' must be an object with 'path' and 'where'", key))
    })?;
    let path = match obj.get("path") {
        Some(Value::String(p)) => p.clone(),
        _ => return Err(QueryError::validation(format!("'{}' requires a 'path'", key))),
    };
    let inner = obj
        .get("where")
        .ok_or_else(|| QueryError::validation(format!("'{}' requires a 'where'", key)))?;
    let inner_scope = nested_scope(scope, &path, key)?;
    Ok(Quantifier {
        condition: Box::new(parse_where(inner, inner_scope)?),
        path,
    })
}

fn parse_exists(value: &Value, scope: Scope<'_>) -> EngineResult<Exists> {
    let obj = value
        .as_object()
        .ok_or_else(|| QueryError::validation("'exists' must be an object with 'from'"))?;
    let from = match obj.get("from") {
        Some(Value::String(f)) => f.clone(),
        _ => return Err(QueryError::validation("'exists' requires a 'from'")),
    };
    let via = match obj.get("via") {
        Some(Value::String(v)) => Some(v.clone()),
        None | Some(Value::Null) => None,
        Some(_) => return Err(QueryError::validation("'exists.via' must be a string")),
    };
    let key = via.as_deref().unwrap_or(&from);
    let inner_scope = nested_scope(scope, key, "exists")?;
    let condition = present(obj, "where")
        .map(|w| parse_where(w, inner_scope).map(Box::new))
        .transpose()?;
    Ok(Exists {
        from,
        via,
        condition,
    })
}

fn as_string(value: &Value, key: &str) -> EngineResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| QueryError::validation_at(format!("'{}' must be a string", key), key))
}

/// A list of strings; a lone string is a one-element list.
fn string_list(value: Option<&Value>, key: &str) -> EngineResult<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    let items: Vec<Value> = match value {
        None => return Ok(out),
        Some(Value::String(s)) => vec![Value::String(s.clone())],
        Some(Value::Array(items)) => items.clone(),
        Some(_) => {
            return Err(QueryError::validation_at(
                format!("'{}' must be a list of strings", key),
                key,
            ))
        }
    };
    for item in items {
        let s = as_string(&item, key)?;
        if !out.contains(&s) {
            out.push(s);
        }
    }
    Ok(out)
}

fn check_expansion(entity: &EntitySchema, name: &str) -> EngineResult<()> {
    let def = schema::get_expansion(name).ok_or_else(|| {
        QueryError::validation_at(
            format!(
                "Unknown expansion '{}'. Available: {}",
                name,
                schema::get_supported_expansions().join(", ")
            ),
            "expand",
        )
    })?;
    if !def.id_fields.contains_key(entity.name) {
        let supported: Vec<&str> = def.id_fields.keys().copied().collect();
        return Err(QueryError::validation_at(
            format!(
                "Expansion '{}' is not supported for '{}'. Supported entities: {}",
                name,
                entity.name,
                supported.join(", ")
            ),
            "expand",
        ));
    }
    Ok(())
}

fn parse_aggregates(value: &Value, entity: &'static EntitySchema) -> EngineResult<Aggregates> {
    let obj = value.as_object().ok_or_else(|| {
        QueryError::validation_at("'aggregate' must map names to functions", "aggregate")
    })?;
    if obj.is_empty() {
        return Err(QueryError::validation_at("'aggregate' is empty", "aggregate"));
    }

    let mut parsed = Aggregates::new();
    for (name, definition) in obj {
        let location = format!("aggregate.{}", name);
        let func: AggregateFunc = serde_json::from_value(definition.clone()).map_err(|e| {
            QueryError::validation_at(format!("Invalid aggregate '{}': {}", name, e), &location)
        })?;
        if let Some(field) = func.field() {
            check_path(Scope::Entity(entity), field)?;
        }
        match &func {
            AggregateFunc::Count(CountTarget::Records(false)) => {
                return Err(QueryError::validation_at(
                    format!("Aggregate '{}': count takes true or a field name", name),
                    &location,
                ))
            }
            AggregateFunc::Percentile { p, .. } if !(0.0..=100.0).contains(p) => {
                return Err(QueryError::validation_at(
                    format!("Aggregate '{}': percentile p must be between 0 and 100", name),
                    &location,
                ))
            }
            _ => {}
        }
        parsed.push(name.clone(), func);
    }

    // Derived aggregates may reference any primitive, or a derived one declared earlier.
    let mut available: Vec<&str> = parsed
        .iter()
        .filter(|(_, f)| !f.is_derived())
        .map(|(n, _)| n)
        .collect();
    for (name, func) in parsed.iter().filter(|(_, f)| f.is_derived()) {
        if func.operands().len() < 2 {
            return Err(QueryError::validation_at(
                format!("Aggregate '{}' needs at least 2 operands", name),
                format!("aggregate.{}", name),
            ));
        }
        for operand in func.operands() {
            if let Operand::Name(reference) = operand {
                if !available.contains(&reference.as_str()) {
                    return Err(QueryError::validation_at(
                        format!(
                            "Aggregate '{}' references unknown aggregate '{}'",
                            name, reference
                        ),
                        format!("aggregate.{}", name),
                    ));
                }
            }
        }
        available.push(name);
    }
    Ok(parsed)
}

fn parse_order_by(value: &Value, scope: Scope<'_>) -> EngineResult<Vec<OrderBy>> {
    let items = value
        .as_array()
        .ok_or_else(|| QueryError::validation_at("'orderBy' must be an array", "orderBy"))?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let (field, direction) = match item {
            Value::String(field) => (field.clone(), Direction::Asc),
            Value::Object(entry) => {
                let field = entry
                    .get("field")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        QueryError::validation_at("orderBy entries require a 'field'", "orderBy")
                    })?
                    .to_string();
                let direction = match entry.get("direction").and_then(Value::as_str) {
                    None | Some("asc") => Direction::Asc,
                    Some("desc") => Direction::Desc,
                    Some(other) => {
                        return Err(QueryError::validation_at(
                            format!("orderBy direction must be 'asc' or 'desc', got '{}'", other),
                            "orderBy",
                        ))
                    }
                };
                (field, direction)
            }
            _ => {
                return Err(QueryError::validation_at(
                    "orderBy entries must be field names or objects",
                    "orderBy",
                ))
            }
        };
        check_path(scope, &field)?;
        out.push(OrderBy { field, direction });
    }
    Ok(out)
}

fn parse_limit(value: Option<&Value>, warnings: &mut Vec<String>) -> EngineResult<Option<usize>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let limit = match value.as_i64() {
        Some(n) if n < 0 => {
            return Err(QueryError::validation_at(
                format!("limit must be a non-negative integer, got {}", n),
                "limit",
            ))
        }
        Some(n) => n as usize,
        None => {
            return Err(QueryError::validation_at(
                format!("limit must be an integer, got {}", value),
                "limit",
            ))
        }
    };
    if limit == 0 {
        warnings.push("Query has limit=0, which returns no records".to_string());
    }
    Ok(Some(limit))
}
