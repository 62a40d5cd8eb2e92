//! Text rendering of query results.

use serde_json::Value;

use super::OutputFormat;
use crate::executor::QueryResult;

/// Render a result in the given format.
pub fn render(result: &QueryResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Toon => render_toon(result),
        OutputFormat::Markdown => render_markdown(result),
        OutputFormat::Jsonl => render_jsonl(result),
        OutputFormat::Csv => render_csv(&result.data),
    }
}

/// Column names in first-seen order across all rows.
pub fn columns(rows: &[Value]) -> Vec<String> {
    let mut cols: Vec<String> = Vec::new();
    for row in rows {
        if let Value::Object(map) = row {
            for key in map.keys() {
                if !cols.iter().any(|c| c == key) {
                    cols.push(key.clone());
                }
            }
        }
    }
    cols
}

fn cell<'a>(row: &'a Value, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&Value::Null)
}

/// Plain-text form of a cell; nested values become compact JSON.
fn plain(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn toon_scalar(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::String(s) => {
            let needs_quotes = s.is_empty()
                || s.trim() != s
                || s.contains([',', '"', '\n', ':'])
                || matches!(s.as_str(), "true" | "false" | "null")
                || s.parse::<f64>().is_ok();
            if needs_quotes {
                Value::String(s.clone()).to_string()
            } else {
                s.clone()
            }
        }
        nested => Value::String(nested.to_string()).to_string(),
    }
}

fn toon_table(out: &mut Vec<String>, name: &str, rows: &[Value]) {
    let cols = columns(rows);
    if cols.is_empty() {
        out.push(format!("{}[{}]:", name, rows.len()));
        return;
    }
    out.push(format!("{}[{}]{{{}}}:", name, rows.len(), cols.join(",")));
    for row in rows {
        let cells: Vec<String> = cols.iter().map(|c| toon_scalar(cell(row, c))).collect();
        out.push(format!("  {}", cells.join(",")));
    }
}

/// Structured text envelope: a `data` table followed by `included_*`,
/// `pagination` and `warnings` sections.
pub fn render_toon(result: &QueryResult) -> String {
    let mut out = Vec::new();
    toon_table(&mut out, "data", &result.data);
    for (name, rows) in &result.included {
        toon_table(&mut out, &format!("included_{}", name), rows);
    }
    if let Some(page) = &result.pagination {
        out.push("pagination:".to_string());
        out.push(format!("  hasMore: {}", page.has_more));
        out.push(format!("  nextCursor: {}", page.cursor));
        out.push(format!("  mode: {}", page.mode));
    }
    if !result.warnings.is_empty() {
        out.push(format!("warnings[{}]:", result.warnings.len()));
        for warning in &result.warnings {
            out.push(format!("  - {}", warning));
        }
    }
    out.join("\n")
}

fn markdown_cell(value: &Value) -> String {
    plain(value).replace('|', "\\|").replace(['\n', '\r'], " ")
}

fn markdown_table(out: &mut Vec<String>, rows: &[Value]) {
    let cols = columns(rows);
    if cols.is_empty() {
        out.push("_No results_".to_string());
        return;
    }
    out.push(format!("| {} |", cols.join(" | ")));
    out.push(format!("| {} |", vec!["---"; cols.len()].join(" | ")));
    for row in rows {
        let cells: Vec<String> = cols.iter().map(|c| markdown_cell(cell(row, c))).collect();
        out.push(format!("| {} |", cells.join(" | ")));
    }
}

pub fn render_markdown(result: &QueryResult) -> String {
    let mut out = Vec::new();
    markdown_table(&mut out, &result.data);
    for (name, rows) in &result.included {
        out.push(String::new());
        out.push(format!("**Included: {}**", name));
        out.push(String::new());
        markdown_table(&mut out, rows);
    }
    if let Some(page) = &result.pagination {
        out.push(String::new());
        out.push(format!("_More results available. Cursor: `{}`_", page.cursor));
    }
    out.join("\n")
}

/// One JSON object per line. Non-data lines are prefixed `{"$` so they can
/// be told apart from rows.
pub fn render_jsonl(result: &QueryResult) -> String {
    let mut out = String::new();
    for row in &result.data {
        out.push_str(&row.to_string());
        out.push('\n');
    }
    for (name, rows) in &result.included {
        for row in rows {
            let line = serde_json::json!({ "$included": name, "data": row });
            out.push_str(&line.to_string());
            out.push('\n');
        }
    }
    if let Some(page) = &result.pagination {
        let line = serde_json::json!({ "$pagination": page });
        out.push_str(&line.to_string());
        out.push('\n');
    }
    out
}

fn csv_field(value: &Value) -> String {
    let text = plain(value);
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text
    }
}

/// RFC 4180 CSV of the data rows.
pub fn render_csv(rows: &[Value]) -> String {
    let cols = columns(rows);
    if cols.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    let header: Vec<String> = cols
        .iter()
        .map(|c| csv_field(&Value::String(c.clone())))
        .collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in rows {
        let cells: Vec<String> = cols.iter().map(|c| csv_field(cell(row, c))).collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}
