use crmql::executor::QueryResult;
use crmql::output::{
    insert_cursor_in_toon_truncation, render, truncate, OutputFormat, BYTE_TRUNCATION_SUFFIX,
};
use serde_json::{json, Value};

fn rows(n: usize) -> Vec<Value> {
    (1..=n)
        .map(|i| json!({"id": i, "name": format!("Person number {}", i)}))
        .collect()
}

fn rendered(n: usize, format: OutputFormat) -> String {
    let mut result = QueryResult::new(rows(n));
    result
        .included
        .insert("companies".into(), vec![json!({"id": 1, "name": "Acme"})]);
    render(&result, format)
}

#[test]
fn test_within_budget_is_unchanged() {
    let content = rendered(3, OutputFormat::Toon);
    let out = truncate(&content, OutputFormat::Toon, content.len(), None);
    assert!(!out.truncated);
    assert_eq!(out.content, content);
}

#[test]
fn test_toon_keeps_header_and_sections() {
    let content = rendered(50, OutputFormat::Toon);
    let out = truncate(&content, OutputFormat::Toon, 400, None);
    assert!(out.truncated);
    assert!(out.content.len() <= 400);

    let shown = out.rows_shown.unwrap();
    assert!(shown > 0 && shown < 50);
    assert_eq!(out.rows_omitted, Some(50 - shown));
    assert!(out.content.starts_with(&format!("data[{}]{{id,name}}:", shown)));
    assert!(out.content.contains(&format!("truncation:\n  rowsShown: {}\n  rowsOmitted: {}", shown, 50 - shown)));
    assert!(out.content.ends_with("included_companies[1]{id,name}:\n  1,Acme"));
}

#[test]
fn test_toon_cursor_insertion() {
    let content = rendered(50, OutputFormat::Toon);
    let out = truncate(&content, OutputFormat::Toon, 400, None);
    let with_cursor = insert_cursor_in_toon_truncation(&out.content, "tok");
    let omitted = format!("  rowsOmitted: {}\n  cursor: tok\n", out.rows_omitted.unwrap());
    assert!(with_cursor.contains(&omitted));

    assert_eq!(insert_cursor_in_toon_truncation("data[0]:", "tok"), "data[0]:");
}

#[test]
fn test_markdown_footer_uses_original_total() {
    let content = rendered(50, OutputFormat::Markdown);
    let out = truncate(&content, OutputFormat::Markdown, 500, Some(120));
    assert!(out.truncated);
    assert!(out.content.len() <= 500);
    assert!(out.content.starts_with("| id | name |\n| --- | --- |\n"));

    let shown = out.rows_shown.unwrap();
    assert_eq!(out.rows_omitted, Some(120 - shown));
    assert!(out.content.contains(&format!(
        "_...truncated: {} rows shown of 120 ({} omitted)_",
        shown,
        120 - shown
    )));
}

#[test]
fn test_jsonl_marker_and_envelope() {
    let content = rendered(50, OutputFormat::Jsonl);
    let out = truncate(&content, OutputFormat::Jsonl, 600, None);
    assert!(out.content.len() <= 600);

    let lines: Vec<Value> = out
        .content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let shown = out.rows_shown.unwrap();
    assert_eq!(lines.len(), shown + 2);
    assert_eq!(lines[shown]["$included"], "companies");
    assert_eq!(
        lines[shown + 1],
        json!({"truncated": true, "rowsShown": shown, "rowsOmitted": 50 - shown})
    );
}

#[test]
fn test_csv_marker_and_header_only() {
    let content = rendered(50, OutputFormat::Csv);
    let out = truncate(&content, OutputFormat::Csv, 300, None);
    assert!(out.content.len() <= 300);
    assert!(out.content.starts_with("id,name\n1,Person number 1\n"));
    let shown = out.rows_shown.unwrap();
    assert!(out.content.ends_with(&format!(
        "# truncated: rowsShown={} rowsOmitted={} total=50\n",
        shown,
        50 - shown
    )));

    let header_only = truncate(&content, OutputFormat::Csv, 57, None);
    assert_eq!(
        header_only.content,
        "id,name\n# truncated: rowsShown=0 rowsOmitted=50 total=50\n"
    );
    assert_eq!(header_only.rows_shown, Some(0));
    assert_eq!(header_only.rows_omitted, Some(50));
}

#[test]
fn test_csv_header_keeps_short_marker() {
    let content = rendered(50, OutputFormat::Csv);
    let out = truncate(&content, OutputFormat::Csv, 50, None);
    assert_eq!(out.content, "id,name\n# truncated: rowsShown=0 rowsOmitted=50\n");
    assert_eq!(out.rows_shown, Some(0));
    assert_eq!(out.rows_omitted, Some(50));

    let cut = truncate(&content, OutputFormat::Csv, 20, None);
    assert!(cut.truncated);
    assert!(cut.content.len() <= 20);
    assert!(cut.content.ends_with(BYTE_TRUNCATION_SUFFIX));
}

#[test]
fn test_unrecognised_content_cut_at_bytes() {
    let content = "plain text ".repeat(20);
    for format in [OutputFormat::Toon, OutputFormat::Markdown, OutputFormat::Jsonl] {
        let out = truncate(&content, format, 50, None);
        assert!(out.truncated);
        assert!(out.content.len() <= 50);
        assert!(out.content.ends_with(BYTE_TRUNCATION_SUFFIX));
        assert_eq!(out.rows_shown, None);
    }
}
