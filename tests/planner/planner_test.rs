use crmql::planner::{plan_query, IncludePurpose, QueryPlanner, StepOperation};
use crmql::query::{parse_query, Operator, Query, WhereClause};
use serde_json::{json, Value};

fn query(raw: Value) -> Query {
    parse_query(&raw, Some("1.0")).unwrap().query
}

#[test]
fn test_simple_limit_is_streamable() {
    let plan = plan_query(&query(json!({"from": "persons", "limit": 10}))).unwrap();
    assert_eq!(plan.operations(), vec!["fetch", "limit"]);
    assert!(plan.streamable);
    assert_eq!(plan.estimated_api_calls, Some(1));
    assert!(plan.warnings.is_empty());
}

#[test]
fn test_step_ids_chain() {
    let plan = plan_query(&query(json!({"from": "persons", "orderBy": ["lastName"], "limit": 3}))).unwrap();
    for (i, step) in plan.steps.iter().enumerate() {
        assert_eq!(step.step_id, i + 1);
        if i == 0 {
            assert!(step.depends_on.is_empty());
        } else {
            assert_eq!(step.depends_on, vec![i]);
        }
    }
}

#[test]
fn test_filter_relationship_fetched_before_filter() {
    let plan = plan_query(&query(json!({
        "from": "persons",
        "where": {"exists": {"from": "companies", "where": {"path": "domain", "op": "ends_with", "value": ".io"}}},
        "include": ["companies", "notes"],
        "orderBy": ["lastName"]
    })))
    .unwrap();

    assert_eq!(
        plan.operations(),
        vec!["fetch", "include", "filter", "sort", "include"]
    );
    assert_eq!(plan.steps[1].target.as_deref(), Some("companies"));
    assert_eq!(plan.steps[1].purpose, Some(IncludePurpose::FilterAndOutput));
    assert_eq!(plan.steps[4].target.as_deref(), Some("notes"));
    assert_eq!(plan.steps[4].purpose, Some(IncludePurpose::Output));
    assert!(!plan.streamable);
    assert_eq!(plan.estimated_api_calls, None);
}

#[test]
fn test_n_plus_one_warnings() {
    let plan = plan_query(&query(json!({"from": "persons", "include": ["companies"], "limit": 5}))).unwrap();
    assert_eq!(plan.operations(), vec!["fetch", "limit", "include"]);
    let include = plan.step(StepOperation::Include).unwrap();
    assert!(include.requires_n_plus_1);
    assert_eq!(include.estimated_calls, Some(5));
    assert_eq!(plan.estimated_api_calls, Some(6));
    assert!(plan.warnings.iter().any(|w| w.contains("'companies'") && w.contains("N+1")));
}

#[test]
fn test_count_filter_schedules_include() {
    let plan = plan_query(&query(json!({
        "from": "companies",
        "where": {"path": "people._count", "op": "gte", "value": 3}
    })))
    .unwrap();
    assert_eq!(plan.operations(), vec!["fetch", "include", "filter"]);
    assert_eq!(plan.steps[1].purpose, Some(IncludePurpose::Filter));
}

#[test]
fn test_aggregate_pipeline_order() {
    let plan = plan_query(&query(json!({
        "from": "opportunities",
        "where": {"path": "name", "op": "contains", "value": "renewal"},
        "groupBy": "fields.Stage",
        "aggregate": {"n": {"count": true}},
        "having": {"path": "n", "op": "gt", "value": 1},
        "orderBy": [{"field": "n", "direction": "desc"}],
        "limit": 3
    })))
    .unwrap();
    assert_eq!(
        plan.operations(),
        vec!["fetch", "filter", "aggregate", "having", "sort", "limit"]
    );
}

#[test]
fn test_expand_after_limit() {
    let plan = plan_query(&query(json!({"from": "persons", "expand": ["interactionDates"], "limit": 2}))).unwrap();
    assert_eq!(plan.operations(), vec!["fetch", "limit", "expand"]);
    assert_eq!(plan.steps[2].estimated_calls, Some(2));
}

#[test]
fn test_list_entries_selector_consumed() {
    let plan = plan_query(&query(json!({
        "from": "listEntries",
        "where": {"and": [
            {"path": "listName", "op": "eq", "value": "Deals"},
            {"path": "fields.Status", "op": "eq", "value": "Won"}
        ]}
    })))
    .unwrap();
    let selector = plan.parent_selector.clone().unwrap();
    assert_eq!(selector.names, vec!["Deals".to_string()]);
    assert!(selector.ids.is_empty());
    assert_eq!(
        plan.residual_filter,
        Some(WhereClause::cmp("fields.Status", Operator::Eq, json!("Won")))
    );
    assert_eq!(plan.operations(), vec!["fetch", "filter"]);
}

#[test]
fn test_list_id_only_is_streamable() {
    let plan = plan_query(&query(json!({
        "from": "listEntries",
        "where": {"path": "listId", "op": "in", "value": ["12", 13]},
        "limit": 3
    })))
    .unwrap();
    assert_eq!(plan.parent_selector.as_ref().unwrap().ids, vec![json!(12), json!(13)]);
    assert!(plan.residual_filter.is_none());
    assert!(plan.streamable);
    assert_eq!(plan.estimated_api_calls, Some(2));
}

#[test]
fn test_page_size_affects_estimates() {
    let q = query(json!({"from": "persons", "limit": 250}));
    assert_eq!(plan_query(&q).unwrap().estimated_api_calls, Some(3));
    assert_eq!(QueryPlanner::with_page_size(50).plan(&q).unwrap().estimated_api_calls, Some(5));
}

#[test]
fn test_explain_text() {
    let plan = plan_query(&query(json!({"from": "persons", "include": ["companies"], "limit": 5}))).unwrap();
    let text = plan.explain();
    assert!(text.starts_with("Execution plan for 'persons':\n"));
    assert!(text.contains("  1. [fetch]"));
    assert!(text.contains("[N+1]"));
    assert!(text.contains("Estimated API calls: 6"));
    assert!(text.contains("Warning: "));
}
