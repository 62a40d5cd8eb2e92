use crmql::aggregate::{AggregateFunc, CountTarget};
use crmql::query::{parse_query, parse_query_str, Direction, Operator, QueryError, WhereClause};
use serde_json::json;

fn message(err: QueryError) -> String {
    err.to_string()
}

#[test]
fn test_minimal_query() {
    let parsed = parse_query(&json!({"$version": "1.0", "from": "persons", "limit": 5}), None).unwrap();
    assert!(parsed.warnings.is_empty());
    assert_eq!(parsed.query.from, "persons");
    assert_eq!(parsed.query.limit, Some(5));
    assert!(parsed.query.filter.is_none());
}

#[test]
fn test_missing_version_warns() {
    let parsed = parse_query(&json!({"from": "persons"}), None).unwrap();
    assert_eq!(parsed.query.version, "1.0");
    assert_eq!(parsed.warnings.len(), 1);
    assert!(parsed.warnings[0].contains("Assuming version 1.0"));
}

#[test]
fn test_version_override_silences_warning() {
    let parsed = parse_query(&json!({"from": "persons"}), Some("1.0")).unwrap();
    assert!(parsed.warnings.is_empty());
}

#[test]
fn test_unsupported_version() {
    let err = parse_query(&json!({"$version": "2.0", "from": "persons"}), None).unwrap_err();
    assert!(matches!(err, QueryError::Parse { .. }));
    assert!(message(err).contains("Unsupported version: 2.0"));
}

#[test]
fn test_invalid_json() {
    let err = parse_query_str("{not json", None).unwrap_err();
    assert!(matches!(err, QueryError::Parse { .. }));
    assert!(message(err).starts_with("Invalid JSON"));
}

#[test]
fn test_unknown_entity_lists_supported() {
    let err = parse_query(&json!({"$version": "1.0", "from": "deals"}), None).unwrap_err();
    assert!(matches!(err, QueryError::Validation { .. }));
    let text = message(err);
    assert!(text.contains("Unknown entity 'deals'"));
    assert!(text.contains("persons"));
}

#[test]
fn test_unknown_operator_is_parse_error() {
    let err = parse_query(
        &json!({"$version": "1.0", "from": "persons", "where": {"path": "firstName", "op": "like", "value": "A"}}),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, QueryError::Parse { .. }));
    assert!(message(err).contains("Unknown operator 'like'"));
}

#[test]
fn test_between_requires_two_values() {
    for value in [json!([1]), json!([1, 2, 3]), json!(5)] {
        let err = parse_query(
            &json!({"$version": "1.0", "from": "opportunities",
                    "where": {"path": "createdAt", "op": "between", "value": value}}),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::Validation { .. }));
        assert!(message(err).contains("between"));
    }
}

#[test]
fn test_unary_operators_need_no_value() {
    let parsed = parse_query(
        &json!({"$version": "1.0", "from": "persons", "where": {"path": "primaryEmail", "op": "is_null"}}),
        None,
    )
    .unwrap();
    match parsed.query.filter {
        Some(WhereClause::Comparison(c)) => {
            assert_eq!(c.op, Operator::IsNull);
            assert!(c.value.is_none());
        }
        other => panic!("unexpected filter {:?}", other),
    }
}

#[test]
fn test_unknown_field_rejected() {
    let err = parse_query(
        &json!({"$version": "1.0", "from": "persons", "where": {"path": "nickname", "op": "eq", "value": "x"}}),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, QueryError::Validation { .. }));
}

#[test]
fn test_list_entries_without_selector() {
    let err = parse_query(&json!({"$version": "1.0", "from": "listEntries"}), None).unwrap_err();
    assert!(matches!(err, QueryError::Parse { .. }));
    let text = message(err);
    assert!(text.contains("listId"));
    assert!(text.contains("listName"));
    assert!(text.contains("By ID:"));
    assert!(text.contains("By name:"));
}

#[test]
fn test_list_entries_by_name() {
    let parsed = parse_query(
        &json!({"$version": "1.0", "from": "listEntries",
                "where": {"path": "listName", "op": "eq", "value": "Deals"}}),
        None,
    )
    .unwrap();
    assert_eq!(parsed.query.from, "listEntries");
}

#[test]
fn test_list_entries_unusable_selectors() {
    let cases = [
        json!({"not": {"path": "listId", "op": "eq", "value": 12}}),
        json!({"path": "listId", "op": "gt", "value": 1}),
        json!({"path": "listId", "op": "eq", "value": "abc"}),
        json!({"or": [
            {"path": "listId", "op": "eq", "value": 12},
            {"path": "fields.Status", "op": "eq", "value": "Won"}
        ]}),
        json!({"and": [
            {"path": "listId", "op": "eq", "value": 12},
            {"path": "listName", "op": "eq", "value": "Deals"}
        ]}),
        json!({"and": [
            {"path": "listId", "op": "eq", "value": 12},
            {"path": "listId", "op": "eq", "value": 13}
        ]}),
    ];
    for filter in cases {
        let err = parse_query(
            &json!({"$version": "1.0", "from": "listEntries", "where": filter}),
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "ParseError", "{}", filter);
    }
}

#[test]
fn test_list_entries_selector_with_extra_conditions() {
    let parsed = parse_query(
        &json!({"$version": "1.0", "from": "listEntries", "where": {"and": [
            {"path": "listId", "op": "in", "value": [12, 13]},
            {"not": {"path": "fields.Status", "op": "eq", "value": "Lost"}},
            {"or": [
                {"path": "listId", "op": "eq", "value": 12},
                {"path": "listId", "op": "eq", "value": "14"}
            ]}
        ]}}),
        None,
    );
    assert!(parsed.is_ok());
}

#[test]
fn test_nested_where() {
    let parsed = parse_query(
        &json!({"$version": "1.0", "from": "persons", "where": {
            "and": [
                {"path": "lastName", "op": "starts_with", "value": "Lo"},
                {"not": {"path": "type", "op": "eq", "value": "internal"}},
                {"exists": {"from": "companies", "where": {"path": "domain", "op": "ends_with", "value": ".io"}}},
                {"all": {"path": "emails", "where": {"path": "value", "op": "contains", "value": "@"}}}
            ]
        }}),
        None,
    )
    .unwrap();
    match parsed.query.filter {
        Some(WhereClause::And { and }) => assert_eq!(and.len(), 4),
        other => panic!("unexpected filter {:?}", other),
    }
}

#[test]
fn test_where_with_two_kinds_rejected() {
    let err = parse_query(
        &json!({"$version": "1.0", "from": "persons",
                "where": {"and": [], "or": []}}),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, QueryError::Validation { .. }));
}

#[test]
fn test_aggregate_with_include_conflicts() {
    let err = parse_query(
        &json!({"$version": "1.0", "from": "persons",
                "aggregate": {"n": {"count": true}}, "include": ["companies"]}),
        None,
    )
    .unwrap_err();
    assert!(message(err).contains("Cannot use 'aggregate' with 'include'"));
}

#[test]
fn test_group_by_requires_aggregate() {
    let err = parse_query(
        &json!({"$version": "1.0", "from": "persons", "groupBy": "type"}),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, QueryError::Validation { .. }));
}

#[test]
fn test_aggregate_and_having() {
    let parsed = parse_query(
        &json!({"$version": "1.0", "from": "opportunities",
                "groupBy": "fields.Stage",
                "aggregate": {
                    "deals": {"count": true},
                    "total": {"sum": "fields.Amount"},
                    "avgDeal": {"divide": ["total", "deals"]}
                },
                "having": {"path": "deals", "op": "gte", "value": 2},
                "orderBy": [{"field": "total", "direction": "desc"}]}),
        None,
    )
    .unwrap();
    let aggs = parsed.query.aggregate.unwrap();
    assert_eq!(aggs.len(), 3);
    assert_eq!(aggs.get("deals"), Some(&AggregateFunc::Count(CountTarget::Records(true))));
    assert!(aggs.get("avgDeal").unwrap().is_derived());
    assert_eq!(parsed.query.order_by[0].direction, Direction::Desc);
    assert!(parsed.query.having.is_some());
}

#[test]
fn test_having_on_unknown_column() {
    let err = parse_query(
        &json!({"$version": "1.0", "from": "persons",
                "aggregate": {"n": {"count": true}},
                "having": {"path": "m", "op": "gt", "value": 1}}),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, QueryError::Validation { .. }));
}

#[test]
fn test_derived_aggregate_needs_two_operands() {
    let err = parse_query(
        &json!({"$version": "1.0", "from": "persons",
                "aggregate": {"n": {"count": true}, "twice": {"multiply": ["n"]}}}),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, QueryError::Validation { .. }));
}

#[test]
fn test_percentile_range() {
    let err = parse_query(
        &json!({"$version": "1.0", "from": "opportunities",
                "aggregate": {"p": {"percentile": {"field": "fields.Amount", "p": 150}}}}),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, QueryError::Validation { .. }));
}

#[test]
fn test_unknown_include() {
    let err = parse_query(
        &json!({"$version": "1.0", "from": "persons", "include": ["widgets"]}),
        None,
    )
    .unwrap_err();
    let text = message(err);
    assert!(text.contains("Unknown relationship 'widgets'"));
    assert!(text.contains("companies"));
}

#[test]
fn test_expand_not_supported_for_entity() {
    let err = parse_query(
        &json!({"$version": "1.0", "from": "notes", "expand": ["interactionDates"]}),
        None,
    )
    .unwrap_err();
    assert!(message(err).contains("is not supported for 'notes'"));
}

#[test]
fn test_negative_limit() {
    let err = parse_query(&json!({"$version": "1.0", "from": "persons", "limit": -1}), None).unwrap_err();
    assert!(matches!(err, QueryError::Validation { .. }));
}

#[test]
fn test_zero_limit_warns() {
    let parsed = parse_query(&json!({"$version": "1.0", "from": "persons", "limit": 0}), None).unwrap();
    assert_eq!(parsed.query.limit, Some(0));
    assert!(parsed.warnings.iter().any(|w| w.contains("limit=0")));
}

#[test]
fn test_order_by_shorthand() {
    let parsed = parse_query(
        &json!({"$version": "1.0", "from": "persons", "orderBy": ["lastName"]}),
        None,
    )
    .unwrap();
    assert_eq!(parsed.query.order_by[0].field, "lastName");
    assert_eq!(parsed.query.order_by[0].direction, Direction::Asc);
}

#[test]
fn test_unknown_top_level_key() {
    let err = parse_query(&json!({"$version": "1.0", "from": "persons", "sort": "x"}), None).unwrap_err();
    assert!(message(err).contains("Unknown query key 'sort'"));
}
