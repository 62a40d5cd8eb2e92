use crmql::aggregate::{
    apply_having, compute_aggregates, group_and_aggregate, percentile, AggregateFunc, Aggregates,
    CountTarget, Operand, NO_VALUE,
};
use crmql::query::{Operator, WhereClause};
use serde_json::{json, Value};

fn deals() -> Vec<Value> {
    vec![
        json!({"stage": "won", "amount": 100, "owner": "ann"}),
        json!({"stage": "lost", "amount": 40}),
        json!({"amount": 10, "owner": "bob"}),
        json!({"stage": "won", "amount": 300, "owner": "cy"}),
        json!({"stage": null, "amount": 5}),
    ]
}

fn standard() -> Aggregates {
    Aggregates::new()
        .with("n", AggregateFunc::Count(CountTarget::Records(true)))
        .with("owners", AggregateFunc::Count(CountTarget::Field("owner".into())))
        .with("total", AggregateFunc::Sum("amount".into()))
        .with("mean", AggregateFunc::Avg("amount".into()))
        .with("low", AggregateFunc::Min("amount".into()))
        .with("high", AggregateFunc::Max("amount".into()))
        .with("firstOwner", AggregateFunc::First("owner".into()))
        .with("lastOwner", AggregateFunc::Last("owner".into()))
}

#[test]
fn test_empty_input() {
    let out = compute_aggregates(&[], &standard());
    assert_eq!(out["n"], json!(0));
    assert_eq!(out["total"], json!(0.0));
    assert_eq!(out["mean"], Value::Null);
    assert_eq!(out["low"], Value::Null);
    assert_eq!(out["firstOwner"], Value::Null);
}

#[test]
fn test_primitives() {
    let out = compute_aggregates(&deals(), &standard());
    assert_eq!(out["n"], json!(5));
    assert_eq!(out["owners"], json!(3));
    assert_eq!(out["total"], json!(455.0));
    assert_eq!(out["mean"], json!(91.0));
    assert_eq!(out["low"], json!(5));
    assert_eq!(out["high"], json!(300));
    assert_eq!(out["firstOwner"], json!("ann"));
    assert_eq!(out["lastOwner"], json!("cy"));

    let keys: Vec<&String> = out.keys().collect();
    assert_eq!(
        keys,
        vec!["n", "owners", "total", "mean", "low", "high", "firstOwner", "lastOwner"]
    );
}

#[test]
fn test_derived_and_divide_by_zero() {
    let aggs = Aggregates::new()
        .with(
            "ratio",
            AggregateFunc::Divide(vec![Operand::Name("total".into()), Operand::Name("n".into())]),
        )
        .with("total", AggregateFunc::Sum("amount".into()))
        .with("n", AggregateFunc::Count(CountTarget::Records(true)))
        .with(
            "doubled",
            AggregateFunc::Multiply(vec![Operand::Name("total".into()), Operand::Literal(2.0)]),
        );

    let out = compute_aggregates(&deals(), &aggs);
    assert_eq!(out["ratio"], json!(91.0));
    assert_eq!(out["doubled"], json!(910.0));

    let empty = compute_aggregates(&[], &aggs);
    assert_eq!(empty["ratio"], Value::Null);
}

#[test]
fn test_percentile_interpolates() {
    let mut values = vec![10.0, 20.0, 30.0, 40.0];
    assert_eq!(percentile(&mut values, 50.0), Some(25.0));
    assert_eq!(percentile(&mut values, 0.0), Some(10.0));
    assert_eq!(percentile(&mut values, 100.0), Some(40.0));
    assert_eq!(percentile(&mut [], 50.0), None);
}

#[test]
fn test_groups_keep_first_seen_order_with_no_value_last() {
    let aggs = Aggregates::new()
        .with("n", AggregateFunc::Count(CountTarget::Records(true)))
        .with("total", AggregateFunc::Sum("amount".into()));
    let rows = group_and_aggregate(&deals(), "stage", &aggs);
    assert_eq!(
        rows,
        vec![
            json!({"stage": "won", "n": 2, "total": 400.0}),
            json!({"stage": "lost", "n": 1, "total": 40.0}),
            json!({"stage": NO_VALUE, "n": 2, "total": 15.0}),
        ]
    );
}

#[test]
fn test_group_keys_compare_raw() {
    let records = vec![json!({"k": 1}), json!({"k": "1"}), json!({"k": 1})];
    let aggs = Aggregates::new().with("n", AggregateFunc::Count(CountTarget::Records(true)));
    let rows = group_and_aggregate(&records, "k", &aggs);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], json!({"k": 1, "n": 2}));
}

#[test]
fn test_group_keys_integer_and_float_match() {
    let records = vec![json!({"k": 1, "n": 1}), json!({"k": 1.0, "n": 1}), json!({"k": 2})];
    let aggs = Aggregates::new().with("n", AggregateFunc::Count(CountTarget::Records(true)));
    let rows = group_and_aggregate(&records, "k", &aggs);
    assert_eq!(rows, vec![json!({"k": 1, "n": 2}), json!({"k": 2, "n": 1})]);
}

#[test]
fn test_having_filters_rows() {
    let aggs = Aggregates::new().with("n", AggregateFunc::Count(CountTarget::Records(true)));
    let rows = group_and_aggregate(&deals(), "stage", &aggs);
    let kept = apply_having(rows, &WhereClause::cmp("n", Operator::Gte, json!(2)));
    let stages: Vec<&Value> = kept.iter().map(|r| &r["stage"]).collect();
    assert_eq!(stages, vec![&json!("won"), &json!(NO_VALUE)]);
}
