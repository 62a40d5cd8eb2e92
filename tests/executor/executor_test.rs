use async_trait::async_trait;
use crmql::client::{ClientResult, CrmClient, FixtureClient, ListInfo, ListRequest, Page};
use crmql::cursor::{self, ResumeState};
use crmql::executor::{ExecutorConfig, ProgressCallback, QueryExecutor, QueryResult};
use crmql::planner::{plan_query, PlanStep};
use crmql::query::{parse_query, EngineResult, QueryError};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

fn fixture() -> Arc<FixtureClient> {
    Arc::new(
        FixtureClient::from_value(json!({
            "entities": {
                "persons": [
                    {"id": 1, "firstName": "Ada", "lastName": "Lovelace", "emails": ["ada@acme.com", "ada@home.org"]},
                    {"id": 2, "firstName": "Alan", "lastName": "Turing", "emails": []},
                    {"id": 3, "firstName": "Grace", "lastName": "Hopper"},
                    {"id": 4, "firstName": "Edsger", "lastName": "Dijkstra"},
                    {"id": 5, "firstName": "Barbara", "lastName": "Liskov"}
                ],
                "notes": [
                    {"id": 100, "person_id": 1, "content": "intro"},
                    {"id": 101, "person_id": 3, "content": "follow up"}
                ]
            },
            "associations": {
                "persons.get_associated_company_ids": {"1": [10, 11], "2": [11]}
            },
            "expansions": {
                "persons.interactionDates": {"1": {"lastInteraction": "2024-01-02"}}
            },
            "lists": [{"id": 12, "name": "Deals"}, {"id": 13, "name": "Partners"}],
            "listEntries": {
                "12": [
                    {"id": 200, "entityId": 1, "entity": {"fields": {"data": {
                        "f1": {"name": "Status", "value": {"data": {"text": "Won"}}}
                    }}}},
                    {"id": 201, "entityId": 2, "entity": {"fields": {"data": {
                        "f1": {"name": "Status", "value": {"data": {"text": "Lost"}}}
                    }}}},
                    {"id": 202, "entityId": 3}
                ]
            },
            "pageSize": 2
        }))
        .unwrap(),
    )
}

async fn run(client: Arc<FixtureClient>, raw: Value) -> EngineResult<QueryResult> {
    run_with(client, raw, ExecutorConfig::default(), None).await
}

async fn run_with(
    client: Arc<FixtureClient>,
    raw: Value,
    config: ExecutorConfig,
    resume: Option<ResumeState>,
) -> EngineResult<QueryResult> {
    let query = parse_query(&raw, Some("1.0"))?.query;
    let plan = plan_query(&query)?;
    QueryExecutor::new(client, config)
        .execute_resumed(&plan, resume)
        .await
}

fn ids(result: &QueryResult) -> Vec<i64> {
    result.data.iter().filter_map(|r| r["id"].as_i64()).collect()
}

#[tokio::test]
async fn test_streaming_stops_early_and_resumes() {
    let raw = json!({"from": "persons", "limit": 3});
    let client = fixture();
    let first = run(client.clone(), raw.clone()).await.unwrap();
    assert_eq!(ids(&first), vec![1, 2, 3]);
    assert_eq!(first.meta.api_calls, 2);
    assert_eq!(client.call_count(), 2);

    let page = first.pagination.clone().unwrap();
    assert!(page.has_more);
    assert_eq!(page.mode, "streaming");

    let query = parse_query(&raw, Some("1.0")).unwrap().query;
    let payload = cursor::decode(&page.cursor, &query, "toon").unwrap();
    assert_eq!(
        payload.resume_state,
        ResumeState::Streaming {
            page_token: Some("offset:3".into()),
            skip: 0,
            parent_index: 0,
            delivered: 3,
        }
    );

    let second = run_with(fixture(), raw, ExecutorConfig::default(), Some(payload.resume_state))
        .await
        .unwrap();
    assert_eq!(ids(&second), vec![4, 5]);
    assert!(second.pagination.is_none());
}

/// Records the page-size hint of every `list` call.
struct HintClient {
    inner: Arc<FixtureClient>,
    hints: Mutex<Vec<Option<usize>>>,
}

impl HintClient {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: fixture(),
            hints: Mutex::new(Vec::new()),
        })
    }

    fn hints(&self) -> Vec<Option<usize>> {
        self.hints.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrmClient for HintClient {
    async fn list(&self, entity: &str, request: &ListRequest) -> ClientResult<Page> {
        self.hints.lock().unwrap().push(request.limit);
        self.inner.list(entity, request).await
    }

    async fn get(&self, entity: &str, id: &Value) -> ClientResult<Value> {
        self.inner.get(entity, id).await
    }

    async fn lists(&self) -> ClientResult<Vec<ListInfo>> {
        self.inner.lists().await
    }
}

async fn run_hinted(
    client: Arc<HintClient>,
    raw: Value,
    resume: Option<ResumeState>,
) -> QueryResult {
    let query = parse_query(&raw, Some("1.0")).unwrap().query;
    let plan = plan_query(&query).unwrap();
    QueryExecutor::new(client, ExecutorConfig::default())
        .execute_resumed(&plan, resume)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_streaming_fetch_requests_remaining_rows() {
    let client = HintClient::new();
    let result = run_hinted(client.clone(), json!({"from": "persons", "limit": 3}), None).await;
    assert_eq!(ids(&result), vec![1, 2, 3]);
    assert_eq!(client.hints(), vec![Some(3), Some(1)]);
}

#[tokio::test]
async fn test_resumed_page_hint_covers_skipped_rows() {
    let client = HintClient::new();
    let resume = ResumeState::Streaming {
        page_token: Some("offset:2".into()),
        skip: 1,
        parent_index: 0,
        delivered: 3,
    };
    let result = run_hinted(client.clone(), json!({"from": "persons", "limit": 3}), Some(resume)).await;
    assert_eq!(ids(&result), vec![4, 5]);
    assert_eq!(client.hints(), vec![Some(4), Some(2)]);
}

#[tokio::test]
async fn test_filtered_fetch_sends_no_hint() {
    let client = HintClient::new();
    let raw = json!({
        "from": "persons",
        "where": {"path": "lastName", "op": "starts_with", "value": "L"},
        "limit": 1
    });
    let result = run_hinted(client.clone(), raw, None).await;
    assert_eq!(ids(&result), vec![1]);
    assert_eq!(client.hints(), vec![None, None, None]);
}

#[tokio::test]
async fn test_exhausted_fetch_has_no_cursor() {
    let result = run(fixture(), json!({"from": "persons", "limit": 10})).await.unwrap();
    assert_eq!(result.len(), 5);
    assert!(!result.has_more());
    assert_eq!(result.meta.records_fetched, 5);
}

#[tokio::test]
async fn test_computed_fields_and_select() {
    let result = run(
        fixture(),
        json!({"from": "persons", "select": ["firstName", "lastEmail"], "limit": 2}),
    )
    .await
    .unwrap();
    assert_eq!(
        result.data,
        vec![
            json!({"firstName": "Ada", "lastEmail": "ada@home.org"}),
            json!({"firstName": "Alan"})
        ]
    );
}

#[tokio::test]
async fn test_sort_then_limit() {
    let result = run(
        fixture(),
        json!({"from": "persons", "orderBy": [{"field": "lastName", "direction": "desc"}], "limit": 2}),
    )
    .await
    .unwrap();
    assert_eq!(ids(&result), vec![2, 1]);
    assert!(result.pagination.is_none());
}

#[tokio::test]
async fn test_list_entries_by_name() {
    let client = fixture();
    let result = run(
        client.clone(),
        json!({
            "from": "listEntries",
            "where": {"and": [
                {"path": "listName", "op": "eq", "value": "Deals"},
                {"path": "fields.Status", "op": "eq", "value": "Won"}
            ]}
        }),
    )
    .await
    .unwrap();
    assert_eq!(ids(&result), vec![200]);
    assert_eq!(result.data[0]["listId"], json!(12));
    assert_eq!(result.data[0]["listName"], json!("Deals"));
    assert_eq!(result.data[0]["fields"]["Status"], json!("Won"));
    // lists lookup plus two pages
    assert_eq!(client.call_count(), 3);
}

#[tokio::test]
async fn test_unknown_list_name() {
    let err = run(
        fixture(),
        json!({"from": "listEntries", "where": {"path": "listName", "op": "eq", "value": "Nope"}}),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), "ExecutionError");
    assert!(err.to_string().contains("List not found: 'Nope'"));
}

#[tokio::test]
async fn test_include_flattens_and_dedupes() {
    let result = run(
        fixture(),
        json!({"from": "persons", "include": ["companies", "notes"], "limit": 2}),
    )
    .await
    .unwrap();
    assert_eq!(ids(&result), vec![1, 2]);
    assert_eq!(result.included["companies"], vec![json!({"id": 10}), json!({"id": 11})]);
    assert_eq!(result.included["notes"].len(), 1);
    assert_eq!(result.included["notes"][0]["id"], json!(100));
    // one page, two association calls, two note listings
    assert_eq!(result.meta.api_calls, 5);
    assert!(result.data[0].get("companies").is_none());
}

#[tokio::test]
async fn test_exists_filter_uses_relationship() {
    let result = run(
        fixture(),
        json!({"from": "persons", "where": {"exists": {"from": "companies"}}}),
    )
    .await
    .unwrap();
    assert_eq!(ids(&result), vec![1, 2]);
    assert!(result.included.is_empty());
    assert!(result.warnings.iter().any(|w| w.contains("'companies'")));
}

#[tokio::test]
async fn test_count_filter() {
    let result = run(
        fixture(),
        json!({"from": "persons", "where": {"path": "companies._count", "op": "gte", "value": 2}}),
    )
    .await
    .unwrap();
    assert_eq!(ids(&result), vec![1]);
}

#[tokio::test]
async fn test_expand_merges_enrichment() {
    let result = run(
        fixture(),
        json!({"from": "persons", "expand": ["interactionDates"], "limit": 2}),
    )
    .await
    .unwrap();
    assert_eq!(result.data[0]["interactionDates"]["lastInteraction"], json!("2024-01-02"));
    assert_eq!(result.data[1]["interactionDates"], Value::Null);
}

#[tokio::test]
async fn test_max_records_safety_limit() {
    let config = ExecutorConfig {
        max_records: 3,
        ..ExecutorConfig::default()
    };
    let err = run_with(fixture(), json!({"from": "persons"}), config, None)
        .await
        .unwrap_err();
    match err {
        QueryError::SafetyLimit {
            limit_name,
            limit_value,
            ..
        } => {
            assert_eq!(limit_name, "max_records");
            assert_eq!(limit_value, 3);
        }
        other => panic!("expected safety limit, got {:?}", other),
    }
}

#[tokio::test]
async fn test_max_records_stops_relationship_fan_out() {
    let notes: Vec<Value> = (0..300)
        .map(|i| json!({"id": 1000 + i, "person_id": i % 3 + 1}))
        .collect();
    let client = Arc::new(
        FixtureClient::from_value(json!({
            "entities": {
                "persons": [{"id": 1}, {"id": 2}, {"id": 3}],
                "notes": notes
            },
            "pageSize": 1
        }))
        .unwrap(),
    );
    let config = ExecutorConfig {
        max_records: 5,
        ..ExecutorConfig::default()
    };
    let err = run_with(client.clone(), json!({"from": "persons", "include": ["notes"]}), config, None)
        .await
        .unwrap_err();
    assert!(
        matches!(err, QueryError::SafetyLimit { limit_name: "max_records", .. }),
        "{:?}",
        err
    );
    assert!(client.call_count() < 20, "made {} calls", client.call_count());
}

#[tokio::test]
async fn test_ungrouped_aggregate() {
    let result = run(
        fixture(),
        json!({"from": "persons", "aggregate": {"n": {"count": true}}}),
    )
    .await
    .unwrap();
    assert_eq!(result.data, vec![json!({"n": 5})]);
    assert_eq!(result.aggregates.unwrap()["n"], json!(5));
}

#[tokio::test]
async fn test_full_fetch_resume_window() {
    let raw = json!({"from": "persons", "orderBy": ["lastName"]});
    let resume = ResumeState::FullFetch {
        skip: 2,
        total: Some(4),
    };
    let result = run_with(fixture(), raw, ExecutorConfig::default(), Some(resume))
        .await
        .unwrap();
    // Dijkstra, Hopper, Liskov, Lovelace, Turing
    assert_eq!(ids(&result), vec![5, 1]);
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ProgressCallback for Recorder {
    fn on_step_start(&self, step: &PlanStep) {
        self.events.lock().unwrap().push(format!("start {}", step.operation));
    }

    fn on_step_complete(&self, step: &PlanStep, records: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {} {}", step.operation, records));
    }
}

#[tokio::test]
async fn test_progress_follows_plan() {
    let recorder = Arc::new(Recorder::default());
    let query = parse_query(&json!({"from": "persons", "orderBy": ["lastName"], "limit": 2}), Some("1.0"))
        .unwrap()
        .query;
    let plan = plan_query(&query).unwrap();
    QueryExecutor::new(fixture(), ExecutorConfig::default())
        .with_progress(recorder.clone())
        .execute(&plan)
        .await
        .unwrap();
    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![
            "start fetch",
            "done fetch 5",
            "start sort",
            "done sort 5",
            "start limit",
            "done limit 2"
        ]
    );
}
