//! Plan execution.
//!
//! The executor walks plan steps in order over a shared
//! [`ExecutionContext`]. Steps that call the CRM per record fan out into
//! concurrent futures, each admitted through a [`CallGate`], and join before
//! the next step starts:
//!
//! ```text
//!            ┌─────────┐   ┌─────────┐
//!  rows ───▶ │ task 0  │   │ task 1  │ ...   (bounded by CallGate)
//!            └────┬────┘   └────┬────┘
//!                 └──── join ───┘
//!                        │  results attributed by row position
//!                        ▼
//!                    next step
//! ```
//!
//! The whole run is bounded by a wall-clock timeout and can be cancelled
//! through a [`CancelHandle`]; either drops in-flight calls at their next
//! await point.

mod context;
mod gate;
mod progress;
mod projection;
mod result;

pub use gate::{CallGate, CallPermit, RateLimiter};
pub use progress::{LogProgress, NullProgress, ProgressCallback};
pub use projection::{add_computed_fields, normalize_list_entry_fields, project, set_nested};
pub use result::{Pagination, QueryResult, ResultMeta};

use context::{Counters, ExecutionContext, Row};

use futures::future::join_all;
use futures::StreamExt;
use serde_json::Value;
use std::cmp::Ordering;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::aggregate::{apply_having, compute_aggregates, group_and_aggregate};
use crate::client::{pages, ClientResult, CrmClient, ListRequest};
use crate::cursor::{self, CursorPayload, ResumeState};
use crate::filter::{compile, ordering, resolve_path};
use crate::output::OutputFormat;
use crate::planner::{ExecutionPlan, PlanStep, StepOperation};
use crate::query::{Direction, EngineResult, OrderBy, QueryError};
use crate::schema::{self, EntityFetch, EntitySchema, FetchStrategy};

/// Default number of simultaneous remote calls.
pub const DEFAULT_CONCURRENCY: usize = 10;
/// Default cap on records fetched by one query.
pub const DEFAULT_MAX_RECORDS: usize = 10_000;
/// Default wall-clock budget of one query.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// Executor limits.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    pub concurrency: usize,
    pub max_records: usize,
    pub timeout: Duration,
    /// Calls per second across all tasks; unlimited when `None`.
    pub requests_per_second: Option<f64>,
    /// Calls that may be made back to back before the rate applies.
    pub burst: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_records: DEFAULT_MAX_RECORDS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            requests_per_second: None,
            burst: DEFAULT_CONCURRENCY,
        }
    }
}

/// Cooperative cancellation signal shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Runs execution plans against a [`CrmClient`].
pub struct QueryExecutor {
    client: Arc<dyn CrmClient>,
    config: ExecutorConfig,
    progress: Arc<dyn ProgressCallback>,
    cancel: CancelHandle,
    format: OutputFormat,
}

/// Parent of a per-parent fetch.
struct Parent {
    id: Option<Value>,
    name: Option<String>,
}

impl QueryExecutor {
    pub fn new(client: Arc<dyn CrmClient>, config: ExecutorConfig) -> Self {
        Self {
            client,
            config,
            progress: Arc::new(NullProgress),
            cancel: CancelHandle::new(),
            format: OutputFormat::default(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Output format that issued cursors are bound to.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub async fn execute(&self, plan: &ExecutionPlan) -> EngineResult<QueryResult> {
        self.execute_resumed(plan, None).await
    }

    /// Execute `plan`, continuing from a decoded cursor state when given.
    pub async fn execute_resumed(
        &self,
        plan: &ExecutionPlan,
        resume: Option<ResumeState>,
    ) -> EngineResult<QueryResult> {
        if self.cancel.is_cancelled() {
            return Err(QueryError::Interrupted);
        }
        let gate = CallGate::new(
            self.config.concurrency,
            self.config
                .requests_per_second
                .map(|rate| (rate, self.config.burst)),
        );
        let run = self.run(plan, resume, &gate);
        let timed = tokio::time::timeout(self.config.timeout, run);

        tokio::select! {
            outcome = timed => match outcome {
                Ok(result) => result,
                Err(_) => {
                    gate.close();
                    log::warn!("query on '{}' timed out", plan.query.from);
                    Err(QueryError::Timeout {
                        seconds: self.config.timeout.as_secs_f64(),
                    })
                }
            },
            _ = self.cancel.cancelled() => {
                gate.close();
                log::warn!("query on '{}' interrupted", plan.query.from);
                Err(QueryError::Interrupted)
            }
        }
    }

    async fn run(
        &self,
        plan: &ExecutionPlan,
        resume: Option<ResumeState>,
        gate: &CallGate,
    ) -> EngineResult<QueryResult> {
        let entity = schema::get_entity_schema(&plan.query.from).ok_or_else(|| {
            QueryError::validation(format!("Unknown entity '{}'", plan.query.from))
        })?;
        let mut ctx = ExecutionContext::new(resume, plan.warnings.clone());

        for step in &plan.steps {
            self.progress.on_step_start(step);
            match self.run_step(plan, entity, step, &mut ctx, gate).await {
                Ok(()) => self.progress.on_step_complete(step, ctx.rows.len()),
                Err(e) => {
                    self.progress.on_step_error(step, &e.to_string());
                    return Err(e);
                }
            }
        }

        // A plan without a limit step still honours a full-fetch resume.
        if !plan.has_step(StepOperation::Limit) {
            self.apply_window(&mut ctx, None);
        }
        self.build_result(plan, ctx)
    }

    async fn run_step(
        &self,
        plan: &ExecutionPlan,
        entity: &EntitySchema,
        step: &PlanStep,
        ctx: &mut ExecutionContext,
        gate: &CallGate,
    ) -> EngineResult<()> {
        match step.operation {
            StepOperation::Fetch => self.run_fetch(plan, entity, step, ctx, gate).await,
            StepOperation::Include => self.run_include(entity, step, ctx, gate).await,
            StepOperation::Expand => self.run_expand(entity, step, ctx, gate).await,
            StepOperation::Filter => {
                if let Some(filter) = &plan.residual_filter {
                    let predicate = compile(filter);
                    ctx.rows.retain(|row| predicate(&row.view()));
                }
                Ok(())
            }
            StepOperation::Aggregate => {
                self.run_aggregate(plan, ctx);
                Ok(())
            }
            StepOperation::Having => {
                if let Some(having) = &plan.query.having {
                    let rows = ctx.rows.drain(..).map(|r| r.record).collect();
                    ctx.rows = apply_having(rows, having).into_iter().map(Row::new).collect();
                }
                Ok(())
            }
            StepOperation::Sort => {
                sort_rows(&mut ctx.rows, &plan.query.order_by);
                Ok(())
            }
            StepOperation::Limit => {
                self.apply_window(ctx, plan.query.limit);
                Ok(())
            }
        }
    }

    /// Run one remote call under the gate.
    async fn call<T, F>(&self, gate: &CallGate, counters: &Counters, call: F) -> EngineResult<T>
    where
        F: Future<Output = T>,
    {
        let _permit = gate.acquire().await?;
        counters.record_call();
        Ok(call.await)
    }

    fn check_records(&self, counters: &Counters, added: usize) -> EngineResult<()> {
        if counters.add_records(added) > self.config.max_records {
            return Err(QueryError::safety_limit("max_records", self.config.max_records));
        }
        Ok(())
    }

    /// Count records fetched by a fan-out task. Past the cap the gate closes,
    /// so sibling tasks stop at their next call.
    fn charge_records(
        &self,
        gate: &CallGate,
        counters: &Counters,
        added: usize,
    ) -> EngineResult<()> {
        self.check_records(counters, added).map_err(|e| {
            gate.close();
            e
        })
    }

    async fn resolve_parents(
        &self,
        plan: &ExecutionPlan,
        entity: &EntitySchema,
        ctx: &ExecutionContext,
        gate: &CallGate,
    ) -> EngineResult<Vec<Parent>> {
        let selector = match (&entity.fetch, &plan.parent_selector) {
            (EntityFetch::Global, _) => return Ok(vec![Parent { id: None, name: None }]),
            (EntityFetch::RequiresParent { .. }, Some(s)) if !s.is_empty() => s,
            (EntityFetch::RequiresParent { filter_field, .. }, _) => {
                return Err(QueryError::parse(format!(
                    "Query for '{}' must select a parent via '{}'",
                    entity.name, filter_field
                )));
            }
        };

        if selector.names.is_empty() {
            return Ok(selector
                .ids
                .iter()
                .map(|id| Parent { id: Some(id.clone()), name: None })
                .collect());
        }

        let lists = self
            .call(gate, &ctx.counters, self.client.lists())
            .await?
            .map_err(|e| QueryError::remote("Failed to resolve list names", "lists", None, e))?;

        let mut parents: Vec<Parent> = selector
            .ids
            .iter()
            .map(|id| Parent {
                id: Some(id.clone()),
                name: lists.iter().find(|l| l.id == *id).map(|l| l.name.clone()),
            })
            .collect();
        for name in &selector.names {
            let list = lists
                .iter()
                .find(|l| l.name == *name)
                .ok_or_else(|| QueryError::execution(format!("List not found: '{}'", name)))?;
            if !parents.iter().any(|p| p.id.as_ref() == Some(&list.id)) {
                parents.push(Parent {
                    id: Some(list.id.clone()),
                    name: Some(list.name.clone()),
                });
            }
        }
        log::debug!("resolved {} parent list(s) for {}", parents.len(), entity.name);
        Ok(parents)
    }

    fn prepare_record(&self, entity: &EntitySchema, parent: &Parent, mut record: Value) -> Value {
        if let EntityFetch::RequiresParent {
            filter_field,
            name_field,
        } = &entity.fetch
        {
            if let Some(obj) = record.as_object_mut() {
                if let Some(id) = &parent.id {
                    obj.insert(filter_field.to_string(), id.clone());
                }
                if let Some(name) = &parent.name {
                    obj.insert(name_field.to_string(), Value::String(name.clone()));
                }
            }
            record = normalize_list_entry_fields(record);
        }
        if !entity.computed_fields.is_empty() {
            record = add_computed_fields(record);
        }
        record
    }

    async fn run_fetch(
        &self,
        plan: &ExecutionPlan,
        entity: &EntitySchema,
        step: &PlanStep,
        ctx: &mut ExecutionContext,
        gate: &CallGate,
    ) -> EngineResult<()> {
        let parents = self.resolve_parents(plan, entity, ctx, gate).await?;

        // Stop early only when nothing downstream needs the full set.
        let target = match (&ctx.resume, plan.streamable) {
            (_, false) => None,
            (Some(ResumeState::FullFetch { total: Some(total), .. }), true) => Some(*total),
            (Some(ResumeState::FullFetch { skip, .. }), true) => {
                plan.query.limit.map(|limit| skip + limit)
            }
            (_, true) => plan.query.limit,
        };

        let (start_parent, mut token, mut page_skip, delivered) = match &ctx.resume {
            Some(ResumeState::Streaming {
                page_token,
                skip,
                parent_index,
                delivered,
            }) => (*parent_index, page_token.clone(), *skip, *delivered),
            _ => (0, None, 0, 0),
        };

        if target == Some(0) {
            return Ok(());
        }

        for (index, parent) in parents.iter().enumerate().skip(start_parent) {
            if index > start_parent {
                token = None;
                page_skip = 0;
            }
            loop {
                let mut request = match &parent.id {
                    Some(id) => ListRequest::with_parent(id.clone()),
                    None => ListRequest::default(),
                };
                request.cursor = token.clone();
                // Ask only for what is still missing, plus the rows a resumed page skips.
                request.limit =
                    target.map(|t| (t.saturating_sub(ctx.rows.len()) + page_skip).max(1));
                let page = self
                    .call(gate, &ctx.counters, self.client.list(entity.name, &request))
                    .await?
                    .map_err(|e| {
                        QueryError::remote(
                            format!("Failed to fetch {}", entity.name),
                            entity.name,
                            parent.id.clone(),
                            e,
                        )
                    })?;

                let page_len = page.data.len();
                let mut consumed = page_skip.min(page_len);
                for record in page.data.into_iter().skip(page_skip) {
                    self.check_records(&ctx.counters, 1)?;
                    ctx.rows.push(Row::new(self.prepare_record(entity, parent, record)));
                    consumed += 1;

                    if Some(ctx.rows.len()) == target {
                        ctx.next_resume = self.stream_position(
                            consumed < page_len,
                            (token.clone(), consumed),
                            page.next_cursor.clone(),
                            (index, parents.len()),
                            delivered + ctx.rows.len(),
                        );
                        self.progress.on_step_progress(step, ctx.rows.len(), target);
                        return Ok(());
                    }
                }
                self.progress.on_step_progress(step, ctx.rows.len(), target);

                page_skip = 0;
                match page.next_cursor {
                    Some(next) => token = Some(next),
                    None => break,
                }
            }
        }
        Ok(())
    }

    /// Resume state after stopping at the target.
    fn stream_position(
        &self,
        mid_page: bool,
        (page_token, consumed): (Option<String>, usize),
        next_page: Option<String>,
        (parent_index, parents): (usize, usize),
        delivered: usize,
    ) -> Option<ResumeState> {
        if mid_page {
            return Some(ResumeState::Streaming {
                page_token,
                skip: consumed,
                parent_index,
                delivered,
            });
        }
        match next_page {
            Some(token) => Some(ResumeState::Streaming {
                page_token: Some(token),
                skip: 0,
                parent_index,
                delivered,
            }),
            None if parent_index + 1 < parents => Some(ResumeState::Streaming {
                page_token: None,
                skip: 0,
                parent_index: parent_index + 1,
                delivered,
            }),
            None => None,
        }
    }

    /// Fetch one relationship for one record.
    async fn fetch_related(
        &self,
        entity: &EntitySchema,
        strategy: &FetchStrategy,
        id: &Value,
        gate: &CallGate,
        counters: &Counters,
    ) -> EngineResult<ClientResult<Vec<Value>>> {
        match strategy {
            FetchStrategy::EntityMethod { method } => {
                let related = self
                    .call(gate, counters, self.client.associated(entity.name, method, id))
                    .await?;
                if let Ok(items) = &related {
                    self.charge_records(gate, counters, items.len())?;
                }
                Ok(related.map(|items| items.into_iter().map(as_record).collect()))
            }
            FetchStrategy::GlobalService {
                service,
                filter_field,
            } => {
                let request = ListRequest::with_filter(*filter_field, id.clone());
                let mut stream = pages(self.client.as_ref(), service, request);
                let mut out = Vec::new();
                loop {
                    let page = match self.call(gate, counters, stream.next()).await? {
                        Some(Ok(page)) => page,
                        Some(Err(e)) => return Ok(Err(e)),
                        None => return Ok(Ok(out)),
                    };
                    self.charge_records(gate, counters, page.data.len())?;
                    let last = page.next_cursor.is_none();
                    out.extend(page.data);
                    if last {
                        return Ok(Ok(out));
                    }
                }
            }
        }
    }

    async fn fetch_expansion(
        &self,
        entity: &EntitySchema,
        name: &str,
        id: &Value,
        gate: &CallGate,
        counters: &Counters,
    ) -> EngineResult<ClientResult<Value>> {
        let value = self
            .call(gate, counters, self.client.expansion(entity.name, name, id))
            .await?;
        if value.is_ok() {
            self.charge_records(gate, counters, 1)?;
        }
        Ok(value)
    }

    async fn run_include(
        &self,
        entity: &EntitySchema,
        step: &PlanStep,
        ctx: &mut ExecutionContext,
        gate: &CallGate,
    ) -> EngineResult<()> {
        let Some(name) = step.target.as_deref() else {
            return Ok(());
        };
        let rel = entity.relationships.get(name).ok_or_else(|| {
            QueryError::validation(format!(
                "Unknown relationship '{}' for entity '{}'",
                name, entity.name
            ))
        })?;
        let strategy = step.strategy.clone().unwrap_or_else(|| rel.fetch_strategy().clone());
        let path = format!("{}.{}", entity.name, name);

        let ids: Vec<Option<Value>> = ctx
            .rows
            .iter()
            .map(|row| row.record.get(entity.id_field).cloned())
            .collect();
        let counters = &ctx.counters;
        let strategy_ref = &strategy;
        let tasks = ids.iter().map(|id| async move {
            match id {
                Some(id) => self.fetch_related(entity, strategy_ref, id, gate, counters).await,
                None => Ok(Ok(Vec::new())),
            }
        });
        let mut results = join_all(tasks).await;
        first_safety_limit(&mut results)?;

        // Every task has finished; report the first failure in row order.
        let mut fetched = Vec::with_capacity(results.len());
        for (id, outcome) in ids.iter().zip(results) {
            match outcome? {
                Ok(rows) => fetched.push(rows),
                Err(e) => {
                    return Err(QueryError::remote(
                        format!("Failed to fetch relationship '{}'", name),
                        path,
                        id.clone(),
                        e,
                    ))
                }
            }
        }
        let total: usize = fetched.iter().map(Vec::len).sum();
        log::debug!("{}: {} related record(s) for {} row(s)", path, total, fetched.len());

        let output = step.purpose.is_some_and(|p| p.is_output());
        for (row, related) in ctx.rows.iter_mut().zip(fetched) {
            row.related.insert(name.to_string(), related);
        }
        if output {
            let flattened: Vec<Value> = ctx
                .rows
                .iter()
                .flat_map(|row| row.related.get(name).cloned().unwrap_or_default())
                .collect();
            ctx.add_included(name, flattened);
        }
        Ok(())
    }

    async fn run_expand(
        &self,
        entity: &EntitySchema,
        step: &PlanStep,
        ctx: &mut ExecutionContext,
        gate: &CallGate,
    ) -> EngineResult<()> {
        let Some(name) = step.target.as_deref() else {
            return Ok(());
        };
        let expansion = schema::get_expansion(name)
            .ok_or_else(|| QueryError::validation(format!("Unknown expansion '{}'", name)))?;
        let id_field = expansion.id_fields.get(entity.name).ok_or_else(|| {
            QueryError::validation(format!(
                "Expansion '{}' is not supported for '{}'",
                name, entity.name
            ))
        })?;
        let path = format!("{}.{}", entity.name, name);

        let ids: Vec<Option<Value>> = ctx
            .rows
            .iter()
            .map(|row| resolve_path(&row.record, id_field).filter(|v| !v.is_null()).cloned())
            .collect();
        let counters = &ctx.counters;
        let tasks = ids.iter().map(|id| async move {
            match id {
                Some(id) => self.fetch_expansion(entity, name, id, gate, counters).await,
                None => Ok(Ok(Value::Null)),
            }
        });
        let mut results = join_all(tasks).await;
        first_safety_limit(&mut results)?;

        let mut values = Vec::with_capacity(results.len());
        for (id, outcome) in ids.iter().zip(results) {
            match outcome? {
                Ok(value) => values.push(value),
                Err(e) => {
                    return Err(QueryError::remote(
                        format!("Failed to expand '{}'", name),
                        path,
                        id.clone(),
                        e,
                    ))
                }
            }
        }
        for (row, value) in ctx.rows.iter_mut().zip(values) {
            if let Some(obj) = row.record.as_object_mut() {
                obj.insert(name.to_string(), value);
            }
        }
        Ok(())
    }

    fn run_aggregate(&self, plan: &ExecutionPlan, ctx: &mut ExecutionContext) {
        let Some(aggregates) = &plan.query.aggregate else {
            return;
        };
        let records: Vec<Value> = ctx.rows.iter().map(Row::view).collect();
        let rows = match &plan.query.group_by {
            Some(field) => group_and_aggregate(&records, field, aggregates),
            None => {
                let values = compute_aggregates(&records, aggregates);
                ctx.aggregates = Some(values.clone());
                vec![Value::Object(values)]
            }
        };
        ctx.rows = rows.into_iter().map(Row::new).collect();
    }

    /// Apply `limit`, then drop rows a full-fetch cursor already delivered.
    fn apply_window(&self, ctx: &mut ExecutionContext, limit: Option<usize>) {
        if let Some(ResumeState::FullFetch { skip, total }) = &ctx.resume {
            let end = total.or(limit.map(|l| skip + l)).unwrap_or(ctx.rows.len());
            ctx.rows.truncate(end);
            let skip = (*skip).min(ctx.rows.len());
            ctx.rows.drain(..skip);
        } else if let Some(limit) = limit {
            ctx.rows.truncate(limit);
        }
    }

    fn build_result(
        &self,
        plan: &ExecutionPlan,
        ctx: ExecutionContext,
    ) -> EngineResult<QueryResult> {
        let elapsed = ctx.elapsed_ms();
        let records: Vec<Value> = ctx.rows.into_iter().map(|row| row.record).collect();
        let data = match &plan.query.select {
            Some(select) => project(records, select),
            None => records,
        };

        let pagination = match ctx.next_resume {
            Some(state) => {
                let hash = cursor::hash_query(&plan.query, self.format.as_str())?;
                let mode = state.mode().to_string();
                let token = cursor::encode(&CursorPayload::new(hash, state))?;
                Some(Pagination {
                    has_more: true,
                    cursor: token,
                    mode,
                })
            }
            None => None,
        };

        let meta = ResultMeta {
            execution_time_ms: elapsed,
            records_fetched: ctx.counters.records(),
            api_calls: ctx.counters.api_calls(),
        };
        log::info!(
            "{}: {} row(s), {} API call(s), {}ms",
            plan.query.from,
            data.len(),
            meta.api_calls,
            meta.execution_time_ms
        );

        Ok(QueryResult {
            data,
            included: ctx.included,
            aggregates: ctx.aggregates,
            pagination,
            warnings: ctx.warnings,
            meta,
        })
    }
}

/// Association accessors return ids or records; ids become `{"id": ..}`.
/// A task that hit `max_records` closed the gate, so its siblings may have
/// failed with `Interrupted`. Surface the limit instead.
fn first_safety_limit<T>(results: &mut Vec<EngineResult<T>>) -> EngineResult<()> {
    let hit = results
        .iter()
        .position(|r| matches!(r, Err(QueryError::SafetyLimit { .. })));
    match hit.map(|i| results.swap_remove(i)) {
        Some(Err(e)) => Err(e),
        _ => Ok(()),
    }
}

fn as_record(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        other => serde_json::json!({ "id": other }),
    }
}

/// Stable multi-key sort. Absent values sort last in either direction.
fn sort_rows(rows: &mut [Row], order_by: &[OrderBy]) {
    rows.sort_by(|a, b| {
        for key in order_by {
            let left = resolve_path(&a.record, &key.field).filter(|v| !v.is_null());
            let right = resolve_path(&b.record, &key.field).filter(|v| !v.is_null());
            let ord = match (left, right) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(l), Some(r)) => {
                    let ord = ordering(Some(l), Some(r))
                        .unwrap_or_else(|| l.to_string().cmp(&r.to_string()));
                    match key.direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    }
                }
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Plan and execute a query in one call.
pub async fn execute_query(
    client: Arc<dyn CrmClient>,
    query: &crate::query::Query,
    config: ExecutorConfig,
) -> EngineResult<QueryResult> {
    let plan = crate::planner::plan_query(query)?;
    QueryExecutor::new(client, config).execute(&plan).await
}
