//! Query planning.
//!
//! Turns a validated [`Query`] into an ordered [`ExecutionPlan`]:
//!
//! ```text
//! fetch ─▶ include (filter support) ─▶ filter ─┬─▶ expand ─▶ aggregate ─▶ having ─▶ sort ─▶ limit
//!                                              └─▶ sort ─▶ limit ─▶ include ─▶ expand
//! ```
//!
//! Relationships needed to evaluate `exists`, `all`/`none` or `_count` are
//! fetched before the filter. Output-only includes and expansions run after
//! the limit so only surviving records pay for them.

mod plan;

pub use plan::{ExecutionPlan, IncludePurpose, ParentSelector, PlanStep, StepOperation};

use serde_json::Value;

use crate::query::{Condition, EngineResult, Operator, Query, QueryError, WhereClause};
use crate::schema::{self, EntityFetch, EntitySchema, FetchStrategy};

/// Page size assumed for call estimates.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Builds execution plans.
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    page_size: usize,
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Plan a query with default settings.
pub fn plan_query(query: &Query) -> EngineResult<ExecutionPlan> {
    QueryPlanner::default().plan(query)
}

struct StepBuilder<'a> {
    entity: &'a str,
    steps: Vec<PlanStep>,
}

impl<'a> StepBuilder<'a> {
    fn push(&mut self, operation: StepOperation, description: String) -> &mut PlanStep {
        let step_id = self.steps.len() + 1;
        let depends_on = self.steps.last().map(|s| vec![s.step_id]).unwrap_or_default();
        self.steps.push(PlanStep {
            step_id,
            operation,
            description,
            entity: self.entity.to_string(),
            target: None,
            strategy: None,
            purpose: None,
            depends_on,
            requires_n_plus_1: false,
            estimated_calls: None,
        });
        let last = self.steps.len() - 1;
        &mut self.steps[last]
    }
}

impl QueryPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    fn pages_for(&self, records: usize) -> usize {
        records.div_ceil(self.page_size).max(1)
    }

    /// Build the plan for `query`.
    pub fn plan(&self, query: &Query) -> EngineResult<ExecutionPlan> {
        let entity = schema::get_entity_schema(&query.from)
            .ok_or_else(|| QueryError::validation(format!("Unknown entity '{}'", query.from)))?;

        let (parent_selector, residual_filter) = match (&entity.fetch, &query.filter) {
            (
                EntityFetch::RequiresParent {
                    filter_field,
                    name_field,
                },
                Some(filter),
            ) => {
                let (selector, residual) = split_parent_selector(filter, filter_field, name_field)?;
                (Some(selector), residual)
            }
            _ => (None, query.filter.clone()),
        };

        let streamable = query.limit.is_some()
            && residual_filter.is_none()
            && query.order_by.is_empty()
            && query.aggregate.is_none();

        let mut warnings = Vec::new();
        let mut builder = StepBuilder {
            entity: entity.name,
            steps: Vec::new(),
        };

        // Records flowing through the pipeline, when bounded.
        let fetched = if streamable { query.limit } else { None };
        let parents = parent_selector
            .as_ref()
            .map_or(1, |s| (s.ids.len() + s.names.len()).max(1));
        let name_lookups = parent_selector
            .as_ref()
            .map_or(0, |s| usize::from(!s.names.is_empty()));

        let fetch_description = match &parent_selector {
            Some(selector) => format!(
                "Fetch {} from {} parent list(s){}",
                entity.name,
                parents,
                if selector.names.is_empty() { "" } else { " (resolving list names)" }
            ),
            None => format!("Fetch {} (paginated)", entity.name),
        };
        let fetch = builder.push(StepOperation::Fetch, fetch_description);
        fetch.estimated_calls = fetched.map(|n| parents * self.pages_for(n) + name_lookups);

        let filter_rels: Vec<String> = residual_filter
            .as_ref()
            .map(|f| f.relationship_refs(&|name: &str| entity.relationships.contains_key(name)))
            .unwrap_or_default();

        for name in &filter_rels {
            let purpose = if query.include.contains(name) {
                IncludePurpose::FilterAndOutput
            } else {
                IncludePurpose::Filter
            };
            self.push_include(&mut builder, entity, name, purpose, fetched, &mut warnings);
        }

        if let Some(filter) = &residual_filter {
            builder.push(
                StepOperation::Filter,
                format!("Apply client-side filter ({})", describe_filter(filter)),
            );
        }

        if let Some(aggregates) = &query.aggregate {
            for name in &query.expand {
                self.push_expand(&mut builder, entity, name, None);
            }
            let description = match &query.group_by {
                Some(field) => format!("Group by '{}' and compute {} aggregate(s)", field, aggregates.len()),
                None => format!("Compute {} aggregate(s)", aggregates.len()),
            };
            builder.push(StepOperation::Aggregate, description);
            if query.having.is_some() {
                builder.push(StepOperation::Having, "Filter aggregated rows (having)".to_string());
            }
            self.push_sort_and_limit(&mut builder, query);
        } else {
            self.push_sort_and_limit(&mut builder, query);
            let surviving = query.limit;
            for name in query.include.iter().filter(|n| !filter_rels.contains(n)) {
                self.push_include(
                    &mut builder,
                    entity,
                    name,
                    IncludePurpose::Output,
                    surviving,
                    &mut warnings,
                );
            }
            for name in &query.expand {
                self.push_expand(&mut builder, entity, name, surviving);
            }
        }

        let remote: Vec<Option<usize>> = builder
            .steps
            .iter()
            .filter(|s| s.operation.is_remote())
            .map(|s| s.estimated_calls)
            .collect();
        let estimated_api_calls = remote.into_iter().sum::<Option<usize>>();

        if query.limit.is_none() && builder.steps.iter().any(|s| s.requires_n_plus_1) {
            warnings.push(format!(
                "Query has no limit; relationship fetches scale with the number of {} records",
                entity.name
            ));
        }

        Ok(ExecutionPlan {
            query: query.clone(),
            steps: builder.steps,
            residual_filter,
            parent_selector,
            streamable,
            estimated_api_calls,
            warnings,
        })
    }

    fn push_include(
        &self,
        builder: &mut StepBuilder<'_>,
        entity: &EntitySchema,
        name: &str,
        purpose: IncludePurpose,
        records: Option<usize>,
        warnings: &mut Vec<String>,
    ) {
        let Some(rel) = entity.relationships.get(name) else {
            return;
        };
        let strategy = rel.fetch_strategy().clone();
        let how = match &strategy {
            FetchStrategy::EntityMethod { method } => format!("via {}", method),
            FetchStrategy::GlobalService {
                service,
                filter_field,
            } => format!("via {} filtered by {}", service, filter_field),
        };
        let role = match purpose {
            IncludePurpose::Filter => " for filtering",
            IncludePurpose::FilterAndOutput => " for filtering and output",
            IncludePurpose::Output => "",
        };
        let step = builder.push(
            StepOperation::Include,
            format!("Include '{}' ({}){}", name, how, role),
        );
        step.target = Some(name.to_string());
        step.strategy = Some(strategy);
        step.purpose = Some(purpose);
        step.requires_n_plus_1 = rel.requires_n_plus_1;
        step.estimated_calls = records;

        if rel.requires_n_plus_1 {
            warnings.push(format!(
                "Relationship '{}' requires one API call per {} record (N+1, {})",
                name,
                entity.name,
                rel.fetch_strategy().name()
            ));
        }
    }

    fn push_expand(
        &self,
        builder: &mut StepBuilder<'_>,
        entity: &EntitySchema,
        name: &str,
        records: Option<usize>,
    ) {
        let description = schema::get_expansion(name)
            .map_or_else(|| name.to_string(), |def| def.description.to_string());
        let step = builder.push(
            StepOperation::Expand,
            format!("Expand '{}' on {}: {}", name, entity.name, description),
        );
        step.target = Some(name.to_string());
        step.requires_n_plus_1 = true;
        step.estimated_calls = records;
    }

    fn push_sort_and_limit(&self, builder: &mut StepBuilder<'_>, query: &Query) {
        if !query.order_by.is_empty() {
            let keys: Vec<String> = query
                .order_by
                .iter()
                .map(|o| format!("{} {:?}", o.field, o.direction).to_lowercase())
                .collect();
            builder.push(StepOperation::Sort, format!("Sort by {}", keys.join(", ")));
        }
        if let Some(limit) = query.limit {
            builder.push(StepOperation::Limit, format!("Limit to {} record(s)", limit));
        }
    }
}

fn describe_filter(filter: &WhereClause) -> String {
    let mut paths = Vec::new();
    filter.for_each_condition(&mut |c: &Condition| {
        if !paths.contains(&c.path) {
            paths.push(c.path.clone());
        }
    });
    if paths.is_empty() {
        "relationship predicates".to_string()
    } else {
        paths.join(", ")
    }
}

fn is_selector(clause: &WhereClause, id_field: &str, name_field: &str) -> bool {
    matches!(
        clause,
        WhereClause::Comparison(Condition { path, op: Operator::Eq | Operator::In, .. })
            if path == id_field || path == name_field
    )
}

/// Parent id from a where value: integers, or strings of digits.
fn parent_id(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

fn references_parent(clause: &WhereClause, id_field: &str, name_field: &str) -> bool {
    let mut found = false;
    clause.for_each_condition(&mut |c: &Condition| {
        found |= c.path == id_field || c.path == name_field;
    });
    found
}

fn selector_values<'v>(condition: &'v Condition) -> EngineResult<Vec<&'v Value>> {
    match (condition.op, &condition.value) {
        (Operator::Eq, Some(value)) => Ok(vec![value]),
        (Operator::In, Some(Value::Array(items))) => Ok(items.iter().collect()),
        (op, _) => Err(QueryError::parse(format!(
            "'{}' only supports the 'eq' and 'in' operators, got '{}'",
            condition.path,
            op.as_str()
        ))),
    }
}

fn intersect(
    left: ParentSelector,
    right: ParentSelector,
    id_field: &str,
    name_field: &str,
) -> EngineResult<ParentSelector> {
    let ids_only = |s: &ParentSelector| s.names.is_empty() && !s.ids.is_empty();
    let names_only = |s: &ParentSelector| s.ids.is_empty() && !s.names.is_empty();
    if ids_only(&left) && ids_only(&right) {
        let ids = left.ids.into_iter().filter(|id| right.ids.contains(id)).collect();
        Ok(ParentSelector { ids, names: Vec::new() })
    } else if names_only(&left) && names_only(&right) {
        let names = left.names.into_iter().filter(|n| right.names.contains(n)).collect();
        Ok(ParentSelector { ids: Vec::new(), names })
    } else if left.is_empty() || right.is_empty() {
        Ok(ParentSelector::default())
    } else {
        Err(QueryError::parse(format!(
            "'{}' and '{}' cannot be combined with 'and'; select the parent by one of them",
            id_field, name_field
        )))
    }
}

fn collect_selector(
    clause: &WhereClause,
    id_field: &str,
    name_field: &str,
) -> EngineResult<Option<ParentSelector>> {
    match clause {
        WhereClause::Comparison(condition) if condition.path == id_field => {
            let mut selector = ParentSelector::default();
            for value in selector_values(condition)? {
                let id = parent_id(value).ok_or_else(|| {
                    QueryError::parse(format!(
                        "Invalid '{}' value {}: expected an integer id",
                        id_field, value
                    ))
                })?;
                push_unique(&mut selector.ids, id);
            }
            Ok(Some(selector))
        }
        WhereClause::Comparison(condition) if condition.path == name_field => {
            let mut selector = ParentSelector::default();
            for value in selector_values(condition)? {
                let name = value.as_str().ok_or_else(|| {
                    QueryError::parse(format!(
                        "Invalid '{}' value {}: expected a string",
                        name_field, value
                    ))
                })?;
                push_unique(&mut selector.names, name.to_string());
            }
            Ok(Some(selector))
        }
        WhereClause::Comparison(_) => Ok(None),
        WhereClause::And { and: clauses } => {
            let mut combined: Option<ParentSelector> = None;
            for c in clauses {
                if let Some(next) = collect_selector(c, id_field, name_field)? {
                    combined = Some(match combined {
                        Some(prev) => intersect(prev, next, id_field, name_field)?,
                        None => next,
                    });
                }
            }
            Ok(combined)
        }
        WhereClause::Or { or: clauses } => {
            let mut union = ParentSelector::default();
            let mut bounded = !clauses.is_empty();
            for c in clauses {
                match collect_selector(c, id_field, name_field)? {
                    Some(s) => {
                        s.ids.into_iter().for_each(|id| push_unique(&mut union.ids, id));
                        s.names.into_iter().for_each(|n| push_unique(&mut union.names, n));
                    }
                    None => bounded = false,
                }
            }
            Ok(bounded.then_some(union))
        }
        WhereClause::Not { not } if references_parent(not, id_field, name_field) => {
            Err(QueryError::parse(format!(
                "'{}' and '{}' cannot be negated; select the parent with 'eq' or 'in'",
                id_field, name_field
            )))
        }
        _ => Ok(None),
    }
}

/// Parents selected by a where clause.
///
/// Selectors are `eq`/`in` conditions on `id_field` (integer ids) or
/// `name_field` (strings). `and` intersects them, `or` unions them and is
/// bounded only when every branch is. `Ok(None)` means the clause does not
/// bound the parents. A selector under `not`, with another operator, or
/// with a value of the wrong type is an error.
pub fn parent_selector(
    filter: &WhereClause,
    id_field: &str,
    name_field: &str,
) -> EngineResult<Option<ParentSelector>> {
    collect_selector(filter, id_field, name_field)
}

/// Split the parent selector out of a where clause.
///
/// The returned residual drops selector conditions only where that is
/// exact: a bare selector or a direct child of a top-level `and`.
pub fn split_parent_selector(
    filter: &WhereClause,
    id_field: &str,
    name_field: &str,
) -> EngineResult<(ParentSelector, Option<WhereClause>)> {
    let selector = parent_selector(filter, id_field, name_field)?.unwrap_or_default();

    let residual = match filter {
        c if is_selector(c, id_field, name_field) => None,
        WhereClause::And { and } => {
            let rest: Vec<WhereClause> = and
                .iter()
                .filter(|c| !is_selector(c, id_field, name_field))
                .cloned()
                .collect();
            match rest.len() {
                n if n == and.len() => Some(filter.clone()),
                0 => None,
                1 => rest.into_iter().next(),
                _ => Some(WhereClause::and(rest)),
            }
        }
        other => Some(other.clone()),
    };
    Ok((selector, residual))
}
