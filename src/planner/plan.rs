//! Execution plan types.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::query::{Query, WhereClause};
use crate::schema::FetchStrategy;

/// What a plan step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOperation {
    /// Paginated base fetch.
    Fetch,
    /// Fetch a relationship for every record.
    Include,
    /// Merge a computed enrichment into every record.
    Expand,
    /// Client-side where evaluation.
    Filter,
    Aggregate,
    Having,
    Sort,
    Limit,
}

impl StepOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOperation::Fetch => "fetch",
            StepOperation::Include => "include",
            StepOperation::Expand => "expand",
            StepOperation::Filter => "filter",
            StepOperation::Aggregate => "aggregate",
            StepOperation::Having => "having",
            StepOperation::Sort => "sort",
            StepOperation::Limit => "limit",
        }
    }

    /// Steps that issue remote calls.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            StepOperation::Fetch | StepOperation::Include | StepOperation::Expand
        )
    }
}

impl fmt::Display for StepOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an include step exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludePurpose {
    /// Needed by `exists`, `all`/`none` or `_count` in the filter. Rows are
    /// attached to records but not reported as included output.
    Filter,
    /// Requested via `include`.
    Output,
    /// Both.
    FilterAndOutput,
}

impl IncludePurpose {
    pub fn is_output(&self) -> bool {
        !matches!(self, IncludePurpose::Filter)
    }
}

/// One stage of execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanStep {
    pub step_id: usize,
    pub operation: StepOperation,
    pub description: String,
    pub entity: String,
    /// Relationship (include) or expansion (expand) name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<FetchStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<IncludePurpose>,
    pub depends_on: Vec<usize>,
    pub requires_n_plus_1: bool,
    /// Remote calls this step is expected to make, when bounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_calls: Option<usize>,
}

/// Parents selected in `where` for per-parent entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParentSelector {
    pub ids: Vec<Value>,
    pub names: Vec<String>,
}

impl ParentSelector {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.names.is_empty()
    }
}

/// An ordered plan for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub query: Query,
    pub steps: Vec<PlanStep>,
    /// Where clause left for client-side evaluation after the fetch consumed
    /// the parent selector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residual_filter: Option<WhereClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_selector: Option<ParentSelector>,
    /// The base fetch may stop as soon as `limit` records arrived.
    pub streamable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_api_calls: Option<usize>,
    pub warnings: Vec<String>,
}

impl ExecutionPlan {
    pub fn step(&self, operation: StepOperation) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.operation == operation)
    }

    pub fn has_step(&self, operation: StepOperation) -> bool {
        self.step(operation).is_some()
    }

    /// Operation names in execution order.
    pub fn operations(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.operation.as_str()).collect()
    }

    /// Human-readable plan, one step per line.
    pub fn explain(&self) -> String {
        let mut out = format!("Execution plan for '{}':\n", self.query.from);
        for step in &self.steps {
            out.push_str(&format!("  {}. [{}] {}", step.step_id, step.operation, step.description));
            if let Some(calls) = step.estimated_calls {
                out.push_str(&format!(" (~{} calls)", calls));
            }
            if step.requires_n_plus_1 {
                out.push_str(" [N+1]");
            }
            out.push('\n');
        }
        match self.estimated_api_calls {
            Some(calls) => out.push_str(&format!("Estimated API calls: {}\n", calls)),
            None => out.push_str("Estimated API calls: unbounded (no limit)\n"),
        }
        for warning in &self.warnings {
            out.push_str(&format!("Warning: {}\n", warning));
        }
        out
    }
}
