//! # crmql
//!
//! A client-side query engine for CRM data.
//!
//! ## Architecture
//!
//! A JSON query is validated against a static schema registry, planned into
//! ordered steps, and executed against a [`client::CrmClient`]:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              JSON Query ($version, from, where, ...)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [query::parse_query + schema]
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Query (Rust Types)                      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [planner]
//! ┌─────────────────────────────────────────────────────────┐
//! │     ExecutionPlan (fetch, include, filter, aggregate,    │
//! │                    sort, limit, expand)                  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [executor + filter + aggregate]
//! ┌─────────────────────────────────────────────────────────┐
//! │           QueryResult (+ pagination cursor)              │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [output]
//! ┌─────────────────────────────────────────────────────────┐
//! │       TOON / Markdown / JSONL / CSV, size-bounded        │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod aggregate;
pub mod client;
pub mod config;
pub mod cursor;
pub mod executor;
pub mod filter;
pub mod output;
pub mod planner;
pub mod query;
pub mod schema;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::aggregate::{AggregateFunc, Aggregates, CountTarget, Operand};
    pub use crate::client::{
        ClientError, ClientResult, CrmClient, FixtureClient, FixtureData, ListRequest, Page,
    };
    pub use crate::config::Settings;
    pub use crate::cursor::{CursorError, CursorPayload, ResumeState};
    pub use crate::executor::{
        CancelHandle, ExecutorConfig, ProgressCallback, QueryExecutor, QueryResult,
    };
    pub use crate::filter::{compile, matches, resolve_path};
    pub use crate::output::{render, truncate, OutputFormat, Truncation};
    pub use crate::planner::{plan_query, ExecutionPlan, QueryPlanner, StepOperation};
    pub use crate::query::{
        parse_query, parse_query_str, Condition, EngineResult, Operator, Query, QueryError,
        WhereClause,
    };
}
