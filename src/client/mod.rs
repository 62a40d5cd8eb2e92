//! The remote API collaborator.
//!
//! The engine never builds HTTP requests. Everything it needs from the CRM
//! goes through [`CrmClient`], which owns transport, retries and backoff.

mod fixture;

pub use fixture::{FixtureClient, FixtureData};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by a client implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to load fixture: {0}")]
    Fixture(String),
}

impl ClientError {
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported(what.into())
    }
}

/// Parameters of one list call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListRequest {
    /// Parent id for entities listed per parent (list entries).
    pub parent_id: Option<Value>,
    /// Equality filters the remote API applies, e.g. `person_id`.
    pub filters: Map<String, Value>,
    /// Page size hint.
    pub limit: Option<usize>,
    /// Opaque page token from a previous [`Page::next_cursor`].
    pub cursor: Option<String>,
}

impl ListRequest {
    pub fn with_parent(parent_id: Value) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::default()
        }
    }

    pub fn with_filter(field: impl Into<String>, value: Value) -> Self {
        let mut filters = Map::new();
        filters.insert(field.into(), value);
        Self {
            filters,
            ..Self::default()
        }
    }

    pub fn at_cursor(&self, cursor: Option<String>) -> Self {
        Self {
            cursor,
            ..self.clone()
        }
    }
}

/// One page of a list response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub data: Vec<Value>,
    #[serde(rename = "nextCursor", default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// A list (pipeline) that list entries belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListInfo {
    pub id: Value,
    pub name: String,
}

/// Read access to the CRM.
///
/// Implementations must be shareable across the concurrent tasks of one
/// query. Use [`pages`] to follow `next_cursor` across a list call.
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// List one page of `entity`.
    async fn list(&self, entity: &str, request: &ListRequest) -> ClientResult<Page>;

    /// Fetch one record by id.
    async fn get(&self, entity: &str, id: &Value) -> ClientResult<Value>;

    /// Call an association accessor, e.g. `get_associated_company_ids`.
    ///
    /// Elements are ids or full records.
    async fn associated(&self, entity: &str, method: &str, id: &Value) -> ClientResult<Vec<Value>> {
        let _ = id;
        Err(ClientError::unsupported(format!("{}.{}", entity, method)))
    }

    /// Fetch a computed enrichment for one record.
    async fn expansion(&self, entity: &str, name: &str, id: &Value) -> ClientResult<Value> {
        let _ = id;
        Err(ClientError::unsupported(format!("{}.{}", entity, name)))
    }

    /// All lists visible to the caller.
    async fn lists(&self) -> ClientResult<Vec<ListInfo>>;
}

/// Auto-paginating stream of pages, starting at `request.cursor`.
pub fn pages<'a, C>(
    client: &'a C,
    entity: &'a str,
    request: ListRequest,
) -> BoxStream<'a, ClientResult<Page>>
where
    C: CrmClient + ?Sized,
{
    stream::unfold(Some(request), move |state| async move {
        let request = state?;
        match client.list(entity, &request).await {
            Ok(page) => {
                let next = page
                    .next_cursor
                    .clone()
                    .map(|cursor| request.at_cursor(Some(cursor)));
                Some((Ok(page), next))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}
