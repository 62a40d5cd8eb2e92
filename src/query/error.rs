//! Error taxonomy for query parsing, validation and execution.

use serde_json::Value;
use thiserror::Error;

use crate::client::ClientError;
use crate::cursor::CursorError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, QueryError>;

/// Errors raised while turning a JSON query into results.
///
/// `Parse` and `Validation` are always raised before any remote call.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Malformed JSON, unknown operator, unsupported version, missing selector.
    #[error("{message}")]
    Parse { message: String },

    /// Invalid field path, conflicting options, wrong operator arity.
    #[error("{message}")]
    Validation {
        message: String,
        /// Query key or field path that failed validation.
        field: Option<String>,
    },

    /// Unclassified step failure.
    #[error("{message}{}", describe_context(.path, .value))]
    Execution {
        message: String,
        /// Step or relationship path being executed.
        path: Option<String>,
        /// Offending value (usually a record id).
        value: Option<Value>,
        #[source]
        source: Option<ClientError>,
    },

    /// Record or cost budget exceeded.
    #[error("{message}")]
    SafetyLimit {
        message: String,
        limit_name: &'static str,
        limit_value: usize,
    },

    /// Wall-clock deadline exceeded.
    #[error("Query execution exceeded timeout of {seconds}s")]
    Timeout { seconds: f64 },

    /// Cancelled by an external signal.
    #[error("Query execution was interrupted")]
    Interrupted,

    /// Resume token rejected.
    #[error(transparent)]
    Cursor(#[from] CursorError),
}

fn describe_context(path: &Option<String>, value: &Option<Value>) -> String {
    match (path, value) {
        (Some(p), Some(v)) => format!(" (at {} = {})", p, v),
        (Some(p), None) => format!(" (at {})", p),
        (None, Some(v)) => format!(" (value {})", v),
        (None, None) => String::new(),
    }
}

impl QueryError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error tied to a specific query key or path.
    pub fn validation_at(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            path: None,
            value: None,
            source: None,
        }
    }

    /// Wrap a client failure with the path and value that triggered it.
    pub fn remote(
        message: impl Into<String>,
        path: impl Into<String>,
        value: Option<Value>,
        source: ClientError,
    ) -> Self {
        Self::Execution {
            message: message.into(),
            path: Some(path.into()),
            value,
            source: Some(source),
        }
    }

    pub fn safety_limit(limit_name: &'static str, limit_value: usize) -> Self {
        Self::SafetyLimit {
            message: format!(
                "Query would exceed maximum of {} records ({})",
                limit_value, limit_name
            ),
            limit_name,
            limit_value,
        }
    }

    /// Check if this error was raised before any remote call.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::Validation { .. } | Self::Cursor(_))
    }

    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "ParseError",
            Self::Validation { .. } => "ValidationError",
            Self::Execution { .. } => "ExecutionError",
            Self::SafetyLimit { .. } => "SafetyLimitError",
            Self::Timeout { .. } => "TimeoutError",
            Self::Interrupted => "InterruptedError",
            Self::Cursor(_) => "CursorError",
        }
    }
}
