//! Query model, parser and error types.

mod error;
mod model;
mod parser;

pub use error::{EngineResult, QueryError};
pub use model::{
    Condition, Direction, Exists, Operator, OrderBy, Quantifier, Query, WhereClause,
    CURRENT_VERSION, SUPPORTED_VERSIONS,
};
pub use parser::{parse_query, parse_query_file, parse_query_str, ParseResult};
