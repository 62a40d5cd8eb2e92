//! Typed query model.
//!
//! Built by [`crate::query::parse`] from raw JSON. Every type serializes back
//! to the same JSON shape it was parsed from, which is what the cursor codec
//! hashes.

use serde::Serialize;
use serde_json::Value;

use crate::aggregate::Aggregates;

/// Version assumed when `$version` is missing.
pub const CURRENT_VERSION: &str = "1.0";

/// Query versions this engine understands.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// A validated query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(rename = "$version")]
    pub version: String,
    pub from: String,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<WhereClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expand: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Aggregates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub having: Option<WhereClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Query {
    /// Create an unfiltered query over an entity.
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            from: from.into(),
            filter: None,
            select: None,
            include: Vec::new(),
            expand: Vec::new(),
            order_by: Vec::new(),
            group_by: None,
            aggregate: None,
            having: None,
            limit: None,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        self.aggregate.is_some()
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One `orderBy` entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
    In,
    Between,
    IsNull,
    IsNotNull,
    IsEmpty,
    ContainsAny,
    ContainsAll,
    HasAny,
    HasAll,
}

impl Operator {
    pub const ALL: &'static [Operator] = &[
        Operator::Eq,
        Operator::Neq,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::Contains,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::In,
        Operator::Between,
        Operator::IsNull,
        Operator::IsNotNull,
        Operator::IsEmpty,
        Operator::ContainsAny,
        Operator::ContainsAll,
        Operator::HasAny,
        Operator::HasAll,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Contains => "contains",
            Operator::StartsWith => "starts_with",
            Operator::EndsWith => "ends_with",
            Operator::In => "in",
            Operator::Between => "between",
            Operator::IsNull => "is_null",
            Operator::IsNotNull => "is_not_null",
            Operator::IsEmpty => "is_empty",
            Operator::ContainsAny => "contains_any",
            Operator::ContainsAll => "contains_all",
            Operator::HasAny => "has_any",
            Operator::HasAll => "has_all",
        }
    }

    /// Operators that take no `value`.
    pub fn is_unary(&self) -> bool {
        matches!(self, Operator::IsNull | Operator::IsNotNull | Operator::IsEmpty)
    }

    /// Operators whose `value` must be a JSON array.
    pub fn takes_list(&self) -> bool {
        matches!(
            self,
            Operator::In
                | Operator::Between
                | Operator::ContainsAny
                | Operator::ContainsAll
                | Operator::HasAny
                | Operator::HasAll
        )
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `path op value` comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub path: String,
    pub op: Operator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Condition {
    pub fn new(path: impl Into<String>, op: Operator, value: Option<Value>) -> Self {
        Self {
            path: path.into(),
            op,
            value,
        }
    }
}

/// `all` / `none` quantifier over an array-valued path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quantifier {
    pub path: String,
    #[serde(rename = "where")]
    pub condition: Box<WhereClause>,
}

/// `exists` over an included relationship.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exists {
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub condition: Option<Box<WhereClause>>,
}

impl Exists {
    /// Key under which the related rows live on a record.
    pub fn key(&self) -> &str {
        self.via.as_deref().unwrap_or(&self.from)
    }
}

/// A filter tree. Also used for `having`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WhereClause {
    Comparison(Condition),
    And {
        and: Vec<WhereClause>,
    },
    Or {
        or: Vec<WhereClause>,
    },
    Not {
        not: Box<WhereClause>,
    },
    All {
        all: Quantifier,
    },
    None {
        none: Quantifier,
    },
    Exists {
        exists: Exists,
    },
}

impl WhereClause {
    pub fn cmp(path: impl Into<String>, op: Operator, value: Value) -> Self {
        WhereClause::Comparison(Condition::new(path, op, Some(value)))
    }

    pub fn and(clauses: Vec<WhereClause>) -> Self {
        WhereClause::And { and: clauses }
    }

    pub fn or(clauses: Vec<WhereClause>) -> Self {
        WhereClause::Or { or: clauses }
    }

    pub fn negate(clause: WhereClause) -> Self {
        WhereClause::Not {
            not: Box::new(clause),
        }
    }

    /// Visit every comparison in the tree, including those nested in quantifiers.
    pub fn for_each_condition<'a>(&'a self, f: &mut impl FnMut(&'a Condition)) {
        match self {
            WhereClause::Comparison(c) => f(c),
            WhereClause::And { and: clauses } | WhereClause::Or { or: clauses } => {
                for clause in clauses {
                    clause.for_each_condition(f);
                }
            }
            WhereClause::Not { not } => not.for_each_condition(f),
            WhereClause::All { all: q } | WhereClause::None { none: q } => {
                q.condition.for_each_condition(f)
            }
            WhereClause::Exists { exists } => {
                if let Some(inner) = &exists.condition {
                    inner.for_each_condition(f);
                }
            }
        }
    }

    /// Relationship names this clause needs attached to each record.
    ///
    /// Covers `exists`, `all`/`none` over a relationship, and `<rel>._count`
    /// comparisons. Nested sub-clauses of quantifiers are evaluated against
    /// related rows, so they are not searched.
    pub fn relationship_refs(&self, is_relationship: &dyn Fn(&str) -> bool) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_relationship_refs(is_relationship, &mut out);
        out
    }

    fn collect_relationship_refs(
        &self,
        is_relationship: &dyn Fn(&str) -> bool,
        out: &mut Vec<String>,
    ) {
        match self {
            WhereClause::Comparison(c) => {
                if let Some(rel) = c.path.strip_suffix("._count") {
                    push_unique(out, is_relationship, rel);
                }
            }
            WhereClause::And { and: clauses } | WhereClause::Or { or: clauses } => {
                for clause in clauses {
                    clause.collect_relationship_refs(is_relationship, out);
                }
            }
            WhereClause::Not { not } => not.collect_relationship_refs(is_relationship, out),
            WhereClause::All { all: q } | WhereClause::None { none: q } => {
                push_unique(out, is_relationship, &q.path)
            }
            WhereClause::Exists { exists } => push_unique(out, is_relationship, exists.key()),
        }
    }
}

fn push_unique(out: &mut Vec<String>, is_relationship: &dyn Fn(&str) -> bool, name: &str) {
    if is_relationship(name) && !out.iter().any(|n| n == name) {
        out.push(name.to_string());
    }
}
