//! Composable filter specifications
//!
//! A `FilterSpec` is the wire description of a predicate the remote service
//! evaluates over collection records. The planner builds these trees; this
//! crate never evaluates them itself.

use serde::Serialize;
use serde_json::Value;

/// A predicate tree over named record fields.
///
/// Leaves always name a field; internal nodes are boolean combinations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum FilterSpec {
    /// field = value
    Eq { field: String, value: Value },
    /// field != value
    Neq { field: String, value: Value },
    /// field < value
    Lt { field: String, value: Value },
    /// field <= value
    Lte { field: String, value: Value },
    /// field > value
    Gt { field: String, value: Value },
    /// field >= value
    Gte { field: String, value: Value },
    /// String field contains the fragment
    StringContains { field: String, value: String },
    /// String field starts with the fragment
    StringStartsWith { field: String, value: String },
    /// String field ends with the fragment
    StringEndsWith { field: String, value: String },
    /// field is one of the listed values
    InList { field: String, values: Vec<Value> },
    /// Negation of the inner predicate
    Not { filter: Box<FilterSpec> },
    /// Both sides must hold
    And {
        left: Box<FilterSpec>,
        right: Box<FilterSpec>,
    },
    /// Either side must hold
    Or {
        left: Box<FilterSpec>,
        right: Box<FilterSpec>,
    },
}

impl FilterSpec {
    /// Equality predicate
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        FilterSpec::Eq {
            field: field.into(),
            value,
        }
    }

    /// Inequality predicate
    pub fn neq(field: impl Into<String>, value: Value) -> Self {
        FilterSpec::Neq {
            field: field.into(),
            value,
        }
    }

    /// Less-than predicate
    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        FilterSpec::Lt {
            field: field.into(),
            value,
        }
    }

    /// Less-than-or-equal predicate
    pub fn lte(field: impl Into<String>, value: Value) -> Self {
        FilterSpec::Lte {
            field: field.into(),
            value,
        }
    }

    /// Greater-than predicate
    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        FilterSpec::Gt {
            field: field.into(),
            value,
        }
    }

    /// Greater-than-or-equal predicate
    pub fn gte(field: impl Into<String>, value: Value) -> Self {
        FilterSpec::Gte {
            field: field.into(),
            value,
        }
    }

    /// Substring-containment predicate
    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        FilterSpec::StringContains {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Prefix predicate
    pub fn starts_with(field: impl Into<String>, value: impl Into<String>) -> Self {
        FilterSpec::StringStartsWith {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Suffix predicate
    pub fn ends_with(field: impl Into<String>, value: impl Into<String>) -> Self {
        FilterSpec::StringEndsWith {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Membership predicate
    pub fn in_list(field: impl Into<String>, values: Vec<Value>) -> Self {
        FilterSpec::InList {
            field: field.into(),
            values,
        }
    }

    /// Wraps the predicate in a negation
    pub fn negate(self) -> Self {
        FilterSpec::Not {
            filter: Box::new(self),
        }
    }

    /// Conjunction of two predicates
    pub fn and(left: FilterSpec, right: FilterSpec) -> Self {
        FilterSpec::And {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Disjunction of two predicates
    pub fn or(left: FilterSpec, right: FilterSpec) -> Self {
        FilterSpec::Or {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Combines an optional accumulated predicate with a new one (AND)
    pub fn merge(existing: Option<FilterSpec>, next: FilterSpec) -> FilterSpec {
        match existing {
            Some(prev) => FilterSpec::and(prev, next),
            None => next,
        }
    }
}
