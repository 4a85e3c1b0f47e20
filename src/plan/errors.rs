//! Planning errors
//!
//! All planning errors are raised before any backend call and are never
//! retried.

use thiserror::Error;

/// Result type for planning operations
pub type PlanResult<T> = Result<T, PlanError>;

/// Errors raised while planning a query.
#[derive(Debug, Clone, Error)]
pub enum PlanError {
    /// Name matched neither the schema columns nor the band list
    #[error("unknown column or band '{0}'")]
    UnknownName(String),

    /// Filter leaf resolved to nothing
    #[error("unknown column '{0}' in WHERE clause")]
    UnknownColumn(String),

    /// Filter leaf resolved to a band; band-value filtering is unsupported
    #[error("filtering by band '{0}' is unsupported")]
    BandFilter(String),

    /// Comparison operator token not in the supported set
    #[error("unsupported operator '{0}'")]
    UnsupportedOperator(String),

    /// Comparison shape the builder cannot interpret
    #[error("malformed comparison: {0}")]
    MalformedComparison(String),

    /// Two select entries produce the same output name
    #[error("duplicate alias '{0}'")]
    DuplicateAlias(String),

    /// `*` passed to an aggregate function
    #[error("'*' is not a valid argument to {0}")]
    WildcardArgument(String),

    /// Aggregate called with no column or band argument
    #[error("aggregate function {0} requires an argument")]
    MissingArgument(String),

    /// IS accepts only NULL / NOT NULL operands
    #[error("IS only supports NULL or NOT NULL, got '{0}'")]
    InvalidIsOperand(String),

    /// BETWEEN requires a two-element bound list
    #[error("BETWEEN requires exactly two bounds")]
    BetweenBounds,

    /// Embedded or caller-supplied GeoJSON held no usable geometry
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}
