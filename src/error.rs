//! Top-level error surface
//!
//! Errors propagate to the caller uncaught; there is no internal
//! error-code translation layer. A query either fully succeeds or raises.

use thiserror::Error;

use crate::ast::AstError;
use crate::exec::ExecError;
use crate::metadata::MetadataError;
use crate::plan::PlanError;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Any error a query can raise.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Query has no FROM clause to resolve a dataset from
    #[error("query has no FROM clause")]
    MissingFrom,

    #[error(transparent)]
    Ast(#[from] AstError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}
