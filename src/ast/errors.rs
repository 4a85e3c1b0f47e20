//! AST input errors

use thiserror::Error;

/// Result type for AST parsing
pub type AstResult<T> = Result<T, AstError>;

/// Errors raised while reading the conversion service's JSON AST.
#[derive(Debug, Clone, Error)]
pub enum AstError {
    #[error("AST node is not an object: {0}")]
    NotAnObject(String),

    #[error("AST node of type '{node_type}' is missing field '{field}'")]
    MissingField {
        node_type: String,
        field: &'static str,
    },

    #[error("malformed '{clause}' clause: {reason}")]
    MalformedClause {
        clause: &'static str,
        reason: String,
    },
}

impl AstError {
    pub fn missing_field(node_type: impl Into<String>, field: &'static str) -> Self {
        AstError::MissingField {
            node_type: node_type.into(),
            field,
        }
    }

    pub fn malformed(clause: &'static str, reason: impl Into<String>) -> Self {
        AstError::MalformedClause {
            clause,
            reason: reason.into(),
        }
    }
}
