//! Metadata and dispatch errors

use thiserror::Error;

use crate::backend::BackendError;

/// Result type for metadata operations
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Errors raised while describing a dataset.
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// Asset type tag not one of Image / ImageCollection / Table
    #[error("invalid type '{0}'")]
    InvalidType(String),

    /// Asset description lacked a type tag entirely
    #[error("asset description for '{0}' has no type tag")]
    MissingType(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
