//! Execution errors

use thiserror::Error;

use crate::backend::BackendError;

/// Result type for executor operations
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors raised while executing a planned query.
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    /// More than one raster function in one query
    #[error("found multiple raster-function keywords, unsure of action")]
    AmbiguousAction,

    /// Image query without any raster function
    #[error("image queries require a raster function such as ST_METADATA or ST_HISTOGRAM")]
    NoRasterFunction,

    /// Postgis function called with the wrong number of arguments
    #[error("{function} expects {expected} arguments, got {found}")]
    ArgumentCount {
        function: String,
        expected: usize,
        found: usize,
    },

    /// Argument of a kind the function cannot accept
    #[error("{function} argument '{argument}' is not a valid {expected}")]
    ArgumentType {
        function: String,
        argument: String,
        expected: &'static str,
    },

    /// Band reference neither a known band name nor a 1-based index
    #[error("'{0}' is not a valid band name in the requested data")]
    InvalidBand(String),

    /// Boolean argument token other than 'true' / 'false'
    #[error("'{0}' is not a boolean; pass 'true' or 'false'")]
    InvalidBoolean(String),

    /// Bin-count argument neither a positive integer nor 'auto'
    #[error("'{0}' is not a bin count; pass a positive integer or 'auto'")]
    InvalidBinCount(String),

    /// Stack aggregation reached without a region geometry
    #[error("stack aggregation requires a region geometry")]
    MissingGeometry,

    /// Backend result lacked an expected field
    #[error("malformed backend result: {0}")]
    MalformedResult(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
