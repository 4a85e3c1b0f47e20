//! Query execution subsystem for terrasql
//!
//! Two executors consume the planners' output:
//!
//! - the collection executor runs the staged chain over vector tables and
//!   raster stacks (project, filter, group-reduce, sort, limit,
//!   materialize, rename),
//! - the single-image executor dispatches postgis-style raster functions.
//!
//! Backend-originating errors pass through unchanged except for the one
//! recognized recoverable condition (region aggregation rejected without a
//! geometry), which is retried exactly once with the global default.

mod args;
mod collection;
mod errors;
mod image;
mod naming;
mod sorter;

pub use args::{extract_args, ArgSpec, PostgisArg};
pub use collection::{CollectionExecutor, CollectionRequest, DEFAULT_RESULT_LIMIT};
pub use errors::{ExecError, ExecResult};
pub use image::{freedman_diaconis_bins, ImageExecutor, RasterFunction};
pub use naming::OutputNaming;
pub use sorter::RecordSorter;
