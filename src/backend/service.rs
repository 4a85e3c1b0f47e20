//! Backend service contract
//!
//! The remote geospatial service is reached exclusively through the
//! `GeoBackend` trait. Calls block the requesting thread; there is no
//! client-side timeout or cancellation.

use serde_json::{Map, Value};
use thiserror::Error;

use super::query::{CollectionQuery, StackAggregation};
use super::reducer::{ColumnReduce, RegionReduce};

/// A materialized result record: output field name to value.
pub type Record = Map<String, Value>;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors originating in the remote service.
///
/// Only `RegionRequired` is recoverable (single retry with a substituted
/// default geometry); everything else propagates to the caller unchanged.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Composite/mosaic assets reject region aggregation without a geometry
    #[error("region aggregation requires a geometry for asset '{0}'")]
    RegionRequired(String),

    /// Asset identifier unknown to the service
    #[error("asset not found: {0}")]
    UnknownAsset(String),

    /// Any other service-side failure, surfaced verbatim
    #[error("backend service error: {0}")]
    Service(String),
}

/// Operations the core needs from the remote geospatial service.
///
/// # Result-key wire contract
///
/// - `reduce_columns`: each primitive reducer contributes its canonical
///   output name as a record key holding a positional list, one slot per
///   repeat. Grouped reductions return one record per distinct group-key
///   combination, with the group fields present alongside the aggregates.
/// - `aggregate_stack` / `reduce_region`: keys concatenate the band name
///   with the applied reducer output names in application order
///   (`{band}_{func}` after one application, `{band}_{func}_{func}` after
///   two).
pub trait GeoBackend {
    /// Raw asset description (type tag, columns, bands, properties).
    fn asset_info(&self, asset_id: &str) -> BackendResult<Value>;

    /// Materializes the first member of a stack; used to backfill band and
    /// property metadata when stack-level introspection reports none.
    fn first_stack_member(&self, asset_id: &str) -> BackendResult<Value>;

    /// Number of records the query would materialize, before any limit.
    fn collection_size(&self, query: &CollectionQuery) -> BackendResult<u64>;

    /// Runs the staged query and fetches the resulting records.
    fn materialize(&self, query: &CollectionQuery) -> BackendResult<Vec<Record>>;

    /// Applies a column reducer (optionally grouped) over the query's
    /// records.
    fn reduce_columns(
        &self,
        query: &CollectionQuery,
        reduce: &ColumnReduce,
    ) -> BackendResult<Vec<Record>>;

    /// Collapses a stack with the per-image reducer, then region-reduces the
    /// collapsed image to one scalar record.
    fn aggregate_stack(&self, aggregation: &StackAggregation) -> BackendResult<Record>;

    /// Region-reduces the named bands of a single raster.
    fn reduce_region(
        &self,
        asset_id: &str,
        bands: &[String],
        reduce: &RegionReduce,
    ) -> BackendResult<Record>;
}
