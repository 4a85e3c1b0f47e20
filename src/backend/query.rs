//! Collection query descriptions
//!
//! A `CollectionQuery` is the ordered call plan the executor emits for a
//! vector table or raster stack: projection, predicate, spatial bounds,
//! single-key sort, and a result ceiling. The backend applies the stages in
//! exactly this order.

use serde::Serialize;

use super::filter::FilterSpec;
use super::geometry::Geometry;
use super::reducer::{ImageReduce, RegionReduce};

/// The two collection shapes the backend serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectionKind {
    /// Vector feature table
    Table,
    /// Ordered raster-image stack sharing a band schema
    ImageStack,
}

/// Field restriction applied before any other stage.
///
/// Stacks cannot project bands and properties simultaneously; band selection
/// replaces property selection entirely (a backend limitation).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Projection {
    Columns(Vec<String>),
    Bands(Vec<String>),
}

/// Single sort key; the backend cannot multi-key-sort collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub field: String,
    pub ascending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }
}

/// Ordered stage description for one collection traversal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionQuery {
    pub asset_id: String,
    pub kind: CollectionKind,
    pub projection: Option<Projection>,
    pub filter: Option<FilterSpec>,
    pub bounds: Option<Geometry>,
    pub sort: Option<SortKey>,
    pub limit: Option<u64>,
}

impl CollectionQuery {
    pub fn new(asset_id: impl Into<String>, kind: CollectionKind) -> Self {
        Self {
            asset_id: asset_id.into(),
            kind,
            projection: None,
            filter: None,
            bounds: None,
            sort: None,
            limit: None,
        }
    }
}

/// Full aggregation plan for a raster stack: filter the stack, collapse it
/// with the per-image reducer, then region-reduce the collapsed image to
/// scalars.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackAggregation {
    pub query: CollectionQuery,
    pub per_image: ImageReduce,
    pub region: RegionReduce,
}
