//! Backend contract for terrasql
//!
//! Plain-data plan types (filters, reducers, collection queries, geometry)
//! plus the `GeoBackend` trait the executors call. The crate only emits
//! these descriptions; executing them is the remote service's job.

mod filter;
mod geometry;
mod query;
mod reducer;
mod service;

pub use filter::FilterSpec;
pub use geometry::Geometry;
pub use query::{CollectionKind, CollectionQuery, Projection, SortKey, StackAggregation};
pub use reducer::{
    ColumnReduce, ImageReduce, ReducerKind, ReducerSpec, RegionReduce, MAX_PIXELS, PARALLEL_SCALE,
    REGION_SCALE, TILE_SCALE,
};
pub use service::{BackendError, BackendResult, GeoBackend, Record};
