//! Reducer specifications
//!
//! Reducers describe backend-side aggregation. A `ReducerSpec` tree mirrors
//! the service's object-chaining API: primitives, binary combination, and
//! grouping wraps. Combination order is significant because the service
//! derives result keys from it; the output-naming stage must replicate the
//! same order exactly.

use serde::Serialize;

use super::geometry::Geometry;

/// Ceiling on pixels examined by a region reduction.
pub const MAX_PIXELS: u64 = 900_000_000;
/// Tile-scale hint passed with region reductions to bound compute cost.
pub const TILE_SCALE: u32 = 10;
/// Nominal scale (meters per pixel) for region reductions.
pub const REGION_SCALE: u32 = 90;
/// Parallelism hint for whole-stack pixel reductions.
pub const PARALLEL_SCALE: u32 = 10;

/// Aggregation primitives understood by the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReducerKind {
    Count,
    Sum,
    Mean,
    Min,
    Max,
    Mode,
    Variance,
    StdDev,
    First,
    Last,
    /// Per-value frequency table
    FrequencyHistogram,
    /// Collect values into a list
    ToList,
    /// Histogram with backend-chosen bins
    AutoHistogram,
    /// Histogram with a fixed range and bin count; max is exclusive
    FixedHistogram { min: f64, max: f64, bins: u32 },
    /// Percentile outputs, one per requested percentile
    Percentile { percentiles: Vec<u8> },
}

impl ReducerKind {
    /// The key this primitive contributes to result records.
    ///
    /// This is the documented wire contract for the service's output naming;
    /// percentile outputs are keyed per percentile (`p25`, `p75`, ...).
    pub fn output_name(&self) -> &'static str {
        match self {
            ReducerKind::Count => "count",
            ReducerKind::Sum => "sum",
            ReducerKind::Mean => "mean",
            ReducerKind::Min => "min",
            ReducerKind::Max => "max",
            ReducerKind::Mode => "mode",
            ReducerKind::Variance => "variance",
            ReducerKind::StdDev => "stdDev",
            ReducerKind::First => "first",
            ReducerKind::Last => "last",
            ReducerKind::FrequencyHistogram => "histogram",
            ReducerKind::ToList => "list",
            ReducerKind::AutoHistogram => "histogram",
            ReducerKind::FixedHistogram { .. } => "histogram",
            ReducerKind::Percentile { .. } => "percentile",
        }
    }
}

/// A reducer tree: primitive, combined, or grouped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "camelCase")]
pub enum ReducerSpec {
    /// A single primitive, optionally unweighted and repeated.
    ///
    /// `repeat` reserves one positional output slot per occurrence of the
    /// same aggregate in the select list.
    Primitive {
        kind: ReducerKind,
        unweighted: bool,
        repeat: u32,
    },
    /// Binary combination; `base` keeps its output slots before `other`'s.
    Combine {
        base: Box<ReducerSpec>,
        other: Box<ReducerSpec>,
        shared_inputs: bool,
    },
    /// Cross-tabulation wrap around an inner reducer.
    Group {
        inner: Box<ReducerSpec>,
        group_field: usize,
        group_name: String,
    },
}

impl ReducerSpec {
    /// A primitive reducer with default weighting and a single output slot.
    pub fn primitive(kind: ReducerKind) -> Self {
        ReducerSpec::Primitive {
            kind,
            unweighted: false,
            repeat: 1,
        }
    }

    /// Marks a primitive as unweighted. No effect on combined reducers.
    pub fn unweighted(self) -> Self {
        match self {
            ReducerSpec::Primitive { kind, repeat, .. } => ReducerSpec::Primitive {
                kind,
                unweighted: true,
                repeat,
            },
            other => other,
        }
    }

    /// Sets the repeat count of a primitive. No effect on combined reducers.
    pub fn repeat(self, count: u32) -> Self {
        match self {
            ReducerSpec::Primitive {
                kind, unweighted, ..
            } => ReducerSpec::Primitive {
                kind,
                unweighted,
                repeat: count,
            },
            other => other,
        }
    }

    /// Combines with another reducer, preserving this reducer's slots first.
    pub fn combine(self, other: ReducerSpec, shared_inputs: bool) -> Self {
        ReducerSpec::Combine {
            base: Box::new(self),
            other: Box::new(other),
            shared_inputs,
        }
    }

    /// Wraps in a grouping descriptor.
    pub fn group(self, group_field: usize, group_name: impl Into<String>) -> Self {
        ReducerSpec::Group {
            inner: Box::new(self),
            group_field,
            group_name: group_name.into(),
        }
    }

    /// Left-to-right fold of reducers into one combined reducer.
    ///
    /// combine(r0, r1), then combine(result, r2), and so on. Returns `None`
    /// for an empty list.
    pub fn fold(mut parts: Vec<ReducerSpec>, shared_inputs: bool) -> Option<ReducerSpec> {
        if parts.is_empty() {
            return None;
        }
        let mut combined = parts.remove(0);
        for part in parts {
            combined = combined.combine(part, shared_inputs);
        }
        Some(combined)
    }

    /// Group names of the wrapping descriptors, outermost first.
    pub fn group_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut node = self;
        while let ReducerSpec::Group {
            inner, group_name, ..
        } = node
        {
            names.push(group_name.as_str());
            node = inner;
        }
        names
    }

    /// Primitives of the underlying combine chain, in slot order.
    pub fn primitives(&self) -> Vec<(&ReducerKind, u32)> {
        match self {
            ReducerSpec::Primitive { kind, repeat, .. } => vec![(kind, *repeat)],
            ReducerSpec::Combine { base, other, .. } => {
                let mut all = base.primitives();
                all.extend(other.primitives());
                all
            }
            ReducerSpec::Group { inner, .. } => inner.primitives(),
        }
    }
}

/// Column-wise tabular aggregation: a reducer plus the record fields it
/// consumes, in slot order (aggregate inputs first, then group keys).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnReduce {
    pub reducer: ReducerSpec,
    pub selectors: Vec<String>,
}

/// Per-image pixel aggregation across a stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageReduce {
    pub reducer: ReducerSpec,
    pub parallel_scale: u32,
}

impl ImageReduce {
    pub fn new(reducer: ReducerSpec) -> Self {
        Self {
            reducer,
            parallel_scale: PARALLEL_SCALE,
        }
    }
}

/// Spatial aggregation of raster pixels within a bounding geometry.
///
/// Best-effort evaluation, the pixel ceiling, and the tile-scale hint bound
/// compute cost on large rasters; there is no client-side timeout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionReduce {
    pub reducer: ReducerSpec,
    pub geometry: Option<Geometry>,
    pub scale: u32,
    pub best_effort: bool,
    pub max_pixels: u64,
    pub tile_scale: u32,
}

impl RegionReduce {
    pub fn new(reducer: ReducerSpec, geometry: Option<Geometry>) -> Self {
        Self {
            reducer,
            geometry,
            scale: REGION_SCALE,
            best_effort: true,
            max_pixels: MAX_PIXELS,
            tile_scale: TILE_SCALE,
        }
    }
}
