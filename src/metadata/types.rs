//! Dataset metadata types
//!
//! A `DatasetMetadata` is fetched once per query from the backend and cached
//! for the query's lifetime; nothing mutates it afterward.

use std::collections::BTreeMap;

use serde_json::Value;

/// The three dataset shapes the service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// A single raster image
    Image,
    /// An ordered stack of raster images sharing a band schema
    ImageStack,
    /// A tabular/vector feature collection
    Table,
}

impl DatasetKind {
    /// Maps the backend's asset type tag to a kind, `None` for unknown tags.
    pub fn from_tag(tag: &str) -> Option<DatasetKind> {
        match tag {
            "Image" | "IMAGE" => Some(DatasetKind::Image),
            "ImageCollection" | "IMAGE_COLLECTION" => Some(DatasetKind::ImageStack),
            "FeatureCollection" | "FEATURE_COLLECTION" | "Table" | "TABLE" => {
                Some(DatasetKind::Table)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Image => "Image",
            DatasetKind::ImageStack => "ImageCollection",
            DatasetKind::Table => "FeatureCollection",
        }
    }
}

/// One raster band: its id plus the raw service-provided entry
/// (data_type, dimensions, crs, ...), kept verbatim for metadata queries.
#[derive(Debug, Clone, PartialEq)]
pub struct BandInfo {
    pub id: String,
    pub raw: Value,
}

impl BandInfo {
    pub fn new(id: impl Into<String>, raw: Value) -> Self {
        Self {
            id: id.into(),
            raw,
        }
    }
}

/// Service-provided description of the target dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetMetadata {
    pub kind: DatasetKind,
    /// Property/column name to inferred type name
    pub columns: BTreeMap<String, String>,
    /// Ordered band list; empty for tables
    pub bands: Vec<BandInfo>,
    /// The full asset description, unmodified
    pub raw: Value,
}

impl DatasetMetadata {
    /// Whether `name` is a known column.
    pub fn is_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Whether `name` is a known band.
    pub fn is_band(&self, name: &str) -> bool {
        self.bands.iter().any(|b| b.id == name)
    }

    /// Band ids in service order.
    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.id.as_str()).collect()
    }

    /// Band entry by id.
    pub fn band(&self, id: &str) -> Option<&BandInfo> {
        self.bands.iter().find(|b| b.id == id)
    }
}
