//! Minimal geometry carrier
//!
//! Geometries are forwarded to the backend, never validated or interpreted
//! beyond locating a usable GeoJSON geometry object inside caller input.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// An opaque GeoJSON geometry referenced by filters and region reductions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub geojson: Value,
}

impl Geometry {
    /// Wraps a raw GeoJSON geometry object.
    pub fn new(geojson: Value) -> Self {
        Self { geojson }
    }

    /// Locates the geometry inside a FeatureCollection, Feature, or bare
    /// geometry object. Returns `None` when no geometry can be found.
    pub fn from_geojson(value: &Value) -> Option<Geometry> {
        if let Some(features) = value.get("features").and_then(Value::as_array) {
            let geometry = features.first()?.get("geometry")?;
            return Some(Geometry::new(geometry.clone()));
        }
        if let Some(geometry) = value.get("geometry") {
            return Some(Geometry::new(geometry.clone()));
        }
        if value.get("type").is_some() && value.get("coordinates").is_some() {
            return Some(Geometry::new(value.clone()));
        }
        None
    }

    /// Global-coverage placeholder polygon, used when a region reduction is
    /// mandatory but no spatial restriction was supplied.
    pub fn global() -> Geometry {
        Geometry::new(json!({
            "type": "Polygon",
            "coordinates": [[
                [-180.0, -90.0],
                [180.0, -90.0],
                [180.0, 90.0],
                [-180.0, 90.0],
                [-180.0, -90.0]
            ]]
        }))
    }
}
