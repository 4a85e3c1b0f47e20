//! Dataset type dispatch
//!
//! Resolves the backend's asset description into a `DatasetMetadata`,
//! deciding which executor a query must take. Stack assets whose own band
//! list is reported empty get a one-shot "peek" at their first member to
//! backfill band metadata and per-property types, since stack-level
//! introspection does not always enumerate bands.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::backend::GeoBackend;

use super::errors::{MetadataError, MetadataResult};
use super::types::{BandInfo, DatasetKind, DatasetMetadata};

/// Fetches and normalizes dataset descriptions.
pub struct DatasetDispatcher<'a, B: GeoBackend> {
    backend: &'a B,
}

impl<'a, B: GeoBackend> DatasetDispatcher<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Describes an asset, peeking at the first stack member if needed.
    pub fn describe(&self, asset_id: &str) -> MetadataResult<DatasetMetadata> {
        let info = self.backend.asset_info(asset_id)?;

        let tag = info
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| MetadataError::MissingType(asset_id.to_string()))?;
        let kind = DatasetKind::from_tag(tag)
            .ok_or_else(|| MetadataError::InvalidType(tag.to_string()))?;

        let mut columns = parse_columns(&info);
        let mut bands = parse_bands(&info);

        if kind == DatasetKind::ImageStack && bands.is_empty() {
            log::debug!("stack '{}' reports no bands, peeking first member", asset_id);
            let member = self.backend.first_stack_member(asset_id)?;
            bands = parse_bands(&member);
            if columns.is_empty() {
                columns = infer_property_types(&member);
            }
        }

        Ok(DatasetMetadata {
            kind,
            columns,
            bands,
            raw: info,
        })
    }
}

fn parse_columns(info: &Value) -> BTreeMap<String, String> {
    let mut columns = BTreeMap::new();
    if let Some(map) = info.get("columns").and_then(Value::as_object) {
        for (name, type_name) in map {
            let type_name = type_name.as_str().unwrap_or("Unknown").to_string();
            columns.insert(name.clone(), type_name);
        }
    }
    columns
}

fn parse_bands(info: &Value) -> Vec<BandInfo> {
    let mut bands = Vec::new();
    if let Some(entries) = info.get("bands").and_then(Value::as_array) {
        for entry in entries {
            if let Some(id) = entry.get("id").and_then(Value::as_str) {
                bands.push(BandInfo::new(id, entry.clone()));
            }
        }
    }
    bands
}

fn infer_property_types(member: &Value) -> BTreeMap<String, String> {
    let mut columns = BTreeMap::new();
    if let Some(properties) = member.get("properties").and_then(Value::as_object) {
        for (name, value) in properties {
            columns.insert(name.clone(), json_type_name(value).to_string());
        }
    }
    columns
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Boolean",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}
