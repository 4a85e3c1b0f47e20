//! In-memory backend harness
//!
//! Implements `GeoBackend` over fixture tables, stacks, and band pixel
//! vectors, evaluating the filter and reducer specs the engine emits. This
//! pins the wire contracts (predicate semantics, positional output lists,
//! `{band}_{func}_{func}` key naming) without a live service.
//!
//! Spatial semantics are out of scope: `bounds` and region geometries are
//! accepted but not evaluated. Masked pixels are represented as NaN and
//! surface as the `null` key in frequency histograms.

use std::collections::{BTreeMap, HashMap};

use serde_json::{json, map::Entry, Map, Value};
use terrasql::backend::{
    BackendError, BackendResult, CollectionQuery, ColumnReduce, FilterSpec, GeoBackend,
    Projection, Record, ReducerKind, RegionReduce, StackAggregation,
};
use terrasql::exec::RecordSorter;

/// A vector feature table.
pub struct TableFixture {
    pub columns: BTreeMap<String, String>,
    pub records: Vec<Record>,
}

/// One raster stack member: scalar properties plus aligned per-band pixel
/// vectors.
pub struct StackMember {
    pub properties: Record,
    pub bands: HashMap<String, Vec<f64>>,
}

/// An ordered raster stack sharing a band schema.
pub struct StackFixture {
    pub band_order: Vec<String>,
    pub members: Vec<StackMember>,
}

/// A single raster image.
pub struct ImageFixture {
    pub info: Value,
    pub bands: HashMap<String, Vec<f64>>,
    /// Composite assets reject region aggregation without a geometry.
    pub composite: bool,
}

/// In-memory geospatial service.
#[derive(Default)]
pub struct MemoryBackend {
    tables: HashMap<String, TableFixture>,
    stacks: HashMap<String, StackFixture>,
    images: HashMap<String, ImageFixture>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, id: &str, fixture: TableFixture) {
        self.tables.insert(id.to_string(), fixture);
    }

    pub fn add_stack(&mut self, id: &str, fixture: StackFixture) {
        self.stacks.insert(id.to_string(), fixture);
    }

    pub fn add_image(&mut self, id: &str, fixture: ImageFixture) {
        self.images.insert(id.to_string(), fixture);
    }

    fn base_records(&self, query: &CollectionQuery) -> BackendResult<Vec<Record>> {
        if let Some(table) = self.tables.get(&query.asset_id) {
            return Ok(table.records.clone());
        }
        if let Some(stack) = self.stacks.get(&query.asset_id) {
            return Ok(stack.members.iter().map(|m| m.properties.clone()).collect());
        }
        Err(BackendError::UnknownAsset(query.asset_id.clone()))
    }

    fn filtered_records(&self, query: &CollectionQuery) -> BackendResult<Vec<Record>> {
        let records = self.base_records(query)?;
        Ok(records
            .into_iter()
            .filter(|r| match &query.filter {
                Some(filter) => eval_filter(r, filter),
                None => true,
            })
            .collect())
    }
}

impl GeoBackend for MemoryBackend {
    fn asset_info(&self, asset_id: &str) -> BackendResult<Value> {
        if let Some(table) = self.tables.get(asset_id) {
            return Ok(json!({
                "type": "FeatureCollection",
                "columns": table.columns,
                "id": asset_id,
            }));
        }
        if self.stacks.contains_key(asset_id) {
            // Stack-level introspection does not enumerate bands; the
            // dispatcher is expected to peek.
            return Ok(json!({"type": "ImageCollection", "bands": [], "id": asset_id}));
        }
        if let Some(image) = self.images.get(asset_id) {
            return Ok(image.info.clone());
        }
        Err(BackendError::UnknownAsset(asset_id.to_string()))
    }

    fn first_stack_member(&self, asset_id: &str) -> BackendResult<Value> {
        let stack = self
            .stacks
            .get(asset_id)
            .ok_or_else(|| BackendError::UnknownAsset(asset_id.to_string()))?;
        let member = stack
            .members
            .first()
            .ok_or_else(|| BackendError::Service(format!("stack '{}' is empty", asset_id)))?;
        let bands: Vec<Value> = stack.band_order.iter().map(|b| json!({ "id": b })).collect();
        Ok(json!({
            "bands": bands,
            "properties": Value::Object(member.properties.clone()),
        }))
    }

    fn collection_size(&self, query: &CollectionQuery) -> BackendResult<u64> {
        Ok(self.filtered_records(query)?.len() as u64)
    }

    fn materialize(&self, query: &CollectionQuery) -> BackendResult<Vec<Record>> {
        let mut records = self.filtered_records(query)?;
        if let Some(Projection::Columns(columns)) = &query.projection {
            records = records
                .into_iter()
                .map(|record| {
                    let mut projected = Record::new();
                    for column in columns {
                        if let Some(value) = record.get(column) {
                            projected.insert(column.clone(), value.clone());
                        }
                    }
                    projected
                })
                .collect();
        }
        if let Some(sort) = &query.sort {
            RecordSorter::sort(&mut records, sort);
        }
        if let Some(limit) = query.limit {
            records.truncate(limit as usize);
        }
        Ok(records)
    }

    fn reduce_columns(
        &self,
        query: &CollectionQuery,
        reduce: &ColumnReduce,
    ) -> BackendResult<Vec<Record>> {
        let records = self.filtered_records(query)?;
        let mut group_names: Vec<String> = reduce
            .reducer
            .group_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        // Innermost wrap is the first GROUP BY key.
        group_names.reverse();

        if group_names.is_empty() {
            let refs: Vec<&Record> = records.iter().collect();
            return Ok(vec![reduce_record(&refs, reduce)]);
        }

        let mut groups: BTreeMap<String, (Record, Vec<&Record>)> = BTreeMap::new();
        for record in &records {
            let mut key = String::new();
            let mut key_fields = Record::new();
            for name in &group_names {
                let value = record.get(name).cloned().unwrap_or(Value::Null);
                key.push_str(&value_key(&value));
                key.push('\u{1f}');
                key_fields.insert(name.clone(), value);
            }
            groups
                .entry(key)
                .or_insert_with(|| (key_fields, Vec::new()))
                .1
                .push(record);
        }

        Ok(groups
            .into_values()
            .map(|(key_fields, members)| {
                let mut row = reduce_record(&members, reduce);
                for (name, value) in key_fields {
                    row.insert(name, value);
                }
                row
            })
            .collect())
    }

    fn aggregate_stack(&self, aggregation: &StackAggregation) -> BackendResult<Record> {
        let query = &aggregation.query;
        let stack = self
            .stacks
            .get(&query.asset_id)
            .ok_or_else(|| BackendError::UnknownAsset(query.asset_id.clone()))?;

        let members: Vec<&StackMember> = stack
            .members
            .iter()
            .filter(|m| match &query.filter {
                Some(filter) => eval_filter(&m.properties, filter),
                None => true,
            })
            .collect();

        let bands: Vec<String> = match &query.projection {
            Some(Projection::Bands(bands)) => bands.clone(),
            _ => stack.band_order.clone(),
        };

        let mut record = Record::new();
        for band in &bands {
            for (image_kind, _) in aggregation.per_image.reducer.primitives() {
                let collapsed = collapse_band(&members, band, image_kind);
                for (region_kind, _) in aggregation.region.reducer.primitives() {
                    let key = format!(
                        "{}_{}_{}",
                        band,
                        image_kind.output_name(),
                        region_kind.output_name()
                    );
                    record.insert(key, scalar_value(&collapsed, region_kind));
                }
            }
        }
        Ok(record)
    }

    fn reduce_region(
        &self,
        asset_id: &str,
        bands: &[String],
        reduce: &RegionReduce,
    ) -> BackendResult<Record> {
        let image = self
            .images
            .get(asset_id)
            .ok_or_else(|| BackendError::UnknownAsset(asset_id.to_string()))?;
        if image.composite && reduce.geometry.is_none() {
            return Err(BackendError::RegionRequired(asset_id.to_string()));
        }

        let mut record = Record::new();
        for band in bands {
            let pixels = image
                .bands
                .get(band)
                .ok_or_else(|| BackendError::Service(format!("no band '{}'", band)))?;
            for (kind, _) in reduce.reducer.primitives() {
                match kind {
                    ReducerKind::Percentile { percentiles } => {
                        for p in percentiles {
                            record.insert(
                                format!("{}_p{}", band, p),
                                json!(percentile(pixels, *p)),
                            );
                        }
                    }
                    ReducerKind::FixedHistogram { min, max, bins } => {
                        record.insert(band.clone(), fixed_histogram(pixels, *min, *max, *bins));
                    }
                    ReducerKind::FrequencyHistogram => {
                        record.insert(band.clone(), frequency_histogram(pixels));
                    }
                    scalar => {
                        record.insert(
                            format!("{}_{}", band, scalar.output_name()),
                            scalar_value(pixels, scalar),
                        );
                    }
                }
            }
        }
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Filter evaluation
// ---------------------------------------------------------------------------

/// Evaluates a filter spec against one record, mirroring the service's
/// predicate semantics.
pub fn eval_filter(record: &Record, filter: &FilterSpec) -> bool {
    match filter {
        FilterSpec::Eq { field, value } => match record.get(field) {
            Some(actual) => actual == value,
            None => value.is_null(),
        },
        FilterSpec::Neq { field, value } => !eval_filter(
            record,
            &FilterSpec::Eq {
                field: field.clone(),
                value: value.clone(),
            },
        ),
        FilterSpec::Lt { field, value } => compare_numbers(record, field, value, |a, b| a < b),
        FilterSpec::Lte { field, value } => compare_numbers(record, field, value, |a, b| a <= b),
        FilterSpec::Gt { field, value } => compare_numbers(record, field, value, |a, b| a > b),
        FilterSpec::Gte { field, value } => compare_numbers(record, field, value, |a, b| a >= b),
        FilterSpec::StringContains { field, value } => {
            string_field(record, field).map_or(false, |s| s.contains(value.as_str()))
        }
        FilterSpec::StringStartsWith { field, value } => {
            string_field(record, field).map_or(false, |s| s.starts_with(value.as_str()))
        }
        FilterSpec::StringEndsWith { field, value } => {
            string_field(record, field).map_or(false, |s| s.ends_with(value.as_str()))
        }
        FilterSpec::InList { field, values } => record
            .get(field)
            .map_or(false, |actual| values.iter().any(|v| v == actual)),
        FilterSpec::Not { filter } => !eval_filter(record, filter),
        FilterSpec::And { left, right } => {
            eval_filter(record, left) && eval_filter(record, right)
        }
        FilterSpec::Or { left, right } => eval_filter(record, left) || eval_filter(record, right),
    }
}

fn compare_numbers(
    record: &Record,
    field: &str,
    bound: &Value,
    cmp: impl Fn(f64, f64) -> bool,
) -> bool {
    match (record.get(field).and_then(Value::as_f64), bound.as_f64()) {
        (Some(actual), Some(bound)) => cmp(actual, bound),
        _ => false,
    }
}

fn string_field<'a>(record: &'a Record, field: &str) -> Option<&'a str> {
    record.get(field).and_then(Value::as_str)
}

// ---------------------------------------------------------------------------
// Reducer evaluation
// ---------------------------------------------------------------------------

/// Applies a column reduce to a record set: each primitive writes its
/// canonical output name holding a positional list, one slot per repeat,
/// selectors consumed in slot order.
fn reduce_record(records: &[&Record], reduce: &ColumnReduce) -> Record {
    let mut out = Record::new();
    let mut cursor = 0usize;
    for (kind, repeat) in reduce.reducer.primitives() {
        let mut slots = Vec::with_capacity(repeat as usize);
        for _ in 0..repeat {
            let selector = &reduce.selectors[cursor];
            cursor += 1;
            let values: Vec<&Value> = records
                .iter()
                .filter_map(|r| r.get(selector))
                .filter(|v| !v.is_null())
                .collect();
            slots.push(aggregate_values(&values, kind));
        }
        match out.entry(kind.output_name().to_string()) {
            Entry::Occupied(mut entry) => {
                if let Value::Array(existing) = entry.get_mut() {
                    existing.extend(slots);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Value::Array(slots));
            }
        }
    }
    out
}

fn aggregate_values(values: &[&Value], kind: &ReducerKind) -> Value {
    let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
    match kind {
        ReducerKind::Count => json!(values.len()),
        ReducerKind::First => values.first().map(|v| (*v).clone()).unwrap_or(Value::Null),
        ReducerKind::Last => values.last().map(|v| (*v).clone()).unwrap_or(Value::Null),
        ReducerKind::ToList => Value::Array(values.iter().map(|v| (*v).clone()).collect()),
        ReducerKind::FrequencyHistogram => {
            let mut counts: BTreeMap<String, u64> = BTreeMap::new();
            for value in values {
                *counts.entry(value_key(value)).or_insert(0) += 1;
            }
            json!(counts)
        }
        ReducerKind::Mode => {
            let mut counts: BTreeMap<String, (u64, Value)> = BTreeMap::new();
            for value in values {
                let entry = counts
                    .entry(value_key(value))
                    .or_insert((0, (*value).clone()));
                entry.0 += 1;
            }
            counts
                .into_values()
                .max_by_key(|(count, _)| *count)
                .map(|(_, value)| value)
                .unwrap_or(Value::Null)
        }
        scalar => scalar_value(&numbers, scalar),
    }
}

fn scalar_value(numbers: &[f64], kind: &ReducerKind) -> Value {
    let valid: Vec<f64> = numbers.iter().copied().filter(|n| !n.is_nan()).collect();
    if valid.is_empty() {
        return Value::Null;
    }
    let n = valid.len() as f64;
    let sum: f64 = valid.iter().sum();
    let mean = sum / n;
    match kind {
        ReducerKind::Count => json!(valid.len()),
        ReducerKind::Sum => json!(sum),
        ReducerKind::Mean => json!(mean),
        ReducerKind::Min => json!(valid.iter().copied().fold(f64::INFINITY, f64::min)),
        ReducerKind::Max => json!(valid.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        ReducerKind::Variance | ReducerKind::StdDev => {
            let variance = if valid.len() > 1 {
                valid.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
            } else {
                0.0
            };
            if *kind == ReducerKind::Variance {
                json!(variance)
            } else {
                json!(variance.sqrt())
            }
        }
        ReducerKind::First => json!(valid[0]),
        ReducerKind::Last => json!(valid[valid.len() - 1]),
        ReducerKind::Mode => {
            let mut counts: BTreeMap<String, (u64, f64)> = BTreeMap::new();
            for v in &valid {
                let entry = counts.entry(format_number(*v)).or_insert((0, *v));
                entry.0 += 1;
            }
            counts
                .into_values()
                .max_by_key(|(count, _)| *count)
                .map(|(_, v)| json!(v))
                .unwrap_or(Value::Null)
        }
        other => panic!("scalar aggregation not defined for {:?}", other),
    }
}

/// Per-pixel collapse of a band across stack members.
fn collapse_band(members: &[&StackMember], band: &str, kind: &ReducerKind) -> Vec<f64> {
    let vectors: Vec<&Vec<f64>> = members.iter().filter_map(|m| m.bands.get(band)).collect();
    let length = vectors.iter().map(|v| v.len()).min().unwrap_or(0);
    (0..length)
        .map(|i| {
            let column: Vec<f64> = vectors.iter().map(|v| v[i]).collect();
            scalar_value(&column, kind).as_f64().unwrap_or(f64::NAN)
        })
        .collect()
}

fn percentile(pixels: &[f64], p: u8) -> f64 {
    let mut valid: Vec<f64> = pixels.iter().copied().filter(|n| !n.is_nan()).collect();
    if valid.is_empty() {
        return f64::NAN;
    }
    valid.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (p as f64 / 100.0 * (valid.len() as f64 - 1.0)).round() as usize;
    valid[rank.min(valid.len() - 1)]
}

/// Fixed-range histogram: `bins` equal-width bins over `[min, max)`, each
/// entry `[left_edge, count]`.
fn fixed_histogram(pixels: &[f64], min: f64, max: f64, bins: u32) -> Value {
    let width = (max - min) / bins as f64;
    let mut counts = vec![0u64; bins as usize];
    for pixel in pixels.iter().filter(|p| !p.is_nan()) {
        if *pixel < min || *pixel >= max {
            continue;
        }
        let index = (((pixel - min) / width) as usize).min(bins as usize - 1);
        counts[index] += 1;
    }
    Value::Array(
        counts
            .iter()
            .enumerate()
            .map(|(i, count)| json!([min + i as f64 * width, count]))
            .collect(),
    )
}

/// Per-value frequency table; NaN pixels count under the `null` key.
fn frequency_histogram(pixels: &[f64]) -> Value {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for pixel in pixels {
        let key = if pixel.is_nan() {
            "null".to_string()
        } else {
            format_number(*pixel)
        };
        *counts.entry(key).or_insert(0) += 1;
    }
    json!(counts)
}

fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n
            .as_f64()
            .map(format_number)
            .unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Record builder for fixture setup.
pub fn record(pairs: &[(&str, Value)]) -> Record {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.insert(key.to_string(), value.clone());
    }
    map
}
