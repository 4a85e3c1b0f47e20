//! Single-image raster-function execution
//!
//! Dispatches the postgis-style raster functions (`ST_METADATA`,
//! `ST_BANDMETADATA`, `ST_SUMMARYSTATS`, `ST_HISTOGRAM`, `ST_VALUECOUNT`)
//! against one raster. Only one raster function is permitted per query.
//!
//! Some composite/mosaic assets reject region aggregation when no geometry
//! is supplied. That specific failure triggers exactly one retry with the
//! global-coverage default geometry substituted, then propagates. This is a
//! bounded recovery path for a deterministic backend limitation, not a
//! generic retry loop.

use serde_json::{Map, Value};

use crate::backend::{
    BackendError, GeoBackend, Geometry, Record, ReducerKind, ReducerSpec, RegionReduce,
};
use crate::metadata::DatasetMetadata;
use crate::plan::{FunctionCall, SelectPlan};

use super::args::{extract_args, ArgSpec};
use super::errors::{ExecError, ExecResult};

/// The supported raster functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFunction {
    Metadata,
    BandMetadata,
    SummaryStats,
    Histogram,
    ValueCount,
}

impl RasterFunction {
    /// Parses a select-list function name, case-insensitively.
    pub fn parse(name: &str) -> Option<RasterFunction> {
        match name.to_ascii_lowercase().as_str() {
            "st_metadata" => Some(RasterFunction::Metadata),
            "st_bandmetadata" => Some(RasterFunction::BandMetadata),
            "st_summarystats" => Some(RasterFunction::SummaryStats),
            "st_histogram" => Some(RasterFunction::Histogram),
            "st_valuecount" => Some(RasterFunction::ValueCount),
            _ => None,
        }
    }
}

/// Chooses the histogram bin count by the Freedman–Diaconis rule.
///
/// Bin width is `2 * IQR * n^(-1/3)`; the bin count follows from the value
/// range. A zero bin width falls back to `sqrt(n)`. Deterministic in its
/// four inputs.
pub fn freedman_diaconis_bins(min: f64, max: f64, iqr: f64, count: f64) -> u32 {
    let bin_width = 2.0 * iqr * count.powf(-1.0 / 3.0);
    let bins = if bin_width > 0.0 {
        ((max - min) / bin_width) as u32
    } else {
        count.sqrt() as u32
    };
    bins.max(1)
}

/// Executes raster functions against a single image.
pub struct ImageExecutor<'a, B: GeoBackend> {
    backend: &'a B,
    asset_id: &'a str,
    metadata: &'a DatasetMetadata,
    geometry: Option<&'a Geometry>,
}

impl<'a, B: GeoBackend> ImageExecutor<'a, B> {
    pub fn new(
        backend: &'a B,
        asset_id: &'a str,
        metadata: &'a DatasetMetadata,
        geometry: Option<&'a Geometry>,
    ) -> Self {
        Self {
            backend,
            asset_id,
            metadata,
            geometry,
        }
    }

    /// Runs the single raster function found in the select plan.
    ///
    /// Returns a single-element list holding one record, keyed by the
    /// function's alias or its lowercase name.
    pub fn execute(&self, plan: &SelectPlan) -> ExecResult<Vec<Record>> {
        let mut found: Option<(&FunctionCall, RasterFunction)> = None;
        for call in &plan.functions {
            if let Some(function) = RasterFunction::parse(&call.name) {
                if found.is_some() {
                    return Err(ExecError::AmbiguousAction);
                }
                found = Some((call, function));
            }
        }
        let (call, function) = found.ok_or(ExecError::NoRasterFunction)?;

        let value = match function {
            RasterFunction::Metadata => self.metadata.raw.clone(),
            RasterFunction::BandMetadata => self.band_metadata(call)?,
            RasterFunction::SummaryStats => self.summary_stats(plan)?,
            RasterFunction::Histogram => self.histogram(call)?,
            RasterFunction::ValueCount => self.value_count(call)?,
        };

        let key = call
            .alias
            .clone()
            .unwrap_or_else(|| call.name.to_ascii_lowercase());
        let mut record = Record::new();
        record.insert(key, value);
        Ok(vec![record])
    }

    fn band_metadata(&self, call: &FunctionCall) -> ExecResult<Value> {
        let band_names = self.metadata.band_names();
        let args = extract_args(
            &call.name,
            &call.arguments,
            &[ArgSpec::Raster, ArgSpec::BandId],
            &band_names,
        )?;
        let band = args[1]
            .band()
            .ok_or_else(|| ExecError::InvalidBand(call.name.clone()))?;
        let info = self
            .metadata
            .band(band)
            .ok_or_else(|| ExecError::InvalidBand(band.to_string()))?;
        Ok(info.raw.clone())
    }

    fn summary_stats(&self, plan: &SelectPlan) -> ExecResult<Value> {
        let bands = self.selected_bands(plan);
        let reducer = ReducerSpec::primitive(ReducerKind::Count)
            .combine(ReducerSpec::primitive(ReducerKind::Sum), true)
            .combine(ReducerSpec::primitive(ReducerKind::Mean), true)
            .combine(ReducerSpec::primitive(ReducerKind::StdDev), true)
            .combine(ReducerSpec::primitive(ReducerKind::Min), true)
            .combine(ReducerSpec::primitive(ReducerKind::Max), true);
        let reduce = RegionReduce::new(reducer, self.geometry.cloned());
        let record = self.reduce_region_with_retry(&bands, reduce)?;

        let mut stats = Map::new();
        for band in &bands {
            let mut entry = Map::new();
            entry.insert("count".into(), field(&record, band, "count"));
            entry.insert("sum".into(), field(&record, band, "sum"));
            entry.insert("mean".into(), field(&record, band, "mean"));
            entry.insert("stdev".into(), field(&record, band, "stdDev"));
            entry.insert("min".into(), field(&record, band, "min"));
            entry.insert("max".into(), field(&record, band, "max"));
            stats.insert(band.clone(), Value::Object(entry));
        }
        Ok(Value::Object(stats))
    }

    fn histogram(&self, call: &FunctionCall) -> ExecResult<Value> {
        let band_names = self.metadata.band_names();
        let args = extract_args(
            &call.name,
            &call.arguments,
            &[ArgSpec::Raster, ArgSpec::BandId, ArgSpec::BinCount, ArgSpec::Flag],
            &band_names,
        )?;
        let band = args[1]
            .band()
            .ok_or_else(|| ExecError::InvalidBand(call.name.clone()))?
            .to_string();
        let requested_bins = args[2].bins().unwrap_or(None);
        let ascending = args[3].flag().unwrap_or(true);

        let (min, max, auto_bins) = self.histogram_inputs(&band)?;
        let bins = requested_bins.unwrap_or(auto_bins);

        // The backend counts the min -> max range exclusive at max.
        let reducer = ReducerSpec::primitive(ReducerKind::FixedHistogram {
            min,
            max: max + 1.0,
            bins,
        });
        let reduce = RegionReduce::new(reducer, self.geometry.cloned());
        let record = self.reduce_region_with_retry(std::slice::from_ref(&band), reduce)?;
        let mut histogram = record
            .get(&band)
            .cloned()
            .ok_or_else(|| ExecError::MalformedResult(format!("no histogram for '{}'", band)))?;

        if !ascending {
            if let Value::Array(ref mut bins) = histogram {
                bins.reverse();
            }
        }
        let mut out = Map::new();
        out.insert(band, histogram);
        Ok(Value::Object(out))
    }

    /// Optimum histogram inputs: band min, max, and the Freedman–Diaconis
    /// bin count from a prior summary reduction.
    fn histogram_inputs(&self, band: &str) -> ExecResult<(f64, f64, u32)> {
        let reducer = ReducerSpec::primitive(ReducerKind::Count)
            .combine(ReducerSpec::primitive(ReducerKind::Min), true)
            .combine(ReducerSpec::primitive(ReducerKind::Max), true)
            .combine(
                ReducerSpec::primitive(ReducerKind::Percentile {
                    percentiles: vec![25, 75],
                }),
                true,
            );
        let reduce = RegionReduce::new(reducer, self.geometry.cloned());
        let band_owned = band.to_string();
        let record = self.reduce_region_with_retry(std::slice::from_ref(&band_owned), reduce)?;

        let count = number(&record, band, "count")?;
        let min = number(&record, band, "min")?;
        let max = number(&record, band, "max")?;
        let iqr = number(&record, band, "p75")? - number(&record, band, "p25")?;
        Ok((min, max, freedman_diaconis_bins(min, max, iqr, count)))
    }

    fn value_count(&self, call: &FunctionCall) -> ExecResult<Value> {
        let band_names = self.metadata.band_names();
        let args = extract_args(
            &call.name,
            &call.arguments,
            &[ArgSpec::Raster, ArgSpec::BandId, ArgSpec::Flag],
            &band_names,
        )?;
        let band = args[1]
            .band()
            .ok_or_else(|| ExecError::InvalidBand(call.name.clone()))?
            .to_string();
        let keep_nodata = args[2].flag().unwrap_or(false);

        let reducer = ReducerSpec::primitive(ReducerKind::FrequencyHistogram).unweighted();
        let reduce = RegionReduce::new(reducer, self.geometry.cloned());
        let record = self.reduce_region_with_retry(std::slice::from_ref(&band), reduce)?;
        let mut counts = record
            .get(&band)
            .cloned()
            .ok_or_else(|| ExecError::MalformedResult(format!("no value counts for '{}'", band)))?;

        if !keep_nodata {
            if let Value::Object(ref mut map) = counts {
                map.remove("null");
            }
        }
        let mut out = Map::new();
        out.insert(band, counts);
        Ok(Value::Object(out))
    }

    /// Bands named in the select plan, or every band when none were named.
    fn selected_bands(&self, plan: &SelectPlan) -> Vec<String> {
        if plan.band_names.is_empty() {
            self.metadata.bands.iter().map(|b| b.id.clone()).collect()
        } else {
            plan.band_names.iter().cloned().collect()
        }
    }

    fn reduce_region_with_retry(
        &self,
        bands: &[String],
        reduce: RegionReduce,
    ) -> ExecResult<Record> {
        match self.backend.reduce_region(self.asset_id, bands, &reduce) {
            Err(BackendError::RegionRequired(_)) if reduce.geometry.is_none() => {
                log::warn!(
                    "asset '{}' rejected region aggregation without a geometry, \
                     retrying once with the global default",
                    self.asset_id
                );
                let retry = RegionReduce {
                    geometry: Some(Geometry::global()),
                    ..reduce
                };
                self.backend
                    .reduce_region(self.asset_id, bands, &retry)
                    .map_err(Into::into)
            }
            other => other.map_err(Into::into),
        }
    }
}

fn field(record: &Record, band: &str, stat: &str) -> Value {
    record
        .get(&format!("{}_{}", band, stat))
        .cloned()
        .unwrap_or(Value::Null)
}

fn number(record: &Record, band: &str, stat: &str) -> ExecResult<f64> {
    let key = format!("{}_{}", band, stat);
    record
        .get(&key)
        .and_then(Value::as_f64)
        .ok_or_else(|| ExecError::MalformedResult(format!("'{}' missing or not numeric", key)))
}
