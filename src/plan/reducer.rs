//! Reducer generation
//!
//! Maps the select plan's aggregate functions (plus an optional GROUP BY
//! list and geometry) onto three independent reducer specifications: one for
//! column-wise tabular aggregation, one for per-image pixel aggregation,
//! and one for spatial region aggregation.
//!
//! A function name used N times becomes one primitive repeated N times, so
//! the backend's positional output keys keep one slot per occurrence.
//! Reducers combine left-to-right in the order their name was first
//! encountered in the select list; the output-naming stage replicates that
//! order to find matching result keys.
//!
//! Known limitation: aggregating bands with a GROUP BY but no column
//! aggregate has no defined non-degenerate behavior; a synthetic `count`
//! over the first group key is injected so the grouping reducer has a
//! column reducer to attach to.

use std::collections::BTreeMap;

use crate::ast::AstNode;
use crate::backend::{
    ColumnReduce, Geometry, ImageReduce, ReducerKind, ReducerSpec, RegionReduce,
};
use crate::metadata::DatasetMetadata;

use super::errors::{PlanError, PlanResult};
use super::select::{FunctionCall, SelectPlan};

/// Aggregate functions the dialect supports in select lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Avg,
    Mean,
    Max,
    Min,
    Count,
    Sum,
    Var,
    Stdev,
    Mode,
    First,
    Last,
    Frequency,
    ArrayAgg,
    StHistogram,
    StValueCount,
}

impl AggregateFunction {
    /// Parses a select-list function name, case-insensitively.
    pub fn parse(name: &str) -> Option<AggregateFunction> {
        match name.to_ascii_lowercase().as_str() {
            "avg" => Some(AggregateFunction::Avg),
            "mean" => Some(AggregateFunction::Mean),
            "max" => Some(AggregateFunction::Max),
            "min" => Some(AggregateFunction::Min),
            "count" => Some(AggregateFunction::Count),
            "sum" => Some(AggregateFunction::Sum),
            "var" => Some(AggregateFunction::Var),
            "stdev" => Some(AggregateFunction::Stdev),
            "mode" => Some(AggregateFunction::Mode),
            "first" => Some(AggregateFunction::First),
            "last" => Some(AggregateFunction::Last),
            "frequency" => Some(AggregateFunction::Frequency),
            "array_agg" => Some(AggregateFunction::ArrayAgg),
            "st_histogram" => Some(AggregateFunction::StHistogram),
            "st_valuecount" => Some(AggregateFunction::StValueCount),
            _ => None,
        }
    }

    /// The backend primitive this function maps to.
    pub fn reducer_kind(&self) -> ReducerKind {
        match self {
            AggregateFunction::Avg | AggregateFunction::Mean => ReducerKind::Mean,
            AggregateFunction::Max => ReducerKind::Max,
            AggregateFunction::Min => ReducerKind::Min,
            AggregateFunction::Count => ReducerKind::Count,
            AggregateFunction::Sum => ReducerKind::Sum,
            AggregateFunction::Var => ReducerKind::Variance,
            AggregateFunction::Stdev => ReducerKind::StdDev,
            AggregateFunction::Mode => ReducerKind::Mode,
            AggregateFunction::First => ReducerKind::First,
            AggregateFunction::Last => ReducerKind::Last,
            AggregateFunction::Frequency | AggregateFunction::StValueCount => {
                ReducerKind::FrequencyHistogram
            }
            AggregateFunction::ArrayAgg => ReducerKind::ToList,
            AggregateFunction::StHistogram => ReducerKind::AutoHistogram,
        }
    }
}

/// The three reducers a query may need; each is absent when its
/// preconditions are not met.
#[derive(Debug, Clone, Default)]
pub struct ReducerBundle {
    /// Tabular aggregation, with grouping applied
    pub by_column: Option<ColumnReduce>,
    /// Pixel aggregation collapsing a stack to one image
    pub per_image: Option<ImageReduce>,
    /// Spatial aggregation of the collapsed image; requires a geometry
    pub by_region: Option<RegionReduce>,
}

/// One output slot of the combined column reducer, paired with the select
/// entry that produced it. Slot layout mirrors the combination order, which
/// the output-naming stage must replicate exactly.
#[derive(Debug, Clone)]
pub struct AggregateSlot<'a> {
    pub call: &'a FunctionCall,
    /// Canonical result key the primitive writes
    pub output_key: &'static str,
    /// Position within that key's positional list
    pub index: usize,
}

/// Builds the reducer bundle for a planned query.
pub fn build_bundle(
    plan: &SelectPlan,
    group_names: &[String],
    geometry: Option<&Geometry>,
) -> PlanResult<ReducerBundle> {
    let mut column_functions = plan.column_functions.clone();
    if column_functions.is_empty() && !plan.band_functions.is_empty() && !group_names.is_empty() {
        column_functions.push(synthetic_count(&group_names[0]));
    }

    let by_column = match reducer_chain(&column_functions, true)? {
        Some((reducer, mut selectors)) => {
            let reducer = if group_names.is_empty() {
                reducer
            } else {
                apply_grouping(reducer, &mut selectors, group_names)
            };
            Some(ColumnReduce { reducer, selectors })
        }
        None => None,
    };

    let per_image = reducer_chain(&plan.band_functions, false)?
        .map(|(reducer, _)| ImageReduce::new(reducer));

    let by_region = match (reducer_chain(&plan.band_functions, false)?, geometry) {
        (Some((reducer, _)), Some(geometry)) => {
            Some(RegionReduce::new(reducer, Some(geometry.clone())))
        }
        _ => None,
    };

    Ok(ReducerBundle {
        by_column,
        per_image,
        by_region,
    })
}

/// Resolves GROUP BY key nodes to validated column names.
pub fn group_key_names(
    group: &[AstNode],
    metadata: &DatasetMetadata,
) -> PlanResult<Vec<String>> {
    let mut names = Vec::with_capacity(group.len());
    for node in group {
        let name = node
            .literal_name()
            .map(|n| crate::ast::unquote(n).to_string())
            .ok_or_else(|| {
                PlanError::MalformedComparison(format!("GROUP BY key is not a name: {:?}", node))
            })?;
        if metadata.is_band(&name) {
            return Err(PlanError::BandFilter(name));
        }
        if !metadata.is_column(&name) {
            return Err(PlanError::UnknownColumn(name));
        }
        names.push(name);
    }
    Ok(names)
}

/// Output-slot layout of the combined column reducer, in combination order:
/// distinct function names by first encounter, then occurrences in
/// select-list order within each name.
pub fn aggregate_slots(functions: &[FunctionCall]) -> Vec<AggregateSlot<'_>> {
    let mut slots = Vec::new();
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for (token, aggregate) in encounter_order(functions) {
        for call in functions
            .iter()
            .filter(|f| f.name.eq_ignore_ascii_case(&token))
        {
            let output_key = aggregate.reducer_kind().output_name();
            let index = counts.entry(output_key).or_insert(0);
            slots.push(AggregateSlot {
                call,
                output_key,
                index: *index,
            });
            *index += 1;
        }
    }
    slots
}

/// Distinct aggregate-function names in first-encounter order.
fn encounter_order(functions: &[FunctionCall]) -> Vec<(String, AggregateFunction)> {
    let mut order: Vec<(String, AggregateFunction)> = Vec::new();
    for call in functions {
        let token = call.name.to_ascii_lowercase();
        if order.iter().any(|(t, _)| *t == token) {
            continue;
        }
        if let Some(aggregate) = AggregateFunction::parse(&token) {
            order.push((token, aggregate));
        }
    }
    order
}

/// Builds the combined reducer and selector list for a function list.
///
/// Column reducers are unweighted and repeated per occurrence; image
/// reducers are plain primitives with shared inputs.
fn reducer_chain(
    functions: &[FunctionCall],
    for_columns: bool,
) -> PlanResult<Option<(ReducerSpec, Vec<String>)>> {
    let mut parts = Vec::new();
    let mut selectors = Vec::new();

    for (token, aggregate) in encounter_order(functions) {
        let matching: Vec<&FunctionCall> = functions
            .iter()
            .filter(|f| f.name.eq_ignore_ascii_case(&token))
            .collect();
        if for_columns {
            for call in &matching {
                let selector = call
                    .first_argument_name()
                    .ok_or_else(|| PlanError::MissingArgument(call.name.clone()))?;
                selectors.push(selector);
            }
        }
        let kind = aggregate.reducer_kind();
        let reducer = if for_columns {
            ReducerSpec::primitive(kind)
                .unweighted()
                .repeat(matching.len() as u32)
        } else {
            ReducerSpec::primitive(kind)
        };
        parts.push(reducer);
    }

    Ok(ReducerSpec::fold(parts, !for_columns).map(|reducer| (reducer, selectors)))
}

/// Wraps the reducer in one grouping descriptor per key. Group field
/// indices start after the aggregate selectors so group fields never
/// collide with aggregate-result slots; the first key is the innermost
/// (coarsest) wrap.
fn apply_grouping(
    reducer: ReducerSpec,
    selectors: &mut Vec<String>,
    group_names: &[String],
) -> ReducerSpec {
    let offset = selectors.len();
    let mut wrapped = reducer;
    for (i, name) in group_names.iter().enumerate() {
        wrapped = wrapped.group(offset + i, name);
    }
    selectors.extend(group_names.iter().cloned());
    wrapped
}

fn synthetic_count(group_key: &str) -> FunctionCall {
    FunctionCall {
        name: "count".to_string(),
        arguments: vec![AstNode::Literal {
            value: group_key.to_string(),
            alias: None,
        }],
        alias: None,
    }
}
