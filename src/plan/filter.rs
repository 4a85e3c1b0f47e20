//! WHERE-clause filter building
//!
//! Converts a WHERE AST subtree into a composable `FilterSpec` tree over
//! named columns, accumulating the set of referenced column names so the
//! executor can keep those columns through projection. Leaves must resolve
//! to known columns; resolving to a band fails explicitly.
//!
//! A spatial-intersection call (`ST_INTERSECTS` over `ST_GeomFromGeoJSON`)
//! embedded in the WHERE tree contributes a geometry instead of a
//! predicate; the surrounding boolean structure treats it as an always-true
//! clause.

use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::ast::{unquote, AstNode};
use crate::backend::{FilterSpec, Geometry};
use crate::metadata::DatasetMetadata;

use super::errors::{PlanError, PlanResult};

/// Supported comparison operator tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    Like,
    In,
    Is,
    Between,
}

impl CompareOp {
    /// Parses an operator token, case-insensitively.
    pub fn parse(token: &str) -> Option<CompareOp> {
        match token.to_ascii_lowercase().as_str() {
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Lte),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Gte),
            "=" => Some(CompareOp::Eq),
            "!=" | "<>" => Some(CompareOp::Neq),
            "like" => Some(CompareOp::Like),
            "in" => Some(CompareOp::In),
            "is" => Some(CompareOp::Is),
            "between" => Some(CompareOp::Between),
            _ => None,
        }
    }
}

/// Result of building a WHERE clause.
#[derive(Debug, Clone, Default)]
pub struct WherePlan {
    /// The predicate tree, absent when the clause reduced to nothing
    pub filter: Option<FilterSpec>,
    /// Column names referenced anywhere in the clause
    pub columns: BTreeSet<String>,
    /// Geometry extracted from an embedded spatial-intersection call
    pub geometry: Option<Geometry>,
}

/// Intermediate recursion result; threaded upward, never shared.
#[derive(Debug, Default)]
struct Outcome {
    filter: Option<FilterSpec>,
    columns: BTreeSet<String>,
    geometry: Option<Geometry>,
}

impl Outcome {
    fn predicate(filter: FilterSpec, column: String) -> Outcome {
        Outcome {
            filter: Some(filter),
            columns: BTreeSet::from([column]),
            geometry: None,
        }
    }
}

/// Builds filter trees from WHERE AST subtrees.
pub struct FilterBuilder<'a> {
    metadata: &'a DatasetMetadata,
}

impl<'a> FilterBuilder<'a> {
    pub fn new(metadata: &'a DatasetMetadata) -> Self {
        Self { metadata }
    }

    /// Builds the filter plan for an optional WHERE clause root.
    pub fn build(&self, root: Option<&AstNode>) -> PlanResult<WherePlan> {
        let outcome = match root {
            Some(node) => self.build_node(node)?,
            None => Outcome::default(),
        };
        Ok(WherePlan {
            filter: outcome.filter,
            columns: outcome.columns,
            geometry: outcome.geometry,
        })
    }

    fn build_node(&self, node: &AstNode) -> PlanResult<Outcome> {
        match node {
            AstNode::Conditional { op, left, right } if is_boolean_op(op) => {
                let lhs = self.build_node(left)?;
                let rhs = self.build_node(right)?;
                Ok(combine_outcomes(op, lhs, rhs))
            }
            AstNode::Conditional { op, left, right } => self.comparison(op, left, right),
            AstNode::Not { operand } => {
                let mut inner = self.build_node(operand)?;
                inner.filter = inner.filter.map(FilterSpec::negate);
                Ok(inner)
            }
            AstNode::Function {
                name, arguments, ..
            } if name.eq_ignore_ascii_case("st_intersects") => {
                let geometry = extract_geometry(arguments)?;
                Ok(Outcome {
                    filter: None,
                    columns: BTreeSet::new(),
                    geometry: Some(geometry),
                })
            }
            other => Err(PlanError::MalformedComparison(format!(
                "unexpected node in WHERE clause: {:?}",
                other
            ))),
        }
    }

    fn comparison(&self, op: &str, left: &AstNode, right: &AstNode) -> PlanResult<Outcome> {
        let field = left
            .literal_name()
            .ok_or_else(|| {
                PlanError::MalformedComparison(format!(
                    "comparison left-hand side is not a column reference: {:?}",
                    left
                ))
            })
            .map(|name| unquote(name).to_string())?;

        if self.metadata.is_band(&field) {
            return Err(PlanError::BandFilter(field));
        }
        if !self.metadata.is_column(&field) {
            return Err(PlanError::UnknownColumn(field));
        }

        let op = CompareOp::parse(op).ok_or_else(|| PlanError::UnsupportedOperator(op.into()))?;

        let filter = match op {
            CompareOp::Lt => FilterSpec::lt(field.as_str(), comparison_value(right)?),
            CompareOp::Lte => FilterSpec::lte(field.as_str(), comparison_value(right)?),
            CompareOp::Gt => FilterSpec::gt(field.as_str(), comparison_value(right)?),
            CompareOp::Gte => FilterSpec::gte(field.as_str(), comparison_value(right)?),
            CompareOp::Eq => FilterSpec::eq(field.as_str(), comparison_value(right)?),
            CompareOp::Neq => FilterSpec::neq(field.as_str(), comparison_value(right)?),
            CompareOp::Like => like_filter(&field, right)?,
            CompareOp::In => in_filter(&field, right)?,
            CompareOp::Is => is_filter(&field, right)?,
            CompareOp::Between => between_filter(&field, right)?,
        };
        Ok(Outcome::predicate(filter, field))
    }
}

fn is_boolean_op(op: &str) -> bool {
    op.eq_ignore_ascii_case("and") || op.eq_ignore_ascii_case("or")
}

/// Combines two child outcomes under a boolean operator.
///
/// A side without a predicate (an always-true clause, e.g. an extracted
/// spatial intersection) leaves the other side's predicate standing alone.
fn combine_outcomes(op: &str, lhs: Outcome, rhs: Outcome) -> Outcome {
    let filter = match (lhs.filter, rhs.filter) {
        (Some(l), Some(r)) => {
            if op.eq_ignore_ascii_case("and") {
                Some(FilterSpec::and(l, r))
            } else {
                Some(FilterSpec::or(l, r))
            }
        }
        (Some(l), None) => Some(l),
        (None, Some(r)) => Some(r),
        (None, None) => None,
    };
    let mut columns = lhs.columns;
    columns.extend(rhs.columns);
    Outcome {
        filter,
        columns,
        geometry: lhs.geometry.or(rhs.geometry),
    }
}

/// Converts a comparison right-hand side into a backend filter value.
///
/// String literals are unwrapped from their quote characters; strings that
/// parse as dates become epoch milliseconds so time comparisons work
/// against numeric timestamp columns.
fn comparison_value(node: &AstNode) -> PlanResult<Value> {
    match node {
        AstNode::Number(n) => Ok(json!(n)),
        AstNode::Bool(b) => Ok(json!(b)),
        AstNode::String(s) | AstNode::Literal { value: s, .. } => {
            let unquoted = unquote(s);
            match parse_date_millis(unquoted) {
                Some(millis) => Ok(json!(millis)),
                None => Ok(json!(unquoted)),
            }
        }
        other => Err(PlanError::MalformedComparison(format!(
            "unsupported comparison value: {:?}",
            other
        ))),
    }
}

/// Epoch milliseconds for a date-shaped string, `None` otherwise.
fn parse_date_millis(s: &str) -> Option<i64> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%m/%d/%Y", "%Y-%m-%d"] {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(s, format) {
            return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis());
        }
    }
    None
}

fn like_filter(field: &str, right: &AstNode) -> PlanResult<FilterSpec> {
    let pattern = match right {
        AstNode::String(s) | AstNode::Literal { value: s, .. } => unquote(s),
        other => {
            return Err(PlanError::MalformedComparison(format!(
                "LIKE requires a string pattern, got {:?}",
                other
            )))
        }
    };
    let starts = pattern.starts_with('%');
    let ends = pattern.ends_with('%');
    let filter = if starts && ends && pattern.len() >= 2 {
        FilterSpec::contains(field, &pattern[1..pattern.len() - 1])
    } else if starts {
        FilterSpec::ends_with(field, &pattern[1..])
    } else if ends {
        FilterSpec::starts_with(field, &pattern[..pattern.len() - 1])
    } else {
        FilterSpec::eq(field, json!(pattern))
    };
    Ok(filter)
}

fn in_filter(field: &str, right: &AstNode) -> PlanResult<FilterSpec> {
    let items = match right {
        AstNode::List(items) => items,
        other => {
            return Err(PlanError::MalformedComparison(format!(
                "IN requires a value list, got {:?}",
                other
            )))
        }
    };
    let values = items
        .iter()
        .map(comparison_value)
        .collect::<PlanResult<Vec<_>>>()?;
    Ok(FilterSpec::in_list(field, values))
}

fn is_filter(field: &str, right: &AstNode) -> PlanResult<FilterSpec> {
    let token = right
        .token()
        .map(|t| unquote(&t).to_ascii_lowercase())
        .unwrap_or_else(|| format!("{:?}", right));
    match token.as_str() {
        "null" => Ok(FilterSpec::eq(field, Value::Null)),
        "not null" => Ok(FilterSpec::eq(field, Value::Null).negate()),
        other => Err(PlanError::InvalidIsOperand(other.to_string())),
    }
}

fn between_filter(field: &str, right: &AstNode) -> PlanResult<FilterSpec> {
    let bounds = match right {
        AstNode::List(items) if items.len() == 2 => items,
        _ => return Err(PlanError::BetweenBounds),
    };
    let low = comparison_value(&bounds[0])?;
    let high = comparison_value(&bounds[1])?;
    Ok(FilterSpec::and(
        FilterSpec::gte(field, low),
        FilterSpec::lte(field, high),
    ))
}

/// Locates the GeoJSON payload of an `ST_GeomFromGeoJSON` call nested in a
/// spatial-intersection argument list and parses it into a geometry.
fn extract_geometry(arguments: &[AstNode]) -> PlanResult<Geometry> {
    let payload = arguments
        .iter()
        .find_map(find_geojson_payload)
        .ok_or_else(|| {
            PlanError::InvalidGeometry("no ST_GeomFromGeoJSON payload in intersection".into())
        })?;
    let raw: Value = serde_json::from_str(unquote(&payload))
        .map_err(|e| PlanError::InvalidGeometry(e.to_string()))?;
    Geometry::from_geojson(&raw)
        .ok_or_else(|| PlanError::InvalidGeometry("payload holds no geometry object".into()))
}

fn find_geojson_payload(node: &AstNode) -> Option<String> {
    match node {
        AstNode::Function {
            name, arguments, ..
        } => {
            if name.eq_ignore_ascii_case("st_geomfromgeojson") {
                arguments.first().and_then(AstNode::token)
            } else {
                arguments.iter().find_map(find_geojson_payload)
            }
        }
        _ => None,
    }
}
