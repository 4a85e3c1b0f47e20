//! Postgis-function argument extraction
//!
//! Positional arguments are parsed against an expected-kind schema with
//! whitespace/quote stripping, band-name-or-1-based-index resolution, and
//! strict boolean-token parsing. Mismatches raise descriptive errors naming
//! the offending argument.

use crate::ast::{unquote, AstNode};

use super::errors::{ExecError, ExecResult};

/// Expected kind of one positional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSpec {
    /// The raster reference itself (placeholder, accepted verbatim)
    Raster,
    /// A band name or 1-based band index
    BandId,
    /// A positive bin count or the token 'auto'
    BinCount,
    /// A strict boolean token
    Flag,
}

/// One extracted argument.
#[derive(Debug, Clone, PartialEq)]
pub enum PostgisArg {
    Raster(String),
    /// Resolved band name
    Band(String),
    /// `None` means 'auto'
    Bins(Option<u32>),
    Flag(bool),
}

impl PostgisArg {
    pub fn band(&self) -> Option<&str> {
        match self {
            PostgisArg::Band(name) => Some(name),
            _ => None,
        }
    }

    pub fn bins(&self) -> Option<Option<u32>> {
        match self {
            PostgisArg::Bins(bins) => Some(*bins),
            _ => None,
        }
    }

    pub fn flag(&self) -> Option<bool> {
        match self {
            PostgisArg::Flag(flag) => Some(*flag),
            _ => None,
        }
    }
}

/// Extracts and validates the positional arguments of a postgis function.
pub fn extract_args(
    function: &str,
    arguments: &[AstNode],
    expected: &[ArgSpec],
    band_names: &[&str],
) -> ExecResult<Vec<PostgisArg>> {
    if arguments.len() != expected.len() {
        return Err(ExecError::ArgumentCount {
            function: function.to_string(),
            expected: expected.len(),
            found: arguments.len(),
        });
    }

    let mut extracted = Vec::with_capacity(expected.len());
    for (node, spec) in arguments.iter().zip(expected) {
        let raw = node.token().ok_or_else(|| ExecError::ArgumentType {
            function: function.to_string(),
            argument: format!("{:?}", node),
            expected: spec.describe(),
        })?;
        let token = unquote(raw.trim()).trim();

        let arg = match spec {
            ArgSpec::Raster => PostgisArg::Raster(token.to_string()),
            ArgSpec::BandId => PostgisArg::Band(resolve_band(token, band_names)?),
            ArgSpec::BinCount => PostgisArg::Bins(resolve_bins(token)?),
            ArgSpec::Flag => PostgisArg::Flag(resolve_flag(token)?),
        };
        extracted.push(arg);
    }
    Ok(extracted)
}

impl ArgSpec {
    fn describe(&self) -> &'static str {
        match self {
            ArgSpec::Raster => "raster reference",
            ArgSpec::BandId => "band name or index",
            ArgSpec::BinCount => "bin count",
            ArgSpec::Flag => "boolean",
        }
    }
}

/// Resolves a band argument as a known name or a 1-based positional index.
fn resolve_band(token: &str, band_names: &[&str]) -> ExecResult<String> {
    if band_names.contains(&token) {
        return Ok(token.to_string());
    }
    if let Ok(position) = token.parse::<i64>() {
        if position >= 1 && (position as usize) <= band_names.len() {
            return Ok(band_names[position as usize - 1].to_string());
        }
    }
    Err(ExecError::InvalidBand(token.to_string()))
}

fn resolve_bins(token: &str) -> ExecResult<Option<u32>> {
    if token.eq_ignore_ascii_case("auto") {
        return Ok(None);
    }
    match token.parse::<u32>() {
        Ok(bins) if bins > 0 => Ok(Some(bins)),
        _ => Err(ExecError::InvalidBinCount(token.to_string())),
    }
}

fn resolve_flag(token: &str) -> ExecResult<bool> {
    if token.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if token.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ExecError::InvalidBoolean(token.to_string()))
    }
}
