//! SELECT-list planning
//!
//! Classifies each select entry into plain columns, plain bands, aggregate
//! functions over columns or bands, wildcard expansion, or "other" nodes
//! retained for the caller. Every name is cross-validated against the
//! dataset metadata; unknown references fail before any backend call.

use std::collections::BTreeSet;

use crate::ast::{unquote, AstNode};
use crate::metadata::DatasetMetadata;

use super::errors::{PlanError, PlanResult};

/// A selected column or band with its requested output alias.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedField {
    pub name: String,
    pub alias: Option<String>,
}

impl SelectedField {
    pub fn new(name: impl Into<String>, alias: Option<String>) -> Self {
        Self {
            name: name.into(),
            alias,
        }
    }

    /// The output name: the alias when requested, the field name otherwise.
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A function entry from the select list, recorded verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Vec<AstNode>,
    pub alias: Option<String>,
}

impl FunctionCall {
    /// The unquoted name of the first argument, used as a reducer selector.
    pub fn first_argument_name(&self) -> Option<String> {
        self.arguments
            .first()
            .and_then(AstNode::token)
            .map(|t| unquote(&t).to_string())
    }
}

/// The classified select list.
#[derive(Debug, Clone, Default)]
pub struct SelectPlan {
    pub columns: Vec<SelectedField>,
    pub bands: Vec<SelectedField>,
    /// Every function entry, in select-list order
    pub functions: Vec<FunctionCall>,
    /// Functions with at least one column argument
    pub column_functions: Vec<FunctionCall>,
    /// Functions with at least one band argument
    pub band_functions: Vec<FunctionCall>,
    /// All column names the query touches, explicitly or via function
    /// arguments; later unioned with WHERE-referenced columns
    pub column_names: BTreeSet<String>,
    /// All band names the query touches
    pub band_names: BTreeSet<String>,
    /// Select entries this planner does not interpret
    pub others: Vec<AstNode>,
}

impl SelectPlan {
    /// Plans a select list against the dataset metadata.
    pub fn build(select: &[AstNode], metadata: &DatasetMetadata) -> PlanResult<SelectPlan> {
        let mut plan = SelectPlan::default();

        for entry in select {
            match entry {
                AstNode::Literal { value, alias } => {
                    plan.classify_literal(unquote(value), alias.clone(), metadata)?;
                }
                AstNode::Function {
                    name,
                    arguments,
                    alias,
                } => {
                    plan.classify_function(
                        FunctionCall {
                            name: name.clone(),
                            arguments: arguments.clone(),
                            alias: alias.clone(),
                        },
                        metadata,
                    )?;
                }
                AstNode::Wildcard => plan.expand_wildcard(metadata),
                other => plan.others.push(other.clone()),
            }
        }

        plan.check_duplicate_aliases()?;
        Ok(plan)
    }

    /// Unions WHERE-referenced columns into the resolved set so filter
    /// columns stay retrievable even when projected away.
    pub fn include_filter_columns(&mut self, columns: &BTreeSet<String>) {
        self.column_names.extend(columns.iter().cloned());
    }

    fn classify_literal(
        &mut self,
        name: &str,
        alias: Option<String>,
        metadata: &DatasetMetadata,
    ) -> PlanResult<()> {
        if metadata.is_column(name) {
            self.column_names.insert(name.to_string());
            self.columns.push(SelectedField::new(name, alias));
            Ok(())
        } else if metadata.is_band(name) {
            self.band_names.insert(name.to_string());
            self.bands.push(SelectedField::new(name, alias));
            Ok(())
        } else {
            Err(PlanError::UnknownName(name.to_string()))
        }
    }

    fn classify_function(
        &mut self,
        call: FunctionCall,
        metadata: &DatasetMetadata,
    ) -> PlanResult<()> {
        let mut touches_column = false;
        let mut touches_band = false;
        let mut placeholder = false;
        let mut unresolved: Option<String> = None;

        for argument in &call.arguments {
            match argument {
                AstNode::Literal { value, .. } => {
                    let name = unquote(value);
                    if metadata.is_column(name) {
                        touches_column = true;
                        self.column_names.insert(name.to_string());
                    } else if metadata.is_band(name) {
                        touches_band = true;
                        self.band_names.insert(name.to_string());
                    } else if is_band_placeholder(name) {
                        placeholder = true;
                    } else if unresolved.is_none() {
                        unresolved = Some(name.to_string());
                    }
                }
                AstNode::Wildcard => {
                    if is_raster_function(&call.name) {
                        placeholder = true;
                    } else {
                        return Err(PlanError::WildcardArgument(call.name.clone()));
                    }
                }
                // Numbers, strings, and booleans are plain arguments, not
                // field references.
                _ => {}
            }
        }

        if touches_column {
            self.column_functions.push(call.clone());
        }
        if touches_band {
            self.band_functions.push(call.clone());
        }
        if !touches_column && !touches_band && !placeholder {
            if let Some(name) = unresolved {
                return Err(PlanError::UnknownName(name));
            }
        }

        self.functions.push(call);
        Ok(())
    }

    fn expand_wildcard(&mut self, metadata: &DatasetMetadata) {
        if !metadata.columns.is_empty() {
            for name in metadata.columns.keys() {
                self.column_names.insert(name.clone());
                self.columns.push(SelectedField::new(name.as_str(), None));
            }
        } else {
            for band in &metadata.bands {
                self.band_names.insert(band.id.clone());
                self.bands.push(SelectedField::new(band.id.as_str(), None));
            }
        }
    }

    fn check_duplicate_aliases(&self) -> PlanResult<()> {
        let mut seen = BTreeSet::new();
        for field in self.columns.iter().chain(self.bands.iter()) {
            if !seen.insert(field.output_name()) {
                return Err(PlanError::DuplicateAlias(field.output_name().to_string()));
            }
        }
        Ok(())
    }
}

/// The literal band placeholder accepted as a raster-function argument.
fn is_band_placeholder(name: &str) -> bool {
    name.eq_ignore_ascii_case("rast") || name.eq_ignore_ascii_case("raster")
}

/// Raster-only postgis functions accept placeholders the schema cannot
/// resolve.
fn is_raster_function(name: &str) -> bool {
    name.to_ascii_lowercase().starts_with("st_")
}
