//! Query engine facade
//!
//! Accepts a parsed query plus an optional spatial region, fetches dataset
//! metadata once, runs the planners, and dispatches to the executor
//! matching the dataset kind. All per-query state is created fresh here and
//! discarded with the response.

use serde_json::Value;

use crate::ast::QueryAst;
use crate::backend::{CollectionKind, GeoBackend, Geometry, Record};
use crate::error::{EngineError, EngineResult};
use crate::exec::{CollectionExecutor, CollectionRequest, ImageExecutor};
use crate::metadata::{DatasetDispatcher, DatasetKind};
use crate::plan::{build_bundle, group_key_names, FilterBuilder, PlanError, SelectPlan};

/// Translates parsed queries into backend call plans and runs them.
pub struct QueryEngine<B: GeoBackend> {
    backend: B,
}

impl<B: GeoBackend> QueryEngine<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Parses the conversion service's JSON and executes the query.
    pub fn execute_json(
        &self,
        query: &Value,
        geojson: Option<&Value>,
    ) -> EngineResult<Vec<Record>> {
        let ast = QueryAst::from_json(query)?;
        self.execute(&ast, geojson)
    }

    /// Executes a parsed query against the backend.
    ///
    /// `geojson` optionally restricts spatial scope; a geometry embedded in
    /// the WHERE clause takes precedence over it.
    pub fn execute(&self, ast: &QueryAst, geojson: Option<&Value>) -> EngineResult<Vec<Record>> {
        let asset_id = ast.from.as_deref().ok_or(EngineError::MissingFrom)?;

        let metadata = DatasetDispatcher::new(&self.backend).describe(asset_id)?;

        let mut plan = SelectPlan::build(&ast.select, &metadata)?;
        let where_plan = FilterBuilder::new(&metadata).build(ast.where_clause.as_ref())?;
        plan.include_filter_columns(&where_plan.columns);

        let caller_geometry = match geojson {
            Some(value) => Some(Geometry::from_geojson(value).ok_or_else(|| {
                PlanError::InvalidGeometry("caller input holds no geometry object".into())
            })?),
            None => None,
        };
        let geometry = where_plan.geometry.clone().or(caller_geometry);

        match metadata.kind {
            DatasetKind::Image => {
                let executor =
                    ImageExecutor::new(&self.backend, asset_id, &metadata, geometry.as_ref());
                Ok(executor.execute(&plan)?)
            }
            DatasetKind::ImageStack | DatasetKind::Table => {
                let kind = if metadata.kind == DatasetKind::Table {
                    CollectionKind::Table
                } else {
                    CollectionKind::ImageStack
                };
                let group_names = group_key_names(&ast.group, &metadata)?;

                // Stack pixel aggregation always needs a region; default to
                // global coverage when nothing narrower was supplied.
                let bundle_geometry = if kind == CollectionKind::ImageStack {
                    Some(geometry.clone().unwrap_or_else(Geometry::global))
                } else {
                    geometry.clone()
                };
                let bundle = build_bundle(&plan, &group_names, bundle_geometry.as_ref())?;

                let request = CollectionRequest {
                    asset_id,
                    kind,
                    plan: &plan,
                    where_plan: &where_plan,
                    bundle: &bundle,
                    group_names: &group_names,
                    order_by: &ast.order_by,
                    limit: ast.limit,
                    geometry: geometry.as_ref(),
                };
                Ok(CollectionExecutor::new(&self.backend).execute(&request)?)
            }
        }
    }
}
