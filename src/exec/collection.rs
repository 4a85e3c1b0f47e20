//! Collection execution
//!
//! Runs planned queries over vector tables and raster stacks as a strictly
//! ordered stage chain:
//!
//! `init -> project -> filter -> group_reduce -> sort -> limit ->
//! materialize -> rename_output`
//!
//! Each stage is optional based on clause presence; materialization is
//! always terminal. Aggregated result lists are sorted and limited in
//! memory since they no longer live in a backend collection.
//!
//! Known limitation: the backend cannot multi-key-sort collections, so only
//! the first ORDER BY key is applied; additional keys are accepted and
//! logged, not raised.

use crate::ast::OrderKey;
use crate::backend::{
    CollectionKind, CollectionQuery, FilterSpec, GeoBackend, Geometry, ImageReduce, Projection,
    Record, RegionReduce, SortKey, StackAggregation,
};
use crate::plan::{ReducerBundle, SelectPlan, WherePlan};

use super::errors::{ExecError, ExecResult};
use super::naming::OutputNaming;
use super::sorter::RecordSorter;

/// Safety ceiling applied when no explicit LIMIT is present, to avoid
/// unbounded materialization.
pub const DEFAULT_RESULT_LIMIT: u64 = 10_000;

/// Everything the executor needs for one collection query.
#[derive(Debug)]
pub struct CollectionRequest<'a> {
    pub asset_id: &'a str,
    pub kind: CollectionKind,
    pub plan: &'a SelectPlan,
    pub where_plan: &'a WherePlan,
    pub bundle: &'a ReducerBundle,
    pub group_names: &'a [String],
    pub order_by: &'a [OrderKey],
    pub limit: Option<u64>,
    pub geometry: Option<&'a Geometry>,
}

/// Executes collection queries against the backend.
pub struct CollectionExecutor<'a, B: GeoBackend> {
    backend: &'a B,
}

impl<'a, B: GeoBackend> CollectionExecutor<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Runs the stage chain and returns renamed records.
    pub fn execute(&self, request: &CollectionRequest) -> ExecResult<Vec<Record>> {
        let mut query = CollectionQuery::new(request.asset_id, request.kind);
        project(request, &mut query);
        query.filter = request.where_plan.filter.clone();
        query.bounds = request.geometry.cloned();

        match request.kind {
            CollectionKind::Table => {
                if let Some(by_column) = &request.bundle.by_column {
                    let records = self.backend.reduce_columns(&query, by_column)?;
                    let records = finish_in_memory(records, request);
                    let naming = OutputNaming::for_column_reduce(
                        &request.plan.column_functions,
                        request.group_names,
                    );
                    return Ok(naming.apply(records));
                }
            }
            CollectionKind::ImageStack => {
                if let Some(per_image) = &request.bundle.per_image {
                    return self.stack_aggregate(request, &query, per_image);
                }
            }
        }

        self.materialize_plain(request, query)
    }

    /// Non-aggregated path: backend-side sort and limit, then rename.
    fn materialize_plain(
        &self,
        request: &CollectionRequest,
        mut query: CollectionQuery,
    ) -> ExecResult<Vec<Record>> {
        query.sort = first_sort_key(request.order_by);
        query.limit = Some(request.limit.unwrap_or(DEFAULT_RESULT_LIMIT));
        let records = self.backend.materialize(&query)?;
        Ok(OutputNaming::for_selection(request.plan).apply(records))
    }

    /// Aggregation over a stack: cross-tabulated per group when a GROUP BY
    /// is present, a single whole-stack aggregate otherwise.
    fn stack_aggregate(
        &self,
        request: &CollectionRequest,
        query: &CollectionQuery,
        per_image: &ImageReduce,
    ) -> ExecResult<Vec<Record>> {
        let region = request
            .bundle
            .by_region
            .as_ref()
            .ok_or(ExecError::MissingGeometry)?;

        let records = match (&request.bundle.by_column, request.group_names.is_empty()) {
            (Some(by_column), false) => {
                let groups = self.backend.reduce_columns(query, by_column)?;
                let total = self.backend.collection_size(query)?;
                if groups.len() as u64 == total {
                    // Every record is its own group; reduction would be a
                    // costly identity. Pass the stack through unchanged.
                    log::debug!(
                        "grouping over '{}' is a no-op ({} groups of {} records)",
                        request.asset_id,
                        groups.len(),
                        total
                    );
                    return self.materialize_plain(request, query.clone());
                }
                let mut out = Vec::with_capacity(groups.len());
                for group in &groups {
                    out.push(self.reduce_group(request, query, per_image, region, group)?);
                }
                out
            }
            _ => {
                let aggregation = StackAggregation {
                    query: query.clone(),
                    per_image: per_image.clone(),
                    region: region.clone(),
                };
                vec![self.backend.aggregate_stack(&aggregation)?]
            }
        };

        let records = finish_in_memory(records, request);
        let naming = OutputNaming::for_stack_aggregate(
            &request.plan.band_functions,
            request.group_names,
            records.first(),
        );
        Ok(naming.apply(records))
    }

    /// Collapses one cross-tabulation group to a single scalar record:
    /// filter the stack to the group's members, aggregate, and carry the
    /// group-key values into the result.
    fn reduce_group(
        &self,
        request: &CollectionRequest,
        query: &CollectionQuery,
        per_image: &ImageReduce,
        region: &RegionReduce,
        group: &Record,
    ) -> ExecResult<Record> {
        let mut subquery = query.clone();
        for key in request.group_names {
            if let Some(value) = group.get(key) {
                subquery.filter = Some(FilterSpec::merge(
                    subquery.filter.take(),
                    FilterSpec::eq(key.as_str(), value.clone()),
                ));
            }
        }
        let aggregation = StackAggregation {
            query: subquery,
            per_image: per_image.clone(),
            region: region.clone(),
        };
        let mut record = self.backend.aggregate_stack(&aggregation)?;
        for key in request.group_names {
            if let Some(value) = group.get(key) {
                record.insert(key.clone(), value.clone());
            }
        }
        Ok(record)
    }
}

/// Projection stage. Band selection on a stack replaces property selection
/// entirely (a backend limitation); otherwise the resolved column set is
/// projected, which already includes WHERE-referenced columns.
fn project(request: &CollectionRequest, query: &mut CollectionQuery) {
    if request.kind == CollectionKind::ImageStack && !request.plan.band_names.is_empty() {
        query.projection = Some(Projection::Bands(
            request.plan.band_names.iter().cloned().collect(),
        ));
    } else if !request.plan.column_names.is_empty() {
        query.projection = Some(Projection::Columns(
            request.plan.column_names.iter().cloned().collect(),
        ));
    }
}

/// First ORDER BY key, logging the discarded remainder.
fn first_sort_key(order_by: &[OrderKey]) -> Option<SortKey> {
    if order_by.len() > 1 {
        log::warn!(
            "backend supports single-key sort only; ignoring {} additional ORDER BY keys",
            order_by.len() - 1
        );
    }
    order_by.first().map(|key| SortKey {
        field: key.field.clone(),
        ascending: key.ascending,
    })
}

/// Sort and limit stages for record lists that already left the backend.
fn finish_in_memory(mut records: Vec<Record>, request: &CollectionRequest) -> Vec<Record> {
    if let Some(key) = first_sort_key(request.order_by) {
        RecordSorter::sort(&mut records, &key);
    }
    let limit = request.limit.unwrap_or(DEFAULT_RESULT_LIMIT) as usize;
    records.truncate(limit);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        BackendResult, ColumnReduce, ReducerKind, ReducerSpec,
    };
    use serde_json::{json, Value};
    use std::cell::RefCell;

    /// Backend stub recording the queries it receives.
    struct Recording {
        seen_query: RefCell<Option<CollectionQuery>>,
        records: Vec<Record>,
        groups: Vec<Record>,
        size: u64,
    }

    impl Recording {
        fn new(records: Vec<Record>) -> Self {
            Self {
                seen_query: RefCell::new(None),
                records,
                groups: Vec::new(),
                size: 0,
            }
        }
    }

    impl GeoBackend for Recording {
        fn asset_info(&self, _asset_id: &str) -> BackendResult<Value> {
            unimplemented!()
        }

        fn first_stack_member(&self, _asset_id: &str) -> BackendResult<Value> {
            unimplemented!()
        }

        fn collection_size(&self, _query: &CollectionQuery) -> BackendResult<u64> {
            Ok(self.size)
        }

        fn materialize(&self, query: &CollectionQuery) -> BackendResult<Vec<Record>> {
            *self.seen_query.borrow_mut() = Some(query.clone());
            Ok(self.records.clone())
        }

        fn reduce_columns(
            &self,
            query: &CollectionQuery,
            _reduce: &ColumnReduce,
        ) -> BackendResult<Vec<Record>> {
            *self.seen_query.borrow_mut() = Some(query.clone());
            Ok(self.groups.clone())
        }

        fn aggregate_stack(&self, _aggregation: &StackAggregation) -> BackendResult<Record> {
            unimplemented!()
        }

        fn reduce_region(
            &self,
            _asset_id: &str,
            _bands: &[String],
            _reduce: &crate::backend::RegionReduce,
        ) -> BackendResult<Record> {
            unimplemented!()
        }
    }

    fn record(pairs: &[(&str, Value)]) -> Record {
        let mut r = Record::new();
        for (k, v) in pairs {
            r.insert(k.to_string(), v.clone());
        }
        r
    }

    fn status_plan() -> SelectPlan {
        let mut plan = SelectPlan::default();
        plan.columns
            .push(crate::plan::SelectedField::new("status", None));
        plan.column_names.insert("status".to_string());
        plan
    }

    #[test]
    fn test_plain_query_stage_assembly() {
        let backend = Recording::new(vec![record(&[("status", json!("permanent"))])]);
        let plan = status_plan();
        let where_plan = WherePlan::default();
        let bundle = ReducerBundle::default();
        let order_by = vec![
            OrderKey::desc("system:time_start"),
            OrderKey::asc("system:asset_size"),
        ];
        let request = CollectionRequest {
            asset_id: "IDAHO_EPSCOR/GRIDMET",
            kind: CollectionKind::ImageStack,
            plan: &plan,
            where_plan: &where_plan,
            bundle: &bundle,
            group_names: &[],
            order_by: &order_by,
            limit: None,
            geometry: None,
        };

        let records = CollectionExecutor::new(&backend).execute(&request).unwrap();
        assert_eq!(records.len(), 1);

        let seen = backend.seen_query.borrow().clone().unwrap();
        // Only the first ORDER BY key survives; the safety ceiling applies.
        assert_eq!(seen.sort, Some(SortKey::desc("system:time_start")));
        assert_eq!(seen.limit, Some(DEFAULT_RESULT_LIMIT));
        assert_eq!(
            seen.projection,
            Some(Projection::Columns(vec!["status".to_string()]))
        );
    }

    #[test]
    fn test_table_aggregate_goes_through_reduce_columns() {
        let mut backend = Recording::new(Vec::new());
        backend.groups = vec![record(&[("count", json!([56]))])];
        let plan = SelectPlan {
            column_functions: vec![crate::plan::FunctionCall {
                name: "count".into(),
                arguments: vec![crate::ast::AstNode::Literal {
                    value: "name".into(),
                    alias: None,
                }],
                alias: None,
            }],
            ..SelectPlan::default()
        };
        let where_plan = WherePlan::default();
        let bundle = ReducerBundle {
            by_column: Some(ColumnReduce {
                reducer: ReducerSpec::primitive(ReducerKind::Count).unweighted(),
                selectors: vec!["name".to_string()],
            }),
            ..ReducerBundle::default()
        };
        let request = CollectionRequest {
            asset_id: "ft:photos",
            kind: CollectionKind::Table,
            plan: &plan,
            where_plan: &where_plan,
            bundle: &bundle,
            group_names: &[],
            order_by: &[],
            limit: None,
            geometry: None,
        };

        let records = CollectionExecutor::new(&backend).execute(&request).unwrap();
        assert_eq!(records, vec![record(&[("count", json!([56]))])]);
    }

    #[test]
    fn test_grouping_noop_shortcut_passes_stack_through() {
        let plain = vec![
            record(&[("status", json!("a"))]),
            record(&[("status", json!("b"))]),
        ];
        let mut backend = Recording::new(plain.clone());
        // As many groups as records: grouping is an identity.
        backend.groups = vec![
            record(&[("status", json!("a"))]),
            record(&[("status", json!("b"))]),
        ];
        backend.size = 2;

        let plan = status_plan();
        let where_plan = WherePlan::default();
        let groups = vec!["status".to_string()];
        let bundle = ReducerBundle {
            by_column: Some(ColumnReduce {
                reducer: ReducerSpec::primitive(ReducerKind::Count)
                    .unweighted()
                    .group(1, "status"),
                selectors: vec!["status".to_string(), "status".to_string()],
            }),
            per_image: Some(ImageReduce::new(ReducerSpec::primitive(ReducerKind::Sum))),
            by_region: Some(RegionReduce::new(
                ReducerSpec::primitive(ReducerKind::Sum),
                Some(Geometry::global()),
            )),
        };
        let request = CollectionRequest {
            asset_id: "IDAHO_EPSCOR/GRIDMET",
            kind: CollectionKind::ImageStack,
            plan: &plan,
            where_plan: &where_plan,
            bundle: &bundle,
            group_names: &groups,
            order_by: &[],
            limit: None,
            geometry: None,
        };

        let records = CollectionExecutor::new(&backend).execute(&request).unwrap();
        // Untouched stack records, not reduced copies.
        assert_eq!(records, plain);
    }
}
