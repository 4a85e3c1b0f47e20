//! Query planning subsystem for terrasql
//!
//! Three planners run before any executor touches the backend:
//!
//! - the filter builder converts the WHERE AST into a predicate tree and
//!   tracks referenced columns,
//! - the select planner classifies the select list against the dataset
//!   metadata,
//! - the reducer generator maps aggregate functions onto combined backend
//!   reducers.
//!
//! All planning errors are raised here, before any backend call.

mod errors;
mod filter;
mod reducer;
mod select;

pub use errors::{PlanError, PlanResult};
pub use filter::{CompareOp, FilterBuilder, WherePlan};
pub use reducer::{
    aggregate_slots, build_bundle, group_key_names, AggregateFunction, AggregateSlot,
    ReducerBundle,
};
pub use select::{FunctionCall, SelectPlan, SelectedField};
