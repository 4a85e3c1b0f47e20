//! Output naming and aliasing
//!
//! The backend's result keys follow a documented wire contract: column
//! reductions write each primitive's canonical output name as a key holding
//! a positional list (one slot per repeat), and stack aggregations
//! concatenate the band name with the reducer output names in application
//! order (`pr` summed per image then summed over the region materializes as
//! `pr_sum_sum`). The naming map replicates that contract to select the
//! fields a query actually requested and rename them to their aliases.

use crate::backend::Record;
use crate::plan::{aggregate_slots, AggregateFunction, FunctionCall, SelectPlan};

/// Where an output value comes from in a raw result record.
#[derive(Debug, Clone, PartialEq)]
enum Source {
    /// The whole value under a raw key
    Whole(String),
    /// One slot of a positional list under a raw key
    Indexed(String, usize),
}

#[derive(Debug, Clone, PartialEq)]
struct NamedOutput {
    source: Source,
    output: String,
}

/// Ordered mapping from raw result keys to requested output names.
#[derive(Debug, Clone, Default)]
pub struct OutputNaming {
    entries: Vec<NamedOutput>,
}

impl OutputNaming {
    /// Naming for plain column/band selection: aliases applied, unrequested
    /// fields dropped.
    pub fn for_selection(plan: &SelectPlan) -> OutputNaming {
        let entries = plan
            .columns
            .iter()
            .chain(plan.bands.iter())
            .map(|field| NamedOutput {
                source: Source::Whole(field.name.clone()),
                output: field.output_name().to_string(),
            })
            .collect();
        OutputNaming { entries }
    }

    /// Naming for column-reduce results: group keys pass through, aggregate
    /// outputs resolve by canonical key and positional slot.
    ///
    /// A key whose occurrences carry no alias passes its positional list
    /// through whole, mirroring the backend's raw shape; any alias switches
    /// that key to per-slot extraction.
    pub fn for_column_reduce(
        functions: &[FunctionCall],
        group_names: &[String],
    ) -> OutputNaming {
        let mut entries: Vec<NamedOutput> = group_names
            .iter()
            .map(|name| NamedOutput {
                source: Source::Whole(name.clone()),
                output: name.clone(),
            })
            .collect();

        let slots = aggregate_slots(functions);
        let mut keys_done: Vec<&str> = Vec::new();
        for slot in &slots {
            if keys_done.contains(&slot.output_key) {
                continue;
            }
            keys_done.push(slot.output_key);

            let key_slots: Vec<_> = slots
                .iter()
                .filter(|s| s.output_key == slot.output_key)
                .collect();
            let any_alias = key_slots.iter().any(|s| s.call.alias.is_some());
            if any_alias {
                for s in key_slots {
                    entries.push(NamedOutput {
                        source: Source::Indexed(s.output_key.to_string(), s.index),
                        output: s
                            .call
                            .alias
                            .clone()
                            .unwrap_or_else(|| s.output_key.to_string()),
                    });
                }
            } else {
                entries.push(NamedOutput {
                    source: Source::Whole(slot.output_key.to_string()),
                    output: slot.output_key.to_string(),
                });
            }
        }
        OutputNaming { entries }
    }

    /// Naming for stack-aggregation results, matched against the keys of an
    /// actual sample record.
    ///
    /// The expected key is `{band}_{func}_{func}` (per-image application
    /// then region application); when the sample lacks it, the single-
    /// application prefix `{band}_{func}` is tried before giving up on the
    /// entry.
    pub fn for_stack_aggregate(
        functions: &[FunctionCall],
        group_names: &[String],
        sample: Option<&Record>,
    ) -> OutputNaming {
        let mut entries: Vec<NamedOutput> = group_names
            .iter()
            .map(|name| NamedOutput {
                source: Source::Whole(name.clone()),
                output: name.clone(),
            })
            .collect();

        for call in functions {
            let canonical = match AggregateFunction::parse(&call.name) {
                Some(aggregate) => aggregate.reducer_kind().output_name(),
                None => continue,
            };
            let band = match call.first_argument_name() {
                Some(band) => band,
                None => continue,
            };
            let double = format!("{}_{}_{}", band, canonical, canonical);
            let single = format!("{}_{}", band, canonical);
            let raw_key = match sample {
                Some(record) if record.contains_key(&double) => double,
                Some(record) if record.contains_key(&single) => single,
                Some(_) => continue,
                None => double,
            };
            entries.push(NamedOutput {
                output: call.alias.clone().unwrap_or_else(|| raw_key.clone()),
                source: Source::Whole(raw_key),
            });
        }
        OutputNaming { entries }
    }

    /// Applies the mapping to each record, keeping only mapped fields.
    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        records
            .into_iter()
            .map(|record| {
                let mut out = Record::new();
                for entry in &self.entries {
                    match &entry.source {
                        Source::Whole(key) => {
                            if let Some(value) = record.get(key) {
                                out.insert(entry.output.clone(), value.clone());
                            }
                        }
                        Source::Indexed(key, index) => {
                            if let Some(value) = record.get(key) {
                                let slot = match value {
                                    serde_json::Value::Array(items) => items.get(*index).cloned(),
                                    other if *index == 0 => Some(other.clone()),
                                    _ => None,
                                };
                                if let Some(slot) = slot {
                                    out.insert(entry.output.clone(), slot);
                                }
                            }
                        }
                    }
                }
                out
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstNode;
    use crate::plan::SelectedField;
    use serde_json::json;

    fn call(name: &str, arg: &str, alias: Option<&str>) -> FunctionCall {
        FunctionCall {
            name: name.into(),
            arguments: vec![AstNode::Literal {
                value: arg.into(),
                alias: None,
            }],
            alias: alias.map(str::to_string),
        }
    }

    fn record(pairs: &[(&str, serde_json::Value)]) -> Record {
        let mut r = Record::new();
        for (k, v) in pairs {
            r.insert(k.to_string(), v.clone());
        }
        r
    }

    #[test]
    fn test_selection_applies_aliases_and_drops_extras() {
        let plan = SelectPlan {
            columns: vec![
                SelectedField::new("status", Some("state".to_string())),
                SelectedField::new("width", None),
            ],
            ..SelectPlan::default()
        };
        let naming = OutputNaming::for_selection(&plan);
        let out = naming.apply(vec![record(&[
            ("status", json!("permanent")),
            ("width", json!(500)),
            ("system:time_start", json!(1)),
        ])]);
        assert_eq!(out[0].get("state"), Some(&json!("permanent")));
        assert_eq!(out[0].get("width"), Some(&json!(500)));
        assert!(!out[0].contains_key("system:time_start"));
    }

    #[test]
    fn test_unaliased_aggregate_passes_positional_list_through() {
        // Recorded sample shape: count(name) over a 56-row table.
        let functions = vec![call("count", "name", None)];
        let naming = OutputNaming::for_column_reduce(&functions, &[]);
        let out = naming.apply(vec![record(&[("count", json!([56]))])]);
        assert_eq!(out[0].get("count"), Some(&json!([56])));
    }

    #[test]
    fn test_aliased_aggregates_extract_slots() {
        let functions = vec![
            call("sum", "x", Some("total_x")),
            call("sum", "y", Some("total_y")),
        ];
        let naming = OutputNaming::for_column_reduce(&functions, &[]);
        let out = naming.apply(vec![record(&[("sum", json!([10.0, 20.0]))])]);
        assert_eq!(out[0].get("total_x"), Some(&json!(10.0)));
        assert_eq!(out[0].get("total_y"), Some(&json!(20.0)));
    }

    #[test]
    fn test_group_keys_pass_through() {
        let functions = vec![call("sum", "mean_elev", None)];
        let naming =
            OutputNaming::for_column_reduce(&functions, &["glac_name".to_string()]);
        let out = naming.apply(vec![record(&[
            ("glac_name", json!("Fox")),
            ("sum", json!([12.0])),
        ])]);
        assert_eq!(out[0].get("glac_name"), Some(&json!("Fox")));
        assert_eq!(out[0].get("sum"), Some(&json!([12.0])));
    }

    #[test]
    fn test_stack_keys_use_double_suffix() {
        // Recorded sample from a stack aggregation of sum(pr), avg(tmmn).
        let functions = vec![call("sum", "pr", None), call("avg", "tmmn", None)];
        let sample = record(&[
            ("pr_sum_sum", json!(1.5)),
            ("pr_sum_mean", json!(0.5)),
            ("tmmn_mean_sum", json!(9.0)),
            ("tmmn_mean_mean", json!(3.0)),
        ]);
        let naming = OutputNaming::for_stack_aggregate(&functions, &[], Some(&sample));
        let out = naming.apply(vec![sample]);
        let keys: Vec<_> = out[0].keys().cloned().collect();
        assert_eq!(keys, vec!["pr_sum_sum", "tmmn_mean_mean"]);
    }

    #[test]
    fn test_stack_alias_renames() {
        let functions = vec![call("sum", "pr", Some("total_pr"))];
        let sample = record(&[("pr_sum_sum", json!(1.5))]);
        let naming = OutputNaming::for_stack_aggregate(&functions, &[], Some(&sample));
        let out = naming.apply(vec![sample]);
        assert_eq!(out[0].get("total_pr"), Some(&json!(1.5)));
    }

    #[test]
    fn test_stack_falls_back_to_single_application_key() {
        let functions = vec![call("sum", "pr", None)];
        let sample = record(&[("pr_sum", json!(1.5))]);
        let naming = OutputNaming::for_stack_aggregate(&functions, &[], Some(&sample));
        let out = naming.apply(vec![sample]);
        assert_eq!(out[0].get("pr_sum"), Some(&json!(1.5)));
    }
}
