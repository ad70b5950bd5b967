//! Factory for `processing/gate`.
//!
//! A gate is configured with either a `condition` expression or one of the
//! named `predicate`s below (with `threshold`), never both.

use crate::analysis::statistics;
use crate::pipeline::buffer::TimeSeriesBuffer;
use crate::pipeline::error::{ConfigError, PipelineResult};
use crate::pipeline::gate::{Gate, GateCondition, GatePredicate};
use crate::pipeline::node::NodeKind;
use crate::pipeline::registry::NodeSpec;
use crate::scripting::ScriptEngine;
use std::sync::Arc;

pub const PREDICATES: [&str; 3] = ["mean_above", "last_above", "any_above"];

/// Build a named predicate over the condition buffer's values.
pub fn named_predicate(name: &str, threshold: f64) -> Option<GatePredicate> {
    let predicate: GatePredicate = match name {
        "mean_above" => Arc::new(move |c: &TimeSeriesBuffer| {
            statistics::mean(&c.channel_major_values()) > threshold
        }),
        "last_above" => Arc::new(move |c: &TimeSeriesBuffer| {
            c.channels()
                .iter()
                .filter_map(|ch| c.last_value(ch))
                .any(|v| v > threshold)
        }),
        "any_above" => Arc::new(move |c: &TimeSeriesBuffer| {
            c.channel_major_values().iter().any(|&v| v > threshold)
        }),
        _ => return None,
    };
    Some(predicate)
}

pub fn build(spec: &NodeSpec<'_>) -> PipelineResult<NodeKind> {
    let params = spec.params();
    let condition = match (params.opt_str("condition")?, params.opt_str("predicate")?) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::invalid(
                spec.name,
                "predicate",
                "set either 'condition' or 'predicate', not both",
            )
            .into())
        }
        (Some(source), None) => {
            let engine = Arc::new(ScriptEngine::new());
            let expr = engine
                .compile(spec.name, source)
                .map_err(|e| ConfigError::invalid(spec.name, "condition", e.to_string()))?;
            GateCondition::Expression { engine, expr }
        }
        (None, Some(name)) => {
            let threshold = params.f64_or("threshold", 0.0)?;
            let predicate = named_predicate(name, threshold).ok_or_else(|| {
                ConfigError::invalid(
                    spec.name,
                    "predicate",
                    format!("'{}' is not one of {:?}", name, PREDICATES),
                )
            })?;
            GateCondition::Predicate(predicate)
        }
        (None, None) => return Err(ConfigError::missing(spec.name, "condition").into()),
    };
    Ok(NodeKind::Gate(Gate::new(condition)))
}
