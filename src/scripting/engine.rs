//! Rhai engine configuration and evaluation entry points.

use crate::analysis::statistics;
use crate::pipeline::buffer::TimeSeriesBuffer;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::scripting::{create_shared_cache, CompiledExpression, SharedExpressionCache};
use rhai::{Array, Dynamic, Engine, Map, Scope};

/// Handle exposed to scripts as the `statistics` variable.
#[derive(Debug, Clone, Copy, Default)]
pub struct Statistics;

/// Sandboxed expression engine shared by script-driven nodes.
pub struct ScriptEngine {
    engine: Engine,
    cache: SharedExpressionCache,
}

impl ScriptEngine {
    pub fn new() -> Self {
        Self::with_cache(create_shared_cache())
    }

    pub fn with_cache(cache: SharedExpressionCache) -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine);
        Self { engine, cache }
    }

    fn configure_engine(engine: &mut Engine) {
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(100_000);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(1_000_000);
        engine.set_max_map_size(1_000);

        engine.register_type_with_name::<Statistics>("Statistics");
        let stats: [(&str, fn(&[f64]) -> f64); 7] = [
            ("mean", statistics::mean),
            ("median", statistics::median),
            ("stdev", statistics::stdev),
            ("variance", statistics::variance),
            ("min", statistics::min),
            ("max", statistics::max),
            ("sum", statistics::sum),
        ];
        for (name, f) in stats {
            engine.register_fn(name, move |_: &mut Statistics, data: Array| -> f64 {
                f(&to_floats(&data))
            });
            engine.register_fn(name, move |data: Array| -> f64 { f(&to_floats(&data)) });
        }

        // Deadband: snap values within `width` of `center` onto it.
        engine.register_fn("deadband", |value: f64, center: f64, width: f64| -> f64 {
            if (value - center).abs() <= width {
                center
            } else {
                value
            }
        });

        engine.register_fn(
            "map_range",
            |value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64| -> f64 {
                if in_max == in_min {
                    return out_min;
                }
                out_min + (value - in_min) * (out_max - out_min) / (in_max - in_min)
            },
        );

        engine.register_fn("clamp", |value: f64, lo: f64, hi: f64| -> f64 {
            value.max(lo).min(hi)
        });
    }

    /// Compile an expression, reusing the cached AST for known sources.
    pub fn compile(&self, name: &str, source: &str) -> PipelineResult<CompiledExpression> {
        let mut cache = self
            .cache
            .write()
            .map_err(|e| PipelineError::Script(format!("Failed to acquire cache lock: {}", e)))?;
        cache.get_or_compile(&self.engine, name, source)
    }

    /// Evaluate a gate condition against buffered condition data.
    pub fn eval_condition(
        &self,
        expr: &CompiledExpression,
        condition: &TimeSeriesBuffer,
        signal_count: usize,
    ) -> PipelineResult<bool> {
        let mut per_channel = Map::new();
        for name in condition.channels() {
            let values = condition.data_on_channel(name).unwrap_or_default();
            per_channel.insert(name.as_str().into(), Dynamic::from_array(to_array(values)));
        }

        let mut scope = Scope::new();
        scope.push("statistics", Statistics);
        scope.push(
            "condition_data",
            to_array(&condition.channel_major_values()),
        );
        scope.push("condition", per_channel);
        scope.push("signal_count", signal_count as i64);

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, expr.ast())
            .map_err(PipelineError::from_rhai_error)?;
        result.as_bool().map_err(|ty| {
            PipelineError::Script(format!(
                "{}: condition must evaluate to a bool, got {}",
                expr.name(),
                ty
            ))
        })
    }

    /// Evaluate a per-sample transform.
    pub fn eval_sample(
        &self,
        expr: &CompiledExpression,
        value: f64,
        channel: &str,
        index: usize,
        sampling_frequency_hz: f64,
    ) -> PipelineResult<f64> {
        let mut scope = Scope::new();
        scope.push("value", value);
        scope.push("channel", channel.to_string());
        scope.push("index", index as i64);
        scope.push("fs", sampling_frequency_hz);

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, expr.ast())
            .map_err(PipelineError::from_rhai_error)?;
        dynamic_to_f64(&result).ok_or_else(|| {
            PipelineError::Script(format!(
                "{}: script must return a numeric value, got {}",
                expr.name(),
                result.type_name()
            ))
        })
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("cache_size", &self.cache.read().map(|c| c.len()).ok())
            .finish()
    }
}

fn dynamic_to_f64(value: &Dynamic) -> Option<f64> {
    value
        .as_float()
        .ok()
        .or_else(|| value.as_int().ok().map(|i| i as f64))
}

fn to_floats(data: &Array) -> Vec<f64> {
    data.iter().filter_map(dynamic_to_f64).collect()
}

fn to_array(values: &[f64]) -> Array {
    values.iter().map(|&v| Dynamic::from_float(v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(values: Vec<f64>) -> TimeSeriesBuffer {
        TimeSeriesBuffer::from_channel(10.0, "c", values)
    }

    #[test]
    fn test_statistics_method_syntax() {
        let engine = ScriptEngine::new();
        let expr = engine
            .compile("gate", "statistics.mean(condition_data) > 0.5")
            .unwrap();
        assert!(!engine
            .eval_condition(&expr, &condition(vec![0.1, 0.2, 0.3]), 0)
            .unwrap());
        assert!(engine
            .eval_condition(&expr, &condition(vec![0.7, 0.8, 0.9]), 0)
            .unwrap());
    }

    #[test]
    fn test_free_functions_and_channel_map() {
        let engine = ScriptEngine::new();
        let expr = engine
            .compile("gate", "max(condition.c) >= 3.0 && signal_count == 2")
            .unwrap();
        assert!(engine
            .eval_condition(&expr, &condition(vec![1.0, 3.0]), 2)
            .unwrap());
    }

    #[test]
    fn test_non_bool_condition_is_error() {
        let engine = ScriptEngine::new();
        let expr = engine.compile("gate", "1 + 2").unwrap();
        let err = engine
            .eval_condition(&expr, &condition(vec![1.0]), 0)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Script(_)));
    }

    #[test]
    fn test_sample_transform() {
        let engine = ScriptEngine::new();
        let scale = engine.compile("scale", "value * 2.0").unwrap();
        assert_eq!(engine.eval_sample(&scale, 1.5, "x", 0, 10.0).unwrap(), 3.0);
        let index = engine.compile("index", "index").unwrap();
        assert_eq!(engine.eval_sample(&index, 1.5, "y", 4, 10.0).unwrap(), 4.0);
    }

    #[test]
    fn test_helpers() {
        let engine = ScriptEngine::new();
        let expr = engine.compile("db", "deadband(value, 0.0, 0.5)").unwrap();
        assert_eq!(engine.eval_sample(&expr, 0.3, "x", 0, 1.0).unwrap(), 0.0);
        assert_eq!(engine.eval_sample(&expr, 0.8, "x", 0, 1.0).unwrap(), 0.8);
    }

    #[test]
    fn test_unknown_variable_is_script_error() {
        let engine = ScriptEngine::new();
        let expr = engine.compile("gate", "missing > 1.0").unwrap();
        let err = engine
            .eval_condition(&expr, &condition(vec![1.0]), 0)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Script(_)));
    }
}
