//! Gate node: forwards `signal` to `main` while a condition holds.
//!
//! The condition is evaluated whenever the `condition` port holds data. It is
//! either a sandboxed expression over the condition buffer or a registered
//! predicate function.

use crate::pipeline::buffer::{PortBuffers, TimeSeriesBuffer};
use crate::pipeline::buffer_options::BufferOptions;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::port;
use crate::scripting::{CompiledExpression, ScriptEngine};
use std::sync::Arc;

/// Host-side condition callback.
pub type GatePredicate = Arc<dyn Fn(&TimeSeriesBuffer) -> bool + Send + Sync>;

/// How a gate decides whether to open.
#[derive(Clone)]
pub enum GateCondition {
    Expression {
        engine: Arc<ScriptEngine>,
        expr: CompiledExpression,
    },
    Predicate(GatePredicate),
}

impl GateCondition {
    fn evaluate(&self, condition: &TimeSeriesBuffer, signal_count: usize) -> PipelineResult<bool> {
        match self {
            GateCondition::Expression { engine, expr } => {
                engine.eval_condition(expr, condition, signal_count)
            }
            GateCondition::Predicate(f) => Ok(f(condition)),
        }
    }
}

impl std::fmt::Debug for GateCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateCondition::Expression { expr, .. } => {
                f.debug_tuple("Expression").field(&expr.source()).finish()
            }
            GateCondition::Predicate(_) => f.write_str("Predicate"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Gate {
    condition: GateCondition,
    opened: u64,
    evaluations: u64,
}

impl Gate {
    pub fn new(condition: GateCondition) -> Self {
        Self {
            condition,
            opened: 0,
            evaluations: 0,
        }
    }

    pub fn from_predicate<F>(f: F) -> Self
    where
        F: Fn(&TimeSeriesBuffer) -> bool + Send + Sync + 'static,
    {
        Self::new(GateCondition::Predicate(Arc::new(f)))
    }

    pub fn inputs() -> Vec<String> {
        port::port_list(&[port::CONDITION, port::SIGNAL])
    }

    pub fn outputs() -> Vec<String> {
        port::port_list(&[port::MAIN])
    }

    /// Number of evaluations that opened the gate.
    pub fn opened(&self) -> u64 {
        self.opened
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// One gate step. Returns whether the condition was evaluated.
    pub(crate) fn step(
        &mut self,
        input: &mut PortBuffers,
        output: &mut PortBuffers,
        options: &BufferOptions,
    ) -> PipelineResult<bool> {
        let Some(condition) = input.get(port::CONDITION).filter(|b| b.has_data()) else {
            return Ok(false);
        };
        let signal_count = input.count(port::SIGNAL);

        self.evaluations += 1;
        let met = self.condition.evaluate(condition, signal_count)?;

        if met {
            self.opened += 1;
            if let Some(signal) = input.get(port::SIGNAL).filter(|b| b.has_data()) {
                output.entry(port::MAIN).extend(signal)?;
            }
            if options.clear_input_buffer_if_condition_met {
                input.clear();
            }
        } else if options.clear_input_buffer_if_condition_not_met {
            input.clear();
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(condition: Vec<f64>, signal: Vec<f64>) -> PortBuffers {
        let mut ports = PortBuffers::with_ports(Gate::inputs());
        ports.insert(port::CONDITION, TimeSeriesBuffer::from_channel(10.0, "c", condition));
        ports.insert(port::SIGNAL, TimeSeriesBuffer::from_channel(10.0, "s", signal));
        ports
    }

    #[test]
    fn test_waits_for_condition_data() {
        let mut gate = Gate::from_predicate(|_| true);
        let mut input = PortBuffers::with_ports(Gate::inputs());
        input.insert(port::SIGNAL, TimeSeriesBuffer::from_channel(10.0, "s", vec![1.0]));
        let mut output = PortBuffers::new();
        let ran = gate
            .step(&mut input, &mut output, &BufferOptions::default())
            .unwrap();
        assert!(!ran);
        assert_eq!(gate.evaluations(), 0);
    }

    #[test]
    fn test_predicate_gate_forwards_signal() {
        let mut gate = Gate::from_predicate(|c| c.last_value("c").unwrap_or(0.0) > 0.0);
        let mut input = inputs(vec![1.0], vec![4.0, 5.0]);
        let mut output = PortBuffers::new();
        let options = BufferOptions {
            clear_input_buffer_if_condition_met: true,
            ..Default::default()
        };
        assert!(gate.step(&mut input, &mut output, &options).unwrap());
        assert_eq!(
            output.get(port::MAIN).unwrap().data_on_channel("s").unwrap(),
            &[4.0, 5.0]
        );
        assert!(!input.any_data());
        assert_eq!(gate.opened(), 1);
    }

    #[test]
    fn test_not_met_keeps_input_unless_configured() {
        let mut gate = Gate::from_predicate(|_| false);
        let mut output = PortBuffers::new();

        let mut input = inputs(vec![0.0], vec![1.0]);
        gate.step(&mut input, &mut output, &BufferOptions::default())
            .unwrap();
        assert!(input.has_data(port::SIGNAL));

        let options = BufferOptions {
            clear_input_buffer_if_condition_not_met: true,
            ..Default::default()
        };
        gate.step(&mut input, &mut output, &options).unwrap();
        assert!(!input.any_data());
        assert!(!output.any_data());
    }
}
