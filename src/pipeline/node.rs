//! Node abstraction for the pipeline.
//!
//! Two layers:
//! - **Capability traits** (`Generator`, `Processor`) carry the node-specific
//!   behaviour. Built-in and user nodes implement them.
//! - **`NodeKind`** is the closed set of categories. Each variant wraps a
//!   behaviour and decides readiness and emission for it.
//!
//! `NodeCore` owns a node's buffers and runs one step at a time. It is
//! single-threaded; the engine serialises access to it.

use crate::pipeline::buffer::{PortBuffers, TimeSeriesBuffer};
use crate::pipeline::buffer_options::BufferOptions;
use crate::pipeline::error::{PipelineError, PipelineResult, WiringError};
use crate::pipeline::gate::Gate;
use crate::pipeline::node_type::NodeCategory;
use crate::pipeline::port::PortDirection;
use crate::pipeline::trainable::TrainableNode;

/// Source of data, ticked by the driver.
pub trait Generator: Send {
    fn outputs(&self) -> Vec<String>;

    /// Produce the next chunk of output, keyed by output port.
    fn generate(&mut self) -> PipelineResult<PortBuffers>;

    /// Release devices or files. Called once.
    fn dispose(&mut self) {}
}

/// Behaviour of processing and output nodes.
pub trait Processor: Send {
    fn inputs(&self) -> Vec<String>;

    fn outputs(&self) -> Vec<String>;

    /// Whether buffered input is enough to run `process`. Defaults to every
    /// input port holding data.
    fn is_processing_condition_satisfied(&self, input: &PortBuffers) -> bool {
        self.inputs().iter().all(|p| input.has_data(p))
    }

    /// Transform buffered input. May consume from `input`; the result is
    /// appended to the node's output buffer.
    fn process(&mut self, input: &mut PortBuffers) -> PipelineResult<PortBuffers>;

    /// Whether the output buffer should be fanned out after a step.
    fn is_next_node_call_enabled(&self, output: &PortBuffers) -> bool {
        output.any_data()
    }

    fn dispose(&mut self) {}
}

/// The closed set of node categories.
pub enum NodeKind {
    Generator(Box<dyn Generator>),
    Processing(Box<dyn Processor>),
    /// A processor whose output is never forwarded.
    Output(Box<dyn Processor>),
    Gate(Gate),
    Trainable(TrainableNode),
}

impl NodeKind {
    pub fn category(&self) -> NodeCategory {
        match self {
            NodeKind::Generator(_) => NodeCategory::Generator,
            NodeKind::Processing(_) => NodeCategory::Processing,
            NodeKind::Output(_) => NodeCategory::Output,
            NodeKind::Gate(_) => NodeCategory::Gate,
            NodeKind::Trainable(_) => NodeCategory::Trainable,
        }
    }

    pub fn inputs(&self) -> Vec<String> {
        match self {
            NodeKind::Generator(_) => Vec::new(),
            NodeKind::Processing(p) | NodeKind::Output(p) => p.inputs(),
            NodeKind::Gate(_) => Gate::inputs(),
            NodeKind::Trainable(_) => TrainableNode::inputs(),
        }
    }

    pub fn outputs(&self) -> Vec<String> {
        match self {
            NodeKind::Generator(g) => g.outputs(),
            NodeKind::Processing(p) => p.outputs(),
            NodeKind::Output(_) => Vec::new(),
            NodeKind::Gate(_) => Gate::outputs(),
            NodeKind::Trainable(_) => TrainableNode::outputs(),
        }
    }

    fn next_node_call_enabled(&self, output: &PortBuffers) -> bool {
        match self {
            NodeKind::Generator(_) | NodeKind::Trainable(_) => output.any_data(),
            NodeKind::Processing(p) => p.is_next_node_call_enabled(output),
            NodeKind::Output(_) => false,
            NodeKind::Gate(_) => output.has_data(crate::pipeline::port::MAIN),
        }
    }

    fn dispose(&mut self) {
        match self {
            NodeKind::Generator(g) => g.dispose(),
            NodeKind::Processing(p) | NodeKind::Output(p) => p.dispose(),
            NodeKind::Gate(_) => {}
            NodeKind::Trainable(t) => t.dispose(),
        }
    }
}

impl std::fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeKind::{}", self.category())
    }
}

/// Result of one step.
#[derive(Debug, Default)]
pub struct StepOutcome {
    /// The category's processing logic ran.
    pub processed: bool,
    /// Output to fan out, captured before any post-process clearing.
    pub emitted: Option<PortBuffers>,
}

/// A node's identity, behaviour and buffers.
pub struct NodeCore {
    name: String,
    kind: NodeKind,
    options: BufferOptions,
    inputs: Vec<String>,
    outputs: Vec<String>,
    input: PortBuffers,
    output: PortBuffers,
    disposed: bool,
}

impl NodeCore {
    pub fn new(name: impl Into<String>, kind: NodeKind, options: BufferOptions) -> Self {
        let inputs = kind.inputs();
        let outputs = kind.outputs();
        Self {
            name: name.into(),
            input: PortBuffers::with_ports(inputs.iter().cloned()),
            output: PortBuffers::with_ports(outputs.iter().cloned()),
            kind,
            options,
            inputs,
            outputs,
            disposed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> NodeCategory {
        self.kind.category()
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    pub fn options(&self) -> &BufferOptions {
        &self.options
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn input_buffer(&self) -> &PortBuffers {
        &self.input
    }

    pub fn output_buffer(&self) -> &PortBuffers {
        &self.output
    }

    pub fn trainable(&self) -> Option<&TrainableNode> {
        match &self.kind {
            NodeKind::Trainable(t) => Some(t),
            _ => None,
        }
    }

    pub fn gate(&self) -> Option<&Gate> {
        match &self.kind {
            NodeKind::Gate(g) => Some(g),
            _ => None,
        }
    }

    pub fn check_input(&self, port: &str) -> Result<(), WiringError> {
        self.check_port(PortDirection::Input, port)
    }

    pub fn check_output(&self, port: &str) -> Result<(), WiringError> {
        self.check_port(PortDirection::Output, port)
    }

    fn check_port(&self, direction: PortDirection, port: &str) -> Result<(), WiringError> {
        match direction {
            PortDirection::Input if !self.inputs.iter().any(|p| p == port) => {
                Err(WiringError::UnknownInput {
                    node: self.name.clone(),
                    input: port.to_string(),
                })
            }
            PortDirection::Output if !self.outputs.iter().any(|p| p == port) => {
                Err(WiringError::UnknownOutput {
                    node: self.name.clone(),
                    output: port.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Append `data` to an input port and run one step.
    pub fn deliver(&mut self, port: &str, data: &TimeSeriesBuffer) -> PipelineResult<StepOutcome> {
        if self.disposed {
            return Err(PipelineError::NodeDisposed(self.name.clone()));
        }
        self.check_input(port)?;
        self.input
            .entry(port)
            .extend(data)
            .map_err(|e| e.with_context(format!("[{}] input '{}'", self.name, port)))?;

        if self.options.clear_output_buffer_on_data_input {
            self.output.clear();
        }

        let processed = match &mut self.kind {
            NodeKind::Generator(_) => false,
            NodeKind::Processing(p) | NodeKind::Output(p) => {
                if p.is_processing_condition_satisfied(&self.input) {
                    let produced = p.process(&mut self.input)?;
                    self.output.append(produced)?;
                    true
                } else {
                    false
                }
            }
            NodeKind::Gate(g) => g.step(&mut self.input, &mut self.output, &self.options)?,
            NodeKind::Trainable(t) => t.step(&self.name, &mut self.input, &mut self.output)?,
        };

        if processed && self.options.clear_input_buffer_after_process {
            self.input.clear();
        }
        let emitted = (processed && self.kind.next_node_call_enabled(&self.output))
            .then(|| self.output.clone());
        if processed && self.options.clear_output_buffer_after_process {
            self.output.clear();
        }

        Ok(StepOutcome { processed, emitted })
    }

    /// One generator tick.
    pub fn generate(&mut self) -> PipelineResult<StepOutcome> {
        if self.disposed {
            return Err(PipelineError::NodeDisposed(self.name.clone()));
        }
        let NodeKind::Generator(g) = &mut self.kind else {
            return Ok(StepOutcome::default());
        };

        if self.options.clear_output_buffer_on_generate {
            self.output.clear();
        }
        let produced = g.generate()?;
        self.output
            .append(produced)
            .map_err(|e| e.with_context(format!("[{}] generate", self.name)))?;

        let emitted = self
            .kind
            .next_node_call_enabled(&self.output)
            .then(|| self.output.clone());
        Ok(StepOutcome {
            processed: true,
            emitted,
        })
    }

    /// Release the behaviour's resources. Idempotent.
    pub fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.kind.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl std::fmt::Debug for NodeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCore")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::port;

    /// Emits once two samples are buffered, consuming them.
    struct Pairs;

    impl Processor for Pairs {
        fn inputs(&self) -> Vec<String> {
            vec![port::MAIN.into()]
        }

        fn outputs(&self) -> Vec<String> {
            vec![port::MAIN.into()]
        }

        fn is_processing_condition_satisfied(&self, input: &PortBuffers) -> bool {
            input.count(port::MAIN) >= 2
        }

        fn process(&mut self, input: &mut PortBuffers) -> PipelineResult<PortBuffers> {
            let mut out = PortBuffers::new();
            out.insert(port::MAIN, input.entry(port::MAIN).splice(0, 2));
            Ok(out)
        }
    }

    fn sample(v: f64) -> TimeSeriesBuffer {
        TimeSeriesBuffer::from_channel(10.0, "x", vec![v])
    }

    #[test]
    fn test_processing_waits_for_condition() {
        let mut core = NodeCore::new("pairs", NodeKind::Processing(Box::new(Pairs)), Default::default());
        let first = core.deliver(port::MAIN, &sample(1.0)).unwrap();
        assert!(!first.processed);
        assert!(first.emitted.is_none());

        let second = core.deliver(port::MAIN, &sample(2.0)).unwrap();
        assert!(second.processed);
        let emitted = second.emitted.unwrap();
        assert_eq!(emitted.get(port::MAIN).unwrap().data_on_channel("x").unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn test_emission_captured_before_output_clear() {
        let options = BufferOptions {
            clear_output_buffer_after_process: true,
            ..Default::default()
        };
        let mut core = NodeCore::new("pairs", NodeKind::Processing(Box::new(Pairs)), options);
        core.deliver(port::MAIN, &sample(1.0)).unwrap();
        let outcome = core.deliver(port::MAIN, &sample(2.0)).unwrap();
        assert!(outcome.emitted.unwrap().has_data(port::MAIN));
        assert!(!core.output_buffer().any_data());
    }

    #[test]
    fn test_output_accumulates_without_clearing() {
        let mut core = NodeCore::new("pairs", NodeKind::Processing(Box::new(Pairs)), Default::default());
        for v in [1.0, 2.0, 3.0, 4.0] {
            core.deliver(port::MAIN, &sample(v)).unwrap();
        }
        assert_eq!(core.output_buffer().count(port::MAIN), 4);
    }

    #[test]
    fn test_output_kind_never_emits() {
        let mut core = NodeCore::new("sink", NodeKind::Output(Box::new(Pairs)), Default::default());
        assert!(core.outputs().is_empty());
        core.deliver(port::MAIN, &sample(1.0)).unwrap();
        let outcome = core.deliver(port::MAIN, &sample(2.0)).unwrap();
        assert!(outcome.processed);
        assert!(outcome.emitted.is_none());
    }

    #[test]
    fn test_unknown_input_rejected() {
        let mut core = NodeCore::new("pairs", NodeKind::Processing(Box::new(Pairs)), Default::default());
        let err = core.deliver("label", &sample(1.0)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Wiring(WiringError::UnknownInput { .. })
        ));
        assert!(core.check_output(port::MAIN).is_ok());
        assert!(core.check_output("other").is_err());
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut core = NodeCore::new("pairs", NodeKind::Processing(Box::new(Pairs)), Default::default());
        core.dispose();
        core.dispose();
        assert!(core.is_disposed());
        assert!(matches!(
            core.deliver(port::MAIN, &sample(1.0)),
            Err(PipelineError::NodeDisposed(_))
        ));
    }
}
