//! Test nodes and builders

use neuroflow_rs::pipeline::{
    port, BufferOptions, Engine, Generator, NodeCore, NodeHandle, NodeId, NodeKind, NodeRegistry,
    PipelineError, PipelineResult, PortBuffers, Processor, TimeSeriesBuffer,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything a [`Collector`] received, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    deliveries: Arc<Mutex<Vec<(String, TimeSeriesBuffer)>>>,
}

impl Collected {
    pub fn len(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenated values of `channel` received on `port`.
    pub fn values(&self, port: &str, channel: &str) -> Vec<f64> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == port)
            .filter_map(|(_, b)| b.data_on_channel(channel))
            .flat_map(|v| v.iter().copied())
            .collect()
    }

    pub fn buffers(&self, port: &str) -> Vec<TimeSeriesBuffer> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == port)
            .map(|(_, b)| b.clone())
            .collect()
    }
}

/// Output node that records and consumes whatever arrives.
pub struct Collector {
    inputs: Vec<String>,
    collected: Collected,
}

impl Collector {
    pub fn new(inputs: &[&str]) -> (Self, Collected) {
        let collected = Collected::default();
        (
            Self {
                inputs: port::port_list(inputs),
                collected: collected.clone(),
            },
            collected,
        )
    }
}

impl Processor for Collector {
    fn inputs(&self) -> Vec<String> {
        self.inputs.clone()
    }

    fn outputs(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_processing_condition_satisfied(&self, input: &PortBuffers) -> bool {
        input.any_data()
    }

    fn process(&mut self, input: &mut PortBuffers) -> PipelineResult<PortBuffers> {
        let mut deliveries = self.collected.deliveries.lock().unwrap();
        for name in &self.inputs {
            let n = input.count(name);
            if n > 0 {
                deliveries.push((name.clone(), input.entry(name).splice(0, n)));
            }
        }
        Ok(PortBuffers::new())
    }
}

/// Forwards `main`; fails on `fail_on`, sleeps `delay` per step and records
/// its own disposal.
#[derive(Default)]
pub struct Relay {
    pub fail_on: Option<f64>,
    pub delay: Option<Duration>,
    pub name: String,
    pub disposals: Option<Arc<Mutex<Vec<String>>>>,
}

impl Relay {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl Processor for Relay {
    fn inputs(&self) -> Vec<String> {
        port::port_list(&[port::MAIN])
    }

    fn outputs(&self) -> Vec<String> {
        port::port_list(&[port::MAIN])
    }

    fn process(&mut self, input: &mut PortBuffers) -> PipelineResult<PortBuffers> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let n = input.count(port::MAIN);
        let data = input.entry(port::MAIN).splice(0, n);
        if let Some(bad) = self.fail_on {
            if data.channel_major_values().contains(&bad) {
                return Err(PipelineError::incompatible(format!("refusing value {}", bad)));
            }
        }
        let mut out = PortBuffers::new();
        out.insert(port::MAIN, data);
        Ok(out)
    }

    fn dispose(&mut self) {
        if let Some(log) = &self.disposals {
            log.lock().unwrap().push(self.name.clone());
        }
    }
}

/// Emits one sample per tick on channel `x`: 0, 1, 2, ... and records its
/// own disposal under `name`.
#[derive(Default)]
pub struct Counter {
    pub(crate) next: f64,
    pub name: String,
    pub disposals: Option<Arc<Mutex<Vec<String>>>>,
}

impl Generator for Counter {
    fn outputs(&self) -> Vec<String> {
        port::port_list(&[port::MAIN])
    }

    fn generate(&mut self) -> PipelineResult<PortBuffers> {
        let mut out = PortBuffers::new();
        out.insert(
            port::MAIN,
            TimeSeriesBuffer::from_channel(1.0, "x", vec![self.next]),
        );
        self.next += 1.0;
        Ok(out)
    }

    fn dispose(&mut self) {
        if let Some(log) = &self.disposals {
            log.lock().unwrap().push(self.name.clone());
        }
    }
}

/// Options for a processor that forwards each step and keeps nothing.
pub fn streaming_options() -> BufferOptions {
    BufferOptions {
        clear_input_buffer_after_process: true,
        clear_output_buffer_after_process: true,
        ..Default::default()
    }
}

pub fn generator_options() -> BufferOptions {
    BufferOptions {
        clear_output_buffer_on_generate: true,
        ..Default::default()
    }
}

/// Spawns nodes with consecutive ids.
pub struct NodeFactory<'a> {
    engine: &'a Engine,
    next_id: u32,
}

impl<'a> NodeFactory<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine, next_id: 0 }
    }

    fn spawn(&mut self, core: NodeCore) -> NodeHandle {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.engine.spawn_node(id, core)
    }

    pub fn counter(&mut self, name: &str) -> NodeHandle {
        self.counter_with(Counter {
            name: name.to_string(),
            ..Default::default()
        })
    }

    pub fn counter_with(&mut self, counter: Counter) -> NodeHandle {
        let name = counter.name.clone();
        self.spawn(NodeCore::new(
            name,
            NodeKind::Generator(Box::new(counter)),
            generator_options(),
        ))
    }

    pub fn relay(&mut self, relay: Relay) -> NodeHandle {
        let name = relay.name.clone();
        self.spawn(NodeCore::new(
            name,
            NodeKind::Processing(Box::new(relay)),
            streaming_options(),
        ))
    }

    pub fn collector(&mut self, name: &str, inputs: &[&str]) -> (NodeHandle, Collected) {
        let (collector, collected) = Collector::new(inputs);
        let handle = self.spawn(NodeCore::new(
            name,
            NodeKind::Output(Box::new(collector)),
            streaming_options(),
        ));
        (handle, collected)
    }
}

/// Builtins plus `test/collector`, whose deliveries land in `collected`.
pub fn registry_with_collector(inputs: &'static [&'static str]) -> (NodeRegistry, Collected) {
    let collected = Collected::default();
    let shared = collected.clone();
    let mut registry = NodeRegistry::with_builtins();
    registry.register("test", "collector", move |_spec| {
        Ok(NodeKind::Output(Box::new(Collector {
            inputs: port::port_list(inputs),
            collected: shared.clone(),
        })))
    });
    (registry, collected)
}
