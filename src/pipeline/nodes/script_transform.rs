//! ScriptTransform node: applies a sandboxed expression to every sample.
//!
//! The expression sees `value`, `channel`, `index` (running sample index on
//! that channel) and `fs`, and must return a number. Channels not listed in
//! `channels` pass through unchanged.

use crate::pipeline::buffer::{PortBuffers, TimeSeriesBuffer};
use crate::pipeline::error::{ConfigError, PipelineResult};
use crate::pipeline::node::Processor;
use crate::pipeline::port;
use crate::pipeline::registry::NodeSpec;
use crate::scripting::{CompiledExpression, ScriptEngine};
use std::collections::HashMap;
use std::sync::Arc;

pub struct ScriptTransformNode {
    engine: Arc<ScriptEngine>,
    expr: CompiledExpression,
    /// Only these channels are transformed; `None` means all of them.
    channels: Option<Vec<String>>,
    /// channel → samples transformed so far
    positions: HashMap<String, u64>,
}

impl ScriptTransformNode {
    pub fn new(engine: Arc<ScriptEngine>, name: &str, source: &str) -> PipelineResult<Self> {
        let expr = engine.compile(name, source)?;
        Ok(Self {
            engine,
            expr,
            channels: None,
            positions: HashMap::new(),
        })
    }

    pub fn from_spec(spec: &NodeSpec<'_>) -> Result<Self, ConfigError> {
        let params = spec.params();
        let source = params.required_str("expression")?;
        let mut node = Self::new(Arc::new(ScriptEngine::new()), spec.name, source)
            .map_err(|e| ConfigError::invalid(spec.name, "expression", e.to_string()))?;
        node.channels = params.string_list("channels")?;
        Ok(node)
    }

    pub fn only_channels(mut self, channels: Vec<String>) -> Self {
        self.channels = Some(channels);
        self
    }

    fn applies_to(&self, channel: &str) -> bool {
        self.channels
            .as_ref()
            .map_or(true, |list| list.iter().any(|c| c == channel))
    }

    fn transform(&mut self, data: &TimeSeriesBuffer) -> PipelineResult<TimeSeriesBuffer> {
        let fs = data.sampling_frequency_hz();
        let mut rows = Vec::with_capacity(data.channel_count());
        for channel in data.channels() {
            let values = data.data_on_channel(channel).unwrap_or_default();
            if !self.applies_to(channel) {
                rows.push(values.to_vec());
                continue;
            }
            let start = self.positions.get(channel).copied().unwrap_or(0);
            let mut row = Vec::with_capacity(values.len());
            for (i, &value) in values.iter().enumerate() {
                let index = (start + i as u64) as usize;
                row.push(self.engine.eval_sample(&self.expr, value, channel, index, fs)?);
            }
            self.positions
                .insert(channel.clone(), start + values.len() as u64);
            rows.push(row);
        }
        TimeSeriesBuffer::from_channel_major(fs, data.channels().to_vec(), rows)
    }
}

impl Processor for ScriptTransformNode {
    fn inputs(&self) -> Vec<String> {
        port::port_list(&[port::MAIN])
    }

    fn outputs(&self) -> Vec<String> {
        port::port_list(&[port::MAIN])
    }

    fn process(&mut self, input: &mut PortBuffers) -> PipelineResult<PortBuffers> {
        let main = input.entry(port::MAIN);
        let n = main.count();
        let data = main.splice(0, n);

        let mut out = PortBuffers::new();
        out.insert(port::MAIN, self.transform(&data)?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_channels() -> PortBuffers {
        let mut input = PortBuffers::new();
        input.insert(
            port::MAIN,
            TimeSeriesBuffer::from_channel_major(
                2.0,
                vec!["a", "b"],
                vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            )
            .unwrap(),
        );
        input
    }

    #[test]
    fn test_transforms_every_sample() {
        let mut node = ScriptTransformNode::new(
            Arc::new(ScriptEngine::new()),
            "scale",
            "value * 10.0 + index.to_float()",
        )
        .unwrap();
        let mut input = two_channels();
        let out = node.process(&mut input).unwrap();
        let main = out.get(port::MAIN).unwrap();
        assert_eq!(main.data_on_channel("a"), Some(&[10.0, 21.0][..]));
        assert_eq!(main.data_on_channel("b"), Some(&[30.0, 41.0][..]));
        assert!(!input.has_data(port::MAIN));

        // indices keep counting across deliveries
        let mut input = two_channels();
        let out = node.process(&mut input).unwrap();
        assert_eq!(
            out.get(port::MAIN).unwrap().data_on_channel("a"),
            Some(&[12.0, 23.0][..])
        );
    }

    #[test]
    fn test_channel_filter_passes_others_through() {
        let mut node = ScriptTransformNode::new(Arc::new(ScriptEngine::new()), "neg", "-value")
            .unwrap()
            .only_channels(vec!["b".into()]);
        let out = node.process(&mut two_channels()).unwrap();
        let main = out.get(port::MAIN).unwrap();
        assert_eq!(main.data_on_channel("a"), Some(&[1.0, 2.0][..]));
        assert_eq!(main.data_on_channel("b"), Some(&[-3.0, -4.0][..]));
    }

    #[test]
    fn test_bad_expression_rejected_at_build() {
        let config: crate::config::NodeConfig =
            toml::from_str("module = \"processing\"\ntype = \"script\"\nexpression = \"value +\"")
                .unwrap();
        let spec = NodeSpec {
            name: "s",
            module: "processing",
            node_type: "script",
            config: &config,
        };
        let err = ScriptTransformNode::from_spec(&spec).err().unwrap();
        assert_eq!(err.field(), "expression");
    }
}
