//! Output nodes.

use crate::analysis::statistics;
use crate::pipeline::buffer::PortBuffers;
use crate::pipeline::error::{ConfigError, PipelineResult};
use crate::pipeline::node::Processor;
use crate::pipeline::port;
use crate::pipeline::registry::NodeSpec;

/// Logs a one-line summary of each delivery on `main`.
#[derive(Debug, Clone)]
pub struct LogSink {
    name: String,
    /// Log at info instead of debug.
    verbose: bool,
    deliveries: u64,
    samples: u64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verbose: false,
            deliveries: 0,
            samples: 0,
        }
    }

    pub fn from_spec(spec: &NodeSpec<'_>) -> Result<Self, ConfigError> {
        let mut sink = Self::new(spec.name);
        sink.verbose = spec.params().bool_or("verbose", false)?;
        Ok(sink)
    }

    pub fn deliveries(&self) -> u64 {
        self.deliveries
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

impl Processor for LogSink {
    fn inputs(&self) -> Vec<String> {
        port::port_list(&[port::MAIN])
    }

    fn outputs(&self) -> Vec<String> {
        Vec::new()
    }

    fn process(&mut self, input: &mut PortBuffers) -> PipelineResult<PortBuffers> {
        let main = input.entry(port::MAIN);
        let n = main.count();
        let data = main.splice(0, n);
        self.deliveries += 1;
        self.samples += n as u64;

        let summary = data
            .channels()
            .iter()
            .map(|ch| {
                let values = data.data_on_channel(ch).unwrap_or_default();
                format!("{}={:.3}", ch, statistics::mean(values))
            })
            .collect::<Vec<_>>()
            .join(" ");
        if self.verbose {
            tracing::info!(
                "[{}] {} samples @ {} Hz: {}",
                self.name,
                n,
                data.sampling_frequency_hz(),
                summary
            );
        } else {
            tracing::debug!(
                "[{}] {} samples @ {} Hz: {}",
                self.name,
                n,
                data.sampling_frequency_hz(),
                summary
            );
        }
        Ok(PortBuffers::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::buffer::TimeSeriesBuffer;

    #[test]
    fn test_consumes_and_counts() {
        let mut sink = LogSink::new("log");
        let mut input = PortBuffers::new();
        input.insert(port::MAIN, TimeSeriesBuffer::from_channel(1.0, "x", vec![1.0, 2.0]));
        let out = sink.process(&mut input).unwrap();
        assert!(out.is_empty());
        assert!(!input.has_data(port::MAIN));
        assert_eq!(sink.deliveries(), 1);
        assert_eq!(sink.samples(), 2);
    }
}
