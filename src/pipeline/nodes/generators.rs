//! Synthetic sources driven by the tick loop.
//!
//! Both generators emit `main` (the samples) and `timestamp` (one
//! single-channel buffer of sample times in seconds) on every tick.

use crate::pipeline::buffer::{PortBuffers, TimeSeriesBuffer};
use crate::pipeline::error::{ConfigError, PipelineResult};
use crate::pipeline::node::Generator;
use crate::pipeline::port;
use crate::pipeline::registry::NodeSpec;
use std::f64::consts::PI;

/// Channel name of timestamp buffers.
pub const TIMESTAMP_CHANNEL: &str = "timestamp";

fn timestamp_buffer(fs: f64, times: Vec<f64>) -> TimeSeriesBuffer {
    TimeSeriesBuffer::from_channel(fs, TIMESTAMP_CHANNEL, times)
}

fn default_channels(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("ch{}", i)).collect()
}

/// Multi-channel sine wave.
#[derive(Debug, Clone)]
pub struct SineGenerator {
    channels: Vec<String>,
    sampling_frequency_hz: f64,
    samples_per_tick: usize,
    frequency_hz: f64,
    amplitude: f64,
    timestamp_offset: f64,
    position: u64,
}

impl SineGenerator {
    pub fn new(channels: Vec<String>, sampling_frequency_hz: f64, frequency_hz: f64) -> Self {
        Self {
            channels,
            sampling_frequency_hz,
            samples_per_tick: 1,
            frequency_hz,
            amplitude: 1.0,
            timestamp_offset: 0.0,
            position: 0,
        }
    }

    pub fn from_spec(spec: &NodeSpec<'_>) -> Result<Self, ConfigError> {
        let params = spec.params();
        let channels = params
            .string_list("channels")?
            .unwrap_or_else(|| default_channels(1));
        if channels.is_empty() {
            return Err(ConfigError::invalid(spec.name, "channels", "must not be empty"));
        }
        Ok(Self {
            channels,
            sampling_frequency_hz: params.positive_f64_or("sampling_frequency_hz", 250.0)?,
            samples_per_tick: params.positive_usize("samples_per_tick", Some(1))?,
            frequency_hz: params.f64_or("frequency_hz", 10.0)?,
            amplitude: params.f64_or("amplitude", 1.0)?,
            timestamp_offset: params.f64_or("timestamp_offset", 0.0)?,
            position: 0,
        })
    }

    pub fn with_samples_per_tick(mut self, n: usize) -> Self {
        self.samples_per_tick = n.max(1);
        self
    }

    pub fn with_timestamp_offset(mut self, offset: f64) -> Self {
        self.timestamp_offset = offset;
        self
    }
}

impl Generator for SineGenerator {
    fn outputs(&self) -> Vec<String> {
        port::port_list(&[port::MAIN, port::TIMESTAMP])
    }

    fn generate(&mut self) -> PipelineResult<PortBuffers> {
        let fs = self.sampling_frequency_hz;
        let times: Vec<f64> = (0..self.samples_per_tick as u64)
            .map(|i| (self.position + i) as f64 / fs)
            .collect();
        self.position += self.samples_per_tick as u64;

        let row: Vec<f64> = times
            .iter()
            .map(|t| self.amplitude * (2.0 * PI * self.frequency_hz * t).sin())
            .collect();
        let rows = vec![row; self.channels.len()];

        let mut out = PortBuffers::new();
        out.insert(
            port::MAIN,
            TimeSeriesBuffer::from_channel_major(fs, self.channels.clone(), rows)?,
        );
        out.insert(
            port::TIMESTAMP,
            timestamp_buffer(fs, times.iter().map(|t| t + self.timestamp_offset).collect()),
        );
        Ok(out)
    }
}

/// Replays configured values in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct SequenceGenerator {
    channels: Vec<String>,
    rows: Vec<Vec<f64>>,
    sampling_frequency_hz: f64,
    chunk_size: usize,
    looping: bool,
    timestamp_offset: f64,
    cursor: usize,
    emitted: u64,
}

impl SequenceGenerator {
    /// `rows` holds one row of values per channel.
    pub fn new(channels: Vec<String>, rows: Vec<Vec<f64>>, chunk_size: usize) -> Self {
        Self {
            channels,
            rows,
            sampling_frequency_hz: 1.0,
            chunk_size: chunk_size.max(1),
            looping: false,
            timestamp_offset: 0.0,
            cursor: 0,
            emitted: 0,
        }
    }

    pub fn from_spec(spec: &NodeSpec<'_>) -> Result<Self, ConfigError> {
        let params = spec.params();
        let rows = params
            .f64_rows("values")?
            .ok_or_else(|| ConfigError::missing(spec.name, "values"))?;
        if rows.is_empty() || rows[0].is_empty() {
            return Err(ConfigError::invalid(spec.name, "values", "must not be empty"));
        }
        let channels = params
            .string_list("channels")?
            .unwrap_or_else(|| default_channels(rows.len()));
        if channels.len() != rows.len() {
            return Err(ConfigError::invalid(
                spec.name,
                "values",
                format!("{} rows for {} channels", rows.len(), channels.len()),
            ));
        }
        Ok(Self {
            channels,
            rows,
            sampling_frequency_hz: params.positive_f64_or("sampling_frequency_hz", 1.0)?,
            chunk_size: params.positive_usize("chunk_size", Some(1))?,
            looping: params.bool_or("loop", false)?,
            timestamp_offset: params.f64_or("timestamp_offset", 0.0)?,
            cursor: 0,
            emitted: 0,
        })
    }

    pub fn looping(mut self, enabled: bool) -> Self {
        self.looping = enabled;
        self
    }

    pub fn with_sampling_frequency(mut self, hz: f64) -> Self {
        self.sampling_frequency_hz = hz;
        self
    }

    fn len(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Whether a non-looping sequence has replayed everything.
    pub fn is_exhausted(&self) -> bool {
        !self.looping && self.cursor >= self.len()
    }
}

impl Generator for SequenceGenerator {
    fn outputs(&self) -> Vec<String> {
        port::port_list(&[port::MAIN, port::TIMESTAMP])
    }

    fn generate(&mut self) -> PipelineResult<PortBuffers> {
        let len = self.len();
        if len == 0 || self.is_exhausted() {
            return Ok(PortBuffers::new());
        }

        let mut indices = Vec::with_capacity(self.chunk_size);
        for _ in 0..self.chunk_size {
            if self.cursor >= len {
                if !self.looping {
                    break;
                }
                self.cursor = 0;
            }
            indices.push(self.cursor);
            self.cursor += 1;
        }

        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i]).collect())
            .collect();
        let fs = self.sampling_frequency_hz;
        let times = (0..indices.len() as u64)
            .map(|i| (self.emitted + i) as f64 / fs + self.timestamp_offset)
            .collect();
        self.emitted += indices.len() as u64;

        let mut out = PortBuffers::new();
        out.insert(
            port::MAIN,
            TimeSeriesBuffer::from_channel_major(fs, self.channels.clone(), rows)?,
        );
        out.insert(port::TIMESTAMP, timestamp_buffer(fs, times));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;

    fn spec_config(toml_source: &str) -> NodeConfig {
        toml::from_str(toml_source).unwrap()
    }

    #[test]
    fn test_sine_timestamps_continue_across_ticks() {
        let mut sine = SineGenerator::new(vec!["a".into(), "b".into()], 4.0, 1.0)
            .with_samples_per_tick(2)
            .with_timestamp_offset(10.0);
        let first = sine.generate().unwrap();
        let second = sine.generate().unwrap();

        let ts = second.get(port::TIMESTAMP).unwrap();
        assert_eq!(ts.data_on_channel(TIMESTAMP_CHANNEL), Some(&[10.5, 10.75][..]));
        let main = first.get(port::MAIN).unwrap();
        assert_eq!(main.channel_count(), 2);
        assert_eq!(main.count(), 2);
        // sin(2π · 1 Hz · 0.25 s)
        assert!((main.data_on_channel("a").unwrap()[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sequence_chunks_and_stops() {
        let mut seq = SequenceGenerator::new(vec!["x".into()], vec![vec![1.0, 2.0, 3.0]], 2);
        let a = seq.generate().unwrap();
        let b = seq.generate().unwrap();
        let c = seq.generate().unwrap();
        assert_eq!(a.get(port::MAIN).unwrap().data_on_channel("x"), Some(&[1.0, 2.0][..]));
        assert_eq!(b.get(port::MAIN).unwrap().data_on_channel("x"), Some(&[3.0][..]));
        assert!(c.is_empty());
        assert!(seq.is_exhausted());
        assert_eq!(
            b.get(port::TIMESTAMP).unwrap().data_on_channel(TIMESTAMP_CHANNEL),
            Some(&[2.0][..])
        );
    }

    #[test]
    fn test_sequence_loops() {
        let mut seq =
            SequenceGenerator::new(vec!["x".into()], vec![vec![1.0, 2.0]], 3).looping(true);
        let out = seq.generate().unwrap();
        assert_eq!(
            out.get(port::MAIN).unwrap().data_on_channel("x"),
            Some(&[1.0, 2.0, 1.0][..])
        );
        assert!(!seq.is_exhausted());
    }

    #[test]
    fn test_sequence_from_spec_validates_rows() {
        let config = spec_config(
            r#"
            module = "generators"
            type = "sequence"
            channels = ["a", "b"]
            values = [[1, 2]]
            "#,
        );
        let spec = NodeSpec {
            name: "seq",
            module: "generators",
            node_type: "sequence",
            config: &config,
        };
        let err = SequenceGenerator::from_spec(&spec).unwrap_err();
        assert_eq!(err.field(), "values");

        let config = spec_config("module = \"generators\"\ntype = \"sequence\"");
        let spec = NodeSpec { config: &config, ..spec };
        assert_eq!(
            SequenceGenerator::from_spec(&spec).unwrap_err(),
            ConfigError::missing("seq", "values")
        );
    }
}
