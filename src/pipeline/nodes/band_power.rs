//! Spectral band power per channel.

use crate::analysis::{FrequencyBand, SpectrumAnalyzer, WindowFunction};
use crate::pipeline::buffer::{PortBuffers, TimeSeriesBuffer};
use crate::pipeline::error::{ConfigError, PipelineResult};
use crate::pipeline::node::Processor;
use crate::pipeline::port;
use crate::pipeline::registry::NodeSpec;

fn default_bands() -> Vec<FrequencyBand> {
    [("theta", 4.0, 8.0), ("alpha", 8.0, 13.0), ("beta", 13.0, 30.0)]
        .into_iter()
        .map(|(name, low_hz, high_hz)| FrequencyBand {
            name: name.to_string(),
            low_hz,
            high_hz,
        })
        .collect()
}

/// Consumes `main` in windows of `window_size` samples and emits one sample
/// per window on channels named `<channel>_<band>`.
pub struct BandPowerNode {
    window_size: usize,
    bands: Vec<FrequencyBand>,
    analyzer: SpectrumAnalyzer,
}

impl BandPowerNode {
    pub fn new(window_size: usize, bands: Vec<FrequencyBand>, window: WindowFunction) -> Self {
        Self {
            window_size: window_size.max(1),
            bands,
            analyzer: SpectrumAnalyzer::new(window, true),
        }
    }

    pub fn from_spec(spec: &NodeSpec<'_>) -> Result<Self, ConfigError> {
        let params = spec.params();
        let window_size = params.positive_usize("window_size", Some(256))?;
        let bands: Vec<FrequencyBand> = params
            .deserialize("bands")?
            .unwrap_or_else(default_bands);
        if bands.is_empty() {
            return Err(ConfigError::invalid(spec.name, "bands", "must not be empty"));
        }
        if let Some(b) = bands.iter().find(|b| b.low_hz >= b.high_hz) {
            return Err(ConfigError::invalid(
                spec.name,
                "bands",
                format!("band '{}' has low_hz >= high_hz", b.name),
            ));
        }
        let window = params
            .deserialize::<WindowFunction>("window_function")?
            .unwrap_or_default();
        Ok(Self::new(window_size, bands, window))
    }

    pub fn output_channel(channel: &str, band: &str) -> String {
        format!("{}_{}", channel, band)
    }
}

impl Processor for BandPowerNode {
    fn inputs(&self) -> Vec<String> {
        port::port_list(&[port::MAIN])
    }

    fn outputs(&self) -> Vec<String> {
        port::port_list(&[port::MAIN])
    }

    fn is_processing_condition_satisfied(&self, input: &PortBuffers) -> bool {
        input.count(port::MAIN) >= self.window_size
    }

    fn process(&mut self, input: &mut PortBuffers) -> PipelineResult<PortBuffers> {
        let main = input.entry(port::MAIN);
        let windows = main.count() / self.window_size;
        let data = main.splice(0, windows * self.window_size);
        let fs = data.sampling_frequency_hz();

        let mut names = Vec::with_capacity(data.channel_count() * self.bands.len());
        let mut rows = Vec::with_capacity(names.capacity());
        for channel in data.channels() {
            let values = data.data_on_channel(channel).unwrap_or_default();
            let mut per_band = vec![Vec::with_capacity(windows); self.bands.len()];
            for chunk in values.chunks_exact(self.window_size) {
                let powers = self.analyzer.band_powers(chunk, fs, &self.bands);
                for (row, bp) in per_band.iter_mut().zip(powers) {
                    row.push(bp.power);
                }
            }
            for (band, row) in self.bands.iter().zip(per_band) {
                names.push(Self::output_channel(channel, &band.name));
                rows.push(row);
            }
        }

        let mut out = PortBuffers::new();
        out.insert(
            port::MAIN,
            TimeSeriesBuffer::from_channel_major(fs / self.window_size as f64, names, rows)?,
        );
        Ok(out)
    }
}
