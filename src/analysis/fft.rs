//! FFT power spectra and band power.
//!
//! Used by the `processing/band_power` node to reduce a window of samples to
//! the mean spectral power inside a set of named frequency bands.

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Window function applied before the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunction {
    /// No windowing.
    Rectangular,
    #[default]
    Hann,
    Hamming,
    Blackman,
}

impl WindowFunction {
    pub fn display_name(&self) -> &'static str {
        match self {
            WindowFunction::Rectangular => "Rectangular",
            WindowFunction::Hann => "Hann",
            WindowFunction::Hamming => "Hamming",
            WindowFunction::Blackman => "Blackman",
        }
    }

    pub fn all() -> &'static [WindowFunction] {
        &[
            WindowFunction::Rectangular,
            WindowFunction::Hann,
            WindowFunction::Hamming,
            WindowFunction::Blackman,
        ]
    }

    /// Coefficient at position i out of n samples.
    pub fn coefficient(&self, i: usize, n: usize) -> f64 {
        let n_f = n as f64;
        let i_f = i as f64;

        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hann => 0.5 * (1.0 - (2.0 * PI * i_f / n_f).cos()),
            WindowFunction::Hamming => 0.54 - 0.46 * (2.0 * PI * i_f / n_f).cos(),
            // Exactly 0 at the endpoints; clamp the -ε rounding leaves behind.
            WindowFunction::Blackman => (0.42 - 0.5 * (2.0 * PI * i_f / n_f).cos()
                + 0.08 * (4.0 * PI * i_f / n_f).cos())
            .max(0.0),
        }
    }

    pub fn generate(&self, n: usize) -> Vec<f64> {
        (0..n).map(|i| self.coefficient(i, n)).collect()
    }
}

/// One-sided power spectrum of a real signal.
#[derive(Debug, Clone, Default)]
pub struct PowerSpectrum {
    /// Bin centre frequencies (Hz)
    pub frequencies: Vec<f64>,
    /// Power per bin (signal units squared)
    pub power: Vec<f64>,
    /// Hz per bin
    pub frequency_resolution: f64,
}

impl PowerSpectrum {
    /// Mean power of the bins inside `[low_hz, high_hz]`; 0 if none fall in.
    pub fn band_power(&self, low_hz: f64, high_hz: f64) -> f64 {
        let (sum, n) = self
            .frequencies
            .iter()
            .zip(&self.power)
            .filter(|(f, _)| **f >= low_hz && **f <= high_hz)
            .fold((0.0, 0usize), |(s, n), (_, p)| (s + p, n + 1));
        if n == 0 {
            0.0
        } else {
            sum / n as f64
        }
    }

    /// Frequency of the strongest bin.
    pub fn peak(&self) -> Option<(f64, f64)> {
        let (idx, &max) = self
            .power
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))?;
        Some((self.frequencies[idx], max))
    }
}

/// Named frequency band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub name: String,
    pub low_hz: f64,
    pub high_hz: f64,
}

/// Band power of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct BandPower {
    pub band: String,
    pub power: f64,
}

/// Computes power spectra, reusing FFT plans across calls.
pub struct SpectrumAnalyzer {
    planner: FftPlanner<f64>,
    window: WindowFunction,
    remove_dc: bool,
}

impl SpectrumAnalyzer {
    pub fn new(window: WindowFunction, remove_dc: bool) -> Self {
        Self {
            planner: FftPlanner::new(),
            window,
            remove_dc,
        }
    }

    pub fn window(&self) -> WindowFunction {
        self.window
    }

    /// Power spectrum of `samples`, zero-padded to the next power of two.
    pub fn power_spectrum(&mut self, samples: &[f64], sample_rate: f64) -> PowerSpectrum {
        let n = samples.len();
        if n == 0 || sample_rate <= 0.0 {
            return PowerSpectrum::default();
        }

        let mean = if self.remove_dc {
            samples.iter().sum::<f64>() / n as f64
        } else {
            0.0
        };
        let fft_size = n.next_power_of_two();
        let window = self.window.generate(n);
        let mut buffer: Vec<Complex<f64>> = samples
            .iter()
            .zip(&window)
            .map(|(&s, &w)| Complex::new((s - mean) * w, 0.0))
            .collect();
        buffer.resize(fft_size, Complex::new(0.0, 0.0));

        let fft = self.planner.plan_fft_forward(fft_size);
        fft.process(&mut buffer);

        let resolution = sample_rate / fft_size as f64;
        let bins = fft_size / 2 + 1;
        let frequencies = (0..bins).map(|i| i as f64 * resolution).collect();
        let power = buffer
            .iter()
            .take(bins)
            .enumerate()
            .map(|(i, c)| {
                let amplitude = c.norm() / n as f64;
                // One-sided: fold the negative half onto the positive bins.
                let scale = if i == 0 || (fft_size % 2 == 0 && i == fft_size / 2) {
                    1.0
                } else {
                    2.0
                };
                scale * amplitude * amplitude
            })
            .collect();

        PowerSpectrum {
            frequencies,
            power,
            frequency_resolution: resolution,
        }
    }

    /// Mean power per band for one channel.
    pub fn band_powers(
        &mut self,
        samples: &[f64],
        sample_rate: f64,
        bands: &[FrequencyBand],
    ) -> Vec<BandPower> {
        let spectrum = self.power_spectrum(samples, sample_rate);
        bands
            .iter()
            .map(|b| BandPower {
                band: b.name.clone(),
                power: spectrum.band_power(b.low_hz, b.high_hz),
            })
            .collect()
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new(WindowFunction::Hann, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn test_window_functions() {
        for window in WindowFunction::all() {
            let coeffs = window.generate(64);
            assert_eq!(coeffs.len(), 64);
            for &c in &coeffs {
                assert!(
                    (0.0..=1.0 + 1e-9).contains(&c),
                    "{} coefficient {} out of range",
                    window.display_name(),
                    c
                );
            }
        }
    }

    #[test]
    fn test_peak_of_sine() {
        let mut analyzer = SpectrumAnalyzer::default();
        let spectrum = analyzer.power_spectrum(&sine(10.0, 256.0, 256), 256.0);
        let (peak, _) = spectrum.peak().unwrap();
        assert!((peak - 10.0).abs() <= spectrum.frequency_resolution);
    }

    #[test]
    fn test_band_power_separates_bands() {
        let mut analyzer = SpectrumAnalyzer::default();
        let bands = vec![
            FrequencyBand {
                name: "alpha".into(),
                low_hz: 8.0,
                high_hz: 12.0,
            },
            FrequencyBand {
                name: "beta".into(),
                low_hz: 13.0,
                high_hz: 30.0,
            },
        ];
        let powers = analyzer.band_powers(&sine(10.0, 256.0, 256), 256.0, &bands);
        assert_eq!(powers[0].band, "alpha");
        assert!(powers[0].power > powers[1].power * 10.0);
    }

    #[test]
    fn test_empty_input() {
        let mut analyzer = SpectrumAnalyzer::default();
        let spectrum = analyzer.power_spectrum(&[], 100.0);
        assert!(spectrum.power.is_empty());
        assert_eq!(spectrum.band_power(0.0, 50.0), 0.0);
    }
}
