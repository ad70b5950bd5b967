//! Signal analysis helpers used by the built-in nodes.
//!
//! - FFT power spectra and band power
//! - Descriptive statistics exposed to gate condition scripts

pub mod fft;
pub mod statistics;

pub use fft::{BandPower, FrequencyBand, PowerSpectrum, SpectrumAnalyzer, WindowFunction};
