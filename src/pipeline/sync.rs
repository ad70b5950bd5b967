//! Nearest-timestamp alignment of a slave stream onto a master stream.
//!
//! Both streams carry a single-channel timestamp buffer (seconds,
//! non-decreasing) next to their data. Each slave sample is matched to the
//! master index with the closest timestamp and then owns the master span up
//! to the next slave sample's match:
//!
//! ```text
//! master ts   0.0   0.1   0.2   0.3   0.4
//! slave  ts      0.05  0.15  0.25
//! match       0     1     2
//! owns       [0,1) [1,2)  (held back)
//! ```
//!
//! The last slave sample is never resampled by `synchronize`: its span is
//! only bounded once the next slave sample arrives.

use crate::pipeline::buffer::{PortBuffers, TimeSeriesBuffer};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::port;
use serde::{Deserialize, Serialize};

/// How slave values fill the master span they own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// The value at the matched index, zeros for the rest of the span.
    #[default]
    ZeroFill,
    /// The value repeated over the whole span.
    SampleAndHold,
}

impl FillPolicy {
    pub const NAMES: [&'static str; 2] = ["zero_fill", "sample_and_hold"];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "zero_fill" => Some(FillPolicy::ZeroFill),
            "sample_and_hold" => Some(FillPolicy::SampleAndHold),
            _ => None,
        }
    }
}

/// Index of the master timestamp closest to `target`. Ties go to the lower
/// index.
///
/// The first guess comes from the master's average increment and is refined
/// by walking toward `target` until two neighbours bracket it. A full scan
/// is used only if the walk does not settle within `master.len()` steps.
pub fn nearest_index(master: &[f64], target: f64) -> Option<usize> {
    let n = master.len();
    if n == 0 {
        return None;
    }
    if n == 1 {
        return Some(0);
    }

    let first = master[0];
    let increment = (master[n - 1] - first) / (n - 1) as f64;
    let mut index = if increment > 0.0 && increment.is_finite() {
        let estimate = ((target - first) / increment).floor();
        if estimate.is_nan() || estimate < 0.0 {
            0
        } else {
            (estimate as usize).min(n - 1)
        }
    } else {
        0
    };

    for _ in 0..n {
        if master[index] > target {
            if index == 0 {
                return Some(0);
            }
            index -= 1;
            continue;
        }
        if index + 1 < n && master[index + 1] < target {
            index += 1;
            continue;
        }
        if index + 1 == n {
            return Some(index);
        }
        // master[index] <= target <= master[index + 1]
        let below = target - master[index];
        let above = master[index + 1] - target;
        return Some(if below <= above { index } else { index + 1 });
    }

    linear_nearest(master, target)
}

fn linear_nearest(master: &[f64], target: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &t) in master.iter().enumerate() {
        let distance = (t - target).abs();
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((i, distance));
        }
    }
    best.map(|(i, _)| i)
}

/// Spread `values[j]` over `[matches[j], matches[j + 1])`, the last value
/// running to `end`. Indices before `matches[0]` are zero for `ZeroFill` and
/// the first value for `SampleAndHold`.
pub fn resample(values: &[f64], matches: &[usize], end: usize, fill: FillPolicy) -> Vec<f64> {
    let mut out = Vec::with_capacity(end);
    let Some(&first_match) = matches.first() else {
        out.resize(end, 0.0);
        return out;
    };

    let lead = match fill {
        FillPolicy::ZeroFill => 0.0,
        FillPolicy::SampleAndHold => values.first().copied().unwrap_or(0.0),
    };
    out.resize(first_match.min(end), lead);

    for (j, (&value, &start)) in values.iter().zip(matches).enumerate() {
        let stop = matches.get(j + 1).copied().unwrap_or(end).min(end);
        if stop <= start {
            continue;
        }
        match fill {
            FillPolicy::ZeroFill => {
                out.push(value);
                out.resize(stop, 0.0);
            }
            FillPolicy::SampleAndHold => out.resize(stop, value),
        }
    }
    out
}

/// Running per-sample synchronization error in microseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncErrorTracker {
    samples: u64,
    total_us: f64,
    last_us: f64,
}

impl SyncErrorTracker {
    pub fn record(&mut self, error_us: f64) {
        self.samples += 1;
        self.total_us += error_us;
        self.last_us = error_us;
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn last_us(&self) -> f64 {
        self.last_us
    }

    pub fn mean_us(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.total_us / self.samples as f64
        }
    }
}

/// Stateful aligner shared by the synchronize and merge nodes.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    name: String,
    fill: FillPolicy,
    log_errors: bool,
    errors: SyncErrorTracker,
    recorded_through: Option<f64>,
}

impl Synchronizer {
    pub fn new(name: impl Into<String>, fill: FillPolicy) -> Self {
        Self {
            name: name.into(),
            fill,
            log_errors: false,
            errors: SyncErrorTracker::default(),
            recorded_through: None,
        }
    }

    pub fn with_error_logging(mut self, enabled: bool) -> Self {
        self.log_errors = enabled;
        self
    }

    pub fn fill(&self) -> FillPolicy {
        self.fill
    }

    pub fn errors(&self) -> &SyncErrorTracker {
        &self.errors
    }

    /// Match every slave timestamp to its nearest master index.
    pub fn match_indices(master_ts: &[f64], slave_ts: &[f64]) -> Vec<usize> {
        slave_ts
            .iter()
            .map_while(|&t| nearest_index(master_ts, t))
            .collect()
    }

    /// Record the sync error of each matched slave sample. Samples at or
    /// before the last recorded timestamp were already counted.
    fn record_errors(&mut self, master_ts: &[f64], slave_ts: &[f64], matches: &[usize]) {
        let mut recorded = false;
        for (&t, &index) in slave_ts.iter().zip(matches) {
            if self.recorded_through.is_some_and(|last| t <= last) {
                continue;
            }
            let error_us = (master_ts[index] - t).abs() * 1e6;
            self.errors.record(error_us);
            self.recorded_through = Some(t);
            recorded = true;
            if self.log_errors {
                tracing::trace!(
                    "[{}] slave {:.6}s -> master[{}] ({:.1} us)",
                    self.name,
                    t,
                    index,
                    error_us
                );
            }
        }
        if self.log_errors && recorded {
            tracing::debug!(
                "[{}] mean sync error {:.1} us over {} samples",
                self.name,
                self.errors.mean_us(),
                self.errors.samples()
            );
        }
    }

    /// Whether the four ports hold enough for `synchronize` or `merge`.
    pub fn ready(input: &PortBuffers, require_master_coverage: bool) -> bool {
        let ports = [
            port::MASTER_MAIN,
            port::MASTER_TIMESTAMP,
            port::SLAVE_MAIN,
            port::SLAVE_TIMESTAMP,
        ];
        if !ports.iter().all(|p| input.has_data(p)) {
            return false;
        }
        if input.count(port::MASTER_MAIN) != input.count(port::MASTER_TIMESTAMP)
            || input.count(port::SLAVE_MAIN) != input.count(port::SLAVE_TIMESTAMP)
        {
            return false;
        }
        if !require_master_coverage {
            return true;
        }
        let master_last = last_timestamp(input, port::MASTER_TIMESTAMP);
        let slave_last = last_timestamp(input, port::SLAVE_TIMESTAMP);
        matches!((master_last, slave_last), (Some(m), Some(s)) if m >= s)
    }

    /// Consume the aligned prefix of both streams.
    ///
    /// Emits `master_main`, `master_timestamp` and `slave_main` covering the
    /// same master span. Emits nothing while fewer than two slave samples
    /// lie within master coverage.
    pub fn synchronize(&mut self, input: &mut PortBuffers) -> PipelineResult<PortBuffers> {
        let (master_ts, slave_ts) = self.checked_timestamps(input)?;
        let Some(&master_last) = master_ts.last() else {
            return Ok(PortBuffers::new());
        };
        let available = slave_ts.partition_point(|&t| t <= master_last);
        if available < 2 {
            return Ok(PortBuffers::new());
        }

        let matches = Self::match_indices(&master_ts, &slave_ts[..available]);
        if matches.len() < available {
            return Ok(PortBuffers::new());
        }
        let end = matches[available - 1];
        let owners = available - 1;
        self.record_errors(&master_ts, &slave_ts[..owners], &matches[..owners]);

        let fs = input.entry(port::MASTER_MAIN).sampling_frequency_hz();
        let slave_out = self.resample_buffer(
            input,
            port::SLAVE_MAIN,
            owners,
            &matches[..owners],
            end,
            fs,
            None,
        )?;

        let mut out = PortBuffers::new();
        out.insert(port::MASTER_MAIN, input.entry(port::MASTER_MAIN).splice(0, end));
        out.insert(
            port::MASTER_TIMESTAMP,
            input.entry(port::MASTER_TIMESTAMP).splice(0, end),
        );
        out.insert(port::SLAVE_MAIN, slave_out);
        input.entry(port::SLAVE_MAIN).splice(0, owners);
        input.entry(port::SLAVE_TIMESTAMP).splice(0, owners);
        Ok(out)
    }

    /// Append the slave channels, resampled onto the master grid, to a copy
    /// of the master data. The inputs are left untouched.
    pub fn merge(
        &mut self,
        input: &mut PortBuffers,
        slave_names: &SlaveNaming,
    ) -> PipelineResult<PortBuffers> {
        let (master_ts, slave_ts) = self.checked_timestamps(input)?;
        let matches = Self::match_indices(&master_ts, &slave_ts);
        self.record_errors(&master_ts, &slave_ts, &matches);
        let master = input.entry(port::MASTER_MAIN).clone();
        let fs = master.sampling_frequency_hz();
        let resampled = self.resample_buffer(
            input,
            port::SLAVE_MAIN,
            matches.len(),
            &matches,
            master_ts.len(),
            fs,
            Some(slave_names),
        )?;

        let mut main = master;
        for channel in resampled.channels() {
            let values = resampled.data_on_channel(channel).unwrap_or_default();
            main.input_data_on_channel(channel, values)?;
        }

        let mut out = PortBuffers::new();
        out.insert(port::MAIN, main);
        out.insert(port::TIMESTAMP, input.entry(port::MASTER_TIMESTAMP).clone());
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn resample_buffer(
        &self,
        input: &mut PortBuffers,
        slave_port: &str,
        owners: usize,
        matches: &[usize],
        end: usize,
        fs: f64,
        naming: Option<&SlaveNaming>,
    ) -> PipelineResult<TimeSeriesBuffer> {
        let slave = input.entry(slave_port);
        let names = match naming {
            Some(naming) => naming.names(slave.channels())?,
            None => slave.channels().to_vec(),
        };
        let mut rows = Vec::with_capacity(names.len());
        for channel in slave.channels() {
            let values = slave.data_on_channel(channel).unwrap_or_default();
            let owned = &values[..owners.min(values.len())];
            rows.push(resample(owned, matches, end, self.fill));
        }
        TimeSeriesBuffer::from_channel_major(fs, names, rows)
    }

    fn checked_timestamps(&self, input: &PortBuffers) -> PipelineResult<(Vec<f64>, Vec<f64>)> {
        let master_ts = timestamps(input, port::MASTER_TIMESTAMP)?;
        let slave_ts = timestamps(input, port::SLAVE_TIMESTAMP)?;
        check_lengths(input, port::MASTER_MAIN, master_ts.len())?;
        check_lengths(input, port::SLAVE_MAIN, slave_ts.len())?;
        Ok((master_ts, slave_ts))
    }
}

/// Output names for merged slave channels.
#[derive(Debug, Clone, PartialEq)]
pub enum SlaveNaming {
    Prefix(String),
    Explicit(Vec<String>),
}

impl Default for SlaveNaming {
    fn default() -> Self {
        SlaveNaming::Prefix("slave_".to_string())
    }
}

impl SlaveNaming {
    fn names(&self, channels: &[String]) -> PipelineResult<Vec<String>> {
        match self {
            SlaveNaming::Prefix(prefix) => {
                Ok(channels.iter().map(|c| format!("{}{}", prefix, c)).collect())
            }
            SlaveNaming::Explicit(names) if names.len() == channels.len() => Ok(names.clone()),
            SlaveNaming::Explicit(names) => Err(PipelineError::incompatible(format!(
                "{} slave channel names configured for {} slave channels",
                names.len(),
                channels.len()
            ))),
        }
    }
}

fn timestamps(input: &PortBuffers, port_name: &str) -> PipelineResult<Vec<f64>> {
    let Some(buffer) = input.get(port_name) else {
        return Ok(Vec::new());
    };
    match buffer.channels() {
        [] => Ok(Vec::new()),
        [channel] => Ok(buffer.data_on_channel(channel).unwrap_or_default().to_vec()),
        channels => Err(PipelineError::incompatible(format!(
            "'{}' must have a single channel, got {}",
            port_name,
            channels.len()
        ))),
    }
}

fn last_timestamp(input: &PortBuffers, port_name: &str) -> Option<f64> {
    let buffer = input.get(port_name)?;
    buffer.last_value(buffer.channels().first()?)
}

fn check_lengths(input: &PortBuffers, port_name: &str, expected: usize) -> PipelineResult<()> {
    let count = input.count(port_name);
    if count == expected {
        Ok(())
    } else {
        Err(PipelineError::incompatible(format!(
            "'{}' has {} samples but its timestamp buffer has {}",
            port_name, count, expected
        )))
    }
}
