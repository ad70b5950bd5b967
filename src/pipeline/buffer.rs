//! Channel-keyed time-series container exchanged between nodes.
//!
//! A `TimeSeriesBuffer` holds one ordered `Vec<f64>` per named channel. All
//! channels always have the same length: every mutating operation either
//! keeps that true or fails with `DataIncompatibility` and leaves the buffer
//! untouched. `has_data` and `count` look at the first channel only, which is
//! sound because of that invariant.
//!
//! Buffers are plain values. Handing one to another node clones it, so a
//! consumer's copy can never be changed by a later write upstream.

use crate::pipeline::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Ordered per-channel sample storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesBuffer {
    sampling_frequency_hz: f64,
    channels: Vec<String>,
    data: HashMap<String, Vec<f64>>,
}

impl TimeSeriesBuffer {
    /// Create an empty buffer with no channels.
    pub fn new(sampling_frequency_hz: f64) -> Self {
        Self {
            sampling_frequency_hz,
            channels: Vec::new(),
            data: HashMap::new(),
        }
    }

    /// Create an empty buffer with the given channel names.
    ///
    /// Duplicate names are collapsed, keeping the first occurrence.
    pub fn with_channels<I, S>(sampling_frequency_hz: f64, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut buffer = Self::new(sampling_frequency_hz);
        for name in channels {
            let name = name.into();
            if !buffer.data.contains_key(&name) {
                buffer.data.insert(name.clone(), Vec::new());
                buffer.channels.push(name);
            }
        }
        buffer
    }

    /// Single-channel buffer from a 1-D array.
    pub fn from_channel(
        sampling_frequency_hz: f64,
        channel: impl Into<String>,
        values: Vec<f64>,
    ) -> Self {
        let channel = channel.into();
        let mut data = HashMap::new();
        data.insert(channel.clone(), values);
        Self {
            sampling_frequency_hz,
            channels: vec![channel],
            data,
        }
    }

    /// Build from a 2-D array laid out one row per channel.
    pub fn from_channel_major<S: Into<String>>(
        sampling_frequency_hz: f64,
        channels: Vec<S>,
        rows: Vec<Vec<f64>>,
    ) -> PipelineResult<Self> {
        if channels.len() != rows.len() {
            return Err(PipelineError::incompatible(format!(
                "{} channel names for {} data rows",
                channels.len(),
                rows.len()
            )));
        }
        if let Some(first) = rows.first() {
            if rows.iter().any(|r| r.len() != first.len()) {
                return Err(PipelineError::incompatible(
                    "channel rows have different lengths",
                ));
            }
        }

        let mut buffer = Self::new(sampling_frequency_hz);
        for (name, row) in channels.into_iter().zip(rows) {
            let name = name.into();
            if buffer.data.insert(name.clone(), row).is_some() {
                return Err(PipelineError::incompatible(format!(
                    "duplicate channel '{}'",
                    name
                )));
            }
            buffer.channels.push(name);
        }
        Ok(buffer)
    }

    /// Build from a 2-D array laid out one row per sample.
    pub fn from_sample_major<S: Into<String>>(
        sampling_frequency_hz: f64,
        channels: Vec<S>,
        samples: &[Vec<f64>],
    ) -> PipelineResult<Self> {
        let mut buffer = Self::with_channels(sampling_frequency_hz, channels);
        for sample in samples {
            buffer.push_sample(sample)?;
        }
        Ok(buffer)
    }

    pub fn sampling_frequency_hz(&self) -> f64 {
        self.sampling_frequency_hz
    }

    pub fn set_sampling_frequency_hz(&mut self, hz: f64) {
        self.sampling_frequency_hz = hz;
    }

    /// Channel names in order.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    /// True when the first channel holds at least one sample.
    pub fn has_data(&self) -> bool {
        self.count() > 0
    }

    /// Number of samples, measured on the first channel.
    pub fn count(&self) -> usize {
        self.channels
            .first()
            .and_then(|c| self.data.get(c))
            .map_or(0, Vec::len)
    }

    /// Samples stored for one channel.
    pub fn data_on_channel(&self, name: &str) -> Option<&[f64]> {
        self.data.get(name).map(Vec::as_slice)
    }

    /// Last sample of a channel.
    pub fn last_value(&self, name: &str) -> Option<f64> {
        self.data.get(name).and_then(|v| v.last().copied())
    }

    /// Append raw values to one channel.
    ///
    /// A new channel is added when its length matches `count()` (any length
    /// if the buffer has no channels yet). An existing channel can only be
    /// appended to when it is the buffer's only channel.
    pub fn input_data_on_channel(&mut self, name: &str, values: &[f64]) -> PipelineResult<()> {
        match self.data.get_mut(name) {
            None => {
                if !self.channels.is_empty() && values.len() != self.count() {
                    return Err(PipelineError::incompatible(format!(
                        "new channel '{}' has {} samples, buffer has {}",
                        name,
                        values.len(),
                        self.count()
                    )));
                }
                self.channels.push(name.to_string());
                self.data.insert(name.to_string(), values.to_vec());
                Ok(())
            }
            Some(existing) if self.channels.len() == 1 => {
                existing.extend_from_slice(values);
                Ok(())
            }
            Some(_) => Err(PipelineError::incompatible(format!(
                "appending to channel '{}' alone would unbalance {} channels",
                name,
                self.channels.len()
            ))),
        }
    }

    /// Append one value per channel, in channel order.
    pub fn push_sample(&mut self, sample: &[f64]) -> PipelineResult<()> {
        if sample.len() != self.channels.len() {
            return Err(PipelineError::incompatible(format!(
                "sample has {} values for {} channels",
                sample.len(),
                self.channels.len()
            )));
        }
        for (name, &value) in self.channels.iter().zip(sample) {
            if let Some(column) = self.data.get_mut(name) {
                column.push(value);
            }
        }
        Ok(())
    }

    /// Append a copy of another buffer's samples, channel by channel.
    ///
    /// An empty buffer takes over the other buffer's channel set and
    /// sampling frequency. Otherwise both channel sets must match.
    pub fn extend(&mut self, other: &TimeSeriesBuffer) -> PipelineResult<()> {
        if other.channels.is_empty() {
            return Ok(());
        }
        if !self.has_data() {
            let same_set = self.channels.len() == other.channels.len()
                && other.channels.iter().all(|c| self.data.contains_key(c));
            if !same_set {
                *self = other.clone();
                return Ok(());
            }
            if self.sampling_frequency_hz == 0.0 {
                self.sampling_frequency_hz = other.sampling_frequency_hz;
            }
        }

        let same_set = self.channels.len() == other.channels.len()
            && other.channels.iter().all(|c| self.data.contains_key(c));
        if !same_set {
            return Err(PipelineError::incompatible(format!(
                "cannot extend channels {:?} with {:?}",
                self.channels, other.channels
            )));
        }

        for name in &other.channels {
            if let (Some(dst), Some(src)) = (self.data.get_mut(name), other.data.get(name)) {
                dst.extend_from_slice(src);
            }
        }
        Ok(())
    }

    /// Remove `count` samples starting at `start` from every channel and
    /// return them as a new buffer. Out-of-range requests are clamped.
    pub fn splice(&mut self, start: usize, count: usize) -> TimeSeriesBuffer {
        let len = self.count();
        let start = start.min(len);
        let end = start.saturating_add(count).min(len);

        let mut removed = TimeSeriesBuffer::with_channels(
            self.sampling_frequency_hz,
            self.channels.iter().cloned(),
        );
        for name in &self.channels {
            if let (Some(src), Some(dst)) = (self.data.get_mut(name), removed.data.get_mut(name)) {
                *dst = src.drain(start..end).collect();
            }
        }
        removed
    }

    /// Drop all samples, keeping the channel layout.
    pub fn clear(&mut self) {
        for column in self.data.values_mut() {
            column.clear();
        }
    }

    pub fn rename_channel(&mut self, old: &str, new: &str) -> PipelineResult<()> {
        if old == new {
            return Ok(());
        }
        if self.data.contains_key(new) {
            return Err(PipelineError::incompatible(format!(
                "channel '{}' already exists",
                new
            )));
        }
        let column = self
            .data
            .remove(old)
            .ok_or_else(|| PipelineError::incompatible(format!("no channel '{}'", old)))?;
        self.data.insert(new.to_string(), column);
        if let Some(slot) = self.channels.iter_mut().find(|c| *c == old) {
            *slot = new.to_string();
        }
        Ok(())
    }

    /// Rows of `channel_count()` values, one per sample.
    pub fn sample_major(&self) -> Vec<Vec<f64>> {
        let columns: Vec<&Vec<f64>> = self
            .channels
            .iter()
            .filter_map(|c| self.data.get(c))
            .collect();
        (0..self.count())
            .map(|i| columns.iter().map(|col| col[i]).collect())
            .collect()
    }

    /// All values, channel after channel.
    pub fn channel_major_values(&self) -> Vec<f64> {
        self.channels
            .iter()
            .filter_map(|c| self.data.get(c))
            .flat_map(|col| col.iter().copied())
            .collect()
    }
}

/// Port name → buffer map owned by a node for its inputs or outputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortBuffers {
    ports: BTreeMap<String, TimeSeriesBuffer>,
}

impl PortBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create an empty buffer per port.
    pub fn with_ports<I, S>(ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ports: ports
                .into_iter()
                .map(|p| (p.into(), TimeSeriesBuffer::default()))
                .collect(),
        }
    }

    pub fn get(&self, port: &str) -> Option<&TimeSeriesBuffer> {
        self.ports.get(port)
    }

    pub fn get_mut(&mut self, port: &str) -> Option<&mut TimeSeriesBuffer> {
        self.ports.get_mut(port)
    }

    /// Buffer for `port`, created empty if missing.
    pub fn entry(&mut self, port: &str) -> &mut TimeSeriesBuffer {
        self.ports.entry(port.to_string()).or_default()
    }

    pub fn insert(&mut self, port: impl Into<String>, buffer: TimeSeriesBuffer) {
        self.ports.insert(port.into(), buffer);
    }

    pub fn remove(&mut self, port: &str) -> Option<TimeSeriesBuffer> {
        self.ports.remove(port)
    }

    pub fn has_data(&self, port: &str) -> bool {
        self.ports.get(port).is_some_and(TimeSeriesBuffer::has_data)
    }

    pub fn count(&self, port: &str) -> usize {
        self.ports.get(port).map_or(0, TimeSeriesBuffer::count)
    }

    pub fn any_data(&self) -> bool {
        self.ports.values().any(TimeSeriesBuffer::has_data)
    }

    /// Empty every port, keeping channel layouts.
    pub fn clear(&mut self) {
        for buffer in self.ports.values_mut() {
            buffer.clear();
        }
    }

    /// Extend each port with the matching port of `other`.
    pub fn append(&mut self, other: PortBuffers) -> PipelineResult<()> {
        for (port, buffer) in other.ports {
            self.entry(&port)
                .extend(&buffer)
                .map_err(|e| e.with_context(format!("port '{}'", port)))?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TimeSeriesBuffer)> {
        self.ports.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

impl FromIterator<(String, TimeSeriesBuffer)> for PortBuffers {
    fn from_iter<T: IntoIterator<Item = (String, TimeSeriesBuffer)>>(iter: T) -> Self {
        Self {
            ports: iter.into_iter().collect(),
        }
    }
}
