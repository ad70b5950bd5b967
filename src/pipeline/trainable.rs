//! Trainable nodes: accumulate a training set, fit a model, then predict.
//!
//! ```text
//!            data & label >= training_set_size
//! Untrained ─────────────────────────────────────► Trained
//!     ▲                                                │
//!     └───────────── model.should_retrain() ───────────┘
//! ```
//!
//! A node built from a snapshot starts in `Trained`.

use crate::pipeline::buffer::{PortBuffers, TimeSeriesBuffer};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::port;
use crate::pipeline::snapshot::ModelSnapshot;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Output channel carrying one prediction per window.
pub const PREDICTION_CHANNEL: &str = "prediction";

/// Features and labels handed to `Model::fit`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    /// One sample-major flattened window per row.
    pub features: Vec<Vec<f64>>,
    /// One label per window.
    pub labels: Vec<f64>,
    pub window_size: usize,
    pub channels: Vec<String>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Learning algorithm plugged into a trainable node.
pub trait Model: Send {
    /// Stable name recorded in snapshots.
    fn kind(&self) -> &str;

    fn fit(&mut self, set: &TrainingSet) -> PipelineResult<()>;

    /// One prediction per feature row.
    fn predict(&mut self, features: &[Vec<f64>]) -> PipelineResult<Vec<f64>>;

    /// Checked after each prediction step; true sends the node back to
    /// `Untrained`.
    fn should_retrain(&mut self) -> bool {
        false
    }

    fn snapshot(&self) -> PipelineResult<serde_json::Value>;

    fn restore(&mut self, state: serde_json::Value) -> PipelineResult<()>;

    fn dispose(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainableState {
    Untrained,
    Trained,
}

/// What happens to input left over after training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainingData {
    #[default]
    Clear,
    Process,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainableConfig {
    pub training_set_size: usize,
    pub window_size: usize,
    pub snapshot_path: Option<PathBuf>,
    pub remaining_data: RemainingData,
}

impl TrainableConfig {
    pub fn new(training_set_size: usize) -> Self {
        Self {
            training_set_size,
            window_size: 1,
            snapshot_path: None,
            remaining_data: RemainingData::Clear,
        }
    }
}

pub struct TrainableNode {
    model: Box<dyn Model>,
    config: TrainableConfig,
    state: TrainableState,
    trainings: u64,
    last_snapshot: Option<PathBuf>,
}

impl TrainableNode {
    pub fn new(model: Box<dyn Model>, config: TrainableConfig) -> Self {
        Self {
            model,
            config,
            state: TrainableState::Untrained,
            trainings: 0,
            last_snapshot: None,
        }
    }

    /// Restore a fitted model from disk; the node starts `Trained`.
    pub fn from_snapshot(
        mut model: Box<dyn Model>,
        config: TrainableConfig,
        path: &Path,
    ) -> PipelineResult<Self> {
        let snapshot = ModelSnapshot::load(path)?;
        if snapshot.model != model.kind() {
            return Err(PipelineError::Snapshot(format!(
                "{} holds a '{}' model, expected '{}'",
                path.display(),
                snapshot.model,
                model.kind()
            )));
        }
        model.restore(snapshot.state)?;
        Ok(Self {
            model,
            config,
            state: TrainableState::Trained,
            trainings: 0,
            last_snapshot: Some(path.to_path_buf()),
        })
    }

    pub fn inputs() -> Vec<String> {
        port::port_list(&[port::DATA, port::LABEL])
    }

    pub fn outputs() -> Vec<String> {
        port::port_list(&[port::MAIN])
    }

    pub fn state(&self) -> TrainableState {
        self.state
    }

    pub fn is_trained(&self) -> bool {
        self.state == TrainableState::Trained
    }

    /// Completed training runs.
    pub fn trainings(&self) -> u64 {
        self.trainings
    }

    pub fn last_snapshot(&self) -> Option<&Path> {
        self.last_snapshot.as_deref()
    }

    pub fn config(&self) -> &TrainableConfig {
        &self.config
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    pub(crate) fn dispose(&mut self) {
        self.model.dispose();
    }

    /// One delivery step. Returns whether the node trained or predicted.
    pub(crate) fn step(
        &mut self,
        node: &str,
        input: &mut PortBuffers,
        output: &mut PortBuffers,
    ) -> PipelineResult<bool> {
        match self.state {
            TrainableState::Untrained => self.try_train(node, input, output),
            TrainableState::Trained => {
                if let Some(labels) = input.get_mut(port::LABEL) {
                    labels.clear();
                }
                let predicted = self.predict_buffered(input, output)?;
                if predicted && self.model.should_retrain() {
                    tracing::info!("[{}] model requested retraining", node);
                    self.state = TrainableState::Untrained;
                }
                Ok(predicted)
            }
        }
    }

    fn try_train(
        &mut self,
        node: &str,
        input: &mut PortBuffers,
        output: &mut PortBuffers,
    ) -> PipelineResult<bool> {
        let k = self.config.training_set_size;
        if input.count(port::DATA) < k || input.count(port::LABEL) < k {
            return Ok(false);
        }

        let data = input.entry(port::DATA).splice(0, k);
        let labels = input.entry(port::LABEL).splice(0, k);
        let set = build_training_set(&data, &labels, self.config.window_size)?;

        self.model.fit(&set)?;
        self.state = TrainableState::Trained;
        self.trainings += 1;
        tracing::info!(
            "[{}] trained {} on {} windows of {} samples",
            node,
            self.model.kind(),
            set.len(),
            set.window_size
        );

        if let Some(template) = &self.config.snapshot_path {
            let snapshot = ModelSnapshot::new(node, self.model.kind(), self.model.snapshot()?);
            self.last_snapshot = Some(snapshot.save(template)?);
        }

        match self.config.remaining_data {
            RemainingData::Clear => input.clear(),
            RemainingData::Process => {
                if let Some(labels) = input.get_mut(port::LABEL) {
                    labels.clear();
                }
                self.predict_buffered(input, output)?;
            }
        }
        Ok(true)
    }

    /// Predict every complete window buffered on `data`.
    fn predict_buffered(
        &mut self,
        input: &mut PortBuffers,
        output: &mut PortBuffers,
    ) -> PipelineResult<bool> {
        let window = self.config.window_size.max(1);
        let windows = input.count(port::DATA) / window;
        if windows == 0 {
            return Ok(false);
        }

        let data = input.entry(port::DATA).splice(0, windows * window);
        let features = flatten_windows(&data, window);
        let predictions = self.model.predict(&features)?;
        if predictions.len() != windows {
            return Err(PipelineError::incompatible(format!(
                "model returned {} predictions for {} windows",
                predictions.len(),
                windows
            )));
        }

        let result = TimeSeriesBuffer::from_channel(
            data.sampling_frequency_hz() / window as f64,
            PREDICTION_CHANNEL,
            predictions,
        );
        output.entry(port::MAIN).extend(&result)?;
        Ok(true)
    }
}

impl std::fmt::Debug for TrainableNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainableNode")
            .field("model", &self.model.kind())
            .field("state", &self.state)
            .field("config", &self.config)
            .finish()
    }
}

/// Split `data` into consecutive windows, each flattened sample-major.
pub fn flatten_windows(data: &TimeSeriesBuffer, window: usize) -> Vec<Vec<f64>> {
    data.sample_major()
        .chunks(window.max(1))
        .filter(|chunk| chunk.len() == window.max(1))
        .map(|chunk| chunk.concat())
        .collect()
}

/// Most frequent value in `values`; ties go to the value seen first.
pub fn mode(values: &[f64]) -> Option<f64> {
    let mut counts: Vec<(f64, usize)> = Vec::new();
    for &v in values {
        match counts.iter_mut().find(|(x, _)| *x == v) {
            Some((_, n)) => *n += 1,
            None => counts.push((v, 1)),
        }
    }
    let best = counts.iter().map(|(_, n)| *n).max()?;
    counts.into_iter().find(|(_, n)| *n == best).map(|(v, _)| v)
}

/// Pair windows of `data` with the mode of `labels` over the same span.
pub fn build_training_set(
    data: &TimeSeriesBuffer,
    labels: &TimeSeriesBuffer,
    window: usize,
) -> PipelineResult<TrainingSet> {
    if data.count() != labels.count() {
        return Err(PipelineError::incompatible(format!(
            "{} data samples but {} label samples",
            data.count(),
            labels.count()
        )));
    }
    let label_channel = labels
        .channels()
        .first()
        .and_then(|c| labels.data_on_channel(c))
        .ok_or_else(|| PipelineError::incompatible("label buffer has no channels"))?;

    let window = window.max(1);
    let features = flatten_windows(data, window);
    let labels = label_channel
        .chunks(window)
        .filter(|chunk| chunk.len() == window)
        .filter_map(mode)
        .collect();

    Ok(TrainingSet {
        features,
        labels,
        window_size: window,
        channels: data.channels().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Predicts the running count of fits; records what it saw.
    #[derive(Default)]
    struct CountingModel {
        fits: Arc<Mutex<Vec<TrainingSet>>>,
        retrain_after: Option<usize>,
        predicted: usize,
    }

    impl Model for CountingModel {
        fn kind(&self) -> &str {
            "counting"
        }

        fn fit(&mut self, set: &TrainingSet) -> PipelineResult<()> {
            self.fits.lock().unwrap().push(set.clone());
            Ok(())
        }

        fn predict(&mut self, features: &[Vec<f64>]) -> PipelineResult<Vec<f64>> {
            self.predicted += features.len();
            Ok(features.iter().map(|f| f.iter().sum()).collect())
        }

        fn should_retrain(&mut self) -> bool {
            self.retrain_after.is_some_and(|n| self.predicted >= n)
        }

        fn snapshot(&self) -> PipelineResult<serde_json::Value> {
            Ok(serde_json::json!({ "predicted": self.predicted }))
        }

        fn restore(&mut self, state: serde_json::Value) -> PipelineResult<()> {
            self.predicted = state["predicted"].as_u64().unwrap_or(0) as usize;
            Ok(())
        }
    }

    fn deliver(
        node: &mut TrainableNode,
        input: &mut PortBuffers,
        output: &mut PortBuffers,
        port_name: &str,
        values: Vec<f64>,
    ) -> bool {
        input
            .entry(port_name)
            .extend(&TimeSeriesBuffer::from_channel(100.0, "x", values))
            .unwrap();
        node.step("clf", input, output).unwrap()
    }

    #[test]
    fn test_mode_ties_go_to_first_seen() {
        assert_eq!(mode(&[2.0, 1.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(mode(&[3.0, 1.0, 1.0]), Some(1.0));
        assert_eq!(mode(&[]), None);
    }

    #[test]
    fn test_training_set_windows() {
        let data = TimeSeriesBuffer::from_channel_major(
            10.0,
            vec!["a", "b"],
            vec![vec![1.0, 2.0, 3.0, 4.0], vec![10.0, 20.0, 30.0, 40.0]],
        )
        .unwrap();
        let labels = TimeSeriesBuffer::from_channel(10.0, "y", vec![0.0, 1.0, 1.0, 1.0]);
        let set = build_training_set(&data, &labels, 2).unwrap();
        assert_eq!(set.features, vec![vec![1.0, 10.0, 2.0, 20.0], vec![3.0, 30.0, 4.0, 40.0]]);
        assert_eq!(set.labels, vec![0.0, 1.0]);
    }

    #[test]
    fn test_trains_exactly_when_both_ports_reach_size() {
        let model = CountingModel::default();
        let fits = model.fits.clone();
        let mut node = TrainableNode::new(Box::new(model), TrainableConfig::new(3));
        let mut input = PortBuffers::with_ports(TrainableNode::inputs());
        let mut output = PortBuffers::new();

        assert!(!deliver(&mut node, &mut input, &mut output, port::DATA, vec![1.0, 2.0, 3.0, 4.0]));
        assert!(!deliver(&mut node, &mut input, &mut output, port::LABEL, vec![0.0, 1.0]));
        assert_eq!(node.state(), TrainableState::Untrained);

        assert!(deliver(&mut node, &mut input, &mut output, port::LABEL, vec![1.0]));
        assert!(node.is_trained());
        assert_eq!(fits.lock().unwrap()[0].labels, vec![0.0, 1.0, 1.0]);
        // remaining_data = clear drops the fourth data sample
        assert!(!input.any_data());
        assert!(!output.any_data());
    }

    #[test]
    fn test_remaining_data_processed_after_training() {
        let mut config = TrainableConfig::new(2);
        config.remaining_data = RemainingData::Process;
        let mut node = TrainableNode::new(Box::new(CountingModel::default()), config);
        let mut input = PortBuffers::with_ports(TrainableNode::inputs());
        let mut output = PortBuffers::new();

        deliver(&mut node, &mut input, &mut output, port::LABEL, vec![0.0, 1.0]);
        assert!(deliver(&mut node, &mut input, &mut output, port::DATA, vec![1.0, 2.0, 7.0]));
        let predictions = output.get(port::MAIN).unwrap();
        assert_eq!(predictions.data_on_channel(PREDICTION_CHANNEL).unwrap(), &[7.0]);
    }

    #[test]
    fn test_trained_discards_labels_and_retrains() {
        let model = CountingModel {
            retrain_after: Some(2),
            ..Default::default()
        };
        let mut node = TrainableNode::new(Box::new(model), TrainableConfig::new(1));
        let mut input = PortBuffers::with_ports(TrainableNode::inputs());
        let mut output = PortBuffers::new();

        deliver(&mut node, &mut input, &mut output, port::DATA, vec![1.0]);
        deliver(&mut node, &mut input, &mut output, port::LABEL, vec![0.0]);
        assert!(node.is_trained());

        deliver(&mut node, &mut input, &mut output, port::LABEL, vec![5.0]);
        assert!(!input.has_data(port::LABEL));

        assert!(deliver(&mut node, &mut input, &mut output, port::DATA, vec![2.0]));
        assert!(node.is_trained());
        assert!(deliver(&mut node, &mut input, &mut output, port::DATA, vec![3.0]));
        assert_eq!(node.state(), TrainableState::Untrained);
        assert_eq!(
            output.get(port::MAIN).unwrap().data_on_channel(PREDICTION_CHANNEL).unwrap(),
            &[2.0, 3.0]
        );
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TrainableConfig::new(1);
        config.snapshot_path = Some(dir.path().join("clf.json"));
        let mut node = TrainableNode::new(Box::new(CountingModel::default()), config.clone());
        let mut input = PortBuffers::with_ports(TrainableNode::inputs());
        let mut output = PortBuffers::new();
        deliver(&mut node, &mut input, &mut output, port::DATA, vec![1.0]);
        deliver(&mut node, &mut input, &mut output, port::LABEL, vec![1.0]);

        let path = node.last_snapshot().unwrap().to_path_buf();
        let restored =
            TrainableNode::from_snapshot(Box::new(CountingModel::default()), config, &path)
                .unwrap();
        assert!(restored.is_trained());
    }
}
