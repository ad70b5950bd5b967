//! Nearest-centroid classifier and the `classifiers/nearest_centroid`
//! factory.

use crate::pipeline::error::{ConfigError, PipelineError, PipelineResult};
use crate::pipeline::node::NodeKind;
use crate::pipeline::registry::NodeSpec;
use crate::pipeline::trainable::{
    Model, RemainingData, TrainableConfig, TrainableNode, TrainingSet,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MODEL_KIND: &str = "nearest_centroid";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Centroid {
    label: f64,
    mean: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CentroidState {
    centroids: Vec<Centroid>,
}

/// Assigns each window the label of the closest class mean (squared
/// euclidean distance).
#[derive(Debug, Clone, Default)]
pub struct NearestCentroid {
    state: CentroidState,
    /// Request retraining after this many predicted windows.
    retrain_after: Option<usize>,
    predicted: usize,
}

impl NearestCentroid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retrain_after(mut self, windows: usize) -> Self {
        self.retrain_after = Some(windows);
        self
    }

    pub fn classes(&self) -> Vec<f64> {
        self.state.centroids.iter().map(|c| c.label).collect()
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl Model for NearestCentroid {
    fn kind(&self) -> &str {
        MODEL_KIND
    }

    fn fit(&mut self, set: &TrainingSet) -> PipelineResult<()> {
        let Some(dim) = set.features.first().map(Vec::len) else {
            return Err(PipelineError::incompatible("empty training set"));
        };
        if set.features.len() != set.labels.len() {
            return Err(PipelineError::incompatible(format!(
                "{} feature rows for {} labels",
                set.features.len(),
                set.labels.len()
            )));
        }

        // label → (sum, count), in first-seen order
        let mut sums: Vec<(f64, Vec<f64>, usize)> = Vec::new();
        for (row, &label) in set.features.iter().zip(&set.labels) {
            if row.len() != dim {
                return Err(PipelineError::incompatible(format!(
                    "feature row has {} values, expected {}",
                    row.len(),
                    dim
                )));
            }
            let index = match sums.iter().position(|(l, _, _)| *l == label) {
                Some(i) => i,
                None => {
                    sums.push((label, vec![0.0; dim], 0));
                    sums.len() - 1
                }
            };
            let (_, sum, count) = &mut sums[index];
            for (s, v) in sum.iter_mut().zip(row) {
                *s += v;
            }
            *count += 1;
        }

        self.state.centroids = sums
            .into_iter()
            .map(|(label, sum, count)| Centroid {
                label,
                mean: sum.into_iter().map(|s| s / count as f64).collect(),
            })
            .collect();
        self.predicted = 0;
        Ok(())
    }

    fn predict(&mut self, features: &[Vec<f64>]) -> PipelineResult<Vec<f64>> {
        if self.state.centroids.is_empty() {
            return Err(PipelineError::incompatible("model has not been fitted"));
        }
        let dim = self.state.centroids[0].mean.len();
        let mut out = Vec::with_capacity(features.len());
        for row in features {
            if row.len() != dim {
                return Err(PipelineError::incompatible(format!(
                    "window has {} values, model expects {}",
                    row.len(),
                    dim
                )));
            }
            let mut best = &self.state.centroids[0];
            let mut best_distance = squared_distance(row, &best.mean);
            for centroid in &self.state.centroids[1..] {
                let distance = squared_distance(row, &centroid.mean);
                if distance < best_distance {
                    best = centroid;
                    best_distance = distance;
                }
            }
            out.push(best.label);
        }
        self.predicted += features.len();
        Ok(out)
    }

    fn should_retrain(&mut self) -> bool {
        match self.retrain_after {
            Some(limit) if self.predicted >= limit => {
                self.predicted = 0;
                true
            }
            _ => false,
        }
    }

    fn snapshot(&self) -> PipelineResult<serde_json::Value> {
        serde_json::to_value(&self.state).map_err(|e| PipelineError::Snapshot(e.to_string()))
    }

    fn restore(&mut self, state: serde_json::Value) -> PipelineResult<()> {
        self.state =
            serde_json::from_value(state).map_err(|e| PipelineError::Snapshot(e.to_string()))?;
        self.predicted = 0;
        Ok(())
    }
}

/// Trainable parameters shared by every model.
pub fn trainable_config(spec: &NodeSpec<'_>) -> Result<TrainableConfig, ConfigError> {
    let params = spec.params();
    let training_set_size = params.positive_usize("training_set_size", None)?;
    let window_size = params.positive_usize("window_size", Some(1))?;
    if training_set_size % window_size != 0 {
        return Err(ConfigError::invalid(
            spec.name,
            "window_size",
            format!(
                "{} does not divide training_set_size {}",
                window_size, training_set_size
            ),
        ));
    }
    let remaining = params.choice_or("remaining_data", &["clear", "process"], "clear")?;
    let remaining_data = match remaining {
        "process" => RemainingData::Process,
        _ => RemainingData::Clear,
    };
    Ok(TrainableConfig {
        training_set_size,
        window_size,
        snapshot_path: params.opt_str("snapshot_path")?.map(PathBuf::from),
        remaining_data,
    })
}

pub fn build(spec: &NodeSpec<'_>) -> PipelineResult<NodeKind> {
    let params = spec.params();
    let config = trainable_config(spec)?;
    let mut model = NearestCentroid::new();
    if let Some(n) = params.opt_usize("retrain_after")? {
        if n == 0 {
            return Err(ConfigError::invalid(spec.name, "retrain_after", "must be > 0").into());
        }
        model = model.retrain_after(n);
    }

    let node = match params.opt_str("load_snapshot")? {
        Some(path) => {
            let node = TrainableNode::from_snapshot(Box::new(model), config, Path::new(path))?;
            tracing::info!("[{}] restored model from {}", spec.name, path);
            node
        }
        None => TrainableNode::new(Box::new(model), config),
    };
    Ok(NodeKind::Trainable(node))
}
