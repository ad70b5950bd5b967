//! Model snapshot persistence for trainable nodes.
//!
//! A snapshot is a JSON document holding the node name, the model kind, the
//! creation time and whatever state the model serialises. Each save writes a
//! new file whose name is the configured template suffixed with the unix
//! time in milliseconds, so earlier snapshots are never overwritten.

use crate::pipeline::error::{PipelineError, PipelineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub node: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub state: serde_json::Value,
}

impl ModelSnapshot {
    pub fn new(node: impl Into<String>, model: impl Into<String>, state: serde_json::Value) -> Self {
        Self {
            node: node.into(),
            model: model.into(),
            created_at: Utc::now(),
            state,
        }
    }

    /// Write the snapshot next to `template`, returning the path written.
    pub fn save(&self, template: &Path) -> PipelineResult<PathBuf> {
        let path = timestamped_path(template, self.created_at);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                PipelineError::Snapshot(format!("create {}: {}", parent.display(), e))
            })?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Snapshot(format!("serialize: {}", e)))?;
        fs::write(&path, content)
            .map_err(|e| PipelineError::Snapshot(format!("write {}: {}", path.display(), e)))?;

        tracing::info!("[{}] saved {} snapshot to {}", self.node, self.model, path.display());
        Ok(path)
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| PipelineError::Snapshot(format!("read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| PipelineError::Snapshot(format!("parse {}: {}", path.display(), e)))
    }
}

/// `dir/name.ext` becomes `dir/name_<millis>.ext`; a missing extension
/// becomes `.json`.
pub fn timestamped_path(template: &Path, at: DateTime<Utc>) -> PathBuf {
    let stem = template
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    let ext = template
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "json".to_string());
    template.with_file_name(format!("{}_{}.{}", stem, at.timestamp_millis(), ext))
}
