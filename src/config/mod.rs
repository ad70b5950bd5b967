//! Graph configuration.
//!
//! A graph is described declaratively and handed explicitly to the builder;
//! there is no global configuration state. Files are TOML unless the path
//! ends in `.json`.
//!
//! # Format
//!
//! ```toml
//! [engine]
//! tick_rate_hz = 50
//! failure_policy = "stop_node"
//!
//! [nodes.root.eeg]
//! module = "generators"
//! type = "sine"
//! channels = ["c3", "c4"]
//! buffer_options = { clear_output_buffer_on_generate = true }
//! outputs.main = [{ node = "window", input = "main" }]
//!
//! [nodes.common.window]
//! module = "processing"
//! type = "window"
//! window_size = 250
//! buffer_options = { clear_output_buffer_on_data_input = true, clear_input_buffer_after_process = false, clear_output_buffer_after_process = true }
//! ```
//!
//! Every key of a node table other than `module`, `type`, `outputs` and
//! `buffer_options` is a node parameter, read through [`Params`].

pub mod params;

pub use params::Params;

use crate::error::{NeuroflowError, Result};
use crate::pipeline::engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Complete description of one pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub nodes: NodesConfig,
}

/// The two node pools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodesConfig {
    /// Generators driven by the tick loop.
    #[serde(default)]
    pub root: BTreeMap<String, NodeConfig>,
    /// Everything downstream, built only when reachable from a root.
    #[serde(default)]
    pub common: BTreeMap<String, NodeConfig>,
}

/// Which pool a node was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePool {
    Root,
    Common,
}

/// One node's declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    /// Output port → ordered wiring targets.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Vec<EdgeTarget>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub buffer_options: BTreeMap<String, toml::Value>,
    /// Node-specific parameters.
    #[serde(flatten)]
    pub params: BTreeMap<String, toml::Value>,
}

impl NodeConfig {
    pub fn new(module: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            node_type: Some(node_type.into()),
            ..Default::default()
        }
    }

    /// Add a wiring target to `output`.
    pub fn with_output(mut self, output: &str, node: &str, input: &str) -> Self {
        self.outputs
            .entry(output.to_string())
            .or_default()
            .push(EdgeTarget::new(node, input));
        self
    }

    pub fn with_buffer_option(mut self, flag: &str, value: bool) -> Self {
        self.buffer_options
            .insert(flag.to_string(), toml::Value::Boolean(value));
        self
    }

    pub fn with_param(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Typed view of this node's parameters.
    pub fn params<'a>(&'a self, node: &'a str) -> Params<'a> {
        Params::new(node, &self.params)
    }
}

/// Downstream end of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeTarget {
    pub node: String,
    pub input: String,
}

impl EdgeTarget {
    pub fn new(node: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            input: input.into(),
        }
    }
}

impl GraphConfig {
    /// Load a graph description from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            NeuroflowError::Config(format!("Failed to read graph config {:?}: {}", path, e))
        })?;

        let parsed = if is_json(path) {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        };
        parsed.map_err(|e| e.with_context(format!("{:?}", path)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| NeuroflowError::Config(format!("Failed to parse TOML: {}", e)))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| NeuroflowError::Config(format!("Failed to parse JSON: {}", e)))
    }

    /// Save as TOML, or JSON when the path ends in `.json`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                NeuroflowError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| NeuroflowError::Serialization(e.to_string()))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| NeuroflowError::Serialization(e.to_string()))?
        };

        std::fs::write(path, content).map_err(|e| {
            NeuroflowError::Config(format!("Failed to write graph config {:?}: {}", path, e))
        })
    }

    /// Look a node up in either pool.
    pub fn node(&self, name: &str) -> Option<(NodePool, &NodeConfig)> {
        self.nodes
            .root
            .get(name)
            .map(|n| (NodePool::Root, n))
            .or_else(|| self.nodes.common.get(name).map(|n| (NodePool::Common, n)))
    }

    pub fn root_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.root.keys().map(String::as_str)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::engine::{FailurePolicy, QueuePolicy};

    const SAMPLE: &str = r#"
        [engine]
        tick_rate_hz = 20
        failure_policy = "skip_delivery"

        [engine.queue]
        policy = "bounded"
        capacity = 64

        [nodes.root.eeg]
        module = "generators"
        type = "sine"
        channels = ["c3", "c4"]
        sampling_frequency_hz = 250.0
        buffer_options = { clear_output_buffer_on_generate = true }
        outputs.main = [{ node = "window", input = "main" }, { node = "log", input = "main" }]

        [nodes.common.window]
        module = "processing"
        type = "window"
        window_size = 50
    "#;

    #[test]
    fn test_parse_toml() {
        let config = GraphConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.engine.tick_rate_hz, 20);
        assert_eq!(config.engine.failure_policy, FailurePolicy::SkipDelivery);
        assert_eq!(config.engine.queue, QueuePolicy::Bounded { capacity: 64 });

        let (pool, eeg) = config.node("eeg").unwrap();
        assert_eq!(pool, NodePool::Root);
        assert_eq!(eeg.node_type.as_deref(), Some("sine"));
        assert_eq!(eeg.outputs["main"].len(), 2);
        assert_eq!(eeg.outputs["main"][1], EdgeTarget::new("log", "main"));
        assert!(eeg.params.contains_key("channels"));
        assert!(!eeg.params.contains_key("outputs"));

        let (pool, window) = config.node("window").unwrap();
        assert_eq!(pool, NodePool::Common);
        assert_eq!(window.params("window").usize_or("window_size", 1).unwrap(), 50);
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = GraphConfig::from_toml_str("").unwrap();
        assert_eq!(config.engine, EngineConfig::default());
        assert!(config.nodes.root.is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        let config = GraphConfig::from_toml_str(SAMPLE).unwrap();
        config.save(&path).unwrap();
        let loaded = GraphConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_reports_path() {
        let err = GraphConfig::load("/nonexistent/graph.toml").unwrap_err();
        assert!(err.to_string().contains("graph.toml"));
    }

    #[test]
    fn test_builder_helpers() {
        let node = NodeConfig::new("processing", "window")
            .with_output("main", "sink", "main")
            .with_buffer_option("clear_input_buffer_after_process", true)
            .with_param("window_size", 10);
        assert_eq!(node.outputs["main"][0].node, "sink");
        assert_eq!(node.params("w").usize_or("window_size", 1).unwrap(), 10);
    }
}
