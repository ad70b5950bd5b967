//! Factories that turn a node declaration into a `NodeKind`.
//!
//! Implementations are selected by `(module, type)`. The built-in set is
//! registered by `NodeRegistry::with_builtins`; embedders add their own with
//! `register`.

use crate::config::{NodeConfig, Params};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::node::NodeKind;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything a factory needs to build one node.
#[derive(Debug, Clone, Copy)]
pub struct NodeSpec<'a> {
    pub name: &'a str,
    pub module: &'a str,
    pub node_type: &'a str,
    pub config: &'a NodeConfig,
}

impl<'a> NodeSpec<'a> {
    pub fn params(&self) -> Params<'a> {
        Params::new(self.name, &self.config.params)
    }
}

pub type NodeFactory = Arc<dyn Fn(&NodeSpec<'_>) -> PipelineResult<NodeKind> + Send + Sync>;

#[derive(Clone, Default)]
pub struct NodeRegistry {
    factories: BTreeMap<(String, String), NodeFactory>,
}

impl NodeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in node.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::pipeline::nodes::register_builtins(&mut registry);
        registry
    }

    /// Register or replace the factory for `module/node_type`.
    pub fn register<F>(&mut self, module: &str, node_type: &str, factory: F)
    where
        F: Fn(&NodeSpec<'_>) -> PipelineResult<NodeKind> + Send + Sync + 'static,
    {
        self.factories.insert(
            (module.to_string(), node_type.to_string()),
            Arc::new(factory),
        );
    }

    pub fn get(&self, module: &str, node_type: &str) -> Option<&NodeFactory> {
        self.factories
            .get(&(module.to_string(), node_type.to_string()))
    }

    pub fn contains(&self, module: &str, node_type: &str) -> bool {
        self.get(module, node_type).is_some()
    }

    /// Registered `(module, type)` pairs, sorted.
    pub fn keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.factories
            .keys()
            .map(|(m, t)| (m.as_str(), t.as_str()))
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.keys().map(|(m, t)| format!("{}/{}", m, t)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = NodeRegistry::with_builtins();
        for (module, node_type) in [
            ("generators", "sine"),
            ("generators", "sequence"),
            ("processing", "window"),
            ("processing", "script"),
            ("processing", "band_power"),
            ("processing", "gate"),
            ("sync", "synchronize"),
            ("sync", "merge"),
            ("classifiers", "nearest_centroid"),
            ("outputs", "log"),
        ] {
            assert!(registry.contains(module, node_type), "{}/{}", module, node_type);
        }
        assert!(!registry.contains("processing", "unknown"));
    }
}
