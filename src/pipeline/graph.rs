//! Graph construction and ownership.
//!
//! Building runs in two passes over an arena:
//! 1. Resolve the set of nodes reachable from the roots and instantiate each
//!    exactly once, in discovery order, so a node shared by several parents
//!    is a single instance.
//! 2. Wire every declared edge by name lookup into the arena.
//!
//! Nothing runs until both passes succeed. On any error every node already
//! instantiated is disposed.

use crate::config::{GraphConfig, NodeConfig, NodePool};
use crate::pipeline::buffer_options::BufferOptions;
use crate::pipeline::engine::{Engine, NodeFailure, NodeHandle, NodeStats};
use crate::pipeline::error::{ConfigError, PipelineError, PipelineResult, WiringError};
use crate::pipeline::id::NodeId;
use crate::pipeline::node::NodeCore;
use crate::pipeline::node_type::NodeCategory;
use crate::pipeline::registry::{NodeRegistry, NodeSpec};
use crossbeam_channel::Receiver;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write as _;
use std::time::Duration;

/// A built, runnable node graph.
pub struct Graph {
    nodes: Vec<NodeHandle>,
    by_name: HashMap<String, NodeId>,
    roots: Vec<NodeId>,
    engine: Engine,
    failures: Receiver<NodeFailure>,
    disposed: bool,
}

impl Graph {
    /// Validate `config` and build every node reachable from its roots.
    pub fn build(config: &GraphConfig, registry: &NodeRegistry) -> PipelineResult<Graph> {
        let order = reachable_nodes(config)?;
        let (engine, failures) = Engine::new(config.engine.clone());

        let mut nodes: Vec<NodeHandle> = Vec::with_capacity(order.len());
        if let Err(e) = instantiate(config, registry, &engine, &order, &mut nodes)
            .and_then(|()| wire(config, &order, &nodes))
        {
            for node in &nodes {
                node.dispose();
            }
            return Err(e);
        }

        let by_name: HashMap<String, NodeId> = nodes
            .iter()
            .map(|n| (n.name().to_string(), n.id()))
            .collect();
        let roots = config
            .root_names()
            .filter_map(|name| by_name.get(name).copied())
            .collect();

        tracing::info!(
            "Graph built: {} nodes, {} roots",
            nodes.len(),
            config.nodes.root.len()
        );

        Ok(Graph {
            nodes,
            by_name,
            roots,
            engine,
            failures,
            disposed: false,
        })
    }

    pub fn node(&self, name: &str) -> Option<&NodeHandle> {
        self.by_name.get(name).map(|id| &self.nodes[id.index()])
    }

    pub fn node_by_id(&self, id: NodeId) -> Option<&NodeHandle> {
        self.nodes.get(id.index())
    }

    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub fn roots(&self) -> impl Iterator<Item = &NodeHandle> {
        self.roots.iter().map(|id| &self.nodes[id.index()])
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Failure reports from node workers.
    pub fn failures(&self) -> &Receiver<NodeFailure> {
        &self.failures
    }

    pub fn drain_failures(&self) -> Vec<NodeFailure> {
        self.failures.try_iter().collect()
    }

    /// Tick every root once.
    ///
    /// A root failure is fatal: the whole graph is disposed and the error
    /// returned.
    pub fn tick(&mut self) -> PipelineResult<()> {
        if self.disposed {
            return Err(PipelineError::NodeDisposed("graph".to_string()));
        }
        for &id in &self.roots {
            let root = &self.nodes[id.index()];
            if let Err(e) = root.tick() {
                let name = root.name().to_string();
                tracing::error!("[{}] root tick failed, tearing down graph: {}", name, e);
                self.dispose_all();
                return Err(e.with_context(format!("root '{}'", name)));
            }
        }
        Ok(())
    }

    /// Wait until no delivery is queued or processing.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.engine.wait_idle(timeout)
    }

    /// Dispose every root's subtree, then anything left over. Idempotent.
    pub fn dispose_all(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        for &id in &self.roots {
            self.nodes[id.index()].dispose_all();
        }
        for node in &self.nodes {
            node.dispose();
        }
        tracing::info!("Graph disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn stats(&self) -> Vec<(String, NodeStats)> {
        self.nodes
            .iter()
            .map(|n| (n.name().to_string(), n.stats()))
            .collect()
    }

    /// Human-readable topology, one node per line.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            let _ = write!(out, "{} [{}]", node.name(), node.category());
            let mut first = true;
            for (port, edges) in node.children() {
                for edge in edges {
                    let sep = if first { " ->" } else { "," };
                    first = false;
                    let _ = write!(out, "{} {}:{}.{}", sep, port, edge.node.name(), edge.input);
                }
            }
            out.push('\n');
        }
        out
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.dispose_all();
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes)
            .field("roots", &self.roots)
            .field("disposed", &self.disposed)
            .finish()
    }
}

/// Names reachable from the roots, roots first, then breadth-first.
fn reachable_nodes(config: &GraphConfig) -> PipelineResult<Vec<String>> {
    if config.nodes.root.is_empty() {
        return Err(ConfigError::missing("graph", "nodes.root").into());
    }
    for name in config.nodes.root.keys() {
        if config.nodes.common.contains_key(name) {
            return Err(ConfigError::invalid(
                name.as_str(),
                "name",
                "declared in both nodes.root and nodes.common",
            )
            .into());
        }
    }

    let mut order = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = config.root_names().collect();
    seen.extend(queue.iter().copied());

    while let Some(name) = queue.pop_front() {
        order.push(name.to_string());
        let Some((_, node)) = config.node(name) else {
            continue;
        };
        for targets in node.outputs.values() {
            for target in targets {
                if config.node(&target.node).is_none() {
                    return Err(WiringError::UnknownNode {
                        from: name.to_string(),
                        target: target.node.clone(),
                    }
                    .into());
                }
                if seen.insert(target.node.as_str()) {
                    queue.push_back(target.node.as_str());
                }
            }
        }
    }

    for name in config.nodes.common.keys() {
        if !seen.contains(name.as_str()) {
            tracing::warn!("[{}] not reachable from any root, skipped", name);
        }
    }
    Ok(order)
}

fn instantiate(
    config: &GraphConfig,
    registry: &NodeRegistry,
    engine: &Engine,
    order: &[String],
    nodes: &mut Vec<NodeHandle>,
) -> PipelineResult<()> {
    for (index, name) in order.iter().enumerate() {
        let Some((pool, node_config)) = config.node(name) else {
            continue;
        };
        let core = build_core(name, pool, node_config, registry)?;
        nodes.push(engine.spawn_node(NodeId::from_index(index), core));
    }
    Ok(())
}

fn build_core(
    name: &str,
    pool: NodePool,
    config: &NodeConfig,
    registry: &NodeRegistry,
) -> PipelineResult<NodeCore> {
    let module = config
        .module
        .as_deref()
        .ok_or_else(|| ConfigError::missing(name, "module"))?;
    let node_type = config
        .node_type
        .as_deref()
        .ok_or_else(|| ConfigError::missing(name, "type"))?;
    let factory = registry.get(module, node_type).ok_or_else(|| {
        ConfigError::invalid(
            name,
            "type",
            format!("no node registered as {}/{}", module, node_type),
        )
    })?;

    let spec = NodeSpec {
        name,
        module,
        node_type,
        config,
    };
    let kind = factory(&spec)?;
    let category = kind.category();
    if pool == NodePool::Root && category != NodeCategory::Generator {
        return Err(ConfigError::invalid(
            name,
            "type",
            format!("root nodes must be generators, {}/{} is {}", module, node_type, category),
        )
        .into());
    }

    let options = BufferOptions::from_table(name, category, &config.buffer_options)?;
    let core = NodeCore::new(name, kind, options);
    for output in config.outputs.keys() {
        core.check_output(output)?;
    }
    tracing::debug!("[{}] created {}/{} ({})", name, module, node_type, category);
    Ok(core)
}

fn wire(config: &GraphConfig, order: &[String], nodes: &[NodeHandle]) -> PipelineResult<()> {
    let index: HashMap<&str, &NodeHandle> = order
        .iter()
        .map(String::as_str)
        .zip(nodes.iter())
        .collect();

    for name in order {
        let (Some((_, node_config)), Some(from)) = (config.node(name), index.get(name.as_str()))
        else {
            continue;
        };
        for (output, targets) in &node_config.outputs {
            for target in targets {
                let to = index.get(target.node.as_str()).ok_or_else(|| {
                    WiringError::UnknownNode {
                        from: name.clone(),
                        target: target.node.clone(),
                    }
                })?;
                from.add_child(output, to, &target.input)?;
            }
        }
    }
    Ok(())
}
