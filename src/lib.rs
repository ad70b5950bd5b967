//! # NeuroFlow-RS: configurable real-time signal-processing pipeline
//!
//! Processing units ("nodes") are wired into a directed graph from a
//! declarative TOML/JSON description and run continuously, pushing data
//! from generators through processors to outputs. Every node runs on its
//! own worker thread; there is no central scheduler.
//!
//! ## Architecture
//!
//! - **Config**: [`config::GraphConfig`] describes the engine settings and
//!   the root/common node pools
//! - **Pipeline**: thread-per-node engine, graph builder and tick driver
//! - **Scripting**: sandboxed Rhai expressions for gates and transforms
//! - **Analysis**: FFT band power and descriptive statistics
//!
//! ## Example
//!
//! ```ignore
//! use neuroflow_rs::{config::GraphConfig, pipeline::{Graph, NodeRegistry, Pipeline}};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = GraphConfig::load("graph.toml")?;
//!     let graph = Graph::build(&config, &NodeRegistry::with_builtins())?;
//!
//!     let mut pipeline = Pipeline::new(graph).with_max_ticks(Some(1000));
//!     let summary = pipeline.run()?;
//!     println!("ran {} ticks", summary.ticks);
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod scripting;

// Re-export commonly used types
pub use config::{GraphConfig, NodeConfig};
pub use error::{NeuroflowError, Result, ResultExt};
pub use pipeline::{Graph, NodeRegistry, Pipeline, PipelineError, PipelineResult};
pub use scripting::ScriptEngine;
