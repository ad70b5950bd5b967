//! Thread-per-node processing graph.
//!
//! Every node owns a worker thread and an inbound delivery queue. Root
//! generators are ticked by the [`Pipeline`] driver; their output fans out
//! to the children wired on each output port, which process, emit and fan
//! out in turn.
//!
//! # Architecture
//!
//! ```text
//! [generator] ──main──► [window] ──main──► [band_power] ──main──► [gate] ──► [classifier]
//!      │                                                   ▲
//!      └──timestamp──────────────────────────────► [synchronize]
//! ```
//!
//! # Design
//!
//! - **Enum dispatch** - [`NodeKind`] wraps generators, processors, gates
//!   and trainable nodes; the step logic in [`NodeCore`] is shared.
//! - **Buffer lifecycle flags** - [`BufferOptions`] decide when input and
//!   output buffers are cleared around each step.
//! - **Delivery order** - one FIFO queue per node, drained by its worker;
//!   deliveries from one parent arrive in the order they were emitted.
//! - **Failure isolation** - a failing worker reports a [`NodeFailure`] and
//!   the [`FailurePolicy`] decides whether the rest of the graph carries on.

pub mod buffer;
pub mod buffer_options;
pub mod engine;
pub mod error;
pub mod executor;
pub mod gate;
pub mod graph;
pub mod id;
pub mod node;
pub mod node_type;
pub mod nodes;
pub mod port;
pub mod registry;
pub mod snapshot;
pub mod sync;
pub mod trainable;

pub use buffer::{PortBuffers, TimeSeriesBuffer};
pub use buffer_options::BufferOptions;
pub use engine::{
    ChildEdge, Engine, EngineConfig, FailurePolicy, NodeFailure, NodeHandle, NodeStats,
    QueuePolicy,
};
pub use error::{ConfigError, ConfigErrorKind, PipelineError, PipelineResult, WiringError};
pub use executor::{Pipeline, RunSummary, StopReason};
pub use gate::{Gate, GateCondition, GatePredicate};
pub use graph::Graph;
pub use id::NodeId;
pub use node::{Generator, NodeCore, NodeKind, Processor, StepOutcome};
pub use node_type::NodeCategory;
pub use port::PortDirection;
pub use registry::{NodeFactory, NodeRegistry, NodeSpec};
pub use snapshot::ModelSnapshot;
pub use sync::{FillPolicy, SlaveNaming, Synchronizer};
pub use trainable::{Model, RemainingData, TrainableConfig, TrainableNode, TrainableState};
