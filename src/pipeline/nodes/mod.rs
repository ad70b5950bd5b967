//! Built-in pipeline node implementations.

pub mod band_power;
pub mod gate;
pub mod generators;
pub mod nearest_centroid;
pub mod script_transform;
pub mod sinks;
pub mod synchronize;
pub mod window;

pub use band_power::BandPowerNode;
pub use generators::{SequenceGenerator, SineGenerator};
pub use nearest_centroid::NearestCentroid;
pub use script_transform::ScriptTransformNode;
pub use sinks::LogSink;
pub use synchronize::{MergeNode, SynchronizeNode};
pub use window::WindowNode;

use crate::pipeline::node::NodeKind;
use crate::pipeline::registry::NodeRegistry;

/// Register every built-in `(module, type)` pair.
pub fn register_builtins(registry: &mut NodeRegistry) {
    registry.register("generators", "sine", |spec| {
        Ok(NodeKind::Generator(Box::new(SineGenerator::from_spec(spec)?)))
    });
    registry.register("generators", "sequence", |spec| {
        Ok(NodeKind::Generator(Box::new(SequenceGenerator::from_spec(spec)?)))
    });
    registry.register("processing", "window", |spec| {
        Ok(NodeKind::Processing(Box::new(WindowNode::from_spec(spec)?)))
    });
    registry.register("processing", "script", |spec| {
        Ok(NodeKind::Processing(Box::new(ScriptTransformNode::from_spec(spec)?)))
    });
    registry.register("processing", "band_power", |spec| {
        Ok(NodeKind::Processing(Box::new(BandPowerNode::from_spec(spec)?)))
    });
    registry.register("processing", "gate", gate::build);
    registry.register("sync", "synchronize", |spec| {
        Ok(NodeKind::Processing(Box::new(SynchronizeNode::from_spec(spec)?)))
    });
    registry.register("sync", "merge", |spec| {
        Ok(NodeKind::Processing(Box::new(MergeNode::from_spec(spec)?)))
    });
    registry.register("classifiers", "nearest_centroid", nearest_centroid::build);
    registry.register("outputs", "log", |spec| {
        Ok(NodeKind::Output(Box::new(LogSink::from_spec(spec)?)))
    });
}
