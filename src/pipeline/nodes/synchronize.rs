//! `sync/synchronize` and `sync/merge` processors over [`Synchronizer`].
//!
//! Parameters shared by both: `fill` (`zero_fill` or `sample_and_hold`,
//! default `zero_fill`) and `log_sync_error` (default false). Merge also
//! takes `slave_channel_prefix` or `slave_channel_names`.

use crate::pipeline::buffer::PortBuffers;
use crate::pipeline::error::{ConfigError, PipelineResult};
use crate::pipeline::node::Processor;
use crate::pipeline::port;
use crate::pipeline::registry::NodeSpec;
use crate::pipeline::sync::{FillPolicy, SlaveNaming, Synchronizer};

fn stream_inputs() -> Vec<String> {
    port::port_list(&[
        port::MASTER_MAIN,
        port::MASTER_TIMESTAMP,
        port::SLAVE_MAIN,
        port::SLAVE_TIMESTAMP,
    ])
}

fn synchronizer_from_spec(spec: &NodeSpec<'_>) -> Result<Synchronizer, ConfigError> {
    let params = spec.params();
    let fill = params.choice_or("fill", &FillPolicy::NAMES, "zero_fill")?;
    let fill = FillPolicy::from_name(fill).unwrap_or_default();
    Ok(Synchronizer::new(spec.name, fill)
        .with_error_logging(params.bool_or("log_sync_error", false)?))
}

/// Consumes both streams up to the last bounded slave sample.
#[derive(Debug, Clone)]
pub struct SynchronizeNode {
    sync: Synchronizer,
}

impl SynchronizeNode {
    pub fn new(sync: Synchronizer) -> Self {
        Self { sync }
    }

    pub fn from_spec(spec: &NodeSpec<'_>) -> Result<Self, ConfigError> {
        Ok(Self::new(synchronizer_from_spec(spec)?))
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }
}

impl Processor for SynchronizeNode {
    fn inputs(&self) -> Vec<String> {
        stream_inputs()
    }

    fn outputs(&self) -> Vec<String> {
        port::port_list(&[port::MASTER_MAIN, port::MASTER_TIMESTAMP, port::SLAVE_MAIN])
    }

    fn is_processing_condition_satisfied(&self, input: &PortBuffers) -> bool {
        Synchronizer::ready(input, true)
    }

    fn process(&mut self, input: &mut PortBuffers) -> PipelineResult<PortBuffers> {
        self.sync.synchronize(input)
    }
}

/// Appends resampled slave channels to the master data without consuming
/// either stream.
#[derive(Debug, Clone)]
pub struct MergeNode {
    sync: Synchronizer,
    naming: SlaveNaming,
}

impl MergeNode {
    pub fn new(sync: Synchronizer, naming: SlaveNaming) -> Self {
        Self { sync, naming }
    }

    pub fn from_spec(spec: &NodeSpec<'_>) -> Result<Self, ConfigError> {
        let params = spec.params();
        let naming = match (
            params.string_list("slave_channel_names")?,
            params.opt_str("slave_channel_prefix")?,
        ) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::invalid(
                    spec.name,
                    "slave_channel_names",
                    "set either 'slave_channel_names' or 'slave_channel_prefix', not both",
                ))
            }
            (Some(names), None) => SlaveNaming::Explicit(names),
            (None, Some(prefix)) => SlaveNaming::Prefix(prefix.to_string()),
            (None, None) => SlaveNaming::default(),
        };
        Ok(Self::new(synchronizer_from_spec(spec)?, naming))
    }
}

impl Processor for MergeNode {
    fn inputs(&self) -> Vec<String> {
        stream_inputs()
    }

    fn outputs(&self) -> Vec<String> {
        port::port_list(&[port::MAIN, port::TIMESTAMP])
    }

    fn is_processing_condition_satisfied(&self, input: &PortBuffers) -> bool {
        Synchronizer::ready(input, false)
    }

    fn process(&mut self, input: &mut PortBuffers) -> PipelineResult<PortBuffers> {
        self.sync.merge(input, &self.naming)
    }
}
