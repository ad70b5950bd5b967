//! Per-node buffer-clearing flags.
//!
//! Each category recognises a fixed set of flags. Required flags must be
//! present in the node's `buffer_options` table; unknown keys are rejected so
//! a typo never silently falls back to a default.

use crate::pipeline::error::ConfigError;
use crate::pipeline::node_type::NodeCategory;
use std::collections::BTreeMap;

pub const CLEAR_OUTPUT_BUFFER_ON_GENERATE: &str = "clear_output_buffer_on_generate";
pub const CLEAR_OUTPUT_BUFFER_ON_DATA_INPUT: &str = "clear_output_buffer_on_data_input";
pub const CLEAR_INPUT_BUFFER_AFTER_PROCESS: &str = "clear_input_buffer_after_process";
pub const CLEAR_OUTPUT_BUFFER_AFTER_PROCESS: &str = "clear_output_buffer_after_process";
pub const CLEAR_INPUT_BUFFER_IF_CONDITION_NOT_MET: &str = "clear_input_buffer_if_condition_not_met";
pub const CLEAR_INPUT_BUFFER_IF_CONDITION_MET: &str = "clear_input_buffer_if_condition_met";

const PROCESSING_FLAGS: &[&str] = &[
    CLEAR_OUTPUT_BUFFER_ON_DATA_INPUT,
    CLEAR_INPUT_BUFFER_AFTER_PROCESS,
    CLEAR_OUTPUT_BUFFER_AFTER_PROCESS,
];

/// Resolved clearing behaviour for one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferOptions {
    pub clear_output_buffer_on_generate: bool,
    pub clear_output_buffer_on_data_input: bool,
    pub clear_input_buffer_after_process: bool,
    pub clear_output_buffer_after_process: bool,
    pub clear_input_buffer_if_condition_not_met: bool,
    pub clear_input_buffer_if_condition_met: bool,
}

impl BufferOptions {
    /// Flags a category must have configured.
    pub fn required_flags(category: NodeCategory) -> &'static [&'static str] {
        match category {
            NodeCategory::Generator => &[CLEAR_OUTPUT_BUFFER_ON_GENERATE],
            _ => PROCESSING_FLAGS,
        }
    }

    /// Flags a category accepts but does not require.
    pub fn optional_flags(category: NodeCategory) -> &'static [&'static str] {
        match category {
            NodeCategory::Gate => &[
                CLEAR_INPUT_BUFFER_IF_CONDITION_NOT_MET,
                CLEAR_INPUT_BUFFER_IF_CONDITION_MET,
            ],
            _ => &[],
        }
    }

    /// Validate a raw `buffer_options` table for `category`.
    pub fn from_table(
        node: &str,
        category: NodeCategory,
        table: &BTreeMap<String, toml::Value>,
    ) -> Result<Self, ConfigError> {
        let required = Self::required_flags(category);
        let optional = Self::optional_flags(category);

        for key in table.keys() {
            if !required.contains(&key.as_str()) && !optional.contains(&key.as_str()) {
                return Err(ConfigError::invalid(
                    node,
                    format!("buffer_options.{}", key),
                    format!("not recognised for {} nodes", category),
                ));
            }
        }

        let mut options = BufferOptions::default();
        for flag in required.iter().chain(optional) {
            let value = match table.get(*flag) {
                Some(toml::Value::Boolean(b)) => *b,
                Some(other) => {
                    return Err(ConfigError::invalid(
                        node,
                        format!("buffer_options.{}", flag),
                        format!("expected a boolean, got {}", other.type_str()),
                    ))
                }
                None if required.contains(flag) => {
                    return Err(ConfigError::missing(node, format!("buffer_options.{}", flag)))
                }
                None => false,
            };
            options.set(flag, value);
        }
        Ok(options)
    }

    fn set(&mut self, flag: &str, value: bool) {
        match flag {
            CLEAR_OUTPUT_BUFFER_ON_GENERATE => self.clear_output_buffer_on_generate = value,
            CLEAR_OUTPUT_BUFFER_ON_DATA_INPUT => self.clear_output_buffer_on_data_input = value,
            CLEAR_INPUT_BUFFER_AFTER_PROCESS => self.clear_input_buffer_after_process = value,
            CLEAR_OUTPUT_BUFFER_AFTER_PROCESS => self.clear_output_buffer_after_process = value,
            CLEAR_INPUT_BUFFER_IF_CONDITION_NOT_MET => {
                self.clear_input_buffer_if_condition_not_met = value
            }
            CLEAR_INPUT_BUFFER_IF_CONDITION_MET => {
                self.clear_input_buffer_if_condition_met = value
            }
            _ => {}
        }
    }
}
