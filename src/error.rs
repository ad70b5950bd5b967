//! Error handling for the neuroflow application layer
//!
//! Pipeline internals use `pipeline::error::PipelineError`. This type covers
//! everything around them: loading configuration files, serialisation and
//! building or driving a graph.

use crate::pipeline::error::{ConfigError, PipelineError};
use thiserror::Error;

/// Main error type for neuroflow operations
#[derive(Error, Debug)]
pub enum NeuroflowError {
    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed node configuration
    #[error(transparent)]
    NodeConfig(#[from] ConfigError),

    /// Errors raised by the pipeline
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<NeuroflowError>,
    },
}

impl NeuroflowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        NeuroflowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for neuroflow operations
pub type Result<T> = std::result::Result<T, NeuroflowError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| NeuroflowError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| NeuroflowError::from(e).with_context(f()))
    }
}
