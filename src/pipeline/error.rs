//! Pipeline-specific error types.
//!
//! Build-time problems (`ConfigError`, `WiringError`) abort graph
//! construction. Everything else surfaces at runtime, either from a root
//! tick on the driver thread or from a node's own worker.

use thiserror::Error;

/// Whether a configuration field was absent or present but unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    Missing,
    Invalid,
}

/// Malformed node configuration, detected before any node state exists.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("node '{node}': missing required field '{field}'")]
    Missing { node: String, field: String },

    #[error("node '{node}': invalid field '{field}': {reason}")]
    Invalid {
        node: String,
        field: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn missing(node: impl Into<String>, field: impl Into<String>) -> Self {
        ConfigError::Missing {
            node: node.into(),
            field: field.into(),
        }
    }

    pub fn invalid(
        node: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::Invalid {
            node: node.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ConfigErrorKind {
        match self {
            ConfigError::Missing { .. } => ConfigErrorKind::Missing,
            ConfigError::Invalid { .. } => ConfigErrorKind::Invalid,
        }
    }

    /// Name of the node the error refers to.
    pub fn node(&self) -> &str {
        match self {
            ConfigError::Missing { node, .. } | ConfigError::Invalid { node, .. } => node,
        }
    }

    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ConfigError::Missing { field, .. } | ConfigError::Invalid { field, .. } => field,
        }
    }
}

/// Edge problems found while wiring the graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WiringError {
    #[error("node '{from}' targets unknown node '{target}'")]
    UnknownNode { from: String, target: String },

    #[error("node '{node}' has no input port '{input}'")]
    UnknownInput { node: String, input: String },

    #[error("node '{node}' has no output port '{output}'")]
    UnknownOutput { node: String, output: String },

    #[error("duplicate edge {from}.{output} -> {to}.{input}")]
    DuplicateEdge {
        from: String,
        output: String,
        to: String,
        input: String,
    },
}

/// Errors that can occur within the pipeline system.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Wiring(#[from] WiringError),

    #[error("Data incompatibility: {0}")]
    DataIncompatibility(String),

    #[error("Device I/O error in node '{node}' ({module}): {message}")]
    DeviceIo {
        node: String,
        module: String,
        message: String,
    },

    #[error("Script error: {0}")]
    Script(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Node '{0}' has been disposed")]
    NodeDisposed(String),

    #[error("Node '{node}' panicked at {location}: {message}")]
    Panicked {
        node: String,
        message: String,
        location: String,
        backtrace: String,
    },

    #[error("Node '{0}' state lock poisoned")]
    Poisoned(String),

    #[error("Failed to spawn worker for node '{node}': {source}")]
    Spawn {
        node: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Shorthand for a runtime shape/label mismatch.
    pub fn incompatible(message: impl Into<String>) -> Self {
        PipelineError::DataIncompatibility(message.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a script error from a Rhai error
    pub fn from_rhai_error(err: Box<rhai::EvalAltResult>) -> Self {
        PipelineError::Script(err.to_string())
    }

    /// Backtrace captured where a node panicked, if this error is one.
    pub fn panic_backtrace(&self) -> Option<&str> {
        match self.root_cause() {
            PipelineError::Panicked { backtrace, .. } => Some(backtrace),
            _ => None,
        }
    }

    /// Innermost error, skipping context wrappers.
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            PipelineError::WithContext { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_accessors() {
        let err = ConfigError::missing("window", "window_size");
        assert_eq!(err.kind(), ConfigErrorKind::Missing);
        assert_eq!(err.node(), "window");
        assert_eq!(err.field(), "window_size");
        assert_eq!(
            err.to_string(),
            "node 'window': missing required field 'window_size'"
        );

        let err = ConfigError::invalid("gate", "condition", "parse error");
        assert_eq!(err.kind(), ConfigErrorKind::Invalid);
        assert!(err.to_string().contains("parse error"));
    }

    #[test]
    fn test_wiring_error_display() {
        let err = WiringError::DuplicateEdge {
            from: "src".into(),
            output: "main".into(),
            to: "sink".into(),
            input: "main".into(),
        };
        assert_eq!(err.to_string(), "duplicate edge src.main -> sink.main");
    }

    #[test]
    fn test_root_cause_skips_context() {
        let err = PipelineError::incompatible("channel mismatch")
            .with_context("extend")
            .with_context("node 'window'");
        assert!(err.to_string().starts_with("node 'window'"));
        assert!(matches!(
            err.root_cause(),
            PipelineError::DataIncompatibility(_)
        ));
    }
}
