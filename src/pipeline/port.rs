//! Well-known port names shared by the built-in nodes.
//!
//! Ports are plain strings so that user-registered nodes can declare any
//! name they like. The constants below are the ones the engine and the
//! built-in collaborators agree on.

/// Default data output (and input) of most nodes.
pub const MAIN: &str = "main";
/// Single-channel timestamps in seconds, aligned with `main`.
pub const TIMESTAMP: &str = "timestamp";

/// Gate ports.
pub const CONDITION: &str = "condition";
pub const SIGNAL: &str = "signal";

/// Trainable node ports.
pub const DATA: &str = "data";
pub const LABEL: &str = "label";

/// Synchronizer ports.
pub const MASTER_MAIN: &str = "master_main";
pub const MASTER_TIMESTAMP: &str = "master_timestamp";
pub const SLAVE_MAIN: &str = "slave_main";
pub const SLAVE_TIMESTAMP: &str = "slave_timestamp";

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// Owned list of port names, checked in declaration order.
pub fn port_list(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| (*n).to_string()).collect()
}
