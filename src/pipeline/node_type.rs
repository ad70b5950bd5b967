//! Node categories.
//!
//! Every node belongs to one of a small closed set of categories. The
//! category decides the node's readiness semantics and which buffer
//! options it accepts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Behavioural category of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Produces data on driver ticks, has no inputs.
    Generator,
    /// Transforms buffered input into output.
    Processing,
    /// Consumes data, never emits.
    Output,
    /// Forwards `signal` to `main` while a condition holds.
    Gate,
    /// Accumulates a training set, then predicts.
    Trainable,
}

impl NodeCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            NodeCategory::Generator => "Generator",
            NodeCategory::Processing => "Processing",
            NodeCategory::Output => "Output",
            NodeCategory::Gate => "Gate",
            NodeCategory::Trainable => "Trainable",
        }
    }

    pub fn all() -> &'static [NodeCategory] {
        &[
            NodeCategory::Generator,
            NodeCategory::Processing,
            NodeCategory::Output,
            NodeCategory::Gate,
            NodeCategory::Trainable,
        ]
    }

    /// Check if nodes of this category ever fan out to children.
    pub fn can_emit(&self) -> bool {
        !matches!(self, NodeCategory::Output)
    }

    /// Check if nodes of this category accept deliveries.
    pub fn accepts_input(&self) -> bool {
        !matches!(self, NodeCategory::Generator)
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_capabilities() {
        assert!(!NodeCategory::Generator.accepts_input());
        assert!(NodeCategory::Generator.can_emit());
        assert!(!NodeCategory::Output.can_emit());
        assert!(NodeCategory::all().iter().filter(|c| c.accepts_input()).count() == 4);
    }
}
