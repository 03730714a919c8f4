//! Node and edge descriptors for layered topologies.
//!
//! This module defines the fixed building blocks a [`Topology`](crate::Topology)
//! is made of:
//! - [`NodeGene`]: a node's row, role, and allowed activation set
//! - [`EdgeGene`]: a directed connection between two node indices

use serde::{Deserialize, Serialize};

use crate::activation::Activation;

/// The role of a node, determined by the row it sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Input node - receives observation values, no bias or activation applied.
    Input,
    /// Hidden node - any row strictly between the input and output rows.
    Hidden,
    /// Output node - produces the network's action values.
    Output,
}

/// A node in a layered topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeGene {
    /// Index of the row this node belongs to (0 = input row).
    pub row: usize,
    /// The role of this node.
    pub role: NodeRole,
    /// Activation assigned to freshly initialized individuals.
    pub activation: Activation,
    /// Scalar parameter for parametric activations.
    pub param: f32,
    /// Activations this node may take under mutation. Empty for input nodes.
    pub allowed: Vec<Activation>,
}

impl NodeGene {
    /// Create a new input node.
    #[must_use]
    pub fn input(row: usize) -> Self {
        Self {
            row,
            role: NodeRole::Input,
            activation: Activation::Linear,
            param: 0.0,
            allowed: Vec::new(),
        }
    }

    /// Create a hidden or output node whose initial activation is the first
    /// entry of `allowed`.
    #[must_use]
    pub fn computed(row: usize, role: NodeRole, allowed: Vec<Activation>) -> Self {
        let activation = allowed.first().copied().unwrap_or_default();
        Self {
            row,
            role,
            activation,
            param: activation.default_param(),
            allowed,
        }
    }

    /// Whether this node may switch between more than one activation.
    #[inline]
    #[must_use]
    pub fn can_swap_activation(&self) -> bool {
        self.allowed.len() > 1
    }
}

/// A directed edge between two node indices.
///
/// Edge order inside a topology defines the index alignment of every
/// individual's weight array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeGene {
    /// Source node index.
    pub source: usize,
    /// Target node index.
    pub target: usize,
}

impl EdgeGene {
    /// Create a new edge.
    #[must_use]
    pub const fn new(source: usize, target: usize) -> Self {
        Self { source, target }
    }
}
