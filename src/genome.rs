//! Individuals: flat parameter vectors bound to a topology.
//!
//! An [`Individual`] never stores its topology. Its arrays are interpreted
//! against the [`Topology`] of the species that owns it: `weights` follows the
//! topology's edge order, while `biases`, `activations` and `node_params`
//! follow node order. Cloning deep-copies every array, so a mutated clone
//! never aliases its parent.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::topology::Topology;

/// A single candidate solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    /// Edge weights, index-aligned to [`Topology::edges`].
    pub weights: Vec<f32>,
    /// Node biases, index-aligned to [`Topology::nodes`]. Input biases are unused.
    pub biases: Vec<f32>,
    /// Per-node activation choice, drawn from each node's allowed set.
    pub activations: Vec<Activation>,
    /// Per-node activation parameter (slope/alpha for parametric kinds).
    pub node_params: Vec<f32>,
    /// Fitness assigned by an evaluator; `None` until evaluated.
    pub fitness: Option<f32>,
}

impl Individual {
    /// Create an individual with all-zero weights and biases and the
    /// topology's initial activations.
    #[must_use]
    pub fn zeroed(topology: &Topology) -> Self {
        Self {
            weights: vec![0.0; topology.edge_count()],
            biases: vec![0.0; topology.node_count()],
            activations: topology.nodes().iter().map(|n| n.activation).collect(),
            node_params: topology.nodes().iter().map(|n| n.param).collect(),
            fitness: None,
        }
    }

    /// Create an individual with Glorot-uniform weights and biases.
    #[must_use]
    pub fn random<R: Rng>(topology: &Topology, rng: &mut R) -> Self {
        let mut individual = Self::zeroed(topology);
        let fan_out = fan_out(topology);
        for (index, edge) in topology.edges().iter().enumerate() {
            let bound = glorot_bound(topology.in_degree(edge.target), fan_out[edge.source]);
            individual.weights[index] = rng.random_range(-bound..bound);
        }
        for node in 0..topology.node_count() {
            let bound = bias_bound(topology, node);
            individual.biases[node] = rng.random_range(-bound..bound);
        }
        individual
    }

    /// Whether an evaluator has assigned a fitness.
    #[inline]
    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    /// Fitness, or negative infinity when unevaluated.
    #[inline]
    #[must_use]
    pub fn fitness_or_min(&self) -> f32 {
        self.fitness.unwrap_or(f32::NEG_INFINITY)
    }

    /// Whether the array lengths agree with `topology`.
    #[must_use]
    pub fn matches(&self, topology: &Topology) -> bool {
        self.weights.len() == topology.edge_count()
            && self.biases.len() == topology.node_count()
            && self.activations.len() == topology.node_count()
            && self.node_params.len() == topology.node_count()
    }

    /// Re-align this individual's parameters from `from` onto `to`.
    ///
    /// Edges present in both topologies keep their weight; new edges get a
    /// fresh Glorot draw. Node arrays are kept when the node count is
    /// unchanged. The result is unevaluated.
    #[must_use]
    pub fn migrate<R: Rng>(&self, from: &Topology, to: &Topology, rng: &mut R) -> Self {
        let mut migrated = if from.node_count() == to.node_count() {
            Self {
                weights: vec![0.0; to.edge_count()],
                biases: self.biases.clone(),
                activations: self.activations.clone(),
                node_params: self.node_params.clone(),
                fitness: None,
            }
        } else {
            Self::random(to, rng)
        };

        let fan_out = fan_out(to);
        for (index, &edge) in to.edges().iter().enumerate() {
            migrated.weights[index] = match from.edge_index(edge) {
                Some(old) if old < self.weights.len() => self.weights[old],
                _ => {
                    let bound = glorot_bound(to.in_degree(edge.target), fan_out[edge.source]);
                    rng.random_range(-bound..bound)
                }
            };
        }
        migrated
    }
}

/// Glorot/Xavier uniform bound `sqrt(6 / (fan_in + fan_out))`.
#[inline]
#[must_use]
pub fn glorot_bound(fan_in: usize, fan_out: usize) -> f32 {
    #[allow(clippy::cast_precision_loss)]
    let denom = (fan_in + fan_out).max(1) as f32;
    (6.0 / denom).sqrt()
}

/// Symmetric range used to initialize and reset a node's bias.
#[inline]
#[must_use]
pub fn bias_bound(topology: &Topology, node: usize) -> f32 {
    glorot_bound(topology.in_degree(node), 1)
}

/// Symmetric range used to initialize and reset an edge's weight.
#[must_use]
pub fn weight_bound(topology: &Topology, edge_index: usize) -> f32 {
    let edge = topology.edges()[edge_index];
    glorot_bound(topology.in_degree(edge.target), topology.out_degree(edge.source))
}

pub(crate) fn fan_out(topology: &Topology) -> Vec<usize> {
    let mut counts = vec![0usize; topology.node_count()];
    for edge in topology.edges() {
        counts[edge.source] += 1;
    }
    counts
}
