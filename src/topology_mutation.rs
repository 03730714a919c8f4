//! Structural mutation: operators that derive a new [`Topology`] from an
//! existing one.
//!
//! Topologies are immutable, so every operator works on a copy of the parent's
//! edge list and re-validates the result through [`Topology::with_edges`].
//! Operators visit candidates in random order and only give up once no legal
//! move exists, in which case they return `None` and the caller keeps the
//! parent unchanged.
//!
//! These operators only run when a species is replaced (and when weak-edge
//! pruning is enabled); offspring inside a species always inherit their
//! parent's exact topology.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{check_probability, ConfigError, WeakEdgePruning};
use crate::gene::{EdgeGene, NodeRole};
use crate::genome::Individual;
use crate::topology::Topology;

/// Probabilities of each structural operator firing once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyMutationRates {
    /// Add a new forward edge.
    pub edge_add: f32,
    /// Delete a random edge whose target keeps at least one input.
    pub edge_delete_random: f32,
    /// Route an edge through a node in an intermediate row.
    pub edge_split: f32,
    /// Move an edge to a new source.
    pub edge_redirect: f32,
    /// Exchange the sources of two edges.
    pub edge_swap: f32,
}

impl Default for TopologyMutationRates {
    fn default() -> Self {
        Self {
            edge_add: 0.5,
            edge_delete_random: 0.2,
            edge_split: 0.2,
            edge_redirect: 0.2,
            edge_swap: 0.1,
        }
    }
}

impl TopologyMutationRates {
    /// Rates that never change a topology.
    #[must_use]
    pub fn none() -> Self {
        Self {
            edge_add: 0.0,
            edge_delete_random: 0.0,
            edge_split: 0.0,
            edge_redirect: 0.0,
            edge_swap: 0.0,
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for a probability outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability("edge_add", self.edge_add)?;
        check_probability("edge_delete_random", self.edge_delete_random)?;
        check_probability("edge_split", self.edge_split)?;
        check_probability("edge_redirect", self.edge_redirect)?;
        check_probability("edge_swap", self.edge_swap)?;
        Ok(())
    }
}

#[inline]
fn row_of(topology: &Topology, node: usize) -> usize {
    topology.node(node).row
}

/// Indices `0..len` in random order.
fn shuffled<R: Rng>(len: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    order
}

#[inline]
fn pick<T: Copy, R: Rng>(items: &[T], rng: &mut R) -> T {
    items[rng.random_range(0..items.len())]
}

/// Add one new edge between nodes in different rows.
#[must_use]
pub fn add_edge<R: Rng>(topology: &Topology, rng: &mut R) -> Option<Topology> {
    let first_target = topology.input_count();
    for offset in shuffled(topology.node_count() - first_target, rng) {
        let target = first_target + offset;
        if topology.in_degree(target) >= topology.max_in_degree() {
            continue;
        }
        // Every node before the target's row is a legal source.
        let sources_end = topology.row_range(row_of(topology, target)).start;
        let sources: Vec<usize> = (0..sources_end)
            .filter(|&s| topology.edge_index(EdgeGene::new(s, target)).is_none())
            .collect();
        if sources.is_empty() {
            continue;
        }

        let mut edges = topology.edges().to_vec();
        edges.push(EdgeGene::new(pick(&sources, rng), target));
        return topology.with_edges(edges).ok();
    }
    None
}

/// Delete one edge, never leaving a non-input node without inputs.
#[must_use]
pub fn delete_random_edge<R: Rng>(topology: &Topology, rng: &mut R) -> Option<Topology> {
    let candidates: Vec<usize> = topology
        .edges()
        .iter()
        .enumerate()
        .filter(|(_, e)| topology.in_degree(e.target) > 1)
        .map(|(i, _)| i)
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let mut edges = topology.edges().to_vec();
    edges.remove(pick(&candidates, rng));
    topology.with_edges(edges).ok()
}

/// Replace an edge `s -> t` with `s -> m -> t` for a node `m` in a row
/// strictly between the rows of `s` and `t`.
#[must_use]
pub fn split_edge<R: Rng>(topology: &Topology, rng: &mut R) -> Option<Topology> {
    for index in shuffled(topology.edge_count(), rng) {
        let edge = topology.edges()[index];
        let source_row = row_of(topology, edge.source);
        let target_row = row_of(topology, edge.target);
        if target_row <= source_row + 1 {
            continue;
        }

        let lo = topology.row_range(source_row + 1).start;
        let hi = topology.row_range(target_row).start;
        let middles: Vec<usize> = (lo..hi)
            .filter(|&m| {
                topology.edge_index(EdgeGene::new(edge.source, m)).is_none()
                    || topology.edge_index(EdgeGene::new(m, edge.target)).is_none()
            })
            .collect();
        if middles.is_empty() {
            continue;
        }

        let middle = pick(&middles, rng);
        let mut edges: Vec<EdgeGene> = topology
            .edges()
            .iter()
            .copied()
            .filter(|&e| e != edge)
            .collect();
        for new_edge in [
            EdgeGene::new(edge.source, middle),
            EdgeGene::new(middle, edge.target),
        ] {
            if topology.edge_index(new_edge).is_none() {
                edges.push(new_edge);
            }
        }
        if let Ok(next) = topology.with_edges(edges) {
            return Some(next);
        }
    }
    None
}

/// Move one edge to a different source in an earlier row than its target.
#[must_use]
pub fn redirect_edge<R: Rng>(topology: &Topology, rng: &mut R) -> Option<Topology> {
    for index in shuffled(topology.edge_count(), rng) {
        let edge = topology.edges()[index];
        let sources_end = topology.row_range(row_of(topology, edge.target)).start;
        let sources: Vec<usize> = (0..sources_end)
            .filter(|&s| topology.edge_index(EdgeGene::new(s, edge.target)).is_none())
            .collect();
        if sources.is_empty() {
            continue;
        }

        let mut edges = topology.edges().to_vec();
        edges[index] = EdgeGene::new(pick(&sources, rng), edge.target);
        return topology.with_edges(edges).ok();
    }
    None
}

/// Exchange the sources of two edges: `a -> x, b -> y` becomes
/// `b -> x, a -> y`.
#[must_use]
pub fn swap_edges<R: Rng>(topology: &Topology, rng: &mut R) -> Option<Topology> {
    let edges = topology.edges();
    let legal = |e: EdgeGene| {
        row_of(topology, e.source) < row_of(topology, e.target) && topology.edge_index(e).is_none()
    };

    for i in shuffled(edges.len(), rng) {
        let first = edges[i];
        let partners: Vec<usize> = (0..edges.len())
            .filter(|&j| {
                let second = edges[j];
                first.source != second.source
                    && first.target != second.target
                    && legal(EdgeGene::new(second.source, first.target))
                    && legal(EdgeGene::new(first.source, second.target))
            })
            .collect();
        if partners.is_empty() {
            continue;
        }

        let j = pick(&partners, rng);
        let second = edges[j];
        let mut next = edges.to_vec();
        next[i] = EdgeGene::new(second.source, first.target);
        next[j] = EdgeGene::new(first.source, second.target);
        return topology.with_edges(next).ok();
    }
    None
}

/// Apply each structural operator once with its configured probability.
///
/// Operators chain: each one sees the result of the previous. When nothing
/// fires (or nothing is legal) the result equals `parent`.
#[must_use]
pub fn mutate_topology<R: Rng>(
    parent: &Topology,
    rates: &TopologyMutationRates,
    rng: &mut R,
) -> Topology {
    type Operator<R> = fn(&Topology, &mut R) -> Option<Topology>;
    let operators: [(f32, Operator<R>); 5] = [
        (rates.edge_add, add_edge::<R>),
        (rates.edge_delete_random, delete_random_edge::<R>),
        (rates.edge_split, split_edge::<R>),
        (rates.edge_redirect, redirect_edge::<R>),
        (rates.edge_swap, swap_edges::<R>),
    ];

    let mut current = parent.clone();
    for (probability, operator) in operators {
        if rng.random::<f32>() < probability {
            if let Some(next) = operator(&current, rng) {
                current = next;
            }
        }
    }
    current
}

/// Remove edges whose mean absolute weight across `individuals` is below the
/// pruning threshold, each with probability `base_rate`.
///
/// Returns `None` when pruning is disabled, no edge qualifies, or no
/// qualifying edge was drawn. A non-input node never loses its last input.
#[must_use]
pub fn prune_weak_edges<R: Rng>(
    topology: &Topology,
    individuals: &[Individual],
    pruning: &WeakEdgePruning,
    rng: &mut R,
) -> Option<Topology> {
    if !pruning.enabled || individuals.is_empty() {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let count = individuals.len() as f32;
    let mut in_degree: Vec<usize> = (0..topology.node_count())
        .map(|n| topology.in_degree(n))
        .collect();
    let mut kept = Vec::with_capacity(topology.edge_count());
    let mut removed = 0usize;

    for (index, &edge) in topology.edges().iter().enumerate() {
        let mean_magnitude = individuals
            .iter()
            .map(|ind| ind.weights.get(index).map_or(0.0, |w| w.abs()))
            .sum::<f32>()
            / count;
        let removable = topology.node(edge.target).role != NodeRole::Input
            && in_degree[edge.target] > 1;
        if mean_magnitude < pruning.threshold
            && removable
            && rng.random::<f32>() < pruning.base_rate
        {
            in_degree[edge.target] -= 1;
            removed += 1;
        } else {
            kept.push(edge);
        }
    }

    if removed == 0 {
        return None;
    }
    topology.with_edges(kept).ok()
}
