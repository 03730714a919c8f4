//! Immutable layered network topology.
//!
//! A [`Topology`] is a directed acyclic graph organized in rows: row 0 holds
//! the inputs, the last row holds the outputs, and every edge points from a
//! strictly earlier row to a strictly later one. Topologies are only produced
//! by [`TopologyBuilder::build`](crate::TopologyBuilder::build) (or by
//! deserialization, which runs the same validation) and never change
//! afterwards; structural mutation yields a new topology.
//!
//! ## Edge order
//!
//! Edges are stored sorted by `(target, source)`. Every individual's weight
//! array is index-aligned to this order, and the incoming edges of a node form
//! one contiguous range, which gives the forward pass a CSR layout for free
//! and a fixed floating-point summation order.

use std::collections::HashSet;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::builder::TopologyError;
use crate::gene::{EdgeGene, NodeGene, NodeRole};
use crate::innovation::topology_fingerprint;

/// Raw, unvalidated topology description used for (de)serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyLayout {
    /// Maximum number of incoming edges per node.
    pub max_in_degree: usize,
    /// Nodes in row order.
    pub nodes: Vec<NodeGene>,
    /// Edges in any order.
    pub edges: Vec<EdgeGene>,
}

/// A validated, immutable layered feed-forward topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "TopologyLayout", try_from = "TopologyLayout")]
pub struct Topology {
    /// Number of nodes in each row.
    row_sizes: Vec<usize>,
    /// Offsets of each row's first node. Length = rows + 1.
    row_offsets: Vec<usize>,
    /// Nodes in row order.
    nodes: Vec<NodeGene>,
    /// Edges sorted by `(target, source)`.
    edges: Vec<EdgeGene>,
    /// CSR offsets into `edges` per target node. Length = nodes + 1.
    incoming_offsets: Vec<usize>,
    /// Maximum in-degree this topology was validated against.
    max_in_degree: usize,
    /// Structural fingerprint of rows and edges.
    fingerprint: u64,
}

impl Topology {
    /// Validate a layout and freeze it into a topology.
    ///
    /// # Errors
    ///
    /// Returns a [`TopologyError`] describing the first violated constraint.
    pub fn from_layout(layout: TopologyLayout) -> Result<Self, TopologyError> {
        let TopologyLayout {
            max_in_degree,
            nodes,
            mut edges,
        } = layout;

        if max_in_degree == 0 {
            return Err(TopologyError::ZeroMaxInDegree);
        }

        let row_sizes = row_sizes_of(&nodes)?;
        if row_sizes.len() < 2 {
            return Err(TopologyError::TooFewRows {
                rows: row_sizes.len(),
            });
        }
        let last_row = row_sizes.len() - 1;

        for (index, node) in nodes.iter().enumerate() {
            let expected = if node.row == 0 {
                NodeRole::Input
            } else if node.row == last_row {
                NodeRole::Output
            } else {
                NodeRole::Hidden
            };
            if node.role != expected {
                return Err(TopologyError::RoleMismatch {
                    node: index,
                    row: node.row,
                    role: node.role,
                });
            }
            if node.role == NodeRole::Input {
                continue;
            }
            if node.allowed.is_empty() {
                return Err(TopologyError::EmptyActivationSet { node: index });
            }
            if node.role == NodeRole::Output {
                if let Some(&bad) = node.allowed.iter().find(|a| !a.is_output_allowed()) {
                    return Err(TopologyError::InvalidOutputActivation {
                        node: index,
                        activation: bad,
                    });
                }
            }
            if !node.allowed.contains(&node.activation) {
                return Err(TopologyError::ActivationNotAllowed {
                    node: index,
                    activation: node.activation,
                });
            }
        }

        let node_count = nodes.len();
        let mut seen = HashSet::with_capacity(edges.len());
        let mut in_degree = vec![0usize; node_count];
        for &edge in &edges {
            if edge.source >= node_count || edge.target >= node_count {
                return Err(TopologyError::NodeOutOfRange {
                    from: edge.source,
                    to: edge.target,
                    node_count,
                });
            }
            let (source_row, target_row) = (nodes[edge.source].row, nodes[edge.target].row);
            if target_row <= source_row {
                return Err(TopologyError::BackwardEdge {
                    from: edge.source,
                    to: edge.target,
                    from_row: source_row,
                    to_row: target_row,
                });
            }
            if !seen.insert(edge) {
                return Err(TopologyError::DuplicateEdge {
                    from: edge.source,
                    to: edge.target,
                });
            }
            in_degree[edge.target] += 1;
            if in_degree[edge.target] > max_in_degree {
                return Err(TopologyError::InDegreeExceeded {
                    node: edge.target,
                    max: max_in_degree,
                });
            }
        }

        edges.sort_by_key(|e| (e.target, e.source));

        let mut incoming_offsets = Vec::with_capacity(node_count + 1);
        incoming_offsets.push(0);
        for &degree in &in_degree {
            let last = incoming_offsets[incoming_offsets.len() - 1];
            incoming_offsets.push(last + degree);
        }

        let mut row_offsets = Vec::with_capacity(row_sizes.len() + 1);
        row_offsets.push(0);
        for &size in &row_sizes {
            let last = row_offsets[row_offsets.len() - 1];
            row_offsets.push(last + size);
        }

        let fingerprint = topology_fingerprint(&row_sizes, &edges);

        Ok(Self {
            row_sizes,
            row_offsets,
            nodes,
            edges,
            incoming_offsets,
            max_in_degree,
            fingerprint,
        })
    }

    /// Build a sibling topology with the same nodes and a different edge set.
    ///
    /// # Errors
    ///
    /// Returns a [`TopologyError`] if the new edge set violates any constraint.
    pub fn with_edges(&self, edges: Vec<EdgeGene>) -> Result<Self, TopologyError> {
        Self::from_layout(TopologyLayout {
            max_in_degree: self.max_in_degree,
            nodes: self.nodes.clone(),
            edges,
        })
    }

    /// Number of rows (including input and output rows).
    #[inline]
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.row_sizes.len()
    }

    /// Number of nodes in each row.
    #[inline]
    #[must_use]
    pub fn row_sizes(&self) -> &[usize] {
        &self.row_sizes
    }

    /// Node indices of a row.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    #[inline]
    #[must_use]
    pub fn row_range(&self, row: usize) -> Range<usize> {
        self.row_offsets[row]..self.row_offsets[row + 1]
    }

    /// Node indices of the input row.
    #[inline]
    #[must_use]
    pub fn input_range(&self) -> Range<usize> {
        self.row_range(0)
    }

    /// Node indices of the output row.
    #[inline]
    #[must_use]
    pub fn output_range(&self) -> Range<usize> {
        self.row_range(self.row_count() - 1)
    }

    /// Number of input nodes.
    #[inline]
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.row_sizes[0]
    }

    /// Number of output nodes.
    #[inline]
    #[must_use]
    pub fn output_count(&self) -> usize {
        self.row_sizes[self.row_sizes.len() - 1]
    }

    /// Total number of nodes.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of edges.
    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All nodes in row order.
    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &[NodeGene] {
        &self.nodes
    }

    /// A single node.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    #[must_use]
    pub fn node(&self, index: usize) -> &NodeGene {
        &self.nodes[index]
    }

    /// All edges, in weight-alignment order.
    #[inline]
    #[must_use]
    pub fn edges(&self) -> &[EdgeGene] {
        &self.edges
    }

    /// Edge indices (into [`edges`](Self::edges)) that target `node`.
    #[inline]
    #[must_use]
    pub fn incoming(&self, node: usize) -> Range<usize> {
        self.incoming_offsets[node]..self.incoming_offsets[node + 1]
    }

    /// Number of edges targeting `node`.
    #[inline]
    #[must_use]
    pub fn in_degree(&self, node: usize) -> usize {
        self.incoming_offsets[node + 1] - self.incoming_offsets[node]
    }

    /// Number of edges leaving `node`.
    #[must_use]
    pub fn out_degree(&self, node: usize) -> usize {
        self.edges.iter().filter(|e| e.source == node).count()
    }

    /// Index of an edge in weight-alignment order, if present.
    #[must_use]
    pub fn edge_index(&self, edge: EdgeGene) -> Option<usize> {
        let range = self.incoming(edge.target);
        self.edges[range.clone()]
            .binary_search_by_key(&edge.source, |e| e.source)
            .ok()
            .map(|offset| range.start + offset)
    }

    /// Maximum in-degree this topology was validated against.
    #[inline]
    #[must_use]
    pub fn max_in_degree(&self) -> usize {
        self.max_in_degree
    }

    /// Structural fingerprint; identical wiring yields identical fingerprints.
    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

impl From<Topology> for TopologyLayout {
    fn from(topology: Topology) -> Self {
        Self {
            max_in_degree: topology.max_in_degree,
            nodes: topology.nodes,
            edges: topology.edges,
        }
    }
}

impl TryFrom<TopologyLayout> for Topology {
    type Error = TopologyError;

    fn try_from(layout: TopologyLayout) -> Result<Self, Self::Error> {
        Self::from_layout(layout)
    }
}

/// Derive row sizes from nodes listed in row order.
fn row_sizes_of(nodes: &[NodeGene]) -> Result<Vec<usize>, TopologyError> {
    let mut sizes: Vec<usize> = Vec::new();
    for (index, node) in nodes.iter().enumerate() {
        if node.row == sizes.len() {
            sizes.push(1);
        } else if node.row + 1 == sizes.len() {
            let last = sizes.len() - 1;
            sizes[last] += 1;
        } else if node.row < sizes.len() {
            return Err(TopologyError::NodesOutOfRowOrder { node: index });
        } else {
            // Skipped a row index entirely.
            return Err(TopologyError::EmptyRow { row: sizes.len() });
        }
    }
    Ok(sizes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::builder::TopologyBuilder;

    fn xor_topology() -> Topology {
        TopologyBuilder::new()
            .add_input_row(2)
            .add_hidden_row(4, &Activation::ALL)
            .add_output_row(1, &[Activation::Tanh])
            .fully_connect_layers()
            .build()
            .expect("valid topology")
    }

    #[test]
    fn test_topology_basic() {
        let topo = xor_topology();

        assert_eq!(topo.row_count(), 3);
        assert_eq!(topo.node_count(), 7);
        assert_eq!(topo.edge_count(), 2 * 4 + 4);
        assert_eq!(topo.input_range(), 0..2);
        assert_eq!(topo.output_range(), 6..7);
        assert_eq!(topo.input_count(), 2);
        assert_eq!(topo.output_count(), 1);
    }

    #[test]
    fn test_incoming_ranges_are_contiguous() {
        let topo = xor_topology();

        for node in 0..topo.node_count() {
            for edge_index in topo.incoming(node) {
                assert_eq!(topo.edges()[edge_index].target, node);
            }
        }
        assert_eq!(topo.in_degree(0), 0);
        assert_eq!(topo.in_degree(2), 2);
        assert_eq!(topo.in_degree(6), 4);
        assert_eq!(topo.out_degree(0), 4);
    }

    #[test]
    fn test_edge_index_lookup() {
        let topo = xor_topology();

        for (index, &edge) in topo.edges().iter().enumerate() {
            assert_eq!(topo.edge_index(edge), Some(index));
        }
        assert_eq!(topo.edge_index(EdgeGene::new(0, 6)), None);
    }

    #[test]
    fn test_fingerprint_matches_for_identical_builds() {
        assert_eq!(xor_topology().fingerprint(), xor_topology().fingerprint());
    }

    #[test]
    fn test_with_edges_revalidates() {
        let topo = xor_topology();
        let backward = vec![EdgeGene::new(6, 2)];
        assert!(matches!(
            topo.with_edges(backward),
            Err(TopologyError::BackwardEdge { .. })
        ));

        let sparse = topo.with_edges(vec![EdgeGene::new(0, 6)]).unwrap();
        assert_eq!(sparse.edge_count(), 1);
        assert_eq!(sparse.node_count(), topo.node_count());
    }

    #[test]
    fn test_serde_roundtrip_revalidates() {
        let topo = xor_topology();
        let json = serde_json::to_string(&topo).expect("serialize");
        let restored: Topology = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(topo, restored);

        let mut layout: TopologyLayout = topo.into();
        layout.edges.push(EdgeGene::new(6, 0));
        let json = serde_json::to_string(&layout).unwrap();
        assert!(serde_json::from_str::<Topology>(&json).is_err());
    }
}
