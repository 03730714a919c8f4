//! Incremental construction of validated topologies.
//!
//! Rows are declared first (input, hidden..., output), then edges, either
//! explicitly or through the generators. Generators run immediately against
//! the rows declared so far and are deterministic for a given random source.
//! Nothing is validated until [`TopologyBuilder::build`].
//!
//! ```rust
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//! use symbios_evolvion::{Activation, TopologyBuilder};
//!
//! let mut rng = ChaCha8Rng::seed_from_u64(7);
//! let topology = TopologyBuilder::new()
//!     .with_max_in_degree(3)
//!     .add_input_row(4)
//!     .add_hidden_row(6, &Activation::ALL)
//!     .add_output_row(2, &Activation::OUTPUT)
//!     .dense(&mut rng)
//!     .build()
//!     .unwrap();
//! assert!(topology.edges().iter().all(|e| topology.in_degree(e.target) <= 3));
//! ```

use rand::seq::index::sample;
use rand::Rng;
use thiserror::Error;

use crate::activation::Activation;
use crate::gene::{EdgeGene, NodeGene, NodeRole};
use crate::topology::{Topology, TopologyLayout};

/// Default cap on incoming edges per node.
pub const DEFAULT_MAX_IN_DEGREE: usize = 16;

/// Reasons a topology fails validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    /// A declared row has no nodes.
    #[error("row {row} has zero nodes")]
    EmptyRow {
        /// The offending row index.
        row: usize,
    },
    /// Fewer than an input row and an output row were declared.
    #[error("topology needs at least an input and an output row, got {rows} row(s)")]
    TooFewRows {
        /// Number of rows declared.
        rows: usize,
    },
    /// A row was declared out of place (input not first, output not last).
    #[error("row {row} declared as {role:?} is out of place")]
    MisplacedRow {
        /// The offending row index.
        row: usize,
        /// The role it was declared with.
        role: NodeRole,
    },
    /// A node's role does not match the row it sits in.
    #[error("node {node} in row {row} has role {role:?}")]
    RoleMismatch {
        /// The offending node index.
        node: usize,
        /// Its row.
        row: usize,
        /// Its declared role.
        role: NodeRole,
    },
    /// Nodes are not listed in row order.
    #[error("node {node} is listed out of row order")]
    NodesOutOfRowOrder {
        /// The offending node index.
        node: usize,
    },
    /// A hidden or output node has no allowed activations.
    #[error("node {node} has an empty activation set")]
    EmptyActivationSet {
        /// The offending node index.
        node: usize,
    },
    /// An output node allows an activation other than Linear or Tanh.
    #[error("output node {node} cannot use {activation:?}; outputs are restricted to Linear or Tanh")]
    InvalidOutputActivation {
        /// The offending node index.
        node: usize,
        /// The rejected activation.
        activation: Activation,
    },
    /// A node's initial activation is outside its allowed set.
    #[error("node {node} starts with {activation:?}, which is not in its allowed set")]
    ActivationNotAllowed {
        /// The offending node index.
        node: usize,
        /// The rejected activation.
        activation: Activation,
    },
    /// An edge references a node index that does not exist.
    #[error("edge {from} -> {to} references a node outside 0..{node_count}")]
    NodeOutOfRange {
        /// Edge source.
        from: usize,
        /// Edge target.
        to: usize,
        /// Number of nodes in the topology.
        node_count: usize,
    },
    /// An edge targets its own or an earlier row.
    #[error("edge {from} -> {to} goes from row {from_row} to row {to_row}; edges must point to a later row")]
    BackwardEdge {
        /// Edge source.
        from: usize,
        /// Edge target.
        to: usize,
        /// Row of the source node.
        from_row: usize,
        /// Row of the target node.
        to_row: usize,
    },
    /// The same edge was declared twice.
    #[error("edge {from} -> {to} declared more than once")]
    DuplicateEdge {
        /// Edge source.
        from: usize,
        /// Edge target.
        to: usize,
    },
    /// A node has more incoming edges than allowed.
    #[error("node {node} exceeds the maximum in-degree of {max}")]
    InDegreeExceeded {
        /// The offending node index.
        node: usize,
        /// The configured maximum.
        max: usize,
    },
    /// The maximum in-degree was configured as zero.
    #[error("maximum in-degree must be at least 1")]
    ZeroMaxInDegree,
    /// A row index passed to a generator does not exist.
    #[error("row {row} does not exist")]
    UnknownRow {
        /// The requested row.
        row: usize,
    },
    /// Sparse generation was requested with a density outside `(0, 1]`.
    #[error("sparse density {density} must lie in (0, 1]")]
    InvalidDensity {
        /// The rejected density.
        density: f32,
    },
}

/// A row declaration awaiting [`TopologyBuilder::build`].
#[derive(Debug, Clone)]
struct RowDecl {
    role: NodeRole,
    size: usize,
    allowed: Vec<Activation>,
}

/// Builder for [`Topology`].
#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    rows: Vec<RowDecl>,
    edges: Vec<EdgeGene>,
    max_in_degree: usize,
    /// First error raised by a generator, surfaced at build time.
    deferred: Option<TopologyError>,
}

impl Default for TopologyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyBuilder {
    /// Create an empty builder with [`DEFAULT_MAX_IN_DEGREE`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            edges: Vec::new(),
            max_in_degree: DEFAULT_MAX_IN_DEGREE,
            deferred: None,
        }
    }

    /// Set the maximum number of incoming edges per node.
    ///
    /// Generators invoked after this call respect the cap.
    #[must_use]
    pub fn with_max_in_degree(mut self, max_in_degree: usize) -> Self {
        self.max_in_degree = max_in_degree;
        self
    }

    /// Declare the input row.
    #[must_use]
    pub fn add_input_row(mut self, size: usize) -> Self {
        self.rows.push(RowDecl {
            role: NodeRole::Input,
            size,
            allowed: Vec::new(),
        });
        self
    }

    /// Declare a hidden row whose nodes may use any of `allowed`.
    #[must_use]
    pub fn add_hidden_row(mut self, size: usize, allowed: &[Activation]) -> Self {
        self.rows.push(RowDecl {
            role: NodeRole::Hidden,
            size,
            allowed: allowed.to_vec(),
        });
        self
    }

    /// Declare the output row whose nodes may use any of `allowed`.
    #[must_use]
    pub fn add_output_row(mut self, size: usize, allowed: &[Activation]) -> Self {
        self.rows.push(RowDecl {
            role: NodeRole::Output,
            size,
            allowed: allowed.to_vec(),
        });
        self
    }

    /// Add an explicit edge between two node indices.
    #[must_use]
    pub fn add_edge(mut self, source: usize, target: usize) -> Self {
        self.edges.push(EdgeGene::new(source, target));
        self
    }

    /// Connect every node of `from_row` to every node of `to_row`.
    ///
    /// The in-degree cap is not applied here; an overflow fails at build.
    #[must_use]
    pub fn fully_connect(mut self, from_row: usize, to_row: usize) -> Self {
        let (Some(sources), Some(targets)) = (self.row_nodes(from_row), self.row_nodes(to_row))
        else {
            let row = if self.row_nodes(from_row).is_none() {
                from_row
            } else {
                to_row
            };
            self.defer(TopologyError::UnknownRow { row });
            return self;
        };
        for target in targets {
            for source in sources.clone() {
                self.push_generated(EdgeGene::new(source, target));
            }
        }
        self
    }

    /// Fully connect each declared row to the next one.
    #[must_use]
    pub fn fully_connect_layers(mut self) -> Self {
        for row in 1..self.rows.len() {
            self = self.fully_connect(row - 1, row);
        }
        self
    }

    /// Connect each non-input node to the previous row, sampling at most
    /// `max_in_degree` sources when the previous row is wider.
    #[must_use]
    pub fn dense<R: Rng>(mut self, rng: &mut R) -> Self {
        for row in 1..self.rows.len() {
            let Some(sources) = self.row_nodes(row - 1) else {
                continue;
            };
            let Some(targets) = self.row_nodes(row) else {
                continue;
            };
            let candidates: Vec<usize> = sources.collect();
            for target in targets {
                for source in self.pick_sources(&candidates, candidates.len(), rng) {
                    self.push_generated(EdgeGene::new(source, target));
                }
            }
        }
        self
    }

    /// Connect each non-input node to a random `density` fraction of all
    /// nodes in earlier rows (at least one, at most `max_in_degree`).
    #[must_use]
    pub fn sparse<R: Rng>(mut self, density: f32, rng: &mut R) -> Self {
        if !(density > 0.0 && density <= 1.0) {
            self.defer(TopologyError::InvalidDensity { density });
            return self;
        }
        for row in 1..self.rows.len() {
            let Some(targets) = self.row_nodes(row) else {
                continue;
            };
            let candidates: Vec<usize> = (0..self.row_start(row)).collect();
            #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let wanted = (density * candidates.len() as f32).round() as usize;
            for target in targets {
                for source in self.pick_sources(&candidates, wanted, rng) {
                    self.push_generated(EdgeGene::new(source, target));
                }
            }
        }
        self
    }

    /// Validate and freeze the topology.
    ///
    /// # Errors
    ///
    /// Returns the first [`TopologyError`] found: a deferred generator error,
    /// an empty or misplaced row, a backward or duplicate edge, an in-degree
    /// overflow, or a non-Linear/Tanh output activation.
    pub fn build(self) -> Result<Topology, TopologyError> {
        if let Some(err) = self.deferred {
            return Err(err);
        }
        if self.rows.len() < 2 {
            return Err(TopologyError::TooFewRows {
                rows: self.rows.len(),
            });
        }

        let last = self.rows.len() - 1;
        let mut nodes = Vec::new();
        for (row, decl) in self.rows.iter().enumerate() {
            if decl.size == 0 {
                return Err(TopologyError::EmptyRow { row });
            }
            let expected = if row == 0 {
                NodeRole::Input
            } else if row == last {
                NodeRole::Output
            } else {
                NodeRole::Hidden
            };
            if decl.role != expected {
                return Err(TopologyError::MisplacedRow {
                    row,
                    role: decl.role,
                });
            }
            for _ in 0..decl.size {
                nodes.push(match decl.role {
                    NodeRole::Input => NodeGene::input(row),
                    role => NodeGene::computed(row, role, decl.allowed.clone()),
                });
            }
        }

        Topology::from_layout(TopologyLayout {
            max_in_degree: self.max_in_degree,
            nodes,
            edges: self.edges,
        })
    }

    fn defer(&mut self, err: TopologyError) {
        if self.deferred.is_none() {
            self.deferred = Some(err);
        }
    }

    fn row_start(&self, row: usize) -> usize {
        self.rows[..row].iter().map(|r| r.size).sum()
    }

    fn row_nodes(&self, row: usize) -> Option<std::ops::Range<usize>> {
        let decl = self.rows.get(row)?;
        let start = self.row_start(row);
        Some(start..start + decl.size)
    }

    /// Pick up to `wanted` distinct candidates, capped by the in-degree limit,
    /// returned in ascending order.
    fn pick_sources<R: Rng>(&self, candidates: &[usize], wanted: usize, rng: &mut R) -> Vec<usize> {
        if candidates.is_empty() {
            return Vec::new();
        }
        let amount = wanted.clamp(1, candidates.len()).min(self.max_in_degree.max(1));
        if amount == candidates.len() {
            return candidates.to_vec();
        }
        let mut picked: Vec<usize> = sample(rng, candidates.len(), amount)
            .into_iter()
            .map(|i| candidates[i])
            .collect();
        picked.sort_unstable();
        picked
    }

    /// Generated edges silently skip duplicates; explicit ones do not.
    fn push_generated(&mut self, edge: EdgeGene) {
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn test_fully_connected_build() {
        let topo = TopologyBuilder::new()
            .add_input_row(3)
            .add_hidden_row(2, &[Activation::ReLU])
            .add_output_row(2, &Activation::OUTPUT)
            .fully_connect_layers()
            .build()
            .unwrap();

        assert_eq!(topo.edge_count(), 3 * 2 + 2 * 2);
    }

    #[test]
    fn test_backward_edge_rejected() {
        let result = TopologyBuilder::new()
            .add_input_row(2)
            .add_hidden_row(2, &[Activation::Tanh])
            .add_output_row(1, &[Activation::Linear])
            .fully_connect_layers()
            .add_edge(4, 2)
            .build();

        assert!(matches!(result, Err(TopologyError::BackwardEdge { .. })));
    }

    #[test]
    fn test_same_row_edge_rejected() {
        let result = TopologyBuilder::new()
            .add_input_row(2)
            .add_hidden_row(2, &[Activation::Tanh])
            .add_output_row(1, &[Activation::Linear])
            .add_edge(2, 3)
            .build();

        assert!(matches!(result, Err(TopologyError::BackwardEdge { .. })));
    }

    #[test]
    fn test_in_degree_exceeded() {
        // Full connectivity is literal; it does not sample down to the cap.
        let result = TopologyBuilder::new()
            .with_max_in_degree(2)
            .add_input_row(3)
            .add_output_row(1, &[Activation::Tanh])
            .fully_connect(0, 1)
            .build();
        assert!(matches!(result, Err(TopologyError::InDegreeExceeded { .. })));

        let explicit = TopologyBuilder::new()
            .with_max_in_degree(2)
            .add_input_row(3)
            .add_output_row(1, &[Activation::Tanh])
            .add_edge(0, 3)
            .add_edge(1, 3)
            .add_edge(2, 3)
            .build();
        assert_eq!(
            explicit,
            Err(TopologyError::InDegreeExceeded { node: 3, max: 2 })
        );
    }

    #[test]
    fn test_invalid_output_activation() {
        let result = TopologyBuilder::new()
            .add_input_row(2)
            .add_output_row(1, &[Activation::Sigmoid])
            .build();

        assert_eq!(
            result,
            Err(TopologyError::InvalidOutputActivation {
                node: 2,
                activation: Activation::Sigmoid
            })
        );
    }

    #[test]
    fn test_empty_row_rejected() {
        let result = TopologyBuilder::new()
            .add_input_row(2)
            .add_hidden_row(0, &[Activation::Tanh])
            .add_output_row(1, &[Activation::Tanh])
            .build();

        assert_eq!(result, Err(TopologyError::EmptyRow { row: 1 }));
    }

    #[test]
    fn test_misplaced_rows_rejected() {
        let result = TopologyBuilder::new()
            .add_input_row(2)
            .add_output_row(1, &[Activation::Tanh])
            .add_hidden_row(2, &[Activation::Tanh])
            .build();

        assert!(matches!(result, Err(TopologyError::MisplacedRow { .. })));
        assert!(matches!(
            TopologyBuilder::new().add_input_row(2).build(),
            Err(TopologyError::TooFewRows { rows: 1 })
        ));
    }

    #[test]
    fn test_explicit_duplicate_rejected() {
        let result = TopologyBuilder::new()
            .add_input_row(1)
            .add_output_row(1, &[Activation::Tanh])
            .add_edge(0, 1)
            .add_edge(0, 1)
            .build();

        assert_eq!(
            result,
            Err(TopologyError::DuplicateEdge { from: 0, to: 1 })
        );
    }

    #[test]
    fn test_dense_is_deterministic_and_capped() {
        let build = |seed: u64| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            TopologyBuilder::new()
                .with_max_in_degree(3)
                .add_input_row(8)
                .add_hidden_row(6, &Activation::ALL)
                .add_output_row(2, &Activation::OUTPUT)
                .dense(&mut rng)
                .build()
                .unwrap()
        };

        let a = build(9);
        let b = build(9);
        assert_eq!(a, b);
        for node in 0..a.node_count() {
            if a.node(node).role != NodeRole::Input {
                assert!(a.in_degree(node) <= 3);
                assert!(a.in_degree(node) >= 1);
            }
        }
    }

    #[test]
    fn test_sparse_respects_density_and_cap() {
        let mut rng = test_rng();
        let topo = TopologyBuilder::new()
            .with_max_in_degree(4)
            .add_input_row(10)
            .add_hidden_row(5, &[Activation::Tanh])
            .add_output_row(1, &[Activation::Tanh])
            .sparse(0.3, &mut rng)
            .build()
            .unwrap();

        for node in topo.row_range(1) {
            assert_eq!(topo.in_degree(node), 3);
        }
        // Output row sees 15 earlier nodes; 0.3 * 15 rounds to 5, capped at 4.
        assert_eq!(topo.in_degree(15), 4);
    }

    #[test]
    fn test_sparse_invalid_density_deferred_to_build() {
        let mut rng = test_rng();
        let result = TopologyBuilder::new()
            .add_input_row(2)
            .add_output_row(1, &[Activation::Tanh])
            .sparse(1.5, &mut rng)
            .build();

        assert_eq!(result, Err(TopologyError::InvalidDensity { density: 1.5 }));
    }

    #[test]
    fn test_unknown_row_deferred() {
        let result = TopologyBuilder::new()
            .add_input_row(2)
            .add_output_row(1, &[Activation::Tanh])
            .fully_connect(0, 5)
            .build();

        assert_eq!(result, Err(TopologyError::UnknownRow { row: 5 }));
    }

    #[test]
    fn test_error_display() {
        let msg = TopologyError::BackwardEdge {
            from: 4,
            to: 1,
            from_row: 2,
            to_row: 1,
        }
        .to_string();
        assert!(msg.contains("later row"), "{msg}");
    }
}
