//! Compiled forward pass.
//!
//! A [`Network`] flattens a ([`Topology`], [`Individual`]) pair into CSR
//! arrays so evaluation is a single O(N + E) sweep in row order. Incoming
//! edges are visited in the topology's `(target, source)` order, which fixes
//! the floating-point summation order for every evaluator.

use crate::activation::Activation;
use crate::evaluator::EvaluatorError;
use crate::genome::Individual;
use crate::topology::Topology;

/// Pre-activations are clamped to this magnitude before the activation runs.
pub const PRE_ACTIVATION_LIMIT: f64 = 1e6;

/// An evaluation-ready network.
#[derive(Debug, Clone)]
pub struct Network {
    /// Node outputs from the last evaluation.
    values: Vec<f32>,
    biases: Vec<f32>,
    activations: Vec<Activation>,
    params: Vec<f32>,
    /// CSR: source node of each incoming edge.
    csr_sources: Vec<usize>,
    /// CSR: weight of each incoming edge, parallel to `csr_sources`.
    csr_weights: Vec<f32>,
    /// CSR: offsets per node, length = nodes + 1.
    csr_offsets: Vec<usize>,
    input_count: usize,
    output_start: usize,
}

impl Network {
    /// Compile an individual against its topology.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluatorError::ParameterMismatch`] if the individual's array
    /// lengths disagree with the topology.
    pub fn new(topology: &Topology, individual: &Individual) -> Result<Self, EvaluatorError> {
        if !individual.matches(topology) {
            return Err(EvaluatorError::ParameterMismatch {
                edges: topology.edge_count(),
                nodes: topology.node_count(),
                weights: individual.weights.len(),
                biases: individual.biases.len(),
            });
        }

        let node_count = topology.node_count();
        let mut csr_offsets = Vec::with_capacity(node_count + 1);
        for node in 0..node_count {
            csr_offsets.push(topology.incoming(node).start);
        }
        csr_offsets.push(topology.edge_count());

        Ok(Self {
            values: vec![0.0; node_count],
            biases: individual.biases.clone(),
            activations: individual.activations.clone(),
            params: individual.node_params.clone(),
            csr_sources: topology.edges().iter().map(|e| e.source).collect(),
            csr_weights: individual.weights.clone(),
            csr_offsets,
            input_count: topology.input_count(),
            output_start: topology.output_range().start,
        })
    }

    #[inline]
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.input_count
    }

    #[inline]
    #[must_use]
    pub fn output_count(&self) -> usize {
        self.values.len() - self.output_start
    }

    /// Run the network, writing outputs into a caller-provided buffer.
    ///
    /// # Panics
    ///
    /// Panics if `inputs` or `outputs` has the wrong length.
    pub fn evaluate_into(&mut self, inputs: &[f32], outputs: &mut [f32]) {
        assert_eq!(
            inputs.len(),
            self.input_count,
            "Input length mismatch: expected {}, got {}",
            self.input_count,
            inputs.len()
        );
        assert_eq!(
            outputs.len(),
            self.output_count(),
            "Output length mismatch: expected {}, got {}",
            self.output_count(),
            outputs.len()
        );

        self.values[..self.input_count].copy_from_slice(inputs);

        // Rows are contiguous and edges only point forward, so node order is
        // a valid evaluation order.
        for node in self.input_count..self.values.len() {
            let mut sum = f64::from(self.biases[node]);
            for i in self.csr_offsets[node]..self.csr_offsets[node + 1] {
                sum += f64::from(self.csr_weights[i]) * f64::from(self.values[self.csr_sources[i]]);
            }
            #[allow(clippy::cast_possible_truncation)]
            let pre = sum.clamp(-PRE_ACTIVATION_LIMIT, PRE_ACTIVATION_LIMIT) as f32;
            self.values[node] = self.activations[node].apply(pre, self.params[node]);
        }

        outputs.copy_from_slice(&self.values[self.output_start..]);
    }

    /// Run the network and return its outputs.
    ///
    /// # Panics
    ///
    /// Panics if `inputs` has the wrong length.
    pub fn evaluate(&mut self, inputs: &[f32]) -> Vec<f32> {
        let mut outputs = vec![0.0; self.output_count()];
        self.evaluate_into(inputs, &mut outputs);
        outputs
    }
}
