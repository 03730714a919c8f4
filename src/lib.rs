//! # Symbios Evolvion
//!
//! Speciated neuroevolution of fixed-topology, layered feed-forward networks.
//!
//! ## Features
//!
//! - **Immutable Topologies**: Row-layered DAGs validated once at build time and
//!   shared across species behind an `Arc`
//! - **Flat Genomes**: Individuals are weight/bias vectors index-aligned to
//!   their topology, with per-node activation choices
//! - **Speciation**: Species evolve independently with elitism, tournament
//!   selection, stagnation tracking and gated culling
//! - **Two Evaluators**: A sequential reference and a lock-step batched
//!   evaluator (rayon) that agree within a documented tolerance
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use symbios_evolvion::{
//!     Activation, EvolutionConfig, Evaluator, Evolver, SequentialEvaluator, TopologyBuilder,
//!     XorEnvironment,
//! };
//!
//! let topology = TopologyBuilder::new()
//!     .add_input_row(2)
//!     .add_hidden_row(4, &Activation::ALL)
//!     .add_output_row(1, &[Activation::Tanh])
//!     .fully_connect_layers()
//!     .build()
//!     .unwrap();
//!
//! let config = EvolutionConfig {
//!     individuals_per_species: 20,
//!     ..EvolutionConfig::xor()
//! };
//! let mut evolver = Evolver::new(config, 42).unwrap();
//! let mut population = evolver.initialize_population(Arc::new(topology));
//!
//! let evaluator = SequentialEvaluator::default();
//! let environment = XorEnvironment::new();
//! for generation in 0..5 {
//!     evaluator
//!         .evaluate_population(&mut population, &environment, generation)
//!         .unwrap();
//!     let report = evolver.step_generation(&mut population).unwrap();
//!     assert!(report.best_fitness.is_finite());
//! }
//! assert_eq!(population.generation, 5);
//! ```
//!
//! ## Architecture
//!
//! ### Topologies
//!
//! Row 0 holds the inputs, the last row holds the outputs, and every edge
//! points from an earlier row to a later one, so row order is a valid
//! evaluation order. Edges are kept sorted by `(target, source)`; each node's
//! incoming edges form one contiguous run, which the compiled [`Network`]
//! uses directly as a CSR index.
//!
//! ### Generation Step
//!
//! Evaluate every individual, then [`Evolver::step_generation`]: stagnation
//! update, per-species reproduction (offspring always inherit the parent's
//! topology), culling, replacement. Replacement species get a structurally
//! mutated copy of the best species' topology; this is the only place new
//! topologies appear.
//!
//! ### Determinism
//!
//! Every stochastic operation takes an explicit seed or random source.
//! Identical seeds give bit-identical populations.

pub mod activation;
pub mod builder;
pub mod config;
pub mod culling;
pub mod environment;
pub mod evaluator;
pub mod evolver;
pub mod gene;
pub mod genome;
pub mod innovation;
pub mod mutation;
pub mod network;
pub mod population;
pub mod species;
pub mod stagnation;
pub mod topology;
pub mod topology_mutation;

// Re-exports for convenience
pub use activation::Activation;
pub use builder::{TopologyBuilder, TopologyError, DEFAULT_MAX_IN_DEGREE};
pub use config::{ConfigError, EvolutionConfig, WeakEdgePruning};
pub use culling::{
    relative_performance, CullingAggressiveness, CullingGate, CullingOutcome, CullingStatus,
    SpeciesCuller,
};
pub use environment::{
    Environment, Landscape, LandscapeEnvironment, StepResult, XorEnvironment, XOR_CASES,
};
pub use evaluator::{
    compare_evaluators, AgreementReport, BatchedEvaluator, Disagreement, Evaluator,
    EvaluatorError, SequentialEvaluator, DEFAULT_AGREEMENT_TOLERANCE,
};
pub use evolver::{EvolutionError, Evolver, GenerationReport};
pub use gene::{EdgeGene, NodeGene, NodeRole};
pub use genome::Individual;
pub use innovation::{edge_innovation, topology_fingerprint};
pub use mutation::{mutate_individual, MutationRates};
pub use network::Network;
pub use population::Population;
pub use species::{FitnessStats, Species, SpeciesId};
pub use stagnation::StagnationTracker;
pub use topology::{Topology, TopologyLayout};
pub use topology_mutation::{mutate_topology, TopologyMutationRates};

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    fn topology() -> Arc<Topology> {
        Arc::new(
            TopologyBuilder::new()
                .add_input_row(2)
                .add_hidden_row(3, &Activation::ALL)
                .add_output_row(1, &Activation::OUTPUT)
                .fully_connect_layers()
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut evolver = Evolver::new(EvolutionConfig::default(), 123).unwrap();
        let mut population = evolver.initialize_population(topology());
        SequentialEvaluator::default()
            .evaluate_population(&mut population, &XorEnvironment::new(), 0)
            .unwrap();
        evolver.step_generation(&mut population).unwrap();

        let json = serde_json::to_string(&population).expect("Serialization failed");
        let mut restored: Population =
            serde_json::from_str(&json).expect("Deserialization failed");

        assert_eq!(restored.generation, population.generation);
        assert_eq!(restored.total_species_created, population.total_species_created);
        assert_eq!(restored.ids(), population.ids());
        for id in population.ids() {
            assert_eq!(restored.get(id), population.get(id));
        }

        // Each species comes back with its own topology until re-shared.
        let ids = population.ids();
        let topology = |p: &Population, id| p.get(id).unwrap().topology.clone();
        assert!(!Arc::ptr_eq(&topology(&restored, ids[0]), &topology(&restored, ids[1])));
        restored.share_topologies();
        for &a in &ids {
            for &b in &ids {
                if Arc::ptr_eq(&topology(&population, a), &topology(&population, b)) {
                    assert!(Arc::ptr_eq(&topology(&restored, a), &topology(&restored, b)));
                }
            }
        }
    }

    #[test]
    fn test_mutated_clone_does_not_alias() {
        let topology = topology();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let parent = Individual::random(&topology, &mut rng);
        let snapshot = parent.clone();

        let mut child = parent.clone();
        mutate_individual(&mut child, &topology, &MutationRates::default(), &mut rng);

        assert_eq!(parent, snapshot);
        assert_ne!(child.weights, parent.weights);
    }

    #[test]
    fn test_innovation_determinism() {
        let a = topology();
        let b = topology();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(
            edge_innovation(EdgeGene::new(1, 2)),
            edge_innovation(EdgeGene::new(1, 2))
        );
    }
}
