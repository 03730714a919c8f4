//! Integration tests for symbios-evolvion.

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use symbios_evolvion::{
    compare_evaluators, mutation, Activation, BatchedEvaluator, CullingAggressiveness, EdgeGene,
    Evaluator, EvolutionConfig, Evolver, Individual, Landscape, LandscapeEnvironment, Network,
    Population, SequentialEvaluator, Topology, TopologyBuilder, TopologyError, XorEnvironment,
    DEFAULT_AGREEMENT_TOLERANCE, XOR_CASES,
};

fn xor_topology() -> Arc<Topology> {
    Arc::new(
        TopologyBuilder::new()
            .add_input_row(2)
            .add_hidden_row(4, &Activation::ALL)
            .add_output_row(1, &[Activation::Tanh])
            .fully_connect_layers()
            .build()
            .unwrap(),
    )
}

/// Config where every non-best species becomes cull-eligible after one step.
fn eager_culling(species_count: usize, min_species_count: usize) -> EvolutionConfig {
    EvolutionConfig {
        species_count,
        individuals_per_species: 8,
        min_species_count,
        elites: 1,
        grace_generations: 0,
        culling_aggressiveness: CullingAggressiveness::AllEligible,
        ..EvolutionConfig::default()
    }
}

fn run_generations(config: EvolutionConfig, generations: u64) -> Population {
    let mut evolver = Evolver::new(config, 42).unwrap();
    let mut population = evolver.initialize_population(xor_topology());
    let evaluator = SequentialEvaluator::default();
    let environment = XorEnvironment::new();
    for generation in 0..generations {
        evaluator
            .evaluate_population(&mut population, &environment, generation)
            .unwrap();
        evolver.step_generation(&mut population).unwrap();
    }
    population
}

#[test]
fn test_xor_end_to_end() {
    let mut evolver = Evolver::new(EvolutionConfig::xor(), 42).unwrap();
    let mut population = evolver.initialize_population(xor_topology());
    let evaluator = BatchedEvaluator::default();
    let environment = XorEnvironment::new();

    let mut best = f32::NEG_INFINITY;
    for generation in 0..100 {
        evaluator
            .evaluate_population(&mut population, &environment, generation)
            .unwrap();
        assert!(population
            .individuals()
            .all(|i| i.fitness.is_some_and(f32::is_finite)));
        best = population.best_fitness().unwrap();
        if best >= -0.01 {
            break;
        }
        evolver.step_generation(&mut population).unwrap();
    }
    assert!(best >= -0.5, "best fitness {best}");

    if best >= -0.01 {
        let (id, individual) = population.best_individual().unwrap();
        let topology = &population.get(id).unwrap().topology;
        let mut network = Network::new(topology, individual).unwrap();
        for (inputs, expected) in XOR_CASES {
            let output = network.evaluate(&inputs)[0];
            assert!(
                (output - expected).abs() < 0.3,
                "{inputs:?} -> {output}, expected {expected}"
            );
        }
    }
}

#[test]
fn test_no_culling_when_min_equals_count() {
    let population = run_generations(eager_culling(4, 4), 20);
    assert_eq!(population.species_count(), 4);
    assert_eq!(population.total_species_created, 4);
}

#[test]
fn test_culling_skipped_with_single_eligible_species() {
    // Two species: once the best is excluded only one can be eligible.
    let population = run_generations(eager_culling(2, 0), 20);
    assert_eq!(population.species_count(), 2);
    assert_eq!(population.total_species_created, 2);
}

#[test]
fn test_culling_at_min_one_below_count() {
    let population = run_generations(eager_culling(4, 3), 20);
    assert_eq!(population.species_count(), 4);
    assert!(population.total_species_created > 4);
    // At most one species may go per step at this boundary.
    assert!(population.total_species_created <= 4 + 20);
}

#[test]
fn test_culling_counter_is_monotonic() {
    let mut evolver = Evolver::new(eager_culling(4, 1), 7).unwrap();
    let mut population = evolver.initialize_population(xor_topology());
    let evaluator = SequentialEvaluator::default();
    let environment = XorEnvironment::new();
    let mut created = population.total_species_created;
    for generation in 0..10 {
        evaluator
            .evaluate_population(&mut population, &environment, generation)
            .unwrap();
        let report = evolver.step_generation(&mut population).unwrap();
        assert_eq!(
            population.total_species_created,
            created + report.species_spawned
        );
        assert_eq!(report.species_culled, report.species_spawned);
        created = population.total_species_created;
        assert_eq!(population.species_count(), 4);
        for species in population.species.values() {
            assert_eq!(species.len(), 8);
            assert!(species.individuals.iter().all(|i| i.matches(&species.topology)));
        }
    }
}

#[test]
fn test_evaluators_agree_on_evolved_population() {
    let population = run_generations(eager_culling(4, 1), 5);
    let report = compare_evaluators(
        &SequentialEvaluator::new(3),
        &BatchedEvaluator::new(3),
        &population,
        &XorEnvironment::new(),
        17,
        DEFAULT_AGREEMENT_TOLERANCE,
    )
    .unwrap();
    assert_eq!(report.compared, population.individual_count());
    assert!(report.within_tolerance(), "{report:?}");
}

#[test]
fn test_batched_evolution_is_deterministic() {
    let run = || {
        let mut evolver = Evolver::new(eager_culling(3, 1), 11).unwrap();
        let mut population = evolver.initialize_population(xor_topology());
        let evaluator = BatchedEvaluator::new(2);
        let mut bests = Vec::new();
        for generation in 0..8 {
            evaluator
                .evaluate_population(&mut population, &XorEnvironment::new(), generation)
                .unwrap();
            bests.push(evolver.step_generation(&mut population).unwrap().best_fitness);
        }
        bests
    };
    assert_eq!(run(), run());
}

#[test]
fn test_landscape_fitness_is_finite() {
    let topology = Arc::new(
        TopologyBuilder::new()
            .add_input_row(3)
            .add_hidden_row(6, &Activation::ALL)
            .add_output_row(2, &Activation::OUTPUT)
            .fully_connect_layers()
            .build()
            .unwrap(),
    );
    let config = EvolutionConfig {
        individuals_per_species: 10,
        ..EvolutionConfig::default()
    };
    let mut evolver = Evolver::new(config, 3).unwrap();
    let mut population = evolver.initialize_population(topology);
    let environment = LandscapeEnvironment::new(Landscape::Rosenbrock);
    for generation in 0..3 {
        BatchedEvaluator::default()
            .evaluate_population(&mut population, &environment, generation)
            .unwrap();
        for individual in population.individuals() {
            let fitness = individual.fitness.unwrap();
            assert!(fitness.is_finite() && fitness <= 0.0);
        }
        evolver.step_generation(&mut population).unwrap();
    }
}

#[test]
fn test_topology_validation() {
    let backward = TopologyBuilder::new()
        .add_input_row(2)
        .add_hidden_row(2, &[Activation::ReLU])
        .add_output_row(1, &[Activation::Linear])
        .add_edge(4, 2)
        .build();
    assert!(matches!(backward, Err(TopologyError::BackwardEdge { .. })));

    let overflow = TopologyBuilder::new()
        .with_max_in_degree(2)
        .add_input_row(3)
        .add_output_row(1, &[Activation::Linear])
        .fully_connect_layers()
        .build();
    assert!(matches!(
        overflow,
        Err(TopologyError::InDegreeExceeded { max: 2, .. })
    ));

    let bad_output = TopologyBuilder::new()
        .add_input_row(1)
        .add_output_row(1, &[Activation::ReLU])
        .fully_connect_layers()
        .build();
    assert!(matches!(
        bad_output,
        Err(TopologyError::InvalidOutputActivation { .. })
    ));

    let empty_row = TopologyBuilder::new()
        .add_input_row(1)
        .add_hidden_row(0, &[Activation::Tanh])
        .add_output_row(1, &[Activation::Linear])
        .build();
    assert!(matches!(empty_row, Err(TopologyError::EmptyRow { row: 1 })));
}

#[test]
fn test_mutation_determinism_with_independent_rngs() {
    let topology = xor_topology();
    let base = Individual::random(&topology, &mut ChaCha8Rng::seed_from_u64(1));
    let rates = mutation::MutationRates {
        activation_swap: 0.5,
        node_param_mutate: 0.5,
        l1_shrink_probability: 0.5,
        ..mutation::MutationRates::default()
    };
    let mut a = base.clone();
    let mut b = base.clone();
    for _ in 0..10 {
        mutation::mutate_individual(&mut a, &topology, &rates, &mut ChaCha8Rng::seed_from_u64(9));
        mutation::mutate_individual(&mut b, &topology, &rates, &mut ChaCha8Rng::seed_from_u64(9));
    }
    assert_eq!(a, b);
    assert!(a.activations[6].is_output_allowed());
}

#[test]
fn test_bias_jitter_increases_variance() {
    let topology = xor_topology();
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut population: Vec<Individual> = (0..64).map(|_| Individual::zeroed(&topology)).collect();
    for individual in &mut population {
        for bias in &mut individual.biases {
            *bias = 0.25;
        }
    }

    let variance = |population: &[Individual], index: usize| {
        let n = population.len() as f32;
        let mean = population.iter().map(|i| i.biases[index]).sum::<f32>() / n;
        population
            .iter()
            .map(|i| (i.biases[index] - mean).powi(2))
            .sum::<f32>()
            / n
    };
    let before: Vec<f32> = (0..topology.node_count())
        .map(|k| variance(&population, k))
        .collect();

    for individual in &mut population {
        mutation::jitter_biases(individual, 1.0, 0.2, &mut rng);
    }
    for k in 0..topology.node_count() {
        assert!(variance(&population, k) > before[k]);
    }
}

#[test]
fn test_replacement_topologies_stay_valid() {
    let config = EvolutionConfig {
        topology_mutation: symbios_evolvion::TopologyMutationRates {
            edge_add: 1.0,
            edge_delete_random: 1.0,
            edge_split: 1.0,
            edge_redirect: 1.0,
            edge_swap: 1.0,
        },
        ..eager_culling(4, 1)
    };
    let population = run_generations(config, 10);
    for species in population.species.values() {
        let topology = &species.topology;
        for edge in topology.edges() {
            assert!(topology.node(edge.source).row < topology.node(edge.target).row);
        }
        for node in topology.input_count()..topology.node_count() {
            assert!(topology.in_degree(node) <= topology.max_in_degree());
        }
        assert!(topology.edge_index(EdgeGene::new(0, 0)).is_none());
    }
}
