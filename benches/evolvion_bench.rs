//! Benchmarks for symbios-evolvion.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use symbios_evolvion::{
    mutate_individual, mutate_topology, Activation, BatchedEvaluator, Evaluator, EvolutionConfig,
    Evolver, Individual, Landscape, LandscapeEnvironment, MutationRates, Network,
    SequentialEvaluator, Topology, TopologyBuilder, TopologyMutationRates,
};

fn landscape_topology() -> Arc<Topology> {
    Arc::new(
        TopologyBuilder::new()
            .add_input_row(3)
            .add_hidden_row(16, &Activation::ALL)
            .add_hidden_row(16, &Activation::ALL)
            .add_output_row(2, &Activation::OUTPUT)
            .fully_connect_layers()
            .build()
            .unwrap(),
    )
}

fn bench_topology_build(c: &mut Criterion) {
    c.bench_function("topology_build_sparse", |b| {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        b.iter(|| {
            black_box(
                TopologyBuilder::new()
                    .add_input_row(8)
                    .add_hidden_row(32, &Activation::ALL)
                    .add_hidden_row(32, &Activation::ALL)
                    .add_output_row(4, &Activation::OUTPUT)
                    .sparse(0.3, &mut rng)
                    .build()
                    .unwrap(),
            );
        });
    });
}

fn bench_mutation(c: &mut Criterion) {
    let topology = landscape_topology();
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let rates = MutationRates::default();

    c.bench_function("individual_mutation", |b| {
        let mut individual = Individual::random(&topology, &mut rng);
        b.iter(|| {
            mutate_individual(&mut individual, &topology, &rates, &mut rng);
            black_box(&individual);
        });
    });

    c.bench_function("topology_mutation", |b| {
        let rates = TopologyMutationRates::default();
        b.iter(|| {
            black_box(mutate_topology(&topology, &rates, &mut rng));
        });
    });
}

fn bench_network(c: &mut Criterion) {
    let topology = landscape_topology();
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let individual = Individual::random(&topology, &mut rng);
    let mut network = Network::new(&topology, &individual).unwrap();
    let mut output = vec![0.0; network.output_count()];

    c.bench_function("network_evaluate", |b| {
        b.iter(|| {
            network.evaluate_into(black_box(&[0.3, -0.7, 1.2]), &mut output);
            black_box(&output);
        });
    });
}

fn bench_evaluators(c: &mut Criterion) {
    let config = EvolutionConfig {
        individuals_per_species: 32,
        ..EvolutionConfig::default()
    };
    let mut evolver = Evolver::new(config, 42).unwrap();
    let population = evolver.initialize_population(landscape_topology());
    let environment = LandscapeEnvironment::new(Landscape::Rosenbrock);

    let mut group = c.benchmark_group("population_evaluation");
    group.sample_size(20);
    group.bench_function("sequential", |b| {
        let mut population = population.clone();
        b.iter(|| {
            SequentialEvaluator::default()
                .evaluate_population(&mut population, &environment, 7)
                .unwrap();
        });
    });
    group.bench_function("batched", |b| {
        let mut population = population.clone();
        b.iter(|| {
            BatchedEvaluator::default()
                .evaluate_population(&mut population, &environment, 7)
                .unwrap();
        });
    });
    group.finish();
}

fn bench_step_generation(c: &mut Criterion) {
    let config = EvolutionConfig {
        individuals_per_species: 32,
        ..EvolutionConfig::default()
    };
    let mut evolver = Evolver::new(config, 42).unwrap();
    let mut population = evolver.initialize_population(landscape_topology());
    for (index, individual) in population.individuals_mut().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let fitness = -(index as f32);
        individual.fitness = Some(fitness);
    }

    c.bench_function("step_generation", |b| {
        b.iter_batched(
            || population.clone(),
            |mut population| {
                evolver.step_generation(&mut population).unwrap();
                black_box(population);
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_topology_build,
    bench_mutation,
    bench_network,
    bench_evaluators,
    bench_step_generation,
);
criterion_main!(benches);
