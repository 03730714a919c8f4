//! XOR example for symbios-evolvion.
//!
//! Evolves a 2-4-1 network on the XOR truth table with four species, then
//! prints the champion's outputs. Set `RUST_LOG=debug` for per-generation
//! culling and stagnation logs.
//!
//! Run with: `cargo run --example xor`

use std::sync::Arc;

use symbios_evolvion::{
    Activation, BatchedEvaluator, Evaluator, EvolutionConfig, Evolver, Network, TopologyBuilder,
    XorEnvironment, XOR_CASES,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("Evolvion XOR Example");
    println!("====================\n");

    let topology = TopologyBuilder::new()
        .add_input_row(2)
        .add_hidden_row(4, &Activation::ALL)
        .add_output_row(1, &[Activation::Tanh])
        .fully_connect_layers()
        .build()?;

    let config = EvolutionConfig::xor();
    let generations = 200;
    let seed = 42;

    println!("Species: {}", config.species_count);
    println!("Individuals per species: {}", config.individuals_per_species);
    println!("Generations: {generations}");
    println!();

    let mut evolver = Evolver::new(config, seed)?;
    let mut population = evolver.initialize_population(Arc::new(topology));
    let evaluator = BatchedEvaluator::default();
    let environment = XorEnvironment::new();

    let mut solution_generation = None;
    for generation in 0..generations {
        evaluator.evaluate_population(&mut population, &environment, generation)?;
        let best = population.best_fitness().unwrap_or(f32::NEG_INFINITY);

        // Negative MSE; -0.01 means every case is within about 0.1.
        if best >= -0.01 {
            solution_generation = Some(generation);
            break;
        }

        let report = evolver.step_generation(&mut population)?;
        if generation % 10 == 0 {
            println!(
                "Gen {:3}: best={:.4}, mean={:.4}, culled={}, species created={}",
                report.generation,
                report.best_fitness,
                report.mean_fitness,
                report.species_culled,
                population.total_species_created
            );
        }
    }

    println!();
    println!("Evolution Complete!");
    println!("==================");
    match solution_generation {
        Some(generation) => println!("Solution found at generation: {generation}"),
        None => println!("No solution within {generations} generations"),
    }

    let Some((id, champion)) = population.best_individual() else {
        return Ok(());
    };
    let Some(species) = population.get(id) else {
        return Ok(());
    };
    println!("Best fitness: {:.4}", champion.fitness_or_min());
    println!("Edges: {}", species.topology.edge_count());

    println!("\nChampion XOR outputs:");
    let mut network = Network::new(&species.topology, champion)?;
    for (inputs, expected) in XOR_CASES {
        let output = network.evaluate(&inputs)[0];
        let status = if (output - expected).abs() < 0.1 { "ok" } else { "off" };
        println!(
            "  {} XOR {} = {:.4} (expected {}) {}",
            inputs[0], inputs[1], output, expected, status
        );
    }
    Ok(())
}
