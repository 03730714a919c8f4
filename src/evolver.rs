//! The generational loop.
//!
//! An [`Evolver`] owns a validated [`EvolutionConfig`] and a seeded random
//! source. After [`Evolver::initialize_population`], the caller alternates
//! between evaluating every individual and calling
//! [`Evolver::step_generation`], which:
//!
//! 1. refuses to run unless every individual has a fitness
//! 2. updates stagnation statistics for every species
//! 3. replaces each species' members with elites plus mutated tournament
//!    winners from its parent pool (offspring keep the parent topology)
//! 4. culls eligible species and spawns replacements derived from the best
//!    species' topology
//! 5. ages surviving species and advances the generation counter

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, EvolutionConfig};
use crate::culling::{CullingGate, SpeciesCuller};
use crate::genome::Individual;
use crate::mutation::mutate_individual;
use crate::population::Population;
use crate::species::{Species, SpeciesId};
use crate::stagnation::StagnationTracker;
use crate::topology::Topology;
use crate::topology_mutation::{mutate_topology, prune_weak_edges};

/// Errors raised by the generational loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvolutionError {
    /// `step_generation` was called before every individual was evaluated.
    #[error("individual {index} of species {species:?} has not been evaluated")]
    UnevaluatedIndividual { species: SpeciesId, index: usize },
    /// `step_generation` was called on a population without species.
    #[error("population has no species")]
    EmptyPopulation,
}

/// Summary of one generation step.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    /// Generation that was just consumed.
    pub generation: usize,
    /// Best fitness of the consumed generation.
    pub best_fitness: f32,
    /// Mean fitness of the consumed generation.
    pub mean_fitness: f32,
    pub culling_gate: CullingGate,
    pub species_culled: usize,
    pub species_spawned: usize,
}

/// Drives speciated evolution.
#[derive(Debug, Clone)]
pub struct Evolver {
    config: EvolutionConfig,
    tracker: StagnationTracker,
    culler: SpeciesCuller,
    rng: ChaCha8Rng,
}

impl Evolver {
    /// Validate `config` and seed the evolver's random source.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] from [`EvolutionConfig::validate`].
    pub fn new(config: EvolutionConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            tracker: StagnationTracker::new(config.stagnation_epsilon),
            culler: SpeciesCuller::from_config(&config),
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Create `species_count` species of `individuals_per_species` randomly
    /// initialized individuals, all sharing `topology`.
    pub fn initialize_population(&mut self, topology: Arc<Topology>) -> Population {
        let mut population = Population::new();
        for _ in 0..self.config.species_count {
            let species = Species::random(
                topology.clone(),
                self.config.individuals_per_species,
                &mut self.rng,
            );
            population.insert_species(species);
        }
        info!(
            species = self.config.species_count,
            individuals = self.config.individuals_per_species,
            nodes = topology.node_count(),
            edges = topology.edge_count(),
            "Population initialized"
        );
        population
    }

    /// Consume the evaluated generation and produce the next one.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::UnevaluatedIndividual`] if any individual
    /// lacks a fitness, or [`EvolutionError::EmptyPopulation`]. The population
    /// is left untouched on error.
    pub fn step_generation(
        &mut self,
        population: &mut Population,
    ) -> Result<GenerationReport, EvolutionError> {
        if population.species_count() == 0 {
            return Err(EvolutionError::EmptyPopulation);
        }
        if let Some((species, index)) = population.first_unevaluated() {
            return Err(EvolutionError::UnevaluatedIndividual { species, index });
        }

        let best_fitness = population.best_fitness().unwrap_or(f32::NEG_INFINITY);
        let mean_fitness = population.mean_fitness().unwrap_or(f32::NEG_INFINITY);

        self.tracker.update_all_species(population);

        let survivors = population.ids();
        for &id in &survivors {
            if let Some(species) = population.get_mut(id) {
                self.reproduce(species);
                if self.config.weak_edge_pruning.during_evolution {
                    self.prune(species);
                }
            }
        }

        let outcome = self.culler.cull(population);
        let template = SpeciesCuller::best_species(population)
            .and_then(|id| population.get(id))
            .map(|s| s.topology.clone());
        let mut spawned = 0;
        if let Some(template) = template {
            while population.species_count() < self.config.species_count {
                let species = self.spawn_replacement(&template);
                let fingerprint = species.topology.fingerprint();
                let edges = species.topology.edge_count();
                let id = population.insert_species(species);
                spawned += 1;
                info!(
                    ?id,
                    fingerprint = %format!("{fingerprint:016x}"),
                    edges,
                    total_created = population.total_species_created,
                    "Spawned replacement species"
                );
            }
        }

        for id in survivors {
            if let Some(species) = population.get_mut(id) {
                species.age += 1;
            }
        }

        let report = GenerationReport {
            generation: population.generation,
            best_fitness,
            mean_fitness,
            culling_gate: outcome.gate,
            species_culled: outcome.removed.len(),
            species_spawned: spawned,
        };
        population.generation += 1;
        debug!(
            generation = report.generation,
            best = report.best_fitness,
            mean = report.mean_fitness,
            culled = report.species_culled,
            spawned = report.species_spawned,
            "Generation complete"
        );
        Ok(report)
    }

    /// Replace a species' members with its next generation.
    fn reproduce(&mut self, species: &mut Species) {
        let target = self.config.individuals_per_species;
        let ranked = species.ranked_indices();
        if ranked.is_empty() {
            species.individuals = (0..target)
                .map(|_| Individual::random(&species.topology, &mut self.rng))
                .collect();
            return;
        }

        let mut next = Vec::with_capacity(target);
        for &index in ranked.iter().take(self.config.elites.min(target)) {
            let mut elite = species.individuals[index].clone();
            elite.fitness = None;
            next.push(elite);
        }

        let pool = parent_pool_size(ranked.len(), self.config.parent_pool_percentage);
        while next.len() < target {
            let parent = if pool < 2 {
                ranked[0]
            } else {
                ranked[tournament(pool, self.config.tournament_size, &mut self.rng)]
            };
            let mut child = species.individuals[parent].clone();
            mutate_individual(&mut child, &species.topology, &self.config.mutation, &mut self.rng);
            next.push(child);
        }
        species.individuals = next;
    }

    fn prune(&mut self, species: &mut Species) {
        if let Some(pruned) = prune_weak_edges(
            &species.topology,
            &species.individuals,
            &self.config.weak_edge_pruning,
            &mut self.rng,
        ) {
            debug!(
                from = species.topology.edge_count(),
                to = pruned.edge_count(),
                "Pruned weak edges"
            );
            species.migrate_to(Arc::new(pruned), &mut self.rng);
        }
    }

    /// A fresh species on a structurally mutated copy of `template`.
    fn spawn_replacement(&mut self, template: &Topology) -> Species {
        let topology = mutate_topology(template, &self.config.topology_mutation, &mut self.rng);
        let mut species = Species::random(
            Arc::new(topology),
            self.config.individuals_per_species,
            &mut self.rng,
        );
        let pruning = &self.config.weak_edge_pruning;
        if pruning.enabled && pruning.on_birth {
            self.prune(&mut species);
        }
        species
    }
}

/// Number of top-ranked members eligible as parents: `ceil(pct * n)`, at
/// least one.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn parent_pool_size(members: usize, percentage: f32) -> usize {
    // Absorb f32 representation error so 0.3 * 100 stays 30.
    let exact = f64::from(percentage) * members as f64;
    let size = (exact - exact * 1e-6).ceil() as usize;
    size.clamp(1, members.max(1))
}

/// Draw `size` ranks uniformly with replacement from `0..pool` and return the
/// best (lowest) one.
fn tournament<R: Rng>(pool: usize, size: usize, rng: &mut R) -> usize {
    (0..size.max(1))
        .map(|_| rng.random_range(0..pool))
        .min()
        .unwrap_or(0)
}
