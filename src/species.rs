//! Species: individuals sharing one topology.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::genome::Individual;
use crate::topology::Topology;

new_key_type! {
    /// Stable handle for a species inside a [`Population`](crate::Population).
    pub struct SpeciesId;
}

/// Fitness summary of one generation of a species.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessStats {
    /// Best fitness, `None` when nothing was evaluated.
    pub best: Option<f32>,
    /// Mean fitness over evaluated individuals.
    pub mean: f32,
    /// Population variance of fitness over evaluated individuals.
    pub variance: f32,
    /// Number of evaluated individuals the summary covers.
    pub evaluated: usize,
}

impl FitnessStats {
    /// Summarize the evaluated individuals in `individuals`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn from_individuals(individuals: &[Individual]) -> Self {
        let fitnesses: Vec<f64> = individuals
            .iter()
            .filter_map(|i| i.fitness)
            .map(f64::from)
            .collect();
        if fitnesses.is_empty() {
            return Self::default();
        }

        let n = fitnesses.len() as f64;
        let mean = fitnesses.iter().sum::<f64>() / n;
        let variance = fitnesses.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / n;
        let best = fitnesses.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self {
            best: Some(best as f32),
            mean: mean as f32,
            variance: variance as f32,
            evaluated: fitnesses.len(),
        }
    }
}

/// A group of individuals evolved against one shared topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    /// Topology shared by every member.
    pub topology: Arc<Topology>,
    /// Members, in no particular order.
    pub individuals: Vec<Individual>,
    /// Generations this species has survived.
    pub age: usize,
    /// Best fitness any member has ever reached.
    pub best_fitness_ever: Option<f32>,
    /// Consecutive generations without improving on `best_fitness_ever`.
    pub generations_without_improvement: usize,
    /// Summary of the most recently recorded generation.
    pub stats: FitnessStats,
}

impl Species {
    /// Create a fresh species from existing individuals.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if an individual does not match `topology`.
    #[must_use]
    pub fn new(topology: Arc<Topology>, individuals: Vec<Individual>) -> Self {
        debug_assert!(individuals.iter().all(|i| i.matches(&topology)));
        Self {
            topology,
            individuals,
            age: 0,
            best_fitness_ever: None,
            generations_without_improvement: 0,
            stats: FitnessStats::default(),
        }
    }

    /// Create a species of `count` randomly initialized individuals.
    #[must_use]
    pub fn random<R: Rng>(topology: Arc<Topology>, count: usize, rng: &mut R) -> Self {
        let individuals = (0..count)
            .map(|_| Individual::random(&topology, rng))
            .collect();
        Self::new(topology, individuals)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    /// Whether every member has a fitness.
    #[must_use]
    pub fn is_fully_evaluated(&self) -> bool {
        self.individuals.iter().all(Individual::is_evaluated)
    }

    /// Member indices ordered from fittest to least fit.
    ///
    /// Unevaluated members sort last; ties keep their original order.
    #[must_use]
    pub fn ranked_indices(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.individuals.len()).collect();
        order.sort_by(|&a, &b| {
            self.individuals[b]
                .fitness_or_min()
                .total_cmp(&self.individuals[a].fitness_or_min())
        });
        order
    }

    /// The fittest evaluated member.
    #[must_use]
    pub fn best_individual(&self) -> Option<&Individual> {
        self.ranked_indices()
            .first()
            .map(|&i| &self.individuals[i])
            .filter(|i| i.is_evaluated())
    }

    /// Best fitness among current members.
    #[must_use]
    pub fn best_fitness(&self) -> Option<f32> {
        self.individuals
            .iter()
            .filter_map(|i| i.fitness)
            .reduce(f32::max)
    }

    /// Move every member onto a new topology, keeping shared edge weights.
    pub fn migrate_to<R: Rng>(&mut self, topology: Arc<Topology>, rng: &mut R) {
        for individual in &mut self.individuals {
            *individual = individual.migrate(&self.topology, &topology, rng);
        }
        self.topology = topology;
    }
}
