//! Per-species progress tracking.
//!
//! [`StagnationTracker::update_all_species`] runs once per generation, after
//! every individual has a fitness and before culling. It snapshots each
//! species' [`FitnessStats`] and advances its stagnation counter: the counter
//! resets whenever the generation best beats the best ever by more than
//! `epsilon`, and grows by one otherwise.

use tracing::trace;

use crate::population::Population;
use crate::species::{FitnessStats, Species};

/// Records best-ever fitness and consecutive non-improving generations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagnationTracker {
    /// Minimum gain over the best ever that counts as improvement.
    pub epsilon: f32,
}

impl Default for StagnationTracker {
    fn default() -> Self {
        Self { epsilon: 1e-6 }
    }
}

impl StagnationTracker {
    #[must_use]
    pub fn new(epsilon: f32) -> Self {
        Self { epsilon }
    }

    /// Update one species from its members' current fitness.
    ///
    /// A species with no evaluated members keeps its counters.
    pub fn update_species(&self, species: &mut Species) {
        let stats = FitnessStats::from_individuals(&species.individuals);
        species.stats = stats;
        let Some(generation_best) = stats.best else {
            return;
        };

        match species.best_fitness_ever {
            Some(best_ever) if generation_best <= best_ever + self.epsilon => {
                species.generations_without_improvement += 1;
            }
            _ => species.generations_without_improvement = 0,
        }
        species.best_fitness_ever = Some(
            species
                .best_fitness_ever
                .map_or(generation_best, |best| best.max(generation_best)),
        );
    }

    /// Update every species in the population.
    pub fn update_all_species(&self, population: &mut Population) {
        for (id, species) in &mut population.species {
            self.update_species(species);
            trace!(
                ?id,
                best = ?species.stats.best,
                stagnant_for = species.generations_without_improvement,
                "Stagnation updated"
            );
        }
    }
}
