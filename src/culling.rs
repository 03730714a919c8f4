//! Species culling policy.
//!
//! A species is *eligible* for culling when any of these hold:
//! - its age exceeds the grace period
//! - its stagnation counter exceeds the stagnation threshold
//! - its fitness variance is below the diversity threshold
//! - its best fitness relative to the population best is below the
//!   relative-performance threshold
//!
//! Eligibility alone removes nothing. A culling pass only proceeds when the
//! population holds more species than the configured minimum, and when at
//! least two species remain eligible after the globally best species (which
//! is never eligible) is excluded. A failed gate is a silent no-op.
//!
//! The culler reads the [`FitnessStats`](crate::FitnessStats) snapshot written
//! by the [`StagnationTracker`](crate::StagnationTracker), so it can run after
//! reproduction has replaced the evaluated individuals.

use serde::{Deserialize, Serialize};
use tracing::{info, trace};

use crate::config::EvolutionConfig;
use crate::population::Population;
use crate::species::{Species, SpeciesId};

/// How many eligible species one pass removes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CullingAggressiveness {
    /// Remove only the lowest-performing eligible species.
    #[default]
    LowestOnly,
    /// Remove every eligible species.
    AllEligible,
}

/// Why a culling pass did or did not remove species.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullingGate {
    /// All gates passed.
    Passed,
    /// Species count is not above the minimum.
    AtMinimumSpecies,
    /// Fewer than two species are eligible once the best is excluded.
    TooFewEligible,
}

/// Per-species eligibility snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullingStatus {
    pub species: SpeciesId,
    /// Age exceeds the grace period.
    pub past_grace: bool,
    /// Stagnation counter exceeds the threshold.
    pub stagnant: bool,
    /// Fitness variance is below the diversity threshold.
    pub low_diversity: bool,
    /// Relative performance is below the threshold.
    pub below_relative_performance: bool,
    /// Species best divided by population best, sign-adjusted.
    pub relative_performance: f32,
    /// This is the globally best species.
    pub is_best: bool,
}

impl CullingStatus {
    /// Whether this species may be culled.
    #[inline]
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        !self.is_best
            && (self.past_grace
                || self.stagnant
                || self.low_diversity
                || self.below_relative_performance)
    }
}

/// Result of a culling pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CullingOutcome {
    pub gate: CullingGate,
    /// Species removed from the population, lowest performer first.
    pub removed: Vec<SpeciesId>,
}

/// Ratio of a species' best fitness to the population best, in `[0, 1]`.
///
/// With positive fitness this is `species / population`. With negative
/// fitness (closer to zero is better) it is `population / species`. A species
/// on the other side of zero from a positive population best scores 0; two
/// zeros score 1.
#[must_use]
pub fn relative_performance(species_best: f32, population_best: f32) -> f32 {
    if !species_best.is_finite() || !population_best.is_finite() {
        return 0.0;
    }
    let ratio = if population_best > 0.0 {
        if species_best > 0.0 {
            species_best / population_best
        } else {
            0.0
        }
    } else if population_best < 0.0 {
        population_best / species_best
    } else if species_best < 0.0 {
        0.0
    } else {
        1.0
    };
    ratio.clamp(0.0, 1.0)
}

/// Decides which species to remove.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesCuller {
    pub grace_generations: usize,
    pub stagnation_threshold: usize,
    pub diversity_threshold: f32,
    pub relative_performance_threshold: f32,
    pub min_species_count: usize,
    pub aggressiveness: CullingAggressiveness,
}

impl SpeciesCuller {
    #[must_use]
    pub fn from_config(config: &EvolutionConfig) -> Self {
        Self {
            grace_generations: config.grace_generations,
            stagnation_threshold: config.stagnation_threshold,
            diversity_threshold: config.species_diversity_threshold,
            relative_performance_threshold: config.relative_performance_threshold,
            min_species_count: config.min_species_count,
            aggressiveness: config.culling_aggressiveness,
        }
    }

    fn recorded_best(species: &Species) -> f32 {
        species.stats.best.unwrap_or(f32::NEG_INFINITY)
    }

    /// The species with the highest recorded generation best. Ties go to the
    /// first in iteration order.
    #[must_use]
    pub fn best_species(population: &Population) -> Option<SpeciesId> {
        population
            .species
            .iter()
            .map(|(id, s)| (id, Self::recorded_best(s)))
            .reduce(|best, next| if next.1 > best.1 { next } else { best })
            .map(|(id, _)| id)
    }

    /// Eligibility snapshot for every species, in iteration order.
    #[must_use]
    pub fn statuses(&self, population: &Population) -> Vec<CullingStatus> {
        let best_id = Self::best_species(population);
        let population_best = best_id
            .and_then(|id| population.get(id))
            .map_or(f32::NEG_INFINITY, Self::recorded_best);

        population
            .species
            .iter()
            .map(|(id, species)| {
                let relative = relative_performance(Self::recorded_best(species), population_best);
                CullingStatus {
                    species: id,
                    past_grace: species.age > self.grace_generations,
                    stagnant: species.generations_without_improvement > self.stagnation_threshold,
                    low_diversity: species.stats.variance < self.diversity_threshold,
                    below_relative_performance: relative < self.relative_performance_threshold,
                    relative_performance: relative,
                    is_best: Some(id) == best_id,
                }
            })
            .collect()
    }

    /// Choose the species to remove without touching the population.
    #[must_use]
    pub fn select(&self, population: &Population) -> CullingOutcome {
        let count = population.species_count();
        if count <= self.min_species_count {
            trace!(count, min = self.min_species_count, "Culling skipped: at minimum species");
            return CullingOutcome {
                gate: CullingGate::AtMinimumSpecies,
                removed: Vec::new(),
            };
        }

        let mut eligible: Vec<(SpeciesId, f32)> = self
            .statuses(population)
            .into_iter()
            .filter(CullingStatus::is_eligible)
            .filter_map(|status| {
                population
                    .get(status.species)
                    .map(|s| (status.species, Self::recorded_best(s)))
            })
            .collect();
        if eligible.len() < 2 {
            trace!(eligible = eligible.len(), "Culling skipped: too few eligible species");
            return CullingOutcome {
                gate: CullingGate::TooFewEligible,
                removed: Vec::new(),
            };
        }

        eligible.sort_by(|a, b| a.1.total_cmp(&b.1));
        let limit = match self.aggressiveness {
            CullingAggressiveness::LowestOnly => 1,
            CullingAggressiveness::AllEligible => eligible.len(),
        };
        let removable = count - self.min_species_count;
        CullingOutcome {
            gate: CullingGate::Passed,
            removed: eligible
                .into_iter()
                .take(limit.min(removable))
                .map(|(id, _)| id)
                .collect(),
        }
    }

    /// Select and remove species. Replacements are the caller's job.
    pub fn cull(&self, population: &mut Population) -> CullingOutcome {
        let outcome = self.select(population);
        for &id in &outcome.removed {
            if let Some(species) = population.remove_species(id) {
                info!(
                    ?id,
                    age = species.age,
                    best = ?species.stats.best,
                    stagnant_for = species.generations_without_improvement,
                    "Culled species"
                );
            }
        }
        outcome
    }
}
