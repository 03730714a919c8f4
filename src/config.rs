//! Evolution configuration.
//!
//! [`EvolutionConfig`] is a plain serde struct. Nothing is clamped silently:
//! [`EvolutionConfig::validate`] rejects inconsistent settings and
//! [`Evolver::new`](crate::Evolver::new) refuses to start without it passing.
//!
//! Sweep harnesses can tweak a config with flat `key=value` strings:
//!
//! ```rust
//! use symbios_evolvion::EvolutionConfig;
//!
//! let mut config = EvolutionConfig::xor();
//! config
//!     .apply_overrides(["species_count=6", "weight_jitter=0.25", "l1_shrink_factor=0.95"])
//!     .unwrap();
//! assert_eq!(config.species_count, 6);
//! assert!((config.mutation.l1_shrink - 0.05).abs() < 1e-6);
//! assert!(config.validate().is_ok());
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::culling::CullingAggressiveness;
use crate::mutation::MutationRates;
use crate::topology_mutation::TopologyMutationRates;

/// Errors raised by configuration validation and overrides.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A numeric setting lies outside its valid range.
    #[error("`{field}` = {value} is out of range (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: f32,
        expected: &'static str,
    },
    /// A count that must be positive is zero.
    #[error("`{field}` must be at least 1")]
    ZeroCount { field: &'static str },
    /// Elites fill a whole species, leaving no slot for a mutated offspring.
    #[error("elites ({elites}) must be below individuals_per_species ({individuals})")]
    TooManyElites { elites: usize, individuals: usize },
    /// Minimum species count above the configured species count.
    #[error("min_species_count ({min}) exceeds species_count ({count})")]
    MinSpeciesExceedsCount { min: usize, count: usize },
    /// An override named a key this config does not have.
    #[error("unknown configuration key `{key}`")]
    UnknownKey { key: String },
    /// An override value failed to parse.
    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
    /// An override string without `=`.
    #[error("override `{0}` is not of the form key=value")]
    MalformedOverride(String),
}

pub(crate) fn check_probability(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "[0, 1]",
        })
    }
}

pub(crate) fn check_non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "finite and >= 0",
        })
    }
}

fn check_positive_count(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::ZeroCount { field })
    } else {
        Ok(())
    }
}

/// Removal of edges that carry little weight across a species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeakEdgePruning {
    /// Master switch.
    pub enabled: bool,
    /// Edges with mean |weight| below this are candidates.
    pub threshold: f32,
    /// Probability that a candidate edge is removed.
    pub base_rate: f32,
    /// Prune replacement species right after they are created.
    pub on_birth: bool,
    /// Prune every species after each reproduction step.
    pub during_evolution: bool,
}

impl Default for WeakEdgePruning {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.01,
            base_rate: 0.5,
            on_birth: true,
            during_evolution: false,
        }
    }
}

/// Every knob of the generational loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Number of species kept alive.
    pub species_count: usize,
    /// Individuals in each species.
    pub individuals_per_species: usize,
    /// Culling never reduces the population to this many species or fewer.
    pub min_species_count: usize,
    /// Top individuals copied unchanged into the next generation.
    pub elites: usize,
    /// Contestants per tournament.
    pub tournament_size: usize,
    /// Fraction of each species (best first) eligible as parents.
    pub parent_pool_percentage: f32,
    /// Species older than this are cull-eligible.
    pub grace_generations: usize,
    /// Species stagnant for more generations than this are cull-eligible.
    pub stagnation_threshold: usize,
    /// Minimum improvement that counts as progress.
    pub stagnation_epsilon: f32,
    /// Species with fitness variance below this are cull-eligible.
    pub species_diversity_threshold: f32,
    /// Species whose best / population best falls below this are cull-eligible.
    pub relative_performance_threshold: f32,
    /// How many eligible species a culling pass removes.
    pub culling_aggressiveness: CullingAggressiveness,
    /// Parameter mutation applied to every offspring.
    pub mutation: MutationRates,
    /// Structural mutation applied to replacement species' topologies.
    pub topology_mutation: TopologyMutationRates,
    /// Optional weak-edge pruning.
    pub weak_edge_pruning: WeakEdgePruning,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            species_count: 4,
            individuals_per_species: 50,
            min_species_count: 2,
            elites: 2,
            tournament_size: 3,
            parent_pool_percentage: 0.5,
            grace_generations: 10,
            stagnation_threshold: 15,
            stagnation_epsilon: 1e-6,
            species_diversity_threshold: 1e-6,
            relative_performance_threshold: 0.5,
            culling_aggressiveness: CullingAggressiveness::LowestOnly,
            mutation: MutationRates::default(),
            topology_mutation: TopologyMutationRates::default(),
            weak_edge_pruning: WeakEdgePruning::default(),
        }
    }
}

impl EvolutionConfig {
    /// Preset for the XOR benchmark: 4 species of 100 individuals.
    #[must_use]
    pub fn xor() -> Self {
        Self {
            species_count: 4,
            individuals_per_species: 100,
            min_species_count: 2,
            elites: 4,
            tournament_size: 4,
            parent_pool_percentage: 0.3,
            grace_generations: 20,
            stagnation_threshold: 20,
            mutation: MutationRates {
                weight_jitter: 0.5,
                weight_jitter_stddev: 0.4,
                weight_reset: 0.02,
                bias_jitter: 0.5,
                bias_jitter_stddev: 0.3,
                bias_reset: 0.02,
                l1_shrink_probability: 0.05,
                l1_shrink: 0.05,
                activation_swap: 0.05,
                node_param_mutate: 0.05,
                node_param_stddev: 0.1,
                parameter_limit: 10.0,
            },
            ..Self::default()
        }
    }

    /// Total individuals across all species.
    #[inline]
    #[must_use]
    pub fn population_size(&self) -> usize {
        self.species_count * self.individuals_per_species
    }

    /// Check every setting.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive_count("species_count", self.species_count)?;
        check_positive_count("individuals_per_species", self.individuals_per_species)?;
        check_positive_count("tournament_size", self.tournament_size)?;
        if self.min_species_count > self.species_count {
            return Err(ConfigError::MinSpeciesExceedsCount {
                min: self.min_species_count,
                count: self.species_count,
            });
        }
        if self.elites >= self.individuals_per_species {
            return Err(ConfigError::TooManyElites {
                elites: self.elites,
                individuals: self.individuals_per_species,
            });
        }
        if !(self.parent_pool_percentage > 0.0 && self.parent_pool_percentage <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "parent_pool_percentage",
                value: self.parent_pool_percentage,
                expected: "(0, 1]",
            });
        }
        check_non_negative("stagnation_epsilon", self.stagnation_epsilon)?;
        check_non_negative("species_diversity_threshold", self.species_diversity_threshold)?;
        check_non_negative(
            "relative_performance_threshold",
            self.relative_performance_threshold,
        )?;
        self.mutation.validate()?;
        self.topology_mutation.validate()?;
        check_non_negative("weak_edge_pruning_threshold", self.weak_edge_pruning.threshold)?;
        check_probability("weak_edge_pruning_base_rate", self.weak_edge_pruning.base_rate)?;
        Ok(())
    }

    /// Set one field from a flat key and its textual value.
    ///
    /// `weight_l1_shrink` sets the shrink probability and `l1_shrink_factor`
    /// sets the retained fraction (`l1_shrink = 1 - factor`). The result is
    /// not validated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownKey`] or [`ConfigError::InvalidValue`].
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let m = &mut self.mutation;
        let t = &mut self.topology_mutation;
        let p = &mut self.weak_edge_pruning;
        match key {
            "species_count" => self.species_count = parse(key, value)?,
            "individuals_per_species" => self.individuals_per_species = parse(key, value)?,
            "min_species_count" => self.min_species_count = parse(key, value)?,
            "elites" => self.elites = parse(key, value)?,
            "tournament_size" => self.tournament_size = parse(key, value)?,
            "parent_pool_percentage" => self.parent_pool_percentage = parse(key, value)?,
            "grace_generations" => self.grace_generations = parse(key, value)?,
            "stagnation_threshold" => self.stagnation_threshold = parse(key, value)?,
            "stagnation_epsilon" => self.stagnation_epsilon = parse(key, value)?,
            "species_diversity_threshold" => {
                self.species_diversity_threshold = parse(key, value)?;
            }
            "relative_performance_threshold" => {
                self.relative_performance_threshold = parse(key, value)?;
            }
            "culling_aggressiveness" => {
                self.culling_aggressiveness = match value.trim() {
                    "lowest_only" => CullingAggressiveness::LowestOnly,
                    "all_eligible" => CullingAggressiveness::AllEligible,
                    _ => return Err(invalid(key, value)),
                };
            }
            "weight_jitter" => m.weight_jitter = parse(key, value)?,
            "weight_jitter_stddev" => m.weight_jitter_stddev = parse(key, value)?,
            "weight_reset" => m.weight_reset = parse(key, value)?,
            "bias_jitter" => m.bias_jitter = parse(key, value)?,
            "bias_jitter_stddev" => m.bias_jitter_stddev = parse(key, value)?,
            "bias_reset" => m.bias_reset = parse(key, value)?,
            "weight_l1_shrink" | "l1_shrink_probability" => {
                m.l1_shrink_probability = parse(key, value)?;
            }
            "l1_shrink" => m.l1_shrink = parse(key, value)?,
            "l1_shrink_factor" => m.l1_shrink = 1.0 - parse::<f32>(key, value)?,
            "activation_swap" => m.activation_swap = parse(key, value)?,
            "node_param_mutate" => m.node_param_mutate = parse(key, value)?,
            "node_param_stddev" => m.node_param_stddev = parse(key, value)?,
            "parameter_limit" => m.parameter_limit = parse(key, value)?,
            "edge_add" => t.edge_add = parse(key, value)?,
            "edge_delete_random" => t.edge_delete_random = parse(key, value)?,
            "edge_split" => t.edge_split = parse(key, value)?,
            "edge_redirect" => t.edge_redirect = parse(key, value)?,
            "edge_swap" => t.edge_swap = parse(key, value)?,
            "weak_edge_pruning_enabled" => p.enabled = parse(key, value)?,
            "weak_edge_pruning_threshold" => p.threshold = parse(key, value)?,
            "weak_edge_pruning_base_rate" => p.base_rate = parse(key, value)?,
            "weak_edge_pruning_on_birth" => p.on_birth = parse(key, value)?,
            "weak_edge_pruning_during_evolution" => p.during_evolution = parse(key, value)?,
            _ => {
                return Err(ConfigError::UnknownKey {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    /// Apply a sequence of `key=value` overrides in order.
    ///
    /// # Errors
    ///
    /// Stops at the first malformed, unknown, or unparsable override.
    pub fn apply_overrides<I, S>(&mut self, overrides: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for entry in overrides {
            let entry = entry.as_ref();
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedOverride(entry.to_string()))?;
            self.apply_override(key.trim(), value.trim())?;
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}
