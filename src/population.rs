//! The population: every species plus lineage counters.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::genome::Individual;
use crate::species::{Species, SpeciesId};
use crate::topology::Topology;

/// All species under evolution.
///
/// Serialization writes each species' topology in full, so a deserialized
/// population gives every species its own copy. Call
/// [`Population::share_topologies`] afterwards to restore sharing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Population {
    /// Species storage, iterated in slot order.
    pub species: SlotMap<SpeciesId, Species>,
    /// Completed generation steps.
    pub generation: usize,
    /// Species ever inserted, including the initial ones.
    pub total_species_created: usize,
}

impl Population {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a species and count it as created.
    pub fn insert_species(&mut self, species: Species) -> SpeciesId {
        self.total_species_created += 1;
        self.species.insert(species)
    }

    /// Remove a species.
    pub fn remove_species(&mut self, id: SpeciesId) -> Option<Species> {
        self.species.remove(id)
    }

    #[inline]
    #[must_use]
    pub fn species_count(&self) -> usize {
        self.species.len()
    }

    /// Total individuals across all species.
    #[must_use]
    pub fn individual_count(&self) -> usize {
        self.species.values().map(Species::len).sum()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: SpeciesId) -> Option<&Species> {
        self.species.get(id)
    }

    #[inline]
    #[must_use]
    pub fn get_mut(&mut self, id: SpeciesId) -> Option<&mut Species> {
        self.species.get_mut(id)
    }

    /// Species handles in iteration order.
    #[must_use]
    pub fn ids(&self) -> Vec<SpeciesId> {
        self.species.keys().collect()
    }

    /// Iterate over every individual.
    pub fn individuals(&self) -> impl Iterator<Item = &Individual> {
        self.species.values().flat_map(|s| s.individuals.iter())
    }

    /// Iterate mutably over every individual.
    pub fn individuals_mut(&mut self) -> impl Iterator<Item = &mut Individual> {
        self.species.values_mut().flat_map(|s| s.individuals.iter_mut())
    }

    /// Point species with structurally identical topologies at one shared
    /// handle. Returns how many species were re-pointed.
    pub fn share_topologies(&mut self) -> usize {
        let mut shared: HashMap<u64, Vec<Arc<Topology>>> = HashMap::new();
        let mut repointed = 0;
        for species in self.species.values_mut() {
            let bucket = shared.entry(species.topology.fingerprint()).or_default();
            let existing = bucket.iter().find(|t| ***t == *species.topology).cloned();
            match existing {
                Some(existing) => {
                    if !Arc::ptr_eq(&existing, &species.topology) {
                        species.topology = existing;
                        repointed += 1;
                    }
                }
                None => bucket.push(species.topology.clone()),
            }
        }
        repointed
    }

    /// The first unevaluated individual, if any.
    #[must_use]
    pub fn first_unevaluated(&self) -> Option<(SpeciesId, usize)> {
        self.species.iter().find_map(|(id, species)| {
            species
                .individuals
                .iter()
                .position(|i| !i.is_evaluated())
                .map(|index| (id, index))
        })
    }

    /// Whether every individual has a fitness.
    #[must_use]
    pub fn is_fully_evaluated(&self) -> bool {
        self.first_unevaluated().is_none()
    }

    /// The fittest evaluated individual and its species.
    #[must_use]
    pub fn best_individual(&self) -> Option<(SpeciesId, &Individual)> {
        self.species
            .iter()
            .filter_map(|(id, s)| s.best_individual().map(|i| (id, i)))
            .reduce(|best, next| {
                if next.1.fitness_or_min() > best.1.fitness_or_min() {
                    next
                } else {
                    best
                }
            })
    }

    /// Best fitness among current individuals.
    #[must_use]
    pub fn best_fitness(&self) -> Option<f32> {
        self.best_individual().and_then(|(_, i)| i.fitness)
    }

    /// Mean fitness over evaluated individuals.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn mean_fitness(&self) -> Option<f32> {
        let (sum, count) = self
            .individuals()
            .filter_map(|i| i.fitness)
            .fold((0.0_f64, 0usize), |(s, c), f| (s + f64::from(f), c + 1));
        (count > 0).then(|| (sum / count as f64) as f32)
    }
}
