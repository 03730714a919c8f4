//! Fitness evaluation.
//!
//! Two interchangeable [`Evaluator`]s turn individuals into fitness by running
//! episodes of an [`Environment`] through a compiled [`Network`]:
//!
//! - [`SequentialEvaluator`]: the reference. Genomes run one at a time, each
//!   with its own episode seed drawn in order from the population seed.
//! - [`BatchedEvaluator`]: every genome is a lane. Lanes advance in lock-step,
//!   one timestep at a time across the whole batch, in parallel with rayon.
//!   Each lane owns its environment clone and an independent random stream,
//!   and fitness is only written back once the batch completes.
//!
//! Fitness is the mean episode return. Both evaluators agree within
//! [`DEFAULT_AGREEMENT_TOLERANCE`] on environments whose return does not hinge
//! on the episode seed beyond ordering; [`compare_evaluators`] checks this.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};

use crate::environment::Environment;
use crate::genome::Individual;
use crate::network::Network;
use crate::population::Population;
use crate::species::SpeciesId;
use crate::topology::Topology;

/// Absolute fitness difference tolerated between the two evaluators.
pub const DEFAULT_AGREEMENT_TOLERANCE: f32 = 1e-3;

/// Shape mismatches between an environment, a topology and an individual.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluatorError {
    #[error("environment observes {observation} values but the topology has {inputs} inputs")]
    ObservationMismatch { observation: usize, inputs: usize },
    #[error("environment expects {action} action values but the topology has {outputs} outputs")]
    ActionMismatch { action: usize, outputs: usize },
    #[error(
        "individual has {weights} weights and {biases} biases, topology needs {edges} and {nodes}"
    )]
    ParameterMismatch {
        edges: usize,
        nodes: usize,
        weights: usize,
        biases: usize,
    },
}

/// Check that an environment fits a topology's input and output rows.
///
/// # Errors
///
/// Returns the first mismatch found.
pub fn check_shapes<E: Environment>(
    environment: &E,
    topology: &Topology,
) -> Result<(), EvaluatorError> {
    if environment.observation_size() != topology.input_count() {
        return Err(EvaluatorError::ObservationMismatch {
            observation: environment.observation_size(),
            inputs: topology.input_count(),
        });
    }
    if environment.action_size() != topology.output_count() {
        return Err(EvaluatorError::ActionMismatch {
            action: environment.action_size(),
            outputs: topology.output_count(),
        });
    }
    Ok(())
}

/// Fitness from accumulated episode returns.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn mean_return(total: f64, episodes: usize) -> f32 {
    let mean = total / episodes.max(1) as f64;
    if mean.is_nan() {
        f32::MIN
    } else {
        (mean as f32).clamp(f32::MIN, f32::MAX)
    }
}

/// Maps genomes to fitness.
pub trait Evaluator {
    /// Fitness of one individual.
    ///
    /// # Errors
    ///
    /// Returns an [`EvaluatorError`] on shape mismatch.
    fn evaluate<E: Environment + Clone + Send>(
        &self,
        individual: &Individual,
        topology: &Topology,
        environment: &E,
        seed: u64,
    ) -> Result<f32, EvaluatorError>;

    /// Assign a fitness to every individual in the population.
    ///
    /// # Errors
    ///
    /// Returns an [`EvaluatorError`] on shape mismatch; no fitness is written
    /// for the failing species.
    fn evaluate_population<E: Environment + Clone + Send>(
        &self,
        population: &mut Population,
        environment: &E,
        seed: u64,
    ) -> Result<(), EvaluatorError>;
}

/// One-genome-at-a-time reference evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequentialEvaluator {
    /// Episodes averaged per genome.
    pub episodes: usize,
}

impl Default for SequentialEvaluator {
    fn default() -> Self {
        Self { episodes: 1 }
    }
}

impl SequentialEvaluator {
    #[must_use]
    pub fn new(episodes: usize) -> Self {
        Self {
            episodes: episodes.max(1),
        }
    }

    fn run_episode<E: Environment>(network: &mut Network, environment: &mut E, seed: u64) -> f64 {
        let mut observation = environment.reset(seed);
        let mut action = vec![0.0; network.output_count()];
        let mut total = 0.0_f64;
        for _ in 0..environment.max_steps() {
            network.evaluate_into(&observation, &mut action);
            let result = environment.step(&action);
            total += f64::from(result.reward);
            if result.done {
                break;
            }
            observation = result.observation;
        }
        total
    }
}

impl Evaluator for SequentialEvaluator {
    fn evaluate<E: Environment + Clone + Send>(
        &self,
        individual: &Individual,
        topology: &Topology,
        environment: &E,
        seed: u64,
    ) -> Result<f32, EvaluatorError> {
        check_shapes(environment, topology)?;
        let mut network = Network::new(topology, individual)?;
        let mut environment = environment.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let total: f64 = (0..self.episodes)
            .map(|_| Self::run_episode(&mut network, &mut environment, rng.random()))
            .sum();
        Ok(mean_return(total, self.episodes))
    }

    fn evaluate_population<E: Environment + Clone + Send>(
        &self,
        population: &mut Population,
        environment: &E,
        seed: u64,
    ) -> Result<(), EvaluatorError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for species in population.species.values_mut() {
            check_shapes(environment, &species.topology)?;
            let topology = species.topology.clone();
            for individual in &mut species.individuals {
                let fitness = self.evaluate(individual, &topology, environment, rng.random())?;
                individual.fitness = Some(fitness);
            }
        }
        Ok(())
    }
}

/// One genome's slot in a batch.
struct Lane<E> {
    network: Network,
    environment: E,
    rng: ChaCha8Rng,
    observation: Vec<f32>,
    action: Vec<f32>,
    episode_return: f64,
    total: f64,
    done: bool,
}

impl<E: Environment> Lane<E> {
    fn new(network: Network, environment: E, seed: u64, stream: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(stream);
        let action = vec![0.0; network.output_count()];
        Self {
            network,
            environment,
            rng,
            observation: Vec::new(),
            action,
            episode_return: 0.0,
            total: 0.0,
            done: true,
        }
    }

    fn begin_episode(&mut self) {
        let episode_seed = self.rng.random();
        self.observation = self.environment.reset(episode_seed);
        self.episode_return = 0.0;
        self.done = false;
    }

    fn advance(&mut self) {
        if self.done {
            return;
        }
        self.network.evaluate_into(&self.observation, &mut self.action);
        let result = self.environment.step(&self.action);
        self.episode_return += f64::from(result.reward);
        self.observation = result.observation;
        self.done = result.done;
    }

    fn end_episode(&mut self) {
        self.total += self.episode_return;
        self.done = true;
    }
}

/// Lock-step parallel evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchedEvaluator {
    /// Episodes averaged per genome.
    pub episodes: usize,
}

impl Default for BatchedEvaluator {
    fn default() -> Self {
        Self { episodes: 1 }
    }
}

impl BatchedEvaluator {
    #[must_use]
    pub fn new(episodes: usize) -> Self {
        Self {
            episodes: episodes.max(1),
        }
    }

    /// Run every lane through all episodes and return per-lane fitness.
    fn run_batch<E: Environment + Send>(&self, lanes: &mut [Lane<E>], max_steps: usize) -> Vec<f32> {
        for _ in 0..self.episodes {
            lanes.par_iter_mut().for_each(Lane::begin_episode);
            for _ in 0..max_steps {
                lanes.par_iter_mut().for_each(Lane::advance);
                if lanes.iter().all(|lane| lane.done) {
                    break;
                }
            }
            lanes.par_iter_mut().for_each(Lane::end_episode);
        }
        lanes
            .iter()
            .map(|lane| mean_return(lane.total, self.episodes))
            .collect()
    }
}

impl Evaluator for BatchedEvaluator {
    fn evaluate<E: Environment + Clone + Send>(
        &self,
        individual: &Individual,
        topology: &Topology,
        environment: &E,
        seed: u64,
    ) -> Result<f32, EvaluatorError> {
        check_shapes(environment, topology)?;
        let network = Network::new(topology, individual)?;
        let mut lanes = vec![Lane::new(network, environment.clone(), seed, 1)];
        let fitness = self.run_batch(&mut lanes, environment.max_steps());
        Ok(fitness[0])
    }

    fn evaluate_population<E: Environment + Clone + Send>(
        &self,
        population: &mut Population,
        environment: &E,
        seed: u64,
    ) -> Result<(), EvaluatorError> {
        let mut slots: Vec<(SpeciesId, usize)> = Vec::with_capacity(population.individual_count());
        let mut lanes = Vec::with_capacity(population.individual_count());
        for (id, species) in &population.species {
            check_shapes(environment, &species.topology)?;
            for (index, individual) in species.individuals.iter().enumerate() {
                let network = Network::new(&species.topology, individual)?;
                let stream = lanes.len() as u64 + 1;
                lanes.push(Lane::new(network, environment.clone(), seed, stream));
                slots.push((id, index));
            }
        }

        debug!(lanes = lanes.len(), episodes = self.episodes, "Running batch");
        let fitness = self.run_batch(&mut lanes, environment.max_steps());
        for ((id, index), fitness) in slots.into_iter().zip(fitness) {
            if let Some(individual) = population
                .get_mut(id)
                .and_then(|s| s.individuals.get_mut(index))
            {
                individual.fitness = Some(fitness);
            }
        }
        Ok(())
    }
}

/// Fitness pairs that differ by more than the tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct Disagreement {
    pub species: SpeciesId,
    pub index: usize,
    pub first: f32,
    pub second: f32,
}

/// Result of running two evaluators on the same population.
#[derive(Debug, Clone, PartialEq)]
pub struct AgreementReport {
    pub tolerance: f32,
    /// Individuals compared.
    pub compared: usize,
    pub max_abs_difference: f32,
    pub disagreements: Vec<Disagreement>,
}

impl AgreementReport {
    #[must_use]
    pub fn within_tolerance(&self) -> bool {
        self.disagreements.is_empty()
    }
}

/// Evaluate copies of `population` with both evaluators and compare fitness.
///
/// Disagreement is reported with `warn!`, never treated as an error.
///
/// # Errors
///
/// Propagates evaluator shape errors.
pub fn compare_evaluators<A, B, E>(
    first: &A,
    second: &B,
    population: &Population,
    environment: &E,
    seed: u64,
    tolerance: f32,
) -> Result<AgreementReport, EvaluatorError>
where
    A: Evaluator,
    B: Evaluator,
    E: Environment + Clone + Send,
{
    let mut a = population.clone();
    let mut b = population.clone();
    first.evaluate_population(&mut a, environment, seed)?;
    second.evaluate_population(&mut b, environment, seed)?;

    let mut report = AgreementReport {
        tolerance,
        compared: 0,
        max_abs_difference: 0.0,
        disagreements: Vec::new(),
    };
    for (id, species) in &a.species {
        let Some(other) = b.get(id) else { continue };
        for (index, (x, y)) in species.individuals.iter().zip(&other.individuals).enumerate() {
            let (Some(x), Some(y)) = (x.fitness, y.fitness) else {
                continue;
            };
            let difference = (x - y).abs();
            report.compared += 1;
            report.max_abs_difference = report.max_abs_difference.max(difference);
            if difference > tolerance {
                report.disagreements.push(Disagreement {
                    species: id,
                    index,
                    first: x,
                    second: y,
                });
            }
        }
    }

    if !report.within_tolerance() {
        warn!(
            disagreements = report.disagreements.len(),
            compared = report.compared,
            max_abs_difference = report.max_abs_difference,
            tolerance,
            "Evaluators disagree beyond tolerance"
        );
    }
    Ok(report)
}
