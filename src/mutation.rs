//! Parameter mutation operators.
//!
//! Every operator is a free function over an [`Individual`] (plus its
//! [`Topology`] where bounds or allowed activations are needed) and an
//! explicit random source. Two individuals with identical parameters mutated
//! by identically seeded generators end up bit-identical.
//!
//! [`mutate_individual`] applies the whole [`MutationRates`] bundle in a fixed
//! order: reset, jitter, L1 shrink, activation swap, node parameters, clamp.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::config::{check_non_negative, check_probability, ConfigError};
use crate::gene::NodeRole;
use crate::genome::{bias_bound, fan_out, glorot_bound, Individual};
use crate::topology::Topology;

/// Per-offspring mutation probabilities and magnitudes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRates {
    /// Probability of jittering each weight.
    pub weight_jitter: f32,
    /// Standard deviation of weight jitter.
    pub weight_jitter_stddev: f32,
    /// Probability of resetting each weight to a fresh Glorot draw.
    pub weight_reset: f32,
    /// Probability of jittering each bias.
    pub bias_jitter: f32,
    /// Standard deviation of bias jitter.
    pub bias_jitter_stddev: f32,
    /// Probability of resetting each bias.
    pub bias_reset: f32,
    /// Probability that an offspring is L1-shrunk.
    pub l1_shrink_probability: f32,
    /// Fraction of each parameter's magnitude removed by an L1 shrink.
    pub l1_shrink: f32,
    /// Probability of swapping each swappable node's activation.
    pub activation_swap: f32,
    /// Probability of perturbing each parametric node's parameter.
    pub node_param_mutate: f32,
    /// Standard deviation of node-parameter perturbation.
    pub node_param_stddev: f32,
    /// Absolute bound applied to every weight and bias after mutation.
    pub parameter_limit: f32,
}

impl Default for MutationRates {
    fn default() -> Self {
        Self {
            weight_jitter: 0.9,
            weight_jitter_stddev: 0.3,
            weight_reset: 0.05,
            bias_jitter: 0.5,
            bias_jitter_stddev: 0.2,
            bias_reset: 0.05,
            l1_shrink_probability: 0.1,
            l1_shrink: 0.1,
            activation_swap: 0.05,
            node_param_mutate: 0.05,
            node_param_stddev: 0.1,
            parameter_limit: 10.0,
        }
    }
}

impl MutationRates {
    /// Rates that leave an individual untouched.
    #[must_use]
    pub fn none() -> Self {
        Self {
            weight_jitter: 0.0,
            weight_jitter_stddev: 0.0,
            weight_reset: 0.0,
            bias_jitter: 0.0,
            bias_jitter_stddev: 0.0,
            bias_reset: 0.0,
            l1_shrink_probability: 0.0,
            l1_shrink: 0.0,
            activation_swap: 0.0,
            node_param_mutate: 0.0,
            node_param_stddev: 0.0,
            parameter_limit: f32::MAX,
        }
    }

    /// Check that every probability lies in `[0, 1]` and every magnitude is
    /// finite and non-negative.
    ///
    /// # Errors
    ///
    /// Returns the first offending field as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability("weight_jitter", self.weight_jitter)?;
        check_non_negative("weight_jitter_stddev", self.weight_jitter_stddev)?;
        check_probability("weight_reset", self.weight_reset)?;
        check_probability("bias_jitter", self.bias_jitter)?;
        check_non_negative("bias_jitter_stddev", self.bias_jitter_stddev)?;
        check_probability("bias_reset", self.bias_reset)?;
        check_probability("l1_shrink_probability", self.l1_shrink_probability)?;
        check_probability("l1_shrink", self.l1_shrink)?;
        check_probability("activation_swap", self.activation_swap)?;
        check_probability("node_param_mutate", self.node_param_mutate)?;
        check_non_negative("node_param_stddev", self.node_param_stddev)?;
        check_non_negative("parameter_limit", self.parameter_limit)?;
        if self.parameter_limit == 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "parameter_limit",
                value: 0.0,
                expected: "> 0",
            });
        }
        Ok(())
    }
}

/// Add `N(0, stddev)` noise to each value with the given probability.
pub fn jitter<R: Rng>(values: &mut [f32], probability: f32, stddev: f32, rng: &mut R) {
    for value in values {
        if rng.random::<f32>() < probability {
            let noise: f32 = rng.sample(StandardNormal);
            *value += noise * stddev;
        }
    }
}

/// Jitter an individual's weights.
pub fn jitter_weights<R: Rng>(
    individual: &mut Individual,
    probability: f32,
    stddev: f32,
    rng: &mut R,
) {
    jitter(&mut individual.weights, probability, stddev, rng);
}

/// Jitter an individual's biases.
pub fn jitter_biases<R: Rng>(
    individual: &mut Individual,
    probability: f32,
    stddev: f32,
    rng: &mut R,
) {
    jitter(&mut individual.biases, probability, stddev, rng);
}

/// Replace each weight, with the given probability, by a fresh draw from its
/// Glorot range.
pub fn reset_weights<R: Rng>(
    individual: &mut Individual,
    topology: &Topology,
    probability: f32,
    rng: &mut R,
) {
    let fan_out = fan_out(topology);
    for (index, weight) in individual.weights.iter_mut().enumerate() {
        if rng.random::<f32>() < probability {
            let edge = topology.edges()[index];
            let bound = glorot_bound(topology.in_degree(edge.target), fan_out[edge.source]);
            *weight = rng.random_range(-bound..=bound);
        }
    }
}

/// Replace each bias, with the given probability, by a fresh draw from its
/// node's symmetric range.
pub fn reset_biases<R: Rng>(
    individual: &mut Individual,
    topology: &Topology,
    probability: f32,
    rng: &mut R,
) {
    for (node, bias) in individual.biases.iter_mut().enumerate() {
        if rng.random::<f32>() < probability {
            let bound = bias_bound(topology, node);
            *bias = rng.random_range(-bound..=bound);
        }
    }
}

/// Shrink a single value toward zero by the fraction `shrink` of its
/// magnitude. The sign never flips and the result never passes zero.
///
/// ```rust
/// use symbios_evolvion::mutation::l1_shrink_value;
///
/// assert!((l1_shrink_value(1.0, 0.1) - 0.9).abs() < 1e-6);
/// assert!((l1_shrink_value(-1.0, 0.1) - -0.9).abs() < 1e-6);
/// assert!((l1_shrink_value(0.5, 0.1) - 0.45).abs() < 1e-6);
/// assert!((l1_shrink_value(2.0, 0.2) - 1.6).abs() < 1e-6);
/// ```
#[inline]
#[must_use]
pub fn l1_shrink_value(value: f32, shrink: f32) -> f32 {
    let factor = (1.0 - shrink).clamp(0.0, 1.0);
    value * factor
}

/// Shrink every value in place.
pub fn l1_shrink(values: &mut [f32], shrink: f32) {
    for value in values {
        *value = l1_shrink_value(*value, shrink);
    }
}

/// Shrink every weight and bias of an individual.
pub fn l1_shrink_individual(individual: &mut Individual, shrink: f32) {
    l1_shrink(&mut individual.weights, shrink);
    l1_shrink(&mut individual.biases, shrink);
}

/// Swap, with the given probability, each non-input node's activation for a
/// different one from that node's allowed set.
///
/// Output nodes only ever allow Linear/Tanh, so the output restriction holds
/// by construction. The node parameter resets to the new activation's default.
pub fn swap_activations<R: Rng>(
    individual: &mut Individual,
    topology: &Topology,
    probability: f32,
    rng: &mut R,
) {
    for (node, gene) in topology.nodes().iter().enumerate() {
        if gene.role == NodeRole::Input || !gene.can_swap_activation() {
            continue;
        }
        if rng.random::<f32>() >= probability {
            continue;
        }
        let current = individual.activations[node];
        // Draw from the allowed set minus the current activation.
        let others = gene.allowed.iter().filter(|&&a| a != current).count();
        if others == 0 {
            continue;
        }
        let pick = rng.random_range(0..others);
        if let Some(&next) = gene.allowed.iter().filter(|&&a| a != current).nth(pick) {
            individual.activations[node] = next;
            individual.node_params[node] = next.default_param();
        }
    }
}

/// Perturb, with the given probability, the parameter of each node whose
/// current activation is parametric, clamped to the valid range.
pub fn mutate_node_params<R: Rng>(
    individual: &mut Individual,
    topology: &Topology,
    probability: f32,
    stddev: f32,
    rng: &mut R,
) {
    for node in 0..topology.node_count() {
        let activation = individual.activations[node];
        if !activation.is_parametric() {
            continue;
        }
        if rng.random::<f32>() < probability {
            let noise: f32 = rng.sample(StandardNormal);
            individual.node_params[node] =
                activation.clamp_param(individual.node_params[node] + noise * stddev);
        }
    }
}

/// Apply the full mutation bundle to an offspring and clear its fitness.
pub fn mutate_individual<R: Rng>(
    individual: &mut Individual,
    topology: &Topology,
    rates: &MutationRates,
    rng: &mut R,
) {
    reset_weights(individual, topology, rates.weight_reset, rng);
    reset_biases(individual, topology, rates.bias_reset, rng);
    jitter_weights(individual, rates.weight_jitter, rates.weight_jitter_stddev, rng);
    jitter_biases(individual, rates.bias_jitter, rates.bias_jitter_stddev, rng);
    if rng.random::<f32>() < rates.l1_shrink_probability {
        l1_shrink_individual(individual, rates.l1_shrink);
    }
    swap_activations(individual, topology, rates.activation_swap, rng);
    mutate_node_params(
        individual,
        topology,
        rates.node_param_mutate,
        rates.node_param_stddev,
        rng,
    );

    let limit = rates.parameter_limit;
    for value in individual.weights.iter_mut().chain(individual.biases.iter_mut()) {
        *value = value.clamp(-limit, limit);
    }
    individual.fitness = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::builder::TopologyBuilder;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn topology() -> Topology {
        TopologyBuilder::new()
            .add_input_row(2)
            .add_hidden_row(4, &Activation::ALL)
            .add_output_row(1, &Activation::OUTPUT)
            .fully_connect_layers()
            .build()
            .unwrap()
    }

    #[test]
    fn test_l1_shrink_examples() {
        assert!((l1_shrink_value(1.0, 0.1) - 0.9).abs() < 1e-6);
        assert!((l1_shrink_value(-1.0, 0.1) - -0.9).abs() < 1e-6);
        assert!((l1_shrink_value(0.5, 0.1) - 0.45).abs() < 1e-6);
        assert!((l1_shrink_value(2.0, 0.2) - 1.6).abs() < 1e-6);
    }

    #[test]
    fn test_l1_shrink_never_flips_sign() {
        for &value in &[0.05_f32, -0.05, 0.001, -0.001, 3.0, -3.0] {
            for &shrink in &[0.0_f32, 0.1, 0.5, 0.99, 1.0, 2.0] {
                let shrunk = l1_shrink_value(value, shrink);
                assert!(shrunk.abs() <= value.abs());
                assert!(shrunk == 0.0 || shrunk.signum() == value.signum());
            }
        }
        assert_eq!(l1_shrink_value(0.0, 0.5), 0.0);
    }

    #[test]
    fn test_jitter_deterministic() {
        let topo = topology();
        let base = Individual::random(&topo, &mut test_rng());

        let mut a = base.clone();
        let mut b = base.clone();
        jitter_weights(&mut a, 0.8, 0.3, &mut ChaCha8Rng::seed_from_u64(7));
        jitter_weights(&mut b, 0.8, 0.3, &mut ChaCha8Rng::seed_from_u64(7));
        assert_eq!(a.weights, b.weights);
        assert_ne!(a.weights, base.weights);
    }

    #[test]
    fn test_jitter_probability_zero_is_noop() {
        let topo = topology();
        let base = Individual::random(&topo, &mut test_rng());
        let mut copy = base.clone();
        jitter_biases(&mut copy, 0.0, 1.0, &mut test_rng());
        assert_eq!(copy, base);
    }

    #[test]
    fn test_bias_reset_explores_both_signs() {
        let topo = topology();
        let mut rng = test_rng();
        let mut individual = Individual::zeroed(&topo);
        let mut seen = Vec::new();
        for _ in 0..500 {
            reset_biases(&mut individual, &topo, 1.0, &mut rng);
            seen.push(individual.biases[6]);
        }
        let min = seen.iter().copied().fold(f32::INFINITY, f32::min);
        let max = seen.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        assert!(min < -0.5, "min {min}");
        assert!(max > 0.5, "max {max}");
    }

    #[test]
    fn test_weight_reset_within_bounds() {
        let topo = topology();
        let mut rng = test_rng();
        let mut individual = Individual::zeroed(&topo);
        reset_weights(&mut individual, &topo, 1.0, &mut rng);
        for (index, &w) in individual.weights.iter().enumerate() {
            assert!(w.abs() <= crate::genome::weight_bound(&topo, index));
        }
        assert!(individual.weights.iter().any(|&w| w != 0.0));
    }

    #[test]
    fn test_activation_swap_respects_allowed_sets() {
        let topo = topology();
        let mut rng = test_rng();
        let mut individual = Individual::zeroed(&topo);
        for _ in 0..200 {
            swap_activations(&mut individual, &topo, 1.0, &mut rng);
            for (node, gene) in topo.nodes().iter().enumerate() {
                if gene.role == NodeRole::Input {
                    assert_eq!(individual.activations[node], Activation::Linear);
                } else {
                    assert!(gene.allowed.contains(&individual.activations[node]));
                }
            }
            assert!(individual.activations[6].is_output_allowed());
        }
    }

    #[test]
    fn test_activation_swap_always_changes_swappable_nodes() {
        let topo = topology();
        let mut rng = test_rng();
        let mut individual = Individual::zeroed(&topo);
        let before = individual.activations.clone();
        swap_activations(&mut individual, &topo, 1.0, &mut rng);
        for node in topo.row_range(1) {
            assert_ne!(individual.activations[node], before[node]);
        }
    }

    #[test]
    fn test_node_params_stay_in_range() {
        let topo = topology();
        let mut rng = test_rng();
        let mut individual = Individual::zeroed(&topo);
        individual.activations[2] = Activation::LeakyReLU;
        individual.node_params[2] = Activation::LeakyReLU.default_param();
        individual.activations[3] = Activation::ELU;
        individual.node_params[3] = Activation::ELU.default_param();

        for _ in 0..200 {
            mutate_node_params(&mut individual, &topo, 1.0, 0.5, &mut rng);
            let (lo, hi) = Activation::LeakyReLU.param_range().unwrap();
            assert!((lo..=hi).contains(&individual.node_params[2]));
            let (lo, hi) = Activation::ELU.param_range().unwrap();
            assert!((lo..=hi).contains(&individual.node_params[3]));
        }
        assert_eq!(individual.node_params[4], 0.0);
    }

    #[test]
    fn test_mutate_individual_deterministic_and_clears_fitness() {
        let topo = topology();
        let mut base = Individual::random(&topo, &mut test_rng());
        base.fitness = Some(1.0);
        let rates = MutationRates {
            activation_swap: 0.5,
            l1_shrink_probability: 0.5,
            ..MutationRates::default()
        };

        let mut a = base.clone();
        let mut b = base.clone();
        mutate_individual(&mut a, &topo, &rates, &mut ChaCha8Rng::seed_from_u64(3));
        mutate_individual(&mut b, &topo, &rates, &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(a, b);
        assert!(a.fitness.is_none());
        assert!(base.fitness.is_some());
    }

    #[test]
    fn test_mutate_individual_clamps_parameters() {
        let topo = topology();
        let mut individual = Individual::random(&topo, &mut test_rng());
        individual.weights[0] = 1e6;
        let rates = MutationRates {
            parameter_limit: 5.0,
            ..MutationRates::none()
        };
        mutate_individual(&mut individual, &topo, &rates, &mut test_rng());
        assert_eq!(individual.weights[0], 5.0);
    }

    #[test]
    fn test_validate_rejects_out_of_range_probability() {
        let rates = MutationRates {
            weight_jitter: 1.5,
            ..MutationRates::default()
        };
        assert!(matches!(
            rates.validate(),
            Err(ConfigError::OutOfRange { field: "weight_jitter", .. })
        ));
        assert!(MutationRates::default().validate().is_ok());
        assert!(MutationRates::none().validate().is_ok());
    }
}
