//! Activation functions for evolved feed-forward networks.
//!
//! Every hidden or output node carries one [`Activation`] tag. Two kinds are
//! parametric ([`Activation::LeakyReLU`] slope and [`Activation::ELU`] alpha);
//! their scalar parameter lives alongside the tag and is evolved by the
//! node-parameter operator within [`Activation::param_range`].

use serde::{Deserialize, Serialize};

/// Activation function types supported by network nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Activation {
    /// Identity function: f(x) = x
    #[default]
    Linear,
    /// Hyperbolic tangent: f(x) = tanh(x)
    Tanh,
    /// Rectified Linear Unit: f(x) = max(0, x)
    ReLU,
    /// Sigmoid: f(x) = 1 / (1 + e^(-x))
    Sigmoid,
    /// Leaky ReLU: `f(x) = x` if `x > 0` else `slope * x`
    LeakyReLU,
    /// Exponential linear unit: `f(x) = x` if `x > 0` else `alpha * (e^x - 1)`
    ELU,
    /// Softsign: f(x) = x / (1 + |x|)
    Softsign,
    /// Softplus: f(x) = ln(1 + e^x)
    Softplus,
    /// Sine: f(x) = sin(x)
    Sin,
    /// Gaussian: f(x) = e^(-x^2)
    Gaussian,
    /// Gaussian error linear unit (tanh approximation).
    GELU,
}

impl Activation {
    /// All available activation functions.
    pub const ALL: [Self; 11] = [
        Self::Linear,
        Self::Tanh,
        Self::ReLU,
        Self::Sigmoid,
        Self::LeakyReLU,
        Self::ELU,
        Self::Softsign,
        Self::Softplus,
        Self::Sin,
        Self::Gaussian,
        Self::GELU,
    ];

    /// Activations permitted on output-row nodes.
    pub const OUTPUT: [Self; 2] = [Self::Linear, Self::Tanh];

    /// Whether this activation may be assigned to an output node.
    #[inline]
    #[must_use]
    pub fn is_output_allowed(self) -> bool {
        matches!(self, Self::Linear | Self::Tanh)
    }

    /// Whether this activation reads a scalar parameter.
    #[inline]
    #[must_use]
    pub fn is_parametric(self) -> bool {
        matches!(self, Self::LeakyReLU | Self::ELU)
    }

    /// Parameter assigned when a node first takes this activation.
    #[must_use]
    pub fn default_param(self) -> f32 {
        match self {
            Self::LeakyReLU => 0.01,
            Self::ELU => 1.0,
            _ => 0.0,
        }
    }

    /// Valid `[min, max]` range of the scalar parameter, if parametric.
    #[must_use]
    pub fn param_range(self) -> Option<(f32, f32)> {
        match self {
            Self::LeakyReLU => Some((0.0, 0.3)),
            Self::ELU => Some((0.1, 2.0)),
            _ => None,
        }
    }

    /// Clamp a parameter into this activation's valid range.
    ///
    /// Non-parametric activations always take `0.0`.
    #[must_use]
    pub fn clamp_param(self, param: f32) -> f32 {
        match self.param_range() {
            Some((lo, hi)) if param.is_finite() => param.clamp(lo, hi),
            Some(_) => self.default_param(),
            None => 0.0,
        }
    }

    /// Apply this activation function to a pre-activation value.
    ///
    /// Finite inputs always produce finite outputs. NaN propagates.
    #[inline]
    #[must_use]
    pub fn apply(self, x: f32, param: f32) -> f32 {
        if x.is_nan() {
            return f32::NAN;
        }

        match self {
            Self::Linear => x,
            Self::Tanh => x.tanh(),
            Self::ReLU => x.max(0.0),
            Self::Sigmoid => {
                // sigmoid(-88) underflows to 0 and sigmoid(88) to 1 in f32
                let clamped = x.clamp(-88.0, 88.0);
                1.0 / (1.0 + (-clamped).exp())
            }
            Self::LeakyReLU => {
                if x > 0.0 {
                    x
                } else {
                    param * x
                }
            }
            Self::ELU => {
                if x > 0.0 {
                    x
                } else {
                    param * x.exp_m1()
                }
            }
            Self::Softsign => {
                if x.is_infinite() {
                    return x.signum();
                }
                x / (1.0 + x.abs())
            }
            Self::Softplus => {
                // ln(1 + e^x) = max(x, 0) + ln(1 + e^-|x|), stable for large |x|
                x.max(0.0) + (-x.abs()).exp().ln_1p()
            }
            Self::Sin => {
                if x.is_infinite() {
                    return 0.0;
                }
                x.sin()
            }
            Self::Gaussian => {
                if x.abs() > 26.0 {
                    0.0
                } else {
                    (-x * x).exp()
                }
            }
            Self::GELU => {
                const SQRT_2_OVER_PI: f32 = 0.797_884_6;
                if x < -10.0 {
                    return 0.0;
                }
                if x > 10.0 {
                    return x;
                }
                let inner = SQRT_2_OVER_PI * (0.044_715 * x * x).mul_add(x, x);
                0.5 * x * (1.0 + inner.tanh())
            }
        }
    }
}
