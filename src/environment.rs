//! Task environments.
//!
//! The evolution core only depends on the [`Environment`] trait: reset with a
//! seed, then step with an action until `done` or the step budget runs out.
//! Two small reference tasks ship with the crate for tests, benches and the
//! demo.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Outcome of a single environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Observation for the next step.
    pub observation: Vec<f32>,
    /// Reward earned by this step.
    pub reward: f32,
    /// The episode has ended.
    pub done: bool,
}

/// An episodic task.
///
/// Evaluators clone the environment once per genome (or per lane), so
/// implementations should keep per-episode state inside the value.
pub trait Environment {
    /// Length of every observation.
    fn observation_size(&self) -> usize;

    /// Length of the action vector `step` expects.
    fn action_size(&self) -> usize;

    /// Step budget per episode.
    fn max_steps(&self) -> usize;

    /// Start a new episode and return the first observation.
    fn reset(&mut self, seed: u64) -> Vec<f32>;

    /// Apply an action.
    fn step(&mut self, action: &[f32]) -> StepResult;
}

/// XOR truth table: inputs and expected output.
pub const XOR_CASES: [([f32; 2], f32); 4] = [
    ([0.0, 0.0], 0.0),
    ([0.0, 1.0], 1.0),
    ([1.0, 0.0], 1.0),
    ([1.0, 1.0], 0.0),
];

/// The XOR truth table as a four-step episode.
///
/// Each step presents one case and rewards `-(output - target)^2 / 4`, so an
/// episode's return is the negative mean squared error over the table. The
/// case order is shuffled by the episode seed.
#[derive(Debug, Clone)]
pub struct XorEnvironment {
    order: [usize; 4],
    cursor: usize,
    shuffle: bool,
}

impl Default for XorEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl XorEnvironment {
    #[must_use]
    pub fn new() -> Self {
        Self {
            order: [0, 1, 2, 3],
            cursor: 0,
            shuffle: true,
        }
    }

    /// Present the cases in table order regardless of seed.
    #[must_use]
    pub fn in_order() -> Self {
        Self {
            shuffle: false,
            ..Self::new()
        }
    }

    fn observation(&self) -> Vec<f32> {
        self.order
            .get(self.cursor)
            .map_or_else(|| vec![0.0; 2], |&case| XOR_CASES[case].0.to_vec())
    }
}

impl Environment for XorEnvironment {
    fn observation_size(&self) -> usize {
        2
    }

    fn action_size(&self) -> usize {
        1
    }

    fn max_steps(&self) -> usize {
        XOR_CASES.len()
    }

    fn reset(&mut self, seed: u64) -> Vec<f32> {
        self.order = [0, 1, 2, 3];
        if self.shuffle {
            self.order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
        }
        self.cursor = 0;
        self.observation()
    }

    fn step(&mut self, action: &[f32]) -> StepResult {
        let Some(&case) = self.order.get(self.cursor) else {
            return StepResult {
                observation: self.observation(),
                reward: 0.0,
                done: true,
            };
        };
        let error = action.first().copied().unwrap_or(0.0) - XOR_CASES[case].1;
        self.cursor += 1;
        StepResult {
            observation: self.observation(),
            reward: -(error * error) / 4.0,
            done: self.cursor >= XOR_CASES.len(),
        }
    }
}

/// Synthetic optimization landscapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Landscape {
    /// `x^2 + y^2`, minimum at the origin.
    Sphere,
    /// `(1 - x)^2 + 100 (y - x^2)^2`, minimum at `(1, 1)` in a curved valley.
    Rosenbrock,
}

impl Landscape {
    /// Function value at `(x, y)`.
    #[must_use]
    pub fn value(self, x: f32, y: f32) -> f32 {
        match self {
            Self::Sphere => x * x + y * y,
            Self::Rosenbrock => (1.0 - x).powi(2) + 100.0 * (y - x * x).powi(2),
        }
    }

    /// Location of the global minimum.
    #[must_use]
    pub fn optimum(self) -> [f32; 2] {
        match self {
            Self::Sphere => [0.0, 0.0],
            Self::Rosenbrock => [1.0, 1.0],
        }
    }
}

/// Navigate a point to the minimum of a [`Landscape`].
///
/// Observations are `[x, y, ln(1 + f(x, y))]`; actions are 2-D moves clamped
/// to `[-1, 1]` and scaled by `step_size`. The episode ends once the point is
/// within `solve_radius` of the optimum or the step budget runs out, and the
/// final step rewards the negative distance to the optimum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandscapeEnvironment {
    pub landscape: Landscape,
    /// Starting point.
    pub start: [f32; 2],
    /// Uniform jitter added to the start per episode seed.
    pub start_jitter: f32,
    pub step_size: f32,
    pub max_steps: usize,
    pub solve_radius: f32,
    /// The point is kept inside `[-bound, bound]^2`.
    pub bound: f32,
    #[serde(skip)]
    position: [f32; 2],
    #[serde(skip)]
    steps: usize,
}

impl LandscapeEnvironment {
    #[must_use]
    pub fn new(landscape: Landscape) -> Self {
        Self {
            landscape,
            start: [-1.5, 2.0],
            start_jitter: 0.0,
            step_size: 0.1,
            max_steps: 100,
            solve_radius: 0.1,
            bound: 5.0,
            position: [-1.5, 2.0],
            steps: 0,
        }
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> [f32; 2] {
        self.position
    }

    /// Euclidean distance from the current position to the optimum.
    #[must_use]
    pub fn distance_to_optimum(&self) -> f32 {
        let [ox, oy] = self.landscape.optimum();
        let [x, y] = self.position;
        ((x - ox).powi(2) + (y - oy).powi(2)).sqrt()
    }

    /// Whether the current position counts as solved.
    #[must_use]
    pub fn solved(&self) -> bool {
        self.distance_to_optimum() <= self.solve_radius
    }

    fn observation(&self) -> Vec<f32> {
        let [x, y] = self.position;
        vec![x, y, self.landscape.value(x, y).ln_1p()]
    }
}

impl Environment for LandscapeEnvironment {
    fn observation_size(&self) -> usize {
        3
    }

    fn action_size(&self) -> usize {
        2
    }

    fn max_steps(&self) -> usize {
        self.max_steps
    }

    fn reset(&mut self, seed: u64) -> Vec<f32> {
        self.position = self.start;
        if self.start_jitter > 0.0 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            for coordinate in &mut self.position {
                *coordinate += rng.random_range(-self.start_jitter..=self.start_jitter);
            }
        }
        self.steps = 0;
        self.observation()
    }

    fn step(&mut self, action: &[f32]) -> StepResult {
        for (axis, coordinate) in self.position.iter_mut().enumerate() {
            let raw = action.get(axis).copied().unwrap_or(0.0);
            let delta = if raw.is_finite() { raw.clamp(-1.0, 1.0) } else { 0.0 };
            *coordinate = (*coordinate + delta * self.step_size).clamp(-self.bound, self.bound);
        }
        self.steps += 1;

        let done = self.solved() || self.steps >= self.max_steps;
        StepResult {
            observation: self.observation(),
            reward: if done { -self.distance_to_optimum() } else { 0.0 },
            done,
        }
    }
}
