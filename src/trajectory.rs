//! Numeric price paths: the excursion step (drift toward a target plus
//! Gaussian noise) and the recovery step (exponential blend toward the real
//! price plus small uniform noise).
//!
//! Both generators are pure given a [`NoiseSource`], so tests can script the
//! uniform draws and assert exact outputs.

use std::collections::VecDeque;
use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

/// Source of uniform draws in `[0, 1)`.
pub trait NoiseSource {
    fn next_uniform(&mut self) -> f64;
}

impl NoiseSource for StdRng {
    fn next_uniform(&mut self) -> f64 {
        self.gen::<f64>()
    }
}

/// Seeded generator when `seed` is set, OS entropy otherwise.
pub fn noise_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Replays a fixed list of uniform draws, cycling when exhausted. An empty
/// list behaves like a constant 0.5.
#[derive(Debug, Clone)]
pub struct ScriptedNoise {
    values: VecDeque<f64>,
}

impl ScriptedNoise {
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        let mut values: VecDeque<f64> = values.into_iter().collect();
        if values.is_empty() {
            values.push_back(0.5);
        }
        Self { values }
    }
}

impl NoiseSource for ScriptedNoise {
    fn next_uniform(&mut self) -> f64 {
        let v = self.values.pop_front().unwrap_or(0.5);
        self.values.push_back(v);
        v
    }
}

/// One standard-normal sample via Box-Muller. Zero draws are rejected so the
/// logarithm stays finite.
pub fn standard_normal<N: NoiseSource + ?Sized>(noise: &mut N) -> f64 {
    let mut u = 0.0;
    while u == 0.0 {
        u = noise.next_uniform();
    }
    let mut v = 0.0;
    while v == 0.0 {
        v = noise.next_uniform();
    }
    (-2.0 * u.ln()).sqrt() * (2.0 * PI * v).cos()
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrajectoryParams {
    /// Nominal volatility of the excursion path.
    pub volatility: f64,
    /// Excursion noise is `current * volatility / divisor * z`.
    pub excursion_noise_divisor: f64,
    /// Lower bound for any excursion step.
    pub price_floor: f64,
    /// Share of the remaining gap closed per recovery tick.
    pub recovery_rate: f64,
    /// Recovery noise amplitude as a fraction of the real price.
    pub recovery_noise: f64,
    /// Relative gap under which recovery snaps to the real price.
    pub convergence_threshold: f64,
    /// Used when no price has ever been observed and the source is down.
    pub placeholder_price: f64,
}

impl Default for TrajectoryParams {
    fn default() -> Self {
        Self {
            volatility: 0.02,
            excursion_noise_divisor: 10.0,
            price_floor: 0.000_001,
            recovery_rate: 0.1,
            recovery_noise: 0.001,
            convergence_threshold: 0.001,
            placeholder_price: 1000.0,
        }
    }
}

impl TrajectoryParams {
    pub fn validate(&self) -> Result<(), String> {
        let positive = [
            ("volatility", self.volatility),
            ("excursion_noise_divisor", self.excursion_noise_divisor),
            ("price_floor", self.price_floor),
            ("convergence_threshold", self.convergence_threshold),
            ("placeholder_price", self.placeholder_price),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("simulation.{} must be finite and > 0", name));
            }
        }
        if !self.recovery_rate.is_finite() || self.recovery_rate <= 0.0 || self.recovery_rate > 1.0
        {
            return Err("simulation.recovery_rate must be in (0, 1]".to_string());
        }
        if !self.recovery_noise.is_finite() || self.recovery_noise < 0.0 {
            return Err("simulation.recovery_noise must be finite and >= 0".to_string());
        }
        // The lowest recovery step is real * (recovery_rate - recovery_noise / 2).
        if self.recovery_noise >= 2.0 * self.recovery_rate {
            return Err(
                "simulation.recovery_noise must be < 2 * simulation.recovery_rate".to_string(),
            );
        }
        Ok(())
    }

    /// Next excursion price. Drift closes the gap linearly over `time_left`
    /// seconds; noise scales with the current price level.
    pub fn excursion_step<N: NoiseSource + ?Sized>(
        &self,
        current: f64,
        target: f64,
        time_left: f64,
        noise: &mut N,
    ) -> f64 {
        if time_left <= 0.0 {
            return target;
        }
        let drift = (target - current) / time_left;
        let z = standard_normal(noise);
        let jitter = current * (self.volatility / self.excursion_noise_divisor) * z;
        (current + drift + jitter).max(self.price_floor)
    }

    /// Next recovery price: a fixed share of the gap to `real` plus symmetric
    /// noise. Convergence is decided by the caller.
    pub fn recovery_step<N: NoiseSource + ?Sized>(
        &self,
        current_sim: f64,
        real: f64,
        noise: &mut N,
    ) -> f64 {
        let gap = real - current_sim;
        let jitter = (noise.next_uniform() - 0.5) * real * self.recovery_noise;
        current_sim + gap * self.recovery_rate + jitter
    }

    pub fn has_converged(&self, price: f64, real: f64) -> bool {
        ((price - real) / real).abs() < self.convergence_threshold
    }
}
