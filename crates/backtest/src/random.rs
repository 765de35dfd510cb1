//! Random sources for the auction timing model.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;

/// Source of the draws the timing model needs.
///
/// Implementations must be deterministic for a given construction so that
/// a run can be replayed exactly.
pub trait RandomSource {
    /// Uniform draw in `[0, 1)`.
    fn uniform(&mut self) -> f64;

    /// Normal draw with the given mean and standard deviation.
    fn normal(&mut self, mean: f64, std_dev: f64) -> f64;

    /// Uniform draw in `[min, max)`.
    fn uniform_between(&mut self, min: f64, max: f64) -> f64 {
        min + self.uniform() * (max - min)
    }
}

/// Seedable random source backed by `StdRng`.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        match Normal::new(mean, std_dev) {
            Ok(dist) => self.rng.sample(dist),
            // degenerate distribution (std-dev of zero)
            Err(_) => mean,
        }
    }
}

/// Replays fixed draws, cycling when exhausted.
#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct ScriptedRandom {
    uniforms: Vec<f64>,
    normals: Vec<f64>,
    next_uniform: usize,
    next_normal: usize,
}

#[cfg(test)]
impl ScriptedRandom {
    /// `normals` are standard-normal z-scores, scaled by the requested mean and std-dev.
    pub(crate) fn new(uniforms: Vec<f64>, normals: Vec<f64>) -> Self {
        Self {
            uniforms,
            normals,
            next_uniform: 0,
            next_normal: 0,
        }
    }
}

#[cfg(test)]
impl RandomSource for ScriptedRandom {
    fn uniform(&mut self) -> f64 {
        let u = self.uniforms[self.next_uniform % self.uniforms.len()];
        self.next_uniform += 1;
        u
    }

    fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let z = self.normals[self.next_normal % self.normals.len()];
        self.next_normal += 1;
        mean + z * std_dev
    }
}
