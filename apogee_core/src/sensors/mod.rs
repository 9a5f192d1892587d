// apogee_core/src/sensors/mod.rs

//! Sensor models: `z = truth + noise`, with pluggable noise sources.

use dyn_clone::DynClone;
use nalgebra::{DVector, Vector3};
use rand::RngCore;
use std::fmt::Debug;

pub mod noise;
pub mod suite;

pub use noise::GaussianNoise;
pub use suite::{SensorReadings, SensorSuite};

// --- NOISE GENERATOR TRAIT ---
// A stateless source of additive noise. The RNG is passed in so that a
// single seeded stream drives a whole run.
pub trait NoiseGenerator: DynClone + Debug + Send + Sync {
    /// Draws an independent noise vector of length `dim`.
    fn sample(&self, dim: usize, rng: &mut dyn RngCore) -> DVector<f64>;
}

// This macro automatically generates the implementation of `Clone` for `Box<dyn NoiseGenerator>`.
dyn_clone::clone_trait_object!(NoiseGenerator);

/// Identity measurement plus the sum of every attached noise generator.
#[derive(Debug, Clone, Default)]
pub struct SensorModel {
    generators: Vec<Box<dyn NoiseGenerator>>,
}

impl SensorModel {
    /// A sensor that reports the truth unchanged.
    pub fn ideal() -> Self {
        Self::default()
    }

    pub fn with_noise(generator: impl NoiseGenerator + 'static) -> Self {
        Self {
            generators: vec![Box::new(generator)],
        }
    }

    pub fn add_noise(mut self, generator: impl NoiseGenerator + 'static) -> Self {
        self.generators.push(Box::new(generator));
        self
    }

    pub fn measure(&self, truth: &DVector<f64>, rng: &mut dyn RngCore) -> DVector<f64> {
        self.generators
            .iter()
            .fold(truth.clone(), |z, g| z + g.sample(truth.len(), rng))
    }

    pub fn measure_vector3(&self, truth: &Vector3<f64>, rng: &mut dyn RngCore) -> Vector3<f64> {
        let z = self.measure(&DVector::from_column_slice(truth.as_slice()), rng);
        Vector3::new(z[0], z[1], z[2])
    }

    pub fn measure_scalar(&self, truth: f64, rng: &mut dyn RngCore) -> f64 {
        self.measure(&DVector::from_element(1, truth), rng)[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_ideal_sensor_is_identity() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let truth = DVector::from_vec(vec![1.0, -2.0, 3.5]);
        assert_eq!(SensorModel::ideal().measure(&truth, &mut rng), truth);
    }

    #[test]
    fn test_repeated_measurements_are_independent() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let sensor = SensorModel::with_noise(GaussianNoise::new(1.0).unwrap());
        let truth = DVector::zeros(3);
        let a = sensor.measure(&truth, &mut rng);
        let b = sensor.measure(&truth, &mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn test_stacked_noise_adds_variance() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let sensor = SensorModel::with_noise(GaussianNoise::new(0.3).unwrap())
            .add_noise(GaussianNoise::new(0.4).unwrap());

        let n = 20_000;
        let var = (0..n)
            .map(|_| sensor.measure_scalar(0.0, &mut rng).powi(2))
            .sum::<f64>()
            / n as f64;
        // 0.3² + 0.4² = 0.25
        assert!((var - 0.25).abs() < 0.02, "variance {var}");
    }
}
