// apogee_core/src/sensors/noise.rs

use nalgebra::DVector;
use rand::RngCore;
use rand_distr::{Distribution, Normal};

use crate::error::ModelError;
use crate::sensors::NoiseGenerator;

/// Zero-mean white noise, independent per component.
#[derive(Debug, Clone)]
pub struct GaussianNoise {
    std_dev: f64,
    noise_dist: Normal<f64>,
}

impl GaussianNoise {
    pub fn new(std_dev: f64) -> Result<Self, ModelError> {
        if !std_dev.is_finite() || std_dev < 0.0 {
            return Err(ModelError::InvalidNoise(std_dev));
        }
        let noise_dist = Normal::new(0.0, std_dev).map_err(|_| ModelError::InvalidNoise(std_dev))?;
        Ok(Self {
            std_dev,
            noise_dist,
        })
    }

    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }
}

impl NoiseGenerator for GaussianNoise {
    fn sample(&self, dim: usize, rng: &mut dyn RngCore) -> DVector<f64> {
        DVector::from_fn(dim, |_, _| self.noise_dist.sample(&mut *rng))
    }
}
