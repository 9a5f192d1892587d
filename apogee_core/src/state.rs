// apogee_core/src/state.rs

use nalgebra::{DMatrix, DVector, Vector3};

/// Dimension of the kinematic state `[px, py, pz, vx, vy, vz]` used by both filters.
pub const STATE_DIM: usize = 6;

/// Index of each component in the state vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateVariable {
    Px = 0,
    Py = 1,
    Pz = 2,
    Vx = 3,
    Vy = 4,
    Vz = 5,
}

/// The filter's belief: the state vector, its covariance and the time it
/// refers to. Owned by exactly one filter and only mutated by predict/update.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorState {
    /// The numerical state vector `x`.
    pub vector: DVector<f64>,
    /// The covariance matrix `P`.
    pub covariance: DMatrix<f64>,
    /// Seconds since the filter was started.
    pub timestamp: f64,
}

impl EstimatorState {
    /// A state at `position`/`velocity` with covariance `P₀`.
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>, covariance: DMatrix<f64>) -> Self {
        let vector = DVector::from_iterator(
            STATE_DIM,
            position.iter().chain(velocity.iter()).copied(),
        );
        Self {
            vector,
            covariance,
            timestamp: 0.0,
        }
    }

    /// Vehicle at rest at the origin with `P₀ = σ²·I`.
    pub fn at_rest(initial_variance: f64) -> Self {
        Self::new(
            Vector3::zeros(),
            Vector3::zeros(),
            DMatrix::identity(STATE_DIM, STATE_DIM) * initial_variance,
        )
    }

    pub fn dim(&self) -> usize {
        self.vector.len()
    }

    pub fn get(&self, var: StateVariable) -> f64 {
        self.vector[var as usize]
    }

    pub fn position(&self) -> Vector3<f64> {
        self.vector.fixed_rows::<3>(0).into_owned()
    }

    pub fn velocity(&self) -> Vector3<f64> {
        self.vector.fixed_rows::<3>(3).into_owned()
    }

    /// The standard deviation of each state component.
    pub fn std_devs(&self) -> DVector<f64> {
        self.covariance.diagonal().map(|v| v.max(0.0).sqrt())
    }
}
