// apogee_sim/src/tuning/params.rs

//! The flat search vector and its decoding into covariance matrices.
//!
//! Layout: `[P₀ lower triangle (21) | R lower triangle (m(m+1)/2) | Q lower triangle (21)]`,
//! each triangle stored row by row.

use std::path::Path;

use apogee_core::state::STATE_DIM;
use nalgebra::DMatrix;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::TuningError;

/// How a lower triangle becomes a symmetric matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixEncoding {
    /// The triangle is a Cholesky factor `L`; the matrix is `L·Lᵗ + εI`.
    #[default]
    Cholesky,
    /// The triangle is mirrored into a symmetric matrix, plus `εI`.
    Direct,
}

pub const DEFAULT_BOUNDS: (f64, f64) = (1e-3, 1e3);
pub const DEFAULT_EPSILON: f64 = 1e-6;

/// Number of free entries in the lower triangle of an `n×n` matrix.
pub fn triangle_len(n: usize) -> usize {
    n * (n + 1) / 2
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    pub measurement_dim: usize,
    pub encoding: MatrixEncoding,
    pub epsilon: f64,
    /// Per-entry `(low, high)` search bounds.
    pub bounds: (f64, f64),
    /// Sample and normalize in log space. Requires positive bounds.
    pub log_scale: bool,
}

impl ParameterSpace {
    pub fn new(measurement_dim: usize) -> Self {
        Self {
            measurement_dim,
            encoding: MatrixEncoding::default(),
            epsilon: DEFAULT_EPSILON,
            bounds: DEFAULT_BOUNDS,
            log_scale: true,
        }
    }

    pub fn validate(&self) -> Result<(), TuningError> {
        let (low, high) = self.bounds;
        if !(high > low) {
            return Err(TuningError::InvalidSettings(format!(
                "bounds ({low}, {high}) are empty"
            )));
        }
        if self.log_scale && !(low > 0.0) {
            return Err(TuningError::InvalidSettings(format!(
                "log-scale bounds must be positive, got ({low}, {high})"
            )));
        }
        if self.measurement_dim == 0 {
            return Err(TuningError::InvalidSettings("measurement dimension is zero".into()));
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        2 * triangle_len(STATE_DIM) + triangle_len(self.measurement_dim)
    }

    /// One point drawn uniformly (log-uniformly with `log_scale`) within the bounds.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Vec<f64> {
        (0..self.dimension())
            .map(|_| self.from_unit_value(rng.gen::<f64>()))
            .collect()
    }

    /// Maps a parameter vector onto the unit cube.
    pub fn to_unit(&self, params: &[f64]) -> Vec<f64> {
        let (low, high) = self.bounds;
        params
            .iter()
            .map(|&p| {
                let u = if self.log_scale {
                    (p.max(low).ln() - low.ln()) / (high.ln() - low.ln())
                } else {
                    (p - low) / (high - low)
                };
                u.clamp(0.0, 1.0)
            })
            .collect()
    }

    pub fn from_unit(&self, unit: &[f64]) -> Vec<f64> {
        unit.iter().map(|&u| self.from_unit_value(u)).collect()
    }

    fn from_unit_value(&self, u: f64) -> f64 {
        let (low, high) = self.bounds;
        let u = u.clamp(0.0, 1.0);
        if self.log_scale {
            (low.ln() + u * (high.ln() - low.ln())).exp()
        } else {
            low + u * (high - low)
        }
    }

    /// Rebuilds `P₀`, `R` and `Q` from a parameter vector.
    pub fn decode(&self, params: &[f64]) -> Result<TunedCovariances, TuningError> {
        if params.len() != self.dimension() {
            return Err(TuningError::ParameterLength {
                expected: self.dimension(),
                actual: params.len(),
            });
        }
        let p_len = triangle_len(STATE_DIM);
        let r_len = triangle_len(self.measurement_dim);
        let (p, rest) = params.split_at(p_len);
        let (r, q) = rest.split_at(r_len);

        Ok(TunedCovariances {
            p0: self.build_matrix(STATE_DIM, p),
            r: self.build_matrix(self.measurement_dim, r),
            q: self.build_matrix(STATE_DIM, q),
        })
    }

    fn build_matrix(&self, n: usize, triangle: &[f64]) -> DMatrix<f64> {
        let lower = fill_lower(n, triangle);
        let symmetric = match self.encoding {
            MatrixEncoding::Cholesky => &lower * lower.transpose(),
            MatrixEncoding::Direct => {
                let mut m = lower.clone();
                m.fill_upper_triangle_with_lower_triangle();
                m
            }
        };
        symmetric + DMatrix::identity(n, n) * self.epsilon
    }
}

/// Lower-triangular `n×n` matrix from its row-major lower triangle.
fn fill_lower(n: usize, values: &[f64]) -> DMatrix<f64> {
    let mut m = DMatrix::zeros(n, n);
    let mut k = 0;
    for i in 0..n {
        for j in 0..=i {
            m[(i, j)] = values[k];
            k += 1;
        }
    }
    m
}

/// The tuned matrices consumed by the `estimate` command.
#[derive(Debug, Clone, PartialEq)]
pub struct TunedCovariances {
    pub p0: DMatrix<f64>,
    pub r: DMatrix<f64>,
    pub q: DMatrix<f64>,
}

/// On-disk form: each matrix as a list of rows.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TunedCovariancesFile {
    p0: Vec<Vec<f64>>,
    r: Vec<Vec<f64>>,
    q: Vec<Vec<f64>>,
}

fn to_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|row| row.iter().copied().collect()).collect()
}

fn from_rows(name: &str, rows: &[Vec<f64>]) -> Result<DMatrix<f64>, TuningError> {
    let n = rows.len();
    if n == 0 || rows.iter().any(|r| r.len() != n) {
        return Err(TuningError::Serialization(format!("matrix '{name}' is not square")));
    }
    Ok(DMatrix::from_fn(n, n, |i, j| rows[i][j]))
}

impl TunedCovariances {
    pub fn to_toml_string(&self) -> Result<String, TuningError> {
        let file = TunedCovariancesFile {
            p0: to_rows(&self.p0),
            r: to_rows(&self.r),
            q: to_rows(&self.q),
        };
        toml::to_string_pretty(&file).map_err(|e| TuningError::Serialization(e.to_string()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, TuningError> {
        let file: TunedCovariancesFile =
            toml::from_str(text).map_err(|e| TuningError::Serialization(e.to_string()))?;
        Ok(Self {
            p0: from_rows("p0", &file.p0)?,
            r: from_rows("r", &file.r)?,
            q: from_rows("q", &file.q)?,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), TuningError> {
        std::fs::write(path, self.to_toml_string()?).map_err(|source| TuningError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, TuningError> {
        let text = std::fs::read_to_string(path).map_err(|source| TuningError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_dimensions_per_variant() {
        assert_eq!(ParameterSpace::new(3).dimension(), 48);
        assert_eq!(ParameterSpace::new(7).dimension(), 70);
    }

    #[test]
    fn test_cholesky_decoding_is_positive_definite() {
        let space = ParameterSpace::new(3);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let decoded = space.decode(&space.sample(&mut rng)).unwrap();
        for m in [&decoded.p0, &decoded.r, &decoded.q] {
            assert_abs_diff_eq!((m - m.transpose()).norm(), 0.0, epsilon = 1e-9);
            assert!(m.clone().cholesky().is_some());
        }
        assert_eq!(decoded.r.nrows(), 3);
    }

    #[test]
    fn test_direct_decoding_mirrors_triangle() {
        let space = ParameterSpace {
            encoding: MatrixEncoding::Direct,
            epsilon: 0.5,
            ..ParameterSpace::new(3)
        };
        let mut params = vec![0.0; space.dimension()];
        // R occupies entries 21..27: [r00, r10, r11, r20, r21, r22].
        params[21..27].copy_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let r = space.decode(&params).unwrap().r;
        assert_eq!(r[(0, 0)], 1.5);
        assert_eq!(r[(1, 0)], 2.0);
        assert_eq!(r[(0, 1)], 2.0);
        assert_eq!(r[(2, 1)], 5.0);
        assert_eq!(r[(1, 2)], 5.0);
        assert_eq!(r[(2, 2)], 6.5);
    }

    #[test]
    fn test_cholesky_product() {
        let space = ParameterSpace {
            epsilon: 0.0,
            ..ParameterSpace::new(3)
        };
        let mut params = vec![0.0; space.dimension()];
        params[21..27].copy_from_slice(&[2.0, 1.0, 3.0, 0.0, 0.0, 1.0]);
        let r = space.decode(&params).unwrap().r;
        // L = [[2,0,0],[1,3,0],[0,0,1]]
        assert_eq!(r[(0, 0)], 4.0);
        assert_eq!(r[(0, 1)], 2.0);
        assert_eq!(r[(1, 1)], 10.0);
        assert_eq!(r[(2, 2)], 1.0);
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        assert!(matches!(
            ParameterSpace::new(3).decode(&[1.0; 10]),
            Err(TuningError::ParameterLength { expected: 48, actual: 10 })
        ));
    }

    #[test]
    fn test_samples_stay_in_bounds_and_span_decades() {
        let space = ParameterSpace::new(7);
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let samples: Vec<f64> = (0..50).flat_map(|_| space.sample(&mut rng)).collect();
        assert!(samples.iter().all(|&p| (1e-3..=1e3).contains(&p)));
        assert!(samples.iter().any(|&p| p < 1e-2));
        assert!(samples.iter().any(|&p| p > 1e2));

        let unit = space.to_unit(&samples[..space.dimension()]);
        let back = space.from_unit(&unit);
        for (a, b) in back.iter().zip(&samples[..space.dimension()]) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9 * b.max(1.0));
        }
    }

    #[test]
    fn test_toml_round_trip_and_errors() {
        let space = ParameterSpace::new(3);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let tuned = space.decode(&space.sample(&mut rng)).unwrap();

        let text = tuned.to_toml_string().unwrap();
        let back = TunedCovariances::from_toml_str(&text).unwrap();
        assert_abs_diff_eq!(back.q, tuned.q, epsilon = 1e-9);

        assert!(TunedCovariances::from_toml_str("p0 = [[1.0, 2.0]]\nr = [[1.0]]\nq = [[1.0]]").is_err());
        assert!(TunedCovariances::load(Path::new("/nonexistent/tuned.toml")).is_err());
    }
}
