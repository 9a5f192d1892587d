// apogee_sim/src/generation/wind.rs

//! Wind as a function of time, applied to the drag model through the
//! vehicle's air-relative velocity.

use std::fmt::Debug;

use nalgebra::Vector3;
use rand::Rng;

use crate::error::GenerationError;

pub const DEFAULT_CONTROL_POINTS: usize = 10;
pub const DEFAULT_HORIZON: f64 = 1000.0;
pub const DEFAULT_WIND_LIMIT: f64 = 1.0;

/// Maps time (s) to a wind velocity (m/s) in the inertial frame.
pub trait WindProfile: Debug + Send + Sync {
    fn velocity(&self, time: f64) -> Vector3<f64>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CalmWind;

impl WindProfile for CalmWind {
    fn velocity(&self, _time: f64) -> Vector3<f64> {
        Vector3::zeros()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConstantWind(pub Vector3<f64>);

impl WindProfile for ConstantWind {
    fn velocity(&self, _time: f64) -> Vector3<f64> {
        self.0
    }
}

/// Natural cubic spline through `(x_i, y_i)` with zero curvature at both ends.
/// Outside the knot range the end segments are extrapolated.
#[derive(Debug, Clone, PartialEq)]
pub struct NaturalCubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivative at each knot.
    m: Vec<f64>,
}

impl NaturalCubicSpline {
    /// `None` unless there are at least two knots with strictly increasing `x`.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Option<Self> {
        let n = x.len();
        if n < 2 || y.len() != n || x.windows(2).any(|w| !(w[1] > w[0])) {
            return None;
        }

        let mut m = vec![0.0; n];
        if n > 2 {
            // Thomas algorithm on the interior knots.
            let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
            let interior = n - 2;
            let mut diag = vec![0.0; interior];
            let mut upper = vec![0.0; interior];
            let mut rhs = vec![0.0; interior];
            for k in 0..interior {
                let i = k + 1;
                diag[k] = 2.0 * (h[i - 1] + h[i]);
                upper[k] = h[i];
                rhs[k] = 6.0 * ((y[i + 1] - y[i]) / h[i] - (y[i] - y[i - 1]) / h[i - 1]);
            }
            for k in 1..interior {
                let lower = h[k];
                let w = lower / diag[k - 1];
                diag[k] -= w * upper[k - 1];
                rhs[k] -= w * rhs[k - 1];
            }
            for k in (0..interior).rev() {
                let next = if k + 1 < interior { m[k + 2] } else { 0.0 };
                m[k + 1] = (rhs[k] - upper[k] * next) / diag[k];
            }
        }

        Some(Self { x, y, m })
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        let last = self.x.len() - 2;
        let i = self.x.partition_point(|&xi| xi <= t).saturating_sub(1).min(last);

        let (x0, x1) = (self.x[i], self.x[i + 1]);
        let (y0, y1) = (self.y[i], self.y[i + 1]);
        let (m0, m1) = (self.m[i], self.m[i + 1]);
        let h = x1 - x0;
        let (a, b) = (x1 - t, t - x0);

        m0 * a.powi(3) / (6.0 * h)
            + m1 * b.powi(3) / (6.0 * h)
            + (y0 / h - m0 * h / 6.0) * a
            + (y1 / h - m1 * h / 6.0) * b
    }
}

/// Smooth random horizontal wind: one spline per axis through random control
/// points, clipped to `[min, max]`.
#[derive(Debug, Clone)]
pub struct SplineWind {
    x: NaturalCubicSpline,
    y: NaturalCubicSpline,
    min: f64,
    max: f64,
}

impl SplineWind {
    pub fn new(x: NaturalCubicSpline, y: NaturalCubicSpline, min: f64, max: f64) -> Self {
        Self { x, y, min, max }
    }

    /// Draws `control_points` values uniformly in `[min, max]` at evenly spaced
    /// times on `[0, horizon]`, independently for each horizontal axis.
    pub fn random<R: Rng>(
        rng: &mut R,
        control_points: usize,
        horizon: f64,
        min: f64,
        max: f64,
    ) -> Result<Self, GenerationError> {
        if control_points < 2 {
            return Err(GenerationError::InvalidWind(format!(
                "need at least 2 control points, got {control_points}"
            )));
        }
        if !(horizon > 0.0) || !(max >= min) {
            return Err(GenerationError::InvalidWind(format!(
                "horizon {horizon} must be positive and bounds [{min}, {max}] ordered"
            )));
        }

        let step = horizon / (control_points - 1) as f64;
        let knots: Vec<f64> = (0..control_points).map(|i| i as f64 * step).collect();
        let mut axis = || {
            let values = (0..control_points)
                .map(|_| if max > min { rng.gen_range(min..=max) } else { min })
                .collect();
            NaturalCubicSpline::new(knots.clone(), values)
                .ok_or_else(|| GenerationError::InvalidWind("degenerate control points".into()))
        };
        let x = axis()?;
        let y = axis()?;
        Ok(Self::new(x, y, min, max))
    }
}

impl WindProfile for SplineWind {
    fn velocity(&self, time: f64) -> Vector3<f64> {
        Vector3::new(
            self.x.evaluate(time).clamp(self.min, self.max),
            self.y.evaluate(time).clamp(self.min, self.max),
            0.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_spline_interpolates_knots() {
        let x = vec![0.0, 1.0, 2.5, 4.0];
        let y = vec![1.0, -2.0, 0.5, 3.0];
        let spline = NaturalCubicSpline::new(x.clone(), y.clone()).unwrap();
        for (xi, yi) in x.iter().zip(&y) {
            assert_abs_diff_eq!(spline.evaluate(*xi), *yi, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_spline_reproduces_a_line() {
        let spline =
            NaturalCubicSpline::new(vec![0.0, 1.0, 2.0, 3.0], vec![1.0, 3.0, 5.0, 7.0]).unwrap();
        assert_abs_diff_eq!(spline.evaluate(1.7), 4.4, epsilon = 1e-12);
        assert_abs_diff_eq!(spline.evaluate(-1.0), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_spline_rejects_bad_knots() {
        assert!(NaturalCubicSpline::new(vec![0.0], vec![1.0]).is_none());
        assert!(NaturalCubicSpline::new(vec![0.0, 0.0], vec![1.0, 2.0]).is_none());
    }

    #[test]
    fn test_spline_wind_is_bounded_and_horizontal() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let wind = SplineWind::random(
            &mut rng,
            DEFAULT_CONTROL_POINTS,
            DEFAULT_HORIZON,
            -DEFAULT_WIND_LIMIT,
            DEFAULT_WIND_LIMIT,
        )
        .unwrap();
        for i in 0..=2000 {
            let w = wind.velocity(i as f64 * 0.6);
            assert!(w.x.abs() <= 1.0 && w.y.abs() <= 1.0);
            assert_eq!(w.z, 0.0);
        }
    }

    #[test]
    fn test_constant_and_calm() {
        let w = Vector3::new(2.0, -1.0, 0.0);
        assert_eq!(ConstantWind(w).velocity(12.0), w);
        assert_eq!(CalmWind.velocity(3.0), Vector3::zeros());
    }
}
