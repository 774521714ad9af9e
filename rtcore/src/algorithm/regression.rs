use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use crate::data::group::{feature_variance, DEGENERACY_EPSILON};

/// Fewest points a line can be fit through.
pub const MIN_FIT_POINTS: usize = 2;

/// A fitted line `rt = slope * log_p + intercept` with its in-sample diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegressionFit {
    pub slope: f64,
    pub intercept: f64,
    /// R² of this (penalized) model on its own training points
    pub r2: f64,
    /// R² of the unpenalized least-squares line on the same points, diagnostic only
    pub ols_r2: f64,
    pub rmse: f64,
    pub n: usize,
}

impl RegressionFit {
    #[inline]
    pub fn predict(&self, log_p: f64) -> f64 {
        self.slope * log_p + self.intercept
    }
}

/// Anything that turns `(x, y)` columns into a line, or declines to.
pub trait LinearFitter {
    fn fit(&self, x: &[f64], y: &[f64]) -> Option<RegressionFit>;
}

/// Ridge regression with an unpenalized intercept.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ridge {
    pub alpha: f64,
}

impl Ridge {
    pub fn new(alpha: f64) -> Self {
        Ridge { alpha }
    }

    /// Plain least squares.
    pub fn ols() -> Self {
        Ridge { alpha: 0.0 }
    }
}

impl LinearFitter for Ridge {
    fn fit(&self, x: &[f64], y: &[f64]) -> Option<RegressionFit> {
        fit_ridge(x, y, self.alpha)
    }
}

/// Coefficient of determination, `1 - SS_res / SS_tot`.
///
/// Arguments:
///
/// * `actual` - observed values
/// * `predicted` - predictions, same length as `actual`
///
/// Returns:
///
/// * `Option<f64>` - `None` if the slices are empty, differ in length, or `actual` is constant
///
/// # Examples
///
/// ```
/// use rtcore::algorithm::regression::r_squared;
///
/// let r2 = r_squared(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
/// assert_eq!(r2, 1.0);
/// assert!(r_squared(&[2.0, 2.0], &[1.0, 3.0]).is_none());
/// ```
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot <= DEGENERACY_EPSILON {
        return None;
    }
    let ss_res: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum();
    Some(1.0 - ss_res / ss_tot)
}

/// Solve the 2x2 normal equations for `(intercept, slope)`, penalizing the slope only.
fn solve_normal_equations(x: &[f64], y: &[f64], alpha: f64) -> Option<(f64, f64)> {
    let n = x.len() as f64;
    let sum_x: f64 = x.iter().sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xx: f64 = x.iter().map(|v| v * v).sum();
    let sum_xy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();

    let gram = Matrix2::new(n, sum_x, sum_x, sum_xx + alpha);
    let rhs = Vector2::new(sum_y, sum_xy);
    let beta = gram.lu().solve(&rhs)?;

    let (intercept, slope) = (beta[0], beta[1]);
    if intercept.is_finite() && slope.is_finite() {
        Some((intercept, slope))
    } else {
        None
    }
}

/// Fit `y = slope * x + intercept` with an L2 penalty `alpha` on the slope.
///
/// Arguments:
///
/// * `x` - feature values (Log P)
/// * `y` - targets (RT)
/// * `alpha` - ridge penalty, `0.0` gives ordinary least squares
///
/// Returns:
///
/// * `Option<RegressionFit>` - `None` for fewer than two points, constant `x`, or constant `y`
///
/// # Examples
///
/// ```
/// use rtcore::algorithm::regression::fit_ridge;
///
/// let fit = fit_ridge(&[1.0, 2.0, 3.0], &[3.0, 5.0, 7.0], 0.0).unwrap();
/// assert!((fit.slope - 2.0).abs() < 1e-10);
/// assert!((fit.intercept - 1.0).abs() < 1e-10);
/// ```
pub fn fit_ridge(x: &[f64], y: &[f64], alpha: f64) -> Option<RegressionFit> {
    if x.len() != y.len() || x.len() < MIN_FIT_POINTS {
        return None;
    }
    if feature_variance(x) <= DEGENERACY_EPSILON {
        return None;
    }

    let (intercept, slope) = solve_normal_equations(x, y, alpha)?;
    let predicted: Vec<f64> = x.iter().map(|v| slope * v + intercept).collect();
    let r2 = r_squared(y, &predicted)?;

    let ols_r2 = if alpha == 0.0 {
        r2
    } else {
        let (ols_intercept, ols_slope) = solve_normal_equations(x, y, 0.0)?;
        let ols_predicted: Vec<f64> = x.iter().map(|v| ols_slope * v + ols_intercept).collect();
        r_squared(y, &ols_predicted)?
    };

    let rmse = (y.iter().zip(&predicted).map(|(a, p)| (a - p).powi(2)).sum::<f64>() / y.len() as f64).sqrt();

    Some(RegressionFit {
        slope,
        intercept,
        r2,
        ols_r2,
        rmse,
        n: x.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ols_exact_line() {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = vec![1.0, 3.0, 5.0, 7.0];
        let fit = Ridge::ols().fit(&x, &y).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-10);
        assert!((fit.intercept - 1.0).abs() < 1e-10);
        assert!((fit.r2 - 1.0).abs() < 1e-12);
        assert!(fit.rmse < 1e-10);
        assert!((fit.predict(4.0) - 9.0).abs() < 1e-10);
    }

    #[test]
    fn test_ridge_shrinks_slope() {
        let x = vec![1.5, 2.8, 3.88];
        let y = vec![8.2, 9.599, 11.126];
        let ols = fit_ridge(&x, &y, 0.0).unwrap();
        let ridge = fit_ridge(&x, &y, 1.0).unwrap();

        // slope = Sxy / (Sxx + alpha) with centered sums
        let mx = x.iter().sum::<f64>() / 3.0;
        let my = y.iter().sum::<f64>() / 3.0;
        let sxx: f64 = x.iter().map(|v| (v - mx).powi(2)).sum();
        let sxy: f64 = x.iter().zip(&y).map(|(a, b)| (a - mx) * (b - my)).sum();
        assert!((ridge.slope - sxy / (sxx + 1.0)).abs() < 1e-9);
        assert!((ridge.intercept - (my - ridge.slope * mx)).abs() < 1e-9);

        assert!(ridge.slope.abs() < ols.slope.abs());
        assert!(ridge.r2 < ols.r2);
        assert!((ridge.ols_r2 - ols.r2).abs() < 1e-12);
    }

    #[test]
    fn test_unfittable_inputs() {
        assert!(fit_ridge(&[1.0], &[2.0], 1.0).is_none());
        assert!(fit_ridge(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0], 1.0).is_none());
        assert!(fit_ridge(&[1.0, 2.0], &[1.0], 1.0).is_none());
    }

    #[test]
    fn test_two_points_ols_is_perfect() {
        let fit = fit_ridge(&[1.0, 3.0], &[2.0, 6.0], 0.0).unwrap();
        assert!((fit.r2 - 1.0).abs() < 1e-12);
        assert_eq!(fit.n, 2);
    }
}
