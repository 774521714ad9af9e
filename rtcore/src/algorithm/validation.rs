//! Out-of-sample evaluation of a [`LinearFitter`].
//!
//! Both procedures pool every held-out prediction into one vector and score it
//! once, so a leave-one-out run and a k-fold run with `k = n` see exactly the
//! same training sets and produce the same pooled metrics.

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::algorithm::regression::{r_squared, LinearFitter};
use crate::config::ValidationMethod;

/// Smallest sample for which cross-validation is attempted.
pub const VALIDATION_FLOOR: usize = 3;

/// Gap above which a model is considered to memorize its training points.
pub const SEVERE_GAP: f64 = 0.3;
/// Gap above which overfitting is worth reporting.
pub const MODERATE_GAP: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ValidationKind {
    Loo,
    KFold { folds: usize },
}

/// Pooled held-out metrics of one validation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub kind: ValidationKind,
    /// R² over the concatenated held-out predictions
    pub r2: f64,
    pub rmse: f64,
    pub mae: f64,
    /// Points that received a held-out prediction
    pub n_validated: usize,
    /// Points whose training subset could not be fit
    pub n_skipped: usize,
    /// Mean of per-fold R² over folds with at least two non-constant targets
    pub fold_r2_mean: Option<f64>,
    pub fold_r2_std: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverfittingSeverity {
    Acceptable,
    Moderate,
    Severe,
}

/// Training R² against validation R² for one model; diagnostic only.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverfittingReport {
    pub training_r2: f64,
    pub validation_r2: f64,
    pub gap: f64,
    pub severity: OverfittingSeverity,
}

impl OverfittingReport {
    /// Classify the training/validation gap.
    ///
    /// # Examples
    ///
    /// ```
    /// use rtcore::algorithm::validation::{OverfittingReport, OverfittingSeverity};
    ///
    /// assert_eq!(OverfittingReport::new(0.95, 0.90).severity, OverfittingSeverity::Acceptable);
    /// assert_eq!(OverfittingReport::new(0.95, 0.75).severity, OverfittingSeverity::Moderate);
    /// assert_eq!(OverfittingReport::new(0.99, 0.40).severity, OverfittingSeverity::Severe);
    /// ```
    pub fn new(training_r2: f64, validation_r2: f64) -> Self {
        let gap = training_r2 - validation_r2;
        let severity = if gap > SEVERE_GAP {
            OverfittingSeverity::Severe
        } else if gap >= MODERATE_GAP {
            OverfittingSeverity::Moderate
        } else {
            OverfittingSeverity::Acceptable
        };
        OverfittingReport {
            training_r2,
            validation_r2,
            gap,
            severity,
        }
    }
}

/// Pooled `(r2, rmse, mae)` of held-out predictions, `None` when R² is undefined.
fn pooled_metrics(actual: &[f64], predicted: &[f64]) -> Option<(f64, f64, f64)> {
    let r2 = r_squared(actual, predicted)?;
    let n = actual.len() as f64;
    let rmse = (actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum::<f64>() / n).sqrt();
    let mae = actual.iter().zip(predicted).map(|(a, p)| (a - p).abs()).sum::<f64>() / n;
    Some((r2, rmse, mae))
}

/// Fit on `train` rows plus `extra` points and predict every `held_out` row.
fn predict_held_out<F: LinearFitter>(
    fitter: &F,
    x: &[f64],
    y: &[f64],
    train: &[usize],
    extra: &[(f64, f64)],
    held_out: &[usize],
) -> Option<Vec<f64>> {
    let (mut train_x, mut train_y): (Vec<f64>, Vec<f64>) = train.iter().map(|&i| (x[i], y[i])).unzip();
    train_x.extend(extra.iter().map(|p| p.0));
    train_y.extend(extra.iter().map(|p| p.1));

    let fit = fitter.fit(&train_x, &train_y)?;
    Some(held_out.iter().map(|&i| fit.predict(x[i])).collect())
}

/// Collect predictions indexed by sample and score them in sample order.
fn summarize(
    kind: ValidationKind,
    y: &[f64],
    predictions: &[Option<f64>],
    fold_r2: &[f64],
) -> Option<ValidationSummary> {
    let (actual, predicted): (Vec<f64>, Vec<f64>) = predictions
        .iter()
        .zip(y)
        .filter_map(|(p, a)| p.map(|p| (*a, p)))
        .unzip();
    let n_validated = actual.len();
    if n_validated == 0 {
        return None;
    }
    let (r2, rmse, mae) = pooled_metrics(&actual, &predicted)?;

    let (fold_r2_mean, fold_r2_std) = match fold_r2.len() {
        0 => (None, None),
        1 => (Some(fold_r2[0]), Some(0.0)),
        _ => (Some(fold_r2.iter().mean()), Some(fold_r2.iter().std_dev())),
    };

    Some(ValidationSummary {
        kind,
        r2,
        rmse,
        mae,
        n_validated,
        n_skipped: y.len() - n_validated,
        fold_r2_mean,
        fold_r2_std,
    })
}

/// Leave-one-out cross-validation.
///
/// Arguments:
///
/// * `fitter` - model used for each of the `n` fits
/// * `x` - feature values
/// * `y` - targets
///
/// Returns:
///
/// * `Option<ValidationSummary>` - `None` for fewer than three points or when no
///   held-out point could be predicted
pub fn leave_one_out<F: LinearFitter>(fitter: &F, x: &[f64], y: &[f64]) -> Option<ValidationSummary> {
    let n = x.len();
    if n < VALIDATION_FLOOR || y.len() != n {
        return None;
    }

    let predictions: Vec<Option<f64>> = (0..n)
        .map(|held| {
            let train: Vec<usize> = (0..n).filter(|&i| i != held).collect();
            predict_held_out(fitter, x, y, &train, &[], &[held]).map(|p| p[0])
        })
        .collect();

    summarize(ValidationKind::Loo, y, &predictions, &[])
}

/// Split `0..n` into `folds` shuffled folds, the first `n % folds` one element larger.
fn fold_assignment(n: usize, folds: usize, seed: u64) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let base = n / folds;
    let remainder = n % folds;
    let mut assignment = Vec::with_capacity(folds);
    let mut start = 0;
    for fold in 0..folds {
        let size = base + usize::from(fold < remainder);
        let mut members = order[start..start + size].to_vec();
        members.sort_unstable();
        assignment.push(members);
        start += size;
    }
    assignment
}

/// K-fold cross-validation over anchor points.
///
/// Every training split also receives all `extra` points (for example the
/// non-anchor rows of the group); only the `x`/`y` points are ever held out.
///
/// Arguments:
///
/// * `fitter` - model used for each fold
/// * `x` - anchor feature values
/// * `y` - anchor targets
/// * `extra` - `(x, y)` points added to every training split
/// * `folds` - requested fold count, reduced to `n` when fewer points exist
/// * `seed` - shuffle seed
///
/// Returns:
///
/// * `Option<ValidationSummary>` - `None` for fewer than three anchors or when no
///   held-out point could be predicted
pub fn k_fold<F: LinearFitter>(
    fitter: &F,
    x: &[f64],
    y: &[f64],
    extra: &[(f64, f64)],
    folds: usize,
    seed: u64,
) -> Option<ValidationSummary> {
    let n = x.len();
    if n < VALIDATION_FLOOR || y.len() != n || folds < 2 {
        return None;
    }
    let k = if folds > n {
        debug!("requested {} folds for {} anchors, using {}", folds, n, n);
        n
    } else {
        folds
    };

    let assignment = fold_assignment(n, k, seed);
    let mut predictions: Vec<Option<f64>> = vec![None; n];
    let mut fold_r2 = Vec::with_capacity(k);

    for (fold, held_out) in assignment.iter().enumerate() {
        // ascending order keeps the fit identical to the leave-one-out split when k = n
        let mut train: Vec<usize> = assignment
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != fold)
            .flat_map(|(_, members)| members.iter().copied())
            .collect();
        train.sort_unstable();

        let Some(predicted) = predict_held_out(fitter, x, y, &train, extra, held_out) else {
            continue;
        };

        let actual: Vec<f64> = held_out.iter().map(|&i| y[i]).collect();
        if let Some(r2) = r_squared(&actual, &predicted) {
            if actual.len() >= 2 {
                fold_r2.push(r2);
            }
        }
        for (&i, p) in held_out.iter().zip(predicted) {
            predictions[i] = Some(p);
        }
    }

    summarize(ValidationKind::KFold { folds: k }, y, &predictions, &fold_r2)
}

/// Run the configured procedure; `ValidationMethod::None` never validates.
pub fn cross_validate<F: LinearFitter>(
    fitter: &F,
    method: ValidationMethod,
    x: &[f64],
    y: &[f64],
    extra: &[(f64, f64)],
    seed: u64,
) -> Option<ValidationSummary> {
    match method {
        ValidationMethod::Loo => leave_one_out(fitter, x, y),
        ValidationMethod::KFold { folds } => k_fold(fitter, x, y, extra, folds, seed),
        ValidationMethod::None => None,
    }
}
