//! Grid search over ladder thresholds.
//!
//! Every monotone combination of the candidate grids is scored by a full
//! ladder + classifier run. Runs are independent and only read the shared
//! dataset, so they fan out over a rayon pool and fan back in by argmax.

use std::cmp::Reverse;

use itertools::iproduct;
use log::info;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};

use crate::analysis::{analyze_grouped, AnalysisReport};
use crate::config::{AnalysisSettings, ThresholdConfig};
use crate::data::group::GroupedDataset;
use crate::error::{AnalysisError, Result};

/// Weights of the composite objective.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    pub acceptance: f64,
    pub false_positive: f64,
    pub mean_r2: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        ObjectiveWeights {
            acceptance: 0.4,
            false_positive: 0.4,
            mean_r2: 0.2,
        }
    }
}

/// Evenly spaced values from `start` to `stop` inclusive, rounded to 1e-6.
///
/// # Examples
///
/// ```
/// use rtcore::algorithm::optimizer::steps;
///
/// assert_eq!(steps(0.5, 0.7, 0.1), vec![0.5, 0.6, 0.7]);
/// ```
pub fn steps(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || stop < start {
        return vec![start];
    }
    let count = ((stop - start) / step + 1e-9).floor() as usize;
    (0..=count)
        .map(|i| ((start + i as f64 * step) * 1e6).round() / 1e6)
        .collect()
}

/// Candidate values per ladder level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdGrid {
    pub level1: Vec<f64>,
    pub level2: Vec<f64>,
    pub level3: Vec<f64>,
    pub level4: Vec<f64>,
}

impl Default for ThresholdGrid {
    fn default() -> Self {
        ThresholdGrid {
            level1: steps(0.60, 0.90, 0.05),
            level2: steps(0.55, 0.85, 0.05),
            level3: steps(0.50, 0.80, 0.05),
            level4: steps(0.30, 0.60, 0.05),
        }
    }
}

impl ThresholdGrid {
    /// Every combination that is a valid, monotone [`ThresholdConfig`], in grid order.
    pub fn combinations(&self) -> Vec<ThresholdConfig> {
        iproduct!(
            self.level1.iter(),
            self.level2.iter(),
            self.level3.iter(),
            self.level4.iter()
        )
        .filter_map(|(&l1, &l2, &l3, &l4)| ThresholdConfig::new(l1, l2, l3, l4).ok())
        .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub grid: ThresholdGrid,
    pub weights: ObjectiveWeights,
    /// Validation R² below which an accepted group counts as a false positive (default: 0.5)
    pub r2_floor: f64,
    /// Worker threads; `None` uses the global rayon pool
    pub threads: Option<usize>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            grid: ThresholdGrid::default(),
            weights: ObjectiveWeights::default(),
            r2_floor: 0.5,
            threads: None,
        }
    }
}

/// Objective terms for one threshold combination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub thresholds: ThresholdConfig,
    /// Groups accepted on levels 1-3 over all groups
    pub acceptance_rate: f64,
    /// Accepted groups whose validation R² is missing or below the floor, over accepted groups
    pub false_positive_rate: f64,
    pub mean_validation_r2: f64,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub best: ThresholdConfig,
    pub best_score: CandidateScore,
    pub evaluated: usize,
    pub candidates: Vec<CandidateScore>,
}

/// Score one finished run against the composite objective.
///
/// Arguments:
///
/// * `thresholds` - the combination that produced `report`
/// * `report` - result of the run
/// * `config` - floor and weights
///
/// Returns:
///
/// * `CandidateScore` - the three objective terms and their weighted sum
pub fn score_report(thresholds: ThresholdConfig, report: &AnalysisReport, config: &OptimizerConfig) -> CandidateScore {
    let groups = report.models.len();
    let accepted: Vec<_> = report
        .models
        .values()
        .filter(|m| m.accepted && m.level <= 3)
        .collect();

    let acceptance_rate = if groups == 0 {
        0.0
    } else {
        accepted.len() as f64 / groups as f64
    };

    let (false_positive_rate, mean_validation_r2) = if accepted.is_empty() {
        (0.0, 0.0)
    } else {
        let false_positives = accepted
            .iter()
            .filter(|m| m.validation_r2.map(|r2| r2 < config.r2_floor).unwrap_or(true))
            .count();
        let r2_sum: f64 = accepted
            .iter()
            .map(|m| m.validation_r2.unwrap_or(m.check_value))
            .sum();
        (
            false_positives as f64 / accepted.len() as f64,
            r2_sum / accepted.len() as f64,
        )
    };

    let weights = &config.weights;
    let score = weights.acceptance * acceptance_rate
        + weights.false_positive * (1.0 - false_positive_rate)
        + weights.mean_r2 * mean_validation_r2;

    CandidateScore {
        thresholds,
        acceptance_rate,
        false_positive_rate,
        mean_validation_r2,
        score,
    }
}

fn evaluate(
    data: &GroupedDataset,
    base: &AnalysisSettings,
    thresholds: ThresholdConfig,
    config: &OptimizerConfig,
) -> Result<CandidateScore> {
    let settings = base.with_thresholds(thresholds);
    let report = analyze_grouped(data, &settings)?;
    Ok(score_report(thresholds, &report, config))
}

/// Highest-scoring candidate; ties go to the earliest one in grid order.
pub fn best_candidate(candidates: &[CandidateScore]) -> Option<&CandidateScore> {
    candidates
        .iter()
        .enumerate()
        .max_by_key(|(i, c)| (OrderedFloat(c.score), Reverse(*i)))
        .map(|(_, c)| c)
}

/// Search the grid for the threshold combination with the best composite score.
///
/// Arguments:
///
/// * `data` - grouped dataset, shared read-only by all workers
/// * `base` - settings for every run; only the thresholds are replaced
/// * `config` - grid, weights, floor and thread count
///
/// Returns:
///
/// * `Result<OptimizationResult>` - `EmptyGrid` if no monotone combination exists;
///   ties go to the earliest combination in grid order
pub fn optimize_thresholds(
    data: &GroupedDataset,
    base: &AnalysisSettings,
    config: &OptimizerConfig,
) -> Result<OptimizationResult> {
    let combinations = config.grid.combinations();
    if combinations.is_empty() {
        return Err(AnalysisError::EmptyGrid);
    }
    info!("evaluating {} threshold combinations", combinations.len());

    let run = || -> Result<Vec<CandidateScore>> {
        combinations
            .par_iter()
            .map(|&thresholds| evaluate(data, base, thresholds, config))
            .collect()
    };

    let candidates = match config.threads {
        Some(threads) => {
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| AnalysisError::ThreadPool(e.to_string()))?;
            pool.install(run)?
        }
        None => run()?,
    };

    let best_score = best_candidate(&candidates).cloned().ok_or(AnalysisError::EmptyGrid)?;

    info!(
        "best thresholds {:?} with score {:.4} (acceptance {:.3}, false positives {:.3}, mean R² {:.3})",
        best_score.thresholds.as_array(),
        best_score.score,
        best_score.acceptance_rate,
        best_score.false_positive_rate,
        best_score.mean_validation_r2
    );

    Ok(OptimizationResult {
        best: best_score.thresholds,
        evaluated: candidates.len(),
        best_score,
        candidates,
    })
}
