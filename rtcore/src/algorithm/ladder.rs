//! Level selection: the four-rung fallback ladder.
//!
//! Each group walks [`LADDER`] from the most specific rung to the global one and
//! keeps the first model whose check value clears that rung's threshold. The
//! global rung always yields a model, so every group ends with one after at
//! most four attempts.

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::algorithm::regression::{LinearFitter, RegressionFit, Ridge};
use crate::algorithm::validation::{cross_validate, OverfittingReport, ValidationSummary};
use crate::config::AnalysisSettings;
use crate::data::group::{Group, GroupedDataset};
use crate::error::{AnalysisError, Result};

pub const GLOBAL_SCOPE_KEY: &str = "global";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelScope {
    Prefix,
    Family,
    Global,
}

/// One rung of the ladder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rung {
    pub level: u8,
    pub scope: ModelScope,
    /// Usable anchors the group itself needs before this rung is tried
    pub min_anchors: usize,
}

pub const LADDER: [Rung; 4] = [
    Rung { level: 1, scope: ModelScope::Prefix, min_anchors: 10 },
    Rung { level: 2, scope: ModelScope::Prefix, min_anchors: 4 },
    Rung { level: 3, scope: ModelScope::Family, min_anchors: 3 },
    Rung { level: 4, scope: ModelScope::Global, min_anchors: 0 },
];

/// Index of the global rung, which always produces a model.
const FALLBACK: usize = LADDER.len() - 1;

impl Rung {
    pub fn is_eligible(&self, group: &Group) -> bool {
        match self.scope {
            ModelScope::Prefix => group.usable_anchors() >= self.min_anchors,
            ModelScope::Family => group.family().is_some() && group.usable_anchors() >= self.min_anchors,
            ModelScope::Global => true,
        }
    }
}

/// What the acceptance decision was based on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    /// Pooled cross-validated R²
    Validated,
    /// Training R², because the sample was too small to validate or validation was disabled
    TrainingOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Accepted,
    Rejected,
    Ineligible,
    Unfittable,
}

/// Record of one rung tried for a group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelAttempt {
    pub level: u8,
    pub scope: ModelScope,
    pub outcome: AttemptOutcome,
    pub check_value: Option<f64>,
    pub threshold: f64,
    pub n_samples: usize,
}

/// The model a group ends up with, plus the trail that led to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub level: u8,
    pub scope: ModelScope,
    /// Prefix, family name, or `"global"`
    pub scope_key: String,
    pub slope: f64,
    pub intercept: f64,
    pub training_r2: f64,
    pub ols_r2: f64,
    pub validation_r2: Option<f64>,
    pub rmse: f64,
    /// Points the model was fit on
    pub n_samples: usize,
    /// Anchors in the group the model was selected for
    pub n_anchors: usize,
    pub accepted: bool,
    pub effective_threshold: f64,
    pub check_value: f64,
    pub evidence: Evidence,
    pub validation: Option<ValidationSummary>,
    pub overfitting: Option<OverfittingReport>,
    pub attempts: Vec<LevelAttempt>,
}

impl FittedModel {
    #[inline]
    pub fn predict(&self, log_p: f64) -> f64 {
        self.slope * log_p + self.intercept
    }
}

/// A fitted and (where possible) validated scope, independent of any threshold.
#[derive(Clone, Debug)]
struct Candidate {
    scope_key: String,
    fit: RegressionFit,
    validation: Option<ValidationSummary>,
}

impl Candidate {
    fn check_value(&self) -> f64 {
        self.validation.as_ref().map(|v| v.r2).unwrap_or(self.fit.r2)
    }

    fn evidence(&self) -> Evidence {
        if self.validation.is_some() {
            Evidence::Validated
        } else {
            Evidence::TrainingOnly
        }
    }
}

/// Fit `rows` and cross-validate when the sample allows it.
fn evaluate_scope(
    data: &GroupedDataset,
    fitter: &Ridge,
    settings: &AnalysisSettings,
    scope_key: &str,
    rows: &[usize],
    extra_rows: &[usize],
) -> Option<Candidate> {
    let (x, y) = data.points(rows);
    let fit = fitter.fit(&x, &y)?;

    let (extra_x, extra_y) = data.points(extra_rows);
    let extra: Vec<(f64, f64)> = extra_x.into_iter().zip(extra_y).collect();
    let validation = cross_validate(fitter, settings.validation, &x, &y, &extra, settings.kfold_seed);

    Some(Candidate {
        scope_key: scope_key.to_string(),
        fit,
        validation,
    })
}

/// Walks the ladder for every group of one dataset under one settings value.
///
/// Family and global fits do not depend on the group asking for them and are
/// computed once per selector.
pub struct LevelSelector<'a> {
    data: &'a GroupedDataset,
    settings: &'a AnalysisSettings,
    fitter: Ridge,
    families: HashMap<String, Option<Candidate>>,
    global: Candidate,
}

impl<'a> LevelSelector<'a> {
    /// Prepare a selector, fitting the global model up front.
    ///
    /// Arguments:
    ///
    /// * `data` - grouped dataset snapshot
    /// * `settings` - thresholds, validation method and ridge penalty for this run
    ///
    /// Returns:
    ///
    /// * `Result<LevelSelector>` - `NoAnchors` if the dataset has no anchors,
    ///   `UnfittableGlobal` if the global anchors cannot be fit
    pub fn new(data: &'a GroupedDataset, settings: &'a AnalysisSettings) -> Result<Self> {
        let anchors = data.anchors();
        if anchors.is_empty() {
            return Err(AnalysisError::NoAnchors);
        }

        let fitter = Ridge::new(settings.ridge_alpha);
        let global = evaluate_scope(data, &fitter, settings, GLOBAL_SCOPE_KEY, anchors, &[])
            .ok_or(AnalysisError::UnfittableGlobal { anchors: anchors.len() })?;

        Ok(LevelSelector {
            data,
            settings,
            fitter,
            families: HashMap::new(),
            global,
        })
    }

    fn prefix_candidate(&self, group: &Group) -> Option<Candidate> {
        let extra = group.non_anchors(self.data.compounds());
        evaluate_scope(self.data, &self.fitter, self.settings, group.prefix(), group.anchors(), &extra)
    }

    fn family_candidate(&mut self, family: &str) -> Option<Candidate> {
        if let Some(cached) = self.families.get(family) {
            return cached.clone();
        }
        let candidate = evaluate_scope(
            self.data,
            &self.fitter,
            self.settings,
            family,
            self.data.family_anchors(family),
            &[],
        );
        self.families.insert(family.to_string(), candidate.clone());
        candidate
    }

    /// Try one rung for `group`; the prefix fit is shared between levels 1 and 2.
    fn attempt(
        &mut self,
        rung: &Rung,
        group: &Group,
        prefix_cache: &mut Option<Option<Candidate>>,
    ) -> (LevelAttempt, Option<Candidate>) {
        let threshold = self.settings.thresholds.for_level(rung.level);
        let mut record = LevelAttempt {
            level: rung.level,
            scope: rung.scope,
            outcome: AttemptOutcome::Ineligible,
            check_value: None,
            threshold,
            n_samples: 0,
        };

        if !rung.is_eligible(group) {
            return (record, None);
        }

        let candidate = match rung.scope {
            ModelScope::Prefix => {
                if prefix_cache.is_none() {
                    *prefix_cache = Some(self.prefix_candidate(group));
                }
                prefix_cache.clone().flatten()
            }
            ModelScope::Family => match group.family() {
                Some(family) => self.family_candidate(family),
                None => None,
            },
            ModelScope::Global => Some(self.global.clone()),
        };

        let Some(candidate) = candidate else {
            record.outcome = AttemptOutcome::Unfittable;
            debug!("{}: level {} unfittable", group.prefix(), rung.level);
            return (record, None);
        };

        let check = candidate.check_value();
        record.check_value = Some(check);
        record.n_samples = candidate.fit.n;
        record.outcome = if check >= threshold {
            AttemptOutcome::Accepted
        } else {
            AttemptOutcome::Rejected
        };

        debug!(
            "{}: level {} ({:?} {}) n={} check={:.4} ({:?}) threshold={:.2} -> {:?}",
            group.prefix(),
            rung.level,
            rung.scope,
            candidate.scope_key,
            candidate.fit.n,
            check,
            candidate.evidence(),
            threshold,
            record.outcome
        );

        (record, Some(candidate))
    }

    fn model(
        &self,
        rung: &Rung,
        candidate: Candidate,
        accepted: bool,
        group: &Group,
        attempts: Vec<LevelAttempt>,
    ) -> FittedModel {
        let check_value = candidate.check_value();
        let evidence = candidate.evidence();
        let fit = candidate.fit;
        let overfitting = candidate
            .validation
            .as_ref()
            .map(|v| OverfittingReport::new(fit.r2, v.r2));

        FittedModel {
            level: rung.level,
            scope: rung.scope,
            scope_key: candidate.scope_key,
            slope: fit.slope,
            intercept: fit.intercept,
            training_r2: fit.r2,
            ols_r2: fit.ols_r2,
            validation_r2: candidate.validation.as_ref().map(|v| v.r2),
            rmse: fit.rmse,
            n_samples: fit.n,
            n_anchors: group.anchor_count(),
            accepted,
            effective_threshold: self.settings.thresholds.for_level(rung.level),
            check_value,
            evidence,
            validation: candidate.validation,
            overfitting,
            attempts,
        }
    }

    /// Walk the ladder for one group.
    pub fn select(&mut self, group: &Group) -> FittedModel {
        let mut attempts = Vec::with_capacity(LADDER.len());
        let mut prefix_cache = None;

        for rung in &LADDER[..FALLBACK] {
            let (record, candidate) = self.attempt(rung, group, &mut prefix_cache);
            let accepted = record.outcome == AttemptOutcome::Accepted;
            attempts.push(record);
            if let (true, Some(candidate)) = (accepted, candidate) {
                return self.model(rung, candidate, true, group, attempts);
            }
        }

        let fallback = &LADDER[FALLBACK];
        let (record, _) = self.attempt(fallback, group, &mut prefix_cache);
        let accepted = record.outcome == AttemptOutcome::Accepted;
        attempts.push(record);
        if !accepted {
            warn!(
                "{}: no level cleared its threshold, using the global model (R² {:.4} < {:.2})",
                group.prefix(),
                self.global.check_value(),
                self.settings.thresholds.for_level(fallback.level)
            );
        }
        let global = self.global.clone();
        self.model(fallback, global, accepted, group, attempts)
    }

    /// Select a model for every group.
    pub fn select_all(&mut self) -> BTreeMap<String, FittedModel> {
        let data = self.data;
        data.groups()
            .iter()
            .map(|(prefix, group)| (prefix.clone(), self.select(group)))
            .collect()
    }

    /// Select a model for every group, asking `keep_going` before each one.
    ///
    /// `keep_going` receives the number of groups completed so far; returning
    /// `false` stops the run with [`AnalysisError::Cancelled`]. This is where a
    /// caller enforces a wall-clock bound.
    pub fn select_all_with<F>(&mut self, mut keep_going: F) -> Result<BTreeMap<String, FittedModel>>
    where
        F: FnMut(usize) -> bool,
    {
        let data = self.data;
        let mut models = BTreeMap::new();
        for (completed, (prefix, group)) in data.groups().iter().enumerate() {
            if !keep_going(completed) {
                return Err(AnalysisError::Cancelled { completed });
            }
            models.insert(prefix.clone(), self.select(group));
        }
        Ok(models)
    }
}
