//! One analysis run: parse, group, select, classify, summarize.

use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

use crate::algorithm::classify::classify_group;
use crate::algorithm::ladder::{FittedModel, LevelSelector, LADDER};
use crate::chemistry::nomenclature::Nomenclature;
use crate::config::AnalysisSettings;
use crate::data::compound::{Classification, Compound, Confidence};
use crate::data::group::GroupedDataset;
use crate::error::Result;

/// Aggregate counts of one run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub total: usize,
    pub valid: usize,
    pub outliers: usize,
    pub anchors: usize,
    pub anchors_valid: usize,
    /// Valid anchors over all anchors; 1.0 unless the anchor invariant is broken
    pub anchor_preservation_rate: f64,
    /// Valid compounds over all compounds
    pub success_rate: f64,
    pub groups: usize,
    /// Groups whose final model sits on level 1, 2, 3, 4
    pub level_usage: [usize; 4],
    pub accepted_groups: usize,
    /// Compounds labelled with low confidence
    pub low_confidence: usize,
}

impl AnalysisStats {
    pub fn from_run(compounds: &[Compound], models: &BTreeMap<String, FittedModel>) -> Self {
        let mut stats = AnalysisStats {
            total: compounds.len(),
            groups: models.len(),
            ..AnalysisStats::default()
        };

        for compound in compounds {
            let Some(outcome) = &compound.outcome else { continue };
            match outcome.classification {
                Classification::Valid => stats.valid += 1,
                Classification::Outlier => stats.outliers += 1,
            }
            if outcome.confidence == Confidence::Low {
                stats.low_confidence += 1;
            }
            if compound.is_anchor {
                stats.anchors += 1;
                if outcome.classification == Classification::Valid {
                    stats.anchors_valid += 1;
                }
            }
        }

        for model in models.values() {
            let slot = (model.level as usize).clamp(1, LADDER.len()) - 1;
            stats.level_usage[slot] += 1;
            if model.accepted {
                stats.accepted_groups += 1;
            }
        }

        stats.anchor_preservation_rate = if stats.anchors == 0 {
            1.0
        } else {
            stats.anchors_valid as f64 / stats.anchors as f64
        };
        stats.success_rate = if stats.total == 0 {
            0.0
        } else {
            stats.valid as f64 / stats.total as f64
        };
        stats
    }
}

/// Everything a run produces: one model per prefix, the labelled compounds, the summary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub models: BTreeMap<String, FittedModel>,
    pub compounds: Vec<Compound>,
    pub stats: AnalysisStats,
}

/// Run the ladder and classifier over an already grouped dataset.
///
/// The dataset is only read; classification happens on a private copy of the
/// compounds, so concurrent runs over the same dataset share nothing mutable.
pub fn analyze_grouped(data: &GroupedDataset, settings: &AnalysisSettings) -> Result<AnalysisReport> {
    analyze_grouped_with(data, settings, |_| true)
}

/// As [`analyze_grouped`], checking `keep_going` between groups.
pub fn analyze_grouped_with<F>(data: &GroupedDataset, settings: &AnalysisSettings, keep_going: F) -> Result<AnalysisReport>
where
    F: FnMut(usize) -> bool,
{
    settings.validate()?;

    let mut selector = LevelSelector::new(data, settings)?;
    let models = selector.select_all_with(keep_going)?;

    let mut compounds = data.compounds().to_vec();
    for (prefix, model) in &models {
        if let Some(group) = data.group(prefix) {
            classify_group(model, group, &mut compounds, settings);
        }
    }

    let stats = AnalysisStats::from_run(&compounds, &models);
    Ok(AnalysisReport { models, compounds, stats })
}

/// Analyze a dataset snapshot end to end.
///
/// Arguments:
///
/// * `compounds` - input rows; never modified
/// * `nomenclature` - naming rules for prefix and family
/// * `settings` - immutable run settings
///
/// Returns:
///
/// * `Result<AnalysisReport>` - per-prefix models, labelled compounds and statistics
///
/// # Examples
///
/// ```
/// use rtcore::chemistry::nomenclature::Nomenclature;
/// use rtcore::data::compound::Compound;
/// use rtcore::{analyze, AnalysisSettings};
///
/// let compounds: Vec<Compound> = (0..6)
///     .map(|i| {
///         let log_p = 1.0 + i as f64;
///         Compound::new(format!("GM3({}:1;O2)", 32 + 2 * i), 2.0 * log_p + 4.0, log_p, true)
///     })
///     .collect();
///
/// let report = analyze(&compounds, &Nomenclature::ganglioside(), &AnalysisSettings::default()).unwrap();
/// assert_eq!(report.stats.anchor_preservation_rate, 1.0);
/// assert_eq!(report.models["GM3"].level, 2);
/// ```
pub fn analyze(compounds: &[Compound], nomenclature: &Nomenclature, settings: &AnalysisSettings) -> Result<AnalysisReport> {
    let data = GroupedDataset::build(compounds, nomenclature)?;
    let report = analyze_grouped(&data, settings)?;

    info!(
        "analyzed {} compounds in {} groups: {} valid, {} outliers, levels {:?}, {} low-confidence",
        report.stats.total,
        report.stats.groups,
        report.stats.valid,
        report.stats.outliers,
        report.stats.level_usage,
        report.stats.low_confidence
    );
    Ok(report)
}
