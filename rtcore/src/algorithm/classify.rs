use crate::algorithm::ladder::{Evidence, FittedModel};
use crate::config::AnalysisSettings;
use crate::data::compound::{Classification, ClassificationReason, Compound, CompoundOutcome, Confidence};
use crate::data::group::Group;

/// Residual, standardized residual and label for one compound under `model`.
///
/// Anchors are always valid. A non-anchor is an outlier when its
/// standardized residual reaches `outlier_threshold`, or when it falls outside
/// the optional absolute `rt_tolerance`. Non-anchor labels from a model that
/// was not accepted, or that rests on training R² only, carry low confidence.
///
/// Arguments:
///
/// * `model` - the group's selected model
/// * `compound` - the compound to label
/// * `settings` - run settings supplying the dispersion constant and cut-offs
///
/// Returns:
///
/// * `CompoundOutcome` - prediction, residuals and label
pub fn classify_compound(model: &FittedModel, compound: &Compound, settings: &AnalysisSettings) -> CompoundOutcome {
    let predicted_rt = model.predict(compound.log_p);
    let residual = compound.rt - predicted_rt;
    let standardized_residual = residual / settings.residual_scale;

    let exceeds_z = standardized_residual.abs() >= settings.outlier_threshold;
    let outside_window = settings
        .rt_tolerance
        .map(|tolerance| residual.abs() > tolerance)
        .unwrap_or(false);

    let (classification, reason, confidence) = if compound.is_anchor {
        let reason = if exceeds_z || outside_window {
            ClassificationReason::ReferenceOverride
        } else {
            ClassificationReason::ReferenceAnchor
        };
        (Classification::Valid, reason, Confidence::High)
    } else {
        let confidence = if model.accepted && model.evidence == Evidence::Validated {
            Confidence::High
        } else {
            Confidence::Low
        };
        if exceeds_z {
            (Classification::Outlier, ClassificationReason::ExceedsThreshold, confidence)
        } else if outside_window {
            (Classification::Outlier, ClassificationReason::OutsideRtTolerance, confidence)
        } else {
            (Classification::Valid, ClassificationReason::WithinThreshold, confidence)
        }
    };

    CompoundOutcome {
        predicted_rt,
        residual,
        standardized_residual,
        classification,
        reason,
        confidence,
    }
}

/// Label every member of `group` in place.
pub fn classify_group(model: &FittedModel, group: &Group, compounds: &mut [Compound], settings: &AnalysisSettings) {
    for &i in group.members() {
        let outcome = classify_compound(model, &compounds[i], settings);
        compounds[i].outcome = Some(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::ladder::{ModelScope, GLOBAL_SCOPE_KEY};

    fn model(accepted: bool, evidence: Evidence) -> FittedModel {
        FittedModel {
            level: 4,
            scope: ModelScope::Global,
            scope_key: GLOBAL_SCOPE_KEY.to_string(),
            slope: 2.0,
            intercept: 4.0,
            training_r2: 0.9,
            ols_r2: 0.92,
            validation_r2: Some(0.8),
            rmse: 0.3,
            n_samples: 10,
            n_anchors: 3,
            accepted,
            effective_threshold: 0.5,
            check_value: 0.8,
            evidence,
            validation: None,
            overfitting: None,
            attempts: Vec::new(),
        }
    }

    #[test]
    fn test_anchor_always_valid() {
        let settings = AnalysisSettings::default();
        let anchor = Compound::new("GM3(36:1;O2)", 30.0, 3.0, true);
        let outcome = classify_compound(&model(true, Evidence::Validated), &anchor, &settings);
        assert_eq!(outcome.classification, Classification::Valid);
        assert_eq!(outcome.reason, ClassificationReason::ReferenceOverride);
        assert!((outcome.residual - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_anchor_within_threshold() {
        let settings = AnalysisSettings::default();
        let anchor = Compound::new("GM3(36:1;O2)", 10.5, 3.0, true);
        let outcome = classify_compound(&model(true, Evidence::Validated), &anchor, &settings);
        assert_eq!(outcome.reason, ClassificationReason::ReferenceAnchor);
        assert_eq!(outcome.confidence, Confidence::High);
    }

    #[test]
    fn test_non_anchor_outlier_at_threshold() {
        let settings = AnalysisSettings::default();
        // predicted 10.0, residual exactly 3.0
        let compound = Compound::new("GM3(38:1;O2)", 13.0, 3.0, false);
        let outcome = classify_compound(&model(true, Evidence::Validated), &compound, &settings);
        assert_eq!(outcome.classification, Classification::Outlier);
        assert_eq!(outcome.reason, ClassificationReason::ExceedsThreshold);
        assert!((outcome.standardized_residual - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_residual_scale_is_fixed() {
        let settings = AnalysisSettings {
            residual_scale: 0.5,
            ..AnalysisSettings::default()
        };
        let compound = Compound::new("GM3(38:1;O2)", 11.0, 3.0, false);
        let outcome = classify_compound(&model(true, Evidence::Validated), &compound, &settings);
        assert!((outcome.standardized_residual - 2.0).abs() < 1e-12);
        assert_eq!(outcome.classification, Classification::Valid);
    }

    #[test]
    fn test_rt_tolerance_window() {
        let settings = AnalysisSettings {
            rt_tolerance: Some(0.5),
            ..AnalysisSettings::default()
        };
        let compound = Compound::new("GM3(38:1;O2)", 10.8, 3.0, false);
        let outcome = classify_compound(&model(true, Evidence::Validated), &compound, &settings);
        assert_eq!(outcome.classification, Classification::Outlier);
        assert_eq!(outcome.reason, ClassificationReason::OutsideRtTolerance);
    }

    #[test]
    fn test_unaccepted_model_lowers_confidence() {
        let settings = AnalysisSettings::default();
        let compound = Compound::new("GM3(38:1;O2)", 10.2, 3.0, false);

        let outcome = classify_compound(&model(false, Evidence::Validated), &compound, &settings);
        assert_eq!(outcome.classification, Classification::Valid);
        assert_eq!(outcome.confidence, Confidence::Low);

        let outcome = classify_compound(&model(true, Evidence::TrainingOnly), &compound, &settings);
        assert_eq!(outcome.confidence, Confidence::Low);
    }
}
