//! Repeated runs over identical input must agree bit for bit.

use rtcore::algorithm::optimizer::{optimize_thresholds, OptimizerConfig, ThresholdGrid};
use rtcore::chemistry::nomenclature::Nomenclature;
use rtcore::data::compound::Compound;
use rtcore::data::group::GroupedDataset;
use rtcore::{analyze, AnalysisSettings, ValidationMethod};

fn dataset() -> Vec<Compound> {
    let prefixes = ["GM3", "GM3+OAc", "GD1a", "GD1b", "GT1b", "GQ1b"];
    (0..60)
        .map(|i| {
            let prefix = prefixes[i % prefixes.len()];
            let log_p = 0.3 + (i as f64 * 0.173) % 5.0;
            let noise = ((i * 31) % 17) as f64 / 17.0 - 0.5;
            let anchor = i % 4 != 3;
            Compound::new(format!("{}({}:1;O2)", prefix, 30 + i % 12), 1.9 * log_p + 3.5 + noise, log_p, anchor)
                .with_volume(1.0e5 + i as f64)
        })
        .collect()
}

#[test]
fn analysis_deterministic_across_runs() {
    let settings = AnalysisSettings {
        validation: ValidationMethod::KFold { folds: 5 },
        ..AnalysisSettings::default()
    };
    let compounds = dataset();
    let run1 = analyze(&compounds, &Nomenclature::ganglioside(), &settings).unwrap();
    let run2 = analyze(&compounds, &Nomenclature::ganglioside(), &settings).unwrap();

    assert_eq!(run1.stats, run2.stats);
    for (a, b) in run1.compounds.iter().zip(run2.compounds.iter()) {
        let (a, b) = (a.outcome.as_ref().unwrap(), b.outcome.as_ref().unwrap());
        assert_eq!(a.predicted_rt.to_bits(), b.predicted_rt.to_bits());
        assert_eq!(a.standardized_residual.to_bits(), b.standardized_residual.to_bits());
        assert_eq!(a.classification, b.classification);
    }
    for (prefix, model) in &run1.models {
        let other = &run2.models[prefix];
        assert_eq!(model.slope.to_bits(), other.slope.to_bits());
        assert_eq!(model.check_value.to_bits(), other.check_value.to_bits());
        assert_eq!(model.level, other.level);
    }
}

#[test]
fn optimizer_deterministic_across_thread_counts() {
    let data = GroupedDataset::build(&dataset(), &Nomenclature::ganglioside()).unwrap();
    let grid = ThresholdGrid {
        level1: vec![0.7, 0.8, 0.9],
        level2: vec![0.6, 0.7, 0.8],
        level3: vec![0.5, 0.6, 0.7],
        level4: vec![0.3, 0.5],
    };
    let results: Vec<_> = [1, 2, 8]
        .iter()
        .map(|&threads| {
            let config = OptimizerConfig {
                grid: grid.clone(),
                threads: Some(threads),
                ..OptimizerConfig::default()
            };
            optimize_thresholds(&data, &AnalysisSettings::default(), &config).unwrap()
        })
        .collect();

    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], results[2]);
}
