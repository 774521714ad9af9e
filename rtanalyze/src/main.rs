mod io;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use rtcore::algorithm::optimizer::{optimize_thresholds, OptimizerConfig, ThresholdGrid};
use rtcore::chemistry::nomenclature::Nomenclature;
use rtcore::data::group::GroupedDataset;
use rtcore::{analyze, AnalysisSettings, ValidationMethod};

#[derive(Parser)]
#[command(name = "rtanalyze")]
#[command(about = "Retention time regression and validation of annotated compounds", long_about = None)]
struct Cli {
    /// Log every level attempt
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    Loo,
    Kfold,
    None,
}

#[derive(Subcommand)]
enum Command {
    /// Fit per-group models and classify every compound
    Analyze {
        data: PathBuf,
        #[arg(long)]
        settings: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum)]
        method: Option<Method>,
        #[arg(long)]
        folds: Option<usize>,
    },
    /// Grid-search the four level thresholds
    Optimize {
        data: PathBuf,
        #[arg(long)]
        settings: Option<PathBuf>,
        #[arg(long)]
        grid: Option<PathBuf>,
        #[arg(long)]
        threads: Option<usize>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<AnalysisSettings> {
    match path {
        Some(path) => io::load_json(path),
        None => Ok(AnalysisSettings::default()),
    }
}

/// Command-line overrides of the validation procedure; `--folds` alone implies k-fold.
fn validation_override(
    method: Option<Method>,
    folds: Option<usize>,
    current: ValidationMethod,
) -> ValidationMethod {
    let current_folds = match current {
        ValidationMethod::KFold { folds } => folds,
        _ => 5,
    };
    match (method, folds) {
        (Some(Method::Loo), _) => ValidationMethod::Loo,
        (Some(Method::None), _) => ValidationMethod::None,
        (Some(Method::Kfold), folds) | (None, folds @ Some(_)) => ValidationMethod::KFold {
            folds: folds.unwrap_or(current_folds),
        },
        (None, None) => current,
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let nomenclature = Nomenclature::ganglioside();

    match cli.command {
        Command::Analyze {
            data,
            settings,
            output,
            method,
            folds,
        } => {
            let mut settings = load_settings(settings.as_ref())?;
            settings.validation = validation_override(method, folds, settings.validation);

            let compounds = io::load_compounds(&data)?;
            info!("loaded {} compounds from {}", compounds.len(), data.display());

            let report = analyze(&compounds, &nomenclature, &settings).context("analysis failed")?;
            io::write_json(&report, output.as_deref())?;
        }
        Command::Optimize {
            data,
            settings,
            grid,
            threads,
            output,
        } => {
            let settings = load_settings(settings.as_ref())?;
            let grid: ThresholdGrid = match grid {
                Some(path) => io::load_json(&path)?,
                None => ThresholdGrid::default(),
            };
            let config = OptimizerConfig {
                grid,
                threads,
                ..OptimizerConfig::default()
            };

            let compounds = io::load_compounds(&data)?;
            let dataset = GroupedDataset::build(&compounds, &nomenclature).context("grouping compounds")?;
            let result = optimize_thresholds(&dataset, &settings, &config).context("optimization failed")?;
            info!(
                "best thresholds {:?} (score {:.4}) over {} combinations",
                result.best.as_array(),
                result.best_score.score,
                result.evaluated
            );
            io::write_json(&result, output.as_deref())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_override() {
        let loo = ValidationMethod::Loo;
        assert_eq!(validation_override(None, None, loo), loo);
        assert_eq!(validation_override(Some(Method::None), Some(3), loo), ValidationMethod::None);
        assert_eq!(validation_override(None, Some(3), loo), ValidationMethod::KFold { folds: 3 });
        assert_eq!(validation_override(Some(Method::Kfold), None, loo), ValidationMethod::KFold { folds: 5 });
        assert_eq!(
            validation_override(Some(Method::Kfold), None, ValidationMethod::KFold { folds: 10 }),
            ValidationMethod::KFold { folds: 10 }
        );
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["rtanalyze", "analyze", "data.csv", "--method", "kfold", "--folds", "4"]).unwrap();
        match cli.command {
            Command::Analyze { method, folds, .. } => {
                assert!(matches!(method, Some(Method::Kfold)));
                assert_eq!(folds, Some(4));
            }
            Command::Optimize { .. } => panic!("expected analyze"),
        }
    }
}
