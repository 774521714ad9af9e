//! Retention time prediction and validation for grouped compound annotations.
//!
//! Compounds are grouped by the class prefix of their name, each group gets the
//! most specific ridge model that survives cross-validation on a four-level
//! ladder (prefix, prefix, family, global), and every compound is then labelled
//! valid or outlier from its standardized residual.

pub mod error;
pub mod config;

// chemistry module
pub mod chemistry {
    pub mod nomenclature;
}

// data module
pub mod data {
    pub mod compound;
    pub mod group;
}

// algorithm module
pub mod algorithm {
    pub mod regression;
    pub mod validation;
    pub mod ladder;
    pub mod classify;
    pub mod optimizer;
}

pub mod analysis;

pub use analysis::{analyze, AnalysisReport, AnalysisStats};
pub use config::{AnalysisSettings, ThresholdConfig, ValidationMethod};
pub use error::{AnalysisError, Result};
