use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Valid,
    Outlier,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationReason {
    /// Anchor inside the outlier window
    ReferenceAnchor,
    /// Anchor outside the outlier window, kept as ground truth
    ReferenceOverride,
    WithinThreshold,
    ExceedsThreshold,
    OutsideRtTolerance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
}

/// Classifier output attached to a compound.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompoundOutcome {
    pub predicted_rt: f64,
    pub residual: f64,
    pub standardized_residual: f64,
    pub classification: Classification,
    pub reason: ClassificationReason,
    pub confidence: Confidence,
}

/// One measured row of the dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Compound {
    pub name: String,
    /// Observed retention time
    pub rt: f64,
    /// Lipophilicity, the single regression feature
    pub log_p: f64,
    /// Peak intensity, informational only
    pub volume: Option<f64>,
    pub is_anchor: bool,
    pub prefix: Option<String>,
    pub family: Option<String>,
    pub outcome: Option<CompoundOutcome>,
}

impl Compound {
    pub fn new(name: impl Into<String>, rt: f64, log_p: f64, is_anchor: bool) -> Self {
        Compound {
            name: name.into(),
            rt,
            log_p,
            volume: None,
            is_anchor,
            prefix: None,
            family: None,
            outcome: None,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn is_valid(&self) -> bool {
        matches!(
            self.outcome.as_ref().map(|o| o.classification),
            Some(Classification::Valid)
        )
    }

    /// Check the numeric preconditions the upstream loader is expected to guarantee.
    ///
    /// Arguments:
    ///
    /// * `row` - position of the compound in the dataset, used in the error
    ///
    /// Returns:
    ///
    /// * `Result<()>` - `InvalidInput` for an empty name or a non-finite RT, Log P or volume
    pub fn check(&self, row: usize) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AnalysisError::InvalidInput {
                row,
                field: "name",
                reason: "empty compound name".to_string(),
            });
        }
        if !self.rt.is_finite() {
            return Err(AnalysisError::InvalidInput {
                row,
                field: "rt",
                reason: format!("non-finite value {}", self.rt),
            });
        }
        if !self.log_p.is_finite() {
            return Err(AnalysisError::InvalidInput {
                row,
                field: "log_p",
                reason: format!("non-finite value {}", self.log_p),
            });
        }
        if let Some(volume) = self.volume {
            if !volume.is_finite() {
                return Err(AnalysisError::InvalidInput {
                    row,
                    field: "volume",
                    reason: format!("non-finite value {}", volume),
                });
            }
        }
        Ok(())
    }
}
