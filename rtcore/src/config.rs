use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// R² cut-offs for the four ladder rungs, strictest first.
///
/// Invariant: `level1 >= level2 >= level3 >= level4`, all within `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub level1: f64,
    pub level2: f64,
    pub level3: f64,
    pub level4: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        ThresholdConfig {
            level1: 0.75,
            level2: 0.70,
            level3: 0.70,
            level4: 0.50,
        }
    }
}

impl ThresholdConfig {
    /// Build a validated threshold configuration.
    ///
    /// Arguments:
    ///
    /// * `level1` .. `level4` - R² cut-offs, must be non-increasing
    ///
    /// Returns:
    ///
    /// * `Result<ThresholdConfig>` - error if the values are out of range or not monotone
    ///
    /// # Examples
    ///
    /// ```
    /// use rtcore::config::ThresholdConfig;
    ///
    /// assert!(ThresholdConfig::new(0.8, 0.7, 0.6, 0.5).is_ok());
    /// assert!(ThresholdConfig::new(0.6, 0.7, 0.6, 0.5).is_err());
    /// ```
    pub fn new(level1: f64, level2: f64, level3: f64, level4: f64) -> Result<Self> {
        let config = ThresholdConfig { level1, level2, level3, level4 };
        config.validate()?;
        Ok(config)
    }

    /// Tight cut-offs for curated reference panels.
    pub fn strict() -> Self {
        ThresholdConfig {
            level1: 0.85,
            level2: 0.80,
            level3: 0.75,
            level4: 0.60,
        }
    }

    /// Loose cut-offs for sparse exploratory datasets.
    pub fn permissive() -> Self {
        ThresholdConfig {
            level1: 0.65,
            level2: 0.60,
            level3: 0.55,
            level4: 0.40,
        }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.level1, self.level2, self.level3, self.level4]
    }

    /// Threshold for a ladder level (1-4); levels past 4 map to the loosest rung.
    pub fn for_level(&self, level: u8) -> f64 {
        match level {
            1 => self.level1,
            2 => self.level2,
            3 => self.level3,
            _ => self.level4,
        }
    }

    pub fn is_monotone(&self) -> bool {
        self.level1 >= self.level2 && self.level2 >= self.level3 && self.level3 >= self.level4
    }

    pub fn validate(&self) -> Result<()> {
        for (i, value) in self.as_array().iter().enumerate() {
            if !value.is_finite() || *value < 0.0 || *value > 1.0 {
                return Err(AnalysisError::InvalidThresholds(format!(
                    "level{} = {} is outside [0, 1]",
                    i + 1,
                    value
                )));
            }
        }
        if !self.is_monotone() {
            return Err(AnalysisError::InvalidThresholds(format!(
                "thresholds must be non-increasing, got {:?}",
                self.as_array()
            )));
        }
        Ok(())
    }
}

/// Out-of-sample procedure used to score a candidate model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum ValidationMethod {
    Loo,
    KFold { folds: usize },
    None,
}

impl Default for ValidationMethod {
    fn default() -> Self {
        ValidationMethod::Loo
    }
}

/// Immutable parameters of one analysis run.
///
/// A run borrows its settings for its whole lifetime; concurrent runs each
/// carry their own value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// R² cut-offs per ladder level
    pub thresholds: ThresholdConfig,
    /// Validation procedure (default: leave-one-out)
    pub validation: ValidationMethod,
    /// |standardized residual| at or above which a non-anchor is an outlier (default: 3.0)
    pub outlier_threshold: f64,
    /// Fixed dispersion constant dividing residuals (default: 1.0)
    pub residual_scale: f64,
    /// Optional absolute RT window; non-anchors outside it are outliers (default: disabled)
    pub rt_tolerance: Option<f64>,
    /// Ridge penalty on the slope (default: 1.0)
    pub ridge_alpha: f64,
    /// Seed for the k-fold shuffle (default: 42)
    pub kfold_seed: u64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            thresholds: ThresholdConfig::default(),
            validation: ValidationMethod::default(),
            outlier_threshold: 3.0,
            residual_scale: 1.0,
            rt_tolerance: None,
            ridge_alpha: 1.0,
            kfold_seed: 42,
        }
    }
}

impl AnalysisSettings {
    pub fn with_thresholds(&self, thresholds: ThresholdConfig) -> Self {
        AnalysisSettings {
            thresholds,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;

        if !(self.outlier_threshold.is_finite() && self.outlier_threshold > 0.0) {
            return Err(AnalysisError::InvalidSettings(format!(
                "outlier_threshold must be positive, got {}",
                self.outlier_threshold
            )));
        }
        if !(self.residual_scale.is_finite() && self.residual_scale > 0.0) {
            return Err(AnalysisError::InvalidSettings(format!(
                "residual_scale must be positive, got {}",
                self.residual_scale
            )));
        }
        if !(self.ridge_alpha.is_finite() && self.ridge_alpha >= 0.0) {
            return Err(AnalysisError::InvalidSettings(format!(
                "ridge_alpha must be non-negative, got {}",
                self.ridge_alpha
            )));
        }
        if let Some(tolerance) = self.rt_tolerance {
            if !(tolerance.is_finite() && tolerance > 0.0) {
                return Err(AnalysisError::InvalidSettings(format!(
                    "rt_tolerance must be positive, got {}",
                    tolerance
                )));
            }
        }
        if let ValidationMethod::KFold { folds } = self.validation {
            if folds < 2 {
                return Err(AnalysisError::InvalidSettings(format!(
                    "k-fold validation needs at least 2 folds, got {}",
                    folds
                )));
            }
        }
        Ok(())
    }
}
