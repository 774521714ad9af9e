use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid input at row {row}, field `{field}`: {reason}")]
    InvalidInput {
        row: usize,
        field: &'static str,
        reason: String,
    },

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("dataset contains no anchor compounds")]
    NoAnchors,

    #[error("global model cannot be fit from {anchors} anchor(s): need at least 2 with distinct Log P")]
    UnfittableGlobal { anchors: usize },

    #[error("invalid threshold configuration: {0}")]
    InvalidThresholds(String),

    #[error("invalid analysis settings: {0}")]
    InvalidSettings(String),

    #[error("threshold grid contains no monotone combination")]
    EmptyGrid,

    #[error("run cancelled after {completed} group(s)")]
    Cancelled { completed: usize },

    #[error("thread pool error: {0}")]
    ThreadPool(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
