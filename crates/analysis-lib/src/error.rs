//! Error taxonomy for the analysis pipeline

use crate::models::BiomarkerKind;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Not enough samples to attempt an estimate. Handled inside the
    /// pipeline and turned into the sentinel reading.
    #[error("insufficient {kind} data: {available} samples, need more than {required}")]
    InsufficientData {
        kind: BiomarkerKind,
        available: usize,
        required: usize,
    },

    /// Malformed profile or sample payload.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Artifact, ledger or result read/write failure.
    #[error("storage error at {path}: {message}")]
    Storage { path: PathBuf, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Model fitting could not produce a usable regressor.
    #[error("training failed for {kind}: {message}")]
    Training { kind: BiomarkerKind, message: String },

    #[error("not found: {0}")]
    NotFound(String),
}

impl AnalysisError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn storage(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Storage {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Short machine-friendly label used for metrics and log events
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::InsufficientData { .. } => "insufficient_data",
            Self::InvalidInput(_) => "invalid_input",
            Self::Storage { .. } => "storage",
            Self::Serialization(_) => "serialization",
            Self::Training { .. } => "training",
            Self::NotFound(_) => "not_found",
        }
    }
}
