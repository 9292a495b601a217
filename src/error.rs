use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while loading inputs, aligning sheets and scoring them.
///
/// `Alignment` and `KeyMismatch` are per-sheet failures: the batch driver
/// records them next to the successful results and keeps going.
#[derive(Debug, Error)]
pub enum OmrError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable image or answer key.
    #[error("invalid input: {0}")]
    Input(String),

    /// No reliable fiducials; the sheet needs manual review.
    #[error("alignment failed: {0}")]
    Alignment(String),

    /// Template and answer key disagree in size or option range.
    #[error("answer key mismatch: {0}")]
    KeyMismatch(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Writing the results table failed.
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl OmrError {
    /// Short machine-friendly label used in result tables.
    pub fn kind(&self) -> &'static str {
        match self {
            OmrError::Io(_) => "io",
            OmrError::Input(_) => "input",
            OmrError::Alignment(_) => "alignment",
            OmrError::KeyMismatch(_) => "key_mismatch",
            OmrError::Config(_) => "config",
            OmrError::Csv { .. } => "csv",
            OmrError::Json { .. } => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, OmrError>;
