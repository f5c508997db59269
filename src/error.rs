use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the loaders and the numeric analysis routines.
///
/// Binaries wrap these in `anyhow` with file-level context; library code
/// returns them directly so callers (and tests) can match on the variant.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("line {line}: expected {expected} columns, found {found}")]
    ColumnMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("need at least {needed} data points, got {found}")]
    InsufficientData { needed: usize, found: usize },

    #[error("length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("degenerate fit: {0}")]
    DegenerateFit(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no data found in {0}")]
    Empty(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl AnalysisError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        AnalysisError::Parse {
            line,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        AnalysisError::InvalidInput(message.into())
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Fail with [`AnalysisError::LengthMismatch`] unless both slices have the same length.
pub(crate) fn ensure_same_len(a: &[f64], b: &[f64]) -> AnalysisResult<()> {
    if a.len() != b.len() {
        return Err(AnalysisError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(())
}
