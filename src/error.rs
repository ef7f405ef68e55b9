use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Which container operation an [`CombineError::Io`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    Open,
    Create,
    Write,
    Merge,
}

impl fmt::Display for IoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IoKind::Open => "cannot open",
            IoKind::Create => "cannot create",
            IoKind::Write => "cannot write",
            IoKind::Merge => "cannot merge",
        };
        f.write_str(text)
    }
}

/// Errors produced by the aggregation core.
#[derive(Debug, Error)]
pub enum CombineError {
    /// Malformed or missing registry fields.
    #[error("config error: {0}")]
    Config(String),

    /// A container could not be opened, created, written or merged.
    #[error("{kind} {}: {detail}", path.display())]
    Io {
        kind: IoKind,
        path: PathBuf,
        detail: String,
    },

    /// Non-positive weight, empty merge input and similar bad arguments.
    #[error("invalid value: {0}")]
    Value(String),

    /// No usable histogram anywhere.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bin layouts disagree during summation.
    #[error("shape mismatch: {0}")]
    Shape(String),
}

impl CombineError {
    pub fn io(kind: IoKind, path: &Path, detail: impl fmt::Display) -> Self {
        CombineError::Io {
            kind,
            path: path.to_path_buf(),
            detail: detail.to_string(),
        }
    }

    /// Prefix a shape error with the histogram path it concerns.
    pub fn at_path(self, path: &str) -> Self {
        match self {
            CombineError::Shape(reason) => CombineError::Shape(format!("'{path}': {reason}")),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CombineError>;
