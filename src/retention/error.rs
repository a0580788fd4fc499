use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("Unknown retention category: {0}")]
    UnknownCategory(String),

    #[error("Retention category '{0}' is defined more than once")]
    DuplicateCategory(String),

    #[error("Retention category '{0}' has no file patterns")]
    NoPatterns(String),

    #[error("Invalid file pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Retention worker failed: {0}")]
    Worker(String),
}

impl RetentionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type RetentionResult<T> = Result<T, RetentionError>;
