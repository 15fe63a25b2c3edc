use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that stop the run before any file is scheduled
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max concurrency must be positive, got {0}")]
    InvalidConcurrency(usize),

    #[error("invalid watermark geometry: {0}")]
    InvalidWatermark(String),

    #[error("failed to create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid input pattern {pattern:?}: {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("no files matched input pattern {0:?}")]
    NoMatches(String),
}

/// Errors confined to a single input file
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to stat {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to back up {}: {source}", .path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output path is the same as the input path: {}", .0.display())]
    PathCollision(PathBuf),

    #[error("{} maps to the same output or backup file as {}", .path.display(), .first.display())]
    DuplicateTarget { path: PathBuf, first: PathBuf },

    #[error("encoder failed ({detail})\nOutput:\n{output}")]
    Encode { detail: String, output: String },
}

impl ConvertError {
    /// Captured encoder output, if this is an encode failure
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            ConvertError::Encode { output, .. } => Some(output),
            _ => None,
        }
    }
}
