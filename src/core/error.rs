use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Everything that can stop (or, for malformed trials, interrupt) a scoring run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A single trial could not be scored: short chunk, bad row, or a target
    /// with no matrix / no reference entry.
    #[error("malformed trial #{trial}: {reason}")]
    MalformedTrial { trial: u64, reason: String },

    /// The configured layout (lexicon size, cycles, copies) disagrees with the stream.
    #[error("configuration mismatch: expected {expected}, observed {observed}")]
    ConfigMismatch { expected: String, observed: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl AnalysisError {
    pub fn malformed(trial: u64, reason: impl Into<String>) -> Self {
        Self::MalformedTrial {
            trial,
            reason: reason.into(),
        }
    }

    pub fn mismatch(expected: impl Into<String>, observed: impl Into<String>) -> Self {
        Self::ConfigMismatch {
            expected: expected.into(),
            observed: observed.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    /// Malformed trials may be skipped by policy; everything else is fatal.
    pub fn is_trial_local(&self) -> bool {
        matches!(self, Self::MalformedTrial { .. })
    }
}
