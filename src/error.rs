// File: src/error.rs
use thiserror::Error;

/// Errors raised by the miner and its persistence layer.
#[derive(Error, Debug)]
pub enum MinerError {
    /// A persisted trie or engine could not be reconstructed.
    #[error("malformed persisted state at `{path}`: {reason}")]
    StructuredLoad {
        /// Slash-separated location of the offending node or field.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Two miners built for different shortforms cannot be combined.
    #[error("cannot combine miner for shortform '{found}' into miner for '{expected}'")]
    ConfigurationMismatch { expected: String, found: String },

    #[error("compose requires at least one miner")]
    EmptyComposition,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] bincode::Error),
}

impl MinerError {
    pub(crate) fn load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        MinerError::StructuredLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MinerError>;
