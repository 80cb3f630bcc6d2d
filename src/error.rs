//! Error types shared by the learning core.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value is out of range or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// An encoder input was NaN or infinite.
    #[error("non-finite input in `{field}`")]
    NonFiniteInput { field: &'static str },

    /// The replay buffer does not hold enough experiences for a batch.
    #[error("insufficient data: buffer holds {have}, batch needs {need}")]
    InsufficientData { have: usize, need: usize },

    /// A vector or weight snapshot does not match the network topology.
    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    /// Training produced NaN/Inf; the update was not applied.
    #[error("non-finite values during training: {0}")]
    Diverged(String),

    /// One of the three model artifacts is missing.
    #[error("incomplete model bundle: missing {}", missing.display())]
    IncompleteBundle { missing: PathBuf },

    /// An artifact exists but cannot be decoded.
    #[error("incomplete model bundle: malformed {0}")]
    MalformedBundle(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
