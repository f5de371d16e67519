//! Error types for must-gather extraction.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort processing of an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Reading the compressed stream or the tar headers failed.
    #[error("error reading tarball: {0}")]
    Io(#[from] std::io::Error),

    /// The save directory could not be created.
    #[error("error creating must-gather directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A YAML document could not be decoded.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid pipeline configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A background task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;
