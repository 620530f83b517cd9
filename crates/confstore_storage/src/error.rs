//! Error types for storage operations.

use std::io;
use std::path::PathBuf;

use confstore_codec::CodecError;
use confstore_core::CoreError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while opening, loading or saving settings.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The settings file is not a valid settings file.
    #[error("settings file {path} is corrupted: {reason}")]
    Corrupted {
        /// The file.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// Value encoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// No engine is registered under this name.
    #[error("unknown backend {name:?} (expected one of: memory, file, null)")]
    UnknownBackend {
        /// The requested name.
        name: String,
    },

    /// A core contract violation.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StorageError {
    /// Creates a corrupted-file error.
    pub fn corrupted(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unknown backend error.
    pub fn unknown_backend(name: impl Into<String>) -> Self {
        Self::UnknownBackend { name: name.into() }
    }
}
