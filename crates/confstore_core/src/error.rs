//! Error types for confstore core.
//!
//! Only contract violations are errors here. Expected negative outcomes
//! (a key that is not writable, a value that is not set, a value of the
//! wrong type) are ordinary return values.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in confstore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The string is not a well-formed key.
    #[error("invalid key {key:?}: keys start with '/', contain no '//' and do not end with '/'")]
    InvalidKey {
        /// The rejected string.
        key: String,
    },

    /// The string is not a well-formed path.
    #[error("invalid path {path:?}: paths start and end with '/' and contain no '//'")]
    InvalidPath {
        /// The rejected string.
        path: String,
    },

    /// The string is neither a key nor a path.
    #[error("invalid name {name:?}: expected a key or a path")]
    InvalidName {
        /// The rejected string.
        name: String,
    },

    /// A relative item in a multi-key notification is malformed.
    #[error("invalid item {item:?} under path {path:?}")]
    InvalidItem {
        /// The path the item is relative to.
        path: String,
        /// The rejected item.
        item: String,
    },

    /// Attempted to modify a changeset after it was sealed.
    #[error("changeset is sealed and can no longer be modified")]
    ChangesetSealed,

    /// Attempted to unwatch a listener that is not watching this backend.
    #[error("listener is not watching this backend")]
    NotWatched,

    /// The execution context's worker has gone away.
    #[error("execution context {name:?} is closed")]
    ContextClosed {
        /// Name of the context.
        name: String,
    },

    /// Value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] confstore_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates an invalid key error.
    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey { key: key.into() }
    }

    /// Creates an invalid path error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    /// Creates an invalid name error.
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }

    /// Creates an invalid item error.
    pub fn invalid_item(path: impl Into<String>, item: impl Into<String>) -> Self {
        Self::InvalidItem {
            path: path.into(),
            item: item.into(),
        }
    }

    /// Creates a context closed error.
    pub fn context_closed(name: impl Into<String>) -> Self {
        Self::ContextClosed { name: name.into() }
    }

    /// Returns true for errors caused by a caller breaking the API contract.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey { .. }
                | Self::InvalidPath { .. }
                | Self::InvalidName { .. }
                | Self::InvalidItem { .. }
                | Self::ChangesetSealed
                | Self::NotWatched
        )
    }
}
