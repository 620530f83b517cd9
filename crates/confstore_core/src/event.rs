//! Change events.

use std::fmt;

use crate::types::OriginTag;

/// Which listener callback an event is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// One key may have changed.
    Changed,
    /// Several keys under a path may have changed.
    KeysChanged,
    /// Every key under a path may have changed.
    PathChanged,
    /// Writability of one key may have changed.
    WritableChanged,
    /// Writability of every key under a path may have changed.
    PathWritableChanged,
}

/// An owned snapshot of a change notification.
///
/// Events are built once per dispatch and shared by every delivery, so
/// nothing the emitting backend does afterwards can race with a listener
/// reading them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// The value of `key` may have changed.
    Changed {
        /// The key.
        key: String,
        /// Tag of the write that caused the change, if any.
        origin: Option<OriginTag>,
    },
    /// The values of `path` + each item may have changed.
    KeysChanged {
        /// Common path of the changed keys.
        path: String,
        /// Keys relative to `path`.
        items: Vec<String>,
        /// Tag of the write that caused the change, if any.
        origin: Option<OriginTag>,
    },
    /// Any key under `path` may have changed.
    PathChanged {
        /// The path.
        path: String,
        /// Tag of the write that caused the change, if any.
        origin: Option<OriginTag>,
    },
    /// Writability of `key` may have changed.
    WritableChanged {
        /// The key.
        key: String,
    },
    /// Writability of any key under `path` may have changed.
    PathWritableChanged {
        /// The path.
        path: String,
    },
}

impl BackendEvent {
    /// Returns the callback this event is routed to.
    #[must_use]
    pub fn signal(&self) -> Signal {
        match self {
            Self::Changed { .. } => Signal::Changed,
            Self::KeysChanged { .. } => Signal::KeysChanged,
            Self::PathChanged { .. } => Signal::PathChanged,
            Self::WritableChanged { .. } => Signal::WritableChanged,
            Self::PathWritableChanged { .. } => Signal::PathWritableChanged,
        }
    }

    /// Returns the key or path the event is about.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Changed { key, .. } | Self::WritableChanged { key } => key,
            Self::KeysChanged { path, .. }
            | Self::PathChanged { path, .. }
            | Self::PathWritableChanged { path } => path,
        }
    }

    /// Returns the origin tag, if the event carries one.
    #[must_use]
    pub fn origin(&self) -> Option<OriginTag> {
        match self {
            Self::Changed { origin, .. }
            | Self::KeysChanged { origin, .. }
            | Self::PathChanged { origin, .. } => *origin,
            Self::WritableChanged { .. } | Self::PathWritableChanged { .. } => None,
        }
    }

    /// Returns true if the event may concern `key`.
    #[must_use]
    pub fn covers(&self, key: &str) -> bool {
        match self {
            Self::Changed { key: k, .. } | Self::WritableChanged { key: k } => k == key,
            Self::KeysChanged { path, items, .. } => key
                .strip_prefix(path.as_str())
                .is_some_and(|rest| items.iter().any(|item| item == rest)),
            Self::PathChanged { path, .. } | Self::PathWritableChanged { path } => {
                key.starts_with(path.as_str())
            }
        }
    }
}

impl fmt::Display for BackendEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Changed { key, .. } => write!(f, "changed {key}"),
            Self::KeysChanged { path, items, .. } => {
                write!(f, "keys-changed {path} [{}]", items.join(", "))
            }
            Self::PathChanged { path, .. } => write!(f, "path-changed {path}"),
            Self::WritableChanged { key } => write!(f, "writable-changed {key}"),
            Self::PathWritableChanged { path } => write!(f, "path-writable-changed {path}"),
        }
    }
}
