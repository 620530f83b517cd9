//! Small shared types.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use confstore_codec::Value;

/// A flattened batch write: key → new value, or `None` to reset the key.
///
/// Sorted by key, which is the order storage engines receive writes in.
pub type WriteTree = BTreeMap<String, Option<Value>>;

static NEXT_ORIGIN: AtomicU64 = AtomicU64::new(1);

/// Opaque token identifying the call that caused a change.
///
/// A writer passes its tag to `write`; the resulting change notification
/// carries the same tag so the writer can recognise an echo of its own
/// write.
///
/// The tag is only meaningful for listeners watching without an execution
/// context (immediate delivery). Once a notification has been queued onto
/// another context, whoever owned the tag may have gone away and listeners
/// must ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OriginTag(u64);

impl OriginTag {
    /// Creates a fresh tag, distinct from every other tag in the process.
    #[must_use]
    pub fn new() -> Self {
        Self(NEXT_ORIGIN.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw token value.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for OriginTag {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OriginTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "origin#{}", self.0)
    }
}
