//! Read-through overlay of in-flight changesets.
//!
//! While a multi-step write is in progress, reads should behave as if the
//! pending changesets had already been applied. A [`ReadOverlay`] is a stack
//! of sealed changesets consulted ahead of storage, most recent first.
//!
//! Overlays are call scoped and never shared between threads. Use
//! [`ReadOverlay::scoped`] so the stack is restored on every exit path:
//!
//! ```
//! use std::sync::Arc;
//! use confstore_core::{Changeset, ReadOverlay};
//! use confstore_codec::Value;
//!
//! let mut overlay = ReadOverlay::new();
//! let pending = Changeset::new_write("/x", Some(Value::Integer(2))).unwrap();
//! {
//!     let scoped = overlay.scoped(Arc::new(pending));
//!     assert_eq!(scoped.check("/x"), Some(Some(&Value::Integer(2))));
//! }
//! assert!(overlay.is_empty());
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use confstore_codec::Value;

use crate::changeset::Changeset;

/// A last-in-first-checked stack of sealed changesets.
#[derive(Debug, Default, Clone)]
pub struct ReadOverlay {
    stack: Vec<Arc<Changeset>>,
}

impl ReadOverlay {
    /// Creates an empty overlay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a changeset, sealing it first.
    pub fn push(&mut self, changeset: Arc<Changeset>) {
        changeset.seal();
        self.stack.push(changeset);
    }

    /// Pops the most recently pushed changeset.
    pub fn pop(&mut self) -> Option<Arc<Changeset>> {
        self.stack.pop()
    }

    /// Pushes a changeset for the lifetime of the returned guard.
    ///
    /// The changeset is popped when the guard is dropped, including during
    /// unwinding.
    pub fn scoped(&mut self, changeset: Arc<Changeset>) -> OverlayGuard<'_> {
        self.push(changeset);
        OverlayGuard { overlay: self }
    }

    /// Looks `key` up as if every changeset had been applied in push order.
    ///
    /// Returns `None` if no changeset mentions the key, `Some(None)` if the
    /// most recent mention is a reset, and `Some(Some(value))` otherwise.
    #[must_use]
    pub fn check(&self, key: &str) -> Option<Option<&Value>> {
        self.stack
            .iter()
            .rev()
            .find_map(|changeset| changeset.get(key))
    }

    /// Returns the number of stacked changesets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Returns true if nothing is stacked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

/// Restores a [`ReadOverlay`] when dropped.
#[derive(Debug)]
pub struct OverlayGuard<'a> {
    overlay: &'a mut ReadOverlay,
}

impl Deref for OverlayGuard<'_> {
    type Target = ReadOverlay;

    fn deref(&self) -> &ReadOverlay {
        self.overlay
    }
}

impl DerefMut for OverlayGuard<'_> {
    fn deref_mut(&mut self) -> &mut ReadOverlay {
        self.overlay
    }
}

impl Drop for OverlayGuard<'_> {
    fn drop(&mut self) {
        self.overlay.pop();
    }
}
