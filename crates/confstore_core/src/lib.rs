//! # confstore Core
//!
//! Backend contract and change notification for confstore.
//!
//! This crate provides:
//! - Key and path validation
//! - [`Changeset`] - ordered, sealable batches of pending writes
//! - [`ReadOverlay`] - pending changesets consulted ahead of storage
//! - [`WatchRegistry`] - listeners held weakly, removed on destruction
//! - [`dispatch`] - fan-out to listeners, inline or via [`ExecutionContext`]
//! - [`SettingsBackend`] - the trait storage engines implement
//! - [`Backend`] - the validating handle applications use
//!
//! ## Design Principles
//!
//! - Engines know nothing about listeners; they embed a [`BackendBase`] and
//!   report what changed
//! - No lock is held while listener code runs
//! - Malformed keys and paths are errors; missing or unwritable values are
//!   not
//!
//! ## Example
//!
//! ```rust
//! use confstore_core::{Changeset, is_key, is_path};
//! use confstore_codec::Value;
//!
//! assert!(is_key("/org/app/volume"));
//! assert!(is_path("/org/app/"));
//!
//! let mut batch = Changeset::new();
//! batch.set("/org/app/volume", Value::Integer(11)).unwrap();
//! batch.set("/org/app/muted", Value::Bool(false)).unwrap();
//! assert_eq!(batch.describe().prefix, "/org/app/");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod changeset;
mod context;
pub mod dispatch;
mod error;
mod event;
mod listener;
mod overlay;
mod types;
mod validation;
mod watch;

pub use backend::{Backend, BackendBase, SettingsBackend};
pub use changeset::{Changeset, Description};
pub use context::{ExecutionContext, Task};
pub use dispatch::DispatchUnit;
pub use error::{CoreError, CoreResult};
pub use event::{BackendEvent, Signal};
pub use listener::{ChannelListener, DestroyNotify, HookId, SettingsListener};
pub use overlay::{OverlayGuard, ReadOverlay};
pub use types::{OriginTag, WriteTree};
pub use validation::{
    ensure_items, ensure_key, ensure_name, ensure_path, is_key, is_name, is_path, parent_path,
};
pub use watch::WatchRegistry;

pub use confstore_codec::{Value, ValueType};
