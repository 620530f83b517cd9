//! # confstore Storage
//!
//! Reference settings engines and default backend selection.
//!
//! Every engine implements [`confstore_core::SettingsBackend`] and is used
//! through a [`confstore_core::Backend`] handle obtained from `handle()`.
//!
//! ## Available Engines
//!
//! - [`MemoryBackend`] - volatile, with defaults and lockdown, for tests
//! - [`FileBackend`] - persistent, one CBOR file per store
//! - [`NullBackend`] - stores nothing, writes nothing
//!
//! ## Selecting an Engine
//!
//! [`DefaultBackend`] picks an engine from a [`Config`], usually read from
//! `CONFSTORE_BACKEND` and `CONFSTORE_PATH`:
//!
//! ```rust
//! use confstore_storage::{Config, DefaultBackend};
//! use confstore_codec::Value;
//!
//! let default = DefaultBackend::new(Config::new().backend("memory"));
//! let backend = default.get().unwrap();
//! assert!(backend.write("/app/volume", Some(Value::Integer(3)), None).unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod default;
mod error;
mod file;
mod memory;
mod null;

pub use config::{BackendKind, Config, ENV_BACKEND, ENV_PATH};
pub use default::{open_backend, resolve_kind, DefaultBackend};
pub use error::{StorageError, StorageResult};
pub use file::{FileBackend, FORMAT_VERSION};
pub use memory::MemoryBackend;
pub use null::NullBackend;
