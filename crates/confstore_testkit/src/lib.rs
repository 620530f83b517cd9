//! # confstore Testkit
//!
//! Test utilities for confstore.
//!
//! This crate provides:
//! - Recording listeners and backend fixtures
//! - Property-based test generators using proptest
//! - Stress helpers for concurrent watch/unwatch/destroy
//!
//! The integration tests in `tests/` check the backend contract end to end
//! against every reference engine.
//!
//! ## Usage
//!
//! ```rust
//! use confstore_testkit::prelude::*;
//! use confstore_codec::Value;
//!
//! with_memory_backend(|_engine, backend| {
//!     let listener = RecordingListener::new();
//!     backend.watch(&listener, None);
//!     backend.write("/app/key", Some(Value::Bool(true)), None).unwrap();
//!     assert_eq!(listener.count(), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
