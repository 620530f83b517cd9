//! # confstore Codec
//!
//! Typed setting values for confstore.
//!
//! The backend layer treats values as opaque: it only needs equality, a
//! type check against a [`ValueType`], and a way to put values on disk.
//! This crate provides exactly that:
//!
//! - [`Value`] - the dynamic value type
//! - [`ValueType`] - type descriptors with a compact string form
//! - [`to_cbor`] / [`from_cbor`] - CBOR encoding for persistent engines
//!
//! ## Usage
//!
//! ```
//! use confstore_codec::{from_cbor, to_cbor, Value, ValueType};
//!
//! let value = Value::Integer(42);
//! assert!(value.is_of_type(&ValueType::parse("x").unwrap()));
//!
//! let bytes = to_cbor(&value).unwrap();
//! let decoded: Value = from_cbor(&bytes).unwrap();
//! assert_eq!(value, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod types;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult};
pub use types::ValueType;
pub use value::Value;
