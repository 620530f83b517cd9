//! Property-based test generators using proptest.
//!
//! Provides strategies for keys, paths, values and write batches that
//! respect the key and path grammar.

use confstore_codec::{Value, ValueType};
use proptest::prelude::*;

/// Strategy for one path segment: non-empty, no `/`.
pub fn segment_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_-]{0,7}").expect("Invalid regex")
}

/// Strategy for well-formed keys such as `/a/b1/c`.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(segment_strategy(), 1..5).prop_map(|segments| format!("/{}", segments.join("/")))
}

/// Strategy for well-formed paths such as `/`, `/a/` or `/a/b/`.
pub fn path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(segment_strategy(), 0..4).prop_map(|segments| {
        if segments.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", segments.join("/"))
        }
    })
}

/// Strategy for keys drawn from a small shared tree, so that batches
/// overlap and have interesting common prefixes.
pub fn clustered_key_strategy() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["app", "org", "sys"]),
        prop::sample::select(vec!["window", "theme", "net"]),
        prop::sample::select(vec!["a", "b", "c", "d"]),
        0..3usize,
    )
        .prop_map(|(top, mid, leaf, depth)| match depth {
            0 => format!("/{top}"),
            1 => format!("/{top}/{mid}"),
            _ => format!("/{top}/{mid}/{leaf}"),
        })
}

/// Strategy for arbitrary strings, mostly malformed names.
pub fn name_like_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[/a-b]{0,8}").expect("Invalid regex")
}

/// Strategy for value types, nesting up to two containers deep.
pub fn value_type_strategy() -> impl Strategy<Value = ValueType> {
    let leaf = prop_oneof![
        Just(ValueType::Bool),
        Just(ValueType::Integer),
        Just(ValueType::Text),
        Just(ValueType::Bytes),
    ];
    leaf.prop_recursive(2, 8, 1, |inner| {
        prop_oneof![
            inner.clone().prop_map(|ty| ValueType::Array(Box::new(ty))),
            inner.prop_map(|ty| ValueType::Dict(Box::new(ty))),
        ]
    })
}

/// Strategy for scalar values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ]
}

/// Strategy for values, including nested containers.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4).prop_map(Value::Dict),
        ]
    })
}

/// Strategy for a value of a given type.
pub fn value_of_type_strategy(ty: ValueType) -> BoxedStrategy<Value> {
    match ty {
        ValueType::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
        ValueType::Integer => any::<i64>().prop_map(Value::Integer).boxed(),
        ValueType::Text => "[a-z]{0,8}".prop_map(Value::Text).boxed(),
        ValueType::Bytes => prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes).boxed(),
        ValueType::Array(elem) => prop::collection::vec(value_of_type_strategy(*elem), 0..3)
            .prop_map(Value::Array)
            .boxed(),
        ValueType::Dict(elem) => prop::collection::btree_map("[a-z]{1,4}", value_of_type_strategy(*elem), 0..3)
            .prop_map(Value::Dict)
            .boxed(),
    }
}

/// One operation against a backend.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Write a value.
    Set {
        /// Target key.
        key: String,
        /// New value.
        value: Value,
    },
    /// Reset to the default.
    Reset {
        /// Target key.
        key: String,
    },
}

impl WriteOp {
    /// Returns the key the operation touches.
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Reset { key } => key,
        }
    }

    /// Returns the written value, `None` for a reset.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Set { value, .. } => Some(value),
            Self::Reset { .. } => None,
        }
    }
}

/// Strategy for a single write or reset on a clustered key.
pub fn write_op_strategy() -> impl Strategy<Value = WriteOp> {
    prop_oneof![
        3 => (clustered_key_strategy(), scalar_value_strategy())
            .prop_map(|(key, value)| WriteOp::Set { key, value }),
        1 => clustered_key_strategy().prop_map(|key| WriteOp::Reset { key }),
    ]
}

/// Strategy for a batch of operations.
pub fn write_batch_strategy(max_len: usize) -> impl Strategy<Value = Vec<WriteOp>> {
    prop::collection::vec(write_op_strategy(), 0..max_len)
}
