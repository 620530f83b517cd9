//! Value type descriptors.
//!
//! Types have a compact string form used by tools and fixtures:
//!
//! | string     | type                         |
//! |------------|------------------------------|
//! | `b`        | [`ValueType::Bool`]          |
//! | `x`        | [`ValueType::Integer`]       |
//! | `s`        | [`ValueType::Text`]          |
//! | `ay`       | [`ValueType::Bytes`]         |
//! | `a<T>`     | [`ValueType::Array`] of `T`  |
//! | `a{s<T>}`  | [`ValueType::Dict`] of `T`   |

use std::fmt;
use std::str::FromStr;

use crate::error::{CodecError, CodecResult};

/// Descriptor of the type a setting value is expected to have.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Integer,
    /// UTF-8 text.
    Text,
    /// Byte string.
    Bytes,
    /// Array with the given element type.
    Array(Box<ValueType>),
    /// Text-keyed dictionary with the given value type.
    Dict(Box<ValueType>),
}

impl ValueType {
    /// Parses a complete type string.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidTypeString`] if the string is empty,
    /// malformed, or has trailing characters.
    pub fn parse(input: &str) -> CodecResult<Self> {
        let (ty, consumed) = Self::parse_prefix(input, 0)?;
        if consumed != input.len() {
            return Err(CodecError::invalid_type_string(input, consumed));
        }
        Ok(ty)
    }

    fn parse_prefix(input: &str, at: usize) -> CodecResult<(Self, usize)> {
        let rest = &input.as_bytes()[at..];
        match rest.first() {
            Some(b'b') => Ok((ValueType::Bool, at + 1)),
            Some(b'x') => Ok((ValueType::Integer, at + 1)),
            Some(b's') => Ok((ValueType::Text, at + 1)),
            Some(b'a') => match rest.get(1) {
                Some(b'y') => Ok((ValueType::Bytes, at + 2)),
                Some(b'{') => {
                    if rest.get(2) != Some(&b's') {
                        return Err(CodecError::invalid_type_string(input, at + 2));
                    }
                    let (elem, end) = Self::parse_prefix(input, at + 3)?;
                    if input.as_bytes().get(end) != Some(&b'}') {
                        return Err(CodecError::invalid_type_string(input, end));
                    }
                    Ok((ValueType::Dict(Box::new(elem)), end + 1))
                }
                _ => {
                    let (elem, end) = Self::parse_prefix(input, at + 1)?;
                    Ok((ValueType::Array(Box::new(elem)), end))
                }
            },
            _ => Err(CodecError::invalid_type_string(input, at)),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => f.write_str("b"),
            ValueType::Integer => f.write_str("x"),
            ValueType::Text => f.write_str("s"),
            ValueType::Bytes => f.write_str("ay"),
            ValueType::Array(elem) => write!(f, "a{elem}"),
            ValueType::Dict(elem) => write!(f, "a{{s{elem}}}"),
        }
    }
}

impl FromStr for ValueType {
    type Err = CodecError;

    fn from_str(s: &str) -> CodecResult<Self> {
        Self::parse(s)
    }
}
