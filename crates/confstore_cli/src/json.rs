//! Conversion between JSON on the command line and setting values.

use std::collections::BTreeMap;

use confstore_codec::{Value, ValueType};
use serde_json::{Map, Number, Value as Json};
use thiserror::Error;

/// Errors converting JSON input into a setting value.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The input is not valid JSON.
    #[error("invalid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    /// The JSON has no setting value equivalent.
    #[error("unsupported JSON value: {0}")]
    Unsupported(String),

    /// The JSON does not fit the requested type.
    #[error("expected a value of type {expected}, got {found}")]
    TypeMismatch {
        /// Requested type.
        expected: String,
        /// Offending JSON.
        found: String,
    },
}

/// Parses `input` as JSON and converts it, guided by `ty` when given.
///
/// Without a type, strings that are not valid JSON are taken as text so
/// that `confstore write /k hello` works without quoting.
pub fn parse_value(input: &str, ty: Option<&ValueType>) -> Result<Value, ConversionError> {
    let json = match serde_json::from_str::<Json>(input) {
        Ok(json) => json,
        Err(_) if matches!(ty, None | Some(ValueType::Text)) => Json::String(input.to_string()),
        Err(err) => return Err(err.into()),
    };
    match ty {
        Some(ty) => typed_from_json(&json, ty),
        None => from_json(&json),
    }
}

/// Converts JSON without a type hint.
///
/// Numbers must be integers; `null` has no equivalent. Arrays and objects
/// must hold elements of one type.
pub fn from_json(json: &Json) -> Result<Value, ConversionError> {
    let mixed = || ConversionError::Unsupported(format!("mixed element types in {json}"));
    match json {
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .ok_or_else(|| ConversionError::Unsupported(n.to_string())),
        Json::String(s) => Ok(Value::Text(s.clone())),
        Json::Array(items) => {
            let items = items.iter().map(from_json).collect::<Result<Vec<_>, _>>()?;
            if !uniform(items.iter()) {
                return Err(mixed());
            }
            Ok(Value::Array(items))
        }
        Json::Object(entries) => {
            let entries = entries
                .iter()
                .map(|(k, v)| from_json(v).map(|v| (k.clone(), v)))
                .collect::<Result<BTreeMap<_, _>, _>>()?;
            if !uniform(entries.values()) {
                return Err(mixed());
            }
            Ok(Value::Dict(entries))
        }
        Json::Null => Err(ConversionError::Unsupported("null".into())),
    }
}

/// Returns true if every element fits the type of the first one that has
/// a type. Empty containers fit any container of their kind.
fn uniform<'a, I>(items: I) -> bool
where
    I: Iterator<Item = &'a Value> + Clone,
{
    match items.clone().find_map(Value::value_type) {
        Some(ty) => items.clone().all(|item| item.is_of_type(&ty)),
        None => {
            let mut kinds = items.map(Value::kind);
            let first = kinds.next();
            kinds.all(|kind| Some(kind) == first)
        }
    }
}

/// Converts JSON into a value of type `ty`.
///
/// Byte strings are written as arrays of numbers in `0..=255`.
pub fn typed_from_json(json: &Json, ty: &ValueType) -> Result<Value, ConversionError> {
    let mismatch = || ConversionError::TypeMismatch {
        expected: ty.to_string(),
        found: json.to_string(),
    };
    match (ty, json) {
        (ValueType::Bool, Json::Bool(b)) => Ok(Value::Bool(*b)),
        (ValueType::Integer, Json::Number(n)) => n.as_i64().map(Value::Integer).ok_or_else(mismatch),
        (ValueType::Text, Json::String(s)) => Ok(Value::Text(s.clone())),
        (ValueType::Bytes, Json::Array(items)) => items
            .iter()
            .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect::<Option<Vec<u8>>>()
            .map(Value::Bytes)
            .ok_or_else(mismatch),
        (ValueType::Array(elem), Json::Array(items)) => items
            .iter()
            .map(|item| typed_from_json(item, elem))
            .collect::<Result<_, _>>()
            .map(Value::Array),
        (ValueType::Dict(elem), Json::Object(entries)) => entries
            .iter()
            .map(|(k, v)| typed_from_json(v, elem).map(|v| (k.clone(), v)))
            .collect::<Result<_, _>>()
            .map(Value::Dict),
        _ => Err(mismatch()),
    }
}

/// Converts a value to JSON for display.
pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(i) => Json::Number(Number::from(*i)),
        Value::Text(s) => Json::String(s.clone()),
        Value::Bytes(bytes) => Json::Array(bytes.iter().map(|&b| Json::Number(Number::from(b))).collect()),
        Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Dict(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect::<Map<String, Json>>(),
        ),
    }
}
