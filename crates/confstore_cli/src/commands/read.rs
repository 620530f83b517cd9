//! Read command implementation.

use confstore_codec::ValueType;
use confstore_core::Backend;

use crate::json::to_json;

/// Runs the read command.
///
/// Prints the value as JSON, or `null` when the key has no value of the
/// requested type.
pub fn run(
    backend: &Backend,
    key: &str,
    ty: &str,
    default_value: bool,
    user_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let ty = ValueType::parse(ty)?;
    let value = if user_only {
        backend.read_user_value(key, &ty)?
    } else {
        backend.read_value(key, &ty, None, false, default_value)?
    };

    match value {
        Some(value) => println!("{}", to_json(&value)),
        None => println!("null"),
    }
    Ok(())
}
