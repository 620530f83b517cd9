//! Write command implementation.

use confstore_codec::ValueType;
use confstore_core::Backend;
use tracing::debug;

use crate::json::parse_value;

/// Runs the write command.
pub fn run(
    backend: &Backend,
    key: &str,
    input: &str,
    ty: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let ty = ty.map(ValueType::parse).transpose()?;
    let value = parse_value(input, ty.as_ref())?;

    if !backend.write(key, Some(value), None)? {
        return Err(format!("{key} is not writable").into());
    }
    backend.sync();
    debug!(key, backend = backend.type_name(), "Value written");
    Ok(())
}
