//! Reset command implementation.

use confstore_core::Backend;

/// Runs the reset command, resetting each key in turn.
pub fn run(backend: &Backend, keys: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    for key in keys {
        backend.reset(key, None)?;
    }
    backend.sync();
    Ok(())
}
