//! Writable command implementation.

use confstore_core::Backend;

/// Runs the writable command.
pub fn run(backend: &Backend, keys: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    for key in keys {
        let writable = backend.get_writable(key)?;
        if keys.len() == 1 {
            println!("{writable}");
        } else {
            println!("{key}\t{writable}");
        }
    }
    Ok(())
}
