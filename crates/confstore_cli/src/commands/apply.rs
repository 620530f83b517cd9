//! Apply command implementation.
//!
//! Reads a JSON object mapping keys to values and writes it as one
//! changeset, so either every key changes or none does. A `null` value
//! resets its key.

use std::io::Read;
use std::path::Path;

use confstore_core::{Backend, Changeset};
use serde_json::Value as Json;

use crate::json::from_json;

/// Runs the apply command. `source` of `-` reads standard input.
pub fn run(backend: &Backend, source: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let input = if source == Path::new("-") {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        input
    } else {
        std::fs::read_to_string(source)?
    };

    let changeset = build_changeset(&serde_json::from_str(&input)?)?;
    if !backend.write_changeset(&changeset, None)? {
        return Err("At least one key is not writable; nothing was changed".into());
    }
    backend.sync();
    println!("Applied {} keys", changeset.len());
    Ok(())
}

/// Builds a changeset from a JSON object.
pub fn build_changeset(json: &Json) -> Result<Changeset, Box<dyn std::error::Error>> {
    let entries = json.as_object().ok_or("Expected a JSON object of keys to values")?;
    let mut changeset = Changeset::new();
    for (key, value) in entries {
        let value = match value {
            Json::Null => None,
            value => Some(from_json(value)?),
        };
        changeset.insert(key.as_str(), value)?;
    }
    Ok(changeset)
}
