//! Dump command implementation.

use std::collections::BTreeMap;
use std::path::Path;

use confstore_codec::Value;
use confstore_core::ensure_path;
use confstore_storage::FileBackend;
use serde_json::{Map, Value as Json};

use crate::json::to_json;

/// Runs the dump command.
pub fn run(path: &Path, prefix: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    ensure_path(prefix)?;
    if !path.exists() {
        return Err(format!("No settings file found at {:?}", path).into());
    }

    let engine = FileBackend::open(path)?;
    let values = engine.values();
    let selected = select(&values, prefix);

    match format {
        "json" => {
            let object: Map<String, Json> = selected
                .iter()
                .map(|(key, value)| (key.to_string(), to_json(value)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&Json::Object(object))?);
        }
        _ => print_text_output(path, prefix, &selected),
    }
    Ok(())
}

/// Returns the entries under `prefix`, in key order.
pub fn select<'a>(values: &'a BTreeMap<String, Value>, prefix: &str) -> Vec<(&'a str, &'a Value)> {
    values
        .range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, value)| (key.as_str(), value))
        .collect()
}

fn print_text_output(path: &Path, prefix: &str, entries: &[(&str, &Value)]) {
    println!("Settings in {} under {}", path.display(), prefix);
    println!();
    for (key, value) in entries {
        let ty = value
            .value_type()
            .map_or_else(|| "?".to_string(), |ty| ty.to_string());
        println!("  {key} ({ty}) = {}", to_json(value));
    }
    println!();
    println!("{} keys", entries.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_subtree_only() {
        let mut values = BTreeMap::new();
        values.insert("/app/a".to_string(), Value::Integer(1));
        values.insert("/app/b/c".to_string(), Value::Integer(2));
        values.insert("/apple".to_string(), Value::Integer(3));
        values.insert("/other".to_string(), Value::Integer(4));

        let keys: Vec<&str> = select(&values, "/app/").into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["/app/a", "/app/b/c"]);
        assert_eq!(select(&values, "/").len(), 4);
    }
}
