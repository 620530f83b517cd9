//! Watch command implementation.
//!
//! Polls the settings file and prints every change under a key or path,
//! including changes made by other processes.

use std::path::Path;
use std::thread;
use std::time::Duration;

use confstore_core::{ensure_name, is_key, is_path, BackendEvent, ChannelListener};
use confstore_storage::FileBackend;
use tracing::{info, warn};

/// Runs the watch command until `limit` matching events were printed, or
/// forever without a limit.
pub fn run(
    path: &Path,
    name: &str,
    interval: Duration,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    ensure_name(name)?;
    let engine = FileBackend::open(path)?;
    let backend = engine.handle();

    let (listener, events) = ChannelListener::new();
    backend.watch(&listener, None);
    backend.subscribe(name)?;
    info!(path = %path.display(), name, "Watching for changes");

    let mut seen = 0;
    loop {
        if let Err(err) = engine.reload() {
            warn!(path = %path.display(), error = %err, "Failed to reload settings");
        }

        for event in events.try_iter() {
            if !concerns(&event, name) {
                continue;
            }
            println!("{event}");
            seen += 1;
            if limit.is_some_and(|limit| seen >= limit) {
                backend.unsubscribe(name)?;
                backend.unwatch(&listener)?;
                return Ok(());
            }
        }

        thread::sleep(interval);
    }
}

/// Returns true if `event` may affect the key or subtree `name`.
pub fn concerns(event: &BackendEvent, name: &str) -> bool {
    if is_key(name) {
        return event.covers(name);
    }
    if let BackendEvent::KeysChanged { path, items, .. } = event {
        return items.iter().any(|item| {
            let key = format!("{path}{item}");
            key.starts_with(name)
        });
    }

    let target = event.name();
    target.starts_with(name) || (is_path(target) && name.starts_with(target))
}
