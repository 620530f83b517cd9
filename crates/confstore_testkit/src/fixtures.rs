//! Test fixtures and backend helpers.
//!
//! Provides recording listeners and convenience functions for setting up
//! backends in tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use confstore_codec::Value;
use confstore_core::{Backend, BackendEvent, DestroyNotify, OriginTag, SettingsListener};
use confstore_storage::{FileBackend, MemoryBackend};
use parking_lot::{Condvar, Mutex};
use tempfile::TempDir;

/// One delivered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    /// The event.
    pub event: BackendEvent,
    /// Thread the callback ran on.
    pub thread: ThreadId,
}

/// A listener that records every callback.
#[derive(Default)]
pub struct RecordingListener {
    destroy: DestroyNotify,
    events: Mutex<Vec<Recorded>>,
    arrived: Condvar,
}

impl RecordingListener {
    /// Creates a listener with an empty record.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns everything recorded so far.
    pub fn recorded(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    /// Returns the recorded events without thread information.
    pub fn events(&self) -> Vec<BackendEvent> {
        self.events
            .lock()
            .iter()
            .map(|recorded| recorded.event.clone())
            .collect()
    }

    /// Removes and returns the recorded events.
    pub fn take(&self) -> Vec<BackendEvent> {
        std::mem::take(&mut *self.events.lock())
            .into_iter()
            .map(|recorded| recorded.event)
            .collect()
    }

    /// Returns the number of recorded events.
    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    /// Blocks until at least `count` events are recorded or `timeout`
    /// elapses. Returns true if the count was reached.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock();
        while events.len() < count {
            if self.arrived.wait_until(&mut events, deadline).timed_out() {
                return events.len() >= count;
            }
        }
        true
    }

    fn record(&self, event: BackendEvent) {
        self.events.lock().push(Recorded {
            event,
            thread: thread::current().id(),
        });
        self.arrived.notify_all();
    }
}

impl SettingsListener for RecordingListener {
    fn destroy_notify(&self) -> &DestroyNotify {
        &self.destroy
    }

    fn changed(&self, _backend: &Backend, key: &str, origin: Option<OriginTag>) {
        self.record(BackendEvent::Changed {
            key: key.to_string(),
            origin,
        });
    }

    fn keys_changed(
        &self,
        _backend: &Backend,
        path: &str,
        items: &[String],
        origin: Option<OriginTag>,
    ) {
        self.record(BackendEvent::KeysChanged {
            path: path.to_string(),
            items: items.to_vec(),
            origin,
        });
    }

    fn path_changed(&self, _backend: &Backend, path: &str, origin: Option<OriginTag>) {
        self.record(BackendEvent::PathChanged {
            path: path.to_string(),
            origin,
        });
    }

    fn writable_changed(&self, _backend: &Backend, key: &str) {
        self.record(BackendEvent::WritableChanged {
            key: key.to_string(),
        });
    }

    fn path_writable_changed(&self, _backend: &Backend, path: &str) {
        self.record(BackendEvent::PathWritableChanged {
            path: path.to_string(),
        });
    }
}

/// A file engine in a temporary directory that is removed on drop.
pub struct TestFileBackend {
    /// The engine.
    pub engine: Arc<FileBackend>,
    _temp_dir: TempDir,
}

impl TestFileBackend {
    /// Creates an empty settings file engine saving on every write.
    pub fn new() -> Self {
        Self::with_sync_on_write(true)
    }

    /// Creates an empty settings file engine.
    pub fn with_sync_on_write(sync_on_write: bool) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("settings.cbor");
        let engine = FileBackend::open_with(&path, sync_on_write).expect("Failed to open settings file");
        Self {
            engine,
            _temp_dir: temp_dir,
        }
    }

    /// Returns a handle to the engine.
    pub fn backend(&self) -> Backend {
        self.engine.handle()
    }

    /// Returns the settings file path.
    pub fn path(&self) -> PathBuf {
        self.engine.path().to_path_buf()
    }

    /// Opens a second engine on the same file, as another process would.
    pub fn open_peer(&self) -> Arc<FileBackend> {
        FileBackend::open(self.engine.path()).expect("Failed to open peer")
    }
}

impl Default for TestFileBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test against a fresh memory engine.
///
/// # Example
///
/// ```rust
/// use confstore_testkit::with_memory_backend;
/// use confstore_codec::Value;
///
/// with_memory_backend(|_engine, backend| {
///     assert!(backend.write("/k", Some(Value::Bool(true)), None).unwrap());
/// });
/// ```
pub fn with_memory_backend<F, R>(f: F) -> R
where
    F: FnOnce(&Arc<MemoryBackend>, &Backend) -> R,
{
    let engine = MemoryBackend::new();
    let backend = engine.handle();
    f(&engine, &backend)
}

/// Runs a test against a fresh file engine.
pub fn with_file_backend<F, R>(f: F) -> R
where
    F: FnOnce(&Backend, &Path) -> R,
{
    let test_file = TestFileBackend::new();
    let path = test_file.path();
    f(&test_file.backend(), &path)
}

/// Writes `entries` one by one, panicking on refusal.
pub fn populate(backend: &Backend, entries: &[(&str, Value)]) {
    for (key, value) in entries {
        let written = backend
            .write(key, Some(value.clone()), None)
            .expect("Invalid key in fixture");
        assert!(written, "Fixture key {key} is not writable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confstore_codec::ValueType;
    use confstore_core::ExecutionContext;

    #[test]
    fn recording_listener_records_thread() {
        with_memory_backend(|_engine, backend| {
            let listener = RecordingListener::new();
            backend.watch(&listener, None);

            backend.write("/a", Some(Value::Integer(1)), None).unwrap();
            let recorded = listener.recorded();
            assert_eq!(recorded.len(), 1);
            assert_eq!(recorded[0].thread, thread::current().id());
            assert_eq!(listener.take().len(), 1);
            assert_eq!(listener.count(), 0);
        });
    }

    #[test]
    fn wait_for_sees_worker_deliveries() {
        with_memory_backend(|_engine, backend| {
            let context = ExecutionContext::spawn("fixture").unwrap();
            let listener = RecordingListener::new();
            backend.watch(&listener, Some(context));

            backend.write("/a", Some(Value::Integer(1)), None).unwrap();
            assert!(listener.wait_for(1, Duration::from_secs(5)));
            assert!(!listener.wait_for(2, Duration::from_millis(20)));
        });
    }

    #[test]
    fn file_fixture_persists() {
        let test_file = TestFileBackend::new();
        populate(&test_file.backend(), &[("/x", Value::from("y"))]);

        let peer = test_file.open_peer().handle();
        let value = peer.read_user_value("/x", &ValueType::Text).unwrap();
        assert_eq!(value, Some(Value::from("y")));
    }
}
