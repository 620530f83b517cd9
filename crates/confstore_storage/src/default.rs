//! Process-wide default backend selection.
//!
//! [`DefaultBackend`] is an explicit handle rather than a hidden static:
//! create one at startup (usually from [`Config::from_env`]) and pass it to
//! whatever needs settings. The engine is only constructed on first use.

use parking_lot::Mutex;
use tracing::{info, warn};

use confstore_core::Backend;

use crate::config::{BackendKind, Config};
use crate::error::StorageResult;
use crate::file::FileBackend;
use crate::memory::MemoryBackend;
use crate::null::NullBackend;

/// Resolves which engine `config` asks for.
///
/// Unknown names, and the file engine without a path, fall back to the
/// default choice with a warning. The default choice is the file engine
/// when a path is configured and the memory engine otherwise.
#[must_use]
pub fn resolve_kind(config: &Config) -> BackendKind {
    let fallback = if config.path.is_some() {
        BackendKind::File
    } else {
        BackendKind::Memory
    };

    let Some(name) = config.backend.as_deref() else {
        return fallback;
    };
    match name.parse::<BackendKind>() {
        Ok(BackendKind::File) if config.path.is_none() => {
            warn!(backend = name, fallback = %BackendKind::Memory, "File backend requested without a path");
            BackendKind::Memory
        }
        Ok(kind) => kind,
        Err(err) => {
            warn!(error = %err, fallback = %fallback, "Falling back to default backend");
            fallback
        }
    }
}

/// Opens the engine `config` asks for.
///
/// # Errors
///
/// Returns an error if the file engine cannot load its file.
pub fn open_backend(config: &Config) -> StorageResult<Backend> {
    let kind = resolve_kind(config);
    let backend = match (kind, config.path.as_ref()) {
        (BackendKind::File, Some(path)) => FileBackend::open_with(path, config.sync_on_write)?.handle(),
        (BackendKind::Null, _) => NullBackend::new().handle(),
        (BackendKind::Memory | BackendKind::File, _) => {
            if config.backend.as_deref() != Some(BackendKind::Memory.as_str()) {
                info!("Using the memory backend; settings will not be saved or shared with other processes");
            }
            MemoryBackend::new().handle()
        }
    };
    Ok(backend)
}

/// Lazily constructed default backend.
///
/// # Example
///
/// ```rust
/// use confstore_storage::{Config, DefaultBackend};
///
/// let default = DefaultBackend::new(Config::new().backend("memory"));
/// assert!(!default.is_initialized());
///
/// let backend = default.get().unwrap();
/// assert!(backend.ptr_eq(&default.get().unwrap()));
///
/// default.reset();
/// assert!(!default.is_initialized());
/// ```
#[derive(Debug)]
pub struct DefaultBackend {
    config: Config,
    slot: Mutex<Option<Backend>>,
}

impl DefaultBackend {
    /// Creates an uninitialised handle for `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            slot: Mutex::new(None),
        }
    }

    /// Creates an uninitialised handle configured from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(Config::from_env())
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the backend, constructing it on first call.
    ///
    /// Concurrent first calls construct it once.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be opened. A later call tries
    /// again.
    pub fn get(&self) -> StorageResult<Backend> {
        let mut slot = self.slot.lock();
        if let Some(backend) = slot.as_ref() {
            return Ok(backend.clone());
        }
        let backend = open_backend(&self.config)?;
        info!(backend = backend.type_name(), "Default backend initialised");
        *slot = Some(backend.clone());
        Ok(backend)
    }

    /// Returns true once [`DefaultBackend::get`] has succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Syncs the backend if it has been constructed. Never constructs it.
    pub fn sync(&self) {
        let backend = self.slot.lock().clone();
        if let Some(backend) = backend {
            backend.sync();
        }
    }

    /// Syncs and releases the backend. The next `get` constructs a new one.
    ///
    /// Handles obtained earlier stay valid.
    pub fn reset(&self) {
        let backend = self.slot.lock().take();
        if let Some(backend) = backend {
            backend.sync();
        }
    }
}

impl Drop for DefaultBackend {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confstore_codec::{Value, ValueType};
    use tempfile::tempdir;

    #[test]
    fn resolve_defaults() {
        assert_eq!(resolve_kind(&Config::new()), BackendKind::Memory);
        assert_eq!(resolve_kind(&Config::new().path("/x.cbor")), BackendKind::File);
        assert_eq!(resolve_kind(&Config::new().backend("null")), BackendKind::Null);
    }

    #[test]
    fn resolve_falls_back() {
        assert_eq!(resolve_kind(&Config::new().backend("dconf")), BackendKind::Memory);
        assert_eq!(
            resolve_kind(&Config::new().backend("dconf").path("/x.cbor")),
            BackendKind::File
        );
        assert_eq!(resolve_kind(&Config::new().backend("file")), BackendKind::Memory);
    }

    #[test]
    fn get_is_lazy_and_cached() {
        let default = DefaultBackend::new(Config::new());
        assert!(!default.is_initialized());
        default.sync();
        assert!(!default.is_initialized());

        let first = default.get().unwrap();
        let second = default.get().unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(first.type_name(), "MemoryBackend");
    }

    #[test]
    fn reset_builds_a_fresh_backend() {
        let default = DefaultBackend::new(Config::new().backend("memory"));
        let first = default.get().unwrap();
        first.write("/k", Some(Value::Integer(1)), None).unwrap();

        default.reset();
        let second = default.get().unwrap();
        assert!(!first.ptr_eq(&second));
        let value = second.read_value("/k", &ValueType::Integer, None, false, false).unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn file_backend_from_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.cbor");
        let config = Config::new().backend("file").path(&path).sync_on_write(false);

        let default = DefaultBackend::new(config);
        let backend = default.get().unwrap();
        assert_eq!(backend.type_name(), "FileBackend");
        backend.write("/k", Some(Value::Bool(true)), None).unwrap();
        assert!(!path.exists());

        default.sync();
        assert!(path.exists());
    }

    #[test]
    fn failed_open_can_be_retried() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.cbor");
        std::fs::write(&path, b"garbage").unwrap();

        let default = DefaultBackend::new(Config::new().path(&path));
        assert!(default.get().is_err());
        assert!(!default.is_initialized());

        std::fs::remove_file(&path).unwrap();
        assert!(default.get().is_ok());
    }
}
