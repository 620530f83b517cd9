//! Backend selection configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{StorageError, StorageResult};

/// Environment variable naming the engine to use.
pub const ENV_BACKEND: &str = "CONFSTORE_BACKEND";

/// Environment variable giving the settings file for the file engine.
pub const ENV_PATH: &str = "CONFSTORE_PATH";

/// The reference engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Volatile in-process storage.
    Memory,
    /// A CBOR settings file.
    File,
    /// Reads nothing, writes nothing.
    Null,
}

impl BackendKind {
    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(name: &str) -> StorageResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" | "keyfile" => Ok(Self::File),
            "null" => Ok(Self::Null),
            _ => Err(StorageError::unknown_backend(name)),
        }
    }
}

/// Configuration for opening the default backend.
#[derive(Debug, Clone)]
pub struct Config {
    /// Requested engine name. `None` picks the file engine when a path is
    /// set and the memory engine otherwise.
    pub backend: Option<String>,

    /// Settings file for the file engine.
    pub path: Option<PathBuf>,

    /// Whether the file engine saves on every write or only on `sync`.
    pub sync_on_write: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: None,
            path: None,
            sync_on_write: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value. Empty values count as unset.
    #[must_use]
    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());
        Self {
            backend: get(ENV_BACKEND),
            path: get(ENV_PATH).map(PathBuf::from),
            ..Self::default()
        }
    }

    /// Sets the engine name.
    #[must_use]
    pub fn backend(mut self, name: impl Into<String>) -> Self {
        self.backend = Some(name.into());
        self
    }

    /// Sets the settings file.
    #[must_use]
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets whether the file engine saves on every write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Returns true if an engine was named explicitly.
    #[must_use]
    pub fn is_explicit(&self) -> bool {
        self.backend.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.backend.is_none());
        assert!(config.path.is_none());
        assert!(config.sync_on_write);
        assert!(!config.is_explicit());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .backend("file")
            .path("/tmp/settings.cbor")
            .sync_on_write(false);

        assert_eq!(config.backend.as_deref(), Some("file"));
        assert_eq!(config.path, Some(PathBuf::from("/tmp/settings.cbor")));
        assert!(!config.sync_on_write);
    }

    #[test]
    fn reads_environment_through_lookup() {
        let env: HashMap<&str, &str> = [(ENV_BACKEND, "memory"), (ENV_PATH, "/etc/app.cbor")].into();
        let config = Config::from_env_with(|name| env.get(name).map(|v| (*v).to_string()));

        assert_eq!(config.backend.as_deref(), Some("memory"));
        assert_eq!(config.path, Some(PathBuf::from("/etc/app.cbor")));
    }

    #[test]
    fn empty_variables_are_unset() {
        let config = Config::from_env_with(|_| Some(String::new()));
        assert!(config.backend.is_none());
        assert!(config.path.is_none());
    }

    #[test]
    fn kind_names() {
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!(" File ".parse::<BackendKind>().unwrap(), BackendKind::File);
        assert_eq!("keyfile".parse::<BackendKind>().unwrap(), BackendKind::File);
        assert_eq!("null".parse::<BackendKind>().unwrap(), BackendKind::Null);
        assert!(matches!(
            "dconf".parse::<BackendKind>(),
            Err(StorageError::UnknownBackend { .. })
        ));
        assert_eq!(BackendKind::File.to_string(), "file");
    }
}
