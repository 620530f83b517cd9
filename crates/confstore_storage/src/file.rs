//! Settings engine persisting to a single CBOR file.
//!
//! The file holds a format version and a map from key to value:
//!
//! ```text
//! { "version": 1, "values": { "/app/volume": { "Integer": 7 }, ... } }
//! ```
//!
//! Saves replace the file atomically (write a sibling `.tmp`, sync, rename,
//! sync the directory). A sibling `.lock` file carries an advisory lock:
//! shared while loading, exclusive while saving, so concurrent processes
//! never observe a half-written file.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use confstore_codec::{from_cbor, to_cbor, Value, ValueType};
use confstore_core::{is_key, Backend, BackendBase, Changeset, OriginTag, SettingsBackend, WriteTree};
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{StorageError, StorageResult};

/// Version written to new settings files.
pub const FORMAT_VERSION: u16 = 1;

#[derive(Deserialize)]
struct SettingsFile {
    version: u16,
    values: BTreeMap<String, Value>,
}

#[derive(Serialize)]
struct SettingsFileRef<'a> {
    version: u16,
    values: &'a BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct FileState {
    values: BTreeMap<String, Value>,
    // written in memory but not saved yet
    dirty: bool,
}

/// A settings engine backed by one file.
///
/// Every key is writable. With `sync_on_write` (the default) each write is
/// saved before it is signalled, and a write that cannot be saved fails
/// and leaves the old value in place. Otherwise writes stay in memory until
/// [`FileBackend::flush`], `sync`, or the engine is dropped.
///
/// # Example
///
/// ```no_run
/// use confstore_storage::FileBackend;
/// use confstore_codec::Value;
///
/// let engine = FileBackend::open("settings.cbor").unwrap();
/// let backend = engine.handle();
/// backend.write("/app/volume", Some(Value::Integer(7)), None).unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    base: BackendBase,
    path: PathBuf,
    lock_path: PathBuf,
    sync_on_write: bool,
    state: Mutex<FileState>,
}

impl FileBackend {
    /// Opens the settings file at `path`, saving on every write.
    ///
    /// A missing file reads as empty and is created by the first save.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is corrupted.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Arc<Self>> {
        Self::open_with(path, true)
    }

    /// Opens the settings file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if parent directories cannot be created, or the
    /// file cannot be read or is corrupted.
    pub fn open_with(path: impl AsRef<Path>, sync_on_write: bool) -> StorageResult<Arc<Self>> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let lock_path = sibling(&path, "lock");
        let values = load(&path, &lock_path)?;
        debug!(path = %path.display(), keys = values.len(), "Opened settings file");

        Ok(Arc::new_cyclic(|this: &Weak<Self>| Self {
            base: BackendBase::new(this.clone()),
            path,
            lock_path,
            sync_on_write,
            state: Mutex::new(FileState {
                values,
                dirty: false,
            }),
        }))
    }

    /// Returns a validating handle to this engine.
    #[must_use]
    pub fn handle(self: &Arc<Self>) -> Backend {
        Backend::new(Arc::clone(self))
    }

    /// Returns the settings file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if there are writes that have not been saved.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Returns a copy of every stored value.
    #[must_use]
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.state.lock().values.clone()
    }

    /// Saves unsaved writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn flush(&self) -> StorageResult<()> {
        let mut state = self.state.lock();
        if !state.dirty {
            return Ok(());
        }
        save(&self.path, &self.lock_path, &state.values)?;
        state.dirty = false;
        Ok(())
    }

    /// Re-reads the file and signals whatever another process changed.
    ///
    /// Unsaved writes are discarded. Returns the number of keys that
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is corrupted; the
    /// in-memory values are left untouched in that case.
    pub fn reload(&self) -> StorageResult<usize> {
        let changeset = {
            // held across the load so no local write lands between read and swap
            let mut state = self.state.lock();
            let fresh = load(&self.path, &self.lock_path)?;
            let changeset = Changeset::diff(&state.values, &fresh)?;
            state.values = fresh;
            state.dirty = false;
            changeset
        };

        let count = changeset.len();
        if count > 0 {
            info!(path = %self.path.display(), keys = count, "Settings changed on disk");
            self.base.changeset_applied(&changeset, None);
        }
        Ok(count)
    }
}

impl SettingsBackend for FileBackend {
    fn base(&self) -> &BackendBase {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        "FileBackend"
    }

    fn read(&self, key: &str, _ty: &ValueType, default_value: bool) -> Option<Value> {
        if default_value {
            return None;
        }
        self.state.lock().values.get(key).cloned()
    }

    fn read_user_value(&self, key: &str, ty: &ValueType) -> Option<Value> {
        self.read(key, ty, false)
    }

    fn write_tree(&self, tree: &WriteTree, _origin: Option<OriginTag>) -> bool {
        let mut state = self.state.lock();
        let mut next = state.values.clone();
        for (key, value) in tree {
            match value {
                Some(value) => next.insert(key.clone(), value.clone()),
                None => next.remove(key),
            };
        }

        if self.sync_on_write {
            if let Err(err) = save(&self.path, &self.lock_path, &next) {
                error!(path = %self.path.display(), error = %err, "Failed to save settings");
                return false;
            }
        } else {
            state.dirty = true;
        }
        state.values = next;
        true
    }

    fn sync(&self) {
        if let Err(err) = self.flush() {
            error!(path = %self.path.display(), error = %err, "Failed to save settings");
        }
    }
}

impl Drop for FileBackend {
    fn drop(&mut self) {
        if self.state.get_mut().dirty {
            self.sync();
        }
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".");
    name.push(extension);
    path.with_file_name(name)
}

fn open_lock(lock_path: &Path) -> StorageResult<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)?)
}

fn load(path: &Path, lock_path: &Path) -> StorageResult<BTreeMap<String, Value>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let lock = open_lock(lock_path)?;
    FileExt::lock_shared(&lock)?;
    let mut data = Vec::new();
    let read = File::open(path).and_then(|mut file| file.read_to_end(&mut data));
    FileExt::unlock(&lock)?;
    read?;

    if data.is_empty() {
        return Ok(BTreeMap::new());
    }

    let file: SettingsFile =
        from_cbor(&data).map_err(|err| StorageError::corrupted(path, err.to_string()))?;
    if file.version != FORMAT_VERSION {
        return Err(StorageError::corrupted(
            path,
            format!("unsupported format version {}", file.version),
        ));
    }
    if let Some(bad) = file.values.keys().find(|key| !is_key(key)) {
        return Err(StorageError::corrupted(path, format!("invalid key {bad:?}")));
    }
    Ok(file.values)
}

fn save(path: &Path, lock_path: &Path, values: &BTreeMap<String, Value>) -> StorageResult<()> {
    let data = to_cbor(&SettingsFileRef {
        version: FORMAT_VERSION,
        values,
    })?;

    let lock = open_lock(lock_path)?;
    FileExt::lock_exclusive(&lock)?;
    let written = replace(path, &data);
    FileExt::unlock(&lock)?;
    written?;

    debug!(path = %path.display(), keys = values.len(), "Saved settings file");
    Ok(())
}

/// Write-then-rename so readers see either the old or the new file.
fn replace(path: &Path, data: &[u8]) -> StorageResult<()> {
    let temp_path = sibling(path, "tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    sync_directory(path)
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> StorageResult<()> {
    // NTFS journals metadata; directories cannot be fsynced
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use confstore_core::{BackendEvent, ChannelListener};
    use tempfile::tempdir;

    fn int(value: i64) -> Option<Value> {
        Some(Value::Integer(value))
    }

    #[test]
    fn file_missing_reads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.cbor");

        let engine = FileBackend::open(&path).unwrap();
        assert!(engine.values().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn file_write_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.cbor");

        {
            let backend = FileBackend::open(&path).unwrap().handle();
            assert!(backend.write("/a/b", int(4), None).unwrap());
            assert!(backend.write("/a/c", Some(Value::from("x")), None).unwrap());
            backend.reset("/a/c", None).unwrap();
        }

        let backend = FileBackend::open(&path).unwrap().handle();
        let ty = ValueType::Integer;
        assert_eq!(backend.read_value("/a/b", &ty, None, false, false).unwrap(), int(4));
        assert_eq!(backend.read_user_value("/a/c", &ValueType::Text).unwrap(), None);
        assert_eq!(backend.read_value("/a/b", &ty, None, false, true).unwrap(), None);
    }

    #[test]
    fn file_deferred_save_waits_for_sync() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.cbor");

        let engine = FileBackend::open_with(&path, false).unwrap();
        let backend = engine.handle();
        backend.write("/k", int(1), None).unwrap();
        assert!(engine.is_dirty());
        assert!(!path.exists());

        backend.sync();
        assert!(!engine.is_dirty());
        assert_eq!(FileBackend::open(&path).unwrap().values().len(), 1);
    }

    #[test]
    fn file_drop_saves_pending_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.cbor");

        {
            let backend = FileBackend::open_with(&path, false).unwrap().handle();
            backend.write("/k", int(9), None).unwrap();
        }

        let values = FileBackend::open(&path).unwrap().values();
        assert_eq!(values.get("/k"), Some(&Value::Integer(9)));
    }

    #[test]
    fn file_reload_signals_external_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.cbor");

        let ours = FileBackend::open(&path).unwrap();
        ours.handle().write("/app/keep", int(1), None).unwrap();
        ours.handle().write("/app/gone", int(1), None).unwrap();

        let (listener, events) = ChannelListener::new();
        ours.handle().watch(&listener, None);

        let theirs = FileBackend::open(&path).unwrap().handle();
        let mut batch = Changeset::new();
        batch.reset("/app/gone").unwrap();
        batch.set("/app/new", Value::Bool(true)).unwrap();
        theirs.write_changeset(&batch, None).unwrap();

        assert_eq!(ours.reload().unwrap(), 2);
        assert_eq!(
            events.try_recv().unwrap(),
            BackendEvent::KeysChanged {
                path: "/app/".into(),
                items: vec!["gone".into(), "new".into()],
                origin: None,
            }
        );

        assert_eq!(ours.reload().unwrap(), 0);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn file_reload_never_reverts_local_writes() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.cbor");
        let engine = FileBackend::open(&path).unwrap();
        let backend = engine.handle();
        let stop = Arc::new(AtomicBool::new(false));

        let reloader = {
            let engine = Arc::clone(&engine);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    engine.reload().unwrap();
                }
            })
        };

        let ty = ValueType::Integer;
        for i in 0..300 {
            assert!(backend.write("/k", int(i), None).unwrap());
            assert_eq!(backend.read_value("/k", &ty, None, false, false).unwrap(), int(i));
        }

        stop.store(true, Ordering::Relaxed);
        reloader.join().unwrap();
        assert_eq!(engine.values().get("/k"), Some(&Value::Integer(299)));
    }

    #[test]
    fn file_garbage_is_corrupted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.cbor");
        fs::write(&path, b"not cbor").unwrap();

        let err = FileBackend::open(&path).unwrap_err();
        assert!(matches!(err, StorageError::Corrupted { .. }));
    }

    #[test]
    fn file_future_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.cbor");
        let data = to_cbor(&SettingsFileRef {
            version: FORMAT_VERSION + 1,
            values: &BTreeMap::new(),
        })
        .unwrap();
        fs::write(&path, data).unwrap();

        let err = FileBackend::open(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported format version"));
    }

    #[test]
    fn file_invalid_key_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.cbor");
        let mut values = BTreeMap::new();
        values.insert("no-slash".to_string(), Value::Bool(true));
        let data = to_cbor(&SettingsFileRef {
            version: FORMAT_VERSION,
            values: &values,
        })
        .unwrap();
        fs::write(&path, data).unwrap();

        assert!(matches!(
            FileBackend::open(&path),
            Err(StorageError::Corrupted { .. })
        ));
    }

    #[test]
    fn file_empty_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.cbor");
        fs::write(&path, b"").unwrap();
        assert!(FileBackend::open(&path).unwrap().values().is_empty());
    }

    #[test]
    fn sibling_paths() {
        let path = Path::new("/etc/app/settings.cbor");
        assert_eq!(sibling(path, "lock"), Path::new("/etc/app/settings.cbor.lock"));
        assert_eq!(sibling(path, "tmp"), Path::new("/etc/app/settings.cbor.tmp"));
    }
}
