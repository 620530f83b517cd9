//! Volatile in-process settings engine.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

use confstore_codec::{Value, ValueType};
use confstore_core::{
    ensure_key, ensure_name, is_path, Backend, BackendBase, Changeset, CoreResult, OriginTag,
    SettingsBackend, WriteTree,
};
use parking_lot::RwLock;
use tracing::trace;

#[derive(Debug, Default)]
struct MemoryState {
    user: BTreeMap<String, Value>,
    defaults: BTreeMap<String, Value>,
    // keys and paths that may not be written
    locks: BTreeSet<String>,
    subscriptions: BTreeMap<String, usize>,
}

impl MemoryState {
    fn is_locked(&self, key: &str) -> bool {
        self.locks
            .iter()
            .any(|name| name == key || (is_path(name) && key.starts_with(name.as_str())))
    }
}

/// Settings kept in memory for the life of the process.
///
/// Besides user values the engine carries system defaults and a lockdown
/// list, which makes it a complete stand-in for a real engine in tests.
/// Nothing is persisted.
///
/// # Example
///
/// ```rust
/// use confstore_storage::MemoryBackend;
/// use confstore_codec::{Value, ValueType};
///
/// let engine = MemoryBackend::new();
/// engine.set_default("/app/volume", Value::Integer(5)).unwrap();
///
/// let backend = engine.handle();
/// backend.write("/app/volume", Some(Value::Integer(8)), None).unwrap();
///
/// let ty = ValueType::Integer;
/// assert_eq!(backend.read_value("/app/volume", &ty, None, false, false).unwrap(), Some(Value::Integer(8)));
/// assert_eq!(backend.read_value("/app/volume", &ty, None, false, true).unwrap(), Some(Value::Integer(5)));
/// ```
#[derive(Debug)]
pub struct MemoryBackend {
    base: BackendBase,
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_defaults(BTreeMap::new())
    }

    /// Creates an engine with the given system defaults.
    ///
    /// Defaults under malformed keys can never be read and are kept as is.
    #[must_use]
    pub fn with_defaults(defaults: BTreeMap<String, Value>) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| Self {
            base: BackendBase::new(this.clone()),
            state: RwLock::new(MemoryState {
                defaults,
                ..MemoryState::default()
            }),
        })
    }

    /// Returns a validating handle to this engine.
    #[must_use]
    pub fn handle(self: &Arc<Self>) -> Backend {
        Backend::new(Arc::clone(self))
    }

    /// Sets the system default of `key` and signals the change.
    ///
    /// # Errors
    ///
    /// Returns an error if `key` is malformed.
    pub fn set_default(&self, key: &str, value: Value) -> CoreResult<()> {
        ensure_key(key)?;
        self.state.write().defaults.insert(key.to_string(), value);
        self.base.changed(key, None)
    }

    /// Makes `name` (a key, or every key under a path) read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is neither a key nor a path.
    pub fn lock(&self, name: &str) -> CoreResult<()> {
        ensure_name(name)?;
        let added = self.state.write().locks.insert(name.to_string());
        if added {
            self.writability_changed(name)?;
        }
        Ok(())
    }

    /// Lifts a lock placed by [`MemoryBackend::lock`].
    ///
    /// Returns false if `name` was not locked.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is neither a key nor a path.
    pub fn unlock(&self, name: &str) -> CoreResult<bool> {
        ensure_name(name)?;
        let removed = self.state.write().locks.remove(name);
        if removed {
            self.writability_changed(name)?;
        }
        Ok(removed)
    }

    /// Applies a change made outside this process.
    ///
    /// Locks do not apply. The change is signalled without an origin tag.
    pub fn apply_external(&self, changeset: &Changeset) {
        {
            let mut state = self.state.write();
            apply(&mut state.user, &changeset.to_tree());
        }
        self.base.changeset_applied(changeset, None);
    }

    /// Returns how many times `name` is currently subscribed.
    #[must_use]
    pub fn subscription_count(&self, name: &str) -> usize {
        self.state
            .read()
            .subscriptions
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Returns a copy of every user value.
    #[must_use]
    pub fn user_values(&self) -> BTreeMap<String, Value> {
        self.state.read().user.clone()
    }

    fn writability_changed(&self, name: &str) -> CoreResult<()> {
        if is_path(name) {
            self.base.path_writable_changed(name)
        } else {
            self.base.writable_changed(name)
        }
    }
}

fn apply(values: &mut BTreeMap<String, Value>, tree: &WriteTree) {
    for (key, value) in tree {
        match value {
            Some(value) => {
                values.insert(key.clone(), value.clone());
            }
            None => {
                values.remove(key);
            }
        }
    }
}

impl SettingsBackend for MemoryBackend {
    fn base(&self) -> &BackendBase {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        "MemoryBackend"
    }

    fn read(&self, key: &str, _ty: &ValueType, default_value: bool) -> Option<Value> {
        let state = self.state.read();
        if !default_value {
            if let Some(value) = state.user.get(key) {
                return Some(value.clone());
            }
        }
        state.defaults.get(key).cloned()
    }

    fn read_user_value(&self, key: &str, _ty: &ValueType) -> Option<Value> {
        self.state.read().user.get(key).cloned()
    }

    fn write_tree(&self, tree: &WriteTree, _origin: Option<OriginTag>) -> bool {
        let mut state = self.state.write();
        if tree.keys().any(|key| state.is_locked(key)) {
            return false;
        }
        apply(&mut state.user, tree);
        true
    }

    fn reset(&self, key: &str, origin: Option<OriginTag>) {
        // a locked key keeps its value; that still counts as success
        if self.state.read().is_locked(key) {
            trace!(key, "Reset of locked key ignored");
            return;
        }
        if !self.write(key, None, origin) {
            trace!(key, "Key locked during reset");
        }
    }

    fn get_writable(&self, key: &str) -> bool {
        !self.state.read().is_locked(key)
    }

    fn subscribe(&self, name: &str) {
        let mut state = self.state.write();
        let count = state.subscriptions.entry(name.to_string()).or_insert(0);
        *count += 1;
        trace!(name, count = *count, "Subscribed");
    }

    fn unsubscribe(&self, name: &str) {
        let mut state = self.state.write();
        if let Some(count) = state.subscriptions.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                state.subscriptions.remove(name);
            }
        }
    }
}
