//! The settings backend contract.
//!
//! A storage engine implements [`SettingsBackend`]: three required methods
//! for reading and batch-writing storage, plus overridable defaults that
//! compose them into single-key writes, resets and overlay-aware reads.
//! Every engine embeds a [`BackendBase`], which owns the watch registry and
//! emits change notifications.
//!
//! Applications talk to an engine through the [`Backend`] handle, which
//! validates every key and path before the engine sees it.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Weak};
//! use parking_lot::Mutex;
//! use confstore_codec::{Value, ValueType};
//! use confstore_core::{Backend, BackendBase, SettingsBackend, OriginTag, WriteTree};
//! use std::collections::BTreeMap;
//!
//! struct Tiny {
//!     base: BackendBase,
//!     values: Mutex<BTreeMap<String, Value>>,
//! }
//!
//! impl SettingsBackend for Tiny {
//!     fn base(&self) -> &BackendBase {
//!         &self.base
//!     }
//!
//!     fn read(&self, key: &str, _ty: &ValueType, default_value: bool) -> Option<Value> {
//!         if default_value { None } else { self.values.lock().get(key).cloned() }
//!     }
//!
//!     fn read_user_value(&self, key: &str, ty: &ValueType) -> Option<Value> {
//!         self.read(key, ty, false)
//!     }
//!
//!     fn write_tree(&self, tree: &WriteTree, _origin: Option<OriginTag>) -> bool {
//!         let mut values = self.values.lock();
//!         for (key, value) in tree {
//!             match value {
//!                 Some(value) => values.insert(key.clone(), value.clone()),
//!                 None => values.remove(key),
//!             };
//!         }
//!         true
//!     }
//! }
//!
//! let backend = Backend::new(Arc::new_cyclic(|this: &Weak<Tiny>| Tiny {
//!     base: BackendBase::new(this.clone()),
//!     values: Mutex::new(BTreeMap::new()),
//! }));
//!
//! assert!(backend.write("/app/volume", Some(Value::Integer(7)), None).unwrap());
//! let value = backend.read_value("/app/volume", &ValueType::Integer, None, false, false).unwrap();
//! assert_eq!(value, Some(Value::Integer(7)));
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use confstore_codec::{Value, ValueType};
use tracing::{debug, error, warn};

use crate::changeset::Changeset;
use crate::context::ExecutionContext;
use crate::dispatch;
use crate::error::CoreResult;
use crate::event::BackendEvent;
use crate::listener::SettingsListener;
use crate::overlay::ReadOverlay;
use crate::types::{OriginTag, WriteTree};
use crate::validation::{ensure_items, ensure_key, ensure_name, ensure_path};
use crate::watch::WatchRegistry;

/// Operations a storage engine provides.
///
/// Implementations must be cheap to call: nothing here should block on
/// I/O. Keys and paths passed in have already been validated by
/// [`Backend`].
pub trait SettingsBackend: Send + Sync + 'static {
    /// Shared notification state embedded in the engine.
    fn base(&self) -> &BackendBase;

    /// Name used in diagnostics.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Reads `key`, or its default when `default_value` is true.
    ///
    /// Returns `None` if there is no value. A value of a type other than
    /// `ty` is tolerated here; [`Backend`] discards it.
    fn read(&self, key: &str, ty: &ValueType, default_value: bool) -> Option<Value>;

    /// Reads the value the user set for `key`, ignoring defaults.
    fn read_user_value(&self, key: &str, ty: &ValueType) -> Option<Value>;

    /// Applies a flattened batch atomically.
    ///
    /// Returns false, without changing anything, if any key is not
    /// writable. Must not emit notifications itself when called through
    /// the default [`SettingsBackend::write_changeset`], which emits them
    /// after a successful write.
    fn write_tree(&self, tree: &WriteTree, origin: Option<OriginTag>) -> bool;

    /// Reads `key` through `overlay`.
    ///
    /// With `default_value` the overlay is ignored and the default is
    /// read. Otherwise the most recent overlay entry wins, then the user
    /// value (when `user_value_only`), then the effective stored value.
    fn read_value(
        &self,
        key: &str,
        ty: &ValueType,
        overlay: Option<&ReadOverlay>,
        user_value_only: bool,
        default_value: bool,
    ) -> Option<Value> {
        if default_value {
            return self.read(key, ty, true);
        }

        if let Some(entry) = overlay.and_then(|overlay| overlay.check(key)) {
            return entry.cloned();
        }

        if user_value_only {
            self.read_user_value(key, ty)
        } else {
            self.read(key, ty, false)
        }
    }

    /// Writes one key, or resets it when `value` is `None`.
    ///
    /// The change notification has been delivered to immediate listeners
    /// by the time this returns true.
    fn write(&self, key: &str, value: Option<Value>, origin: Option<OriginTag>) -> bool {
        match Changeset::new_write(key, value) {
            Ok(changeset) => self.write_changeset(&changeset, origin),
            Err(err) => {
                error!(key, error = %err, "Rejected single-key write");
                false
            }
        }
    }

    /// Applies every entry of `changeset` atomically and emits the minimal
    /// notification for it.
    fn write_changeset(&self, changeset: &Changeset, origin: Option<OriginTag>) -> bool {
        let tree = changeset.to_tree();
        if !self.write_tree(&tree, origin) {
            return false;
        }
        self.base().changeset_applied(changeset, origin);
        true
    }

    /// Resets `key` to its default. Must always succeed.
    fn reset(&self, key: &str, origin: Option<OriginTag>) {
        if !self.write(key, None, origin) {
            error!(
                backend = self.type_name(),
                key,
                "{} is behaving incorrectly: reset() must always succeed",
                self.type_name()
            );
        }
    }

    /// Returns true if `key` may be written.
    fn get_writable(&self, _key: &str) -> bool {
        true
    }

    /// Starts tracking out-of-process changes under `name`.
    fn subscribe(&self, _name: &str) {}

    /// Stops tracking changes under `name`.
    fn unsubscribe(&self, _name: &str) {}

    /// Flushes pending writes to permanent storage.
    fn sync(&self) {}
}

/// State every engine embeds: a handle to itself and its watch registry.
///
/// Create it inside [`Arc::new_cyclic`] so notifications can hand listeners
/// a strong [`Backend`] handle.
pub struct BackendBase {
    this: Weak<dyn SettingsBackend>,
    watches: WatchRegistry,
}

impl BackendBase {
    /// Creates the base for the engine behind `this`.
    #[must_use]
    pub fn new(this: Weak<dyn SettingsBackend>) -> Self {
        Self {
            this,
            watches: WatchRegistry::new(),
        }
    }

    /// Returns the watch registry.
    #[must_use]
    pub fn watches(&self) -> &WatchRegistry {
        &self.watches
    }

    /// Signals that the value of `key` may have changed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidKey`] if `key` is malformed.
    pub fn changed(&self, key: &str, origin: Option<OriginTag>) -> CoreResult<()> {
        ensure_key(key)?;
        self.emit(BackendEvent::Changed {
            key: key.to_string(),
            origin,
        });
        Ok(())
    }

    /// Signals that `path` + each of `items` may have changed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidPath`] or
    /// [`crate::CoreError::InvalidItem`] for malformed input.
    pub fn keys_changed<S: AsRef<str>>(
        &self,
        path: &str,
        items: &[S],
        origin: Option<OriginTag>,
    ) -> CoreResult<()> {
        ensure_items(path, items)?;
        self.emit(BackendEvent::KeysChanged {
            path: path.to_string(),
            items: items.iter().map(|item| item.as_ref().to_string()).collect(),
            origin,
        });
        Ok(())
    }

    /// Signals that any key under `path` may have changed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidPath`] if `path` is malformed.
    pub fn path_changed(&self, path: &str, origin: Option<OriginTag>) -> CoreResult<()> {
        ensure_path(path)?;
        self.emit(BackendEvent::PathChanged {
            path: path.to_string(),
            origin,
        });
        Ok(())
    }

    /// Signals that the writability of `key` may have changed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidKey`] if `key` is malformed.
    pub fn writable_changed(&self, key: &str) -> CoreResult<()> {
        ensure_key(key)?;
        self.emit(BackendEvent::WritableChanged {
            key: key.to_string(),
        });
        Ok(())
    }

    /// Signals that the writability of any key under `path` may have
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidPath`] if `path` is malformed.
    pub fn path_writable_changed(&self, path: &str) -> CoreResult<()> {
        ensure_path(path)?;
        self.emit(BackendEvent::PathWritableChanged {
            path: path.to_string(),
        });
        Ok(())
    }

    /// Emits the minimal notification for an applied changeset.
    ///
    /// One entry becomes `changed` on that key, several become
    /// `keys_changed` on their common path, none emits nothing.
    pub fn changeset_applied(&self, changeset: &Changeset, origin: Option<OriginTag>) {
        let description = changeset.describe();
        let event = match description.count() {
            0 => return,
            1 => BackendEvent::Changed {
                key: description.prefix.to_string(),
                origin,
            },
            _ => BackendEvent::KeysChanged {
                path: description.prefix.to_string(),
                items: description.items.iter().map(|item| (*item).to_string()).collect(),
                origin,
            },
        };
        self.emit(event);
    }

    /// Emits the minimal notification for an applied write tree.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidKey`] for the first malformed key.
    pub fn changed_tree(&self, tree: &WriteTree, origin: Option<OriginTag>) -> CoreResult<()> {
        let changeset = Changeset::from_tree(tree)?;
        self.changeset_applied(&changeset, origin);
        Ok(())
    }

    fn emit(&self, event: BackendEvent) {
        let Some(this) = self.this.upgrade() else {
            debug!(event = %event, "Backend is being destroyed, event not dispatched");
            return;
        };
        dispatch::dispatch(&self.watches, &Backend(this), event);
    }
}

impl fmt::Debug for BackendBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendBase")
            .field("watches", &self.watches)
            .finish_non_exhaustive()
    }
}

/// A shared, validating handle to a storage engine.
///
/// Cloning is cheap. Contract violations (malformed keys or paths,
/// unwatching a listener twice) are reported as errors; expected negative
/// outcomes are ordinary values.
#[derive(Clone)]
pub struct Backend(Arc<dyn SettingsBackend>);

impl Backend {
    /// Wraps an engine.
    #[must_use]
    pub fn new<B: SettingsBackend>(engine: Arc<B>) -> Self {
        Self(engine)
    }

    /// Wraps an already type-erased engine.
    #[must_use]
    pub fn from_arc(engine: Arc<dyn SettingsBackend>) -> Self {
        Self(engine)
    }

    /// Returns the engine.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn SettingsBackend> {
        &self.0
    }

    /// Returns the engine's diagnostic name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    /// Returns true if both handles refer to the same engine.
    #[must_use]
    pub fn ptr_eq(&self, other: &Backend) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }

    /// Reads `key` through an optional overlay.
    ///
    /// A value whose type is not `ty` is discarded with a warning and
    /// reported as absent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidKey`] if `key` is malformed.
    pub fn read_value(
        &self,
        key: &str,
        ty: &ValueType,
        overlay: Option<&ReadOverlay>,
        user_value_only: bool,
        default_value: bool,
    ) -> CoreResult<Option<Value>> {
        ensure_key(key)?;
        let value = self
            .0
            .read_value(key, ty, overlay, user_value_only, default_value);
        Ok(self.checked(key, ty, value))
    }

    /// Reads the value the user set for `key`, ignoring defaults.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidKey`] if `key` is malformed.
    pub fn read_user_value(&self, key: &str, ty: &ValueType) -> CoreResult<Option<Value>> {
        ensure_key(key)?;
        let value = self.0.read_user_value(key, ty);
        Ok(self.checked(key, ty, value))
    }

    /// Writes one key, or resets it when `value` is `None`.
    ///
    /// Returns `Ok(false)` if the key is not writable.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidKey`] if `key` is malformed.
    pub fn write(&self, key: &str, value: Option<Value>, origin: Option<OriginTag>) -> CoreResult<bool> {
        ensure_key(key)?;
        Ok(self.0.write(key, value, origin))
    }

    /// Applies a changeset atomically.
    ///
    /// Returns `Ok(false)` if any key is not writable. Keys were validated
    /// when they were inserted, so this never fails today.
    ///
    /// # Errors
    ///
    /// Reserved for contract violations.
    pub fn write_changeset(&self, changeset: &Changeset, origin: Option<OriginTag>) -> CoreResult<bool> {
        Ok(self.0.write_changeset(changeset, origin))
    }

    /// Resets `key` to its default.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidKey`] if `key` is malformed.
    pub fn reset(&self, key: &str, origin: Option<OriginTag>) -> CoreResult<()> {
        ensure_key(key)?;
        self.0.reset(key, origin);
        Ok(())
    }

    /// Returns true if `key` may be written.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidKey`] if `key` is malformed.
    pub fn get_writable(&self, key: &str) -> CoreResult<bool> {
        ensure_key(key)?;
        Ok(self.0.get_writable(key))
    }

    /// Asks the engine to track out-of-process changes under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidName`] if `name` is neither a key
    /// nor a path.
    pub fn subscribe(&self, name: &str) -> CoreResult<()> {
        ensure_name(name)?;
        self.0.subscribe(name);
        Ok(())
    }

    /// Undoes one [`Backend::subscribe`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidName`] if `name` is neither a key
    /// nor a path.
    pub fn unsubscribe(&self, name: &str) -> CoreResult<()> {
        ensure_name(name)?;
        self.0.unsubscribe(name);
        Ok(())
    }

    /// Flushes pending writes.
    pub fn sync(&self) {
        self.0.sync();
    }

    /// Starts delivering notifications to `listener`.
    ///
    /// The backend does not keep the listener alive; dropping it unwatches
    /// it. With `context` the callbacks are queued there, otherwise they run
    /// on the thread that emits the change.
    pub fn watch<L: SettingsListener>(&self, listener: &Arc<L>, context: Option<ExecutionContext>) {
        let listener: Arc<dyn SettingsListener> = Arc::clone(listener) as _;
        self.0.base().watches().watch(&listener, context);
    }

    /// Stops delivering notifications to `listener`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotWatched`] if `listener` is not
    /// watching this backend.
    pub fn unwatch<L: SettingsListener>(&self, listener: &Arc<L>) -> CoreResult<()> {
        let listener: Arc<dyn SettingsListener> = Arc::clone(listener) as _;
        self.0.base().watches().unwatch(&listener)
    }

    /// See [`BackendBase::changed`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidKey`] if `key` is malformed.
    pub fn changed(&self, key: &str, origin: Option<OriginTag>) -> CoreResult<()> {
        self.0.base().changed(key, origin)
    }

    /// See [`BackendBase::keys_changed`].
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed path or item.
    pub fn keys_changed<S: AsRef<str>>(
        &self,
        path: &str,
        items: &[S],
        origin: Option<OriginTag>,
    ) -> CoreResult<()> {
        self.0.base().keys_changed(path, items, origin)
    }

    /// See [`BackendBase::path_changed`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidPath`] if `path` is malformed.
    pub fn path_changed(&self, path: &str, origin: Option<OriginTag>) -> CoreResult<()> {
        self.0.base().path_changed(path, origin)
    }

    /// See [`BackendBase::writable_changed`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidKey`] if `key` is malformed.
    pub fn writable_changed(&self, key: &str) -> CoreResult<()> {
        self.0.base().writable_changed(key)
    }

    /// See [`BackendBase::path_writable_changed`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidPath`] if `path` is malformed.
    pub fn path_writable_changed(&self, path: &str) -> CoreResult<()> {
        self.0.base().path_writable_changed(path)
    }

    fn checked(&self, key: &str, ty: &ValueType, value: Option<Value>) -> Option<Value> {
        match value {
            Some(value) if !value.is_of_type(ty) => {
                warn!(
                    backend = self.type_name(),
                    key,
                    expected = %ty,
                    found = value.kind(),
                    "Backend returned a value of the wrong type"
                );
                None
            }
            other => other,
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("type", &self.type_name())
            .field("watches", self.0.base().watches())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::ChannelListener;
    use parking_lot::Mutex;
    use std::collections::{BTreeMap, BTreeSet};
    use tracing_test::traced_test;

    /// In-memory engine with optional read-only keys and a bad-type mode.
    struct TestEngine {
        base: BackendBase,
        values: Mutex<BTreeMap<String, Value>>,
        defaults: BTreeMap<String, Value>,
        locked: BTreeSet<String>,
        wrong_types: bool,
    }

    fn engine(locked: &[&str], wrong_types: bool) -> Backend {
        let mut defaults = BTreeMap::new();
        defaults.insert("/app/size".to_string(), Value::Integer(10));
        Backend::new(Arc::new_cyclic(|this: &Weak<TestEngine>| TestEngine {
            base: BackendBase::new(this.clone()),
            values: Mutex::new(BTreeMap::new()),
            defaults,
            locked: locked.iter().map(|key| (*key).to_string()).collect(),
            wrong_types,
        }))
    }

    impl SettingsBackend for TestEngine {
        fn base(&self) -> &BackendBase {
            &self.base
        }

        fn type_name(&self) -> &'static str {
            "TestEngine"
        }

        fn read(&self, key: &str, ty: &ValueType, default_value: bool) -> Option<Value> {
            if self.wrong_types {
                return Some(Value::Text("oops".into()));
            }
            if !default_value {
                if let Some(value) = self.read_user_value(key, ty) {
                    return Some(value);
                }
            }
            self.defaults.get(key).cloned()
        }

        fn read_user_value(&self, key: &str, _ty: &ValueType) -> Option<Value> {
            if self.wrong_types {
                return Some(Value::Text("oops".into()));
            }
            self.values.lock().get(key).cloned()
        }

        fn write_tree(&self, tree: &WriteTree, _origin: Option<OriginTag>) -> bool {
            if tree.keys().any(|key| self.locked.contains(key)) {
                return false;
            }
            let mut values = self.values.lock();
            for (key, value) in tree {
                match value {
                    Some(value) => values.insert(key.clone(), value.clone()),
                    None => values.remove(key),
                };
            }
            true
        }

        fn get_writable(&self, key: &str) -> bool {
            !self.locked.contains(key)
        }
    }

    #[test]
    fn write_emits_changed_before_returning() {
        let backend = engine(&[], false);
        let (listener, events) = ChannelListener::new();
        backend.watch(&listener, None);

        let tag = OriginTag::new();
        assert!(backend.write("/a/b", Some(Value::Integer(1)), Some(tag)).unwrap());

        assert_eq!(
            events.try_recv().unwrap(),
            BackendEvent::Changed {
                key: "/a/b".into(),
                origin: Some(tag),
            }
        );
    }

    #[test]
    fn unwritable_key_is_not_an_error() {
        let backend = engine(&["/ro"], false);
        let (listener, events) = ChannelListener::new();
        backend.watch(&listener, None);

        assert!(!backend.write("/ro", Some(Value::Bool(true)), None).unwrap());
        assert!(!backend.get_writable("/ro").unwrap());
        assert!(backend.get_writable("/rw").unwrap());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn changeset_emits_keys_changed() {
        let backend = engine(&[], false);
        let (listener, events) = ChannelListener::new();
        backend.watch(&listener, None);

        let mut changeset = Changeset::new();
        changeset.set("/app/a", Value::Integer(1)).unwrap();
        changeset.set("/app/b/c", Value::Integer(2)).unwrap();
        assert!(backend.write_changeset(&changeset, None).unwrap());

        assert_eq!(
            events.try_recv().unwrap(),
            BackendEvent::KeysChanged {
                path: "/app/".into(),
                items: vec!["a".into(), "b/c".into()],
                origin: None,
            }
        );
    }

    #[test]
    fn empty_changeset_emits_nothing() {
        let backend = engine(&[], false);
        let (listener, events) = ChannelListener::new();
        backend.watch(&listener, None);

        assert!(backend.write_changeset(&Changeset::new(), None).unwrap());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn default_value_ignores_overlay() {
        let backend = engine(&[], false);
        backend
            .write("/app/size", Some(Value::Integer(20)), None)
            .unwrap();

        let mut overlay = ReadOverlay::new();
        overlay.push(Arc::new(
            Changeset::new_write("/app/size", Some(Value::Integer(30))).unwrap(),
        ));

        let read = |user_only, default| {
            backend
                .read_value("/app/size", &ValueType::Integer, Some(&overlay), user_only, default)
                .unwrap()
        };
        assert_eq!(read(false, true), Some(Value::Integer(10)));
        assert_eq!(read(false, false), Some(Value::Integer(30)));
        assert_eq!(read(true, false), Some(Value::Integer(30)));
    }

    #[test]
    fn overlay_reset_reads_absent() {
        let backend = engine(&[], false);
        backend
            .write("/app/size", Some(Value::Integer(20)), None)
            .unwrap();

        let mut overlay = ReadOverlay::new();
        overlay.push(Arc::new(Changeset::new_write("/app/size", None).unwrap()));

        let value = backend
            .read_value("/app/size", &ValueType::Integer, Some(&overlay), false, false)
            .unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn user_value_only_skips_defaults() {
        let backend = engine(&[], false);
        let ty = ValueType::Integer;
        assert_eq!(backend.read_value("/app/size", &ty, None, true, false).unwrap(), None);
        assert_eq!(
            backend.read_value("/app/size", &ty, None, false, false).unwrap(),
            Some(Value::Integer(10))
        );
        assert_eq!(backend.read_user_value("/app/size", &ty).unwrap(), None);
    }

    #[test]
    #[traced_test]
    fn wrong_type_reads_as_absent() {
        let backend = engine(&[], true);
        let ty = ValueType::Integer;
        assert_eq!(backend.read_value("/x", &ty, None, false, false).unwrap(), None);
        assert!(logs_contain("Backend returned a value of the wrong type"));
        assert!(logs_contain("backend=\"TestEngine\""));
        assert_eq!(backend.read_user_value("/x", &ty).unwrap(), None);
        assert_eq!(
            backend.read_value("/x", &ValueType::Text, None, false, false).unwrap(),
            Some(Value::Text("oops".into()))
        );
    }

    #[test]
    #[traced_test]
    fn failed_reset_is_logged_not_fatal() {
        let backend = engine(&["/ro"], false);
        backend.reset("/ro", None).unwrap();
        assert!(logs_contain(
            "TestEngine is behaving incorrectly: reset() must always succeed"
        ));
        assert!(logs_contain("key=\"/ro\""));
    }

    #[test]
    #[traced_test]
    fn successful_reset_logs_no_defect() {
        let backend = engine(&[], false);
        backend.write("/a", Some(Value::Integer(1)), None).unwrap();
        backend.reset("/a", None).unwrap();
        assert!(!logs_contain("behaving incorrectly"));
    }

    #[test]
    fn malformed_input_is_rejected() {
        let backend = engine(&[], false);
        assert!(backend.write("no-slash", None, None).is_err());
        assert!(backend.read_user_value("/a/", &ValueType::Bool).is_err());
        assert!(backend.reset("//x", None).is_err());
        assert!(backend.get_writable("").is_err());
        assert!(backend.subscribe("a/").is_err());
        assert!(backend.path_changed("/a", None).is_err());
        assert!(backend.keys_changed("/a/", &["/b"], None).is_err());
        assert!(backend.writable_changed("/a/").is_err());
        assert!(backend.subscribe("/a/").is_ok());
        assert!(backend.unsubscribe("/a/b").is_ok());
    }

    #[test]
    fn unwatch_twice_is_a_contract_violation() {
        let backend = engine(&[], false);
        let (listener, _events) = ChannelListener::new();
        backend.watch(&listener, None);
        backend.unwatch(&listener).unwrap();

        let err = backend.unwatch(&listener).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn changed_tree_matches_changeset_policy() {
        let backend = engine(&[], false);
        let (listener, events) = ChannelListener::new();
        backend.watch(&listener, None);

        let mut tree = WriteTree::new();
        tree.insert("/only".into(), None);
        backend.inner().base().changed_tree(&tree, None).unwrap();
        assert_eq!(
            events.try_recv().unwrap(),
            BackendEvent::Changed {
                key: "/only".into(),
                origin: None,
            }
        );
    }

    #[test]
    fn handles_compare_by_engine() {
        let backend = engine(&[], false);
        assert!(backend.ptr_eq(&backend.clone()));
        assert!(!backend.ptr_eq(&engine(&[], false)));
        assert_eq!(backend.type_name(), "TestEngine");
    }
}
