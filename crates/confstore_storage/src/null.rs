//! An engine that stores nothing.

use std::sync::{Arc, Weak};

use confstore_codec::{Value, ValueType};
use confstore_core::{Backend, BackendBase, OriginTag, SettingsBackend, WriteTree};

/// Reads return nothing and nothing is writable.
///
/// Useful for running an application with settings disabled: every key
/// reads as unset and every write is refused without error.
#[derive(Debug)]
pub struct NullBackend {
    base: BackendBase,
}

impl NullBackend {
    /// Creates a null engine.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| Self {
            base: BackendBase::new(this.clone()),
        })
    }

    /// Returns a validating handle to this engine.
    #[must_use]
    pub fn handle(self: &Arc<Self>) -> Backend {
        Backend::new(Arc::clone(self))
    }
}

impl SettingsBackend for NullBackend {
    fn base(&self) -> &BackendBase {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        "NullBackend"
    }

    fn read(&self, _key: &str, _ty: &ValueType, _default_value: bool) -> Option<Value> {
        None
    }

    fn read_user_value(&self, _key: &str, _ty: &ValueType) -> Option<Value> {
        None
    }

    fn write_tree(&self, _tree: &WriteTree, _origin: Option<OriginTag>) -> bool {
        false
    }

    fn reset(&self, _key: &str, _origin: Option<OriginTag>) {}

    fn get_writable(&self, _key: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confstore_core::{Changeset, ChannelListener};

    #[test]
    fn null_refuses_everything_quietly() {
        let backend = NullBackend::new().handle();
        let (listener, events) = ChannelListener::new();
        backend.watch(&listener, None);

        assert!(!backend.write("/a", Some(Value::Bool(true)), None).unwrap());
        assert!(!backend.get_writable("/a").unwrap());
        backend.reset("/a", None).unwrap();

        let mut batch = Changeset::new();
        batch.set("/a", Value::Bool(true)).unwrap();
        assert!(!backend.write_changeset(&batch, None).unwrap());

        let value = backend.read_value("/a", &ValueType::Bool, None, false, false).unwrap();
        assert_eq!(value, None);
        assert!(events.try_recv().is_err());
    }
}
