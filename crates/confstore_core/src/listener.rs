//! Listeners and their destruction hooks.
//!
//! A listener is anything that wants change notifications from a backend.
//! The backend never owns its listeners: it holds a weak reference and a
//! hook in the listener's [`DestroyNotify`], so dropping the last `Arc` to a
//! listener unregisters it everywhere without the listener having to
//! remember which backends it watches.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::backend::Backend;
use crate::event::BackendEvent;
use crate::types::OriginTag;

type Hook = Box<dyn FnOnce() + Send + 'static>;

/// Identifies a hook registered on a [`DestroyNotify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// Runs registered hooks when the owning object is destroyed.
///
/// Embed one in every listener and return it from
/// [`SettingsListener::destroy_notify`]. Hooks run when the field is
/// dropped, after the last strong reference to the listener is gone.
#[derive(Default)]
pub struct DestroyNotify {
    hooks: Mutex<Vec<(HookId, Hook)>>,
    next_id: AtomicU64,
}

impl DestroyNotify {
    /// Creates an empty hook list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook` to run on destruction.
    pub fn connect<F>(&self, hook: F) -> HookId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.hooks.lock().push((id, Box::new(hook)));
        id
    }

    /// Removes a hook without running it. Returns false if it was not
    /// registered.
    pub fn disconnect(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.lock();
        match hooks.iter().position(|(hook_id, _)| *hook_id == id) {
            Some(pos) => {
                drop(hooks.remove(pos));
                true
            }
            None => false,
        }
    }

    /// Returns the number of registered hooks.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.hooks.lock().len()
    }
}

impl Drop for DestroyNotify {
    fn drop(&mut self) {
        let hooks = std::mem::take(&mut *self.hooks.lock());
        for (_, hook) in hooks {
            hook();
        }
    }
}

impl fmt::Debug for DestroyNotify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestroyNotify")
            .field("hooks", &self.hook_count())
            .finish()
    }
}

/// Receives change notifications from a backend.
///
/// Every callback defaults to doing nothing. Callbacks run either on the
/// thread that emitted the change (when watching without a context) or on
/// the listener's execution context. The registry lock is never held while
/// a callback runs, so callbacks may call back into the backend.
///
/// `origin` is only meaningful for immediate delivery; listeners watching
/// through an execution context must ignore it.
pub trait SettingsListener: Send + Sync + 'static {
    /// Hooks run when this listener is destroyed.
    fn destroy_notify(&self) -> &DestroyNotify;

    /// The value of `key` may have changed.
    fn changed(&self, _backend: &Backend, _key: &str, _origin: Option<OriginTag>) {}

    /// The values of `path` + each of `items` may have changed.
    fn keys_changed(
        &self,
        _backend: &Backend,
        _path: &str,
        _items: &[String],
        _origin: Option<OriginTag>,
    ) {
    }

    /// Any value under `path` may have changed.
    fn path_changed(&self, _backend: &Backend, _path: &str, _origin: Option<OriginTag>) {}

    /// Writability of `key` may have changed.
    fn writable_changed(&self, _backend: &Backend, _key: &str) {}

    /// Writability of any key under `path` may have changed.
    fn path_writable_changed(&self, _backend: &Backend, _path: &str) {}
}

/// Routes `event` to the matching callback of `listener`.
pub(crate) fn deliver(listener: &dyn SettingsListener, backend: &Backend, event: &BackendEvent) {
    match event {
        BackendEvent::Changed { key, origin } => listener.changed(backend, key, *origin),
        BackendEvent::KeysChanged {
            path,
            items,
            origin,
        } => listener.keys_changed(backend, path, items, *origin),
        BackendEvent::PathChanged { path, origin } => {
            listener.path_changed(backend, path, *origin);
        }
        BackendEvent::WritableChanged { key } => listener.writable_changed(backend, key),
        BackendEvent::PathWritableChanged { path } => {
            listener.path_writable_changed(backend, path);
        }
    }
}

/// A listener that forwards every event into a channel.
///
/// ```
/// use confstore_core::ChannelListener;
///
/// let (listener, events) = ChannelListener::new();
/// // backend.watch(&listener, None) ...
/// assert!(events.try_recv().is_err());
/// # drop(listener);
/// ```
pub struct ChannelListener {
    sender: Sender<BackendEvent>,
    destroy: DestroyNotify,
}

impl ChannelListener {
    /// Creates a listener and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Arc<Self>, Receiver<BackendEvent>) {
        let (sender, receiver) = mpsc::channel();
        let listener = Arc::new(Self {
            sender,
            destroy: DestroyNotify::new(),
        });
        (listener, receiver)
    }

    fn forward(&self, event: BackendEvent) {
        if self.sender.send(event).is_err() {
            trace!("Channel listener receiver dropped, event discarded");
        }
    }
}

impl SettingsListener for ChannelListener {
    fn destroy_notify(&self) -> &DestroyNotify {
        &self.destroy
    }

    fn changed(&self, _backend: &Backend, key: &str, origin: Option<OriginTag>) {
        self.forward(BackendEvent::Changed {
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
        self.forward(BackendEvent::KeysChanged {
            path: path.to_string(),
            items: items.to_vec(),
            origin,
        });
    }

    fn path_changed(&self, _backend: &Backend, path: &str, origin: Option<OriginTag>) {
        self.forward(BackendEvent::PathChanged {
            path: path.to_string(),
            origin,
        });
    }

    fn writable_changed(&self, _backend: &Backend, key: &str) {
        self.forward(BackendEvent::WritableChanged {
            key: key.to_string(),
        });
    }

    fn path_writable_changed(&self, _backend: &Backend, path: &str) {
        self.forward(BackendEvent::PathWritableChanged {
            path: path.to_string(),
        });
    }
}

impl fmt::Debug for ChannelListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelListener").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn hooks_run_on_drop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let notify = DestroyNotify::new();
        for _ in 0..3 {
            let runs = Arc::clone(&runs);
            notify.connect(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(notify.hook_count(), 3);

        drop(notify);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn disconnected_hook_does_not_run() {
        let runs = Arc::new(AtomicUsize::new(0));
        let notify = DestroyNotify::new();

        let counter = Arc::clone(&runs);
        let id = notify.connect(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(Arc::strong_count(&runs), 2);
        assert!(notify.disconnect(id));
        // the hook and its captures are released at once
        assert_eq!(Arc::strong_count(&runs), 1);
        assert!(!notify.disconnect(id));

        drop(notify);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn hook_may_touch_other_notifiers() {
        let outer = DestroyNotify::new();
        let inner = Arc::new(DestroyNotify::new());
        let target = Arc::clone(&inner);
        let id = inner.connect(|| {});
        outer.connect(move || {
            target.disconnect(id);
        });

        drop(outer);
        assert_eq!(inner.hook_count(), 0);
    }
}
