//! Registry of listeners watching a backend.
//!
//! The registry never keeps a listener alive. Each subscription holds a weak
//! reference plus a destruction hook installed in the listener's
//! [`DestroyNotify`]; when the listener is dropped the hook removes the
//! subscription. [`WatchRegistry::unwatch`] takes the same removal path
//! synchronously and then disconnects the hook.
//!
//! All access to the subscription list is serialised by one mutex. The
//! mutex is never held while listener code can run, including listener
//! destructors, because those run the registry's own hooks.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::context::ExecutionContext;
use crate::error::{CoreError, CoreResult};
use crate::listener::{HookId, SettingsListener};

/// A live subscription, upgraded for the duration of one dispatch.
pub(crate) struct LiveSubscription {
    pub(crate) listener: Arc<dyn SettingsListener>,
    pub(crate) context: Option<ExecutionContext>,
}

struct Subscription {
    id: u64,
    hook: HookId,
    listener: Weak<dyn SettingsListener>,
    context: Option<ExecutionContext>,
}

impl Subscription {
    fn is(&self, listener: &Arc<dyn SettingsListener>) -> bool {
        std::ptr::addr_eq(self.listener.as_ptr(), Arc::as_ptr(listener))
    }
}

#[derive(Default)]
struct RegistryShared {
    subs: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl RegistryShared {
    /// Removal path shared by destruction hooks.
    fn remove(&self, id: u64) -> bool {
        let mut subs = self.subs.lock();
        match subs.iter().position(|sub| sub.id == id) {
            Some(pos) => {
                subs.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Thread-safe set of listeners watching one backend.
#[derive(Default)]
pub struct WatchRegistry {
    shared: Arc<RegistryShared>,
}

impl WatchRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` without taking ownership of it.
    ///
    /// Callbacks run on `context`, or immediately on the emitting thread if
    /// `context` is `None`. Watching the same listener twice creates two
    /// subscriptions.
    pub fn watch(&self, listener: &Arc<dyn SettingsListener>, context: Option<ExecutionContext>) {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);

        let registry = Arc::downgrade(&self.shared);
        let hook = listener.destroy_notify().connect(move || {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            // false when unwatch or registry teardown got there first
            let removed = registry.remove(id);
            trace!(subscription = id, removed, "Listener destroyed");
        });

        trace!(
            subscription = id,
            context = context.as_ref().map(ExecutionContext::name),
            "Listener watching"
        );
        self.shared.subs.lock().push(Subscription {
            id,
            hook,
            listener: Arc::downgrade(listener),
            context,
        });
    }

    /// Removes the oldest subscription of `listener`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotWatched`] if `listener` has no subscription.
    pub fn unwatch(&self, listener: &Arc<dyn SettingsListener>) -> CoreResult<()> {
        let removed = {
            let mut subs = self.shared.subs.lock();
            let pos = subs
                .iter()
                .position(|sub| sub.is(listener))
                .ok_or(CoreError::NotWatched)?;
            subs.remove(pos)
        };

        listener.destroy_notify().disconnect(removed.hook);
        trace!(subscription = removed.id, "Listener unwatched");
        Ok(())
    }

    /// Returns true if `listener` has at least one subscription.
    #[must_use]
    pub fn is_watching(&self, listener: &Arc<dyn SettingsListener>) -> bool {
        self.shared.subs.lock().iter().any(|sub| sub.is(listener))
    }

    /// Returns the number of subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.subs.lock().len()
    }

    /// Returns true if nothing is watching.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.subs.lock().is_empty()
    }

    /// Takes a strong claim on every live listener, in registration order.
    ///
    /// The returned claims must be dropped after the lock is released, which
    /// returning them guarantees: dropping a claim may run the listener's
    /// destructor and with it a hook that locks this registry.
    pub(crate) fn snapshot(&self) -> Vec<LiveSubscription> {
        let subs = self.shared.subs.lock();
        subs.iter()
            .filter_map(|sub| {
                sub.listener.upgrade().map(|listener| LiveSubscription {
                    listener,
                    context: sub.context.clone(),
                })
            })
            .collect()
    }
}

impl Drop for WatchRegistry {
    fn drop(&mut self) {
        let subs = std::mem::take(&mut *self.shared.subs.lock());
        for sub in subs {
            if let Some(listener) = sub.listener.upgrade() {
                listener.destroy_notify().disconnect(sub.hook);
            }
        }
    }
}

impl fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("subscriptions", &self.len())
            .finish()
    }
}
