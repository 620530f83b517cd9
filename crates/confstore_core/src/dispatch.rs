//! Fan-out of change events to watching listeners.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::backend::Backend;
use crate::context::ExecutionContext;
use crate::event::BackendEvent;
use crate::listener::{self, SettingsListener};
use crate::watch::WatchRegistry;

/// One pending delivery of an event to one listener.
///
/// A unit owns strong claims on the listener and the backend plus a shared
/// copy of the event, so it stays valid whatever the emitter or the
/// listener's other owners do after it was built. It is consumed by
/// delivery, which happens exactly once.
pub struct DispatchUnit {
    listener: Arc<dyn SettingsListener>,
    backend: Backend,
    event: Arc<BackendEvent>,
    context: Option<ExecutionContext>,
}

impl DispatchUnit {
    /// Returns the event being delivered.
    #[must_use]
    pub fn event(&self) -> &BackendEvent {
        &self.event
    }

    /// Returns the destination context, `None` for immediate delivery.
    #[must_use]
    pub fn context(&self) -> Option<&ExecutionContext> {
        self.context.as_ref()
    }

    /// Runs the listener callback on the current thread.
    pub fn deliver(self) {
        trace!(event = %self.event, "Delivering event");
        listener::deliver(self.listener.as_ref(), &self.backend, &self.event);
    }

    /// Delivers immediately or hands the unit to its context.
    ///
    /// Never blocks. A unit whose context has shut down is dropped with a
    /// warning.
    pub fn route(mut self) {
        match self.context.take() {
            None => self.deliver(),
            Some(context) => {
                if let Err(err) = context.invoke(move || self.deliver()) {
                    warn!(context = %context.name(), error = %err, "Dropping event for closed context");
                }
            }
        }
    }
}

impl fmt::Debug for DispatchUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchUnit")
            .field("event", &self.event)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Builds one unit per live subscription of `registry`.
///
/// The registry lock is held only while the claims are taken.
pub fn build_units(registry: &WatchRegistry, backend: &Backend, event: BackendEvent) -> Vec<DispatchUnit> {
    let event = Arc::new(event);
    registry
        .snapshot()
        .into_iter()
        .map(|sub| DispatchUnit {
            listener: sub.listener,
            backend: backend.clone(),
            event: Arc::clone(&event),
            context: sub.context,
        })
        .collect()
}

/// Delivers `event` to every listener watching `registry`.
///
/// Listeners without a context are called before this returns, on the
/// calling thread. The others have the call queued on their context.
/// Returns the number of units routed.
pub fn dispatch(registry: &WatchRegistry, backend: &Backend, event: BackendEvent) -> usize {
    let units = build_units(registry, backend, event);
    let count = units.len();
    if let Some(first) = units.first() {
        debug!(event = %first.event, listeners = count, "Dispatching event");
    }
    for unit in units {
        unit.route();
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendBase, SettingsBackend};
    use crate::listener::{ChannelListener, DestroyNotify};
    use crate::types::{OriginTag, WriteTree};
    use confstore_codec::{Value, ValueType};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Weak;
    use std::thread;
    use std::time::Duration;

    struct Blank {
        base: BackendBase,
    }

    impl SettingsBackend for Blank {
        fn base(&self) -> &BackendBase {
            &self.base
        }

        fn read(&self, _key: &str, _ty: &ValueType, _default_value: bool) -> Option<Value> {
            None
        }

        fn read_user_value(&self, _key: &str, _ty: &ValueType) -> Option<Value> {
            None
        }

        fn write_tree(&self, _tree: &WriteTree, _origin: Option<OriginTag>) -> bool {
            true
        }
    }

    fn backend() -> Backend {
        Backend::new(Arc::new_cyclic(|this: &Weak<Blank>| Blank {
            base: BackendBase::new(this.clone()),
        }))
    }

    fn changed(key: &str) -> BackendEvent {
        BackendEvent::Changed {
            key: key.into(),
            origin: None,
        }
    }

    #[derive(Default)]
    struct Counter {
        destroy: DestroyNotify,
        hits: AtomicUsize,
        threads: Mutex<Vec<thread::ThreadId>>,
    }

    impl SettingsListener for Counter {
        fn destroy_notify(&self) -> &DestroyNotify {
            &self.destroy
        }

        fn changed(&self, _backend: &Backend, _key: &str, _origin: Option<OriginTag>) {
            self.hits.fetch_add(1, Ordering::SeqCst);
            self.threads.lock().push(thread::current().id());
        }
    }

    #[test]
    fn every_listener_gets_the_event_once() {
        let backend = backend();
        let listeners: Vec<Arc<Counter>> = (0..4).map(|_| Arc::new(Counter::default())).collect();
        for listener in &listeners {
            backend.watch(listener, None);
        }

        let routed = dispatch(backend.inner().base().watches(), &backend, changed("/k"));
        assert_eq!(routed, 4);
        for listener in &listeners {
            assert_eq!(listener.hits.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn unwatched_listener_gets_nothing() {
        let backend = backend();
        let kept = Arc::new(Counter::default());
        let gone = Arc::new(Counter::default());
        backend.watch(&kept, None);
        backend.watch(&gone, None);
        backend.unwatch(&gone).unwrap();

        backend.changed("/k", None).unwrap();
        assert_eq!(kept.hits.load(Ordering::SeqCst), 1);
        assert_eq!(gone.hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn context_delivery_is_deferred() {
        let backend = backend();
        let context = ExecutionContext::new("main");
        let (listener, events) = ChannelListener::new();
        backend.watch(&listener, Some(context.clone()));

        backend.changed("/a", None).unwrap();
        backend.changed("/b", None).unwrap();
        assert!(events.try_recv().is_err());
        assert_eq!(context.pending(), 2);

        assert_eq!(context.run_pending(), 2);
        assert_eq!(events.try_recv().unwrap(), changed("/a"));
        assert_eq!(events.try_recv().unwrap(), changed("/b"));
    }

    #[test]
    fn spawned_context_runs_callbacks_on_worker() {
        let backend = backend();
        let context = ExecutionContext::spawn("listener").unwrap();
        let listener = Arc::new(Counter::default());
        backend.watch(&listener, Some(context.clone()));

        backend.changed("/k", None).unwrap();
        assert!(context.wait_idle(Duration::from_secs(5)));

        assert_eq!(listener.hits.load(Ordering::SeqCst), 1);
        assert_eq!(listener.threads.lock()[0], context.thread_id().unwrap());
    }

    #[test]
    fn queued_unit_keeps_listener_alive() {
        let backend = backend();
        let context = ExecutionContext::new("later");
        let listener = Arc::new(Counter::default());
        backend.watch(&listener, Some(context.clone()));

        backend.changed("/k", None).unwrap();
        let weak = Arc::downgrade(&listener);
        drop(listener);
        assert!(weak.upgrade().is_some());

        context.run_pending();
        assert!(weak.upgrade().is_none());
        assert!(backend.inner().base().watches().is_empty());
    }

    #[test]
    fn units_copy_the_event() {
        let backend = backend();
        let listener = Arc::new(Counter::default());
        backend.watch(&listener, Some(ExecutionContext::new("ctx")));

        let units = build_units(backend.inner().base().watches(), &backend, changed("/copied"));
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].event().name(), "/copied");
        assert!(units[0].context().is_some());
    }

    /// Unwatches itself from inside the callback.
    struct SelfRemoving {
        destroy: DestroyNotify,
        me: Mutex<Option<Weak<SelfRemoving>>>,
        hits: AtomicUsize,
    }

    impl SettingsListener for SelfRemoving {
        fn destroy_notify(&self) -> &DestroyNotify {
            &self.destroy
        }

        fn changed(&self, backend: &Backend, _key: &str, _origin: Option<OriginTag>) {
            self.hits.fetch_add(1, Ordering::SeqCst);
            let me = self.me.lock().as_ref().and_then(Weak::upgrade);
            if let Some(me) = me {
                backend.unwatch(&me).unwrap();
            }
        }
    }

    #[test]
    fn callback_may_reenter_registry() {
        let backend = backend();
        let listener = Arc::new(SelfRemoving {
            destroy: DestroyNotify::new(),
            me: Mutex::new(None),
            hits: AtomicUsize::new(0),
        });
        *listener.me.lock() = Some(Arc::downgrade(&listener));
        backend.watch(&listener, None);

        backend.changed("/k", None).unwrap();
        backend.changed("/k", None).unwrap();
        assert_eq!(listener.hits.load(Ordering::SeqCst), 1);
    }
}
