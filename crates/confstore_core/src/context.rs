//! Execution contexts for deferred notification delivery.
//!
//! A listener that is not thread-agnostic names the context it wants its
//! callbacks to run on. Delivering to a context means handing a closure to
//! that context's FIFO task queue and returning immediately; the context
//! runs it later, exactly once.
//!
//! Two flavours exist:
//!
//! - [`ExecutionContext::new`] - the owner drives the queue by calling
//!   [`ExecutionContext::run_pending`] (an event-loop iteration)
//! - [`ExecutionContext::spawn`] - a dedicated worker thread drains the queue
//!
//! ```
//! use confstore_core::ExecutionContext;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let context = ExecutionContext::new("ui");
//! let hits = Arc::new(AtomicUsize::new(0));
//!
//! let counter = Arc::clone(&hits);
//! context.invoke(move || { counter.fetch_add(1, Ordering::SeqCst); }).unwrap();
//! assert_eq!(hits.load(Ordering::SeqCst), 0);
//!
//! assert_eq!(context.run_pending(), 1);
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace};

use crate::error::{CoreError, CoreResult};

/// A unit of work queued on a context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Count of queued-but-not-yet-finished tasks, shared with the worker.
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn add(&self) {
        *self.count.lock() += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

struct ContextInner {
    id: u64,
    name: String,
    sender: Sender<Task>,
    // None once a worker thread owns the receiving end
    receiver: Mutex<Option<Receiver<Task>>>,
    pending: Arc<Pending>,
    thread: Option<ThreadId>,
}

/// A handle to a FIFO task queue.
///
/// Handles are cheap to clone; all clones refer to the same queue. Tasks
/// invoked from one thread run in the order they were invoked.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

impl ExecutionContext {
    /// Creates a context driven manually through [`Self::run_pending`].
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            inner: Arc::new(ContextInner {
                id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                sender,
                receiver: Mutex::new(Some(receiver)),
                pending: Arc::new(Pending::default()),
                thread: None,
            }),
        }
    }

    /// Creates a context backed by a dedicated worker thread.
    ///
    /// The worker exits once every handle to the context has been dropped
    /// and the queue is drained.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Io`] if the thread cannot be spawned.
    pub fn spawn(name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Task>();
        let pending = Arc::new(Pending::default());

        let worker_pending = Arc::clone(&pending);
        let worker_name = name.clone();
        let handle = thread::Builder::new()
            .name(format!("confstore-{name}"))
            .spawn(move || {
                debug!(context = %worker_name, "Execution context worker started");
                while let Ok(task) = receiver.recv() {
                    run_task(&worker_name, task);
                    worker_pending.done();
                }
                debug!(context = %worker_name, "Execution context worker stopped");
            })?;

        Ok(Self {
            inner: Arc::new(ContextInner {
                id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
                name,
                sender,
                receiver: Mutex::new(None),
                pending,
                thread: Some(handle.thread().id()),
            }),
        })
    }

    /// Returns the context's unique id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns the context's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the worker thread id for spawned contexts.
    #[must_use]
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.inner.thread
    }

    /// Returns true if both handles refer to the same queue.
    #[must_use]
    pub fn same_context(&self, other: &ExecutionContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Queues `task` to run later on this context. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ContextClosed`] if the worker thread is gone.
    pub fn invoke<F>(&self, task: F) -> CoreResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.pending.add();
        if self.inner.sender.send(Box::new(task)).is_err() {
            self.inner.pending.done();
            return Err(CoreError::context_closed(self.name()));
        }
        trace!(context = %self.inner.name, "Task queued");
        Ok(())
    }

    /// Runs queued tasks on the calling thread until the queue is empty.
    ///
    /// Tasks queued while running are run too. Returns the number of tasks
    /// run. Always returns 0 for spawned contexts, whose worker owns the
    /// queue.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // the lock is released before the task runs so tasks may
            // queue more work or drive the context themselves
            let task = match self.inner.receiver.lock().as_ref() {
                Some(receiver) => receiver.try_recv().ok(),
                None => None,
            };
            let Some(task) = task else { break };
            run_task(&self.inner.name, task);
            self.inner.pending.done();
            ran += 1;
        }
        ran
    }

    /// Returns the number of queued tasks that have not finished yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        *self.inner.pending.count.lock()
    }

    /// Blocks until every queued task has finished or `timeout` elapses.
    ///
    /// Returns true if the context went idle. Only useful for spawned
    /// contexts or when another thread drives a manual context.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.inner.pending.count.lock();
        while *count > 0 {
            if self
                .inner
                .pending
                .idle
                .wait_until(&mut count, deadline)
                .timed_out()
            {
                return *count == 0;
            }
        }
        true
    }
}

fn run_task(context: &str, task: Task) {
    // a panicking listener must not take the whole context down
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        error!(context = %context, "Task panicked on execution context");
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("spawned", &self.inner.thread.is_some())
            .finish_non_exhaustive()
    }
}
