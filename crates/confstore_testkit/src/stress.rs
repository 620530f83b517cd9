//! Stress tests for confstore.
//!
//! These exercise the watch registry under concurrent writes, listener
//! churn and listener destruction.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use confstore_codec::Value;
use confstore_core::{Backend, DestroyNotify, OriginTag, SettingsListener};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Writes performed.
    pub writes: usize,
    /// Callbacks delivered across all listeners.
    pub deliveries: usize,
    /// Listeners created and destroyed during the run.
    pub listeners_churned: usize,
    /// Total duration.
    pub duration: Duration,
}

impl StressTestResult {
    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Writes: {}", self.writes);
        println!("Deliveries: {}", self.deliveries);
        println!("Listeners churned: {}", self.listeners_churned);
        println!("Duration: {:?}", self.duration);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Writes per writer thread.
    pub writes_per_thread: usize,
    /// Number of writer threads.
    pub writers: usize,
    /// Number of threads creating and dropping listeners.
    pub churners: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            writes_per_thread: 500,
            writers: 4,
            churners: 2,
        }
    }
}

/// A listener that counts deliveries into a shared counter.
pub struct CountingListener {
    destroy: DestroyNotify,
    hits: Arc<AtomicUsize>,
}

impl CountingListener {
    /// Creates a listener adding to `hits`.
    pub fn new(hits: Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self {
            destroy: DestroyNotify::new(),
            hits,
        })
    }
}

impl SettingsListener for CountingListener {
    fn destroy_notify(&self) -> &DestroyNotify {
        &self.destroy
    }

    fn changed(&self, _backend: &Backend, _key: &str, _origin: Option<OriginTag>) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }
}

/// Writes from several threads while other threads keep watching and
/// dropping short-lived listeners.
///
/// Every churned listener is dropped without `unwatch`, so the registry
/// depends entirely on destruction hooks to forget it. On return the
/// registry of `backend` holds only listeners watched before the call.
pub fn run_watch_churn(backend: &Backend, config: &StressConfig) -> StressTestResult {
    let hits = Arc::new(AtomicUsize::new(0));
    let churned = Arc::new(AtomicUsize::new(0));
    let stop = Arc::new(AtomicBool::new(false));
    let start = Instant::now();

    let churners: Vec<_> = (0..config.churners)
        .map(|_| {
            let backend = backend.clone();
            let hits = Arc::clone(&hits);
            let churned = Arc::clone(&churned);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let listener = CountingListener::new(Arc::clone(&hits));
                    backend.watch(&listener, None);
                    thread::yield_now();
                    drop(listener);
                    churned.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    let writers: Vec<_> = (0..config.writers)
        .map(|writer| {
            let backend = backend.clone();
            let writes = config.writes_per_thread;
            thread::spawn(move || {
                for i in 0..writes {
                    let key = format!("/stress/w{writer}/k{}", i % 8);
                    let value = Value::Integer(i64::try_from(i).unwrap_or(i64::MAX));
                    backend
                        .write(&key, Some(value), None)
                        .expect("Generated key is valid");
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().expect("Writer thread panicked");
    }
    stop.store(true, Ordering::Relaxed);
    for churner in churners {
        churner.join().expect("Churn thread panicked");
    }

    StressTestResult {
        writes: config.writers * config.writes_per_thread,
        deliveries: hits.load(Ordering::Relaxed),
        listeners_churned: churned.load(Ordering::Relaxed),
        duration: start.elapsed(),
    }
}
