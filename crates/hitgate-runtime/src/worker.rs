//! Background task driving a [`Collector`].
//!
//! The worker sleeps until it is told that some algorithm changed, then runs
//! one collection cycle. A requested flush replaces the next cycle. Stopping is
//! cooperative: a cycle in progress always completes.

use crate::algorithm::TriggerAlgorithm;
use crate::collector::Collector;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Cloneable handle used by producers to wake the worker.
#[derive(Debug, Clone, Default)]
pub struct CollectorSignal {
    changed: Arc<Notify>,
    flush: Arc<AtomicBool>,
}

impl CollectorSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Some algorithm has new output or a new earliest time of interest.
    pub fn set_changed(&self) {
        self.changed.notify_one();
    }

    /// Release everything on the next wake-up.
    pub fn request_flush(&self) {
        self.flush.store(true, Ordering::Release);
        self.changed.notify_one();
    }
}

/// A collector running on its own tokio task.
pub struct CollectorThread<A: TriggerAlgorithm + 'static> {
    name: String,
    algorithms: Arc<Mutex<Vec<A>>>,
    collector: Arc<Mutex<Collector>>,
    signal: CollectorSignal,
    cycles: Arc<AtomicU64>,
    stopped: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl<A: TriggerAlgorithm + 'static> CollectorThread<A> {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(
        name: impl Into<String>,
        algorithms: Arc<Mutex<Vec<A>>>,
        collector: Collector,
    ) -> Self {
        let name = name.into();
        let collector = Arc::new(Mutex::new(collector));
        let signal = CollectorSignal::new();
        let cycles = Arc::new(AtomicU64::new(0));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(Self::run(
            name.clone(),
            Arc::clone(&algorithms),
            Arc::clone(&collector),
            signal.clone(),
            Arc::clone(&cycles),
            shutdown_rx,
        ));

        Self {
            name,
            algorithms,
            collector,
            signal,
            cycles,
            stopped: AtomicBool::new(false),
            shutdown_tx,
            handle: Some(handle),
        }
    }

    async fn run(
        name: String,
        algorithms: Arc<Mutex<Vec<A>>>,
        collector: Arc<Mutex<Collector>>,
        signal: CollectorSignal,
        cycles: Arc<AtomicU64>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!("Collector '{}' started", name);

        loop {
            tokio::select! {
                biased;

                _ = signal.changed.notified() => {
                    let flush = signal.flush.swap(false, Ordering::AcqRel);
                    Self::wake(&name, &algorithms, &collector, flush);
                    cycles.fetch_add(1, Ordering::Release);
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        // A flush requested just before stop still runs.
                        if signal.flush.swap(false, Ordering::AcqRel) {
                            Self::wake(&name, &algorithms, &collector, true);
                            cycles.fetch_add(1, Ordering::Release);
                        }
                        info!("Collector '{}' shutting down", name);
                        break;
                    }
                }
            }
        }
    }

    fn wake(name: &str, algorithms: &Mutex<Vec<A>>, collector: &Mutex<Collector>, flush: bool) {
        let mut algorithms = algorithms.lock().unwrap_or_else(|e| e.into_inner());
        let mut collector = collector.lock().unwrap_or_else(|e| e.into_inner());
        if flush {
            let pushed = collector.flush(algorithms.as_mut_slice());
            debug!("Collector '{}' flushed {} requests", name, pushed);
        } else if let Err(e) = collector.run_cycle(algorithms.as_mut_slice()) {
            error!("Collector '{}' cycle failed: {}", name, e);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle for producers; see [`CollectorSignal`].
    pub fn signal(&self) -> CollectorSignal {
        self.signal.clone()
    }

    pub fn set_changed(&self) {
        self.signal.set_changed();
    }

    pub fn request_flush(&self) {
        self.signal.request_flush();
    }

    /// Number of completed wake-ups (cycles and flushes).
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    pub fn algorithms(&self) -> Arc<Mutex<Vec<A>>> {
        Arc::clone(&self.algorithms)
    }

    pub fn collector(&self) -> Arc<Mutex<Collector>> {
        Arc::clone(&self.collector)
    }

    /// Restart request numbering at the next run boundary.
    pub fn reset_uid(&self) {
        self.collector
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reset_uid();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Ask the worker to exit. Calling it again has no effect.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for the worker task to finish.
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Collector '{}' task ended abnormally: {}", self.name, e);
            }
        }
    }
}

impl<A: TriggerAlgorithm + 'static> Drop for CollectorThread<A> {
    fn drop(&mut self) {
        self.stop();
    }
}
