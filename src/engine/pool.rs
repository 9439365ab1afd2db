//! Bounded worker pool: fan a materialized backlog out to N workers.
//!
//! The backlog is pushed into a channel sized to its length, then the
//! sender is dropped so workers see closed-and-drained once the last item
//! is consumed. Each worker selects between the shared cancellation token
//! and the next item. Per-item errors are logged and the item abandoned;
//! the pool keeps draining. `run` returns only after every worker has
//! exited.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::model::RunStats;

/// Per-item work performed by each pool worker: the enrichment call plus
/// the result write. An error abandons the item, nothing more.
#[async_trait]
pub trait Process: Send + Sync + 'static {
    type Item: Send + 'static;

    async fn process(&self, worker_id: usize, item: Self::Item) -> Result<()>;
}

#[derive(Default)]
struct Counters {
    attempted: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

pub struct WorkerPool {
    workers: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(workers: usize, cancel: CancellationToken) -> Self {
        Self {
            workers: workers.max(1),
            cancel,
        }
    }

    /// Dispatch every item to exactly one worker and block until all
    /// workers have exited. No ordering is guaranteed among completions.
    pub async fn run<P: Process>(&self, items: Vec<P::Item>, processor: Arc<P>) -> RunStats {
        if items.is_empty() {
            return RunStats::default();
        }

        let total = items.len();
        let (tx, rx) = mpsc::channel::<P::Item>(total);
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let mut handles = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let rx = Arc::clone(&rx);
            let processor = Arc::clone(&processor);
            let counters = Arc::clone(&counters);
            let cancel = self.cancel.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    // Biased so a signaled cancellation always wins over
                    // further items.
                    let item = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            info!(worker_id, "worker stopping on cancellation");
                            return;
                        }
                        item = async { rx.lock().await.recv().await } => item,
                    };
                    let Some(item) = item else {
                        debug!(worker_id, "backlog drained");
                        return;
                    };

                    counters.attempted.fetch_add(1, Ordering::Relaxed);
                    match processor.process(worker_id, item).await {
                        Ok(()) => {
                            counters.succeeded.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            warn!(worker_id, error = %e, "item abandoned");
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }));
        }

        // The channel holds the whole backlog, so these sends never block;
        // dropping the sender closes the channel for the drain phase.
        for item in items {
            if tx.send(item).await.is_err() {
                break;
            }
        }
        drop(tx);

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task panicked");
            }
        }

        RunStats {
            attempted: counters.attempted.load(Ordering::Relaxed),
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        }
    }
}
