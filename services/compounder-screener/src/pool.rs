//! Fixed-size worker pool.
//!
//! Items are queued on a channel and drained by `W` worker futures that run
//! concurrently on the current task. Each item is claimed by exactly one
//! worker; results are stored by item index, so the output order matches
//! the input order regardless of completion order.

use futures::future::join_all;
use std::future::Future;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Bounded-concurrency executor for per-item async work.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// Pool with `workers` concurrent workers (minimum 1).
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `f(item, index)` for every item and return the results in input
    /// order once all items are done.
    ///
    /// `f` must not panic; failures belong in `R`.
    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        F: Fn(T, usize) -> Fut,
        Fut: Future<Output = R>,
    {
        let total = items.len();
        if total == 0 {
            return Vec::new();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for entry in items.into_iter().enumerate() {
            if tx.send(entry).is_err() {
                break;
            }
        }
        drop(tx);

        let queue = Mutex::new(rx);
        let worker_count = self.workers.min(total);
        debug!(items = total, workers = worker_count, "Worker pool started");

        let workers = (0..worker_count).map(|worker| {
            let queue = &queue;
            let f = &f;
            async move {
                let mut done = Vec::new();
                loop {
                    let next = queue.lock().await.recv().await;
                    let Some((index, item)) = next else {
                        break;
                    };
                    done.push((index, f(item, index).await));
                }
                debug!(worker, processed = done.len(), "Worker finished");
                done
            }
        });

        let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
        for (index, result) in join_all(workers).await.into_iter().flatten() {
            slots[index] = Some(result);
        }
        slots.into_iter().flatten().collect()
    }
}
