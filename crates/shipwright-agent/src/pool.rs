//! Bounded worker pool
//!
//! Runs one async worker per item with at most `max_concurrency` in flight:
//! - Shared FIFO queue drained by `min(max_concurrency, len)` workers
//! - Workers are polled concurrently on the calling task (no spawning)
//! - One result slot per input, in input order, whatever the completion order
//! - An `Err` or a panic inside a worker becomes a failure result at that
//!   item's slot via the caller's failure mapper; siblings keep running

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Pool statistics for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Items submitted
    pub total: usize,
    /// Items whose worker returned `Ok`
    pub succeeded: usize,
    /// Items mapped through the failure mapper
    pub failed: usize,
}

/// Why an item failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolFailure {
    /// Worker returned an error
    Error(String),
    /// Worker panicked
    Panic(String),
}

impl fmt::Display for PoolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(e) => f.write_str(e),
            Self::Panic(msg) => write!(f, "worker panicked: {msg}"),
        }
    }
}

/// Results of one pool run
#[derive(Debug, Clone)]
pub struct PoolRun<R> {
    /// One result per input item, in input order
    pub results: Vec<R>,
    /// Run statistics
    pub stats: PoolStats,
}

/// Run `worker` over `items` with bounded concurrency
///
/// `on_failure` receives the original item and the failure and must produce
/// a visibly-marked result for that slot.
pub async fn run_pool<T, R, E, F, Fut, M>(
    items: Vec<T>,
    max_concurrency: usize,
    worker: F,
    on_failure: M,
) -> PoolRun<R>
where
    T: Clone,
    E: fmt::Display,
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    M: Fn(&T, PoolFailure) -> R,
{
    let total = items.len();
    let queue: Mutex<VecDeque<(usize, T)>> =
        Mutex::new(items.iter().cloned().enumerate().collect());
    let slots: Mutex<Vec<Option<R>>> = Mutex::new((0..total).map(|_| None).collect());
    let stats = Mutex::new(PoolStats {
        total,
        ..PoolStats::default()
    });

    let workers = max_concurrency.max(1).min(total);
    tracing::debug!(total, workers, "pool starting");

    let runners = (0..workers).map(|worker_id| {
        let queue = &queue;
        let slots = &slots;
        let stats = &stats;
        let items = &items;
        let worker = &worker;
        let on_failure = &on_failure;
        async move {
            loop {
                let next = queue.lock().pop_front();
                let Some((idx, item)) = next else {
                    break;
                };

                let outcome = AssertUnwindSafe(async { worker(idx, item).await })
                    .catch_unwind()
                    .await;

                let result = match outcome {
                    Ok(Ok(result)) => {
                        stats.lock().succeeded += 1;
                        result
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(worker_id, item = idx, error = %e, "pool item failed");
                        stats.lock().failed += 1;
                        on_failure(&items[idx], PoolFailure::Error(e.to_string()))
                    }
                    Err(panic) => {
                        let msg = panic_message(panic.as_ref());
                        tracing::error!(worker_id, item = idx, panic = %msg, "pool worker panicked");
                        stats.lock().failed += 1;
                        on_failure(&items[idx], PoolFailure::Panic(msg))
                    }
                };
                slots.lock()[idx] = Some(result);
            }
        }
    });
    join_all(runners).await;

    let results: Vec<R> = slots.into_inner().into_iter().flatten().collect();
    let stats = stats.into_inner();
    debug_assert_eq!(results.len(), total);
    tracing::debug!(
        total = stats.total,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "pool finished"
    );

    PoolRun { results, stats }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
