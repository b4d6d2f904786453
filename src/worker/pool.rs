//! Fan-out/fan-in task pool.
//!
//! Every item gets its own tokio task. `run_bounded` caps the number of tasks
//! doing work at once with a semaphore; `run_unbounded` lets them all run.
//! Both return only after every task has finished. A failing or panicking
//! task is logged and counted; it never aborts its siblings, and nothing is
//! cancelled once started.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Completion summary for one fan-out stage.
#[derive(Debug)]
pub struct PoolOutcome<R> {
    /// Results of the tasks that succeeded, in input order.
    pub completed: Vec<R>,
    /// Number of tasks that returned an error or panicked.
    pub failed: usize,
}

impl<R> PoolOutcome<R> {
    /// Total number of tasks that ran.
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed
    }
}

/// Run `f` over every item with at most `limit` tasks in flight.
///
/// A `limit` of zero is treated as one.
pub async fn run_bounded<T, R, E, F, Fut>(
    stage: &'static str,
    items: Vec<T>,
    limit: usize,
    f: F,
) -> PoolOutcome<R>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    run(stage, items, Some(permits), f).await
}

/// Run `f` over every item with no concurrency cap.
pub async fn run_unbounded<T, R, E, F, Fut>(stage: &'static str, items: Vec<T>, f: F) -> PoolOutcome<R>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    run(stage, items, None, f).await
}

async fn run<T, R, E, F, Fut>(
    stage: &'static str,
    items: Vec<T>,
    permits: Option<Arc<Semaphore>>,
    f: F,
) -> PoolOutcome<R>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let count = items.len();
    debug!(stage, count, "Starting stage");

    let handles: Vec<_> = items
        .into_iter()
        .map(|item| {
            let f = f.clone();
            let permits = permits.clone();
            tokio::spawn(async move {
                let _permit = match permits {
                    Some(sem) => Some(sem.acquire_owned().await),
                    None => None,
                };
                f(item).await
            })
        })
        .collect();

    let mut completed = Vec::with_capacity(count);
    let mut failed = 0;
    for joined in join_all(handles).await {
        match joined {
            Ok(Ok(result)) => completed.push(result),
            Ok(Err(e)) => {
                warn!(stage, error = %e, "Task failed");
                failed += 1;
            }
            Err(e) => {
                error!(stage, error = %e, "Task panicked");
                failed += 1;
            }
        }
    }

    debug!(stage, succeeded = completed.len(), failed, "Stage complete");
    PoolOutcome { completed, failed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
        finished: AtomicUsize,
    }

    #[tokio::test]
    async fn bounded_never_exceeds_limit_and_waits_for_all() {
        let gauge = Arc::new(Gauge::default());
        let items: Vec<usize> = (0..20).collect();

        let g = Arc::clone(&gauge);
        let outcome = run_bounded("test", items, 5, move |i| {
            let g = Arc::clone(&g);
            async move {
                let now = g.current.fetch_add(1, Ordering::SeqCst) + 1;
                g.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                g.current.fetch_sub(1, Ordering::SeqCst);
                g.finished.fetch_add(1, Ordering::SeqCst);
                if i % 4 == 0 {
                    Err(format!("item {i} failed"))
                } else {
                    Ok(i)
                }
            }
        })
        .await;

        assert!(gauge.peak.load(Ordering::SeqCst) <= 5);
        assert_eq!(gauge.finished.load(Ordering::SeqCst), 20);
        assert_eq!(outcome.total(), 20);
        assert_eq!(outcome.failed, 5);
        assert_eq!(outcome.completed.len(), 15);
    }

    #[tokio::test]
    async fn bounded_preserves_input_order_of_results() {
        let outcome = run_bounded("order", vec![3u64, 1, 2], 2, |ms| async move {
            tokio::time::sleep(Duration::from_millis(ms * 5)).await;
            Ok::<_, String>(ms)
        })
        .await;
        assert_eq!(outcome.completed, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn panicking_task_is_isolated() {
        let outcome = run_unbounded("panic", vec![0, 1, 2], |i| async move {
            if i == 1 {
                panic!("boom");
            }
            Ok::<_, String>(i)
        })
        .await;
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.completed, vec![0, 2]);
    }

    #[tokio::test]
    async fn unbounded_runs_everything_concurrently() {
        let gauge = Arc::new(Gauge::default());
        let g = Arc::clone(&gauge);
        run_unbounded("wide", (0..10).collect::<Vec<_>>(), move |_| {
            let g = Arc::clone(&g);
            async move {
                let now = g.current.fetch_add(1, Ordering::SeqCst) + 1;
                g.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                g.current.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(())
            }
        })
        .await;
        assert!(gauge.peak.load(Ordering::SeqCst) > 5);
    }

    #[tokio::test]
    async fn zero_limit_still_makes_progress() {
        let outcome = run_bounded("zero", vec![1, 2], 0, |i| async move { Ok::<_, String>(i) }).await;
        assert_eq!(outcome.completed, vec![1, 2]);
    }

    #[tokio::test]
    async fn empty_input_returns_immediately() {
        let outcome = run_bounded("empty", Vec::<u8>::new(), 5, |i| async move { Ok::<_, String>(i) }).await;
        assert_eq!(outcome.total(), 0);
    }
}
