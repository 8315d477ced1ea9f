// SPDX-License-Identifier: GPL-3.0-or-later

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, warn};

/// Runs independent units of work on tokio tasks, at most `max_concurrent`
/// at a time.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl WorkerPool {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Run `work` over every item. Results come back in input order; a task
    /// that panicked yields its `JoinError` in its own slot. `on_complete`
    /// is called as each task finishes, in completion order.
    pub async fn run<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        work: F,
        mut on_complete: impl FnMut(usize, &Result<R, JoinError>),
    ) -> Vec<Result<R, JoinError>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
    {
        let total = items.len();
        debug!(target: "orchestrator", total, max_concurrent = self.max_concurrent, "starting worker pool");

        let mut pending: FuturesUnordered<_> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let semaphore = Arc::clone(&self.semaphore);
                let task = work(item);
                let handle = tokio::spawn(async move {
                    // The semaphore is never closed; a failed acquire still runs the task.
                    let _permit = semaphore.acquire_owned().await.ok();
                    task.await
                });
                async move { (index, handle.await) }
            })
            .collect();

        let mut slots: Vec<Option<Result<R, JoinError>>> = (0..total).map(|_| None).collect();
        while let Some((index, result)) = pending.next().await {
            if let Err(error) = &result {
                warn!(target: "orchestrator", index, %error, "worker task failed");
            }
            on_complete(index, &result);
            slots[index] = Some(result);
        }

        slots.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn results_keep_input_order() {
        let pool = WorkerPool::new(3);
        let items: Vec<u64> = vec![30, 10, 20, 0];

        let results = pool
            .run(
                items,
                |delay| async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    delay
                },
                |_, _| {},
            )
            .await;

        let values: Vec<u64> = results.into_iter().map(|result| result.expect("task ok")).collect();
        assert_eq!(values, vec![30, 10, 20, 0]);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let work = {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            move |_: usize| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
            }
        };

        pool.run((0..8).collect(), work, |_, _| {}).await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn panicking_task_is_isolated() {
        let pool = WorkerPool::new(2);
        let mut completed = 0;

        let results = pool
            .run(
                vec![1, 2, 3],
                |value: i32| async move {
                    if value == 2 {
                        panic!("boom");
                    }
                    value
                },
                |_, _| completed += 1,
            )
            .await;

        assert_eq!(completed, 3);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].as_ref().is_err_and(|error| error.is_panic()));
        assert!(results[2].is_ok());
    }
}
