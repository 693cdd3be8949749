use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::report::{ErrorKind, RunReport, TaskFailure};

/// A task returns the join handles of the children it spawned; the pool
/// awaits them after the worker permit is released, so a saturated pool
/// can always finish a subtree that submits into itself.
pub type TaskFuture =
    Pin<Box<dyn Future<Output = Result<Vec<JoinHandle<()>>, TaskFailure>> + Send>>;

/// Fixed-width worker pool backed by a semaphore of worker permits.
///
/// The logical queue is unbounded; `queue_slots` optionally bounds how
/// many submissions may be pending, which blocks cross-pool submitters
/// for backpressure. Failures are counted and recorded in the shared
/// [`RunReport`] without affecting sibling tasks.
pub struct TaskPool {
    name: &'static str,
    workers: Arc<Semaphore>,
    slots: Option<Arc<Semaphore>>,
    failures: Arc<AtomicUsize>,
    report: Arc<RunReport>,
    cancel: CancellationToken,
}

impl TaskPool {
    pub fn new(
        name: &'static str,
        workers: usize,
        queue_slots: Option<usize>,
        report: Arc<RunReport>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            slots: queue_slots.map(|slots| Arc::new(Semaphore::new(slots.max(1)))),
            failures: Arc::new(AtomicUsize::new(0)),
            report,
            cancel,
        }
    }

    /// Submits a task, blocking on a queue slot when the pool is bounded.
    /// Returns `None` once the pool stopped accepting work.
    pub async fn submit(&self, label: String, task: TaskFuture) -> Option<JoinHandle<()>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let slot = match &self.slots {
            Some(slots) => match slots.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => return None,
            },
            None => None,
        };

        let workers = self.workers.clone();
        let failures = self.failures.clone();
        let report = self.report.clone();
        let cancel = self.cancel.clone();
        Some(tokio::spawn(async move {
            let permit = match workers.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            drop(slot);
            if cancel.is_cancelled() {
                return;
            }

            let children = match task.await {
                Ok(children) => children,
                Err(failure) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    report.record(failure);
                    return;
                }
            };
            // Free the worker before waiting on children, otherwise a
            // subtree deeper than the pool width would wedge.
            drop(permit);
            for child in children {
                if let Err(join_err) = child.await {
                    failures.fetch_add(1, Ordering::Relaxed);
                    report.record(TaskFailure::new(
                        label.clone(),
                        ErrorKind::LocalIo,
                        format!("task aborted: {join_err}"),
                    ));
                }
            }
        }))
    }

    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Rejects new submissions; already-submitted tasks run to completion.
    pub fn shutdown(&self) {
        self.workers.close();
        if let Some(slots) = &self.slots {
            slots.close();
        }
    }
}

/// Per-key async mutex table serializing remote creations on
/// `(parent_uri, name)`: two tasks discovering the same missing child race
/// on the lock and the loser observes the created node.
#[derive(Default)]
pub struct KeyedLocks {
    inner: std::sync::Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub async fn acquire(&self, parent_uri: &str, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.inner.lock().expect("lock table poisoned");
            table
                .entry((parent_uri.to_string(), name.to_string()))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn make_pool(workers: usize, slots: Option<usize>) -> (TaskPool, Arc<RunReport>) {
        let report = Arc::new(RunReport::default());
        let pool = TaskPool::new(
            "test",
            workers,
            slots,
            report.clone(),
            CancellationToken::new(),
        );
        (pool, report)
    }

    #[tokio::test]
    async fn tasks_run_and_failures_are_counted() {
        let (pool, report) = make_pool(2, None);

        let ok = pool
            .submit("ok".into(), Box::pin(async { Ok(Vec::new()) }))
            .await
            .unwrap();
        let bad = pool
            .submit(
                "bad".into(),
                Box::pin(async {
                    Err(TaskFailure::new(
                        "/photos/broken.jpg",
                        ErrorKind::LocalIo,
                        "unreadable",
                    ))
                }),
            )
            .await
            .unwrap();
        ok.await.unwrap();
        bad.await.unwrap();

        assert_eq!(pool.failure_count(), 1);
        assert_eq!(report.len(), 1);
        assert_eq!(report.failures()[0].path, "/photos/broken.jpg");
    }

    #[tokio::test]
    async fn saturated_pool_finishes_self_submitted_chains() {
        let (pool, _report) = make_pool(1, None);
        let pool = Arc::new(pool);

        fn chain(pool: Arc<TaskPool>, depth: usize) -> TaskFuture {
            Box::pin(async move {
                if depth == 0 {
                    return Ok(Vec::new());
                }
                let child = pool
                    .clone()
                    .submit(format!("depth-{depth}"), chain(pool, depth - 1))
                    .await;
                Ok(child.into_iter().collect())
            })
        }

        let root = pool
            .clone()
            .submit("root".into(), chain(pool.clone(), 8))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), root)
            .await
            .expect("self-submission deadlocked")
            .unwrap();
        assert_eq!(pool.failure_count(), 0);
    }

    #[tokio::test]
    async fn bounded_pool_completes_a_burst() {
        let (pool, _report) = make_pool(2, Some(2));
        let mut handles = Vec::new();
        for i in 0..16 {
            let handle = pool
                .submit(
                    format!("burst-{i}"),
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        Ok(Vec::new())
                    }),
                )
                .await
                .unwrap();
            handles.push(handle);
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(pool.failure_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_submissions() {
        let (pool, _report) = make_pool(1, Some(4));
        pool.shutdown();
        let handle = pool
            .submit("late".into(), Box::pin(async { Ok(Vec::new()) }))
            .await;
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn keyed_locks_serialize_same_key_only() {
        let locks = Arc::new(KeyedLocks::default());
        let guard = locks.acquire("/api/v2/node/p", "2015").await;

        // A different key is immediately available.
        let other = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire("/api/v2/node/p", "2016"),
        )
        .await;
        assert!(other.is_ok());

        // The same key waits until the guard drops.
        let same = tokio::time::timeout(
            Duration::from_millis(50),
            locks.acquire("/api/v2/node/p", "2015"),
        )
        .await;
        assert!(same.is_err());
        drop(guard);
        let same = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire("/api/v2/node/p", "2015"),
        )
        .await;
        assert!(same.is_ok());
    }
}
