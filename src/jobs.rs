//! Bounded pool for fire-and-forget background work.
//!
//! Tasks are detached from the request that submitted them: they keep
//! running after the response is sent. At most `max_concurrent` run at
//! once; once `max_pending` are queued or running, new submissions are
//! dropped and counted.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPoolStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
    pub pending: usize,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Clone)]
pub struct TaskPool {
    permits: Arc<Semaphore>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    counters: Arc<Counters>,
    idle: Arc<Notify>,
}

/// Decrements the pending count even if the task panics.
struct PendingGuard {
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl TaskPool {
    #[must_use]
    pub fn new(max_concurrent: usize, max_pending: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            pending: Arc::new(AtomicUsize::new(0)),
            max_pending: max_pending.max(max_concurrent),
            counters: Arc::new(Counters::default()),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Queues `task`. Returns `false` when the pool is saturated and the
    /// task was dropped.
    pub fn submit<F>(&self, name: &'static str, task: F) -> bool
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let reserved = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_pending).then_some(n + 1)
            })
            .is_ok();

        if !reserved {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("animeverse_jobs_total", "outcome" => "dropped").increment(1);
            warn!(task = name, max_pending = self.max_pending, "Background queue full, dropping task");
            return false;
        }

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            idle: Arc::clone(&self.idle),
        };
        let permits = Arc::clone(&self.permits);
        let counters = Arc::clone(&self.counters);

        tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            match task.await {
                Ok(()) => {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("animeverse_jobs_total", "outcome" => "completed").increment(1);
                    debug!(task = name, "Background task finished");
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("animeverse_jobs_total", "outcome" => "failed").increment(1);
                    warn!(task = name, error = %e, "Background task failed");
                }
            }
        });

        true
    }

    #[must_use]
    pub fn stats(&self) -> TaskPoolStats {
        TaskPoolStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Acquire),
        }
    }

    /// Waits until nothing is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn runs_tasks_and_counts_outcomes() {
        let pool = TaskPool::new(2, 8);
        assert!(pool.submit("ok", async { Ok(()) }));
        assert!(pool.submit("fail", async { anyhow::bail!("boom") }));

        pool.wait_idle().await;
        let stats = pool.stats();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn drops_when_saturated() {
        let pool = TaskPool::new(1, 1);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        assert!(pool.submit("blocker", async move {
            let _ = rx.await;
            Ok(())
        }));
        assert!(!pool.submit("extra", async { Ok(()) }));
        assert_eq!(pool.stats().dropped, 1);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), pool.wait_idle())
            .await
            .unwrap();
        assert_eq!(pool.stats().completed, 1);
    }

    #[tokio::test]
    async fn bounds_concurrency() {
        let pool = TaskPool::new(2, 16);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.submit("probe", async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
        }

        pool.wait_idle().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.stats().completed, 8);
    }
}
