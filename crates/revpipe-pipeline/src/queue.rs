//! Deferred execution of units of work.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::fetch::UnitOutcome;

/// A named unit of work that runs once.
pub struct Job {
    name: String,
    task: BoxFuture<'static, ()>,
}

impl Job {
    pub fn new<F>(name: impl Into<String>, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            task: Box::pin(task),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(self) {
        self.task.await;
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("name", &self.name).finish()
    }
}

/// Run-now and run-later scheduling. Jobs are fire-and-forget.
pub trait JobQueue: Send + Sync {
    fn schedule(&self, job: Job, delay: Duration);

    fn enqueue(&self, job: Job) {
        self.schedule(job, Duration::ZERO);
    }
}

/// Runs every job on its own tokio task. Must be used inside a runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioJobQueue;

impl JobQueue for TokioJobQueue {
    fn schedule(&self, job: Job, delay: Duration) {
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            tracing::debug!(job = job.name(), "queue: job started");
            job.run().await;
        });
    }
}

/// Collects jobs and runs them sequentially on [`drain`](Self::drain),
/// ignoring their delays. Records every delay it was asked for.
#[derive(Debug, Default)]
pub struct InlineQueue {
    pending: Mutex<Vec<Job>>,
    history: Mutex<Vec<(String, Duration)>>,
}

impl InlineQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays of every job scheduled so far, in scheduling order.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.history
            .lock()
            .map(|h| h.iter().map(|(_, d)| *d).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.history
            .lock()
            .map(|h| h.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }

    /// Run pending jobs, including any they schedule, until none remain.
    /// Returns how many ran.
    pub async fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            let batch = match self.pending.lock() {
                Ok(mut pending) => std::mem::take(&mut *pending),
                Err(_) => return ran,
            };
            if batch.is_empty() {
                return ran;
            }
            for job in batch {
                job.run().await;
                ran += 1;
            }
        }
    }
}

impl JobQueue for InlineQueue {
    fn schedule(&self, job: Job, delay: Duration) {
        if let Ok(mut history) = self.history.lock() {
            history.push((job.name().to_string(), delay));
        }
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(job);
        }
    }
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Bounded retry with exponential backoff around one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<F, Fut>(&self, label: &str, mut op: F) -> UnitOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = UnitOutcome>,
    {
        let mut attempt = 1;
        loop {
            let outcome = op().await;
            let UnitOutcome::Failed(failure) = &outcome else {
                return outcome;
            };
            if !failure.is_retryable() {
                return outcome;
            }
            if attempt >= self.max_attempts {
                tracing::error!(
                    unit = label,
                    attempts = attempt,
                    failure = %failure,
                    "queue: unit failed after final attempt"
                );
                return outcome;
            }
            let delay = self.delay_after(attempt);
            tracing::warn!(
                unit = label,
                attempt,
                failure = %failure,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "queue: unit failed, retrying"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }
}
