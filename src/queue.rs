//! Serial work queue for downstream jobs.
//!
//! Handler groups receive a [`WorkQueueHandle`] when the dispatcher is built
//! and use it to push follow-up work that must not run inside the handler
//! call. A single worker task drains the queue and runs jobs one at a time
//! in FIFO order.
//!
//! # Architecture
//!
//! ```text
//! Handler 1 ─┐
//! Handler 2 ─┼─► mpsc::Sender<QueuedJob> ─► Worker Task ─► job().await
//! Handler N ─┘
//! ```
//!
//! A failing or panicking job is logged and skipped; it never stops the
//! worker.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::backpressure::JobSlots;
use crate::error::{DispatchError, Result};
use crate::handler::BoxFuture;

/// Default maximum pending jobs before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_JOBS: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum jobs taken off the channel per wake-up.
const MAX_BATCH_SIZE: usize = 64;

/// Tracing target for queue events.
pub(crate) const QUEUE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::queue");

/// A job waiting for the worker.
pub struct QueuedJob {
    label: String,
    job: BoxFuture<'static, anyhow::Result<()>>,
}

impl QueuedJob {
    fn new<F>(label: impl Into<String>, job: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            label: label.into(),
            job: Box::pin(job),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Configuration for the work queue.
#[derive(Debug, Clone)]
pub struct WorkQueueConfig {
    /// Maximum unfinished jobs before `enqueue` waits.
    pub max_pending_jobs: usize,
    /// Channel capacity for the job queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    pub backpressure_timeout: Duration,
}

impl Default for WorkQueueConfig {
    fn default() -> Self {
        Self {
            max_pending_jobs: DEFAULT_MAX_PENDING_JOBS,
            channel_capacity: DEFAULT_QUEUE_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for pushing jobs to the worker task.
///
/// Cheaply cloneable. The worker stops once every handle is dropped.
#[derive(Clone)]
pub struct WorkQueueHandle {
    tx: mpsc::Sender<QueuedJob>,
    slots: JobSlots,
}

impl WorkQueueHandle {
    fn new(tx: mpsc::Sender<QueuedJob>, slots: JobSlots) -> Self {
        Self { tx, slots }
    }

    /// Enqueue a fire-and-forget job.
    ///
    /// Waits while backpressure is active, timing out after the configured
    /// duration.
    pub async fn enqueue<F>(&self, label: impl Into<String>, job: F) -> Result<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let slot = self.slots.acquire().await?;

        self.tx
            .send(QueuedJob::new(label, job))
            .await
            .map_err(|_| DispatchError::QueueClosed)?;

        slot.commit();
        Ok(())
    }

    /// Enqueue without waiting for backpressure.
    ///
    /// Returns `Err(BackpressureTimeout)` immediately if at capacity.
    pub fn try_enqueue<F>(&self, label: impl Into<String>, job: F) -> Result<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let slot = self.slots.try_acquire()?;

        self.tx
            .try_send(QueuedJob::new(label, job))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DispatchError::BackpressureTimeout,
                mpsc::error::TrySendError::Closed(_) => DispatchError::QueueClosed,
            })?;

        slot.commit();
        Ok(())
    }

    /// Enqueue a job and get a ticket for its result.
    pub async fn submit<F, T>(&self, label: impl Into<String>, job: F) -> Result<JobTicket<T>>
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        self.enqueue(label, async move {
            let _ = result_tx.send(job.await);
            Ok(())
        })
        .await?;

        Ok(JobTicket { rx: result_rx })
    }

    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.slots.is_exhausted()
    }

    /// Jobs enqueued but not yet finished.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.slots.in_use()
    }

    /// Whether the worker task is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Result of a job enqueued with [`WorkQueueHandle::submit`].
pub struct JobTicket<T> {
    rx: oneshot::Receiver<anyhow::Result<T>>,
}

impl<T> JobTicket<T> {
    /// Wait for the job to finish.
    ///
    /// Fails with `QueueClosed` if the job was dropped or panicked.
    pub async fn wait(self) -> anyhow::Result<T> {
        self.rx.await.map_err(|_| DispatchError::QueueClosed)?
    }
}

/// Spawn the worker task and return a handle for enqueueing jobs.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_work_queue(config: WorkQueueConfig) -> (WorkQueueHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let slots = JobSlots::new(config.max_pending_jobs, config.backpressure_timeout);

    debug!(
        target: QUEUE_TARGET,
        max_pending = slots.limit(),
        capacity = config.channel_capacity,
        "spawning work queue"
    );

    let handle = WorkQueueHandle::new(tx, slots.clone());
    let task = tokio::spawn(worker_loop(rx, slots));

    (handle, task)
}

/// Spawn the worker task with default configuration.
pub fn spawn_work_queue_default() -> (WorkQueueHandle, JoinHandle<()>) {
    spawn_work_queue(WorkQueueConfig::default())
}

async fn worker_loop(mut rx: mpsc::Receiver<QueuedJob>, slots: JobSlots) {
    loop {
        let first = match rx.recv().await {
            Some(job) => job,
            None => {
                debug!(target: QUEUE_TARGET, "work queue closed");
                return;
            }
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(job) => batch.push(job),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        for job in batch {
            run_job(job).await;
        }

        slots.release(batch_size);
    }
}

async fn run_job(job: QueuedJob) {
    let QueuedJob { label, job } = job;

    match AssertUnwindSafe(job).catch_unwind().await {
        Ok(Ok(())) => debug!(target: QUEUE_TARGET, job = %label, "job finished"),
        Ok(Err(error)) => warn!(target: QUEUE_TARGET, job = %label, %error, "job failed"),
        Err(_) => error!(target: QUEUE_TARGET, job = %label, "job panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[test]
    fn test_config_default() {
        let config = WorkQueueConfig::default();
        assert_eq!(config.max_pending_jobs, DEFAULT_MAX_PENDING_JOBS);
        assert_eq!(config.channel_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.backpressure_timeout, DEFAULT_BACKPRESSURE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_submit_returns_result() {
        let (queue, _task) = spawn_work_queue_default();

        let ticket = queue.submit("answer", async { Ok(42) }).await.unwrap();
        assert_eq!(ticket.wait().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_jobs_run_in_order() {
        let (queue, _task) = spawn_work_queue_default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut tickets = Vec::new();
        for i in 0..10u32 {
            let seen = seen.clone();
            let ticket = queue
                .submit(format!("job-{i}"), async move {
                    seen.lock().await.push(i);
                    Ok(())
                })
                .await
                .unwrap();
            tickets.push(ticket);
        }

        for ticket in tickets {
            ticket.wait().await.unwrap();
        }

        assert_eq!(*seen.lock().await, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failing_job_does_not_stop_worker() {
        let (queue, _task) = spawn_work_queue_default();

        queue
            .enqueue("broken", async { Err(anyhow::anyhow!("boom")) })
            .await
            .unwrap();

        let ticket = queue.submit("after", async { Ok("still running") }).await.unwrap();
        assert_eq!(ticket.wait().await.unwrap(), "still running");
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_worker() {
        let (queue, _task) = spawn_work_queue_default();

        let ticket = queue
            .submit("panics", async {
                if true {
                    panic!("job exploded");
                }
                Ok(())
            })
            .await
            .unwrap();
        assert!(ticket.wait().await.is_err());

        let ticket = queue.submit("after", async { Ok(1) }).await.unwrap();
        assert_eq!(ticket.wait().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_submit_propagates_job_error() {
        let (queue, _task) = spawn_work_queue_default();

        let ticket = queue
            .submit("fails", async { Err::<(), _>(anyhow::anyhow!("no table")) })
            .await
            .unwrap();
        let error = ticket.wait().await.unwrap_err();
        assert_eq!(error.to_string(), "no table");
    }

    #[tokio::test]
    async fn test_try_enqueue_at_capacity() {
        let (tx, _rx) = mpsc::channel::<QueuedJob>(10);
        let slots = JobSlots::new(1, DEFAULT_BACKPRESSURE_TIMEOUT);
        slots.try_acquire().unwrap().commit();

        let queue = WorkQueueHandle::new(tx, slots);
        assert!(queue.is_backpressure_active());

        let result = queue.try_enqueue("late", async { Ok(()) });
        assert!(matches!(result, Err(DispatchError::BackpressureTimeout)));
        assert_eq!(queue.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_after_worker_gone_releases_slot() {
        let (tx, rx) = mpsc::channel::<QueuedJob>(10);
        drop(rx);
        let queue = WorkQueueHandle::new(tx, JobSlots::new(4, DEFAULT_BACKPRESSURE_TIMEOUT));

        let result = queue.enqueue("orphan", async { Ok(()) }).await;
        assert!(matches!(result, Err(DispatchError::QueueClosed)));
        assert_eq!(queue.pending_count(), 0);
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn test_worker_shutdown_on_handle_drop() {
        let (queue, task) = spawn_work_queue_default();
        drop(queue);

        assert!(task.await.is_ok());
    }
}
