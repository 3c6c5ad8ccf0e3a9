//! # UI Context
//!
//! The one sequential executor allowed to mutate observable collections.
//! Worker tasks never touch a collection directly: they post a job here and
//! the jobs run one after another, in posting order, on a dedicated task.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{SyncError, SyncResult};

type UiJob = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the UI context. Cloning is cheap; the executor stops once every
/// handle has been dropped and the queue is drained.
#[derive(Clone)]
pub struct UiContext {
    jobs: mpsc::UnboundedSender<UiJob>,
}

impl UiContext {
    /// Starts the executor on the current tokio runtime.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (jobs, mut queue) = mpsc::unbounded_channel::<UiJob>();
        let executor = tokio::spawn(async move {
            while let Some(job) = queue.recv().await {
                // A panicking job is dropped; the queue keeps running.
                if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                    error!(reason = panic_reason(panic.as_ref()), "ui job panicked");
                }
            }
            debug!("ui context drained and stopped");
        });
        (Self { jobs }, executor)
    }

    /// Queues a job without waiting for it.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> SyncResult<()> {
        self.jobs
            .send(Box::new(job))
            .map_err(|_| SyncError::UiContextClosed)
    }

    /// Queues a job and waits for its result.
    pub async fn run<R>(&self, job: impl FnOnce() -> R + Send + 'static) -> SyncResult<R>
    where
        R: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        self.post(move || {
            let _ = reply.send(job());
        })?;
        result.await.map_err(|_| SyncError::UiContextClosed)
    }

    /// Waits until every job queued before this call has run.
    pub async fn flush(&self) -> SyncResult<()> {
        self.run(|| ()).await
    }
}

fn panic_reason(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(reason) = panic.downcast_ref::<&str>() {
        reason
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        reason
    } else {
        "unknown"
    }
}
