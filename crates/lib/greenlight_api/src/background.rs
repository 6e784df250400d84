//! Background task runner.
//!
//! Fire-and-forget work that outlives the request that scheduled it, such as
//! sending a notification after the response has gone out. Each task runs
//! behind its own panic boundary; failures are logged and never retried.
//! Shutdown closes the tracker and waits for every outstanding task.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::middleware::recover::panic_message;

/// Handle for scheduling background work. Cheap to clone; clones share the
/// same set of tracked tasks.
#[derive(Clone, Debug, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` in the background under `name`.
    ///
    /// The task is counted as outstanding from this call until it finishes.
    /// An `Err` or a panic inside it is logged and goes no further.
    pub fn spawn<F, E>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        debug!(task = name, "scheduling background task");
        self.tracker.spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => debug!(task = name, "background task finished"),
                Ok(Err(e)) => error!(task = name, error = %e, "background task failed"),
                Err(payload) => {
                    error!(task = name, panic = %panic_message(&*payload), "background task panicked")
                }
            }
        });
    }

    /// Number of tasks scheduled but not yet finished.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    /// Close the runner and wait for every outstanding task to finish.
    pub async fn shutdown(&self) {
        let pending = self.outstanding();
        if pending > 0 {
            info!(pending, "waiting for background tasks to finish");
        }
        self.tracker.close();
        self.tracker.wait().await;
        info!("background tasks drained");
    }
}
