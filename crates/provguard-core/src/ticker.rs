//! Periodic task — a fixed-period tick on its own tokio task.
//!
//! The blacklist sweep and the mitigation loop each run on one of these.
//! Every period the task wakes and calls the tick closure; `stop()` (or
//! dropping the handle) wakes it through a `Notify` and it exits.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::utils::panic_message;

/// Spawner for periodic tasks.
pub struct PeriodicTask;

impl PeriodicTask {
    /// Spawn `tick` every `period` on the current tokio runtime.
    ///
    /// A panicking tick is logged and the schedule continues.
    pub fn spawn<F>(name: &'static str, period: Duration, mut tick: F) -> TaskHandle
    where
        F: FnMut() + Send + 'static,
    {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();

        let join = tokio::spawn(async move {
            info!(task = name, period_ms = period.as_millis() as u64, "periodic task started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {
                        debug!(task = name, "tick");
                        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(&mut tick)) {
                            error!(
                                task = name,
                                panic = %panic_message(payload.as_ref()),
                                "periodic tick panicked"
                            );
                        }
                    }
                    _ = signal.notified() => {
                        info!(task = name, "periodic task shutting down");
                        return;
                    }
                }
            }
        });

        TaskHandle {
            name,
            shutdown,
            join: Some(join),
        }
    }
}

/// Disposer for a spawned [`PeriodicTask`]. Dropping it also stops the task.
pub struct TaskHandle {
    name: &'static str,
    shutdown: Arc<Notify>,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task to stop. It exits at its next wake-up.
    pub fn stop(&self) {
        // notify_one stores a permit, so a stop issued mid-tick is not lost.
        self.shutdown.notify_one();
    }

    /// Stop the task and wait for it to exit.
    pub async fn join(mut self) {
        self.stop();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                error!(task = self.name, error = %e, "periodic task ended abnormally");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |j| j.is_finished())
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
