//! Lifecycle helpers for the binary's background tasks.
//!
//! Every task is spawned on a shared [`TaskTracker`]. A task that returns an
//! error cancels the application token, so one failing task brings the whole
//! process down in an orderly way.

use std::future::Future;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info};

/// Spawns a task that runs to completion on its own, observing `app_token`
/// only through whatever it captured.
pub fn spawn_managed_task<F>(
    tracker: &TaskTracker,
    app_token: CancellationToken,
    task_name: &'static str,
    task_future: F,
) where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    info!(task = task_name, "Starting task");

    tracker.spawn(async move {
        match task_future.await {
            Ok(()) => info!(task = task_name, "Task finished"),
            Err(e) => {
                error!(task = task_name, error = ?e, "Task failed, shutting down");
                app_token.cancel();
            }
        }
    });
}

/// Spawns a task built from a child of `app_token` and drops it as soon as
/// the application is cancelled.
pub fn spawn_cancellable_task<F, Fut>(
    tracker: &TaskTracker,
    app_token: CancellationToken,
    task_name: &'static str,
    task_builder: F,
) where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    info!(task = task_name, "Starting cancellable task");

    let child_token = app_token.child_token();

    tracker.spawn(async move {
        tokio::select! {
            result = task_builder(child_token) => match result {
                Ok(()) => info!(task = task_name, "Task finished"),
                Err(e) => {
                    error!(task = task_name, error = ?e, "Task failed, shutting down");
                    app_token.cancel();
                }
            },
            () = app_token.cancelled() => {
                info!(task = task_name, "Task stopped by shutdown");
            }
        }
    });
}
