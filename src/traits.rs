//! Core traits for receiving orchestration lifecycle events.
//!
//! The host tool drives an [`ExecutionCallback`] one event at a time. Every
//! method has a no-op default so implementations only override the events
//! they care about, and no method can fail the run.

use async_trait::async_trait;

use crate::callback::types::{CallbackEvent, EventStatus, RunStats, TaskEvent};

// ============================================================================
// Callback Traits
// ============================================================================

/// Callback for receiving execution events.
///
/// Per-host task results arrive through the `on_runner_*` and `on_async_*`
/// methods; the status of the passed [`TaskEvent`] matches the method.
#[async_trait]
pub trait ExecutionCallback: Send + Sync {
    /// Called when a playbook starts.
    async fn on_playbook_start(&self, playbook: &str) {
        let _ = playbook;
    }

    /// Called when a task starts, before any host reports.
    async fn on_task_start(&self, task_uuid: &str) {
        let _ = task_uuid;
    }

    /// Called when a task succeeds on a host, changed or not.
    async fn on_runner_ok(&self, event: TaskEvent) {
        let _ = event;
    }

    /// Called when a task fails on a host.
    async fn on_runner_failed(&self, event: TaskEvent) {
        let _ = event;
    }

    /// Called when a task is skipped on a host.
    async fn on_runner_skipped(&self, event: TaskEvent) {
        let _ = event;
    }

    /// Called when a host cannot be reached.
    async fn on_runner_unreachable(&self, event: TaskEvent) {
        let _ = event;
    }

    /// Called when an async job finishes successfully.
    async fn on_async_ok(&self, event: TaskEvent) {
        let _ = event;
    }

    /// Called when an async job fails.
    async fn on_async_failed(&self, event: TaskEvent) {
        let _ = event;
    }

    /// Called once with the final per-host counters.
    async fn on_stats(&self, stats: &RunStats) {
        let _ = stats;
    }

    /// Called when the playbook run ends.
    async fn on_playbook_end(&self) {}

    /// Route an event envelope to the matching method.
    async fn on_event(&self, event: CallbackEvent) {
        match event {
            CallbackEvent::PlaybookStart { playbook } => self.on_playbook_start(&playbook).await,
            CallbackEvent::TaskStart { task_uuid } => self.on_task_start(&task_uuid).await,
            CallbackEvent::TaskResult(task) => match task.status {
                EventStatus::Ok | EventStatus::Changed => self.on_runner_ok(task).await,
                EventStatus::Failed => self.on_runner_failed(task).await,
                EventStatus::Skipped => self.on_runner_skipped(task).await,
                EventStatus::Unreachable => self.on_runner_unreachable(task).await,
                EventStatus::AsyncOk => self.on_async_ok(task).await,
                EventStatus::AsyncFailed => self.on_async_failed(task).await,
            },
            CallbackEvent::Stats { stats } => self.on_stats(&stats).await,
            CallbackEvent::PlaybookEnd => self.on_playbook_end().await,
        }
    }
}
