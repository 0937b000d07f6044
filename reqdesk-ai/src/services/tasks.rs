//! Background task executor
//!
//! Tagging and fan-out outlive the HTTP request that triggers them. They run
//! on a [`TaskTracker`] so shutdown and tests can wait for them to finish.

use std::fmt::Display;
use std::future::Future;
use tokio_util::task::TaskTracker;
use uuid::Uuid;
use reqdesk_common::events::{EventBus, PipelineEvent};

#[derive(Clone)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    event_bus: EventBus,
}

impl BackgroundTasks {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            tracker: TaskTracker::new(),
            event_bus,
        }
    }

    /// Run `work` in the background under a name; returns the task id
    ///
    /// The outcome is logged and published as `TaskCompleted` or `TaskFailed`.
    pub fn spawn<F, T, E>(&self, name: impl Into<String>, work: F) -> Uuid
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let task_id = Uuid::new_v4();
        let name = name.into();
        let event_bus = self.event_bus.clone();

        tracing::debug!(task_id = %task_id, task = %name, "Background task started");

        self.tracker.spawn(async move {
            match work.await {
                Ok(_) => {
                    tracing::debug!(task_id = %task_id, task = %name, "Background task completed");
                    event_bus.emit_lossy(PipelineEvent::TaskCompleted {
                        task_id,
                        name,
                        timestamp: chrono::Utc::now(),
                    });
                }
                Err(e) => {
                    tracing::error!(task_id = %task_id, task = %name, error = %e, "Background task failed");
                    event_bus.emit_lossy(PipelineEvent::TaskFailed {
                        task_id,
                        name,
                        error: e.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
        });

        task_id
    }

    /// Number of tasks still running
    pub fn active_count(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every task spawned so far; new tasks may be spawned afterwards
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Wait for running tasks at shutdown
    pub async fn shutdown(&self) {
        self.tracker.close();
        if !self.tracker.is_empty() {
            tracing::info!(tasks = self.tracker.len(), "Waiting for background tasks");
        }
        self.tracker.wait().await;
    }
}
