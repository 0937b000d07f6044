//! Pipeline event types and EventBus
//!
//! Background work (tagging, clustering passes, response fan-out) has no
//! caller waiting on it, so its outcome is published here. The HTTP layer
//! streams these events over SSE; tests subscribe directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pipeline event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Tagging finished for one request
    RequestTagged {
        request_id: Uuid,
        /// Tags linked during this attempt
        tag_ids: Vec<Uuid>,
        /// Tags created because no existing tag matched
        created_tags: usize,
        timestamp: DateTime<Utc>,
    },

    /// Clustering pass started
    ClusteringPassStarted {
        pass_id: Uuid,
        candidates: usize,
        timestamp: DateTime<Utc>,
    },

    /// Group created by a clustering pass
    GroupCreated {
        pass_id: Uuid,
        group_id: Uuid,
        member_ids: Vec<Uuid>,
        primary_tag_id: Option<Uuid>,
        timestamp: DateTime<Utc>,
    },

    /// Clustering pass finished (including passes with per-request failures)
    ClusteringPassCompleted {
        pass_id: Uuid,
        groups_created: usize,
        requests_grouped: usize,
        failures: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Group response fan-out finished
    FanoutCompleted {
        response_id: Uuid,
        group_id: Uuid,
        delivered: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Background task finished successfully
    TaskCompleted {
        task_id: Uuid,
        name: String,
        timestamp: DateTime<Utc>,
    },

    /// Background task returned an error
    TaskFailed {
        task_id: Uuid,
        name: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// SSE event name
    pub fn event_type(&self) -> &str {
        match self {
            PipelineEvent::RequestTagged { .. } => "RequestTagged",
            PipelineEvent::ClusteringPassStarted { .. } => "ClusteringPassStarted",
            PipelineEvent::GroupCreated { .. } => "GroupCreated",
            PipelineEvent::ClusteringPassCompleted { .. } => "ClusteringPassCompleted",
            PipelineEvent::FanoutCompleted { .. } => "FanoutCompleted",
            PipelineEvent::TaskCompleted { .. } => "TaskCompleted",
            PipelineEvent::TaskFailed { .. } => "TaskFailed",
        }
    }
}

/// Broadcast bus for pipeline events
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}
