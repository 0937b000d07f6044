//! Response fan-out engine
//!
//! A response to a single request is recorded and closes that request at
//! once. A response to a group is recorded, then personalized for every
//! member in a background task; members succeed or fail independently.

use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use reqdesk_common::db::{RequestStatus, Response, ResponseTarget};
use reqdesk_common::events::{EventBus, PipelineEvent};

use super::{BackgroundTasks, PipelineError, PipelineResult};
use crate::db::{groups, requests, responses};
use crate::oracle::{prompts, Oracle};

/// Per-member outcome counts for one group response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    pub response_id: Uuid,
    pub delivered: usize,
    pub failed: usize,
}

/// Result of accepting a staff response
#[derive(Debug, Clone, Serialize)]
pub struct SubmittedResponse {
    pub response: Response,
    /// Background fan-out task, for group responses
    pub fanout_task_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct ResponseFanout {
    db: SqlitePool,
    oracle: Arc<dyn Oracle>,
    event_bus: EventBus,
    tasks: BackgroundTasks,
}

impl ResponseFanout {
    pub fn new(
        db: SqlitePool,
        oracle: Arc<dyn Oracle>,
        event_bus: EventBus,
        tasks: BackgroundTasks,
    ) -> Self {
        Self {
            db,
            oracle,
            event_bus,
            tasks,
        }
    }

    /// Persist a staff response and deliver it
    ///
    /// The target must exist. The response row is written before any member
    /// is touched.
    pub async fn submit_response(
        &self,
        responder_id: Uuid,
        body: &str,
        target: ResponseTarget,
    ) -> PipelineResult<SubmittedResponse> {
        match target {
            ResponseTarget::Request(request_id) => {
                if requests::load_request(&self.db, request_id).await?.is_none() {
                    return Err(PipelineError::NotFound(format!("request {}", request_id)));
                }

                let response = responses::insert_response(&self.db, target, responder_id, body).await?;
                requests::update_status(&self.db, request_id, RequestStatus::Responded).await?;

                tracing::info!(
                    response_id = %response.id,
                    request_id = %request_id,
                    "Direct response recorded"
                );

                Ok(SubmittedResponse {
                    response,
                    fanout_task_id: None,
                })
            }
            ResponseTarget::Group(group_id) => {
                if groups::load_group(&self.db, group_id).await?.is_none() {
                    return Err(PipelineError::NotFound(format!("group {}", group_id)));
                }

                let response = responses::insert_response(&self.db, target, responder_id, body).await?;

                let engine = self.clone();
                let fanned = response.clone();
                let task_id = self.tasks.spawn(format!("fanout:{}", response.id), async move {
                    engine.fan_out_group(&fanned, group_id).await
                });

                tracing::info!(
                    response_id = %response.id,
                    group_id = %group_id,
                    task_id = %task_id,
                    "Group response recorded; fan-out scheduled"
                );

                Ok(SubmittedResponse {
                    response,
                    fanout_task_id: Some(task_id),
                })
            }
        }
    }

    /// Personalize `response` for every current member of `group_id`
    ///
    /// Fails only if the member list cannot be read.
    pub async fn fan_out_group(&self, response: &Response, group_id: Uuid) -> PipelineResult<FanoutReport> {
        let members = requests::list_group_members(&self.db, group_id).await?;
        let mut report = FanoutReport {
            response_id: response.id,
            delivered: 0,
            failed: 0,
        };

        for member in &members {
            match self.deliver(response, member).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        response_id = %response.id,
                        request_id = %member.id,
                        error = %e,
                        "Personalized delivery failed"
                    );
                }
            }
        }

        tracing::info!(
            response_id = %response.id,
            group_id = %group_id,
            delivered = report.delivered,
            failed = report.failed,
            "Fan-out finished"
        );
        self.event_bus.emit_lossy(PipelineEvent::FanoutCompleted {
            response_id: response.id,
            group_id,
            delivered: report.delivered,
            failed: report.failed,
            timestamp: chrono::Utc::now(),
        });

        Ok(report)
    }

    async fn deliver(&self, response: &Response, member: &reqdesk_common::db::Request) -> PipelineResult<()> {
        let reply = self
            .oracle
            .complete(&prompts::personalization(member, &response.body))
            .await?;

        let body = match reply.trim() {
            "" => response.body.as_str(),
            text => text,
        };

        responses::insert_personalized_response(&self.db, member.id, response.id, body).await?;
        requests::update_status(&self.db, member.id, RequestStatus::Responded).await?;

        Ok(())
    }
}
