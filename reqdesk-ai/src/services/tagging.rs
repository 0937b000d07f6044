//! Tagging engine
//!
//! Labels a freshly submitted request through the oracle, reusing vocabulary
//! tags where the label matches case-insensitively and creating new tags
//! otherwise, then moves the request from `Pending` to `Analyzing`.

use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use reqdesk_common::db::{
    Request, RequestStatus, RequestTagLink, Tag, TagOrigin, AI_TAG_CONFIDENCE,
};
use reqdesk_common::events::{EventBus, PipelineEvent};

use super::{PipelineError, PipelineResult};
use crate::db::{requests, tags};
use crate::oracle::{prompts, Oracle};

/// One tag linked to a request
#[derive(Debug, Clone)]
pub struct TagAssignment {
    pub tag: Tag,
    pub link: RequestTagLink,
    /// The tag did not exist before this attempt
    pub created: bool,
}

pub struct TaggingEngine {
    db: SqlitePool,
    oracle: Arc<dyn Oracle>,
    event_bus: EventBus,
}

impl TaggingEngine {
    pub fn new(db: SqlitePool, oracle: Arc<dyn Oracle>, event_bus: EventBus) -> Self {
        Self {
            db,
            oracle,
            event_bus,
        }
    }

    /// Load a request and the current vocabulary, then tag it
    pub async fn tag_request_by_id(&self, request_id: Uuid) -> PipelineResult<Vec<TagAssignment>> {
        let request = requests::load_request(&self.db, request_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("request {}", request_id)))?;
        let vocabulary = tags::list_tags(&self.db).await?;

        self.tag_request(&request, &vocabulary).await
    }

    /// Tag one request against `existing_tags`
    ///
    /// Links are written as each label resolves. An oracle or storage failure
    /// part-way leaves earlier links in place and the request in `Pending`.
    pub async fn tag_request(
        &self,
        request: &Request,
        existing_tags: &[Tag],
    ) -> PipelineResult<Vec<TagAssignment>> {
        let reply = self
            .oracle
            .complete(&prompts::tag_analysis(request, existing_tags))
            .await?;
        let labels = prompts::parse_label_list(&reply);

        tracing::debug!(
            request_id = %request.id,
            labels = ?labels,
            "Oracle proposed labels"
        );

        let mut vocabulary: Vec<Tag> = existing_tags.to_vec();
        let mut assignments = Vec::with_capacity(labels.len());

        for label in &labels {
            let (tag, created) = self.resolve_label(label, &mut vocabulary).await?;

            if assignments.iter().any(|a: &TagAssignment| a.tag.id == tag.id) {
                continue;
            }

            let link = tags::insert_tag_link(&self.db, request.id, tag.id, AI_TAG_CONFIDENCE).await?;
            assignments.push(TagAssignment { tag, link, created });
        }

        let advanced = requests::advance_status(
            &self.db,
            request.id,
            RequestStatus::Pending,
            RequestStatus::Analyzing,
        )
        .await?;
        if !advanced {
            tracing::debug!(request_id = %request.id, "Request was no longer pending after tagging");
        }

        let created_tags = assignments.iter().filter(|a| a.created).count();
        tracing::info!(
            request_id = %request.id,
            tags = assignments.len(),
            created_tags,
            "Request tagged"
        );

        self.event_bus.emit_lossy(PipelineEvent::RequestTagged {
            request_id: request.id,
            tag_ids: assignments.iter().map(|a| a.tag.id).collect(),
            created_tags,
            timestamp: chrono::Utc::now(),
        });

        Ok(assignments)
    }

    /// Find a vocabulary tag for `label` or create one
    async fn resolve_label(&self, label: &str, vocabulary: &mut Vec<Tag>) -> PipelineResult<(Tag, bool)> {
        let key = Tag::name_key(label);
        if let Some(existing) = vocabulary.iter().find(|t| Tag::name_key(&t.name) == key) {
            return Ok((existing.clone(), false));
        }

        let translation = self.oracle.complete(&prompts::tag_translation(label)).await?;
        let new_tag = tags::NewTag {
            name: label.to_string(),
            localized_name: prompts::parse_translation(&translation, label),
            description: None,
            origin: TagOrigin::Oracle,
        };

        let (tag, created) = match tags::insert_tag(&self.db, &new_tag).await {
            Ok(tag) => {
                tracing::info!(tag_id = %tag.id, name = %tag.name, "Created tag from oracle label");
                (tag, true)
            }
            Err(e) if e.is_unique_violation() => {
                let tag = tags::find_tag_by_name(&self.db, label).await?.ok_or(e)?;
                tracing::debug!(tag_id = %tag.id, name = %tag.name, "Tag created concurrently, reusing");
                (tag, false)
            }
            Err(e) => return Err(e.into()),
        };

        vocabulary.push(tag.clone());
        Ok((tag, created))
    }
}
