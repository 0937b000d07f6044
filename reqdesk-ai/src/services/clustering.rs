//! Clustering orchestrator
//!
//! A pass takes every public request that has been tagged (`Analyzing`) and
//! not yet grouped, and partitions it greedily: each unprocessed request in
//! stable order becomes a reference, pulls in the still-unprocessed requests
//! the oracle calls similar, and the resulting members become one new group.
//!
//! Failures are per reference. A reference whose oracle or storage step fails
//! is skipped and stays in the pool for the next pass; members already
//! re-parented before the failure stay grouped and are not reconsidered.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use uuid::Uuid;
use reqdesk_common::db::{Request, TagCount};
use reqdesk_common::events::{EventBus, PipelineEvent};

use super::{PipelineError, PipelineResult, SimilarityResolver};
use crate::db::{groups, requests, tags};
use crate::oracle::{prompts, Oracle};

/// Outcome of one clustering pass
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass_id: Uuid,
    /// Pool size when the pass started
    pub candidates: usize,
    pub groups_created: usize,
    pub requests_grouped: usize,
    /// References skipped because of an oracle or storage error
    pub failures: usize,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

/// Pick the primary tag from raw link counts
///
/// `counts` must be in first-encountered order. The highest count wins;
/// ties go to the earliest entry. No counts means no primary tag.
pub fn select_primary_tag(counts: &[TagCount]) -> Option<Uuid> {
    let mut best: Option<&TagCount> = None;
    for candidate in counts {
        match best {
            Some(current) if candidate.count <= current.count => {}
            _ => best = Some(candidate),
        }
    }
    best.map(|c| c.tag_id)
}

/// Held for the duration of a pass; clears the running flag on drop
struct PassGuard<'a> {
    running: &'a AtomicBool,
}

impl<'a> PassGuard<'a> {
    fn acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { running })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

pub struct ClusteringOrchestrator {
    db: SqlitePool,
    oracle: Arc<dyn Oracle>,
    similarity: SimilarityResolver,
    event_bus: EventBus,
    running: AtomicBool,
    last_report: RwLock<Option<PassReport>>,
}

impl ClusteringOrchestrator {
    pub fn new(db: SqlitePool, oracle: Arc<dyn Oracle>, event_bus: EventBus) -> Self {
        Self {
            db,
            similarity: SimilarityResolver::new(Arc::clone(&oracle)),
            oracle,
            event_bus,
            running: AtomicBool::new(false),
            last_report: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Report of the most recent completed pass
    pub async fn last_report(&self) -> Option<PassReport> {
        self.last_report.read().await.clone()
    }

    /// Run one clustering pass
    ///
    /// Rejected with [`PipelineError::PassInProgress`] while another pass is
    /// running. Per-reference failures are counted in the report, not
    /// returned.
    pub async fn run_pass(&self) -> PipelineResult<PassReport> {
        let _guard = PassGuard::acquire(&self.running).ok_or(PipelineError::PassInProgress)?;

        let pass_id = Uuid::new_v4();
        let start = Instant::now();
        let pool = requests::list_clustering_candidates(&self.db).await?;

        tracing::info!(pass_id = %pass_id, candidates = pool.len(), "Clustering pass started");
        self.event_bus.emit_lossy(PipelineEvent::ClusteringPassStarted {
            pass_id,
            candidates: pool.len(),
            timestamp: Utc::now(),
        });

        let mut processed: HashSet<Uuid> = HashSet::with_capacity(pool.len());
        let mut groups_created = 0;
        let mut failures = 0;

        for reference in &pool {
            if processed.contains(&reference.id) {
                continue;
            }

            match self.cluster_reference(pass_id, reference, &pool, &mut processed).await {
                Ok(_) => groups_created += 1,
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        pass_id = %pass_id,
                        request_id = %reference.id,
                        error = %e,
                        "Skipping reference request; it stays ungrouped until the next pass"
                    );
                }
            }
        }

        let report = PassReport {
            pass_id,
            candidates: pool.len(),
            groups_created,
            requests_grouped: processed.len(),
            failures,
            duration_ms: start.elapsed().as_millis() as u64,
            finished_at: Utc::now(),
        };

        tracing::info!(
            pass_id = %pass_id,
            groups_created = report.groups_created,
            requests_grouped = report.requests_grouped,
            failures = report.failures,
            duration_ms = report.duration_ms,
            "Clustering pass completed"
        );
        self.event_bus.emit_lossy(PipelineEvent::ClusteringPassCompleted {
            pass_id,
            groups_created: report.groups_created,
            requests_grouped: report.requests_grouped,
            failures: report.failures,
            duration_ms: report.duration_ms,
            timestamp: report.finished_at,
        });

        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    /// Build one group around `reference`; returns the new group id
    ///
    /// Every member re-parented is added to `processed` as soon as its write
    /// succeeds.
    async fn cluster_reference(
        &self,
        pass_id: Uuid,
        reference: &Request,
        pool: &[Request],
        processed: &mut HashSet<Uuid>,
    ) -> PipelineResult<Uuid> {
        let others: Vec<Request> = pool
            .iter()
            .filter(|r| r.id != reference.id && !processed.contains(&r.id))
            .cloned()
            .collect();

        let similar = self.similarity.find_similar(reference, &others).await?;

        let mut members = Vec::with_capacity(similar.len() + 1);
        members.push(reference.clone());
        members.extend(others.into_iter().filter(|r| similar.contains(&r.id)));

        let reply = self
            .oracle
            .complete(&prompts::group_summary(&members))
            .await?;
        let summary = prompts::parse_group_summary(&reply);
        if summary.malformed {
            tracing::warn!(
                reference_id = %reference.id,
                "Group summary was not valid JSON; using default title"
            );
        }

        let member_ids: Vec<Uuid> = members.iter().map(|m| m.id).collect();
        let counts = tags::tag_link_counts(&self.db, &member_ids).await?;
        let primary_tag_id = select_primary_tag(&counts);

        let group = groups::insert_group(
            &self.db,
            &groups::NewGroup {
                title: summary.title,
                description: summary.description,
                primary_tag_id,
            },
        )
        .await?;

        for member_id in &member_ids {
            requests::assign_group(&self.db, *member_id, group.id).await?;
            processed.insert(*member_id);
        }

        tracing::info!(
            pass_id = %pass_id,
            group_id = %group.id,
            members = member_ids.len(),
            primary_tag_id = ?primary_tag_id,
            "Group created"
        );
        self.event_bus.emit_lossy(PipelineEvent::GroupCreated {
            pass_id,
            group_id: group.id,
            member_ids,
            primary_tag_id,
            timestamp: Utc::now(),
        });

        Ok(group.id)
    }
}
