//! Periodic background jobs: the clustering timer and the limiter sweep

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{ClusteringOrchestrator, PipelineError, SubmissionRateLimiter};

/// Run a clustering pass every `period` until `cancel` fires
///
/// The first pass happens one full period after start. A tick that finds a
/// pass already running is skipped.
pub fn spawn_clustering_timer(
    orchestrator: Arc<ClusteringOrchestrator>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(period_secs = period.as_secs(), "Clustering timer started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Clustering timer stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match orchestrator.run_pass().await {
                        Ok(report) => tracing::debug!(
                            pass_id = %report.pass_id,
                            groups_created = report.groups_created,
                            "Scheduled clustering pass finished"
                        ),
                        Err(PipelineError::PassInProgress) => {
                            tracing::info!("Clustering pass already running; skipping scheduled tick")
                        }
                        Err(e) => tracing::error!(error = %e, "Scheduled clustering pass failed"),
                    }
                }
            }
        }
    })
}

/// Prune replenished clients from `limiter` every `period` until `cancel` fires
pub fn spawn_limiter_sweep(
    limiter: Arc<SubmissionRateLimiter>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let before = limiter.tracked_clients();
                    limiter.retain_recent();
                    tracing::debug!(
                        before,
                        after = limiter.tracked_clients(),
                        "Submission limiter swept"
                    );
                }
            }
        }
    })
}
