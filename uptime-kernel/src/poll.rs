//! One poll cycle: fetch the node list, reconcile it, record the outcome.

use crate::health::{CycleSummary, HealthTracker};
use crate::models::whole_seconds;
use crate::reconciler::{CycleReport, Reconciler};
use crate::source::{SourceClient, SourceError};
use crate::store::StoreError;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::{error, info, Instrument};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("cannot read nodes from store: {0}")]
    Store(#[from] StoreError),
}

pub struct Poller {
    source: SourceClient,
    reconciler: Reconciler,
    health: HealthTracker,
    // scheduled and manually triggered cycles never interleave
    cycle_lock: tokio::sync::Mutex<()>,
}

impl Poller {
    pub fn new(source: SourceClient, reconciler: Reconciler, health: HealthTracker) -> Self {
        Self { source, reconciler, health, cycle_lock: tokio::sync::Mutex::new(()) }
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let cycle_id = Uuid::new_v4();
        let span = tracing::info_span!("poll_cycle", %cycle_id);
        async {
            let _guard = self.cycle_lock.lock().await;
            let started = Instant::now();
            info!(endpoint = %self.source.endpoint(), "starting update process for nodes uptime");

            let result = self.cycle(started).await;
            if let Err(e) = &result {
                error!(error = %e, "poll cycle aborted");
                self.health.record_failure(e);
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn cycle(&self, started: Instant) -> Result<CycleReport, CycleError> {
        let observations = self.source.fetch().await?;
        info!(nodes = observations.len(), elapsed_ms = started.elapsed().as_millis() as u64, "pulled node list");

        let poll = whole_seconds(OffsetDateTime::now_utc());
        let report = self.reconciler.reconcile_batch(&observations, poll)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            created = report.nodes_created,
            started = report.sessions_started,
            extended = report.sessions_extended,
            below_threshold = report.below_threshold,
            failed = report.failed,
            swept_offline = report.swept_offline,
            elapsed_ms,
            "done with updating"
        );
        self.health.record_cycle(CycleSummary { poll, elapsed_ms, report: report.clone() });
        Ok(report)
    }
}
