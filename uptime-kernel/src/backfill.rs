/**
 * MONTHLY BACKFILL - Materializes per-month uptime summaries for a past year
 *
 * ROLE:
 * Runs the export aggregation once per (node, calendar month) of a year and
 * stores a MonthlySummary for every month with non-zero uptime.
 *
 * NOTES:
 * - Zero-uptime months are not stored
 * - No deduplication: running twice for the same year stores every month twice.
 *   Whoever triggers the job must make sure it has not already run.
 */

use crate::aggregator::{aggregate, BoundaryRule, Window, WindowError};
use crate::models::SummaryDraft;
use crate::store::{StoreError, UptimeStore};
use serde::Serialize;
use std::sync::Arc;
use time::Month;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum BackfillError {
    #[error("cannot backfill year {year}: {source}")]
    Year { year: i32, source: WindowError },
    #[error("cannot list nodes: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub year: i32,
    pub nodes: usize,
    pub summaries_created: usize,
    pub empty_months: usize,
    pub failures: usize,
}

pub struct Backfill {
    store: Arc<dyn UptimeStore>,
}

impl Backfill {
    pub fn new(store: Arc<dyn UptimeStore>) -> Self {
        Self { store }
    }

    pub fn run(&self, year: i32) -> Result<BackfillReport, BackfillError> {
        let months = (1..=12u8)
            .map(|m| {
                let month = Month::try_from(m).map_err(|e| WindowError::Calendar(e.to_string()))?;
                Ok((m, Window::calendar_month(year, month)?))
            })
            .collect::<Result<Vec<_>, WindowError>>()
            .map_err(|source| BackfillError::Year { year, source })?;

        let nodes = self.store.find_nodes()?;
        info!(year, nodes = nodes.len(), "starting monthly backfill");

        let mut report = BackfillReport { year, nodes: nodes.len(), ..BackfillReport::default() };

        for node in &nodes {
            let record = match self.store.find_node(&node.key) {
                Ok(record) => record,
                Err(e) => {
                    warn!(node = %node.key, error = %e, "skipping node during backfill");
                    report.failures += 1;
                    continue;
                }
            };
            let last_counter = record.last_session().map(|s| s.duration_secs).unwrap_or(0);

            for (month, window) in &months {
                let figures = aggregate(&record.sessions, window, BoundaryRule::Export);
                if figures.uptime_seconds == 0 {
                    report.empty_months += 1;
                    continue;
                }
                let draft = SummaryDraft {
                    node_key: node.key.clone(),
                    month: *month,
                    year,
                    uptime_secs: figures.uptime_seconds,
                    downtime_secs: figures.downtime_seconds,
                    percentage: figures.percentage,
                    last_counter,
                };
                match self.store.create_summary(draft) {
                    Ok(_) => report.summaries_created += 1,
                    Err(e) => {
                        error!(node = %node.key, month, year, error = %e, "cannot store monthly summary");
                        report.failures += 1;
                    }
                }
            }
        }

        info!(
            year,
            created = report.summaries_created,
            failures = report.failures,
            "monthly backfill done"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewSession;
    use crate::store::JsonFileStore;
    use time::macros::datetime;

    #[test]
    fn test_backfill_stores_only_months_with_uptime() {
        let store = Arc::new(JsonFileStore::in_memory());
        // up from 2023-03-31 12:00 for 36h, confirmed on 2023-04-02
        store
            .create_node(
                "A",
                NewSession { start: datetime!(2023-03-31 12:00 UTC), duration_secs: 36 * 3600 },
                datetime!(2023-04-02 0:00 UTC),
            )
            .unwrap();

        let report = Backfill::new(store.clone()).run(2023).unwrap();
        assert_eq!(report.nodes, 1);
        assert_eq!(report.summaries_created, 2);
        assert_eq!(report.empty_months, 10);

        let summaries = store.find_summaries("A").unwrap();
        let march = summaries.iter().find(|s| s.month == 3).unwrap();
        let april = summaries.iter().find(|s| s.month == 4).unwrap();
        assert_eq!(march.uptime_secs, 12 * 3600);
        assert_eq!(april.uptime_secs, 24 * 3600);
        assert_eq!(march.uptime_secs + march.downtime_secs, 31 * 86_400);
        assert_eq!(april.last_counter, 36 * 3600);
    }

    #[test]
    fn test_backfill_twice_duplicates() {
        let store = Arc::new(JsonFileStore::in_memory());
        store
            .create_node(
                "A",
                NewSession { start: datetime!(2023-05-10 0:00 UTC), duration_secs: 3600 },
                datetime!(2023-05-10 1:00 UTC),
            )
            .unwrap();

        let job = Backfill::new(store.clone());
        job.run(2023).unwrap();
        job.run(2023).unwrap();
        assert_eq!(store.find_summaries("A").unwrap().len(), 2);
    }

    #[test]
    fn test_backfill_without_nodes() {
        let store = Arc::new(JsonFileStore::in_memory());
        let report = Backfill::new(store).run(2023).unwrap();
        assert_eq!(report, BackfillReport { year: 2023, ..BackfillReport::default() });
    }
}
