//! Read-side service behind the `/info` endpoints.
//!
//! Multi-node queries are forgiving per node: a key the store does not know,
//! or a record that cannot be read, is skipped with a warning. Only a
//! structural store failure fails the whole request.

use crate::aggregator::{aggregate, BoundaryRule, Window, WindowError};
use crate::models::{MonthlySummary, NodeUptime};
use crate::store::{StoreError, UptimeStore};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("cannot load data from store: {0}")]
    Store(#[from] StoreError),
}

/// Splits a comma separated `nodes` parameter into trimmed, non-empty keys.
pub fn parse_node_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Clone)]
pub struct UptimeQueries {
    store: Arc<dyn UptimeStore>,
}

impl UptimeQueries {
    pub fn new(store: Arc<dyn UptimeStore>) -> Self {
        Self { store }
    }

    /// Historical export. Without an explicit window the previous calendar
    /// month (relative to `now`) is used.
    pub fn export(
        &self,
        keys: &[String],
        window: Option<Window>,
        now: OffsetDateTime,
    ) -> Result<Vec<NodeUptime>, QueryError> {
        let window = match window {
            Some(w) => w,
            None => Window::previous_month(now)?,
        };
        self.collect(keys, &window, BoundaryRule::Export)
    }

    /// Export over every node the store knows.
    pub fn export_all(&self, window: Option<Window>, now: OffsetDateTime) -> Result<Vec<NodeUptime>, QueryError> {
        let keys: Vec<String> = self.store.find_nodes()?.into_iter().map(|n| n.key).collect();
        self.export(&keys, window, now)
    }

    /// From the first instant of the current month up to `now`.
    pub fn month_to_date(&self, keys: &[String], now: OffsetDateTime) -> Result<Vec<NodeUptime>, QueryError> {
        let window = Window::month_to_date(now)?;
        self.collect(keys, &window, BoundaryRule::MonthToDate)
    }

    pub fn monthly_summaries(&self, keys: &[String]) -> Result<Vec<MonthlySummary>, QueryError> {
        let mut out = Vec::new();
        for key in keys {
            match self.store.find_summaries(key) {
                Ok(mut summaries) => out.append(&mut summaries),
                Err(e) => self.skip_or_fail(key, e)?,
            }
        }
        Ok(out)
    }

    fn collect(&self, keys: &[String], window: &Window, rule: BoundaryRule) -> Result<Vec<NodeUptime>, QueryError> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let record = match self.store.find_node(key) {
                Ok(record) => record,
                Err(e) => {
                    self.skip_or_fail(key, e)?;
                    continue;
                }
            };
            let figures = aggregate(&record.sessions, window, rule);
            results.push(NodeUptime {
                key: record.node.key,
                uptime_seconds: figures.uptime_seconds,
                downtime_seconds: figures.downtime_seconds,
                percentage: figures.percentage,
                online: record.node.online,
            });
        }
        Ok(results)
    }

    fn skip_or_fail(&self, key: &str, e: StoreError) -> Result<(), QueryError> {
        if e.is_structural() {
            error!(node = key, error = %e, "unable to read data from the store");
            return Err(e.into());
        }
        warn!(node = key, error = %e, "missing records for node");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewSession;
    use crate::store::JsonFileStore;
    use time::macros::datetime;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(secs).unwrap()
    }

    fn seeded() -> Arc<JsonFileStore> {
        let store = Arc::new(JsonFileStore::in_memory());
        store.create_node("A", NewSession { start: at(900), duration_secs: 100 }, at(1000)).unwrap();
        store.create_session("A", NewSession { start: at(1250), duration_secs: 50 }, at(1300)).unwrap();
        store
    }

    #[test]
    fn test_parse_node_keys() {
        assert_eq!(parse_node_keys(" a, b ,,c "), vec!["a", "b", "c"]);
        assert!(parse_node_keys(" , ").is_empty());
    }

    #[test]
    fn test_export_explicit_window_skips_unknown() {
        let queries = UptimeQueries::new(seeded());
        let keys = vec!["A".to_string(), "ghost".to_string()];
        let out = queries.export(&keys, Some(Window::from_unix(900, 1300).unwrap()), at(5000)).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key, "A");
        assert_eq!(out[0].uptime_seconds, 150);
        assert_eq!(out[0].downtime_seconds, 250);
        assert!(out[0].online);
    }

    #[test]
    fn test_export_defaults_to_previous_month() {
        let store = Arc::new(JsonFileStore::in_memory());
        store
            .create_node(
                "A",
                NewSession { start: datetime!(2024-02-10 0:00 UTC), duration_secs: 86_400 },
                datetime!(2024-02-11 0:00 UTC),
            )
            .unwrap();
        let queries = UptimeQueries::new(store);

        let out = queries.export(&["A".to_string()], None, datetime!(2024-03-05 8:00 UTC)).unwrap();
        assert_eq!(out[0].uptime_seconds, 86_400);
        assert_eq!(out[0].uptime_seconds + out[0].downtime_seconds, 29 * 86_400);
    }

    #[test]
    fn test_month_to_date_for_node_without_history_in_month() {
        let queries = UptimeQueries::new(seeded());
        let now = datetime!(2024-03-02 0:00 UTC);
        let out = queries.month_to_date(&["A".to_string()], now).unwrap();
        assert_eq!(out[0].uptime_seconds, 0);
        assert_eq!(out[0].downtime_seconds, 86_400);
        assert_eq!(out[0].percentage, 0.0);
    }

    #[test]
    fn test_export_all_covers_every_node() {
        let store = seeded();
        store.create_node("B", NewSession { start: at(1000), duration_secs: 100 }, at(1100)).unwrap();
        let queries = UptimeQueries::new(store);
        let out = queries.export_all(Some(Window::from_unix(900, 1300).unwrap()), at(5000)).unwrap();
        let keys: Vec<&str> = out.iter().map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["A", "B"]);
        assert_eq!(out[1].uptime_seconds, 100);
    }

    struct Unavailable;

    impl UptimeStore for Unavailable {
        fn find_nodes(&self) -> Result<Vec<crate::models::Node>, StoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into())
        }
        fn find_node(&self, _: &str) -> Result<crate::models::NodeRecord, StoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into())
        }
        fn last_session(&self, _: &str) -> Result<Option<crate::models::UptimeSession>, StoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into())
        }
        fn create_node(&self, _: &str, _: NewSession, _: OffsetDateTime) -> Result<crate::models::UptimeSession, StoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into())
        }
        fn create_session(&self, _: &str, _: NewSession, _: OffsetDateTime) -> Result<crate::models::UptimeSession, StoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into())
        }
        fn extend_session(&self, _: &str, _: u64, _: u64, _: OffsetDateTime) -> Result<crate::models::UptimeSession, StoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into())
        }
        fn sweep_stale(&self, _: OffsetDateTime) -> Result<usize, StoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into())
        }
        fn create_summary(&self, _: crate::models::SummaryDraft) -> Result<MonthlySummary, StoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into())
        }
        fn find_summaries(&self, _: &str) -> Result<Vec<MonthlySummary>, StoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into())
        }
    }

    #[test]
    fn test_structural_failure_fails_whole_query() {
        let queries = UptimeQueries::new(Arc::new(Unavailable));
        let err = queries.month_to_date(&["A".to_string()], at(5000)).unwrap_err();
        assert!(matches!(err, QueryError::Store(StoreError::Io(_))));
    }
}
