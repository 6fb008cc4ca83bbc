use crate::reconciler::CycleReport;
use crate::store::UptimeStore;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub store_status: String,
    pub nodes_tracked: u32,
    pub nodes_online: u32,
    pub cycles_completed: u32,
    pub cycles_failed: u32,
    pub last_cycle: Option<CycleSummary>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    #[serde(with = "time::serde::rfc3339")]
    pub poll: OffsetDateTime,
    pub elapsed_ms: u64,
    pub report: CycleReport,
}

/// Process-level bookkeeping of poll cycles, shared between the poller and
/// the HTTP layer.
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    cycles_completed: Arc<AtomicU32>,
    cycles_failed: Arc<AtomicU32>,
    last_cycle: Arc<Mutex<Option<CycleSummary>>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            cycles_completed: Arc::new(AtomicU32::new(0)),
            cycles_failed: Arc::new(AtomicU32::new(0)),
            last_cycle: Arc::new(Mutex::new(None)),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn record_cycle(&self, summary: CycleSummary) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        *self.last_cycle.lock() = Some(summary);
    }

    pub fn record_failure(&self, error: impl ToString) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error.to_string());
    }

    pub fn get_health(&self, store: &dyn UptimeStore) -> KernelHealth {
        let (store_status, nodes_tracked, nodes_online) = match store.find_nodes() {
            Ok(nodes) => {
                let online = nodes.iter().filter(|n| n.online).count() as u32;
                ("ok".to_string(), nodes.len() as u32, online)
            }
            Err(e) => (format!("unavailable: {e}"), 0, 0),
        };

        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            store_status,
            nodes_tracked,
            nodes_online,
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            last_cycle: self.last_cycle.lock().clone(),
            last_error: self.last_error.lock().clone(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewSession;
    use crate::store::JsonFileStore;

    #[test]
    fn test_health_counts_nodes_and_cycles() {
        let store = JsonFileStore::in_memory();
        let t = OffsetDateTime::from_unix_timestamp(1000).unwrap();
        store.create_node("A", NewSession { start: t, duration_secs: 10 }, t).unwrap();
        store.create_node("B", NewSession { start: t, duration_secs: 10 }, t).unwrap();
        store.sweep_stale(t + time::Duration::seconds(1)).unwrap();

        let tracker = HealthTracker::new();
        tracker.record_cycle(CycleSummary { poll: t, elapsed_ms: 3, report: CycleReport::default() });
        tracker.record_failure("upstream answered with status 502");

        let health = tracker.get_health(&store);
        assert_eq!(health.store_status, "ok");
        assert_eq!(health.nodes_tracked, 2);
        assert_eq!(health.nodes_online, 0);
        assert_eq!(health.cycles_completed, 1);
        assert_eq!(health.cycles_failed, 1);
        assert_eq!(health.last_error.as_deref(), Some("upstream answered with status 502"));
    }
}
