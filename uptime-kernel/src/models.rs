use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// A tracked node, keyed by the identifier the upstream source reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub key: String,
    pub online: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub last_check: OffsetDateTime,
}

/// One continuous run of a node between two restarts.
///
/// `start` is inferred (poll instant minus the observed counter) and never
/// changes once written. `duration_secs` is the latest counter observed for
/// this run and only grows while the session is the node's live one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeSession {
    pub id: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    pub duration_secs: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UptimeSession {
    /// Last instant this run was confirmed alive.
    pub fn end(&self) -> OffsetDateTime {
        self.start.saturating_add(Duration::seconds(secs_i64(self.duration_secs)))
    }
}

/// Node metadata together with its sessions, ordered by start instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node: Node,
    pub sessions: Vec<UptimeSession>,
}

impl NodeRecord {
    pub fn last_session(&self) -> Option<&UptimeSession> {
        self.sessions.last()
    }
}

/// Materialized figures for one node and one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    pub id: u64,
    pub node_key: String,
    pub month: u8,
    pub year: i32,
    pub uptime_secs: u64,
    pub downtime_secs: u64,
    pub percentage: f64,
    /// Raw counter of the node's latest session when the summary was built.
    pub last_counter: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields of a summary before the store assigns its id and creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryDraft {
    pub node_key: String,
    pub month: u8,
    pub year: i32,
    pub uptime_secs: u64,
    pub downtime_secs: u64,
    pub percentage: f64,
    pub last_counter: u64,
}

/// Session about to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewSession {
    pub start: OffsetDateTime,
    pub duration_secs: u64,
}

/// One entry of the upstream node list: seconds since the node's process started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub key: String,
    pub start_time: u64,
}

impl Observation {
    pub fn new(key: impl Into<String>, counter_secs: u64) -> Self {
        Self { key: key.into(), start_time: counter_secs }
    }

    pub fn counter(&self) -> u64 {
        self.start_time
    }

    /// Instant the node's process started, as implied by the counter.
    pub fn inferred_start(&self, poll: OffsetDateTime) -> Option<OffsetDateTime> {
        let secs = i64::try_from(self.start_time).ok()?;
        poll.checked_sub(Duration::seconds(secs))
    }
}

/// Uptime figures for one node as returned by the query endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUptime {
    pub key: String,
    pub uptime_seconds: u64,
    pub downtime_seconds: u64,
    pub percentage: f64,
    pub online: bool,
}

pub(crate) fn secs_i64(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// Drops the sub-second part; counters only carry whole seconds.
pub(crate) fn whole_seconds(instant: OffsetDateTime) -> OffsetDateTime {
    instant.replace_nanosecond(0).unwrap_or(instant)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(secs).unwrap()
    }

    #[test]
    fn test_inferred_start_subtracts_counter() {
        let obs = Observation::new("A", 100);
        assert_eq!(obs.inferred_start(at(1000)), Some(at(900)));
    }

    #[test]
    fn test_inferred_start_rejects_absurd_counter() {
        let obs = Observation::new("A", u64::MAX);
        assert_eq!(obs.inferred_start(at(1000)), None);
    }

    #[test]
    fn test_session_end() {
        let session = UptimeSession { id: 1, start: at(500), duration_secs: 1000, updated_at: at(1500) };
        assert_eq!(session.end(), at(1500));
    }

    #[test]
    fn test_observation_wire_format() {
        let obs: Vec<Observation> = serde_json::from_str(r#"[{"key":"abc","start_time":42}]"#).unwrap();
        assert_eq!(obs, vec![Observation::new("abc", 42)]);
        assert!(serde_json::from_str::<Vec<Observation>>(r#"[{"key":"abc","start_time":-1}]"#).is_err());
    }
}
