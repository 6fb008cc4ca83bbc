/**
 * SESSION RECONCILER - Maps fresh counter observations onto stored uptime sessions
 *
 * ROLE:
 * For each observed node, decide whether its counter continues the last known
 * session or starts a new one, write that decision, and mark the node online.
 * After a batch, nodes the batch did not confirm are swept offline.
 *
 * DECISION (see `decide`):
 * - counter below the configured minimum: ignored entirely
 * - unknown node: node + first session created
 * - counter not above the last session's duration: the process restarted
 * - last session's confirmed end + stale offset before the poll: the old run
 *   can no longer be vouched for, a new one starts
 * - otherwise the last session's duration becomes the counter
 *
 * A new session starts at poll - counter and lasts counter seconds, so its end
 * is always the poll instant. A stale counter whose run began at or before the
 * last session's start is that same run and extends it instead.
 */

use crate::models::{secs_i64, NewSession, Node, Observation, UptimeSession};
use crate::search::{find_sorted_by_key, is_sorted_by_key};
use crate::store::{StoreError, UptimeStore};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

pub const DEFAULT_STALE_OFFSET_SECS: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Counters strictly below this are noise.
    pub min_counter_secs: u64,
    /// Expected duration of one reconciliation round.
    pub stale_offset_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { min_counter_secs: 0, stale_offset_secs: DEFAULT_STALE_OFFSET_SECS }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartReason {
    FirstSession,
    Restart,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Extend { session_id: u64, duration_secs: u64 },
    Start { session: NewSession, reason: StartReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileEffect {
    BelowThreshold,
    NodeCreated,
    SessionStarted(StartReason),
    SessionExtended,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("counter {counter}s for node {key} is out of range")]
    CounterOutOfRange { key: String, counter: u64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one reconcile pass over a batch of observations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub observed: usize,
    pub below_threshold: usize,
    pub duplicates: usize,
    pub nodes_created: usize,
    pub sessions_started: usize,
    pub sessions_extended: usize,
    pub failed: usize,
    pub swept_offline: usize,
}

/// Pure extend-or-start decision for a node that already exists.
pub fn decide(
    last: Option<&UptimeSession>,
    counter: u64,
    inferred_start: OffsetDateTime,
    poll: OffsetDateTime,
    stale_offset_secs: u64,
) -> Decision {
    let fresh = |reason| Decision::Start {
        session: NewSession { start: inferred_start, duration_secs: counter },
        reason,
    };

    let Some(last) = last else {
        return fresh(StartReason::FirstSession);
    };

    let reason = if counter <= last.duration_secs {
        Some(StartReason::Restart)
    } else {
        let trusted_until = last
            .start
            .unix_timestamp()
            .saturating_add(secs_i64(last.duration_secs))
            .saturating_add(secs_i64(stale_offset_secs));
        (trusted_until < poll.unix_timestamp()).then_some(StartReason::Stale)
    };

    match reason {
        None => Decision::Extend { session_id: last.id, duration_secs: counter },
        // the observed run began no later than the last session: same run,
        // only the polls in between were missed
        Some(StartReason::Stale) if inferred_start <= last.start => {
            let duration = (poll - last.start).whole_seconds().max(0) as u64;
            Decision::Extend { session_id: last.id, duration_secs: duration.min(counter) }
        }
        Some(reason) => fresh(reason),
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn UptimeStore>,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(store: Arc<dyn UptimeStore>, config: ReconcileConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> ReconcileConfig {
        self.config
    }

    /// Reconciles one observation. `known` is the node list, sorted by key,
    /// read at the start of the batch.
    pub fn reconcile(
        &self,
        known: &[Node],
        obs: &Observation,
        poll: OffsetDateTime,
    ) -> Result<ReconcileEffect, ReconcileError> {
        let counter = obs.counter();
        if counter < self.config.min_counter_secs {
            return Ok(ReconcileEffect::BelowThreshold);
        }
        let inferred_start = obs.inferred_start(poll).ok_or_else(|| ReconcileError::CounterOutOfRange {
            key: obs.key.clone(),
            counter,
        })?;

        if find_sorted_by_key(known, &obs.key, |n| n.key.as_str()).is_none() {
            let first = NewSession { start: inferred_start, duration_secs: counter };
            self.store.create_node(&obs.key, first, poll)?;
            return Ok(ReconcileEffect::NodeCreated);
        }

        let last = match self.store.last_session(&obs.key) {
            Ok(last) => last,
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        match decide(last.as_ref(), counter, inferred_start, poll, self.config.stale_offset_secs) {
            Decision::Extend { session_id, duration_secs } => {
                self.store.extend_session(&obs.key, session_id, duration_secs, poll)?;
                Ok(ReconcileEffect::SessionExtended)
            }
            Decision::Start { session, reason } => {
                self.store.create_session(&obs.key, session, poll)?;
                Ok(ReconcileEffect::SessionStarted(reason))
            }
        }
    }

    /// Reconciles a whole source batch node by node, then sweeps the nodes
    /// the batch did not confirm. Only a failure to list nodes aborts.
    pub fn reconcile_batch(
        &self,
        observations: &[Observation],
        poll: OffsetDateTime,
    ) -> Result<CycleReport, StoreError> {
        let mut known = self.store.find_nodes()?;
        if !is_sorted_by_key(&known, |n| n.key.as_str()) {
            known.sort_by(|a, b| a.key.cmp(&b.key));
        }

        let mut report = CycleReport { observed: observations.len(), ..CycleReport::default() };
        let mut seen: HashSet<&str> = HashSet::with_capacity(observations.len());

        for obs in observations {
            if !seen.insert(obs.key.as_str()) {
                warn!(node = %obs.key, "duplicate observation in batch, ignored");
                report.duplicates += 1;
                continue;
            }
            match self.reconcile(&known, obs, poll) {
                Ok(effect) => {
                    debug!(node = %obs.key, counter = obs.counter(), ?effect, "reconciled");
                    match effect {
                        ReconcileEffect::BelowThreshold => report.below_threshold += 1,
                        ReconcileEffect::NodeCreated => report.nodes_created += 1,
                        ReconcileEffect::SessionStarted(_) => report.sessions_started += 1,
                        ReconcileEffect::SessionExtended => report.sessions_extended += 1,
                    }
                }
                Err(e) => {
                    error!(node = %obs.key, error = %e, "failed to reconcile node");
                    report.failed += 1;
                }
            }
        }

        match self.store.sweep_stale(poll) {
            Ok(swept) => report.swept_offline = swept,
            Err(e) => error!(error = %e, "failed to sweep stale nodes offline"),
        }

        Ok(report)
    }
}
