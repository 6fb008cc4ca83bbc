/**
 * SESSION STORE - Persistence interface for nodes, uptime sessions and monthly summaries
 *
 * ROLE:
 * Narrow capability set the reconciler, the aggregator queries and the backfill
 * job depend on. Core logic never knows which technology sits behind it.
 *
 * OPERATION:
 * - UptimeStore trait = every read/write the core needs, each call all-or-nothing
 * - Session writes also stamp the node online with the poll instant, so a
 *   session mutation and its status update can never be split
 * - Reads return owned snapshots; nothing borrowed escapes the lock
 *
 * IMPLEMENTATIONS:
 * - JsonFileStore (json.rs): in-memory image mirrored to a JSON file
 */

pub mod json;

pub use json::JsonFileStore;

use crate::models::{MonthlySummary, NewSession, Node, NodeRecord, SummaryDraft, UptimeSession};
use time::OffsetDateTime;

/// Errors raised by store implementations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("node not found: {0}")]
    NotFound(String),
    #[error("conflicting write for node {0}")]
    Conflict(String),
    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the store itself is unusable rather than a single record.
    pub fn is_structural(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Serialization(_))
    }
}

pub trait UptimeStore: Send + Sync {
    /// All nodes, ordered by key.
    fn find_nodes(&self) -> Result<Vec<Node>, StoreError>;

    /// One node with its sessions ordered by start instant.
    fn find_node(&self, key: &str) -> Result<NodeRecord, StoreError>;

    /// Most recent session of a node, `None` when it has none.
    fn last_session(&self, key: &str) -> Result<Option<UptimeSession>, StoreError>;

    /// Creates an unknown node, online, with its first session.
    fn create_node(
        &self,
        key: &str,
        first: NewSession,
        checked_at: OffsetDateTime,
    ) -> Result<UptimeSession, StoreError>;

    /// Appends a session after the node's last one and marks the node online.
    fn create_session(
        &self,
        key: &str,
        session: NewSession,
        checked_at: OffsetDateTime,
    ) -> Result<UptimeSession, StoreError>;

    /// Grows the duration of the node's live session and marks the node online.
    fn extend_session(
        &self,
        key: &str,
        session_id: u64,
        duration_secs: u64,
        checked_at: OffsetDateTime,
    ) -> Result<UptimeSession, StoreError>;

    /// Marks offline every online node whose last check precedes `poll`.
    fn sweep_stale(&self, poll: OffsetDateTime) -> Result<usize, StoreError>;

    fn create_summary(&self, draft: SummaryDraft) -> Result<MonthlySummary, StoreError>;

    fn find_summaries(&self, key: &str) -> Result<Vec<MonthlySummary>, StoreError>;
}
