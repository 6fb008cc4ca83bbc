/**
 * JSON FILE STORE - UptimeStore backed by a single JSON document
 *
 * OPERATION:
 * - Whole store image kept in memory behind a mutex (reads are snapshots)
 * - Every write is applied to a copy of the image, the copy is written to a
 *   temp file and renamed over the real one, and only then swapped in.
 *   A failed write leaves both the file and the memory image untouched.
 * - `in_memory()` skips the file entirely (tests, dry runs)
 *
 * FILE EXAMPLE:
 * ```json
 * {
 *   "nodes": { "A": { "node": {...}, "sessions": [...] } },
 *   "summaries": [],
 *   "next_session_id": 3,
 *   "next_summary_id": 1
 * }
 * ```
 */

use super::{StoreError, UptimeStore};
use crate::models::{
    MonthlySummary, NewSession, Node, NodeRecord, SummaryDraft, UptimeSession,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreImage {
    nodes: BTreeMap<String, NodeRecord>,
    summaries: Vec<MonthlySummary>,
    next_session_id: u64,
    next_summary_id: u64,
}

impl StoreImage {
    fn record_mut(&mut self, key: &str) -> Result<&mut NodeRecord, StoreError> {
        self.nodes
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn allocate_session_id(&mut self) -> u64 {
        self.next_session_id += 1;
        self.next_session_id
    }
}

pub struct JsonFileStore {
    /// None = memory only
    path: Option<PathBuf>,
    image: Mutex<StoreImage>,
}

impl JsonFileStore {
    /// Opens (or initializes) the store file at `path`.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let image = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                StoreImage::default()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            let image = StoreImage::default();
            write_image(&path, &image)?;
            image
        };

        info!(path = %path.display(), nodes = image.nodes.len(), "store opened");
        Ok(Self { path: Some(path), image: Mutex::new(image) })
    }

    pub fn in_memory() -> Self {
        Self { path: None, image: Mutex::new(StoreImage::default()) }
    }

    /// Applies `apply` to a copy of the image, persists it, then publishes it.
    fn transact<R>(
        &self,
        apply: impl FnOnce(&mut StoreImage) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut image = self.image.lock();
        let mut draft = image.clone();
        let out = apply(&mut draft)?;
        if let Some(path) = &self.path {
            write_image(path, &draft)?;
        }
        *image = draft;
        Ok(out)
    }
}

fn write_image(path: &Path, image: &StoreImage) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(image)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn mark_online(node: &mut Node, checked_at: OffsetDateTime) {
    node.online = true;
    node.last_check = checked_at;
}

impl UptimeStore for JsonFileStore {
    fn find_nodes(&self) -> Result<Vec<Node>, StoreError> {
        let image = self.image.lock();
        Ok(image.nodes.values().map(|r| r.node.clone()).collect())
    }

    fn find_node(&self, key: &str) -> Result<NodeRecord, StoreError> {
        self.image
            .lock()
            .nodes
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn last_session(&self, key: &str) -> Result<Option<UptimeSession>, StoreError> {
        let image = self.image.lock();
        let record = image
            .nodes
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(record.last_session().cloned())
    }

    fn create_node(
        &self,
        key: &str,
        first: NewSession,
        checked_at: OffsetDateTime,
    ) -> Result<UptimeSession, StoreError> {
        let session = self.transact(|image| {
            if image.nodes.contains_key(key) {
                return Err(StoreError::Conflict(key.to_string()));
            }
            let session = UptimeSession {
                id: image.allocate_session_id(),
                start: first.start,
                duration_secs: first.duration_secs,
                updated_at: checked_at,
            };
            let record = NodeRecord {
                node: Node { key: key.to_string(), online: true, last_check: checked_at },
                sessions: vec![session.clone()],
            };
            image.nodes.insert(key.to_string(), record);
            Ok(session)
        })?;
        debug!(node = key, session = session.id, "node created");
        Ok(session)
    }

    fn create_session(
        &self,
        key: &str,
        new: NewSession,
        checked_at: OffsetDateTime,
    ) -> Result<UptimeSession, StoreError> {
        self.transact(|image| {
            let id = image.allocate_session_id();
            let record = image.record_mut(key)?;
            if let Some(last) = record.last_session() {
                // sessions stay ordered by start
                if new.start <= last.start {
                    return Err(StoreError::Conflict(key.to_string()));
                }
            }
            let session = UptimeSession {
                id,
                start: new.start,
                duration_secs: new.duration_secs,
                updated_at: checked_at,
            };
            record.sessions.push(session.clone());
            mark_online(&mut record.node, checked_at);
            Ok(session)
        })
    }

    fn extend_session(
        &self,
        key: &str,
        session_id: u64,
        duration_secs: u64,
        checked_at: OffsetDateTime,
    ) -> Result<UptimeSession, StoreError> {
        self.transact(|image| {
            let record = image.record_mut(key)?;
            let Some(last) = record.sessions.last_mut() else {
                return Err(StoreError::NotFound(key.to_string()));
            };
            // only the live session grows, and only forward
            if last.id != session_id || duration_secs <= last.duration_secs {
                return Err(StoreError::Conflict(key.to_string()));
            }
            last.duration_secs = duration_secs;
            last.updated_at = checked_at;
            let session = last.clone();
            mark_online(&mut record.node, checked_at);
            Ok(session)
        })
    }

    fn sweep_stale(&self, poll: OffsetDateTime) -> Result<usize, StoreError> {
        self.transact(|image| {
            let mut swept = 0;
            for record in image
                .nodes
                .values_mut()
                .filter(|r| r.node.online && r.node.last_check < poll)
            {
                record.node.online = false;
                swept += 1;
            }
            Ok(swept)
        })
    }

    fn create_summary(&self, draft: SummaryDraft) -> Result<MonthlySummary, StoreError> {
        self.transact(|image| {
            if !image.nodes.contains_key(&draft.node_key) {
                return Err(StoreError::NotFound(draft.node_key));
            }
            image.next_summary_id += 1;
            let summary = MonthlySummary {
                id: image.next_summary_id,
                node_key: draft.node_key,
                month: draft.month,
                year: draft.year,
                uptime_secs: draft.uptime_secs,
                downtime_secs: draft.downtime_secs,
                percentage: draft.percentage,
                last_counter: draft.last_counter,
                created_at: OffsetDateTime::now_utc(),
            };
            image.summaries.push(summary.clone());
            Ok(summary)
        })
    }

    fn find_summaries(&self, key: &str) -> Result<Vec<MonthlySummary>, StoreError> {
        let image = self.image.lock();
        if !image.nodes.contains_key(key) {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(image.summaries.iter().filter(|s| s.node_key == key).cloned().collect())
    }
}
