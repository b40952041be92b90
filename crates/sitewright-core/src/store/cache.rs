//! TTL snapshot cache
//!
//! Expiry is checked on read; an expired entry is dropped and the caller
//! reads through to the durable record. Inserting past capacity evicts the
//! oldest entry.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::domain::project::ProjectContext;

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: ProjectContext,
    inserted_at: Instant,
}

/// Bounded map of project id to snapshot
#[derive(Debug)]
pub struct SnapshotCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh snapshot for a project, dropping it if expired
    pub fn get(&self, project_id: &str) -> Option<ProjectContext> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(project_id) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.snapshot.clone()),
            Some(_) => {
                entries.remove(project_id);
                None
            }
            None => None,
        }
    }

    /// Snapshot for a project regardless of age
    pub fn peek(&self, project_id: &str) -> Option<ProjectContext> {
        self.entries
            .lock()
            .ok()?
            .get(project_id)
            .map(|e| e.snapshot.clone())
    }

    /// Insert or replace, returning the id evicted to make room
    pub fn insert(&self, snapshot: ProjectContext) -> Option<String> {
        let Ok(mut entries) = self.entries.lock() else {
            return None;
        };
        self.insert_locked(&mut entries, snapshot)
    }

    /// Insert unless the held entry was modified later than `snapshot`
    ///
    /// Returns whether `snapshot` was stored.
    pub fn insert_unless_stale(&self, snapshot: ProjectContext) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        let fresher = entries
            .get(&snapshot.project_id)
            .is_some_and(|held| held.snapshot.last_modified > snapshot.last_modified);
        if fresher {
            return false;
        }
        self.insert_locked(&mut entries, snapshot);
        true
    }

    fn insert_locked(
        &self,
        entries: &mut HashMap<String, CacheEntry>,
        snapshot: ProjectContext,
    ) -> Option<String> {
        let project_id = snapshot.project_id.clone();
        let mut evicted = None;

        if !entries.contains_key(&project_id) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                entries.remove(&id);
                debug!(project_id = %id, "Evicted oldest cache entry");
                evicted = Some(id);
            }
        }

        entries.insert(
            project_id,
            CacheEntry {
                snapshot,
                inserted_at: Instant::now(),
            },
        );
        evicted
    }

    /// Drop one entry
    pub fn invalidate(&self, project_id: &str) -> bool {
        self.entries
            .lock()
            .map(|mut e| e.remove(project_id).is_some())
            .unwrap_or(false)
    }

    /// Drop every entry, returning how many were held
    pub fn clear(&self) -> usize {
        self.entries
            .lock()
            .map(|mut e| {
                let count = e.len();
                e.clear();
                count
            })
            .unwrap_or(0)
    }

    /// Drop expired entries, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached project ids, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}
