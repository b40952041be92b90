//! Project context store
//!
//! The single writer of the authoritative project record. Reads are served
//! from a TTL cache or read through to the durable record; every successful
//! write refreshes the cache and is broadcast to live subscribers.
//!
//! Public reads and writes return `Option`: `None` means the operation did
//! not take effect, whether because the record is absent or because the
//! durable store failed. The two are logged and recorded as metrics but are
//! deliberately not distinguished for callers.
//!
//! # Usage
//!
//! ```ignore
//! use sitewright_core::store::ContextStore;
//! use sitewright_core::domain::project::{ContextUpdate, ProjectStatus, ProjectType};
//!
//! let store = ContextStore::new(repository, hub, metrics, StoreConfig::default());
//! store.create("project-1", ProjectType::Restaurant).await;
//! let updated = store
//!     .update("project-1", ContextUpdate::new().status(ProjectStatus::InProgress))
//!     .await;
//! ```

pub mod cache;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::domain::events::ContextEvent;
use crate::domain::project::{ContextUpdate, ProjectContext, ProjectType};
use crate::error::Result;
use crate::metrics::{CACHE_HIT_KEY, MetricsCollector, Operation};
use crate::notify::{Connection, NotificationHub};
use crate::storage::ContextRepository;

pub use cache::SnapshotCache;

const NOT_FOUND: &str = "project not found";

type LockMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Cached, instrumented access to the durable project record
pub struct ContextStore {
    repository: Arc<dyn ContextRepository>,
    hub: NotificationHub,
    metrics: Arc<MetricsCollector>,
    config: StoreConfig,
    cache: SnapshotCache,
    update_locks: LockMap,
}

/// Held per-project write lock; its map entry goes once nobody else wants it
struct ProjectLock<'a> {
    locks: &'a LockMap,
    project_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ProjectLock<'_> {
    fn drop(&mut self) {
        // Release first so the guard's reference is not counted
        self.guard.take();
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        let unused = locks
            .get(&self.project_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if unused {
            locks.remove(&self.project_id);
        }
    }
}

impl std::fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStore")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish()
    }
}

impl ContextStore {
    /// Create a store over a durable repository
    pub fn new(
        repository: Arc<dyn ContextRepository>,
        hub: NotificationHub,
        metrics: Arc<MetricsCollector>,
        config: StoreConfig,
    ) -> Self {
        let cache = SnapshotCache::new(config.cache_ttl(), config.max_cache_entries);
        Self {
            repository,
            hub,
            metrics,
            config,
            cache,
            update_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Current snapshot, from cache when fresh
    pub async fn get(&self, project_id: &str) -> Option<ProjectContext> {
        let mut timer = self.metrics.start(Operation::Get, project_id);

        if let Some(snapshot) = self.cache.get(project_id) {
            timer.set(CACHE_HIT_KEY, true);
            self.metrics.succeed(timer);
            debug!(project_id = %project_id, cache_hit = true, "Served context from cache");
            return Some(snapshot);
        }

        timer.set(CACHE_HIT_KEY, false);
        match self.repository.read(project_id).await {
            Ok(Some(snapshot)) => {
                // A write may have landed while the read was in flight
                if !self.cache.insert_unless_stale(snapshot.clone()) {
                    debug!(project_id = %project_id, "Kept fresher cached snapshot");
                }
                self.metrics.succeed(timer);
                debug!(project_id = %project_id, cache_hit = false, "Loaded context from durable record");
                Some(snapshot)
            }
            Ok(None) => {
                self.metrics.fail(timer, NOT_FOUND);
                debug!(project_id = %project_id, "Context not found");
                None
            }
            Err(e) => {
                error!(project_id = %project_id, error = %e, "Failed to read durable record");
                self.metrics.fail(timer, &e);
                None
            }
        }
    }

    /// Current snapshot read straight from the durable record
    pub async fn refresh(&self, project_id: &str) -> Option<ProjectContext> {
        let timer = self.metrics.start(Operation::Refresh, project_id);

        match self.repository.read(project_id).await {
            Ok(Some(snapshot)) => {
                self.cache_snapshot(snapshot.clone());
                self.metrics.succeed(timer);
                Some(snapshot)
            }
            Ok(None) => {
                self.cache.invalidate(project_id);
                self.metrics.fail(timer, NOT_FOUND);
                None
            }
            Err(e) => {
                error!(project_id = %project_id, error = %e, "Failed to refresh durable record");
                self.metrics.fail(timer, &e);
                None
            }
        }
    }

    /// Create a fresh record; `None` if it already exists or the write fails
    pub async fn create(
        &self,
        project_id: &str,
        project_type: ProjectType,
    ) -> Option<ProjectContext> {
        let timer = self.metrics.start(Operation::Create, project_id);
        let _guard = self.lock_project(project_id).await;

        match self.repository.read(project_id).await {
            Ok(Some(_)) => {
                warn!(project_id = %project_id, "Project already exists");
                self.metrics.fail(timer, "project already exists");
                return None;
            }
            Ok(None) => {}
            Err(e) => {
                error!(project_id = %project_id, error = %e, "Failed to read durable record");
                self.metrics.fail(timer, &e);
                return None;
            }
        }

        let snapshot = ProjectContext::new(project_id, project_type);
        if let Err(e) = self.repository.write(&snapshot).await {
            error!(project_id = %project_id, error = %e, "Failed to write durable record");
            self.metrics.fail(timer, &e);
            return None;
        }

        self.cache_snapshot(snapshot.clone());
        self.metrics.succeed(timer);
        info!(project_id = %project_id, project_type = %project_type, "Project created");

        self.hub.broadcast(&ContextEvent::created(snapshot.clone()));
        Some(snapshot)
    }

    /// Replace the named top-level fields and stamp `last_modified`
    ///
    /// Never creates a record. Status changes outside the lifecycle table are
    /// applied and reported, not rejected.
    pub async fn update(&self, project_id: &str, update: ContextUpdate) -> Option<ProjectContext> {
        let mut timer = self.metrics.start(Operation::Update, project_id);
        timer.set("fields", update.field_names());
        let _guard = self.lock_project(project_id).await;

        let mut snapshot = match self.repository.read(project_id).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                debug!(project_id = %project_id, "Update skipped, project not found");
                self.metrics.fail(timer, NOT_FOUND);
                return None;
            }
            Err(e) => {
                error!(project_id = %project_id, error = %e, "Failed to read durable record");
                self.metrics.fail(timer, &e);
                return None;
            }
        };

        let previous_status = snapshot.status;
        let previous_modified = snapshot.last_modified;
        update.apply_to(&mut snapshot);

        if !previous_status.can_transition_to(snapshot.status) {
            warn!(
                project_id = %project_id,
                from = %previous_status,
                to = %snapshot.status,
                "Status change outside the project lifecycle"
            );
            timer.set(
                "invalidTransition",
                format!("{} -> {}", previous_status, snapshot.status),
            );
        }

        snapshot.last_modified = Utc::now().max(previous_modified).max(snapshot.created_at);

        if let Err(e) = self.repository.write(&snapshot).await {
            error!(project_id = %project_id, error = %e, "Failed to write durable record");
            self.metrics.fail(timer, &e);
            return None;
        }

        self.cache_snapshot(snapshot.clone());
        self.metrics.succeed(timer);
        debug!(project_id = %project_id, status = %snapshot.status, "Context updated");

        self.hub.broadcast(&ContextEvent::updated(snapshot.clone()));
        Some(snapshot)
    }

    /// Open a live connection primed with the current snapshot
    ///
    /// Holds the project's write lock until the connection is registered, so
    /// every write either precedes the initial snapshot or reaches the
    /// connection as an event.
    pub async fn connect(&self, project_id: &str) -> Connection {
        let _guard = self.lock_project(project_id).await;
        let current = self.get(project_id).await;
        self.hub.connect(project_id, current)
    }

    /// Read the durable record without touching cache or metrics
    pub async fn read_durable(&self, project_id: &str) -> Result<Option<ProjectContext>> {
        self.repository.read(project_id).await
    }

    /// Ids of every durable record
    pub async fn list_project_ids(&self) -> Result<Vec<String>> {
        self.repository.list_ids().await
    }

    /// Cached snapshot regardless of age, without metrics
    pub fn cached(&self, project_id: &str) -> Option<ProjectContext> {
        self.cache.peek(project_id)
    }

    /// Drop one cache entry
    pub fn invalidate(&self, project_id: &str) -> bool {
        let removed = self.cache.invalidate(project_id);
        debug!(project_id = %project_id, removed, "Cache entry invalidated");
        removed
    }

    /// Drop every cache entry
    pub fn clear(&self) -> usize {
        let cleared = self.cache.clear();
        info!(cleared, "Context cache cleared");
        cleared
    }

    /// Drop the cache entry of an externally deleted project and tell subscribers
    pub fn forget(&self, project_id: &str) {
        self.cache.invalidate(project_id);
        self.hub.broadcast_deleted(project_id);
        info!(project_id = %project_id, "Project forgotten after external deletion");
    }

    /// Drop expired cache entries
    pub fn sweep_expired(&self) -> usize {
        let swept = self.cache.sweep_expired();
        if swept > 0 {
            debug!(swept, "Swept expired cache entries");
        }
        swept
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub fn cached_ids(&self) -> Vec<String> {
        self.cache.keys()
    }

    fn cache_snapshot(&self, snapshot: ProjectContext) {
        self.cache.insert(snapshot);
    }

    async fn lock_project(&self, project_id: &str) -> Option<ProjectLock<'_>> {
        if !self.config.serialize_updates {
            return None;
        }
        let lock = {
            let Ok(mut locks) = self.update_locks.lock() else {
                return None;
            };
            Arc::clone(locks.entry(project_id.to_string()).or_default())
        };
        Some(ProjectLock {
            locks: &self.update_locks,
            project_id: project_id.to_string(),
            guard: Some(lock.lock_owned().await),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::project::{Component, ComponentType, ProjectStatus};
    use crate::error::Error;
    use crate::notify::DeliveryError;
    use crate::storage::InMemoryContextRepository;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn store_with(repository: Arc<dyn ContextRepository>) -> ContextStore {
        let metrics = Arc::new(MetricsCollector::default());
        let hub = NotificationHub::default().with_metrics(Arc::clone(&metrics));
        ContextStore::new(repository, hub, metrics, StoreConfig::default())
    }

    fn store() -> (ContextStore, Arc<InMemoryContextRepository>) {
        let repo = Arc::new(InMemoryContextRepository::new());
        (store_with(repo.clone()), repo)
    }

    /// Repository whose I/O can be switched off
    #[derive(Default)]
    struct FlakyRepository {
        inner: InMemoryContextRepository,
        down: AtomicBool,
    }

    #[async_trait]
    impl ContextRepository for FlakyRepository {
        async fn read(&self, project_id: &str) -> Result<Option<ProjectContext>> {
            if self.down.load(Ordering::SeqCst) {
                return Err(Error::Storage("connection refused".to_string()));
            }
            self.inner.read(project_id).await
        }

        async fn write(&self, context: &ProjectContext) -> Result<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(Error::Storage("connection refused".to_string()));
            }
            self.inner.write(context).await
        }

        async fn list_ids(&self) -> Result<Vec<String>> {
            self.inner.list_ids().await
        }
    }

    /// Repository whose next read stalls after loading the record
    #[derive(Default)]
    struct SlowRepository {
        inner: InMemoryContextRepository,
        stall_next_read: AtomicBool,
    }

    #[async_trait]
    impl ContextRepository for SlowRepository {
        async fn read(&self, project_id: &str) -> Result<Option<ProjectContext>> {
            let record = self.inner.read(project_id).await;
            if self.stall_next_read.swap(false, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            record
        }

        async fn write(&self, context: &ProjectContext) -> Result<()> {
            self.inner.write(context).await
        }

        async fn list_ids(&self) -> Result<Vec<String>> {
            self.inner.list_ids().await
        }
    }

    fn lock_entries(store: &ContextStore) -> usize {
        store.update_locks.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_get_reads_through_then_hits_cache() {
        let (store, repo) = store();
        repo.write(&ProjectContext::new("p", ProjectType::Blog)).await.unwrap();

        let first = store.get("p").await.expect("should load");
        let second = store.get("p").await.expect("should hit cache");

        assert_eq!(first, second);
        let reads = store.metrics().for_project("p");
        assert_eq!(reads[0].cache_hit(), Some(false));
        assert_eq!(reads[1].cache_hit(), Some(true));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let (store, _) = store();
        assert!(store.get("nonexistent").await.is_none());
        let recorded = store.metrics().recent(1);
        assert!(!recorded[0].success);
        assert_eq!(recorded[0].error.as_deref(), Some(NOT_FOUND));
    }

    #[tokio::test]
    async fn test_create_then_duplicate() {
        let (store, repo) = store();
        let created = store.create("p", ProjectType::Restaurant).await.expect("created");
        assert_eq!(created.status, ProjectStatus::Created);
        assert_eq!(repo.len().await, 1);

        assert!(store.create("p", ProjectType::Blog).await.is_none());
        let stored = repo.read("p").await.unwrap().unwrap();
        assert_eq!(stored.project_type, ProjectType::Restaurant);
    }

    #[tokio::test]
    async fn test_update_writes_record_cache_and_broadcasts() {
        let (store, repo) = store();
        store.create("p", ProjectType::Restaurant).await.unwrap();
        let mut connection = store.hub().connect("p", None);

        let updated = store
            .update("p", ContextUpdate::new().status(ProjectStatus::InProgress))
            .await
            .expect("updated");

        assert_eq!(updated.status, ProjectStatus::InProgress);
        assert_eq!(repo.read("p").await.unwrap().unwrap(), updated);
        assert_eq!(store.cached("p"), Some(updated.clone()));

        let events = connection.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].context.as_ref().map(|c| c.status), Some(ProjectStatus::InProgress));
    }

    #[tokio::test]
    async fn test_update_missing_does_not_create() {
        let (store, repo) = store();
        let result = store
            .update("nonexistent", ContextUpdate::new().status(ProjectStatus::InProgress))
            .await;
        assert!(result.is_none());
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_last_modified_is_monotonic() {
        let (store, repo) = store();
        let mut ctx = ProjectContext::new("p", ProjectType::Blog);
        // Record stamped ahead of the local clock
        ctx.last_modified = Utc::now() + chrono::Duration::hours(1);
        repo.write(&ctx).await.unwrap();

        let updated = store
            .update("p", ContextUpdate::new().status(ProjectStatus::InProgress))
            .await
            .unwrap();
        assert!(updated.last_modified >= ctx.last_modified);
    }

    #[tokio::test]
    async fn test_invalid_transition_is_applied_and_tagged() {
        let (store, _) = store();
        store.create("p", ProjectType::Blog).await.unwrap();
        store
            .update(
                "p",
                ContextUpdate::new()
                    .status(ProjectStatus::Completed)
                    .components(vec![Component::new("c", "C", ComponentType::Hero, "home")]),
            )
            .await
            .unwrap();

        let reopened = store
            .update("p", ContextUpdate::new().status(ProjectStatus::InProgress))
            .await
            .unwrap();
        assert_eq!(reopened.status, ProjectStatus::InProgress);

        let last = store.metrics().recent(2);
        let update_metric = last.iter().find(|m| m.operation == Operation::Update).unwrap();
        assert_eq!(
            update_metric.metadata.get("invalidTransition").and_then(|v| v.as_str()),
            Some("completed -> in_progress")
        );
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces_as_none() {
        let repo = Arc::new(FlakyRepository::default());
        let store = store_with(repo.clone());
        store.create("p", ProjectType::Blog).await.unwrap();
        store.clear();

        repo.down.store(true, Ordering::SeqCst);
        assert!(store.get("p").await.is_none());
        assert!(
            store
                .update("p", ContextUpdate::new().status(ProjectStatus::Paused))
                .await
                .is_none()
        );
        assert!(store.metrics().error_rate() > 0.0);
        assert_eq!(store.metrics().top_errors(1)[0].0, "Storage error: connection refused");

        repo.down.store(false, Ordering::SeqCst);
        let recovered = store.get("p").await.unwrap();
        assert_eq!(recovered.status, ProjectStatus::Created);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache() {
        let (store, repo) = store();
        store.create("p", ProjectType::Blog).await.unwrap();

        let mut external = repo.read("p").await.unwrap().unwrap();
        external.status = ProjectStatus::Paused;
        repo.write(&external).await.unwrap();

        assert_eq!(store.get("p").await.unwrap().status, ProjectStatus::Created);
        assert_eq!(store.refresh("p").await.unwrap().status, ProjectStatus::Paused);
        assert_eq!(store.get("p").await.unwrap().status, ProjectStatus::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_reads_through() {
        let (store, repo) = store();
        store.create("p", ProjectType::Blog).await.unwrap();

        let mut external = repo.read("p").await.unwrap().unwrap();
        external.status = ProjectStatus::Cancelled;
        repo.write(&external).await.unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(store.get("p").await.unwrap().status, ProjectStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_invalidate_clear_and_forget() {
        let (store, _) = store();
        store.create("a", ProjectType::Blog).await.unwrap();
        store.create("b", ProjectType::Blog).await.unwrap();
        assert_eq!(store.cache_size(), 2);

        assert!(store.invalidate("a"));
        assert_eq!(store.cached_ids(), vec!["b".to_string()]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = store.hub().subscribe_fn("b", move |e| {
            s.lock().map_err(|_| DeliveryError::Closed)?.push(e.event_type);
            Ok(())
        });
        store.forget("b");
        assert_eq!(store.cache_size(), 0);
        assert_eq!(seen.lock().unwrap().len(), 1);

        store.create("c", ProjectType::Blog).await.unwrap();
        assert_eq!(store.clear(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_updates_to_different_fields_both_land() {
        let (store, _) = store();
        let store = Arc::new(store);
        store.create("p", ProjectType::Portfolio).await.unwrap();

        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .update("p", ContextUpdate::new().status(ProjectStatus::InProgress))
                    .await
            })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut prefs = crate::domain::project::Attributes::new();
                prefs.insert("tone".to_string(), serde_json::json!("playful"));
                store
                    .update("p", ContextUpdate::new().user_preferences(prefs))
                    .await
            })
        };
        assert!(a.await.unwrap().is_some());
        assert!(b.await.unwrap().is_some());

        let final_state = store.refresh("p").await.unwrap();
        assert_eq!(final_state.status, ProjectStatus::InProgress);
        assert_eq!(final_state.user_preferences["tone"], "playful");
    }

    #[tokio::test]
    async fn test_update_locks_are_released() {
        let (store, _) = store();
        for i in 0..100 {
            let id = format!("ghost-{}", i);
            assert!(store.update(&id, ContextUpdate::new().status(ProjectStatus::Paused)).await.is_none());
        }
        assert_eq!(lock_entries(&store), 0);

        store.create("p", ProjectType::Blog).await.unwrap();
        store
            .update("p", ContextUpdate::new().status(ProjectStatus::InProgress))
            .await
            .unwrap();
        assert_eq!(lock_entries(&store), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_contended_lock_entry_survives_until_last_holder() {
        let (store, _) = store();
        let store = Arc::new(store);
        store.create("p", ProjectType::Blog).await.unwrap();

        let first = store.lock_project("p").await.unwrap();
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .update("p", ContextUpdate::new().status(ProjectStatus::InProgress))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(first);
        assert_eq!(lock_entries(&store), 1);

        assert!(waiter.await.unwrap().is_some());
        assert_eq!(lock_entries(&store), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_during_slow_read_sees_concurrent_update() {
        let repo = Arc::new(SlowRepository::default());
        let store = Arc::new(store_with(repo.clone()));
        store.create("p", ProjectType::Blog).await.unwrap();
        store.clear();
        repo.stall_next_read.store(true, Ordering::SeqCst);

        let connecting = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.connect("p").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        store
            .update("p", ContextUpdate::new().status(ProjectStatus::InProgress))
            .await
            .unwrap();

        let mut connection = connecting.await.unwrap();
        let statuses: Vec<_> = connection
            .drain()
            .into_iter()
            .filter_map(|e| e.context.map(|c| c.status))
            .collect();
        assert_eq!(statuses.last(), Some(&ProjectStatus::InProgress));
        assert_eq!(store.get("p").await.unwrap().status, ProjectStatus::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cache_miss_keeps_fresher_update() {
        let repo = Arc::new(SlowRepository::default());
        let store = Arc::new(store_with(repo.clone()));
        let mut ctx = ProjectContext::new("p", ProjectType::Blog);
        ctx.created_at -= chrono::Duration::hours(1);
        ctx.last_modified = ctx.created_at;
        repo.inner.write(&ctx).await.unwrap();
        repo.stall_next_read.store(true, Ordering::SeqCst);

        let reading = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.get("p").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let updated = store
            .update("p", ContextUpdate::new().status(ProjectStatus::InProgress))
            .await
            .unwrap();

        // The stalled read returns what it saw, but does not overwrite the cache
        assert_eq!(reading.await.unwrap().unwrap().status, ProjectStatus::Created);
        assert_eq!(store.cached("p"), Some(updated));
    }
}
