//! Service API
//!
//! [`ContextService`] is the composition root of the subsystem: it builds the
//! metrics collector, notification hub, context store, validator and
//! consistency checker from one [`Config`] and hands out the operations
//! callers and operators need. There is no global instance; whoever owns the
//! process owns the service.

pub mod health;

use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;

use crate::config::Config;
use crate::consistency::{ConsistencyChecker, ConsistencyReport, FixReport};
use crate::domain::project::{ContextUpdate, ProjectContext, ProjectType};
use crate::error::Result;
use crate::metrics::{MetricsCollector, MetricsSummary};
use crate::notify::{Connection, Listener, NotificationHub, Subscription};
use crate::storage::{
    ContextRepository, Database, InMemoryContextRepository, SqliteContextRepository,
};
use crate::store::ContextStore;
use crate::validation::{RuleValidator, ValidationReport};

pub use health::{HealthCheck, HealthReport, HealthStatus};

/// Owned handle on the whole project-context subsystem
#[derive(Debug)]
pub struct ContextService {
    config: Config,
    metrics: Arc<MetricsCollector>,
    hub: NotificationHub,
    store: Arc<ContextStore>,
    validator: RuleValidator,
    checker: ConsistencyChecker,
    database: Option<Database>,
}

impl ContextService {
    /// Open a service backed by the SQLite database named in `config`
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let path = config.database_path();
        let database = Database::open(&config)
            .await
            .with_context(|| format!("Failed to open context database at {}", path.display()))?;
        let repository = Arc::new(SqliteContextRepository::new(database.pool().clone()));

        info!(path = %path.display(), "Context service opened");
        let mut service = Self::with_repository(config, repository);
        service.database = Some(database);
        Ok(service)
    }

    /// Service over a process-local repository
    pub fn in_memory(config: Config) -> Self {
        Self::with_repository(config, Arc::new(InMemoryContextRepository::new()))
    }

    /// Service over any durable repository
    pub fn with_repository(config: Config, repository: Arc<dyn ContextRepository>) -> Self {
        let metrics = Arc::new(MetricsCollector::from_config(&config.metrics));
        let hub = NotificationHub::new(config.notify.clone()).with_metrics(Arc::clone(&metrics));
        let store = Arc::new(ContextStore::new(
            repository,
            hub.clone(),
            Arc::clone(&metrics),
            config.store.clone(),
        ));
        let validator = RuleValidator::with_default_rules().with_metrics(Arc::clone(&metrics));
        let checker = ConsistencyChecker::new(Arc::clone(&store), &config.consistency);

        Self {
            config,
            metrics,
            hub,
            store,
            validator,
            checker,
            database: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn checker(&self) -> &ConsistencyChecker {
        &self.checker
    }

    pub fn validator(&self) -> &RuleValidator {
        &self.validator
    }

    /// Mutable access for registering custom rules
    pub fn validator_mut(&mut self) -> &mut RuleValidator {
        &mut self.validator
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub async fn get(&self, project_id: &str) -> Option<ProjectContext> {
        self.store.get(project_id).await
    }

    pub async fn refresh(&self, project_id: &str) -> Option<ProjectContext> {
        self.store.refresh(project_id).await
    }

    pub async fn create(&self, project_id: &str, project_type: ProjectType) -> Option<ProjectContext> {
        self.store.create(project_id, project_type).await
    }

    pub async fn update(&self, project_id: &str, update: ContextUpdate) -> Option<ProjectContext> {
        self.store.update(project_id, update).await
    }

    /// Register a listener for one project's events
    pub fn subscribe(&self, project_id: &str, listener: Arc<dyn Listener>) -> Subscription {
        self.hub.subscribe(project_id, listener)
    }

    /// Open a live connection primed with the current snapshot
    pub async fn connect(&self, project_id: &str) -> Connection {
        self.store.connect(project_id).await
    }

    /// Drop the cache entry of an externally deleted project and notify subscribers
    pub fn forget(&self, project_id: &str) {
        self.store.forget(project_id);
    }

    pub fn clear_cache(&self) -> usize {
        self.store.clear()
    }

    /// Validate the current snapshot; `None` when it cannot be loaded
    pub async fn validate(&self, project_id: &str) -> Option<ValidationReport> {
        let snapshot = self.store.get(project_id).await?;
        Some(self.validator.validate(&snapshot))
    }

    pub async fn check_consistency(&self, project_id: &str) -> ConsistencyReport {
        self.checker.check(project_id).await
    }

    pub async fn check_all(&self) -> Vec<ConsistencyReport> {
        self.checker.check_all().await
    }

    pub fn consistency_history(&self, project_id: &str) -> Vec<ConsistencyReport> {
        self.checker.history(project_id)
    }

    pub async fn fix(&self, project_id: &str) -> Result<FixReport> {
        self.checker.fix(project_id).await
    }

    pub fn metrics_summary(&self) -> MetricsSummary {
        self.metrics.summary()
    }

    /// Close the database pool, if any
    pub async fn close(&self) {
        if let Some(db) = &self.database {
            db.close().await;
        }
    }
}
