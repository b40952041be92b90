//! Drift remediation
//!
//! Fixes applied, and only these:
//! - refresh the cached snapshot when it disagrees with the durable record
//! - bump `lastModified` when it precedes `createdAt`
//! - downgrade `completed`/`template_selected` to `in_progress` when the
//!   project has no components
//!
//! Every fix goes through [`ContextStore::update`](crate::store::ContextStore::update)
//! so subscribers see the repaired snapshot. Running twice applies nothing
//! the second time.

use tracing::info;

use crate::domain::project::{ContextUpdate, ProjectStatus};
use crate::error::{Error, Result};
use crate::metrics::Operation;

use super::{ConsistencyChecker, Fix, FixReport, IssueKind};

impl ConsistencyChecker {
    /// Apply the known fixes for a project and re-check it
    pub async fn fix(&self, project_id: &str) -> Result<FixReport> {
        let metrics = self.store().metrics();
        let mut timer = metrics.start(Operation::Remediate, project_id);

        let before = self.check(project_id).await;
        if before.has(IssueKind::MissingRecord) {
            let err = Error::ProjectNotFound(project_id.to_string());
            metrics.fail(timer, &err);
            return Err(err);
        }

        let mut applied = Vec::new();
        if before.has(IssueKind::CacheInconsistency) {
            if self.store().refresh(project_id).await.is_none() {
                let err = Error::Storage(format!("refresh of '{}' did not take effect", project_id));
                metrics.fail(timer, &err);
                return Err(err);
            }
            applied.push(Fix::RefreshedCache);
        }

        let Some(snapshot) = self.store().get(project_id).await else {
            let err = Error::ProjectNotFound(project_id.to_string());
            metrics.fail(timer, &err);
            return Err(err);
        };

        let mut update = ContextUpdate::new();
        let mut needs_write = false;
        if snapshot.last_modified < snapshot.created_at {
            applied.push(Fix::BumpedLastModified);
            needs_write = true;
        }
        if snapshot.status.requires_components() && snapshot.components.is_empty() {
            let to = ProjectStatus::InProgress;
            applied.push(Fix::DowngradedStatus {
                from: snapshot.status,
                to,
            });
            update = update.status(to);
            needs_write = true;
        }

        if needs_write && self.store().update(project_id, update).await.is_none() {
            let err = Error::Storage(format!("remediation write for '{}' did not take effect", project_id));
            metrics.fail(timer, &err);
            return Err(err);
        }

        let after = self.check(project_id).await;
        timer.set("fixCount", applied.len());
        timer.set("resolved", after.is_consistent);
        metrics.succeed(timer);

        if !applied.is_empty() {
            let fixes: Vec<String> = applied.iter().map(ToString::to_string).collect();
            info!(
                project_id = %project_id,
                fixes = %fixes.join("; "),
                resolved = after.is_consistent,
                "Remediation applied"
            );
        }

        Ok(FixReport {
            project_id: project_id.to_string(),
            applied,
            before,
            after,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{ConsistencyConfig, StoreConfig};
    use crate::domain::project::{Component, ComponentType, Page, ProjectType};
    use crate::metrics::MetricsCollector;
    use crate::notify::NotificationHub;
    use crate::storage::{ContextRepository, InMemoryContextRepository};
    use crate::store::ContextStore;

    async fn setup() -> (ConsistencyChecker, Arc<InMemoryContextRepository>) {
        let repo = Arc::new(InMemoryContextRepository::new());
        let store = Arc::new(ContextStore::new(
            repo.clone(),
            NotificationHub::default(),
            Arc::new(MetricsCollector::default()),
            StoreConfig::default(),
        ));
        store.create("p", ProjectType::Ecommerce).await.unwrap();
        (ConsistencyChecker::new(store, &ConsistencyConfig::default()), repo)
    }

    #[tokio::test]
    async fn test_fix_downgrades_empty_completed_project() {
        let (checker, _) = setup().await;
        checker
            .store()
            .update("p", ContextUpdate::new().status(ProjectStatus::Completed))
            .await
            .unwrap();

        let report = checker.fix("p").await.unwrap();
        assert!(!report.before.is_consistent);
        assert!(report.resolved());
        assert_eq!(
            report.applied,
            vec![Fix::DowngradedStatus {
                from: ProjectStatus::Completed,
                to: ProjectStatus::InProgress
            }]
        );
        let current = checker.store().get("p").await.unwrap();
        assert_eq!(current.status, ProjectStatus::InProgress);
    }

    #[tokio::test]
    async fn test_fix_bumps_last_modified() {
        let (checker, repo) = setup().await;
        let mut broken = repo.read("p").await.unwrap().unwrap();
        broken.last_modified = broken.created_at - chrono::Duration::minutes(1);
        repo.write(&broken).await.unwrap();
        checker.store().invalidate("p");

        let report = checker.fix("p").await.unwrap();
        assert!(report.before.has(IssueKind::TimestampOrder));
        assert!(report.applied.contains(&Fix::BumpedLastModified));
        assert!(report.resolved());

        let stored = repo.read("p").await.unwrap().unwrap();
        assert!(stored.last_modified >= stored.created_at);
    }

    #[tokio::test]
    async fn test_fix_refreshes_stale_cache() {
        let (checker, repo) = setup().await;
        let mut external = repo.read("p").await.unwrap().unwrap();
        external.last_modified += chrono::Duration::seconds(5);
        repo.write(&external).await.unwrap();

        let report = checker.fix("p").await.unwrap();
        assert_eq!(report.applied, vec![Fix::RefreshedCache]);
        assert!(!report.after.has(IssueKind::CacheInconsistency));
    }

    #[tokio::test]
    async fn test_fix_is_idempotent() {
        let (checker, _) = setup().await;
        checker
            .store()
            .update("p", ContextUpdate::new().status(ProjectStatus::TemplateSelected))
            .await
            .unwrap();

        let first = checker.fix("p").await.unwrap();
        assert_eq!(first.applied.len(), 1);
        let second = checker.fix("p").await.unwrap();
        assert!(second.applied.is_empty());
        assert!(second.resolved());
    }

    #[tokio::test]
    async fn test_fix_leaves_unfixable_issues_reported() {
        let (checker, _) = setup().await;
        checker
            .store()
            .update(
                "p",
                ContextUpdate::new()
                    .components(vec![Component::new("c", "C", ComponentType::Hero, "home")])
                    .pages(vec![Page::new("home", "Home", "/").with_components(["c", "ghost"])]),
            )
            .await
            .unwrap();

        let report = checker.fix("p").await.unwrap();
        assert!(report.applied.is_empty());
        assert!(!report.resolved());
        assert!(report.after.has(IssueKind::BrokenReference));
    }

    #[tokio::test]
    async fn test_fix_missing_project() {
        let (checker, _) = setup().await;
        let err = checker.fix("ghost").await.unwrap_err();
        assert_eq!(err.code(), "E001");
    }
}
