//! Consistency checking and remediation
//!
//! A run compares a store snapshot against itself and against the durable
//! record in four phases:
//! - internal: required fields, enum membership, timestamp ordering
//! - external: cached `lastModified` against the durable record
//! - state: status rules and conversation pairing
//! - reference: page/component referential integrity and orphans
//!
//! Each run is appended to a bounded per-project history. Remediation lives
//! in [`remediation`] and only ever applies the narrow set of fixes in
//! [`Fix`].

pub mod remediation;
pub mod report;

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::config::ConsistencyConfig;
use crate::domain::project::ProjectContext;
use crate::metrics::{Operation, OperationTimer};
use crate::store::ContextStore;
use crate::validation::{Findings, Rule, RuleValidator, Severity, ValidationReport, rules};

pub use report::{ConsistencyIssue, ConsistencyReport, Fix, FixReport, IssueKind, Phase};

/// Drift detector over a [`ContextStore`]
#[derive(Debug)]
pub struct ConsistencyChecker {
    store: Arc<ContextStore>,
    internal_rules: RuleValidator,
    state_rules: RuleValidator,
    history_limit: usize,
    history: Mutex<HashMap<String, VecDeque<ConsistencyReport>>>,
}

impl ConsistencyChecker {
    pub fn new(store: Arc<ContextStore>, config: &ConsistencyConfig) -> Self {
        let mut internal_rules = RuleValidator::new();
        internal_rules.add_rule(Rule::new(
            rules::REQUIRED_FIELDS,
            Severity::Error,
            rules::required_fields,
        ));
        internal_rules.add_rule(Rule::new(
            rules::VALID_PROJECT_TYPE,
            Severity::Error,
            rules::valid_project_type,
        ));
        internal_rules.add_rule(Rule::new(
            rules::VALID_STATUS,
            Severity::Error,
            rules::valid_status,
        ));
        internal_rules.add_rule(Rule::new("entity_fields", Severity::Error, entity_fields));

        let mut state_rules = RuleValidator::new();
        state_rules.add_rule(Rule::new(
            rules::STATUS_CONSISTENCY,
            Severity::Error,
            rules::status_consistency,
        ));
        state_rules.add_rule(Rule::new(
            rules::CONVERSATION_STATE,
            Severity::Error,
            rules::conversation_state,
        ));

        Self {
            store,
            internal_rules,
            state_rules,
            history_limit: config.history_limit.max(1),
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    /// Run every phase for one project and record the result
    pub async fn check(&self, project_id: &str) -> ConsistencyReport {
        let mut timer = self
            .store
            .metrics()
            .start(Operation::ConsistencyCheck, project_id);

        let issues = match self.store.get(project_id).await {
            Some(snapshot) => {
                let mut issues = self.internal_phase(&snapshot);
                issues.extend(self.external_phase(&snapshot).await);
                issues.extend(self.state_phase(&snapshot));
                issues.extend(reference_phase(&snapshot));
                issues
            }
            None => vec![ConsistencyIssue::error(
                Phase::External,
                IssueKind::MissingRecord,
                format!("Project '{}' could not be loaded", project_id),
            )],
        };

        let report = ConsistencyReport::new(project_id, issues);
        self.finish(&mut timer, &report);
        self.store.metrics().succeed(timer);
        self.remember(report.clone());
        report
    }

    /// Check every known project, durable and cached
    pub async fn check_all(&self) -> Vec<ConsistencyReport> {
        let mut ids: BTreeSet<String> = self.store.cached_ids().into_iter().collect();
        match self.store.list_project_ids().await {
            Ok(durable) => ids.extend(durable),
            Err(e) => warn!(error = %e, "Could not list durable records, checking cached projects only"),
        }

        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            reports.push(self.check(&id).await);
        }
        reports
    }

    /// Past runs for a project, oldest first
    pub fn history(&self, project_id: &str) -> Vec<ConsistencyReport> {
        self.history
            .lock()
            .map(|h| {
                h.get(project_id)
                    .map(|runs| runs.iter().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Most recent run for a project
    pub fn latest(&self, project_id: &str) -> Option<ConsistencyReport> {
        self.history
            .lock()
            .ok()?
            .get(project_id)
            .and_then(|runs| runs.back().cloned())
    }

    /// Drift found by the latest run of every checked project
    pub fn inconsistency_count(&self) -> usize {
        self.history
            .lock()
            .map(|h| {
                h.values()
                    .filter_map(|runs| runs.back())
                    .map(ConsistencyReport::drift_count)
                    .sum()
            })
            .unwrap_or(0)
    }

    fn internal_phase(&self, snapshot: &ProjectContext) -> Vec<ConsistencyIssue> {
        let mut issues = from_validation(
            Phase::Internal,
            IssueKind::InvalidData,
            self.internal_rules.validate(snapshot),
        );
        if snapshot.last_modified < snapshot.created_at {
            issues.push(ConsistencyIssue::error(
                Phase::Internal,
                IssueKind::TimestampOrder,
                "lastModified precedes createdAt",
            ));
        }
        issues
    }

    async fn external_phase(&self, snapshot: &ProjectContext) -> Vec<ConsistencyIssue> {
        match self.store.read_durable(&snapshot.project_id).await {
            Ok(Some(durable)) if durable.last_modified != snapshot.last_modified => {
                vec![ConsistencyIssue::warning(
                    Phase::External,
                    IssueKind::CacheInconsistency,
                    format!(
                        "Cached lastModified {} differs from durable record {}, refresh the project",
                        snapshot.last_modified.to_rfc3339(),
                        durable.last_modified.to_rfc3339()
                    ),
                )]
            }
            Ok(Some(_)) => Vec::new(),
            Ok(None) => vec![ConsistencyIssue::error(
                Phase::External,
                IssueKind::MissingRecord,
                "Cached project has no durable record",
            )],
            Err(e) => vec![ConsistencyIssue::warning(
                Phase::External,
                IssueKind::StorageUnavailable,
                format!("Could not read durable record: {}", e),
            )],
        }
    }

    fn state_phase(&self, snapshot: &ProjectContext) -> Vec<ConsistencyIssue> {
        from_validation(
            Phase::State,
            IssueKind::StateViolation,
            self.state_rules.validate(snapshot),
        )
    }

    fn finish(&self, timer: &mut OperationTimer, report: &ConsistencyReport) {
        timer.set("issueCount", report.issues.len());
        timer.set("isConsistent", report.is_consistent);
        if report.issues.is_empty() {
            debug!(project_id = %report.project_id, "Project is consistent");
        } else {
            for issue in &report.issues {
                warn!(
                    project_id = %report.project_id,
                    phase = %issue.phase,
                    kind = %issue.kind,
                    "{}",
                    issue.message
                );
            }
        }
    }

    fn remember(&self, report: ConsistencyReport) {
        let Ok(mut history) = self.history.lock() else {
            return;
        };
        let runs = history.entry(report.project_id.clone()).or_default();
        runs.push_back(report);
        while runs.len() > self.history_limit {
            runs.pop_front();
        }
    }
}

fn from_validation(phase: Phase, kind: IssueKind, report: ValidationReport) -> Vec<ConsistencyIssue> {
    let errors = report
        .errors
        .into_iter()
        .map(|m| ConsistencyIssue::error(phase, kind, m));
    let warnings = report
        .warnings
        .into_iter()
        .map(|m| ConsistencyIssue::warning(phase, kind, m));
    errors.chain(warnings).collect()
}

fn entity_fields(snapshot: &ProjectContext) -> Findings {
    let mut findings = Findings::new();
    for (index, component) in snapshot.components.iter().enumerate() {
        if component.id.trim().is_empty() || component.name.trim().is_empty() {
            findings.error(format!("Component at index {} is missing an id or name", index));
        }
    }
    for (index, page) in snapshot.pages.iter().enumerate() {
        if page.id.trim().is_empty() || page.name.trim().is_empty() {
            findings.error(format!("Page at index {} is missing an id or name", index));
        } else if !page.path.starts_with('/') {
            findings.error(format!("Page '{}' path must begin with '/'", page.id));
        }
    }
    findings
}

fn reference_phase(snapshot: &ProjectContext) -> Vec<ConsistencyIssue> {
    let mut issues = Vec::new();

    let mut seen = HashSet::new();
    for component in &snapshot.components {
        if !component.id.is_empty() && !seen.insert(component.id.as_str()) {
            issues.push(ConsistencyIssue::error(
                Phase::Reference,
                IssueKind::DuplicateId,
                format!("Duplicate component id '{}'", component.id),
            ));
        }
    }
    let mut seen = HashSet::new();
    for page in &snapshot.pages {
        if !page.id.is_empty() && !seen.insert(page.id.as_str()) {
            issues.push(ConsistencyIssue::error(
                Phase::Reference,
                IssueKind::DuplicateId,
                format!("Duplicate page id '{}'", page.id),
            ));
        }
    }

    for (page_id, component_id) in snapshot.broken_references() {
        issues.push(ConsistencyIssue::error(
            Phase::Reference,
            IssueKind::BrokenReference,
            format!(
                "Page '{}' references non-existent component '{}'",
                page_id, component_id
            ),
        ));
    }
    for orphan in snapshot.orphan_components() {
        issues.push(ConsistencyIssue::warning(
            Phase::Reference,
            IssueKind::OrphanComponent,
            format!("Component '{}' is not referenced by any page", orphan.id),
        ));
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::domain::project::{Component, ComponentType, ContextUpdate, Page, ProjectStatus, ProjectType};
    use crate::metrics::MetricsCollector;
    use crate::notify::NotificationHub;
    use crate::storage::{ContextRepository, InMemoryContextRepository};

    async fn setup() -> (ConsistencyChecker, Arc<InMemoryContextRepository>) {
        let repo = Arc::new(InMemoryContextRepository::new());
        let metrics = Arc::new(MetricsCollector::default());
        let store = Arc::new(ContextStore::new(
            repo.clone(),
            NotificationHub::default(),
            metrics,
            StoreConfig::default(),
        ));
        store.create("p", ProjectType::Restaurant).await.unwrap();
        (ConsistencyChecker::new(store, &ConsistencyConfig::default()), repo)
    }

    #[tokio::test]
    async fn test_fresh_project_is_consistent() {
        let (checker, _) = setup().await;
        let report = checker.check("p").await;
        assert!(report.is_consistent);
        assert!(report.issues.is_empty(), "{:?}", report.issues);
    }

    #[tokio::test]
    async fn test_missing_project() {
        let (checker, _) = setup().await;
        let report = checker.check("ghost").await;
        assert!(!report.is_consistent);
        assert!(report.has(IssueKind::MissingRecord));
    }

    #[tokio::test]
    async fn test_external_write_is_cache_inconsistency_warning() {
        let (checker, repo) = setup().await;
        checker.store().get("p").await.unwrap();

        let mut external = repo.read("p").await.unwrap().unwrap();
        external.last_modified += chrono::Duration::seconds(30);
        repo.write(&external).await.unwrap();

        let report = checker.check("p").await;
        assert!(report.is_consistent);
        assert!(report.has(IssueKind::CacheInconsistency));
        assert_eq!(report.drift_count(), 1);
    }

    #[tokio::test]
    async fn test_state_and_reference_phases() {
        let (checker, _) = setup().await;
        checker
            .store()
            .update(
                "p",
                ContextUpdate::new()
                    .status(ProjectStatus::Completed)
                    .pages(vec![Page::new("home", "Home", "/").with_components(["ghost-1"])]),
            )
            .await
            .unwrap();

        let report = checker.check("p").await;
        assert!(!report.is_consistent);
        assert!(report.has(IssueKind::StateViolation));
        assert!(report.has(IssueKind::BrokenReference));
        let phases: HashSet<Phase> = report.issues.iter().map(|i| i.phase).collect();
        assert!(phases.contains(&Phase::State));
        assert!(phases.contains(&Phase::Reference));
    }

    #[tokio::test]
    async fn test_orphans_are_warnings() {
        let (checker, _) = setup().await;
        checker
            .store()
            .update(
                "p",
                ContextUpdate::new()
                    .components(vec![Component::new("c", "C", ComponentType::Hero, "home")]),
            )
            .await
            .unwrap();

        let report = checker.check("p").await;
        assert!(report.is_consistent);
        assert!(report.has(IssueKind::OrphanComponent));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let (checker, _) = setup().await;
        for _ in 0..15 {
            checker.check("p").await;
        }
        let history = checker.history("p");
        assert_eq!(history.len(), 10);
        assert!(history[0].checked_at <= history[9].checked_at);
        assert!(checker.latest("p").is_some());
        assert!(checker.history("other").is_empty());
    }

    #[tokio::test]
    async fn test_check_all_covers_durable_records() {
        let (checker, _) = setup().await;
        checker.store().create("q", ProjectType::Blog).await.unwrap();
        checker.store().clear();

        let reports = checker.check_all().await;
        let ids: Vec<&str> = reports.iter().map(|r| r.project_id.as_str()).collect();
        assert_eq!(ids, vec!["p", "q"]);
        assert_eq!(checker.inconsistency_count(), 0);
    }
}
