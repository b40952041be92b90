//! Health API
//!
//! Aggregates cache, consistency, listener, error-rate and database checks
//! into one pass/fail report with operator recommendations.

use serde::{Deserialize, Serialize};

use super::ContextService;

/// Cache fill ratio that triggers a warning
const CACHE_PRESSURE_RATIO: f64 = 0.9;
/// Error rates above these trigger warning / error
const ERROR_RATE_WARNING: f64 = 0.1;
const ERROR_RATE_ERROR: f64 = 0.5;

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
}

/// Health status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Warning,
    Error,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Overall system health report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub overall_status: HealthStatus,
    pub healthy: bool,
    pub checks: Vec<HealthCheck>,
    pub recommendations: Vec<String>,
    pub timestamp: String,
}

impl HealthCheck {
    fn new(name: &str, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: Some(message.into()),
        }
    }
}

impl ContextService {
    /// Run all health checks
    pub async fn health_check(&self) -> HealthReport {
        let mut checks = Vec::new();
        let mut recommendations = Vec::new();

        if let Some(check) = self.check_database().await {
            if check.status != HealthStatus::Ok {
                recommendations.push("Verify the database path and file permissions".to_string());
            }
            checks.push(check);
        }

        let cache = self.check_cache();
        if cache.status != HealthStatus::Ok {
            recommendations.push(
                "Raise store.max_cache_entries or lower store.cache_ttl_secs".to_string(),
            );
        }
        checks.push(cache);

        let (consistency, drifting) = self.check_consistency_drift().await;
        if !drifting.is_empty() {
            recommendations.push(format!(
                "Run `sitewright fix` for: {}",
                drifting.join(", ")
            ));
        }
        checks.push(consistency);

        checks.push(self.check_listeners());

        let errors = self.check_error_rate();
        if errors.status != HealthStatus::Ok {
            let top: Vec<String> = self
                .metrics()
                .top_errors(self.metrics().top_errors_limit())
                .into_iter()
                .map(|(message, count)| format!("{} ({}x)", message, count))
                .collect();
            recommendations.push(format!("Investigate recent failures: {}", top.join("; ")));
        }
        checks.push(errors);

        let overall_status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Ok);

        HealthReport {
            overall_status,
            healthy: overall_status != HealthStatus::Error,
            checks,
            recommendations,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    async fn check_database(&self) -> Option<HealthCheck> {
        let db = self.database()?;
        if let Err(e) = db.health_check().await {
            return Some(HealthCheck::new(
                "Database",
                HealthStatus::Error,
                format!("Query failed: {:#}", e),
            ));
        }
        Some(match db.migration_status().await {
            Ok(status) if status.needs_migration => HealthCheck::new(
                "Database",
                HealthStatus::Warning,
                format!(
                    "Schema v{} behind v{} at {}",
                    status.current_version,
                    status.target_version,
                    db.path().display()
                ),
            ),
            Ok(status) => HealthCheck::new(
                "Database",
                HealthStatus::Ok,
                format!(
                    "Connected at {} (schema v{})",
                    db.path().display(),
                    status.current_version
                ),
            ),
            Err(e) => HealthCheck::new("Database", HealthStatus::Error, format!("{:#}", e)),
        })
    }

    fn check_cache(&self) -> HealthCheck {
        let size = self.store().cache_size();
        let max = self.config().store.max_cache_entries.max(1);
        let status = if size as f64 >= max as f64 * CACHE_PRESSURE_RATIO {
            HealthStatus::Warning
        } else {
            HealthStatus::Ok
        };
        HealthCheck::new("Cache", status, format!("{} of {} entries", size, max))
    }

    /// Re-check every cached project; returns the check and drifting ids
    async fn check_consistency_drift(&self) -> (HealthCheck, Vec<String>) {
        let mut drifting = Vec::new();
        let mut count = 0;
        for id in self.store().cached_ids() {
            let report = self.checker().check(&id).await;
            let drift = report.drift_count();
            if drift > 0 {
                count += drift;
                drifting.push(id);
            }
        }

        let check = if count == 0 {
            HealthCheck::new("Consistency", HealthStatus::Ok, "No inconsistencies in cached projects")
        } else {
            HealthCheck::new(
                "Consistency",
                HealthStatus::Warning,
                format!("{} inconsistencies across {} projects", count, drifting.len()),
            )
        };
        (check, drifting)
    }

    fn check_listeners(&self) -> HealthCheck {
        let pruned = self.hub().sweep_dead();
        let total = self.hub().total_listener_count();
        let projects = self.hub().project_ids().len();
        let mut message = format!("{} listeners across {} projects", total, projects);
        if pruned > 0 {
            message.push_str(&format!(", pruned {} dead", pruned));
        }
        HealthCheck::new("Listeners", HealthStatus::Ok, message)
    }

    fn check_error_rate(&self) -> HealthCheck {
        let rate = self.metrics().error_rate();
        let status = if rate > ERROR_RATE_ERROR {
            HealthStatus::Error
        } else if rate > ERROR_RATE_WARNING {
            HealthStatus::Warning
        } else {
            HealthStatus::Ok
        };
        HealthCheck::new(
            "Error Rate",
            status,
            format!("{:.1}% of {} recorded operations failed", rate * 100.0, self.metrics().len()),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::api::ContextService;
    use crate::config::Config;
    use crate::domain::project::{ContextUpdate, ProjectStatus, ProjectType};

    use super::*;

    #[tokio::test]
    async fn test_fresh_service_is_healthy() {
        let service = ContextService::in_memory(Config::default());
        service.create("p", ProjectType::Blog).await.unwrap();

        let report = service.health_check().await;
        assert!(report.healthy);
        assert_eq!(report.overall_status, HealthStatus::Ok);
        assert!(report.recommendations.is_empty());
        let names: Vec<&str> = report.checks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Cache", "Consistency", "Listeners", "Error Rate"]);
    }

    #[tokio::test]
    async fn test_drift_produces_recommendation() {
        let service = ContextService::in_memory(Config::default());
        service.create("p", ProjectType::Blog).await.unwrap();
        service
            .update("p", ContextUpdate::new().status(ProjectStatus::Completed))
            .await
            .unwrap();

        let report = service.health_check().await;
        assert_eq!(report.overall_status, HealthStatus::Warning);
        assert!(report.healthy);
        assert!(report.recommendations.iter().any(|r| r.contains("sitewright fix") && r.contains('p')));
    }

    #[tokio::test]
    async fn test_high_error_rate_is_unhealthy() {
        let service = ContextService::in_memory(Config::default());
        for _ in 0..5 {
            service.get("ghost").await;
        }

        let report = service.health_check().await;
        assert!(!report.healthy);
        assert_eq!(report.overall_status, HealthStatus::Error);
        assert!(report.recommendations.iter().any(|r| r.contains("project not found")));
    }

    #[tokio::test]
    async fn test_database_check_reports_schema_version() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = Some(dir.path().join("contexts.db"));
        let service = ContextService::open(config).await.unwrap();

        let report = service.health_check().await;
        let database = &report.checks[0];
        assert_eq!(database.name, "Database");
        assert_eq!(database.status, HealthStatus::Ok);
        let expected = format!("schema v{}", crate::storage::CURRENT_VERSION);
        assert!(database.message.as_deref().unwrap_or("").contains(&expected));
        service.close().await;
    }

    #[test]
    fn test_status_ordering() {
        assert!(HealthStatus::Error > HealthStatus::Warning);
        assert!(HealthStatus::Warning > HealthStatus::Ok);
    }
}
