//! Consistency check results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::project::ProjectStatus;
use crate::validation::Severity;

/// Stage of a consistency run that produced an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Internal,
    External,
    State,
    Reference,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Internal => "internal",
            Self::External => "external",
            Self::State => "state",
            Self::Reference => "reference",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    InvalidData,
    TimestampOrder,
    MissingRecord,
    CacheInconsistency,
    StorageUnavailable,
    StateViolation,
    BrokenReference,
    DuplicateId,
    OrphanComponent,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidData => "invalid_data",
            Self::TimestampOrder => "timestamp_order",
            Self::MissingRecord => "missing_record",
            Self::CacheInconsistency => "cache_inconsistency",
            Self::StorageUnavailable => "storage_unavailable",
            Self::StateViolation => "state_violation",
            Self::BrokenReference => "broken_reference",
            Self::DuplicateId => "duplicate_id",
            Self::OrphanComponent => "orphan_component",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyIssue {
    pub phase: Phase,
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
}

impl ConsistencyIssue {
    pub fn error(phase: Phase, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            phase,
            kind,
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(phase: Phase, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            phase,
            kind,
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

/// Outcome of one consistency run for one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub project_id: String,
    /// True when no issue has error severity
    pub is_consistent: bool,
    pub issues: Vec<ConsistencyIssue>,
    pub checked_at: DateTime<Utc>,
}

impl ConsistencyReport {
    pub(crate) fn new(project_id: &str, issues: Vec<ConsistencyIssue>) -> Self {
        let is_consistent = !issues.iter().any(|i| i.severity == Severity::Error);
        Self {
            project_id: project_id.to_string(),
            is_consistent,
            issues,
            checked_at: Utc::now(),
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ConsistencyIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ConsistencyIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    pub fn has(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }

    /// Issues that count as drift: every error plus cache inconsistencies
    pub fn drift_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error || i.kind == IssueKind::CacheInconsistency)
            .count()
    }
}

/// A remediation step that was applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "fix", rename_all = "snake_case")]
pub enum Fix {
    RefreshedCache,
    BumpedLastModified,
    DowngradedStatus { from: ProjectStatus, to: ProjectStatus },
}

impl fmt::Display for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RefreshedCache => write!(f, "refreshed cached snapshot"),
            Self::BumpedLastModified => write!(f, "bumped lastModified to now"),
            Self::DowngradedStatus { from, to } => {
                write!(f, "downgraded status {} -> {}", from, to)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixReport {
    pub project_id: String,
    pub applied: Vec<Fix>,
    pub before: ConsistencyReport,
    pub after: ConsistencyReport,
}

impl FixReport {
    /// Whether the post-fix check found no errors
    pub fn resolved(&self) -> bool {
        self.after.is_consistent
    }
}
