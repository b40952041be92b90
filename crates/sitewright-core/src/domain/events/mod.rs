//! Project context events
//!
//! Events pushed to live subscribers. The wire shape is
//! `{type, projectId, context?, timestamp}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::project::ProjectContext;

/// Type of context event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextEventType {
    /// A project record was created
    ContextCreated,
    /// A project record was updated (also used for initial snapshots)
    ContextUpdated,
    /// A project record was deleted by an external operation
    ContextDeleted,
}

impl ContextEventType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContextCreated => "context_created",
            Self::ContextUpdated => "context_updated",
            Self::ContextDeleted => "context_deleted",
        }
    }
}

impl fmt::Display for ContextEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A context change delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEvent {
    #[serde(rename = "type")]
    pub event_type: ContextEventType,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ProjectContext>,
    pub timestamp: DateTime<Utc>,
}

impl ContextEvent {
    fn new(
        event_type: ContextEventType,
        project_id: impl Into<String>,
        context: Option<ProjectContext>,
    ) -> Self {
        Self {
            event_type,
            project_id: project_id.into(),
            context,
            timestamp: Utc::now(),
        }
    }

    /// Create a context created event
    pub fn created(context: ProjectContext) -> Self {
        let project_id = context.project_id.clone();
        Self::new(ContextEventType::ContextCreated, project_id, Some(context))
    }

    /// Create a context updated event
    pub fn updated(context: ProjectContext) -> Self {
        let project_id = context.project_id.clone();
        Self::new(ContextEventType::ContextUpdated, project_id, Some(context))
    }

    /// Create a context deleted event
    pub fn deleted(project_id: impl Into<String>) -> Self {
        Self::new(ContextEventType::ContextDeleted, project_id, None)
    }

    /// Serialize for a text transport
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
