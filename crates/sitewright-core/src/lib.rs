//! Sitewright Core Library
//!
//! The single source of truth for website-generator project state:
//! - Context store (TTL cache over the durable record, the only writer)
//! - Notification hub (per-project fan-out to live subscribers)
//! - Rule validator (structural and business rules over snapshots)
//! - Consistency checker (drift detection and remediation)
//! - Metrics collector (operation log with derived views)
//! - Storage (SQLite durable records)
//! - Service API (composition root and health check)

pub mod api;
pub mod config;
pub mod consistency;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod storage;
pub mod store;
pub mod validation;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{ContextService, HealthReport, HealthStatus};
    pub use crate::config::Config;
    pub use crate::consistency::{ConsistencyReport, FixReport, IssueKind};
    pub use crate::domain::events::{ContextEvent, ContextEventType};
    pub use crate::domain::project::{
        Component, ComponentType, ContextUpdate, Page, ProjectContext, ProjectStatus, ProjectType,
    };
    pub use crate::error::{Error, Result};
    pub use crate::notify::{Connection, Listener, NotificationHub, Subscription};
    pub use crate::store::ContextStore;
    pub use crate::validation::{RuleValidator, ValidationReport};
}
