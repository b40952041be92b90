//! Error types for Sitewright

use thiserror::Error;

/// Result type alias using Sitewright's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Sitewright error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Entity errors (E001-E099)
    #[error("Project '{0}' not found. Run `sitewright create {0}` to create it.")]
    ProjectNotFound(String),

    #[error("Project '{0}' already exists.")]
    ProjectExists(String),

    // Storage errors (E100-E199)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    // Validation errors (E200-E299)
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    // Consistency errors (E300-E399)
    #[error("Consistency drift detected for project '{0}': {1}")]
    ConsistencyDrift(String, String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProjectNotFound(_) => "E001",
            Self::ProjectExists(_) => "E002",
            Self::DatabaseError(_) => "E100",
            Self::Serialization(_) => "E101",
            Self::Storage(_) => "E102",
            Self::ValidationFailed(_) => "E200",
            Self::ConsistencyDrift(..) => "E300",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::ProjectNotFound(id) => Some(format!("sitewright create {}", id)),
            Self::ConsistencyDrift(id, _) => Some(format!("sitewright fix {}", id)),
            Self::ValidationFailed(_) => Some("sitewright validate <project-id>".to_string()),
            Self::ConfigError(_) => Some("sitewright config list".to_string()),
            _ => None,
        }
    }
}
