//! Project status and vertical types
//!
//! Defines the project lifecycle state machine and the business verticals
//! a generated site can target.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a project
///
/// `created -> in_progress -> template_selected -> completed`, with `paused`
/// and `cancelled` reachable from any non-terminal state. Values that do not
/// match a known status deserialize to `Unknown` so the validator can report
/// them instead of failing the read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Created,
    InProgress,
    TemplateSelected,
    Completed,
    Paused,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl ProjectStatus {
    /// All statuses accepted by the validator
    pub const VALID: [ProjectStatus; 6] = [
        Self::Created,
        Self::InProgress,
        Self::TemplateSelected,
        Self::Completed,
        Self::Paused,
        Self::Cancelled,
    ];

    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "created" => Some(Self::Created),
            "in_progress" => Some(Self::InProgress),
            "template_selected" => Some(Self::TemplateSelected),
            "completed" => Some(Self::Completed),
            "paused" => Some(Self::Paused),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::InProgress => "in_progress",
            Self::TemplateSelected => "template_selected",
            Self::Completed => "completed",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// Terminal statuses cannot be left without an external override
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether this status implies materialized components
    pub fn requires_components(&self) -> bool {
        matches!(self, Self::TemplateSelected | Self::Completed)
    }

    /// Check whether moving from `self` to `next` follows the lifecycle
    ///
    /// Staying in the same status is always allowed. A paused project may
    /// resume into any non-terminal working status.
    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        if *self == next {
            return true;
        }
        if next == Self::Unknown || self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Self::Paused) | (_, Self::Cancelled) => true,
            (Self::Created, Self::InProgress) => true,
            (Self::InProgress, Self::TemplateSelected) => true,
            (Self::TemplateSelected, Self::Completed) => true,
            (Self::TemplateSelected, Self::InProgress) => true,
            (Self::Paused, Self::InProgress | Self::TemplateSelected) => true,
            (Self::Unknown, _) => true,
            _ => false,
        }
    }
}

impl Default for ProjectStatus {
    fn default() -> Self {
        Self::Created
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Business vertical of the generated site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    Restaurant,
    Ecommerce,
    Portfolio,
    Blog,
    Business,
    Landing,
    Saas,
    Nonprofit,
    Event,
    Education,
    Healthcare,
    RealEstate,
    Other,
    #[serde(other)]
    Unknown,
}

impl ProjectType {
    /// All project types accepted by the validator
    pub const VALID: [ProjectType; 13] = [
        Self::Restaurant,
        Self::Ecommerce,
        Self::Portfolio,
        Self::Blog,
        Self::Business,
        Self::Landing,
        Self::Saas,
        Self::Nonprofit,
        Self::Event,
        Self::Education,
        Self::Healthcare,
        Self::RealEstate,
        Self::Other,
    ];

    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "restaurant" => Some(Self::Restaurant),
            "ecommerce" => Some(Self::Ecommerce),
            "portfolio" => Some(Self::Portfolio),
            "blog" => Some(Self::Blog),
            "business" => Some(Self::Business),
            "landing" => Some(Self::Landing),
            "saas" => Some(Self::Saas),
            "nonprofit" => Some(Self::Nonprofit),
            "event" => Some(Self::Event),
            "education" => Some(Self::Education),
            "healthcare" => Some(Self::Healthcare),
            "real_estate" => Some(Self::RealEstate),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Restaurant => "restaurant",
            Self::Ecommerce => "ecommerce",
            Self::Portfolio => "portfolio",
            Self::Blog => "blog",
            Self::Business => "business",
            Self::Landing => "landing",
            Self::Saas => "saas",
            Self::Nonprofit => "nonprofit",
            Self::Event => "event",
            Self::Education => "education",
            Self::Healthcare => "healthcare",
            Self::RealEstate => "real_estate",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
