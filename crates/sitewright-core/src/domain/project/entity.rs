//! Project context record
//!
//! The authoritative description of one generated website: its pages,
//! components, design tokens, conversation state and user preferences.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::status::{ProjectStatus, ProjectType};

/// Open key-value bag used for props, styling overrides and preferences
pub type Attributes = Map<String, Value>;

/// UI role of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Header,
    Navigation,
    Hero,
    Features,
    About,
    Services,
    Gallery,
    Testimonials,
    Pricing,
    Menu,
    ProductGrid,
    Cart,
    BlogList,
    Contact,
    Form,
    Cta,
    Footer,
    Custom,
    #[serde(other)]
    Unknown,
}

impl ComponentType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Navigation => "navigation",
            Self::Hero => "hero",
            Self::Features => "features",
            Self::About => "about",
            Self::Services => "services",
            Self::Gallery => "gallery",
            Self::Testimonials => "testimonials",
            Self::Pricing => "pricing",
            Self::Menu => "menu",
            Self::ProductGrid => "product_grid",
            Self::Cart => "cart",
            Self::BlogList => "blog_list",
            Self::Contact => "contact",
            Self::Form => "form",
            Self::Cta => "cta",
            Self::Footer => "footer",
            Self::Custom => "custom",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a component is placed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentLocation {
    /// Page id the component is placed on
    pub page: String,
    /// Section within the page (e.g. "above-fold")
    #[serde(default)]
    pub section: String,
    /// Ordering within the section
    #[serde(default)]
    pub position: u32,
}

/// Version and authorship information for a component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMetadata {
    pub version: String,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Default for ComponentMetadata {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            last_modified: Utc::now(),
            tags: Vec::new(),
        }
    }
}

/// A UI component of the generated site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    #[serde(default)]
    pub location: ComponentLocation,
    #[serde(default)]
    pub props: Attributes,
    #[serde(default)]
    pub styling: Attributes,
    #[serde(default)]
    pub metadata: ComponentMetadata,
}

impl Component {
    /// Create a component placed on the given page
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        component_type: ComponentType,
        page: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            component_type,
            location: ComponentLocation {
                page: page.into(),
                ..Default::default()
            },
            props: Attributes::new(),
            styling: Attributes::new(),
            metadata: ComponentMetadata::default(),
        }
    }
}

/// A page of the generated site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub name: String,
    /// Route path, must begin with `/`
    pub path: String,
    #[serde(rename = "type", default)]
    pub page_type: String,
    /// Component ids rendered on this page, in order
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub layout: String,
    #[serde(default)]
    pub metadata: Attributes,
}

impl Page {
    /// Create an empty page
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
            page_type: "standard".to_string(),
            components: Vec::new(),
            layout: "default".to_string(),
            metadata: Attributes::new(),
        }
    }

    /// Append component ids to this page
    pub fn with_components<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components.extend(ids.into_iter().map(Into::into));
        self
    }
}

/// Design tokens for the site
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Styling {
    /// Semantic role -> color (e.g. "primary" -> "#1a73e8")
    #[serde(default)]
    pub theme: BTreeMap<String, String>,
    #[serde(default)]
    pub colors: BTreeMap<String, String>,
    #[serde(default)]
    pub fonts: BTreeMap<String, String>,
    #[serde(default)]
    pub spacing: BTreeMap<String, String>,
    #[serde(default)]
    pub breakpoints: BTreeMap<String, String>,
}

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Conversation state driving the classifier
///
/// `last_intent` and `last_action` are either both set or both empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationHistory {
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub current_context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<String>,
}

impl ConversationHistory {
    /// Append a message stamped with the current time
    pub fn push_message(&mut self, role: MessageRole, content: impl Into<String>) {
        self.messages.push(ConversationMessage {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    /// Record the classifier outcome, keeping intent and action paired
    pub fn record_intent(&mut self, intent: impl Into<String>, action: impl Into<String>) {
        self.last_intent = Some(intent.into());
        self.last_action = Some(action.into());
    }

    /// Reset intent and action together
    pub fn clear_intent(&mut self) {
        self.last_intent = None;
        self.last_action = None;
    }

    /// True when intent and action are both set or both empty
    ///
    /// Blank strings count as empty.
    pub fn intent_is_paired(&self) -> bool {
        is_set(&self.last_intent) == is_set(&self.last_action)
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// The project context record
///
/// `project_id` and `created_at` never change after creation;
/// `last_modified` never decreases and is never earlier than `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    pub project_id: String,
    pub project_type: ProjectType,
    pub status: ProjectStatus,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub styling: Styling,
    #[serde(default)]
    pub conversation_history: ConversationHistory,
    #[serde(default)]
    pub user_preferences: Attributes,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl ProjectContext {
    /// Create a fresh record with default status and no content
    pub fn new(project_id: impl Into<String>, project_type: ProjectType) -> Self {
        let now = Utc::now();
        Self {
            project_id: project_id.into(),
            project_type,
            status: ProjectStatus::default(),
            components: Vec::new(),
            pages: Vec::new(),
            styling: Styling::default(),
            conversation_history: ConversationHistory::default(),
            user_preferences: Attributes::new(),
            created_at: now,
            last_modified: now,
        }
    }

    /// Look up a component by id
    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Look up a page by id
    pub fn page(&self, id: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == id)
    }

    /// Components not referenced by any page
    pub fn orphan_components(&self) -> Vec<&Component> {
        self.components
            .iter()
            .filter(|c| !self.pages.iter().any(|p| p.components.contains(&c.id)))
            .collect()
    }

    /// `(page_id, component_id)` pairs whose component does not exist
    pub fn broken_references(&self) -> Vec<(&str, &str)> {
        self.pages
            .iter()
            .flat_map(|page| {
                page.components
                    .iter()
                    .filter(|cid| self.component(cid).is_none())
                    .map(move |cid| (page.id.as_str(), cid.as_str()))
            })
            .collect()
    }
}
