//! Partial updates to a project context
//!
//! An update names whole top-level fields to replace. Arrays are replaced as
//! a unit; nothing is diffed or merged below the top level.

use serde::{Deserialize, Serialize};

use super::entity::{Attributes, Component, ConversationHistory, Page, ProjectContext, Styling};
use super::status::ProjectStatus;

/// Set of top-level fields to replace on a project context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Component>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<Page>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styling: Option<Styling>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<ConversationHistory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_preferences: Option<Attributes>,
}

impl ContextUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: ProjectStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn components(mut self, components: Vec<Component>) -> Self {
        self.components = Some(components);
        self
    }

    pub fn pages(mut self, pages: Vec<Page>) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn styling(mut self, styling: Styling) -> Self {
        self.styling = Some(styling);
        self
    }

    pub fn conversation_history(mut self, history: ConversationHistory) -> Self {
        self.conversation_history = Some(history);
        self
    }

    pub fn user_preferences(mut self, preferences: Attributes) -> Self {
        self.user_preferences = Some(preferences);
        self
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.components.is_none()
            && self.pages.is_none()
            && self.styling.is_none()
            && self.conversation_history.is_none()
            && self.user_preferences.is_none()
    }

    /// Names of the fields this update replaces, in record order
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.status.is_some() {
            names.push("status");
        }
        if self.components.is_some() {
            names.push("components");
        }
        if self.pages.is_some() {
            names.push("pages");
        }
        if self.styling.is_some() {
            names.push("styling");
        }
        if self.conversation_history.is_some() {
            names.push("conversationHistory");
        }
        if self.user_preferences.is_some() {
            names.push("userPreferences");
        }
        names
    }

    /// Replace the named fields on `context`
    ///
    /// Does not touch identity or timestamps; stamping `last_modified` is the
    /// store's job.
    pub fn apply_to(self, context: &mut ProjectContext) {
        if let Some(status) = self.status {
            context.status = status;
        }
        if let Some(components) = self.components {
            context.components = components;
        }
        if let Some(pages) = self.pages {
            context.pages = pages;
        }
        if let Some(styling) = self.styling {
            context.styling = styling;
        }
        if let Some(history) = self.conversation_history {
            context.conversation_history = history;
        }
        if let Some(preferences) = self.user_preferences {
            context.user_preferences = preferences;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::project::{ComponentType, ProjectType};

    #[test]
    fn test_empty_update() {
        let update = ContextUpdate::new();
        assert!(update.is_empty());
        assert!(update.field_names().is_empty());
    }

    #[test]
    fn test_apply_replaces_only_named_fields() {
        let mut ctx = ProjectContext::new("p", ProjectType::Portfolio);
        ctx.pages = vec![Page::new("home", "Home", "/")];
        let before_pages = ctx.pages.clone();

        ContextUpdate::new()
            .status(ProjectStatus::InProgress)
            .components(vec![Component::new("c1", "Hero", ComponentType::Hero, "home")])
            .apply_to(&mut ctx);

        assert_eq!(ctx.status, ProjectStatus::InProgress);
        assert_eq!(ctx.components.len(), 1);
        assert_eq!(ctx.pages, before_pages);
    }

    #[test]
    fn test_components_are_replaced_not_merged() {
        let mut ctx = ProjectContext::new("p", ProjectType::Portfolio);
        ctx.components = vec![
            Component::new("a", "A", ComponentType::Hero, "home"),
            Component::new("b", "B", ComponentType::Footer, "home"),
        ];
        ContextUpdate::new()
            .components(vec![Component::new("c", "C", ComponentType::Cta, "home")])
            .apply_to(&mut ctx);
        let ids: Vec<&str> = ctx.components.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn test_deserialize_partial_json() {
        let update: ContextUpdate =
            serde_json::from_str(r#"{"status":"in_progress","userPreferences":{"tone":"warm"}}"#)
                .unwrap();
        assert_eq!(update.field_names(), vec!["status", "userPreferences"]);
    }
}
