//! Project context domain
//!
//! The record kept consistent by the store: identity, lifecycle status,
//! pages, components, styling, conversation and preferences.

pub mod entity;
pub mod status;
pub mod update;

pub use entity::{
    Attributes, Component, ComponentLocation, ComponentMetadata, ComponentType,
    ConversationHistory, ConversationMessage, MessageRole, Page, ProjectContext, Styling,
};
pub use status::{ProjectStatus, ProjectType};
pub use update::ContextUpdate;
