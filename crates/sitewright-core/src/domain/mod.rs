//! Domain layer
//!
//! Contains the project context model and the events emitted when it changes.

pub mod events;
pub mod project;
