//! Built-in validation rules

use std::collections::HashSet;

use crate::domain::project::{ComponentType, ProjectContext, ProjectStatus, ProjectType};

use super::{Findings, Rule, Severity};

pub const REQUIRED_FIELDS: &str = "required_fields";
pub const VALID_PROJECT_TYPE: &str = "valid_project_type";
pub const VALID_STATUS: &str = "valid_status";
pub const STATUS_CONSISTENCY: &str = "status_consistency";
pub const COMPONENT_INTEGRITY: &str = "component_integrity";
pub const PAGE_INTEGRITY: &str = "page_integrity";
pub const STYLING_TOKENS: &str = "styling_tokens";
pub const TIMESTAMPS: &str = "timestamps";
pub const CONVERSATION_STATE: &str = "conversation_state";

/// The built-in rules, in evaluation order
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::new(REQUIRED_FIELDS, Severity::Error, required_fields),
        Rule::new(VALID_PROJECT_TYPE, Severity::Error, valid_project_type),
        Rule::new(VALID_STATUS, Severity::Error, valid_status),
        Rule::new(STATUS_CONSISTENCY, Severity::Error, status_consistency),
        Rule::new(COMPONENT_INTEGRITY, Severity::Error, component_integrity),
        Rule::new(PAGE_INTEGRITY, Severity::Error, page_integrity),
        Rule::new(STYLING_TOKENS, Severity::Warning, styling_tokens),
        Rule::new(TIMESTAMPS, Severity::Error, timestamps),
        Rule::new(CONVERSATION_STATE, Severity::Error, conversation_state),
    ]
}

pub fn required_fields(ctx: &ProjectContext) -> Findings {
    let mut findings = Findings::new();
    if ctx.project_id.trim().is_empty() {
        findings.error("Missing required field: projectId");
    }
    findings
}

pub fn valid_project_type(ctx: &ProjectContext) -> Findings {
    let mut findings = Findings::new();
    if ctx.project_type == ProjectType::Unknown {
        let expected: Vec<&str> = ProjectType::VALID.iter().map(|t| t.as_str()).collect();
        findings.error(format!(
            "Invalid projectType, expected one of: {}",
            expected.join(", ")
        ));
    } else if ctx.project_type == ProjectType::Other {
        findings.suggest("Choose a specific projectType to get better templates");
    }
    findings
}

pub fn valid_status(ctx: &ProjectContext) -> Findings {
    let mut findings = Findings::new();
    if ctx.status == ProjectStatus::Unknown {
        let expected: Vec<&str> = ProjectStatus::VALID.iter().map(|s| s.as_str()).collect();
        findings.error(format!(
            "Invalid status, expected one of: {}",
            expected.join(", ")
        ));
    }
    findings
}

pub fn status_consistency(ctx: &ProjectContext) -> Findings {
    let mut findings = Findings::new();
    match ctx.status {
        ProjectStatus::Completed if ctx.components.is_empty() => {
            findings.error("Completed project must have at least one component");
        }
        ProjectStatus::Completed if ctx.pages.is_empty() => {
            findings.warn("Completed project has no pages");
        }
        ProjectStatus::TemplateSelected if ctx.components.is_empty() => {
            findings.error("Template-selected project must have at least one component");
        }
        ProjectStatus::Created if !ctx.components.is_empty() => {
            findings.suggest("Project has components but is still 'created', consider moving it to 'in_progress'");
        }
        _ => {}
    }
    findings
}

pub fn component_integrity(ctx: &ProjectContext) -> Findings {
    let mut findings = Findings::new();
    let mut seen = HashSet::new();
    let has_pages = !ctx.pages.is_empty();

    for (index, component) in ctx.components.iter().enumerate() {
        if component.id.trim().is_empty() {
            findings.error(format!("Component at index {} is missing an id", index));
            continue;
        }
        if !seen.insert(component.id.as_str()) {
            findings.error(format!("Duplicate component id '{}'", component.id));
        }
        if component.name.trim().is_empty() {
            findings.error(format!("Component '{}' is missing a name", component.id));
        }
        if component.component_type == ComponentType::Unknown {
            findings.error(format!("Component '{}' has an unknown type", component.id));
        }
        if component.location.page.trim().is_empty() {
            findings.warn(format!("Component '{}' has no page location", component.id));
        } else if has_pages && ctx.page(&component.location.page).is_none() {
            findings.warn(format!(
                "Component '{}' is located on non-existent page '{}'",
                component.id, component.location.page
            ));
        }
    }
    findings
}

pub fn page_integrity(ctx: &ProjectContext) -> Findings {
    let mut findings = Findings::new();
    let mut ids = HashSet::new();
    let mut paths = HashSet::new();

    for (index, page) in ctx.pages.iter().enumerate() {
        if page.id.trim().is_empty() {
            findings.error(format!("Page at index {} is missing an id", index));
            continue;
        }
        if !ids.insert(page.id.as_str()) {
            findings.error(format!("Duplicate page id '{}'", page.id));
        }
        if page.name.trim().is_empty() {
            findings.error(format!("Page '{}' is missing a name", page.id));
        }
        if !page.path.starts_with('/') {
            findings.error(format!("Page '{}' path must begin with '/'", page.id));
        } else if !paths.insert(page.path.as_str()) {
            findings.warn(format!("Page '{}' reuses path '{}'", page.id, page.path));
        }
        if page.components.is_empty() {
            findings.suggest(format!("Page '{}' has no components", page.id));
        }
    }

    for (page_id, component_id) in ctx.broken_references() {
        findings.error(format!(
            "Page '{}' references non-existent component '{}'",
            page_id, component_id
        ));
    }
    for orphan in ctx.orphan_components() {
        findings.warn(format!(
            "Component '{}' is not referenced by any page",
            orphan.id
        ));
    }
    findings
}

pub fn styling_tokens(ctx: &ProjectContext) -> Findings {
    let mut findings = Findings::new();
    let styling = &ctx.styling;

    for (group, tokens) in [("theme", &styling.theme), ("colors", &styling.colors)] {
        for (name, value) in tokens {
            if !is_color(value) {
                findings.error(format!("Invalid color '{}' for {}.{}", value, group, name));
            }
        }
    }
    for (group, tokens) in [("spacing", &styling.spacing), ("breakpoints", &styling.breakpoints)] {
        for (name, value) in tokens {
            if !is_length(value) {
                findings.error(format!("Invalid length '{}' for {}.{}", value, group, name));
            }
        }
    }
    for (name, value) in &styling.fonts {
        if value.trim().is_empty() {
            findings.error(format!("Empty font for fonts.{}", name));
        }
    }

    if styling.theme.is_empty() && !ctx.components.is_empty() {
        findings.suggest("Define a theme so generated components share colors");
    }
    findings
}

pub fn timestamps(ctx: &ProjectContext) -> Findings {
    let mut findings = Findings::new();
    if ctx.last_modified < ctx.created_at {
        findings.error(format!(
            "lastModified ({}) precedes createdAt ({})",
            ctx.last_modified.to_rfc3339(),
            ctx.created_at.to_rfc3339()
        ));
    }
    findings
}

pub fn conversation_state(ctx: &ProjectContext) -> Findings {
    let mut findings = Findings::new();
    let history = &ctx.conversation_history;

    if !history.intent_is_paired() {
        findings.error("lastIntent and lastAction must both be set or both be empty");
    }
    let out_of_order = history
        .messages
        .windows(2)
        .any(|pair| pair[1].timestamp < pair[0].timestamp);
    if out_of_order {
        findings.warn("Conversation messages are not in chronological order");
    }
    findings
}

fn is_color(value: &str) -> bool {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        return matches!(hex.len(), 3 | 4 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    let functional = ["rgb(", "rgba(", "hsl(", "hsla(", "var(--"];
    if functional.iter().any(|p| value.starts_with(p)) {
        return value.ends_with(')');
    }
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphabetic())
}

fn is_length(value: &str) -> bool {
    let value = value.trim();
    if value == "0" || value == "auto" || value.starts_with("var(--") {
        return true;
    }
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    !number.is_empty()
        && number.parse::<f64>().is_ok()
        && matches!(unit, "px" | "rem" | "em" | "%" | "vh" | "vw" | "ch")
}
