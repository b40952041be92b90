//! Rule-based snapshot validation
//!
//! A [`RuleValidator`] runs an ordered list of named [`Rule`]s against a
//! [`ProjectContext`] and merges their [`Findings`] into one
//! [`ValidationReport`]. A rule's severity decides where its *errors* land:
//! an `error` rule's errors are aggregate errors, a `warning` rule's errors
//! are aggregate warnings, an `info` rule's errors are suggestions. A rule's
//! own warnings and suggestions are always bucketed as such.
//!
//! Validation only reports; it never modifies the snapshot.

pub mod rules;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::project::ProjectContext;
use crate::metrics::{MetricsCollector, Operation};

/// How a rule's errors are bucketed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// Raw output of a single rule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Findings {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Findings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn suggest(&mut self, message: impl Into<String>) {
        self.suggestions.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty() && self.suggestions.is_empty()
    }
}

/// Signature of a rule check
pub type CheckFn = Arc<dyn Fn(&ProjectContext) -> Findings + Send + Sync>;

/// A named, severity-tagged check
#[derive(Clone)]
pub struct Rule {
    name: String,
    severity: Severity,
    check: CheckFn,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("severity", &self.severity)
            .finish()
    }
}

impl Rule {
    pub fn new<F>(name: impl Into<String>, severity: Severity, check: F) -> Self
    where
        F: Fn(&ProjectContext) -> Findings + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            severity,
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn run(&self, context: &ProjectContext) -> Findings {
        (self.check)(context)
    }
}

/// Aggregate outcome of a validation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    fn absorb(&mut self, severity: Severity, findings: Findings) {
        match severity {
            Severity::Error => self.errors.extend(findings.errors),
            Severity::Warning => self.warnings.extend(findings.errors),
            Severity::Info => self.suggestions.extend(findings.errors),
        }
        self.warnings.extend(findings.warnings);
        self.suggestions.extend(findings.suggestions);
    }
}

/// Ordered rule registry
#[derive(Debug, Clone, Default)]
pub struct RuleValidator {
    rules: Vec<Rule>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RuleValidator {
    /// Validator with no rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Validator preloaded with the built-in rule set
    pub fn with_default_rules() -> Self {
        Self {
            rules: rules::default_rules(),
            metrics: None,
        }
    }

    /// Record a metric for every run
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register a rule, replacing any rule with the same name in place
    pub fn add_rule(&mut self, rule: Rule) -> Option<Rule> {
        match self.rules.iter_mut().find(|r| r.name == rule.name) {
            Some(existing) => Some(std::mem::replace(existing, rule)),
            None => {
                self.rules.push(rule);
                None
            }
        }
    }

    /// Remove a rule by name
    pub fn remove_rule(&mut self, name: &str) -> Option<Rule> {
        let index = self.rules.iter().position(|r| r.name == name)?;
        Some(self.rules.remove(index))
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule and merge the findings
    pub fn validate(&self, context: &ProjectContext) -> ValidationReport {
        let timer = self
            .metrics
            .as_ref()
            .map(|m| m.start(Operation::Validate, &context.project_id));

        let mut report = ValidationReport::default();
        for rule in &self.rules {
            let findings = rule.run(context);
            if !findings.is_empty() {
                debug!(
                    project_id = %context.project_id,
                    rule = %rule.name,
                    errors = findings.errors.len(),
                    warnings = findings.warnings.len(),
                    "Rule reported findings"
                );
            }
            report.absorb(rule.severity, findings);
        }
        report.is_valid = report.errors.is_empty();

        if let (Some(metrics), Some(mut timer)) = (self.metrics.as_ref(), timer) {
            timer.set("isValid", report.is_valid);
            timer.set("errorCount", report.errors.len());
            metrics.succeed(timer);
        }
        report
    }
}
