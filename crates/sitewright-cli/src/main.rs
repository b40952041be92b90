//! Sitewright CLI - operator surface for the project context store

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sitewright_core::api::{ContextService, HealthStatus};
use sitewright_core::config::Config;
use sitewright_core::consistency::ConsistencyReport;
use sitewright_core::domain::project::{ContextUpdate, ProjectStatus, ProjectType};
use sitewright_core::validation::Severity;
use sitewright_core::Error;
use tracing::debug;

#[derive(Parser)]
#[command(name = "sitewright")]
#[command(author, version, about = "Project context store for the Sitewright generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Database file (overrides database.path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project record
    Create {
        /// Project ID
        id: String,
        /// Business vertical (restaurant, ecommerce, portfolio, ...)
        #[arg(short = 't', long = "type", default_value = "other")]
        project_type: String,
    },

    /// Show a project record
    Show { id: String },

    /// Set a project's status
    Status {
        id: String,
        /// created, in_progress, template_selected, completed, paused, cancelled
        status: String,
    },

    /// Validate a project against the built-in rules
    Validate { id: String },

    /// Check one project, or every project, for drift
    Check { id: Option<String> },

    /// Apply known remediations to a project
    Fix { id: String },

    /// Run health check
    Health,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Reset to defaults
    Reset,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sitewright=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Config { action } => return cmd_config(action, cli.quiet),
        other => other,
    };

    let mut config = Config::load()?;
    if let Some(path) = cli.db.clone() {
        config.database.path = Some(path);
    }
    let service = ContextService::open(config).await?;
    debug!(database = ?service.database().map(|d| d.path().to_path_buf()), "Service ready");

    let out = Output {
        format: cli.format,
        quiet: cli.quiet,
    };
    let result = match command {
        Commands::Create { id, project_type } => cmd_create(&service, &id, &project_type, out).await,
        Commands::Show { id } => cmd_show(&service, &id, out).await,
        Commands::Status { id, status } => cmd_status(&service, &id, &status, out).await,
        Commands::Validate { id } => cmd_validate(&service, &id, out).await,
        Commands::Check { id } => cmd_check(&service, id.as_deref(), out).await,
        Commands::Fix { id } => cmd_fix(&service, &id, out).await,
        Commands::Health => cmd_health(&service, out).await,
        Commands::Config { .. } => Ok(()),
    };

    service.close().await;
    result
}

#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    fn print_json<T: serde::Serialize>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// Core error rendered with its code and suggestion
fn fail(err: Error) -> anyhow::Error {
    match err.suggestion() {
        Some(hint) => anyhow::anyhow!("[{}] {}\n  hint: {}", err.code(), err, hint),
        None => anyhow::anyhow!("[{}] {}", err.code(), err),
    }
}

fn parse_status(value: &str) -> anyhow::Result<ProjectStatus> {
    ProjectStatus::from_str(value).ok_or_else(|| {
        let valid: Vec<&str> = ProjectStatus::VALID.iter().map(|s| s.as_str()).collect();
        fail(Error::InvalidInput(format!(
            "unknown status '{}', expected one of: {}",
            value,
            valid.join(", ")
        )))
    })
}

fn parse_project_type(value: &str) -> anyhow::Result<ProjectType> {
    ProjectType::from_str(value).ok_or_else(|| {
        let valid: Vec<&str> = ProjectType::VALID.iter().map(|t| t.as_str()).collect();
        fail(Error::InvalidInput(format!(
            "unknown project type '{}', expected one of: {}",
            value,
            valid.join(", ")
        )))
    })
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_create(
    service: &ContextService,
    id: &str,
    project_type: &str,
    out: Output,
) -> anyhow::Result<()> {
    let project_type = parse_project_type(project_type)?;
    if service.get(id).await.is_some() {
        return Err(fail(Error::ProjectExists(id.to_string())));
    }
    let context = service
        .create(id, project_type)
        .await
        .ok_or_else(|| fail(Error::Storage(format!("could not create project '{}'", id))))?;

    if out.json() {
        out.print_json(&context)?;
    } else if !out.quiet {
        println!("Created project '{}' ({})", context.project_id, context.project_type);
    }
    Ok(())
}

async fn cmd_show(service: &ContextService, id: &str, out: Output) -> anyhow::Result<()> {
    let context = service
        .get(id)
        .await
        .ok_or_else(|| fail(Error::ProjectNotFound(id.to_string())))?;

    if out.json() {
        return out.print_json(&context);
    }
    println!("Project: {}", context.project_id);
    println!("  Type:          {}", context.project_type);
    println!("  Status:        {}", context.status);
    println!("  Components:    {}", context.components.len());
    println!("  Pages:         {}", context.pages.len());
    println!("  Messages:      {}", context.conversation_history.messages.len());
    println!("  Created:       {}", context.created_at.to_rfc3339());
    println!("  Last modified: {}", context.last_modified.to_rfc3339());
    Ok(())
}

async fn cmd_status(
    service: &ContextService,
    id: &str,
    status: &str,
    out: Output,
) -> anyhow::Result<()> {
    let status = parse_status(status)?;
    let before = service
        .get(id)
        .await
        .ok_or_else(|| fail(Error::ProjectNotFound(id.to_string())))?;
    if !before.status.can_transition_to(status) && !out.quiet && !out.json() {
        eprintln!(
            "Warning: {} -> {} is outside the project lifecycle",
            before.status, status
        );
    }

    let context = service
        .update(id, ContextUpdate::new().status(status))
        .await
        .ok_or_else(|| fail(Error::Storage(format!("update of '{}' did not take effect", id))))?;

    if out.json() {
        out.print_json(&context)?;
    } else if !out.quiet {
        println!("{}: {} -> {}", context.project_id, before.status, context.status);
    }
    Ok(())
}

async fn cmd_validate(service: &ContextService, id: &str, out: Output) -> anyhow::Result<()> {
    let report = service
        .validate(id)
        .await
        .ok_or_else(|| fail(Error::ProjectNotFound(id.to_string())))?;

    if out.json() {
        out.print_json(&report)?;
    } else if !out.quiet {
        println!(
            "Validation for '{}': {}",
            id,
            if report.is_valid { "valid" } else { "INVALID" }
        );
        for e in &report.errors {
            println!("  [error] {}", e);
        }
        for w in &report.warnings {
            println!("  [warn]  {}", w);
        }
        for s in &report.suggestions {
            println!("  [hint]  {}", s);
        }
    }

    if report.is_valid {
        Ok(())
    } else {
        Err(fail(Error::ValidationFailed(format!(
            "{} error(s) in project '{}'",
            report.errors.len(),
            id
        ))))
    }
}

fn print_consistency(report: &ConsistencyReport) {
    let verdict = if report.is_consistent { "consistent" } else { "INCONSISTENT" };
    println!("{}: {}", report.project_id, verdict);
    for issue in &report.issues {
        let tag = match issue.severity {
            Severity::Error => "error",
            Severity::Warning => "warn ",
            Severity::Info => "info ",
        };
        println!("  [{}] {}/{}: {}", tag, issue.phase, issue.kind, issue.message);
    }
}

async fn cmd_check(service: &ContextService, id: Option<&str>, out: Output) -> anyhow::Result<()> {
    let reports = match id {
        Some(id) => vec![service.check_consistency(id).await],
        None => service.check_all().await,
    };

    if out.json() {
        out.print_json(&reports)?;
    } else if !out.quiet {
        if reports.is_empty() {
            println!("No projects found.");
        }
        for report in &reports {
            print_consistency(report);
        }
    }

    match reports.iter().find(|r| !r.is_consistent) {
        Some(report) => {
            let first = report
                .errors()
                .next()
                .map(|i| i.message.clone())
                .unwrap_or_default();
            Err(fail(Error::ConsistencyDrift(report.project_id.clone(), first)))
        }
        None => Ok(()),
    }
}

async fn cmd_fix(service: &ContextService, id: &str, out: Output) -> anyhow::Result<()> {
    let report = service.fix(id).await.map_err(fail)?;

    if out.json() {
        out.print_json(&report)?;
    } else if !out.quiet {
        if report.applied.is_empty() {
            println!("No fixes applied to '{}'.", id);
        }
        for fix in &report.applied {
            println!("Fixed: {}", fix);
        }
        print_consistency(&report.after);
    }

    if report.resolved() {
        Ok(())
    } else {
        let remaining = report.after.errors().count();
        Err(fail(Error::ConsistencyDrift(
            id.to_string(),
            format!("{} issue(s) need manual attention", remaining),
        )))
    }
}

async fn cmd_health(service: &ContextService, out: Output) -> anyhow::Result<()> {
    let report = service.health_check().await;

    if out.json() {
        out.print_json(&report)?;
    } else if !out.quiet {
        println!("Sitewright Health Check");
        println!("=======================");
        println!();
        for check in &report.checks {
            let tag = match check.status {
                HealthStatus::Ok => "[OK]",
                HealthStatus::Warning => "[--]",
                HealthStatus::Error => "[!!]",
            };
            println!("{} {}: {}", tag, check.name, check.message.as_deref().unwrap_or(""));
        }
        if !report.recommendations.is_empty() {
            println!();
            println!("Recommendations:");
            for r in &report.recommendations {
                println!("  - {}", r);
            }
        }
        println!();
        println!("Overall: {}", report.overall_status);
    }

    if report.healthy {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Health check failed"))
    }
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
