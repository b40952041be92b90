//! SQLite connection pool for the durable project record

use crate::config::{Config, DatabaseSettings};
use crate::storage::migrations::{self, MigrationStatus};
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

const MEMORY_PATH: &str = ":memory:";

/// Resolved pool settings for one database file
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub journal_mode: SqliteJournalMode,
}

impl DatabaseConfig {
    /// Pool settings for `path`, sized and journaled per `settings`
    pub fn from_settings(path: impl Into<PathBuf>, settings: &DatabaseSettings) -> Self {
        let journal_mode = SqliteJournalMode::from_str(&settings.journal_mode).unwrap_or_else(|_| {
            warn!(journal_mode = %settings.journal_mode, "Unknown journal mode, using WAL");
            SqliteJournalMode::Wal
        });
        Self {
            path: path.into(),
            max_connections: settings.max_connections.max(1),
            journal_mode,
        }
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Self {
        Self {
            path: PathBuf::from(MEMORY_PATH),
            // Each connection would see its own database
            max_connections: 1,
            journal_mode: SqliteJournalMode::Memory,
        }
    }

    fn is_memory(&self) -> bool {
        self.path == Path::new(MEMORY_PATH)
    }

    /// WAL tolerates NORMAL; rollback journals keep FULL
    fn synchronous(&self) -> SqliteSynchronous {
        match self.journal_mode {
            SqliteJournalMode::Wal => SqliteSynchronous::Normal,
            _ => SqliteSynchronous::Full,
        }
    }
}

/// Default database file under the user's data directory
pub fn default_database_path() -> PathBuf {
    match dirs::data_dir() {
        Some(data_dir) => data_dir.join("sitewright").join("sitewright.db"),
        None => PathBuf::from("sitewright.db"),
    }
}

/// Migrated SQLite pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl Database {
    /// Open the database named by `config`, creating and migrating it as needed
    pub async fn open(config: &Config) -> Result<Self> {
        Self::new(DatabaseConfig::from_settings(
            config.database_path(),
            &config.database,
        ))
        .await
    }

    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        if !config.is_memory() {
            if let Some(parent) = config.path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create database directory: {}", parent.display())
                    })?;
                }
            }
        }

        let connection_str = if config.is_memory() {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", config.path.display())
        };

        let connect_options = SqliteConnectOptions::from_str(&connection_str)?
            .journal_mode(config.journal_mode)
            .synchronous(config.synchronous())
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("Failed to connect to database: {}", config.path.display()))?;

        debug!(
            path = %config.path.display(),
            max_connections = config.max_connections,
            journal_mode = ?config.journal_mode,
            "Database pool opened"
        );

        migrations::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;

        Ok(Self {
            pool,
            path: config.path,
        })
    }

    #[cfg(test)]
    pub(crate) async fn in_memory() -> Result<Self> {
        Self::new(DatabaseConfig::in_memory()).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Schema version of the open database
    pub async fn migration_status(&self) -> Result<MigrationStatus> {
        migrations::migration_status(&self.pool)
            .await
            .context("Failed to check migration status")
    }

    /// Round-trip a trivial query
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
