//! Storage layer - durable project records
//!
//! # Architecture
//!
//! - `database`: SQLite connection pool management and initialization
//! - `migrations`: Schema versioning and automatic migration
//! - `repository`: The `ContextRepository` trait and its SQLite and
//!   in-memory backends
//!
//! # Usage
//!
//! ```ignore
//! use sitewright_core::storage::{Database, SqliteContextRepository};
//!
//! let db = Database::open(&config).await?;
//! let repo = SqliteContextRepository::new(db.pool().clone());
//! ```

pub mod database;
pub mod migrations;
pub mod repository;

pub use database::{Database, DatabaseConfig, default_database_path};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
pub use repository::{ContextRepository, InMemoryContextRepository, SqliteContextRepository};
