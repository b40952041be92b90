//! Durable project context records
//!
//! The store of record is a key-by-project-id document store. The trait
//! abstracts over backends; the context store is its only caller.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::project::ProjectContext;
use crate::error::{Error, Result};

/// Read/replace access to durable project records
#[async_trait]
pub trait ContextRepository: Send + Sync {
    /// Read the record for a project, `None` when absent
    async fn read(&self, project_id: &str) -> Result<Option<ProjectContext>>;

    /// Insert or replace the record keyed by `context.project_id`
    async fn write(&self, context: &ProjectContext) -> Result<()>;

    /// Ids of all stored records
    async fn list_ids(&self) -> Result<Vec<String>>;
}

/// SQLite-backed repository storing each record as a JSON document
#[derive(Debug, Clone)]
pub struct SqliteContextRepository {
    pool: SqlitePool,
}

impl SqliteContextRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ContextRepository for SqliteContextRepository {
    async fn read(&self, project_id: &str) -> Result<Option<ProjectContext>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT context_json FROM project_contexts WHERE project_id = ?")
                .bind(project_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::DatabaseError)?;

        match row {
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn write(&self, context: &ProjectContext) -> Result<()> {
        let json = serde_json::to_string(context)?;

        sqlx::query(
            r#"
            INSERT INTO project_contexts (
                project_id, project_type, status, context_json, created_at, last_modified
            )
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(project_id) DO UPDATE SET
                project_type = excluded.project_type,
                status = excluded.status,
                context_json = excluded.context_json,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(&context.project_id)
        .bind(context.project_type.as_str())
        .bind(context.status.as_str())
        .bind(&json)
        .bind(context.created_at)
        .bind(context.last_modified)
        .execute(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT project_id FROM project_contexts ORDER BY project_id")
                .fetch_all(&self.pool)
                .await
                .map_err(Error::DatabaseError)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

/// Process-local repository, used for tests and embedding
#[derive(Debug, Default)]
pub struct InMemoryContextRepository {
    records: RwLock<HashMap<String, ProjectContext>>,
}

impl InMemoryContextRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ContextRepository for InMemoryContextRepository {
    async fn read(&self, project_id: &str) -> Result<Option<ProjectContext>> {
        Ok(self.records.read().await.get(project_id).cloned())
    }

    async fn write(&self, context: &ProjectContext) -> Result<()> {
        self.records
            .write()
            .await
            .insert(context.project_id.clone(), context.clone());
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::project::{Component, ComponentType, ProjectStatus, ProjectType};
    use crate::storage::Database;

    // Verify trait is object-safe
    fn _assert_object_safe(_: &dyn ContextRepository) {}

    #[tokio::test]
    async fn test_in_memory_read_write() {
        let repo = InMemoryContextRepository::new();
        assert!(repo.read("p1").await.unwrap().is_none());

        let ctx = ProjectContext::new("p1", ProjectType::Blog);
        repo.write(&ctx).await.unwrap();

        assert_eq!(repo.read("p1").await.unwrap(), Some(ctx));
        assert_eq!(repo.len().await, 1);
        assert_eq!(repo.list_ids().await.unwrap(), vec!["p1".to_string()]);
    }

    #[tokio::test]
    async fn test_sqlite_round_trip_and_replace() {
        let db = Database::in_memory().await.expect("Failed to create database");
        let repo = SqliteContextRepository::new(db.pool().clone());

        let mut ctx = ProjectContext::new("site-1", ProjectType::Restaurant);
        repo.write(&ctx).await.unwrap();

        ctx.status = ProjectStatus::InProgress;
        ctx.components
            .push(Component::new("hero", "Hero", ComponentType::Hero, "home"));
        repo.write(&ctx).await.unwrap();

        let loaded = repo.read("site-1").await.unwrap().expect("record should exist");
        assert_eq!(loaded, ctx);

        let (status,): (String,) =
            sqlx::query_as("SELECT status FROM project_contexts WHERE project_id = ?")
                .bind("site-1")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(status, "in_progress");
    }

    #[tokio::test]
    async fn test_sqlite_missing_record() {
        let db = Database::in_memory().await.expect("Failed to create database");
        let repo = SqliteContextRepository::new(db.pool().clone());
        assert!(repo.read("nonexistent").await.unwrap().is_none());
        assert!(repo.list_ids().await.unwrap().is_empty());
    }
}
