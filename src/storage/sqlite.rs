use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::{AnalysisRecord, AnalysisStatus, Storage};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if needed) the database file and run migrations
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        Self::connect(options, config.max_connections).await
    }

    /// Private in-memory database, mainly for tests.
    ///
    /// Uses a single connection since every SQLite memory connection is its
    /// own database.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?;
        Self::connect(options, 1).await
    }

    async fn connect(options: SqliteConnectOptions, max_connections: u32) -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::Serialization {
        message: e.to_string(),
    })
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_analysis(&self, record: &AnalysisRecord) -> StorageResult<()> {
        let stats = to_json(&record.stats)?;
        let tree_stats = to_json(&record.tree_stats)?;
        let execution = to_json(&record.execution)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO analyses
                (id, query, optimized_query, final_response, status, error, stats, tree_stats,
                 visualization_ref, execution, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.query)
        .bind(&record.optimized_query)
        .bind(&record.final_response)
        .bind(record.status.as_str())
        .bind(&record.error)
        .bind(&stats)
        .bind(&tree_stats)
        .bind(&record.visualization_ref)
        .bind(&execution)
        .bind(timestamp(&record.started_at))
        .bind(record.completed_at.as_ref().map(timestamp))
        .execute(&self.pool)
        .await?;

        debug!(analysis_id = %record.id, status = %record.status, "Analysis record saved");
        Ok(())
    }

    async fn get_analysis(&self, id: &str) -> StorageResult<Option<AnalysisRecord>> {
        let row: Option<AnalysisRow> = sqlx::query_as(
            r#"
            SELECT id, query, optimized_query, final_response, status, error, stats, tree_stats,
                   visualization_ref, execution, started_at, completed_at
            FROM analyses
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_analyses(&self, limit: u32) -> StorageResult<Vec<AnalysisRecord>> {
        let rows: Vec<AnalysisRow> = sqlx::query_as(
            r#"
            SELECT id, query, optimized_query, final_response, status, error, stats, tree_stats,
                   visualization_ref, execution, started_at, completed_at
            FROM analyses
            ORDER BY started_at DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn delete_analysis(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM analyses WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::AnalysisNotFound {
                analysis_id: id.to_string(),
            });
        }

        Ok(())
    }
}

// Internal row type for SQLx mapping
#[derive(sqlx::FromRow)]
struct AnalysisRow {
    id: String,
    query: String,
    optimized_query: Option<String>,
    final_response: Option<String>,
    status: String,
    error: Option<String>,
    stats: String,
    tree_stats: String,
    visualization_ref: Option<String>,
    execution: String,
    started_at: String,
    completed_at: Option<String>,
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl From<AnalysisRow> for AnalysisRecord {
    fn from(row: AnalysisRow) -> Self {
        Self {
            id: row.id,
            query: row.query,
            optimized_query: row.optimized_query,
            final_response: row.final_response,
            status: row.status.parse().unwrap_or(AnalysisStatus::Failed),
            error: row.error,
            stats: serde_json::from_str(&row.stats).unwrap_or_default(),
            tree_stats: serde_json::from_str(&row.tree_stats).unwrap_or_default(),
            visualization_ref: row.visualization_ref,
            execution: serde_json::from_str(&row.execution).unwrap_or_default(),
            started_at: parse_timestamp(&row.started_at).unwrap_or_else(Utc::now),
            completed_at: row.completed_at.as_deref().and_then(parse_timestamp),
        }
    }
}
