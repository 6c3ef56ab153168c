//! Page store (§3.4): durable SQLite-backed table of persisted page rows, grounded on
//! the same WAL-mode sqlx pattern used for the job store.

use crate::models::PageRow;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS pages (
    url TEXT PRIMARY KEY,
    title TEXT,
    status TEXT NOT NULL,
    type TEXT NOT NULL,
    placement TEXT NOT NULL,
    parent_url TEXT,
    depth INTEGER NOT NULL,
    discovery_source TEXT NOT NULL,
    links_in INTEGER NOT NULL DEFAULT 0,
    severity TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pages_parent ON pages(parent_url);
CREATE INDEX IF NOT EXISTS idx_pages_placement ON pages(placement);
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct PageStore {
    pool: SqlitePool,
}

impl PageStore {
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let max_connections = if database_url.contains(":memory:") { 1 } else { 8 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        Ok(PageStore { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn get(&self, url: &str) -> Result<Option<PageRow>, StoreError> {
        let row = sqlx::query_as::<_, PageRow>("SELECT * FROM pages WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn upsert(&self, row: &PageRow) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pages (url, title, status, type, placement, parent_url, depth,
                                discovery_source, links_in, severity, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                status = excluded.status,
                type = excluded.type,
                placement = excluded.placement,
                parent_url = excluded.parent_url,
                depth = excluded.depth,
                discovery_source = excluded.discovery_source,
                links_in = excluded.links_in,
                severity = excluded.severity,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.url)
        .bind(&row.title)
        .bind(&row.status)
        .bind(&row.node_type)
        .bind(&row.placement)
        .bind(&row.parent_url)
        .bind(row.depth)
        .bind(&row.discovery_source)
        .bind(row.links_in)
        .bind(&row.severity)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn pages_for_host(&self, host_suffix: &str) -> Result<Vec<PageRow>, StoreError> {
        let pattern = format!("%{host_suffix}%");
        let rows = sqlx::query_as::<_, PageRow>("SELECT * FROM pages WHERE url LIKE ? ORDER BY url")
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn count_all(&self) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
