//! Durable job store (§4.8, §3.5). `claim()` is the sole locking primitive: a
//! transactional read of the oldest queued row followed by a conditional update whose
//! affected-row count decides whether the caller actually won the claim.

use crate::models::{JobOwner, JobRow, JobState, JobType};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    status TEXT NOT NULL,
    user_id TEXT,
    api_key TEXT,
    ip_hash TEXT,
    payload TEXT NOT NULL,
    progress TEXT,
    result TEXT,
    error TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_status_created ON jobs(status, created_at);
CREATE INDEX IF NOT EXISTS idx_jobs_owner ON jobs(user_id, api_key);
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("job not found: {0}")]
    NotFound(String),
}

#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        // A single connection is required for `:memory:` databases, where every pooled
        // connection would otherwise see its own empty database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 8 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        Ok(JobStore { pool })
    }

    /// Insert a new row in state `queued`, returning its id.
    pub async fn create(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        owner: &JobOwner,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO jobs (id, type, status, user_id, api_key, ip_hash, payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(job_type.as_str())
        .bind(JobState::Queued.as_str())
        .bind(&owner.user_id)
        .bind(&owner.api_key)
        .bind(&owner.ip_hash)
        .bind(payload.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Claim the oldest queued job. Returns `None` if no queued job exists or another
    /// worker won the race (the conditional `UPDATE` affected zero rows).
    pub async fn claim(&self) -> Result<Option<JobRow>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let candidate: Option<String> = sqlx::query("SELECT id FROM jobs WHERE status = ? ORDER BY created_at LIMIT 1")
            .bind(JobState::Queued.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.get::<String, _>("id"));

        let id = match candidate {
            Some(id) => id,
            None => {
                tx.commit().await?;
                return Ok(None);
            }
        };

        let now = chrono::Utc::now();
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, started_at = ? WHERE id = ? AND status = ?",
        )
        .bind(JobState::Running.as_str())
        .bind(now)
        .bind(&id)
        .bind(JobState::Queued.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.commit().await?;
            return Ok(None);
        }

        let row = fetch_row(&mut *tx, &id).await?;
        tx.commit().await?;
        Ok(row)
    }

    pub async fn get(&self, id: &str) -> Result<Option<JobRow>, StoreError> {
        fetch_row(&self.pool, id).await
    }

    pub async fn progress(&self, id: &str, snapshot: serde_json::Value) -> Result<(), StoreError> {
        sqlx::query("UPDATE jobs SET progress = ? WHERE id = ? AND status = ?")
            .bind(snapshot.to_string())
            .bind(id)
            .bind(JobState::Running.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn complete(&self, id: &str, result: serde_json::Value) -> Result<(), StoreError> {
        self.finish(id, JobState::Complete, Some(result), None).await
    }

    pub async fn fail(&self, id: &str, error: &str) -> Result<(), StoreError> {
        self.finish(id, JobState::Failed, None, Some(error.to_string())).await
    }

    /// Transition to canceled. Legal from `queued` or `running`; a no-op from any
    /// terminal state (§4.8).
    pub async fn cancel(&self, id: &str) -> Result<(), StoreError> {
        let now = chrono::Utc::now();
        sqlx::query(
            "UPDATE jobs SET status = ?, finished_at = ? WHERE id = ? AND status IN (?, ?)",
        )
        .bind(JobState::Canceled.as_str())
        .bind(now)
        .bind(id)
        .bind(JobState::Queued.as_str())
        .bind(JobState::Running.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn is_canceled(&self, id: &str) -> Result<bool, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT status FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(s,)| s == JobState::Canceled.as_str()).unwrap_or(false))
    }

    /// Count jobs created by `owner` within the last `window`, used for usage quotas.
    pub async fn count_recent_for_owner(
        &self,
        owner: &JobOwner,
        window: Duration,
    ) -> Result<i64, StoreError> {
        let since = chrono::Utc::now() - chrono::Duration::from_std(window).unwrap_or_default();
        let identity = owner
            .api_key
            .clone()
            .or_else(|| owner.user_id.clone())
            .or_else(|| owner.ip_hash.clone())
            .unwrap_or_default();

        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM jobs WHERE created_at >= ? AND (api_key = ? OR user_id = ? OR ip_hash = ?)",
        )
        .bind(since)
        .bind(&identity)
        .bind(&identity)
        .bind(&identity)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    /// Find an active (queued or running) job of the given type tied to the owner's
    /// payload discriminator, used to dedupe discovery job submissions (§6).
    pub async fn find_active_by_payload_field(
        &self,
        job_type: JobType,
        field: &str,
        value: &str,
    ) -> Result<Option<JobRow>, StoreError> {
        let rows = sqlx::query_as::<_, JobRowRaw>(
            "SELECT * FROM jobs WHERE type = ? AND status IN (?, ?)",
        )
        .bind(job_type.as_str())
        .bind(JobState::Queued.as_str())
        .bind(JobState::Running.as_str())
        .fetch_all(&self.pool)
        .await?;

        for raw in rows {
            let payload: serde_json::Value = serde_json::from_str(&raw.payload).unwrap_or_default();
            if payload.get(field).and_then(|v| v.as_str()) == Some(value) {
                return Ok(Some(raw.into_job_row()));
            }
        }
        Ok(None)
    }

    async fn finish(
        &self,
        id: &str,
        state: JobState,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let now = chrono::Utc::now();
        sqlx::query(
            "UPDATE jobs SET status = ?, result = ?, error = ?, finished_at = ? WHERE id = ? AND status NOT IN (?, ?, ?)",
        )
        .bind(state.as_str())
        .bind(result.map(|v| v.to_string()))
        .bind(error)
        .bind(now)
        .bind(id)
        .bind(JobState::Complete.as_str())
        .bind(JobState::Failed.as_str())
        .bind(JobState::Canceled.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct JobRowRaw {
    id: String,
    #[sqlx(rename = "type")]
    job_type: String,
    status: String,
    payload: String,
    progress: Option<String>,
    result: Option<String>,
    error: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl JobRowRaw {
    fn into_job_row(self) -> JobRow {
        JobRow {
            id: self.id,
            job_type: JobType::from_str(&self.job_type).unwrap_or(JobType::Scan),
            status: JobState::from_str(&self.status).unwrap_or(JobState::Failed),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            payload: serde_json::from_str(&self.payload).unwrap_or_default(),
            progress: self.progress.and_then(|p| serde_json::from_str(&p).ok()),
            result: self.result.and_then(|r| serde_json::from_str(&r).ok()),
            error: self.error,
        }
    }
}

async fn fetch_row<'e, E>(executor: E, id: &str) -> Result<Option<JobRow>, StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let raw = sqlx::query_as::<_, JobRowRaw>("SELECT * FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(raw.map(JobRowRaw::into_job_row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobOwner;

    #[tokio::test]
    async fn test_create_claim_complete_lifecycle() {
        let store = JobStore::open("sqlite::memory:").await.unwrap();
        let owner = JobOwner {
            api_key: Some("key-1".to_string()),
            ..Default::default()
        };
        let id = store
            .create(JobType::Scan, serde_json::json!({"url": "https://example.com"}), &owner)
            .await
            .unwrap();

        let claimed = store.claim().await.unwrap().expect("should claim the queued job");
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.status, JobState::Running);

        assert!(store.claim().await.unwrap().is_none());

        store.complete(&id, serde_json::json!({"pages": 3})).await.unwrap();
        let row = store.get(&id).await.unwrap().unwrap();
        assert_eq!(row.status, JobState::Complete);
    }

    #[tokio::test]
    async fn test_cancel_is_noop_from_terminal_state() {
        let store = JobStore::open("sqlite::memory:").await.unwrap();
        let owner = JobOwner::default();
        let id = store.create(JobType::Scan, serde_json::json!({}), &owner).await.unwrap();
        store.claim().await.unwrap();
        store.complete(&id, serde_json::json!({})).await.unwrap();

        store.cancel(&id).await.unwrap();
        let row = store.get(&id).await.unwrap().unwrap();
        assert_eq!(row.status, JobState::Complete);
    }

    #[tokio::test]
    async fn test_is_canceled() {
        let store = JobStore::open("sqlite::memory:").await.unwrap();
        let owner = JobOwner::default();
        let id = store.create(JobType::Scan, serde_json::json!({}), &owner).await.unwrap();
        assert!(!store.is_canceled(&id).await.unwrap());
        store.cancel(&id).await.unwrap();
        assert!(store.is_canceled(&id).await.unwrap());
    }
}
