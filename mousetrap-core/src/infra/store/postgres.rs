use std::fmt;

use async_trait::async_trait;
use mousetrap_contracts::{BackendError, Result, TaskStore};
use mousetrap_model::{
    EpochMillis, NewTask, ScanResult, ScanState, Task, TaskTransition,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// SQLSTATE for `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

/// Task store backed by the `scan_tasks` table.
///
/// Guarded transitions are a single `UPDATE ... WHERE scan_state = $expected`;
/// zero affected rows is disambiguated into `RaceLost` or `NotFound`.
#[derive(Clone)]
pub struct PostgresTaskStore {
    pool: PgPool,
}

impl fmt::Debug for PostgresTaskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresTaskStore")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .finish()
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    file_path: String,
    scan_state: String,
    created_ts: i64,
    scan_start_ts: i64,
    scan_end_ts: i64,
    scan_result: String,
    viruses: Vec<String>,
    scan_attempts: i32,
    size_mb: f64,
    file_hash: String,
    notify_channels: Vec<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = BackendError;

    fn try_from(row: TaskRow) -> Result<Self> {
        let corrupt = |reason: String| {
            BackendError::Unavailable(format!(
                "corrupt scan_tasks row {}: {reason}",
                row.file_path
            ))
        };
        Ok(Task {
            scan_state: row
                .scan_state
                .parse()
                .map_err(|e: mousetrap_model::ModelError| corrupt(e.to_string()))?,
            scan_result: row
                .scan_result
                .parse()
                .map_err(|e: mousetrap_model::ModelError| corrupt(e.to_string()))?,
            scan_attempts: u32::try_from(row.scan_attempts).map_err(|_| {
                corrupt(format!("negative scan_attempts {}", row.scan_attempts))
            })?,
            created_ts: row.created_ts,
            scan_start_ts: row.scan_start_ts,
            scan_end_ts: row.scan_end_ts,
            viruses: row.viruses,
            size_mb: row.size_mb,
            file_hash: row.file_hash,
            notify_channels: row.notify_channels,
            file_path: row.file_path,
        })
    }
}

fn map_sqlx(context: &str, err: sqlx::Error) -> BackendError {
    match &err {
        sqlx::Error::Database(db)
            if db.code().as_deref() == Some(UNDEFINED_TABLE) =>
        {
            BackendError::Misconfigured(format!(
                "{context}: scan_tasks table does not exist, run migrations ({err})"
            ))
        }
        sqlx::Error::PoolTimedOut => {
            BackendError::Timeout(format!("{context}: {err}"))
        }
        _ => BackendError::Unavailable(format!("{context}: {err}")),
    }
}

impl PostgresTaskStore {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, run a health check, and confirm the table exists.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx("Task store failed to connect", e))?;
        let store = Self::from_pool(pool);
        store.verify_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn verify_schema(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                map_sqlx("Task store failed Postgres health check", e)
            })?;

        let exists: Option<String> =
            sqlx::query_scalar("SELECT to_regclass('scan_tasks')::TEXT")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx("Task store schema validation failed", e))?;
        if exists.is_none() {
            return Err(BackendError::Misconfigured(
                "scan_tasks table does not exist, run migrations".into(),
            ));
        }

        info!("Task store connected to Postgres");
        Ok(())
    }

    async fn exists(&self, file_path: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM scan_tasks WHERE file_path = $1)",
        )
        .bind(file_path)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx("task existence check failed", e))
    }
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    async fn list_by_states(&self, states: &[ScanState]) -> Result<Vec<Task>> {
        let states: Vec<&str> = states.iter().map(ScanState::as_str).collect();
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT *
            FROM scan_tasks
            WHERE scan_state = ANY($1)
            ORDER BY created_ts ASC, file_path ASC
            "#,
        )
        .bind(&states)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("list_by_states failed", e))?;

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn get(&self, file_path: &str) -> Result<Option<Task>> {
        sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM scan_tasks WHERE file_path = $1",
        )
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("get task failed", e))?
        .map(Task::try_from)
        .transpose()
    }

    async fn create(&self, task: NewTask, created_ts: EpochMillis) -> Result<Task> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            INSERT INTO scan_tasks (
                file_path, scan_state, created_ts, scan_start_ts, scan_end_ts,
                scan_result, viruses, scan_attempts, size_mb, file_hash,
                notify_channels
            )
            VALUES ($1, 'PENDING', $2, -1, -1, 'PENDING', '{}', 0, $3, $4, $5)
            ON CONFLICT (file_path) DO UPDATE SET
                scan_state = EXCLUDED.scan_state,
                created_ts = EXCLUDED.created_ts,
                scan_start_ts = EXCLUDED.scan_start_ts,
                scan_end_ts = EXCLUDED.scan_end_ts,
                scan_result = EXCLUDED.scan_result,
                viruses = EXCLUDED.viruses,
                scan_attempts = EXCLUDED.scan_attempts,
                size_mb = EXCLUDED.size_mb,
                file_hash = EXCLUDED.file_hash,
                notify_channels = EXCLUDED.notify_channels
            RETURNING *
            "#,
        )
        .bind(&task.file_path)
        .bind(created_ts)
        .bind(task.size_mb)
        .bind(&task.file_hash)
        .bind(&task.notify_channels)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx("create task failed", e))?;

        Task::try_from(row)
    }

    async fn transition(
        &self,
        file_path: &str,
        transition: TaskTransition,
    ) -> Result<Task> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE scan_tasks
            SET scan_state = $2,
                scan_start_ts = COALESCE($3, scan_start_ts),
                scan_attempts = scan_attempts + $4
            WHERE file_path = $1
              AND ($5::TEXT IS NULL OR scan_state = $5)
            RETURNING *
            "#,
        )
        .bind(file_path)
        .bind(transition.to.as_str())
        .bind(transition.scan_start_ts)
        .bind(i32::from(transition.increment_attempts))
        .bind(transition.expected.map(|state| state.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("transition failed", e))?;

        match row {
            Some(row) => Task::try_from(row),
            None if self.exists(file_path).await? => {
                Err(BackendError::RaceLost(file_path.to_string()))
            }
            None => Err(BackendError::NotFound(file_path.to_string())),
        }
    }

    async fn set_terminal(
        &self,
        file_path: &str,
        result: ScanResult,
        viruses: &[String],
        ts: EpochMillis,
    ) -> Result<Task> {
        sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE scan_tasks
            SET scan_state = 'FINISHED',
                scan_result = $2,
                viruses = $3,
                scan_end_ts = $4,
                scan_attempts = scan_attempts + 1
            WHERE file_path = $1
            RETURNING *
            "#,
        )
        .bind(file_path)
        .bind(result.as_str())
        .bind(viruses)
        .bind(ts)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("set_terminal failed", e))?
        .ok_or_else(|| BackendError::NotFound(file_path.to_string()))
        .and_then(Task::try_from)
    }

    async fn set_failed(
        &self,
        file_path: &str,
        ts: EpochMillis,
        record_result: bool,
    ) -> Result<Task> {
        sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE scan_tasks
            SET scan_state = 'FAILED',
                scan_end_ts = $2,
                scan_attempts = scan_attempts + 1,
                scan_result = CASE WHEN $3 THEN 'FAILED' ELSE scan_result END
            WHERE file_path = $1
            RETURNING *
            "#,
        )
        .bind(file_path)
        .bind(ts)
        .bind(record_result)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("set_failed failed", e))?
        .ok_or_else(|| BackendError::NotFound(file_path.to_string()))
        .and_then(Task::try_from)
    }
}
