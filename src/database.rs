/*!
    Provides durable storage of tasks in SQLite.
!*/
use std::str::FromStr;

use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;

use crate::config::DatabaseSettings;
use crate::task::{Priority, Task};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("task {id} has an unknown priority code {code}")]
    UnknownPriority { id: i64, code: i64 },
}

/// Outcome of [`TaskStore::replace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replaced {
    Replaced,
    /// No task with that id.
    Missing,
    /// The stored completion flag no longer matches the one the caller read.
    Stale,
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: i64,
    title: String,
    description: String,
    is_completed: bool,
    created_at: NaiveDateTime,
    completed_at: Option<NaiveDateTime>,
    priority: i64,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let priority = u8::try_from(row.priority)
            .ok()
            .and_then(Priority::from_code)
            .ok_or(StoreError::UnknownPriority {
                id: row.id,
                code: row.priority,
            })?;
        Ok(Task {
            id: row.id,
            title: row.title,
            description: row.description,
            is_completed: row.is_completed,
            created_at: row.created_at,
            completed_at: row.completed_at,
            priority,
        })
    }
}

const SELECT_TASK: &str = r#"
    select id, title, description, is_completed, created_at, completed_at, priority
    from task
"#;

const NEWEST_FIRST: &str = "order by created_at desc, id desc";

/// Handle to the task table. Cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        TaskStore { pool }
    }

    /// Opens the database, creating the file if needed, and applies
    /// pending migrations.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&settings.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_with(options)
            .await?;
        let store = TaskStore::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<Task>, StoreError> {
        let select_stmt = format!("{SELECT_TASK} where id = $1");
        sqlx::query_as::<_, TaskRow>(&select_stmt)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Task::try_from)
            .transpose()
    }

    pub async fn get_all(&self) -> Result<Vec<Task>, StoreError> {
        let select_stmt = format!("{SELECT_TASK} {NEWEST_FIRST}");
        let rows = sqlx::query_as::<_, TaskRow>(&select_stmt)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    pub async fn get_by_status(&self, is_completed: bool) -> Result<Vec<Task>, StoreError> {
        let select_stmt = format!("{SELECT_TASK} where is_completed = $1 {NEWEST_FIRST}");
        let rows = sqlx::query_as::<_, TaskRow>(&select_stmt)
            .bind(is_completed)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    /// Inserts `task` under a fresh id and returns it as stored. The id
    /// carried by `task` is ignored.
    pub async fn insert(&self, task: Task) -> Result<Task, StoreError> {
        let insert_stmt = r#"
            insert into task(title, description, is_completed, created_at, completed_at, priority)
            values($1, $2, $3, $4, $5, $6)
        "#;
        let res = sqlx::query(insert_stmt)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.is_completed)
            .bind(task.created_at)
            .bind(task.completed_at)
            .bind(i64::from(task.priority.code()))
            .execute(&self.pool)
            .await?;
        Ok(Task {
            id: res.last_insert_rowid(),
            ..task
        })
    }

    /// Writes every field of `task` to the row `id`, provided the row's
    /// completion flag still equals `observed_completed`.
    pub async fn replace(
        &self,
        id: i64,
        task: &Task,
        observed_completed: bool,
    ) -> Result<Replaced, StoreError> {
        let update_stmt = r#"
            update task
            set title = $1, description = $2, is_completed = $3,
                created_at = $4, completed_at = $5, priority = $6
            where id = $7 and is_completed = $8
        "#;
        let res = sqlx::query(update_stmt)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.is_completed)
            .bind(task.created_at)
            .bind(task.completed_at)
            .bind(i64::from(task.priority.code()))
            .bind(id)
            .bind(observed_completed)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() > 0 {
            return Ok(Replaced::Replaced);
        }

        let exists: i64 = sqlx::query_scalar("select exists(select 1 from task where id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(if exists != 0 {
            Replaced::Stale
        } else {
            Replaced::Missing
        })
    }

    /// Returns true if a task was deleted.
    pub async fn remove(&self, id: i64) -> Result<bool, StoreError> {
        let res = sqlx::query("delete from task where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
