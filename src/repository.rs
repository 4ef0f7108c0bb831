/*!
    Business rules for tasks on top of the [`TaskStore`].

    The repository is the only writer of `created_at` and `completed_at`.
!*/
use std::fmt;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use thiserror::Error;

use crate::database::{Replaced, StoreError, TaskStore};
use crate::task::{NewTask, Task, TaskChanges};

const UPDATE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("task {id} kept changing while it was being updated")]
    Conflict { id: i64 },
}

type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

#[derive(Clone)]
pub struct TaskRepository {
    store: TaskStore,
    clock: Clock,
}

impl fmt::Debug for TaskRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRepository")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl TaskRepository {
    /// Timestamps are taken from the local wall clock.
    pub fn new(store: TaskStore) -> Self {
        Self::with_clock(store, || Local::now().naive_local())
    }

    pub fn with_clock(
        store: TaskStore,
        clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static,
    ) -> Self {
        TaskRepository {
            store,
            clock: Arc::new(clock),
        }
    }

    pub async fn create_task(&self, input: NewTask) -> Result<Task, RepositoryError> {
        let task = Task::new(input, (self.clock)());
        let task = self.store.insert(task).await?;
        tracing::debug!(id = task.id, "task created");
        Ok(task)
    }

    pub async fn get_task(&self, id: i64) -> Result<Option<Task>, RepositoryError> {
        Ok(self.store.get(id).await?)
    }

    /// Replaces title, description and priority and applies the completion
    /// transition. `None` if there is no task `id`.
    ///
    /// The write only lands if the completion flag is still the one the
    /// transition was computed from; otherwise the task is re-read and the
    /// transition recomputed.
    pub async fn update_task(
        &self,
        id: i64,
        changes: TaskChanges,
    ) -> Result<Option<Task>, RepositoryError> {
        for _ in 0..UPDATE_ATTEMPTS {
            let Some(existing) = self.store.get(id).await? else {
                return Ok(None);
            };
            let observed = existing.is_completed;
            let updated = apply_changes(existing, changes.clone(), (self.clock)());

            match self.store.replace(id, &updated, observed).await? {
                Replaced::Replaced => {
                    tracing::debug!(id, is_completed = updated.is_completed, "task updated");
                    return Ok(Some(updated));
                }
                Replaced::Missing => return Ok(None),
                Replaced::Stale => {
                    tracing::debug!(id, "completion flag changed underneath update, retrying");
                }
            }
        }
        Err(RepositoryError::Conflict { id })
    }

    /// Returns true if the task existed and was removed.
    pub async fn delete_task(&self, id: i64) -> Result<bool, RepositoryError> {
        let removed = self.store.remove(id).await?;
        if removed {
            tracing::debug!(id, "task deleted");
        }
        Ok(removed)
    }

    /// Newest first.
    pub async fn list_tasks(&self) -> Result<Vec<Task>, RepositoryError> {
        Ok(self.store.get_all().await?)
    }

    /// Newest first.
    pub async fn list_by_status(&self, is_completed: bool) -> Result<Vec<Task>, RepositoryError> {
        Ok(self.store.get_by_status(is_completed).await?)
    }
}

/// Overwrites the client-writable fields of `existing` and stamps or clears
/// `completed_at` when the completion flag flips.
fn apply_changes(mut existing: Task, changes: TaskChanges, now: NaiveDateTime) -> Task {
    existing.title = changes.title;
    existing.description = changes.description;
    existing.priority = changes.priority;

    match (existing.is_completed, changes.is_completed) {
        (false, true) => existing.completed_at = Some(now),
        (true, false) => existing.completed_at = None,
        _ => {}
    }
    existing.is_completed = changes.is_completed;
    existing
}
