/*!
    Task domain types shared by the store, the HTTP API and the client.
!*/
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PriorityError {
    #[error("unknown priority code {0}, expected 0 (low), 1 (medium) or 2 (high)")]
    UnknownCode(u8),
    #[error("unknown priority '{0}', expected low, medium or high")]
    UnknownName(String),
}

/// How urgent a task is.
///
/// Travels as the integer from [`Priority::code`] on the wire and in the
/// database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const fn code(self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Priority::Low),
            1 => Some(Priority::Medium),
            2 => Some(Priority::High),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.code()
    }
}

impl TryFrom<u8> for Priority {
    type Error = PriorityError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Priority::from_code(code).ok_or(PriorityError::UnknownCode(code))
    }
}

impl FromStr for Priority {
    type Err = PriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(PriorityError::UnknownName(s.to_string())),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A tracked task.
///
/// `created_at` and `completed_at` are written by the repository only;
/// `completed_at` is present exactly when `is_completed` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub is_completed: bool,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub priority: Priority,
}

impl Task {
    /// A not yet persisted task. The id is assigned by the store on insert.
    pub fn new(input: NewTask, created_at: NaiveDateTime) -> Self {
        Task {
            id: 0,
            title: input.title,
            description: input.description,
            is_completed: false,
            created_at,
            completed_at: None,
            priority: input.priority,
        }
    }

    /// The update that would leave this task as it is.
    pub fn changes(&self) -> TaskChanges {
        TaskChanges {
            title: self.title.clone(),
            description: self.description.clone(),
            is_completed: self.is_completed,
            priority: self.priority,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.is_completed { 'x' } else { ' ' };
        write!(
            f,
            "#{} [{}] {} ({})",
            self.id, mark, self.title, self.priority
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
}

/// Full replacement of the client-writable fields of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskChanges {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub is_completed: bool,
    pub priority: Priority,
}

impl TaskChanges {
    pub fn completed(mut self, is_completed: bool) -> Self {
        self.is_completed = is_completed;
        self
    }
}

/// A title must contain at least one non-whitespace character.
pub fn is_valid_title(title: &str) -> bool {
    !title.trim().is_empty()
}
