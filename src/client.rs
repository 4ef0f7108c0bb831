/*!
    Client for the task HTTP API.
!*/
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::api::ErrorBody;
use crate::task::{NewTask, Task, TaskChanges};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered {status}: {message}")]
    Rejected { status: StatusCode, message: String },
}

#[derive(Debug, Clone)]
pub struct TaskClient {
    http: reqwest::Client,
    base_url: String,
}

impl TaskClient {
    /// `base_url` points at the task collection, e.g.
    /// `http://localhost:5019/api/tasks`.
    pub fn new(base_url: impl Into<String>) -> Self {
        TaskClient {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn task_url(&self, id: i64) -> String {
        format!("{}/{id}", self.base_url)
    }

    pub async fn list(&self) -> Result<Vec<Task>, ClientError> {
        let response = self.http.get(&self.base_url).send().await?;
        expect_json(response).await
    }

    pub async fn list_by_status(&self, is_completed: bool) -> Result<Vec<Task>, ClientError> {
        let url = format!("{}/status/{is_completed}", self.base_url);
        let response = self.http.get(url).send().await?;
        expect_json(response).await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Task>, ClientError> {
        let response = self.http.get(self.task_url(id)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        expect_json(response).await.map(Some)
    }

    pub async fn create(&self, task: &NewTask) -> Result<Task, ClientError> {
        let response = self.http.post(&self.base_url).json(task).send().await?;
        expect_json(response).await
    }

    pub async fn update(&self, id: i64, changes: &TaskChanges) -> Result<Option<Task>, ClientError> {
        let response = self.http.put(self.task_url(id)).json(changes).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        expect_json(response).await.map(Some)
    }

    /// Returns false if the task didn't exist.
    pub async fn delete(&self, id: i64) -> Result<bool, ClientError> {
        let response = self.http.delete(self.task_url(id)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(rejected(response).await),
        }
    }
}

async fn expect_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    if !response.status().is_success() {
        return Err(rejected(response).await);
    }
    Ok(response.json::<T>().await?)
}

async fn rejected(response: Response) -> ClientError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body.message,
        Err(_) if text.is_empty() => status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string(),
        Err(_) => text,
    };
    ClientError::Rejected { status, message }
}

#[cfg(test)]
pub(crate) mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::api::{AppState, TASKS_PATH, router};
    use crate::database::tests::memory_store;
    use crate::repository::TaskRepository;
    use crate::task::Priority;

    /// Serves a fresh in-memory API on an ephemeral port.
    pub(crate) async fn spawn_server() -> TaskClient {
        let app = router(AppState::new(TaskRepository::new(memory_store().await)));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        TaskClient::new(format!("http://{address}{TASKS_PATH}"))
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: "details".to_string(),
            priority: Priority::Low,
        }
    }

    #[tokio::test]
    async fn test_round_trip_through_server() {
        let client = spawn_server().await;

        let created = client.create(&new_task("Write report")).await.unwrap();
        assert_eq!(created.id, 1);
        assert_eq!(created.priority, Priority::Low);
        assert_eq!(client.get(1).await.unwrap(), Some(created.clone()));

        let done = client
            .update(1, &created.changes().completed(true))
            .await
            .unwrap()
            .unwrap();
        assert!(done.completed_at.is_some());
        assert_eq!(client.list_by_status(true).await.unwrap(), vec![done.clone()]);
        assert!(client.list_by_status(false).await.unwrap().is_empty());
        assert_eq!(client.list().await.unwrap(), vec![done]);

        assert!(client.delete(1).await.unwrap());
        assert!(!client.delete(1).await.unwrap());
        assert_eq!(client.get(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_task_updates_to_none() {
        let client = spawn_server().await;
        let changes = TaskChanges {
            title: "x".to_string(),
            description: String::new(),
            is_completed: true,
            priority: Priority::High,
        };
        assert_eq!(client.update(999, &changes).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejection_carries_server_message() {
        let client = spawn_server().await;
        match client.create(&new_task("  ")).await {
            Err(ClientError::Rejected { status, message }) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "title must not be empty");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}
