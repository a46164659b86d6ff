//! # HTTP Remote Service
//!
//! [`RemoteService`] over a JSONPlaceholder-style REST API.
//!
//! ## Routes
//! ```text
//! list    GET    {base}/todos?userId={user}
//! create  POST   {base}/todos           {title, completed: false, userId}
//! update  PATCH  {base}/todos/{id}      camelCase patch     404 → NotFound
//! delete  DELETE {base}/todos/{id}                          404 → NotFound
//! ```

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use tasksync_core::TaskPatch;

use crate::config::{RemoteSettings, SyncConfig};
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::protocol::{decode_list, decode_one, CreateTodoRequest, RemoteTask};
use crate::remote::{RemoteAck, RemoteService};

/// reqwest-backed remote client.
#[derive(Debug, Clone)]
pub struct HttpRemoteService {
    client: Client,
    base_url: Url,
    user_id: String,
    timeout: Duration,
}

impl HttpRemoteService {
    pub fn new(settings: &RemoteSettings) -> SyncResult<Self> {
        let base_url = Url::parse(&settings.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::InvalidConfig(format!(
                "remote.base_url cannot be a base URL: {}",
                settings.base_url
            )));
        }

        let timeout = Duration::from_millis(settings.request_timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(HttpRemoteService {
            client,
            base_url,
            user_id: settings.user_id.clone(),
            timeout,
        })
    }

    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Self::new(&config.remote)
    }

    fn todos_url(&self) -> Url {
        self.url_with(&[])
    }

    fn todo_url(&self, id: &str) -> Url {
        self.url_with(&[id])
    }

    fn url_with(&self, extra: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("todos").extend(extra);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        request.send().await.map_err(|e| self.transport_error(e))
    }

    async fn read_json(&self, response: Response) -> Result<Value, RemoteError> {
        response.json::<Value>().await.map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else if err.is_decode() {
            RemoteError::InvalidPayload(err.to_string())
        } else {
            RemoteError::Connection(err.to_string())
        }
    }
}

fn ensure_success(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(RemoteError::Status {
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl RemoteService for HttpRemoteService {
    async fn list(&self) -> Result<Vec<RemoteTask>, RemoteError> {
        let request = self
            .client
            .get(self.todos_url())
            .query(&[("userId", self.user_id.as_str())]);

        let response = ensure_success(self.send(request).await?)?;
        let tasks = decode_list(self.read_json(response).await?)?;

        debug!(count = tasks.len(), "Fetched remote tasks");
        Ok(tasks)
    }

    async fn create(&self, title: &str) -> Result<RemoteTask, RemoteError> {
        let body = CreateTodoRequest::new(title, &self.user_id);
        let request = self.client.post(self.todos_url()).json(&body);

        let response = ensure_success(self.send(request).await?)?;
        let task = decode_one(self.read_json(response).await?, None)?;

        debug!(task_id = %task.id, "Remote task created");
        Ok(task)
    }

    async fn update(
        &self,
        id: &str,
        patch: &TaskPatch,
    ) -> Result<RemoteAck<RemoteTask>, RemoteError> {
        let request = self.client.patch(self.todo_url(id)).json(patch);

        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            warn!(task_id = %id, "Remote has no task to update");
            return Ok(RemoteAck::NotFound);
        }

        let response = ensure_success(response)?;
        let task = decode_one(self.read_json(response).await?, Some(id))?;
        Ok(RemoteAck::Applied(task))
    }

    async fn delete(&self, id: &str) -> Result<RemoteAck<()>, RemoteError> {
        let response = self.send(self.client.delete(self.todo_url(id))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(task_id = %id, "Remote task already gone");
            return Ok(RemoteAck::NotFound);
        }

        ensure_success(response)?;
        Ok(RemoteAck::Applied(()))
    }
}
