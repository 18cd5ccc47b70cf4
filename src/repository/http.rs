use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AuthToken, RepositoryError, RepositoryResult, TaskRepository};
use crate::models::{OwnerScope, PartialRewardSummary, RewardSummary, TaskId, TaskRecord};

/// Path templates for one feature. `{owner}` and `{id}` are substituted
/// percent-encoded, so they are safe in both path segments and query values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRoutes {
    pub list: String,
    pub complete: String,
    pub cancel: String,
}

impl FeatureRoutes {
    /// Conventional layout: `/api/<segment>?owner=..`, `/api/<segment>/{id}/complete`.
    pub fn conventional(segment: &str) -> Self {
        Self {
            list: format!("/api/{}?owner={{owner}}", segment),
            complete: format!("/api/{}/{{id}}/complete", segment),
            cancel: format!("/api/{}/{{id}}/cancel", segment),
        }
    }

    pub fn list_path(&self, scope: &OwnerScope) -> String {
        self.list
            .replace("{owner}", &urlencoding::encode(scope.owner_id.as_str()))
    }

    pub fn complete_path(&self, id: &TaskId) -> String {
        self.complete
            .replace("{id}", &urlencoding::encode(id.as_str()))
    }

    pub fn cancel_path(&self, id: &TaskId) -> String {
        self.cancel
            .replace("{id}", &urlencoding::encode(id.as_str()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskListBody {
    Bare(Vec<TaskRecord>),
    Wrapped { tasks: Vec<TaskRecord> },
}

impl From<TaskListBody> for Vec<TaskRecord> {
    fn from(body: TaskListBody) -> Self {
        match body {
            TaskListBody::Bare(tasks) | TaskListBody::Wrapped { tasks } => tasks,
        }
    }
}

/// JSON-over-HTTP repository for a single feature (dig, train, explore, quest).
pub struct HttpTaskRepository {
    client: Client,
    base_url: String,
    routes: FeatureRoutes,
}

impl HttpTaskRepository {
    pub fn new(
        base_url: impl Into<String>,
        routes: FeatureRoutes,
        request_timeout: Duration,
    ) -> RepositoryResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RepositoryError::Transient(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url, routes))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, routes: FeatureRoutes) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            routes,
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn send<T: DeserializeOwned + Default>(
        &self,
        method: Method,
        path: String,
        token: &AuthToken,
    ) -> RepositoryResult<T> {
        let url = self.url(&path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url);
        if !token.is_empty() {
            request = request.bearer_auth(token.as_str());
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        decode_body(&body)
    }
}

fn transport_error(e: reqwest::Error) -> RepositoryError {
    if e.is_decode() {
        RepositoryError::Decode(e.to_string())
    } else {
        RepositoryError::Transient(e.to_string())
    }
}

/// Maps a non-success HTTP status onto the repository failure taxonomy.
fn status_error(status: StatusCode, body: &str) -> RepositoryError {
    let message = error_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    });

    match status.as_u16() {
        401 | 403 => RepositoryError::Unauthorized,
        404 | 410 => RepositoryError::NotFound(message),
        409 | 422 | 425 => RepositoryError::NotReady(message),
        408 | 429 => RepositoryError::Transient(message),
        code if status.is_server_error() => {
            RepositoryError::Transient(format!("server error {}: {}", code, message))
        }
        code => RepositoryError::Rejected {
            status: code,
            message,
        },
    }
}

/// Pulls a human message out of `{"error": ..}`, `{"detail": ..}` or `{"message": ..}`.
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => ["error", "detail", "message"]
            .iter()
            .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
            .map(str::to_string)
            .or_else(|| Some(trimmed.to_string())),
        Err(_) => Some(trimmed.to_string()),
    }
}

fn decode_body<T: DeserializeOwned + Default>(body: &str) -> RepositoryResult<T> {
    if body.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(body).map_err(|e| RepositoryError::Decode(e.to_string()))
}

#[async_trait]
impl TaskRepository for HttpTaskRepository {
    async fn list_by_owner(
        &self,
        scope: &OwnerScope,
        token: &AuthToken,
    ) -> RepositoryResult<Vec<TaskRecord>> {
        let body: Option<TaskListBody> = self
            .send(Method::GET, self.routes.list_path(scope), token)
            .await?;
        Ok(body.map(Vec::from).unwrap_or_default())
    }

    async fn complete(&self, id: &TaskId, token: &AuthToken) -> RepositoryResult<RewardSummary> {
        self.send(Method::POST, self.routes.complete_path(id), token)
            .await
    }

    async fn cancel(
        &self,
        id: &TaskId,
        token: &AuthToken,
    ) -> RepositoryResult<PartialRewardSummary> {
        self.send(Method::POST, self.routes.cancel_path(id), token)
            .await
    }
}
