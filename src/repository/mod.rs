mod http;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{OwnerScope, PartialRewardSummary, RewardSummary, TaskId, TaskRecord};

pub use http::{FeatureRoutes, HttpTaskRepository};

/// Bearer credential passed through to every repository call.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Network error: {0}")]
    Transient(String),

    #[error("Task not ready according to server: {0}")]
    NotReady(String),

    #[error("Task not found or already resolved: {0}")]
    NotFound(String),

    #[error("Credentials rejected")]
    Unauthorized,

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Decode(String),
}

/// How the tracker reacts to a repository failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retried by the next tick, or by the user for loads.
    Transient,
    /// Someone else already resolved the task. Dropped quietly.
    Conflict,
    /// Server disagrees. Task stays active, error surfaced.
    Rejected,
    /// Left to the surrounding application's re-authentication flow.
    Unauthorized,
}

impl RepositoryError {
    pub fn class(&self) -> FailureClass {
        match self {
            RepositoryError::Transient(_) => FailureClass::Transient,
            RepositoryError::NotFound(_) => FailureClass::Conflict,
            RepositoryError::NotReady(_)
            | RepositoryError::Rejected { .. }
            | RepositoryError::Decode(_) => FailureClass::Rejected,
            RepositoryError::Unauthorized => FailureClass::Unauthorized,
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// The authoritative backend for one feature's tasks.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn list_by_owner(
        &self,
        scope: &OwnerScope,
        token: &AuthToken,
    ) -> RepositoryResult<Vec<TaskRecord>>;

    async fn complete(&self, id: &TaskId, token: &AuthToken) -> RepositoryResult<RewardSummary>;

    async fn cancel(
        &self,
        id: &TaskId,
        token: &AuthToken,
    ) -> RepositoryResult<PartialRewardSummary>;
}
