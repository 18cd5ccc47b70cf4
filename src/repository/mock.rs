use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{AuthToken, RepositoryError, RepositoryResult, TaskRepository};
use crate::models::{OwnerScope, PartialRewardSummary, RewardSummary, TaskId, TaskRecord};

/// Scripted in-memory backend. Calls yield once so concurrent callers interleave.
#[derive(Default)]
pub struct MockRepository {
    tasks: Mutex<Vec<TaskRecord>>,
    list_errors: Mutex<VecDeque<RepositoryError>>,
    complete_results: Mutex<VecDeque<RepositoryResult<RewardSummary>>>,
    cancel_results: Mutex<VecDeque<RepositoryResult<PartialRewardSummary>>>,
    /// When set, confirmed tasks stay in the listing (a lagging replica).
    stale_listing: Mutex<bool>,
    /// When set, `complete` waits for a notification before answering.
    completion_hold: Mutex<Option<Arc<Notify>>>,
    pub list_calls: AtomicUsize,
    pub complete_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    pub last_token: Mutex<Option<AuthToken>>,
}

impl MockRepository {
    pub fn with_tasks(tasks: Vec<TaskRecord>) -> Self {
        let repo = Self::default();
        *repo.tasks.lock().unwrap() = tasks;
        repo
    }

    pub fn set_tasks(&self, tasks: Vec<TaskRecord>) {
        *self.tasks.lock().unwrap() = tasks;
    }

    pub fn push_list_error(&self, error: RepositoryError) {
        self.list_errors.lock().unwrap().push_back(error);
    }

    pub fn push_complete_result(&self, result: RepositoryResult<RewardSummary>) {
        self.complete_results.lock().unwrap().push_back(result);
    }

    pub fn push_cancel_result(&self, result: RepositoryResult<PartialRewardSummary>) {
        self.cancel_results.lock().unwrap().push_back(result);
    }

    pub fn set_stale_listing(&self, stale: bool) {
        *self.stale_listing.lock().unwrap() = stale;
    }

    pub fn hold_completions(&self, release: Arc<Notify>) {
        *self.completion_hold.lock().unwrap() = Some(release);
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn complete_count(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    fn remove_task(&self, id: &TaskId) {
        if !*self.stale_listing.lock().unwrap() {
            self.tasks.lock().unwrap().retain(|t| &t.id != id);
        }
    }
}

pub fn reward(caps: i64) -> RewardSummary {
    serde_json::from_value(serde_json::json!({ "caps": caps })).unwrap()
}

#[async_trait]
impl TaskRepository for MockRepository {
    async fn list_by_owner(
        &self,
        scope: &OwnerScope,
        token: &AuthToken,
    ) -> RepositoryResult<Vec<TaskRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_token.lock().unwrap() = Some(token.clone());
        tokio::task::yield_now().await;
        if let Some(error) = self.list_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.owner_id == scope.owner_id)
            .cloned()
            .collect())
    }

    async fn complete(&self, id: &TaskId, _token: &AuthToken) -> RepositoryResult<RewardSummary> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.completion_hold.lock().unwrap().clone();
        match hold {
            Some(release) => release.notified().await,
            None => tokio::task::yield_now().await,
        }
        let result = self
            .complete_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(reward(10)));
        if result.is_ok() {
            self.remove_task(id);
        }
        result
    }

    async fn cancel(
        &self,
        id: &TaskId,
        _token: &AuthToken,
    ) -> RepositoryResult<PartialRewardSummary> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let result = self
            .cancel_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(reward(3)));
        if result.is_ok() {
            self.remove_task(id);
        }
        result
    }
}
