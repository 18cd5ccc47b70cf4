use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::events::TrackerEvent;
use super::gate::{CompletionGate, GatePass};
use crate::clock::Clock;
use crate::models::{
    OwnerScope, PartialRewardSummary, RewardSummary, TaskId, TaskRecord, TaskStatus,
};
use crate::progress::{compute_progress, Progress};
use crate::repository::{AuthToken, FailureClass, RepositoryError, TaskRepository};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("Task {id} is {status}, expected active")]
    InvalidState { id: TaskId, status: TaskStatus },

    #[error("A completion or cancellation for task {0} is already in flight")]
    InFlight(TaskId),

    #[error("No owner scope loaded yet")]
    NotLoaded,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl TrackerError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TrackerError::Repository(RepositoryError::Unauthorized))
    }
}

/// Outcome of a terminal-transition request that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    /// The repository confirmed the transition.
    Confirmed(T),
    /// Another call for the same task is already running; nothing was sent.
    InFlight,
    /// The repository no longer knows the task. It was dropped locally.
    ResolvedElsewhere,
}

/// A task record with its derived progress from the most recent evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedTask {
    pub record: TaskRecord,
    pub progress: Progress,
}

impl TrackedTask {
    fn new(record: TaskRecord, now: DateTime<Utc>) -> Self {
        let progress = compute_progress(&record, now);
        Self { record, progress }
    }

    /// Recomputes progress, never lowering the fraction of an unchanged schedule.
    fn refresh(&mut self, now: DateTime<Utc>) {
        let next = compute_progress(&self.record, now);
        if next.fraction >= self.progress.fraction {
            self.progress = next;
        } else {
            debug!(
                "Clock moved backwards for task {}, keeping {:.3}",
                self.record.id, self.progress.fraction
            );
            self.progress.is_ready =
                self.record.status == TaskStatus::Active && self.progress.fraction >= 1.0;
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.record.id
    }

    pub fn status(&self) -> TaskStatus {
        self.record.status
    }
}

/// Holds the gate pass of an in-flight completion.
///
/// Unless disarmed, dropping it returns the task to `Active` before the gate
/// is released. This also covers a completion future dropped mid-call.
struct CompletionGuard<'a, R: TaskRepository> {
    tracker: &'a TaskTracker<R>,
    id: &'a TaskId,
    armed: bool,
    _pass: GatePass<'a>,
}

impl<R: TaskRepository> CompletionGuard<'_, R> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<R: TaskRepository> Drop for CompletionGuard<'_, R> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Completion of task {} did not finish, back to active", self.id);
            self.tracker.revert_to_active(self.id);
        }
    }
}

#[derive(Default)]
struct TrackerState {
    tasks: BTreeMap<TaskId, TrackedTask>,
    /// Ids confirmed terminal during this tracker's lifetime.
    resolved: HashMap<TaskId, TaskStatus>,
    scope: Option<OwnerScope>,
}

impl TrackerState {
    fn status_of(&self, id: &TaskId) -> Option<TaskStatus> {
        self.tasks
            .get(id)
            .map(|t| t.record.status)
            .or_else(|| self.resolved.get(id).copied())
    }
}

/// Owns the in-memory view of one feature's tasks and drives their completion.
///
/// Derived fields change on `tick`, status changes only through
/// `complete_task`/`cancel_task` after the repository answers, and the set
/// itself is replaced by `load`. The state mutex is never held across an
/// await, so each of those steps is atomic with respect to the others.
pub struct TaskTracker<R: TaskRepository> {
    repository: R,
    clock: Arc<dyn Clock>,
    gate: CompletionGate,
    state: Mutex<TrackerState>,
    token: RwLock<AuthToken>,
    events: broadcast::Sender<TrackerEvent>,
}

impl<R: TaskRepository> TaskTracker<R> {
    pub fn new(repository: R, clock: Arc<dyn Clock>, token: AuthToken) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            repository,
            clock,
            gate: CompletionGate::new(),
            state: Mutex::new(TrackerState::default()),
            token: RwLock::new(token),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("TaskTracker state mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn token(&self) -> AuthToken {
        match self.token.read() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn emit(&self, event: TrackerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    #[allow(dead_code)]
    pub fn set_auth_token(&self, token: AuthToken) {
        match self.token.write() {
            Ok(mut current) => *current = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[allow(dead_code)]
    pub fn scope(&self) -> Option<OwnerScope> {
        self.state().scope.clone()
    }

    #[allow(dead_code)]
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Number of terminal-transition calls currently in flight.
    #[allow(dead_code)]
    pub fn in_flight(&self) -> usize {
        self.gate.len()
    }

    /// Replaces the tracked set with the repository's view of `scope`.
    ///
    /// Tasks with a terminal call in flight keep their local status and stay
    /// tracked even if the response omits them. Ids already resolved are
    /// never re-added. Returns the number of tracked tasks.
    pub async fn load(&self, scope: &OwnerScope) -> Result<usize, TrackerError> {
        let token = self.token();
        let fetched = self.repository.list_by_owner(scope, &token).await?;
        let now = self.clock.now();

        let count = {
            let mut state = self.state();
            let mut previous = std::mem::take(&mut state.tasks);
            let mut next = BTreeMap::new();

            for mut record in fetched {
                if record.status.is_terminal() || state.resolved.contains_key(&record.id) {
                    continue;
                }
                let local = previous.remove(&record.id);
                record.status = match &local {
                    Some(local) if self.gate.is_held(&record.id) => local.record.status,
                    _ => TaskStatus::Active,
                };

                let mut tracked = match local {
                    Some(mut local) if local.record.same_schedule(&record) => {
                        local.record = record;
                        local
                    }
                    _ => TrackedTask::new(record, now),
                };
                tracked.refresh(now);
                next.insert(tracked.record.id.clone(), tracked);
            }

            for (id, local) in previous {
                if self.gate.is_held(&id) && !local.record.status.is_terminal() {
                    debug!("Keeping in-flight task {} missing from fetch", id);
                    next.insert(id, local);
                }
            }

            state.tasks = next;
            state.scope = Some(scope.clone());
            state.tasks.len()
        };

        debug!("Loaded {} tasks for owner {}", count, scope.owner_id);
        self.emit(TrackerEvent::Loaded { count });
        Ok(count)
    }

    /// Loads the most recently loaded scope again.
    pub async fn reconcile(&self) -> Result<usize, TrackerError> {
        let scope = self.scope().ok_or(TrackerError::NotLoaded)?;
        self.load(&scope).await
    }

    async fn reconcile_after_transition(&self, id: &TaskId) {
        if let Err(e) = self.reconcile().await {
            warn!("Reconcile after resolving task {} failed: {}", id, e);
        }
    }

    /// Reconciliation poll body. Failures are logged, never returned.
    pub async fn poll(&self) {
        match self.reconcile().await {
            Ok(_) => {}
            Err(TrackerError::NotLoaded) => debug!("Poll skipped: nothing loaded yet"),
            Err(e) if e.is_unauthorized() => {
                error!("Reconciliation poll rejected credentials");
                self.emit(TrackerEvent::AuthenticationRequired);
            }
            Err(e) => warn!("Reconciliation poll failed: {}", e),
        }
    }

    /// Recomputes derived fields of every active task and returns the ids
    /// that are ready to complete.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        let mut ready = Vec::new();
        let mut newly_ready = Vec::new();
        {
            let mut state = self.state();
            for (id, tracked) in state.tasks.iter_mut() {
                if tracked.record.status != TaskStatus::Active {
                    continue;
                }
                let was_ready = tracked.progress.is_ready;
                tracked.refresh(now);
                if tracked.progress.is_ready {
                    if !was_ready {
                        newly_ready.push(id.clone());
                    }
                    if !self.gate.is_held(id) {
                        ready.push(id.clone());
                    }
                }
            }
        }

        for id in newly_ready {
            debug!("Task {} is ready", id);
            self.emit(TrackerEvent::TaskReady { id });
        }
        ready
    }

    /// `tick` followed by an attempt to complete every ready task.
    /// Returns how many completions the repository confirmed.
    pub async fn tick_and_complete(&self, now: DateTime<Utc>) -> usize {
        let ready = self.tick(now);
        let attempts = ready.iter().map(|id| self.auto_complete(id));
        futures::future::join_all(attempts)
            .await
            .into_iter()
            .filter(|confirmed| *confirmed)
            .count()
    }

    /// Tick-driven completion: failures are logged and emitted, not returned.
    pub async fn auto_complete(&self, id: &TaskId) -> bool {
        match self.complete_task(id).await {
            Ok(Resolution::Confirmed(_)) => true,
            Ok(_) => false,
            Err(e) if e.is_unauthorized() => {
                error!("Completing task {} needs re-authentication", id);
                self.emit(TrackerEvent::AuthenticationRequired);
                false
            }
            Err(e) => {
                warn!("Auto-completion of task {} failed: {}", id, e);
                self.emit(TrackerEvent::CompletionFailed {
                    id: id.clone(),
                    error: e.to_string(),
                });
                false
            }
        }
    }

    /// Error for a task whose gate could not be entered or that is not active.
    fn unavailable(&self, id: &TaskId) -> TrackerError {
        match self.state().status_of(id) {
            None => TrackerError::UnknownTask(id.clone()),
            Some(TaskStatus::Active) => TrackerError::InFlight(id.clone()),
            Some(status) => TrackerError::InvalidState {
                id: id.clone(),
                status,
            },
        }
    }

    /// Moves an active task to `next` while the caller holds its gate pass.
    fn begin_transition(&self, id: &TaskId, next: TaskStatus) -> Result<(), TrackerError> {
        let mut state = self.state();
        let status = state.status_of(id);
        match (state.tasks.get_mut(id), status) {
            (Some(tracked), Some(TaskStatus::Active)) => {
                tracked.record.status = next;
                if next != TaskStatus::Active {
                    tracked.progress.is_ready = false;
                }
                Ok(())
            }
            (_, None) => Err(TrackerError::UnknownTask(id.clone())),
            (_, Some(status)) => Err(TrackerError::InvalidState {
                id: id.clone(),
                status,
            }),
        }
    }

    fn mark_resolved(&self, id: &TaskId, status: TaskStatus, keep_record: bool) {
        let mut state = self.state();
        state.resolved.insert(id.clone(), status);
        if keep_record {
            if let Some(tracked) = state.tasks.get_mut(id) {
                tracked.record.status = status;
                tracked.progress.is_ready = false;
            }
        } else {
            state.tasks.remove(id);
        }
    }

    fn drop_resolved_elsewhere(&self, id: &TaskId) {
        let mut state = self.state();
        state.tasks.remove(id);
        state.resolved.entry(id.clone()).or_insert(TaskStatus::Completed);
    }

    fn revert_to_active(&self, id: &TaskId) {
        let now = self.clock.now();
        let mut state = self.state();
        if let Some(tracked) = state.tasks.get_mut(id) {
            if tracked.record.status == TaskStatus::Completing {
                tracked.record.status = TaskStatus::Active;
                tracked.refresh(now);
            }
        }
    }

    /// Completes a task through the gate.
    ///
    /// Returns `InFlight` without contacting the repository when another
    /// completion or cancellation for the same id is running. On failure the
    /// task goes back to `Active` and the error is returned to the caller.
    pub async fn complete_task(
        &self,
        id: &TaskId,
    ) -> Result<Resolution<RewardSummary>, TrackerError> {
        let Some(pass) = self.gate.enter(id) else {
            debug!("Completion of task {} already in flight", id);
            return Ok(Resolution::InFlight);
        };
        self.begin_transition(id, TaskStatus::Completing)?;
        let mut guard = CompletionGuard {
            tracker: self,
            id,
            armed: true,
            _pass: pass,
        };

        let token = self.token();
        match self.repository.complete(id, &token).await {
            Ok(reward) => {
                self.mark_resolved(id, TaskStatus::Completed, true);
                guard.disarm();
                drop(guard);
                info!("Task {} completed: {}", id, reward.summary_line());
                self.emit(TrackerEvent::TaskCompleted {
                    id: id.clone(),
                    reward: reward.clone(),
                });
                self.reconcile_after_transition(id).await;
                Ok(Resolution::Confirmed(reward))
            }
            Err(e) if e.class() == FailureClass::Conflict => {
                self.drop_resolved_elsewhere(id);
                guard.disarm();
                drop(guard);
                debug!("Task {} was already resolved elsewhere: {}", id, e);
                self.emit(TrackerEvent::TaskDropped { id: id.clone() });
                self.reconcile_after_transition(id).await;
                Ok(Resolution::ResolvedElsewhere)
            }
            Err(e) => {
                drop(guard);
                Err(e.into())
            }
        }
    }

    /// Cancels an active task.
    ///
    /// Refused with `InvalidState` before reaching the repository when the
    /// task is completing or already terminal.
    pub async fn cancel_task(
        &self,
        id: &TaskId,
    ) -> Result<Resolution<PartialRewardSummary>, TrackerError> {
        let Some(pass) = self.gate.enter(id) else {
            return Err(self.unavailable(id));
        };
        self.begin_transition(id, TaskStatus::Active)?;

        let token = self.token();
        match self.repository.cancel(id, &token).await {
            Ok(partial) => {
                self.mark_resolved(id, TaskStatus::Cancelled, false);
                drop(pass);
                info!("Task {} cancelled: {}", id, partial.summary_line());
                self.emit(TrackerEvent::TaskCancelled {
                    id: id.clone(),
                    partial: partial.clone(),
                });
                self.reconcile_after_transition(id).await;
                Ok(Resolution::Confirmed(partial))
            }
            Err(e) if e.class() == FailureClass::Conflict => {
                self.drop_resolved_elsewhere(id);
                drop(pass);
                debug!("Task {} was already resolved elsewhere: {}", id, e);
                self.emit(TrackerEvent::TaskDropped { id: id.clone() });
                self.reconcile_after_transition(id).await;
                Ok(Resolution::ResolvedElsewhere)
            }
            Err(e) => {
                drop(pass);
                Err(e.into())
            }
        }
    }

    pub fn get(&self, id: &TaskId) -> Option<TrackedTask> {
        self.state().tasks.get(id).cloned()
    }

    /// Tracked, non-terminal tasks ordered by finish time, then id.
    pub fn all_active(&self) -> Vec<TrackedTask> {
        let mut tasks: Vec<TrackedTask> = self
            .state()
            .tasks
            .values()
            .filter(|t| !t.record.status.is_terminal())
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            a.record
                .finishes_at()
                .cmp(&b.record.finishes_at())
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        tasks
    }

    /// Active tasks not yet ready whose remaining time, as of the last
    /// evaluation, is within `threshold_seconds`.
    pub fn completing_soon(&self, threshold_seconds: u64) -> Vec<TrackedTask> {
        let threshold_ms = threshold_seconds.saturating_mul(1000);
        self.all_active()
            .into_iter()
            .filter(|t| {
                t.record.status == TaskStatus::Active
                    && !t.progress.is_ready
                    && t.progress.remaining_ms <= threshold_ms
            })
            .collect()
    }
}
