use crate::models::{PartialRewardSummary, RewardSummary, TaskId};

/// Broadcast to presentation code as the tracker makes progress.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Loaded { count: usize },
    TaskReady { id: TaskId },
    TaskCompleted { id: TaskId, reward: RewardSummary },
    TaskCancelled { id: TaskId, partial: PartialRewardSummary },
    /// Resolved by another client; removed without surfacing an error.
    TaskDropped { id: TaskId },
    CompletionFailed { id: TaskId, error: String },
    AuthenticationRequired,
}
