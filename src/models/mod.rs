mod reward;
mod task;
pub mod timestamp;

pub use reward::{PartialRewardSummary, RewardSummary};
pub use task::{CellCoord, OwnerId, OwnerScope, TaskId, TaskKind, TaskRecord, TaskStatus};
