use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The set of tasks fetched by a single `list_by_owner` call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerScope {
    pub owner_id: OwnerId,
}

impl OwnerScope {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: OwnerId::new(owner_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Active,
    Completing,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Active => "active",
            TaskStatus::Completing => "completing",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellCoord {
    pub floor: i32,
    pub column: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    Dig {
        cell: CellCoord,
    },
    Train {
        stat: String,
    },
    Explore {
        #[serde(default)]
        party: Vec<OwnerId>,
        #[serde(default)]
        loot: Vec<String>,
    },
    Quest {
        quest_id: String,
        #[serde(default)]
        party: Vec<OwnerId>,
    },
}

impl TaskKind {
    pub fn label(&self) -> String {
        match self {
            TaskKind::Dig { cell } => format!("dig ({}, {})", cell.floor, cell.column),
            TaskKind::Train { stat } => format!("train {}", stat),
            TaskKind::Explore { party, loot } => {
                format!("explore [{} dwellers, {} loot]", party.len(), loot.len())
            }
            TaskKind::Quest { quest_id, .. } => format!("quest {}", quest_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub owner_id: OwnerId,
    pub kind: TaskKind,
    #[serde(with = "super::timestamp")]
    pub started_at: DateTime<Utc>,
    pub duration_seconds: u64,
    #[serde(default)]
    pub status: TaskStatus,
}

impl TaskRecord {
    pub fn finishes_at(&self) -> DateTime<Utc> {
        let duration_ms = i64::try_from(self.duration_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
        self.started_at
            .checked_add_signed(Duration::milliseconds(duration_ms))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// True when both records describe the same timing window.
    pub fn same_schedule(&self, other: &TaskRecord) -> bool {
        self.started_at == other.started_at && self.duration_seconds == other.duration_seconds
    }
}
