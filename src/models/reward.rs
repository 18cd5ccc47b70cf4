use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Whatever the backend hands back for a finished task.
///
/// Reward contents are game balance and stay opaque to the engine; they are
/// carried to events and callers untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardSummary {
    pub fields: Map<String, Value>,
}

/// Returned by `cancel`: same shape, computed server-side with partial rules.
pub type PartialRewardSummary = RewardSummary;

impl RewardSummary {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// One-line `key=value` rendering for terminal output.
    pub fn summary_line(&self) -> String {
        if self.is_empty() {
            return "no reward".to_string();
        }
        self.fields
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}={}", k, s),
                other => format!("{}={}", k, other),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
