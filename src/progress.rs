use chrono::{DateTime, Utc};

use crate::models::{TaskRecord, TaskStatus};

const MS_PER_SECOND: u64 = 1000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;

/// Derived view of a task at one instant. Never stored on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub fraction: f64,
    pub remaining_ms: u64,
    pub is_ready: bool,
}

impl Progress {
    /// Whole seconds left, rounded up so a countdown never reads 0 early.
    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_ms.div_ceil(MS_PER_SECOND)
    }

    pub fn percent(&self) -> u8 {
        (self.fraction * 100.0).floor() as u8
    }
}

/// Maps a task and an instant to its progress. Pure: same inputs, same output.
///
/// Everything is computed in milliseconds. A start time in the future counts
/// as zero elapsed, and a zero duration is complete immediately.
pub fn compute_progress(task: &TaskRecord, now: DateTime<Utc>) -> Progress {
    let duration_ms = task.duration_seconds.saturating_mul(MS_PER_SECOND);
    let elapsed_ms = u64::try_from((now - task.started_at).num_milliseconds()).unwrap_or(0);

    let fraction = if duration_ms == 0 {
        1.0
    } else {
        (elapsed_ms as f64 / duration_ms as f64).clamp(0.0, 1.0)
    };
    let remaining_ms = duration_ms.saturating_sub(elapsed_ms);

    Progress {
        fraction,
        remaining_ms,
        is_ready: task.status == TaskStatus::Active && fraction >= 1.0,
    }
}

/// Renders a remaining time as `"Hh Mm"` from one hour up, `"Mm Ss"` below.
pub fn format_remaining(remaining_ms: u64) -> String {
    if remaining_ms == 0 {
        return "done".to_string();
    }
    let total_secs = remaining_ms.div_ceil(MS_PER_SECOND);
    if total_secs >= MS_PER_HOUR / MS_PER_SECOND {
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        format!("{}h {}m", hours, minutes)
    } else {
        let minutes = total_secs / 60;
        let seconds = total_secs % 60;
        format!("{}m {}s", minutes, seconds)
    }
}

/// Fixed-width text bar, e.g. `[#####-----]`.
pub fn progress_bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0)) * width as f64).floor() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}
