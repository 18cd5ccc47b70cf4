use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use crate::clock::SystemClock;
use crate::config::{Config, Feature};
use crate::models::OwnerScope;
use crate::progress::{format_remaining, progress_bar};
use crate::repository::HttpTaskRepository;
use crate::tracker::{TaskTracker, TrackedTask, TrackerError};
use crate::utils::fit_display;

const BAR_WIDTH: usize = 20;
const LABEL_WIDTH: usize = 24;
const ID_WIDTH: usize = 14;

/// Which feature and owner a command works on.
#[derive(ClapArgs, Debug, Clone)]
pub struct TargetArgs {
    /// Feature whose tasks are tracked
    #[arg(short, long, value_enum)]
    pub feature: Feature,

    /// Owner of the tasks (vault, dweller or party id)
    #[arg(short, long)]
    pub owner: String,

    /// Backend base URL, overriding the config file
    #[arg(long)]
    pub base_url: Option<String>,
}

pub type HttpTracker = TaskTracker<HttpTaskRepository>;

/// Builds a tracker for the target and performs the initial load.
pub async fn connect(config: Config, target: &TargetArgs) -> Result<Arc<HttpTracker>> {
    let config = config.with_base_url(target.base_url.clone());
    let repository = HttpTaskRepository::new(
        &config.base_url,
        config.routes(target.feature).clone(),
        config.request_timeout(),
    )
    .context("Failed to build HTTP client")?;

    let tracker = Arc::new(TaskTracker::new(
        repository,
        Arc::new(SystemClock),
        config.auth_token(),
    ));

    let scope = OwnerScope::new(&target.owner);
    tracker.load(&scope).await.map_err(|e| {
        explain(e).context(format!(
            "Failed to load {} tasks for {}",
            target.feature, target.owner
        ))
    })?;

    Ok(tracker)
}

/// Turns a tracker error into a user-facing one, pointing at the token on 401.
pub fn explain(error: TrackerError) -> anyhow::Error {
    if error.is_unauthorized() {
        anyhow::Error::new(error).context("Credentials rejected; set VTASK_TOKEN or auth_token")
    } else {
        error.into()
    }
}

pub fn format_task_line(task: &TrackedTask, soon_threshold_secs: u64) -> String {
    let soon = !task.progress.is_ready
        && task.progress.remaining_ms <= soon_threshold_secs.saturating_mul(1000);
    let marker = if task.progress.is_ready {
        "ready"
    } else if soon {
        "soon"
    } else {
        ""
    };

    format!(
        "{} {} {} {:>3}% {:>8} {}",
        fit_display(task.id().as_str(), ID_WIDTH),
        fit_display(&task.record.kind.label(), LABEL_WIDTH),
        progress_bar(task.progress.fraction, BAR_WIDTH),
        task.progress.percent(),
        format_remaining(task.progress.remaining_ms),
        marker
    )
    .trim_end()
    .to_string()
}

pub fn print_tasks(tracker: &HttpTracker, soon_threshold_secs: u64) {
    let tasks = tracker.all_active();
    if tasks.is_empty() {
        println!("No active tasks.");
        return;
    }
    for task in &tasks {
        println!("{}", format_task_line(task, soon_threshold_secs));
    }
}
