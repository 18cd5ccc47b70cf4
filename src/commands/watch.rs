use anyhow::{bail, Result};
use clap::Args as ClapArgs;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::warn;

use crate::commands::common::{self, TargetArgs};
use crate::config::Config;
use crate::tracker::{TrackerEvent, TrackerRuntime};
use crate::utils::truncate_str;

const ERROR_DISPLAY_CHARS: usize = 80;

#[derive(ClapArgs)]
pub struct Args {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Seconds between progress redraws
    #[arg(short, long, default_value = "5")]
    pub refresh: u64,

    /// Exit once no active tasks remain
    #[arg(long)]
    pub until_idle: bool,
}

pub async fn execute(args: Args, config: Config) -> Result<()> {
    let soon_threshold = config.completing_soon_secs;
    let schedule = config.schedule.to_schedule();
    let tracker = common::connect(config, &args.target).await?;

    println!(
        "Watching {} tasks for {} (Ctrl+C to stop)",
        args.target.feature, args.target.owner
    );
    common::print_tasks(&tracker, soon_threshold);

    let mut events = tracker.subscribe();
    let runtime = TrackerRuntime::spawn(tracker.clone(), schedule);

    let mut redraw = interval(Duration::from_secs(args.refresh.max(1)));
    redraw.set_missed_tick_behavior(MissedTickBehavior::Skip);
    redraw.tick().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut auth_failed = false;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = events.recv() => match event {
                Ok(TrackerEvent::AuthenticationRequired) => {
                    auth_failed = true;
                    break;
                }
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event display fell behind, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            _ = redraw.tick() => {
                println!();
                common::print_tasks(&tracker, soon_threshold);
                if args.until_idle && tracker.all_active().is_empty() {
                    break;
                }
            }
        }
    }

    runtime.shutdown().await;

    if auth_failed {
        bail!("Credentials rejected; set VTASK_TOKEN or auth_token and restart");
    }
    Ok(())
}

fn print_event(event: &TrackerEvent) {
    match event {
        TrackerEvent::Loaded { count } => println!("Reconciled: {} tasks", count),
        TrackerEvent::TaskReady { id } => println!("Task {} finished, completing...", id),
        TrackerEvent::TaskCompleted { id, reward } => {
            println!("Task {} completed: {}", id, reward.summary_line())
        }
        TrackerEvent::TaskCancelled { id, partial } => {
            println!("Task {} cancelled: {}", id, partial.summary_line())
        }
        TrackerEvent::TaskDropped { id } => println!("Task {} was resolved elsewhere", id),
        TrackerEvent::CompletionFailed { id, error } => println!(
            "Task {} could not be completed: {}",
            id,
            truncate_str(error, ERROR_DISPLAY_CHARS)
        ),
        TrackerEvent::AuthenticationRequired => println!("Credentials rejected"),
    }
}
