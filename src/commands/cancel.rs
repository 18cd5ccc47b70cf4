use anyhow::Result;
use clap::Args as ClapArgs;

use crate::commands::common::{self, TargetArgs};
use crate::config::Config;
use crate::models::TaskId;
use crate::tracker::Resolution;

#[derive(ClapArgs)]
pub struct Args {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Task to cancel
    pub task_id: String,
}

pub async fn execute(args: Args, config: Config) -> Result<()> {
    let tracker = common::connect(config, &args.target).await?;
    let id = TaskId::new(args.task_id);

    match tracker.cancel_task(&id).await {
        Ok(Resolution::Confirmed(partial)) => {
            println!("Task {} cancelled, kept: {}", id, partial.summary_line());
        }
        Ok(Resolution::InFlight) => {
            println!("Task {} is already being resolved", id);
        }
        Ok(Resolution::ResolvedElsewhere) => {
            println!("Task {} was already resolved", id);
        }
        Err(e) => {
            return Err(common::explain(e).context(format!("Failed to cancel task {}", id)));
        }
    }

    Ok(())
}
