use anyhow::Result;
use clap::Args as ClapArgs;

use crate::commands::common::{self, TargetArgs};
use crate::config::Config;

#[derive(ClapArgs)]
pub struct Args {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Complete tasks that are already finished before printing
    #[arg(long)]
    pub complete_ready: bool,
}

pub async fn execute(args: Args, config: Config) -> Result<()> {
    let soon_threshold = config.completing_soon_secs;
    let tracker = common::connect(config, &args.target).await?;

    if args.complete_ready {
        let completed = tracker.tick_and_complete(tracker.now()).await;
        if completed > 0 {
            println!("Completed {} finished tasks", completed);
        }
    } else {
        tracker.tick(tracker.now());
    }

    println!("{} tasks for {}:", args.target.feature, args.target.owner);
    common::print_tasks(&tracker, soon_threshold);

    let soon = tracker.completing_soon(soon_threshold);
    if !soon.is_empty() {
        println!("\n{} completing within {}s", soon.len(), soon_threshold);
    }

    Ok(())
}
