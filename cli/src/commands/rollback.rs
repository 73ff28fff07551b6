//! `chimera rollback -t TARGETS [-g GEN]` — switch targets back to a
//! previous generation.

use anyhow::Result;
use colored::Colorize;

use chimera_core::application::NodeOutcome;

use crate::commands::parse_targets;
use crate::context::AppContext;
use crate::exit::{EXIT_FAILURE, EXIT_OK};

pub async fn handle(ctx: &AppContext, targets: &str, generation: Option<u32>) -> Result<i32> {
    let nodes = parse_targets(targets)?;
    let outcomes = ctx.rollback.execute(&nodes, generation).await?;

    let mut failed = 0;
    for (node, outcome) in &outcomes {
        match outcome {
            NodeOutcome::Ok => println!("{} {node}", "rolled back:".green().bold()),
            NodeOutcome::Fail(reason) => {
                failed += 1;
                println!("{} {node}: {reason}", "failed:".red().bold());
            }
        }
    }

    Ok(if failed == 0 { EXIT_OK } else { EXIT_FAILURE })
}
