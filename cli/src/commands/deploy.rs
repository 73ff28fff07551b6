//! `chimera deploy -t TARGETS [-c path] [-s session] CMD` — build once,
//! fan the closure out to the fleet, run the command on every node.

use anyhow::Result;
use colored::Colorize;

use chimera_core::application::NodeOutcome;
use chimera_core::domain::deployment::DeploymentStatus;
use chimera_core::domain::session::ConfigPath;

use crate::commands::parse_targets;
use crate::context::AppContext;
use crate::exit::{EXIT_FAILURE, EXIT_OK};

pub async fn handle(
    ctx: &AppContext,
    targets: &str,
    config_path: Option<String>,
    session: Option<String>,
    command: &str,
) -> Result<i32> {
    let nodes = parse_targets(targets)?;
    let config_path = ConfigPath::new(
        config_path.unwrap_or_else(|| ctx.config.nix.config_path.clone()),
    );
    let session_name = session.unwrap_or_else(|| ctx.config.fleet.session_name.clone());

    let outcome = ctx
        .deploy_fleet
        .execute(&config_path, command, &session_name, &nodes)
        .await?;

    for (node, node_outcome) in &outcome.outcomes {
        match node_outcome {
            NodeOutcome::Ok => println!("{} {node}", "ok:".green().bold()),
            NodeOutcome::Fail(reason) => {
                println!("{} {node}: {reason}", "failed:".red().bold())
            }
        }
    }
    if let Some(fingerprint) = &outcome.fingerprint {
        println!("fingerprint: {}", fingerprint.to_string().dimmed());
    }

    let all_ok =
        outcome.status == DeploymentStatus::Completed && outcome.failed_nodes() == 0;
    Ok(if all_ok { EXIT_OK } else { EXIT_FAILURE })
}
