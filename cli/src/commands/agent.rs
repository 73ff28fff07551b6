//! `chimera agent --node-id ID [...]` — run the node agent loops.

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use tokio::sync::watch;
use tracing::info;

use chimera_core::domain::node::Node;
use chimera_core::domain::session::ConfigPath;
use chimera_core::infrastructure::agent::NodeAgent;
use chimera_core::infrastructure::config::AgentSection;

use crate::adapters::orchestrator::LocalOrchestrator;
use crate::context::AppContext;
use crate::exit::{CliError, EXIT_INVALID_ARGS, EXIT_OK};

pub async fn handle(
    ctx: &AppContext,
    node_id: &str,
    heartbeat: Option<u64>,
    drift_interval: Option<u64>,
    no_auto_heal: bool,
) -> Result<i32> {
    let node = Node::parse(node_id)
        .map_err(|e| CliError::new(EXIT_INVALID_ARGS, format!("invalid node id: {e}")))?;

    let section = AgentSection {
        node_id: node_id.to_string(),
        heartbeat_interval: heartbeat.unwrap_or(ctx.config.agent.heartbeat_interval),
        drift_check_interval: drift_interval.unwrap_or(ctx.config.agent.drift_check_interval),
        auto_heal: !no_auto_heal && ctx.config.agent.auto_heal,
    };

    // Resolve the expected state the same way the watch loop does.
    let config_path = ConfigPath::new(ctx.config.nix.config_path.clone());
    let expected = ctx.build.build(&config_path).await?;

    let orchestrator = Arc::new(LocalOrchestrator::new(Arc::clone(&ctx.registry)));
    let agent = NodeAgent::new(
        section,
        node,
        expected,
        orchestrator,
        Arc::clone(&ctx.executor),
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("agent shutdown requested");
            let _ = cancel_tx.send(true);
        }
    });

    println!(
        "{} agent {} reporting (ctrl-c to stop)",
        "*".cyan().bold(),
        node_id
    );
    agent.run(cancel_rx).await;

    Ok(EXIT_OK)
}
