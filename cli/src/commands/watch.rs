//! `chimera watch -t TARGETS [-c path] [-i SECS] [-s session] [--once]` —
//! the autonomous drift-healing loop, cancellable with ctrl-c.

use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use tokio::sync::watch;
use tracing::info;

use chimera_core::application::autonomous_loop::{FleetTarget, LoopParams};
use chimera_core::domain::session::ConfigPath;

use crate::commands::parse_targets;
use crate::context::AppContext;
use crate::exit::EXIT_OK;

const DEFAULT_HEAL_COMMAND: &str = "nixos-rebuild switch";
const DEFAULT_RESTART_COMMAND: &str = "systemctl restart chimera-managed.target";

pub async fn handle(
    ctx: &AppContext,
    targets: &str,
    config_path: Option<String>,
    interval: Option<u64>,
    session: Option<String>,
    once: bool,
) -> Result<i32> {
    let nodes = parse_targets(targets)?;
    let production: Vec<_> = ctx
        .config
        .fleet
        .production_targets
        .iter()
        .filter_map(|t| chimera_core::domain::node::Node::parse(t).ok())
        .collect();
    let fleet_targets: Vec<FleetTarget> = nodes
        .into_iter()
        .map(|node| {
            let is_production = production.contains(&node);
            let target = FleetTarget::new(node);
            if is_production {
                target.production()
            } else {
                target
            }
        })
        .collect();

    let params = LoopParams {
        config_path: ConfigPath::new(
            config_path.unwrap_or_else(|| ctx.config.nix.config_path.clone()),
        ),
        targets: fleet_targets,
        interval: Duration::from_secs(
            interval.unwrap_or(ctx.config.watch.interval_seconds).max(1),
        ),
        session_name: session.unwrap_or_else(|| ctx.config.watch.session_name.clone()),
        once,
        subject_id: ctx.subject_id.clone(),
        heal_command: DEFAULT_HEAL_COMMAND.to_string(),
        restart_command: DEFAULT_RESTART_COMMAND.to_string(),
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancellation requested");
            let _ = cancel_tx.send(true);
        }
    });

    println!(
        "{} watching {} node(s) every {}s (ctrl-c to stop)",
        "*".cyan().bold(),
        params.targets.len(),
        params.interval.as_secs()
    );
    ctx.autonomous.run(&params, &ctx.policy, cancel_rx).await?;

    Ok(EXIT_OK)
}
