//! `chimera dash -t TARGETS` — terminal congruence dashboard.

use std::time::Duration;

use anyhow::Result;
use colored::Colorize;

use chimera_core::domain::session::ConfigPath;

use crate::commands::parse_targets;
use crate::context::AppContext;
use crate::exit::EXIT_OK;

const REFRESH_SECONDS: u64 = 5;

pub async fn handle(ctx: &AppContext, targets: &str) -> Result<i32> {
    let nodes = parse_targets(targets)?;
    let config_path = ConfigPath::new(ctx.config.nix.config_path.clone());
    let expected = ctx.build.build(&config_path).await?;

    println!(
        "{} fleet dashboard, expected fingerprint {} (ctrl-c to exit)",
        "*".cyan().bold(),
        expected.to_string().dimmed()
    );

    loop {
        let reports = ctx.drift.survey(&nodes, &expected).await;
        println!();
        println!("{:<28} {:<12} {}", "NODE".bold(), "STATE".bold(), "DETAILS".bold());
        for report in &reports {
            let state = if report.is_congruent {
                "congruent".green()
            } else if report.is_unreachable() {
                "unreachable".yellow()
            } else {
                "drifted".red()
            };
            println!("{:<28} {:<12} {}", report.node.to_string(), state, report.details);
        }
        let drifted = reports.iter().filter(|r| !r.is_congruent).count();
        println!(
            "{} {}/{} congruent",
            "summary:".bold(),
            reports.len() - drifted,
            reports.len()
        );

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(REFRESH_SECONDS)) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(EXIT_OK)
}
