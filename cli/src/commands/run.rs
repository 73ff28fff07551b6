//! `chimera run [-c path] [-s session] CMD` — deploy locally and run the
//! command in a persistent session.

use anyhow::Result;
use colored::Colorize;

use chimera_core::domain::session::ConfigPath;

use crate::context::AppContext;
use crate::exit::EXIT_OK;

pub async fn handle(
    ctx: &AppContext,
    config_path: Option<String>,
    session: Option<String>,
    command: &str,
) -> Result<i32> {
    let config_path = ConfigPath::new(
        config_path.unwrap_or_else(|| ctx.config.nix.config_path.clone()),
    );
    let session_name = session.unwrap_or_else(|| ctx.config.fleet.session_name.clone());

    let session_id = ctx
        .execute_local
        .execute(&config_path, command, &session_name)
        .await?;

    println!(
        "{} command running in session {}",
        "ok:".green().bold(),
        session_id.to_string().cyan()
    );
    println!("   attach with: chimera attach {session_id}");
    Ok(EXIT_OK)
}
