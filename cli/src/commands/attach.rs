//! `chimera attach SESSION_ID` — attach the terminal to a session.

use anyhow::{Context, Result};

use chimera_core::domain::session::SessionId;

use crate::context::AppContext;
use crate::exit::{CliError, EXIT_FAILURE, EXIT_INVALID_ARGS, EXIT_OK};

pub async fn handle(ctx: &AppContext, session_id: &str) -> Result<i32> {
    let session_id = SessionId::new(session_id)
        .map_err(|e| CliError::new(EXIT_INVALID_ARGS, e.to_string()))?;
    let attach = ctx.sessions.attach_command(&session_id).await?;

    let mut parts = attach.split_whitespace();
    let program = parts.next().context("empty attach command")?;
    let status = std::process::Command::new(program)
        .args(parts)
        .status()
        .with_context(|| format!("running {attach:?}"))?;

    Ok(if status.success() { EXIT_OK } else { EXIT_FAILURE })
}
