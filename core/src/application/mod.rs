// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod autonomous_loop;
pub mod deploy_fleet;
pub mod execute_local;
pub mod rollback;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Short-circuiting use-case failures. Per-node failures never use this
/// path: they are collected into [`NodeOutcome`]s instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UseCaseError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),
}

/// Per-node result of a fan-out operation. Every target gets exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeOutcome {
    Ok,
    Fail(String),
}

impl NodeOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, NodeOutcome::Ok)
    }
}

/// Quote a string for single-quoted POSIX shell embedding.
pub(crate) fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

/// Command that makes sure a named session exists on a remote host.
pub(crate) fn ensure_session_command(session_name: &str) -> String {
    format!(
        "tmux new-session -d -s {} || true",
        shell_quote(session_name)
    )
}

/// Command that runs `command` inside a named remote session.
pub(crate) fn session_run_command(session_name: &str, command: &str) -> String {
    format!(
        "tmux send-keys -t {} {} C-m",
        shell_quote(session_name),
        shell_quote(command)
    )
}
