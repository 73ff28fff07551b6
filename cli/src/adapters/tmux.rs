// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! tmux session adapter for local persistent sessions.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use chimera_core::domain::ports::{PortError, PortResult, SessionPort};
use chimera_core::domain::session::SessionId;

pub struct TmuxAdapter;

impl TmuxAdapter {
    pub fn new() -> Self {
        Self
    }

    async fn tmux(&self, args: &[&str]) -> PortResult<std::process::Output> {
        debug!(?args, "spawning tmux");
        Command::new("tmux")
            .args(args)
            .output()
            .await
            .map_err(|e| PortError::failed("tmux", e.to_string()))
    }
}

#[async_trait]
impl SessionPort for TmuxAdapter {
    async fn create(&self, id: &SessionId) -> PortResult<bool> {
        let exists = self
            .tmux(&["has-session", "-t", id.as_str()])
            .await?
            .status
            .success();
        if exists {
            return Ok(false);
        }
        let output = self.tmux(&["new-session", "-d", "-s", id.as_str()]).await?;
        if !output.status.success() {
            return Err(PortError::failed(
                "tmux new-session",
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(true)
    }

    async fn list(&self) -> PortResult<Vec<SessionId>> {
        let output = self
            .tmux(&["list-sessions", "-F", "#{session_name}"])
            .await?;
        if !output.status.success() {
            // tmux exits non-zero when no server is running.
            return Ok(Vec::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| SessionId::new(line.trim()).ok())
            .collect())
    }

    async fn kill(&self, id: &SessionId) -> PortResult<bool> {
        Ok(self
            .tmux(&["kill-session", "-t", id.as_str()])
            .await?
            .status
            .success())
    }

    async fn run(&self, id: &SessionId, command: &str) -> PortResult<bool> {
        let output = self
            .tmux(&["send-keys", "-t", id.as_str(), command, "C-m"])
            .await?;
        Ok(output.status.success())
    }

    async fn attach_command(&self, id: &SessionId) -> PortResult<String> {
        Ok(format!("tmux attach-session -t {}", id.as_str()))
    }
}
