// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! SSH remote executor: closure sync, command execution, fingerprint
//! probes, and generation rollback over plain ssh.

use async_trait::async_trait;
use futures::future::join_all;
use tokio::process::Command;
use tracing::debug;

use chimera_core::domain::fingerprint::Fingerprint;
use chimera_core::domain::node::Node;
use chimera_core::domain::ports::{PortError, PortResult, RemoteExecutorPort};

const SYSTEM_PROFILE_LINK: &str = "/run/current-system";

pub struct SshExecutor;

impl SshExecutor {
    pub fn new() -> Self {
        Self
    }

    async fn ssh(&self, node: &Node, command: &str) -> PortResult<String> {
        debug!(%node, command, "ssh exec");
        let destination = format!("{}@{}", node.user, node.host);
        let output = Command::new("ssh")
            .args([
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
                "-p",
                &node.port.to_string(),
                &destination,
                command,
            ])
            .output()
            .await
            .map_err(|e| PortError::failed("ssh", e.to_string()))?;
        if !output.status.success() {
            return Err(PortError::failed(
                "ssh",
                format!(
                    "{}: {}",
                    node,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn copy_closure(&self, node: &Node, fingerprint: &Fingerprint) -> PortResult<()> {
        let destination = format!("{}@{}", node.user, node.host);
        let output = Command::new("nix-copy-closure")
            .env("NIX_SSHOPTS", format!("-p {}", node.port))
            .args(["--to", &destination, fingerprint.as_str()])
            .output()
            .await
            .map_err(|e| PortError::failed("nix-copy-closure", e.to_string()))?;
        if !output.status.success() {
            return Err(PortError::failed(
                "nix-copy-closure",
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    fn collect(results: Vec<PortResult<()>>) -> PortResult<()> {
        results.into_iter().collect()
    }
}

#[async_trait]
impl RemoteExecutorPort for SshExecutor {
    async fn sync_closure(&self, nodes: &[Node], fingerprint: &Fingerprint) -> PortResult<()> {
        let results = join_all(
            nodes
                .iter()
                .map(|node| self.copy_closure(node, fingerprint)),
        )
        .await;
        Self::collect(results)
    }

    async fn exec(&self, nodes: &[Node], command: &str) -> PortResult<()> {
        let results = join_all(
            nodes
                .iter()
                .map(|node| async move { self.ssh(node, command).await.map(|_| ()) }),
        )
        .await;
        Self::collect(results)
    }

    async fn current_fingerprint(&self, node: &Node) -> PortResult<Option<Fingerprint>> {
        let store_path = match self
            .ssh(node, &format!("readlink -f {SYSTEM_PROFILE_LINK}"))
            .await
        {
            Ok(path) => path,
            Err(_) => return Err(PortError::unreachable(node)),
        };
        if store_path.is_empty() {
            return Ok(None);
        }
        let base = store_path.rsplit('/').next().unwrap_or(&store_path);
        let hash = base.split('-').next().unwrap_or(base);
        Ok(Fingerprint::new(hash).ok())
    }

    async fn rollback(&self, nodes: &[Node], generation: Option<u32>) -> PortResult<()> {
        let command = match generation {
            Some(generation) => format!(
                "nix-env --profile /nix/var/nix/profiles/system \
                 --switch-generation {generation} && \
                 /nix/var/nix/profiles/system/bin/switch-to-configuration switch"
            ),
            None => "nixos-rebuild switch --rollback".to_string(),
        };
        let results = join_all(
            nodes
                .iter()
                .map(|node| async { self.ssh(node, &command).await.map(|_| ()) }),
        )
        .await;
        Self::collect(results)
    }
}
