// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Nix build adapter: shells out to the local nix toolchain.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use chimera_core::domain::fingerprint::Fingerprint;
use chimera_core::domain::ports::{BuildPort, PortError, PortResult};
use chimera_core::domain::session::ConfigPath;

pub struct NixAdapter;

impl NixAdapter {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, program: &str, args: &[&str]) -> PortResult<String> {
        debug!(program, ?args, "spawning nix command");
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| PortError::failed(program, e.to_string()))?;
        if !output.status.success() {
            return Err(PortError::failed(
                program,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Extract the fingerprint from a store path like
/// `/nix/store/<hash>-name`: the hash segment of the last component.
fn fingerprint_of_store_path(store_path: &str) -> PortResult<Fingerprint> {
    let base = store_path.rsplit('/').next().unwrap_or(store_path);
    let hash = base.split('-').next().unwrap_or(base);
    Fingerprint::new(hash).map_err(|e| PortError::failed("nix-build", e.to_string()))
}

#[async_trait]
impl BuildPort for NixAdapter {
    async fn build(&self, path: &ConfigPath) -> PortResult<Fingerprint> {
        let store_path = self
            .run("nix-build", &[path.as_str(), "--no-out-link"])
            .await?;
        let first = store_path
            .lines()
            .next()
            .ok_or_else(|| PortError::failed("nix-build", "no output path"))?;
        fingerprint_of_store_path(first)
    }

    async fn instantiate(&self, path: &ConfigPath) -> PortResult<String> {
        self.run("nix-instantiate", &[path.as_str()]).await
    }

    async fn shell(&self, path: &ConfigPath, command: &str) -> PortResult<String> {
        // No spawn needed: construct the wrapped invocation.
        Ok(format!(
            "nix-shell {} --run {}",
            path.as_str(),
            shell_quote(command)
        ))
    }
}

fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_from_store_path() {
        let fp =
            fingerprint_of_store_path("/nix/store/a1b2c3d4e5f6g7h8i9j0a1b2c3d4e5f6-system")
                .unwrap();
        assert_eq!(fp.as_str(), "a1b2c3d4e5f6g7h8i9j0a1b2c3d4e5f6");
    }

    #[tokio::test]
    async fn test_shell_wraps_without_spawning() {
        let adapter = NixAdapter::new();
        let wrapped = adapter
            .shell(&ConfigPath::new("./default.nix"), "echo it's done")
            .await
            .unwrap();
        assert_eq!(wrapped, r"nix-shell ./default.nix --run 'echo it'\''s done'");
    }
}
