// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Fleet deployment use case.
//!
//! Build once, then fan out: sync the closure to every target, ensure the
//! named session exists, run the command inside it. Per-node failures are
//! collected, not thrown; the deployment only fails outright when the
//! build breaks or every node fails.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::application::{ensure_session_command, session_run_command, NodeOutcome, UseCaseError};
use crate::domain::deployment::{Deployment, DeploymentStatus};
use crate::domain::fingerprint::Fingerprint;
use crate::domain::node::Node;
use crate::domain::ports::{BuildPort, EventBusPort, PortError, RemoteExecutorPort};
use crate::domain::session::{ConfigPath, SessionId};
use crate::infrastructure::config::OperationTimeouts;

/// Structured result covering every target node.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetDeployOutcome {
    pub session_id: SessionId,
    pub status: DeploymentStatus,
    pub fingerprint: Option<Fingerprint>,
    pub outcomes: Vec<(Node, NodeOutcome)>,
}

impl FleetDeployOutcome {
    pub fn succeeded_nodes(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_ok()).count()
    }

    pub fn failed_nodes(&self) -> usize {
        self.outcomes.len() - self.succeeded_nodes()
    }
}

pub struct DeployFleet {
    build: Arc<dyn BuildPort>,
    executor: Arc<dyn RemoteExecutorPort>,
    bus: Arc<dyn EventBusPort>,
    timeouts: OperationTimeouts,
}

impl DeployFleet {
    pub fn new(
        build: Arc<dyn BuildPort>,
        executor: Arc<dyn RemoteExecutorPort>,
        bus: Arc<dyn EventBusPort>,
        timeouts: OperationTimeouts,
    ) -> Self {
        Self {
            build,
            executor,
            bus,
            timeouts,
        }
    }

    pub async fn execute(
        &self,
        config_path: &ConfigPath,
        command: &str,
        session_name: &str,
        targets: &[Node],
    ) -> Result<FleetDeployOutcome> {
        if targets.is_empty() {
            return Err(UseCaseError::Validation("no target nodes given".to_string()).into());
        }
        let session_id = SessionId::new(session_name)
            .map_err(|e| UseCaseError::Validation(e.to_string()))?;

        let deployment = Deployment::new(session_id.clone(), config_path.clone());
        let deployment = deployment.start_build()?;
        let deployment = self.publish(deployment).await;

        info!(session = %session_id, config = %config_path, "building configuration");
        let built = timeout(
            Duration::from_secs(self.timeouts.build_seconds),
            self.build.build(config_path),
        )
        .await
        .map_err(|_| PortError::timeout("build", self.timeouts.build_seconds))
        .and_then(|r| r);

        let fingerprint = match built {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                warn!(session = %session_id, error = %err, "build failed");
                let deployment = deployment.fail(format!("build failed: {err}"))?;
                self.publish(deployment).await;
                return Ok(FleetDeployOutcome {
                    session_id,
                    status: DeploymentStatus::Failed,
                    fingerprint: None,
                    outcomes: targets
                        .iter()
                        .map(|n| (n.clone(), NodeOutcome::Fail(format!("build failed: {err}"))))
                        .collect(),
                });
            }
        };

        let deployment = deployment.complete_build(fingerprint.clone())?;
        let deployment = self.publish(deployment).await;
        let deployment = deployment.start_deploy()?;

        // Sync fan-out. A stalled node burns its own timeout, not its
        // siblings'.
        let sync_results = join_all(targets.iter().map(|node| {
            let executor = Arc::clone(&self.executor);
            let fingerprint = fingerprint.clone();
            let sync_seconds = self.timeouts.sync_seconds;
            async move {
                let result = timeout(
                    Duration::from_secs(sync_seconds),
                    executor.sync_closure(std::slice::from_ref(node), &fingerprint),
                )
                .await
                .map_err(|_| PortError::timeout("sync_closure", sync_seconds))
                .and_then(|r| r);
                (node.clone(), result)
            }
        }))
        .await;

        let mut outcomes: Vec<(Node, NodeOutcome)> = Vec::with_capacity(targets.len());
        let mut survivors: Vec<Node> = Vec::new();
        for (node, result) in sync_results {
            match result {
                Ok(()) => survivors.push(node),
                Err(err) => {
                    warn!(%node, error = %err, "closure sync failed");
                    outcomes.push((node, NodeOutcome::Fail(format!("sync: {err}"))));
                }
            }
        }

        if survivors.is_empty() {
            let deployment = deployment.fail("closure sync failed on all nodes")?;
            self.publish(deployment).await;
            return Ok(FleetDeployOutcome {
                session_id,
                status: DeploymentStatus::Failed,
                fingerprint: Some(fingerprint),
                outcomes,
            });
        }

        // Session + command fan-out on the nodes that have the closure.
        let shell_command = match self.build.shell(config_path, command).await {
            Ok(shell_command) => shell_command,
            Err(err) => {
                let deployment = deployment.fail(format!("shell wrapping failed: {err}"))?;
                self.publish(deployment).await;
                for node in survivors {
                    outcomes.push((node, NodeOutcome::Fail(format!("shell: {err}"))));
                }
                outcomes.sort_by_key(|(node, _)| targets.iter().position(|t| t == node));
                return Ok(FleetDeployOutcome {
                    session_id,
                    status: DeploymentStatus::Failed,
                    fingerprint: Some(fingerprint),
                    outcomes,
                });
            }
        };
        let exec_results = join_all(survivors.iter().map(|node| {
            let executor = Arc::clone(&self.executor);
            let ensure = ensure_session_command(session_name);
            let run = session_run_command(session_name, &shell_command);
            let exec_seconds = self.timeouts.exec_seconds;
            async move {
                let result = async {
                    timeout(
                        Duration::from_secs(exec_seconds),
                        executor.exec(std::slice::from_ref(node), &ensure),
                    )
                    .await
                    .map_err(|_| PortError::timeout("exec", exec_seconds))
                    .and_then(|r| r)?;
                    timeout(
                        Duration::from_secs(exec_seconds),
                        executor.exec(std::slice::from_ref(node), &run),
                    )
                    .await
                    .map_err(|_| PortError::timeout("exec", exec_seconds))
                    .and_then(|r| r)
                }
                .await;
                (node.clone(), result)
            }
        }))
        .await;

        let mut succeeded: Vec<Node> = Vec::new();
        for (node, result) in exec_results {
            match result {
                Ok(()) => {
                    succeeded.push(node.clone());
                    outcomes.push((node, NodeOutcome::Ok));
                }
                Err(err) => {
                    warn!(%node, error = %err, "command execution failed");
                    outcomes.push((node, NodeOutcome::Fail(format!("exec: {err}"))));
                }
            }
        }
        // Report outcomes in target order.
        outcomes.sort_by_key(|(node, _)| targets.iter().position(|t| t == node));

        let status;
        if succeeded.is_empty() {
            let deployment = deployment.fail("command execution failed on all nodes")?;
            self.publish(deployment).await;
            status = DeploymentStatus::Failed;
        } else {
            info!(
                session = %session_id,
                succeeded = succeeded.len(),
                total = targets.len(),
                "deployment completed"
            );
            let deployment = deployment.complete(succeeded)?;
            self.publish(deployment).await;
            status = DeploymentStatus::Completed;
        }

        Ok(FleetDeployOutcome {
            session_id,
            status,
            fingerprint: Some(fingerprint),
            outcomes,
        })
    }

    /// Drain the aggregate's events onto the bus, preserving append order.
    async fn publish(&self, deployment: Deployment) -> Deployment {
        let (deployment, events) = deployment.take_events();
        self.bus.publish(events).await;
        deployment
    }
}
