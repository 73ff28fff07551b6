// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! The autonomous check -> plan -> authorize -> heal loop.
//!
//! Builds the expected fingerprint once, then periodically surveys the
//! fleet. Remediation is chosen by the healing plan's global action and
//! gated by the policy engine whenever the plan requires approval.
//! Cancellation is honored at the sleep, between planning and execution,
//! and during a heal: a heal interrupted mid-deployment publishes
//! `DeploymentFailed(reason = "cancelled")` so no run is left dangling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::application::deploy_fleet::DeployFleet;
use crate::application::rollback::RollbackDeployment;
use crate::application::{ensure_session_command, session_run_command};
use crate::domain::drift::{HealingPlan, SuggestedAction};
use crate::domain::events::{DomainEvent, EventPayload};
use crate::domain::node::Node;
use crate::domain::policy::{Decision, Permission, Policy};
use crate::domain::ports::{BuildPort, EventBusPort, PortError, RemoteExecutorPort};
use crate::domain::services::drift_detection::{DriftDetectionService, NodeContext};
use crate::domain::session::{ConfigPath, SessionId};
use crate::infrastructure::config::OperationTimeouts;

/// A loop target with its escalation context.
#[derive(Debug, Clone)]
pub struct FleetTarget {
    pub node: Node,
    pub production: bool,
}

impl FleetTarget {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            production: false,
        }
    }

    pub fn production(mut self) -> Self {
        self.production = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct LoopParams {
    pub config_path: ConfigPath,
    pub targets: Vec<FleetTarget>,
    pub interval: Duration,
    pub session_name: String,
    pub once: bool,
    pub subject_id: String,
    /// Command deployed to drifted nodes on REBUILD_CONFIG.
    pub heal_command: String,
    /// Command run in each drifted node's session on RESTART_SERVICE.
    pub restart_command: String,
}

pub struct AutonomousLoop {
    build: Arc<dyn BuildPort>,
    executor: Arc<dyn RemoteExecutorPort>,
    bus: Arc<dyn EventBusPort>,
    drift: Arc<DriftDetectionService>,
    deploy_fleet: Arc<DeployFleet>,
    rollback: Arc<RollbackDeployment>,
    timeouts: OperationTimeouts,
}

impl AutonomousLoop {
    pub fn new(
        build: Arc<dyn BuildPort>,
        executor: Arc<dyn RemoteExecutorPort>,
        bus: Arc<dyn EventBusPort>,
        drift: Arc<DriftDetectionService>,
        deploy_fleet: Arc<DeployFleet>,
        rollback: Arc<RollbackDeployment>,
        timeouts: OperationTimeouts,
    ) -> Self {
        Self {
            build,
            executor,
            bus,
            drift,
            deploy_fleet,
            rollback,
            timeouts,
        }
    }

    pub async fn run(
        &self,
        params: &LoopParams,
        policy: &Policy,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let expected = timeout(
            Duration::from_secs(self.timeouts.build_seconds),
            self.build.build(&params.config_path),
        )
        .await
        .map_err(|_| PortError::timeout("build", self.timeouts.build_seconds))
        .and_then(|r| r)
        .context("resolving expected fleet state")?;
        info!(fingerprint = %expected, "expected system fingerprint resolved");

        let nodes: Vec<Node> = params.targets.iter().map(|t| t.node.clone()).collect();
        let mut consecutive: HashMap<Node, u32> = HashMap::new();

        loop {
            let reports = self.drift.survey(&nodes, &expected).await;
            for report in &reports {
                if report.is_congruent {
                    consecutive.insert(report.node.clone(), 0);
                } else if !report.is_unreachable() {
                    *consecutive.entry(report.node.clone()).or_insert(0) += 1;
                }
            }

            let contexts: Vec<NodeContext> = params
                .targets
                .iter()
                .map(|t| NodeContext {
                    node: t.node.clone(),
                    production: t.production,
                    consecutive_drifts: consecutive.get(&t.node).copied().unwrap_or(0),
                })
                .collect();
            let plan = self.drift.plan(&contexts, &reports);

            self.bus
                .publish(
                    plan.drift_reports
                        .iter()
                        .map(|report| {
                            DomainEvent::new(EventPayload::DriftDetected {
                                report: report.clone(),
                            })
                        })
                        .collect(),
                )
                .await;

            if *shutdown.borrow() {
                info!("autonomous loop cancelled before healing");
                return Ok(());
            }

            if plan.has_drift() {
                warn!(
                    drifted = plan.drift_reports.len(),
                    action = ?plan.global_action,
                    requires_approval = plan.requires_approval,
                    "drift detected"
                );
                self.heal(params, policy, &plan, &mut shutdown).await?;
            } else {
                info!(nodes = nodes.len(), "fleet congruent");
            }

            if params.once {
                return Ok(());
            }

            tokio::select! {
                _ = tokio::time::sleep(params.interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("autonomous loop cancelled during sleep");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn heal(
        &self,
        params: &LoopParams,
        policy: &Policy,
        plan: &HealingPlan,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        if plan.requires_approval
            && policy.authorize(&params.subject_id, Permission::HealRebuild) == Decision::Deny
        {
            warn!(subject = %params.subject_id, "healing requires approval, authorization denied");
            self.bus
                .publish(vec![DomainEvent::new(EventPayload::HealingSkipped {
                    subject_id: params.subject_id.clone(),
                    reason: "authorization_denied".to_string(),
                })])
                .await;
            return Ok(());
        }

        let drifted = plan.drifted_nodes();
        self.bus
            .publish(vec![DomainEvent::new(EventPayload::HealingTriggered {
                action: plan.global_action,
                nodes: drifted.clone(),
            })])
            .await;

        tokio::select! {
            result = self.execute_action(params, plan, &drifted) => result,
            _ = cancelled(shutdown) => {
                warn!("healing cancelled mid-flight");
                if plan.global_action == SuggestedAction::RebuildConfig {
                    if let Ok(session_id) = SessionId::new(params.session_name.as_str()) {
                        self.bus
                            .publish(vec![DomainEvent::new(EventPayload::DeploymentFailed {
                                session_id,
                                reason: "cancelled".to_string(),
                            })])
                            .await;
                    }
                }
                Ok(())
            }
        }
    }

    async fn execute_action(
        &self,
        params: &LoopParams,
        plan: &HealingPlan,
        drifted: &[Node],
    ) -> Result<()> {
        match plan.global_action {
            SuggestedAction::RestartService => {
                for node in drifted {
                    let target = std::slice::from_ref(node);
                    let ensure = ensure_session_command(&params.session_name);
                    let run = session_run_command(&params.session_name, &params.restart_command);
                    let result = async {
                        self.executor.exec(target, &ensure).await?;
                        self.executor.exec(target, &run).await
                    }
                    .await;
                    if let Err(err) = result {
                        warn!(%node, error = %err, "restart healing failed");
                    }
                }
            }
            SuggestedAction::RebuildConfig => {
                let outcome = self
                    .deploy_fleet
                    .execute(
                        &params.config_path,
                        &params.heal_command,
                        &params.session_name,
                        drifted,
                    )
                    .await?;
                info!(
                    succeeded = outcome.succeeded_nodes(),
                    failed = outcome.failed_nodes(),
                    "rebuild healing finished"
                );
            }
            SuggestedAction::RollbackGeneration => {
                let outcomes = self.rollback.execute(drifted, None).await?;
                let failed = outcomes.iter().filter(|(_, o)| !o.is_ok()).count();
                info!(
                    succeeded = outcomes.len() - failed,
                    failed,
                    "rollback healing finished"
                );
            }
            SuggestedAction::ManualIntervention => {
                warn!(nodes = drifted.len(), "drift requires manual intervention");
            }
        }
        Ok(())
    }

}

async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender dropped: treat as never-cancelled.
            std::future::pending::<()>().await;
        }
    }
}
