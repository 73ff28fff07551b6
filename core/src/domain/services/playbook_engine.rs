// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Remediation playbook execution.
//!
//! Steps run strictly in declaration order. Each step is authorized
//! against the policy engine, then executed under its own deadline. A
//! failing step without `continue_on_failure` triggers the rollback walk:
//! completed steps in reverse, best effort, failures logged and skipped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Instant};
use tracing::{info, warn};

use crate::domain::drift::DriftSeverity;
use crate::domain::events::{DomainEvent, EventPayload};
use crate::domain::node::Node;
use crate::domain::playbook::{
    Action, Playbook, Precondition, StepResult, StepStatus,
};
use crate::domain::policy::{Decision, Permission, Policy};
use crate::domain::ports::{BuildPort, EventBusPort, PortError, RemoteExecutorPort};

/// Context a playbook executes against.
#[derive(Debug, Clone)]
pub struct PlaybookContext {
    pub node: Node,
    pub subject_id: String,
    /// Whether the last probe of this node succeeded.
    pub reachable: bool,
    /// Severity of the drift that triggered this run, if any.
    pub severity: Option<DriftSeverity>,
    pub target_os: Option<String>,
}

impl PlaybookContext {
    pub fn new(node: Node, subject_id: impl Into<String>) -> Self {
        Self {
            node,
            subject_id: subject_id.into(),
            reachable: true,
            severity: None,
            target_os: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybookOutcome {
    Completed,
    Failed,
    RolledBack,
    Skipped,
}

/// Full record of one playbook run: outcome plus per-step results in
/// declaration order (attempted steps only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookRun {
    pub playbook_id: String,
    pub outcome: PlaybookOutcome,
    pub results: Vec<StepResult>,
    pub rolled_back_steps: Vec<String>,
}

fn permission_for(action: &Action) -> Permission {
    match action {
        Action::ExecShell { .. } => Permission::Deploy,
        Action::RestartService { .. } => Permission::HealRestart,
        Action::Redeploy { .. } => Permission::HealRebuild,
        Action::Rollback { .. } => Permission::Rollback,
        Action::WaitSeconds { .. } | Action::AssertFingerprint { .. } => Permission::View,
    }
}

fn precondition_holds(precondition: &Precondition, ctx: &PlaybookContext) -> bool {
    match precondition {
        Precondition::NodeReachable => ctx.reachable,
        Precondition::SeverityAtLeast { severity } => {
            ctx.severity.map(|s| s >= *severity).unwrap_or(false)
        }
        Precondition::TargetOs { os } => ctx.target_os.as_deref() == Some(os.as_str()),
    }
}

pub struct PlaybookEngine {
    executor: Arc<dyn RemoteExecutorPort>,
    build: Arc<dyn BuildPort>,
    bus: Arc<dyn EventBusPort>,
}

impl PlaybookEngine {
    pub fn new(
        executor: Arc<dyn RemoteExecutorPort>,
        build: Arc<dyn BuildPort>,
        bus: Arc<dyn EventBusPort>,
    ) -> Self {
        Self {
            executor,
            build,
            bus,
        }
    }

    pub async fn execute(
        &self,
        playbook: &Playbook,
        policy: &Policy,
        ctx: &PlaybookContext,
    ) -> Result<PlaybookRun> {
        if !playbook.validated {
            bail!("playbook {:?} has not been validated", playbook.id);
        }

        if let Some(unmet) = playbook
            .preconditions
            .iter()
            .find(|p| !precondition_holds(p, ctx))
        {
            let reason = format!("precondition not met: {unmet:?}");
            info!(playbook = %playbook.id, %reason, "playbook skipped");
            self.bus
                .publish(vec![DomainEvent::new(EventPayload::PlaybookSkipped {
                    playbook_id: playbook.id.clone(),
                    reason,
                })])
                .await;
            return Ok(PlaybookRun {
                playbook_id: playbook.id.clone(),
                outcome: PlaybookOutcome::Skipped,
                results: Vec::new(),
                rolled_back_steps: Vec::new(),
            });
        }

        let mut results: Vec<StepResult> = Vec::new();

        for (index, step) in playbook.steps.iter().enumerate() {
            let permission = permission_for(&step.action);
            if policy.authorize(&ctx.subject_id, permission) == Decision::Deny {
                warn!(
                    playbook = %playbook.id,
                    step = %step.id,
                    subject = %ctx.subject_id,
                    ?permission,
                    "step denied by policy, aborting"
                );
                results.push(StepResult {
                    step_id: step.id.clone(),
                    status: StepStatus::Denied,
                    duration_ms: 0,
                    detail: format!("subject {:?} lacks {permission:?}", ctx.subject_id),
                });
                return self
                    .finish_failed(playbook, results, Vec::new())
                    .await;
            }

            let started = Instant::now();
            let deadline = Duration::from_secs(step.timeout_seconds);
            let status = match timeout(deadline, self.run_action(&step.action, ctx)).await {
                Ok(Ok(())) => StepStatus::Ok,
                Ok(Err(err)) => {
                    warn!(playbook = %playbook.id, step = %step.id, error = %err, "step failed");
                    results.push(StepResult {
                        step_id: step.id.clone(),
                        status: StepStatus::Fail,
                        duration_ms: started.elapsed().as_millis() as u64,
                        detail: err.to_string(),
                    });
                    StepStatus::Fail
                }
                Err(_) => {
                    warn!(
                        playbook = %playbook.id,
                        step = %step.id,
                        timeout_seconds = step.timeout_seconds,
                        "step timed out"
                    );
                    results.push(StepResult {
                        step_id: step.id.clone(),
                        status: StepStatus::Timeout,
                        duration_ms: started.elapsed().as_millis() as u64,
                        detail: format!("timed out after {}s", step.timeout_seconds),
                    });
                    StepStatus::Timeout
                }
            };

            if status == StepStatus::Ok {
                results.push(StepResult {
                    step_id: step.id.clone(),
                    status: StepStatus::Ok,
                    duration_ms: started.elapsed().as_millis() as u64,
                    detail: String::new(),
                });
                continue;
            }

            if step.continue_on_failure {
                continue;
            }

            // Rollback phase: completed steps in reverse declaration order.
            let rolled_back = self.roll_back_completed(playbook, &results[..index], ctx).await;
            let run = PlaybookRun {
                playbook_id: playbook.id.clone(),
                outcome: PlaybookOutcome::RolledBack,
                results,
                rolled_back_steps: rolled_back.clone(),
            };
            self.bus
                .publish(vec![DomainEvent::new(EventPayload::PlaybookRolledBack {
                    playbook_id: playbook.id.clone(),
                    results: run.results.clone(),
                    rolled_back_steps: rolled_back,
                })])
                .await;
            return Ok(run);
        }

        let run = PlaybookRun {
            playbook_id: playbook.id.clone(),
            outcome: PlaybookOutcome::Completed,
            results,
            rolled_back_steps: Vec::new(),
        };
        info!(playbook = %playbook.id, steps = run.results.len(), "playbook completed");
        self.bus
            .publish(vec![DomainEvent::new(EventPayload::PlaybookCompleted {
                playbook_id: playbook.id.clone(),
                results: run.results.clone(),
            })])
            .await;
        Ok(run)
    }

    async fn finish_failed(
        &self,
        playbook: &Playbook,
        results: Vec<StepResult>,
        rolled_back_steps: Vec<String>,
    ) -> Result<PlaybookRun> {
        let run = PlaybookRun {
            playbook_id: playbook.id.clone(),
            outcome: PlaybookOutcome::Failed,
            results,
            rolled_back_steps,
        };
        self.bus
            .publish(vec![DomainEvent::new(EventPayload::PlaybookFailed {
                playbook_id: playbook.id.clone(),
                results: run.results.clone(),
            })])
            .await;
        Ok(run)
    }

    /// Walk completed steps in reverse; execute each defined rollback
    /// action best-effort. A rollback failure is logged and the walk
    /// continues.
    async fn roll_back_completed(
        &self,
        playbook: &Playbook,
        completed: &[StepResult],
        ctx: &PlaybookContext,
    ) -> Vec<String> {
        let mut rolled_back = Vec::new();
        for result in completed.iter().rev() {
            if result.status != StepStatus::Ok {
                continue;
            }
            let Some(step) = playbook.steps.iter().find(|s| s.id == result.step_id) else {
                continue;
            };
            let Some(rollback) = &step.rollback else {
                continue;
            };
            info!(playbook = %playbook.id, step = %step.id, "rolling back step");
            let deadline = Duration::from_secs(step.timeout_seconds);
            match timeout(deadline, self.run_action(rollback, ctx)).await {
                Ok(Ok(())) => rolled_back.push(step.id.clone()),
                Ok(Err(err)) => {
                    warn!(playbook = %playbook.id, step = %step.id, error = %err, "rollback action failed")
                }
                Err(_) => {
                    warn!(playbook = %playbook.id, step = %step.id, "rollback action timed out")
                }
            }
        }
        rolled_back
    }

    async fn run_action(&self, action: &Action, ctx: &PlaybookContext) -> Result<(), PortError> {
        let node = std::slice::from_ref(&ctx.node);
        match action {
            Action::ExecShell { command } => self.executor.exec(node, command).await,
            Action::RestartService { service } => {
                self.executor
                    .exec(node, &format!("systemctl restart {service}"))
                    .await
            }
            Action::Redeploy { config_path } => {
                let fingerprint = self.build.build(config_path).await?;
                self.executor.sync_closure(node, &fingerprint).await
            }
            Action::Rollback { generation } => self.executor.rollback(node, *generation).await,
            Action::WaitSeconds { seconds } => {
                tokio::time::sleep(Duration::from_secs(*seconds)).await;
                Ok(())
            }
            Action::AssertFingerprint { expected } => {
                match self.executor.current_fingerprint(&ctx.node).await? {
                    Some(actual) if &actual == expected => Ok(()),
                    Some(actual) => Err(PortError::failed(
                        "assert_fingerprint",
                        format!("expected {expected}, found {actual}"),
                    )),
                    None => Err(PortError::unreachable(&ctx.node)),
                }
            }
        }
    }
}
