// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::drift::DriftSeverity;
use crate::domain::fingerprint::Fingerprint;
use crate::domain::session::ConfigPath;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaybookError {
    #[error("Playbook must contain at least one step")]
    NoSteps,
    #[error("Duplicate step id: {0:?}")]
    DuplicateStepId(String),
    #[error("Step {step:?}: timeout must be positive")]
    NonPositiveTimeout { step: String },
    #[error("Step {step:?}: {reason}")]
    InvalidAction { step: String, reason: String },
    #[error("Checksum mismatch: stored {stored}, computed {computed}")]
    ChecksumMismatch { stored: String, computed: String },
}

/// A remediation action a playbook step can take. The set is deliberately
/// closed; arbitrary workflows are out of scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    ExecShell { command: String },
    RestartService { service: String },
    Redeploy { config_path: ConfigPath },
    Rollback { generation: Option<u32> },
    WaitSeconds { seconds: u64 },
    AssertFingerprint { expected: Fingerprint },
}

impl Action {
    fn validate(&self) -> Result<(), String> {
        match self {
            Action::ExecShell { command } if command.trim().is_empty() => {
                Err("shell command must not be empty".to_string())
            }
            Action::RestartService { service } if service.trim().is_empty() => {
                Err("service name must not be empty".to_string())
            }
            Action::WaitSeconds { seconds: 0 } => {
                Err("wait duration must be positive".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// A predicate checked against the execution context before any step runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "precondition", rename_all = "snake_case")]
pub enum Precondition {
    NodeReachable,
    SeverityAtLeast { severity: DriftSeverity },
    TargetOs { os: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookStep {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub action: Action,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<Action>,
    #[serde(default)]
    pub continue_on_failure: bool,
}

/// Terminal and intermediate states of a single step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    Running,
    Ok,
    Fail,
    Timeout,
    Denied,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StepStatus::Pending | StepStatus::Running)
    }
}

/// Outcome of one step, recorded in declaration order by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(default)]
    pub detail: String,
}

/// An ordered, validated sequence of remediation steps with rollback
/// actions. Construct with [`Playbook::new`], then call
/// [`Playbook::validate`] before handing it to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub id: String,
    pub name: String,
    pub version: String,
    pub steps: Vec<PlaybookStep>,
    #[serde(default)]
    pub preconditions: Vec<Precondition>,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub checksum: String,
}

impl Playbook {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        steps: Vec<PlaybookStep>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            steps,
            preconditions: Vec::new(),
            triggers: Vec::new(),
            validated: false,
            checksum: String::new(),
        }
    }

    pub fn with_preconditions(mut self, preconditions: Vec<Precondition>) -> Self {
        self.preconditions = preconditions;
        self
    }

    pub fn with_triggers(mut self, triggers: Vec<String>) -> Self {
        self.triggers = triggers;
        self
    }

    /// Validate structure and recompute the checksum over canonicalized
    /// content. Returns a new instance with `validated` set.
    ///
    /// A non-empty stored checksum that disagrees with the recomputed one
    /// is rejected: the playbook content changed after it was sealed.
    pub fn validate(mut self) -> Result<Self, PlaybookError> {
        if self.steps.is_empty() {
            return Err(PlaybookError::NoSteps);
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.clone()) {
                return Err(PlaybookError::DuplicateStepId(step.id.clone()));
            }
            if step.timeout_seconds == 0 {
                return Err(PlaybookError::NonPositiveTimeout {
                    step: step.id.clone(),
                });
            }
            step.action
                .validate()
                .map_err(|reason| PlaybookError::InvalidAction {
                    step: step.id.clone(),
                    reason,
                })?;
            if let Some(rollback) = &step.rollback {
                rollback
                    .validate()
                    .map_err(|reason| PlaybookError::InvalidAction {
                        step: step.id.clone(),
                        reason: format!("rollback: {reason}"),
                    })?;
            }
        }

        let computed = self.compute_checksum();
        if !self.checksum.is_empty() && self.checksum != computed {
            return Err(PlaybookError::ChecksumMismatch {
                stored: self.checksum.clone(),
                computed,
            });
        }

        self.checksum = computed;
        self.validated = true;
        Ok(self)
    }

    /// SHA-256 over the canonical form: identity fields plus each step
    /// serialized in declaration order.
    fn compute_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.name.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.version.as_bytes());
        for step in &self.steps {
            hasher.update(b"\x1e");
            // JSON serialization of a step is deterministic for identical
            // content, which is all the checksum needs.
            let canonical = serde_json::to_string(step).unwrap_or_default();
            hasher.update(canonical.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}
