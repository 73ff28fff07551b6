// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::drift::{DriftReport, SuggestedAction};
use crate::domain::fingerprint::Fingerprint;
use crate::domain::node::Node;
use crate::domain::playbook::StepResult;
use crate::domain::session::{ConfigPath, SessionId};

/// Subscription key for the event bus: one tag per payload variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DeploymentStarted,
    BuildCompleted,
    DeploymentCompleted,
    DeploymentFailed,
    DeploymentRolledBack,
    DriftDetected,
    HealingTriggered,
    HealingSkipped,
    PlaybookCompleted,
    PlaybookFailed,
    PlaybookRolledBack,
    PlaybookSkipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    DeploymentStarted {
        session_id: SessionId,
        config_path: ConfigPath,
    },
    BuildCompleted {
        session_id: SessionId,
        fingerprint: Fingerprint,
    },
    DeploymentCompleted {
        session_id: SessionId,
        nodes: Vec<Node>,
    },
    DeploymentFailed {
        session_id: SessionId,
        reason: String,
    },
    DeploymentRolledBack {
        session_id: Option<SessionId>,
        node: Option<Node>,
        generation: Option<u32>,
    },
    DriftDetected {
        report: DriftReport,
    },
    HealingTriggered {
        action: SuggestedAction,
        nodes: Vec<Node>,
    },
    HealingSkipped {
        subject_id: String,
        reason: String,
    },
    PlaybookCompleted {
        playbook_id: String,
        results: Vec<StepResult>,
    },
    PlaybookFailed {
        playbook_id: String,
        results: Vec<StepResult>,
    },
    PlaybookRolledBack {
        playbook_id: String,
        results: Vec<StepResult>,
        rolled_back_steps: Vec<String>,
    },
    PlaybookSkipped {
        playbook_id: String,
        reason: String,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::DeploymentStarted { .. } => EventKind::DeploymentStarted,
            EventPayload::BuildCompleted { .. } => EventKind::BuildCompleted,
            EventPayload::DeploymentCompleted { .. } => EventKind::DeploymentCompleted,
            EventPayload::DeploymentFailed { .. } => EventKind::DeploymentFailed,
            EventPayload::DeploymentRolledBack { .. } => EventKind::DeploymentRolledBack,
            EventPayload::DriftDetected { .. } => EventKind::DriftDetected,
            EventPayload::HealingTriggered { .. } => EventKind::HealingTriggered,
            EventPayload::HealingSkipped { .. } => EventKind::HealingSkipped,
            EventPayload::PlaybookCompleted { .. } => EventKind::PlaybookCompleted,
            EventPayload::PlaybookFailed { .. } => EventKind::PlaybookFailed,
            EventPayload::PlaybookRolledBack { .. } => EventKind::PlaybookRolledBack,
            EventPayload::PlaybookSkipped { .. } => EventKind::PlaybookSkipped,
        }
    }
}

/// An immutable fact about something that happened in the control plane.
/// Never mutated after construction; consumers clone what they keep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl DomainEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}
