// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Deployment aggregate root.
//!
//! The aggregate is the consistency boundary for one deployment run. All
//! state changes return a new instance carrying the appended lifecycle
//! event; the invoking use case drains the events and hands them to the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::events::{DomainEvent, EventPayload};
use crate::domain::fingerprint::Fingerprint;
use crate::domain::node::Node;
use crate::domain::session::{ConfigPath, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    Pending,
    Building,
    Built,
    Deploying,
    Completed,
    Failed,
    RolledBack,
}

impl DeploymentStatus {
    /// COMPLETED, FAILED and ROLLED_BACK admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentStatus::Completed | DeploymentStatus::Failed | DeploymentStatus::RolledBack
        )
    }
}

/// Raised when a transition is attempted from the wrong status. This is a
/// caller bug, not an operational failure: it propagates, it is never caught
/// and retried.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid deployment state transition: {from:?} -> {to:?}")]
pub struct InvalidStateTransition {
    pub from: DeploymentStatus,
    pub to: DeploymentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub session_id: SessionId,
    pub config_path: ConfigPath,
    pub status: DeploymentStatus,
    pub fingerprint: Option<Fingerprint>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

impl Deployment {
    pub fn new(session_id: SessionId, config_path: ConfigPath) -> Self {
        Self {
            session_id,
            config_path,
            status: DeploymentStatus::Pending,
            fingerprint: None,
            error_message: None,
            created_at: Utc::now(),
            events: Vec::new(),
        }
    }

    pub fn events(&self) -> &[DomainEvent] {
        &self.events
    }

    /// Drain accumulated events for publishing. Returns the aggregate with
    /// an empty event list alongside everything appended so far.
    pub fn take_events(mut self) -> (Self, Vec<DomainEvent>) {
        let events = std::mem::take(&mut self.events);
        (self, events)
    }

    fn guard(&self, expected: DeploymentStatus, to: DeploymentStatus) -> Result<(), InvalidStateTransition> {
        if self.status != expected {
            return Err(InvalidStateTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    fn with(mut self, status: DeploymentStatus, event: EventPayload) -> Self {
        self.status = status;
        self.events.push(DomainEvent::new(event));
        self
    }

    /// PENDING -> BUILDING, appending `DeploymentStarted`.
    pub fn start_build(self) -> Result<Self, InvalidStateTransition> {
        self.guard(DeploymentStatus::Pending, DeploymentStatus::Building)?;
        let payload = EventPayload::DeploymentStarted {
            session_id: self.session_id.clone(),
            config_path: self.config_path.clone(),
        };
        Ok(self.with(DeploymentStatus::Building, payload))
    }

    /// BUILDING -> BUILT, appending `BuildCompleted`.
    pub fn complete_build(mut self, fingerprint: Fingerprint) -> Result<Self, InvalidStateTransition> {
        self.guard(DeploymentStatus::Building, DeploymentStatus::Built)?;
        self.fingerprint = Some(fingerprint.clone());
        let payload = EventPayload::BuildCompleted {
            session_id: self.session_id.clone(),
            fingerprint,
        };
        Ok(self.with(DeploymentStatus::Built, payload))
    }

    /// BUILT -> DEPLOYING. No event: the fan-out has not produced an
    /// observable outcome yet.
    pub fn start_deploy(mut self) -> Result<Self, InvalidStateTransition> {
        self.guard(DeploymentStatus::Built, DeploymentStatus::Deploying)?;
        self.status = DeploymentStatus::Deploying;
        Ok(self)
    }

    /// DEPLOYING -> COMPLETED, appending `DeploymentCompleted`.
    pub fn complete(self, nodes: Vec<Node>) -> Result<Self, InvalidStateTransition> {
        self.guard(DeploymentStatus::Deploying, DeploymentStatus::Completed)?;
        let payload = EventPayload::DeploymentCompleted {
            session_id: self.session_id.clone(),
            nodes,
        };
        Ok(self.with(DeploymentStatus::Completed, payload))
    }

    /// BUILDING | BUILT | DEPLOYING -> FAILED, appending `DeploymentFailed`.
    pub fn fail(mut self, reason: impl Into<String>) -> Result<Self, InvalidStateTransition> {
        match self.status {
            DeploymentStatus::Building | DeploymentStatus::Built | DeploymentStatus::Deploying => {}
            from => {
                return Err(InvalidStateTransition {
                    from,
                    to: DeploymentStatus::Failed,
                })
            }
        }
        let reason = reason.into();
        self.error_message = Some(reason.clone());
        let payload = EventPayload::DeploymentFailed {
            session_id: self.session_id.clone(),
            reason,
        };
        Ok(self.with(DeploymentStatus::Failed, payload))
    }

    /// FAILED -> ROLLED_BACK, appending `DeploymentRolledBack`.
    pub fn roll_back(self, generation: Option<u32>) -> Result<Self, InvalidStateTransition> {
        self.guard(DeploymentStatus::Failed, DeploymentStatus::RolledBack)?;
        let payload = EventPayload::DeploymentRolledBack {
            session_id: Some(self.session_id.clone()),
            node: None,
            generation,
        };
        Ok(self.with(DeploymentStatus::RolledBack, payload))
    }
}
