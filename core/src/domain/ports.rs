// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Port contracts.
//!
//! These eight traits are the only polymorphism points in the core: every
//! external capability (build tool, session host, remote transport, cloud
//! inventory, event delivery, orchestrator RPC, incident tracker, alert
//! sink) is consumed as an `Arc<dyn Port>` injected at the composition
//! root. Adapters live outside the core.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::domain::drift::{DriftReport, DriftSeverity};
use crate::domain::events::{DomainEvent, EventKind};
use crate::domain::fingerprint::Fingerprint;
use crate::domain::health::NodeHealth;
use crate::domain::node::Node;
use crate::domain::session::{ConfigPath, SessionId};

/// Failure surfaced by an adapter. Per-node failures are collected by the
/// caller, never allowed to abort sibling fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("{operation} failed: {cause}")]
    Failed { operation: String, cause: String },
    #[error("{operation} timed out after {after_seconds}s")]
    Timeout {
        operation: String,
        after_seconds: u64,
    },
    #[error("node {node} unreachable")]
    Unreachable { node: String },
}

impl PortError {
    pub fn failed(operation: impl Into<String>, cause: impl Into<String>) -> Self {
        PortError::Failed {
            operation: operation.into(),
            cause: cause.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after_seconds: u64) -> Self {
        PortError::Timeout {
            operation: operation.into(),
            after_seconds,
        }
    }

    pub fn unreachable(node: &Node) -> Self {
        PortError::Unreachable {
            node: node.to_string(),
        }
    }
}

pub type PortResult<T> = Result<T, PortError>;

/// Turns a declarative configuration into a content-addressed artifact.
#[async_trait]
pub trait BuildPort: Send + Sync {
    /// Build the configuration and return the artifact fingerprint.
    async fn build(&self, path: &ConfigPath) -> PortResult<Fingerprint>;

    /// Evaluate the configuration to a derivation path without building.
    async fn instantiate(&self, path: &ConfigPath) -> PortResult<String>;

    /// Wrap `command` so it runs inside the configuration's environment.
    async fn shell(&self, path: &ConfigPath, command: &str) -> PortResult<String>;
}

/// Hosts long-lived command sessions on the local machine.
#[async_trait]
pub trait SessionPort: Send + Sync {
    /// Create a session. Returns false when it already existed.
    async fn create(&self, id: &SessionId) -> PortResult<bool>;

    async fn list(&self) -> PortResult<Vec<SessionId>>;

    async fn kill(&self, id: &SessionId) -> PortResult<bool>;

    async fn run(&self, id: &SessionId, command: &str) -> PortResult<bool>;

    /// Shell command a user would run to attach to the session.
    async fn attach_command(&self, id: &SessionId) -> PortResult<String>;
}

/// Copies closures to fleet nodes and runs commands on them.
#[async_trait]
pub trait RemoteExecutorPort: Send + Sync {
    async fn sync_closure(&self, nodes: &[Node], fingerprint: &Fingerprint) -> PortResult<()>;

    async fn exec(&self, nodes: &[Node], command: &str) -> PortResult<()>;

    /// The fingerprint currently active on a node, or `None` when the node
    /// has no record of one. Transport failure is an error, not `None`.
    async fn current_fingerprint(&self, node: &Node) -> PortResult<Option<Fingerprint>>;

    /// Switch nodes to `generation`, or to the previous one when absent.
    async fn rollback(&self, nodes: &[Node], generation: Option<u32>) -> PortResult<()>;
}

/// Cloud inventory: discovery and machine lifecycle.
#[async_trait]
pub trait CloudProviderPort: Send + Sync {
    async fn discover(&self, filters: Option<&HashMap<String, String>>) -> PortResult<Vec<Node>>;

    async fn provision(
        &self,
        name: &str,
        instance_type: &str,
        region: &str,
        options: &HashMap<String, String>,
    ) -> PortResult<Node>;

    async fn decommission(&self, node: &Node) -> PortResult<bool>;

    async fn metadata(&self, node: &Node) -> PortResult<HashMap<String, String>>;
}

/// Async event handler. Errors are logged by the bus and never reach the
/// publisher.
pub type EventHandler =
    Arc<dyn Fn(DomainEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// In-process domain event delivery.
#[async_trait]
pub trait EventBusPort: Send + Sync {
    /// Deliver each event to every handler registered for its kind.
    /// Returns only after all handlers have completed or failed.
    async fn publish(&self, events: Vec<DomainEvent>);

    fn subscribe(&self, kind: EventKind, handler: EventHandler);
}

/// Agent-to-orchestrator RPC.
#[async_trait]
pub trait OrchestratorPort: Send + Sync {
    async fn report_health(&self, health: &NodeHealth) -> PortResult<()>;

    async fn report_drift(&self, report: &DriftReport) -> PortResult<()>;

    async fn fetch_healing_command(&self, node_id: &str) -> PortResult<Option<String>>;

    async fn acknowledge_healing(&self, node_id: &str, success: bool) -> PortResult<()>;
}

/// Incident tracker (ServiceNow, Jira, PagerDuty, ...).
#[async_trait]
pub trait ItsmPort: Send + Sync {
    /// Create an incident ticket; returns the tracker's ticket id.
    async fn create_incident(
        &self,
        title: &str,
        description: &str,
        severity: DriftSeverity,
        node_id: &str,
    ) -> PortResult<String>;

    async fn update_incident(&self, ticket_id: &str, status: &str, comment: &str)
        -> PortResult<()>;

    async fn resolve_incident(&self, ticket_id: &str, resolution: &str) -> PortResult<()>;

    async fn get_incident(&self, ticket_id: &str) -> PortResult<Option<serde_json::Value>>;
}

/// Alert sink (Slack, email, pager, ...).
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn send_alert(
        &self,
        title: &str,
        message: &str,
        severity: DriftSeverity,
        node_id: &str,
    ) -> PortResult<()>;

    async fn send_resolution(&self, title: &str, message: &str, node_id: &str) -> PortResult<()>;
}
