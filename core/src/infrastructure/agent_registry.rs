// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::drift::DriftReport;
use crate::domain::health::{HealthStatus, NodeHealth};

pub const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u64 = 5;

/// Tracked state for one node agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub node_id: String,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<NodeHealth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_drift: Option<DriftReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_healing_command: Option<String>,
}

/// Fleet-wide registry of node agents.
///
/// An agent that has not heartbeated within three intervals is reported
/// UNREACHABLE regardless of what it last claimed about itself. Mutation
/// is serialized through the inner lock; queries evaluate against a caller
/// clock so tests stay deterministic.
pub struct AgentRegistry {
    heartbeat_interval: Duration,
    agents: RwLock<HashMap<String, AgentRecord>>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL_SECONDS)
    }
}

impl AgentRegistry {
    pub fn new(heartbeat_interval_seconds: u64) -> Self {
        Self {
            heartbeat_interval: Duration::seconds(heartbeat_interval_seconds as i64),
            agents: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, node_id: &str) {
        let mut agents = self.agents.write();
        agents.entry(node_id.to_string()).or_insert_with(|| {
            info!(node_id, "agent registered");
            AgentRecord {
                node_id: node_id.to_string(),
                last_heartbeat: Utc::now(),
                health: None,
                last_drift: None,
                pending_healing_command: None,
            }
        });
    }

    pub fn update_health(&self, health: NodeHealth) {
        let mut agents = self.agents.write();
        let record = agents
            .entry(health.node_id.clone())
            .or_insert_with(|| AgentRecord {
                node_id: health.node_id.clone(),
                last_heartbeat: health.reported_at,
                health: None,
                last_drift: None,
                pending_healing_command: None,
            });
        record.last_heartbeat = health.reported_at;
        record.health = Some(health);
    }

    pub fn update_drift(&self, report: DriftReport) {
        let node_id = report.node.to_string();
        let mut agents = self.agents.write();
        let record = agents.entry(node_id.clone()).or_insert_with(|| AgentRecord {
            node_id,
            last_heartbeat: report.detected_at,
            health: None,
            last_drift: None,
            pending_healing_command: None,
        });
        record.last_heartbeat = report.detected_at;
        record.last_drift = Some(report);
    }

    /// Queue a healing command for an agent to pick up on its next poll.
    pub fn set_healing_command(&self, node_id: &str, command: impl Into<String>) {
        self.register(node_id);
        if let Some(record) = self.agents.write().get_mut(node_id) {
            record.pending_healing_command = Some(command.into());
        }
    }

    /// Retrieve and clear the pending healing command, if any.
    pub fn pop_healing_command(&self, node_id: &str) -> Option<String> {
        self.agents
            .write()
            .get_mut(node_id)
            .and_then(|record| record.pending_healing_command.take())
    }

    pub fn acknowledge_healing(&self, node_id: &str, success: bool) {
        let mut agents = self.agents.write();
        if let Some(record) = agents.get_mut(node_id) {
            record.last_heartbeat = Utc::now();
            if success {
                record.last_drift = None;
                info!(node_id, "agent healed");
            } else {
                warn!(node_id, "agent healing failed");
            }
        }
    }

    /// Effective health at `now`: staleness overrides everything, then an
    /// active drift report degrades, then the agent's own claim stands.
    pub fn health_of(&self, node_id: &str, now: DateTime<Utc>) -> Option<HealthStatus> {
        self.agents
            .read()
            .get(node_id)
            .map(|record| self.effective_health(record, now))
    }

    fn effective_health(&self, record: &AgentRecord, now: DateTime<Utc>) -> HealthStatus {
        if now - record.last_heartbeat > self.heartbeat_interval * 3 {
            return HealthStatus::Unreachable;
        }
        if record.last_drift.is_some() {
            return HealthStatus::Degraded;
        }
        record
            .health
            .as_ref()
            .map(|h| h.status)
            .unwrap_or(HealthStatus::Healthy)
    }

    pub fn get(&self, node_id: &str) -> Option<AgentRecord> {
        self.agents.read().get(node_id).cloned()
    }

    pub fn all(&self) -> Vec<AgentRecord> {
        let mut records: Vec<AgentRecord> = self.agents.read().values().cloned().collect();
        records.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        records
    }

    pub fn healthy(&self, now: DateTime<Utc>) -> Vec<AgentRecord> {
        self.with_status(HealthStatus::Healthy, now)
    }

    pub fn drifted(&self, now: DateTime<Utc>) -> Vec<AgentRecord> {
        self.with_status(HealthStatus::Degraded, now)
    }

    pub fn unreachable(&self, now: DateTime<Utc>) -> Vec<AgentRecord> {
        self.with_status(HealthStatus::Unreachable, now)
    }

    fn with_status(&self, status: HealthStatus, now: DateTime<Utc>) -> Vec<AgentRecord> {
        let agents = self.agents.read();
        let mut records: Vec<AgentRecord> = agents
            .values()
            .filter(|r| self.effective_health(r, now) == status)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        records
    }

    pub fn remove(&self, node_id: &str) {
        self.agents.write().remove(node_id);
    }

    pub fn total_count(&self) -> usize {
        self.agents.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::drift::{DriftSeverity, SuggestedAction};
    use crate::domain::fingerprint::Fingerprint;
    use crate::domain::node::Node;

    fn drift_report(node: &str) -> DriftReport {
        DriftReport {
            node: Node::parse(node).unwrap(),
            expected: Fingerprint::new("fp-A").unwrap(),
            actual: Some(Fingerprint::new("fp-B").unwrap()),
            severity: DriftSeverity::Medium,
            blast_radius_pct: 100.0,
            suggested_action: SuggestedAction::RebuildConfig,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_stale_agents_become_unreachable() {
        let registry = AgentRegistry::new(5);
        let mut health = NodeHealth::healthy("n1");
        health.reported_at = Utc::now();
        registry.update_health(health);

        let now = Utc::now();
        assert_eq!(registry.health_of("n1", now), Some(HealthStatus::Healthy));

        // Three intervals and a bit: the agent is gone.
        let later = now + Duration::seconds(16);
        assert_eq!(
            registry.health_of("n1", later),
            Some(HealthStatus::Unreachable)
        );
        assert_eq!(registry.unreachable(later).len(), 1);
    }

    #[test]
    fn test_drift_degrades_until_acknowledged() {
        let registry = AgentRegistry::new(5);
        registry.update_drift(drift_report("root@n1:22"));
        let now = Utc::now();
        let node_id = "root@n1:22";
        assert_eq!(
            registry.health_of(node_id, now),
            Some(HealthStatus::Degraded)
        );

        registry.acknowledge_healing(node_id, true);
        assert_eq!(registry.health_of(node_id, now), Some(HealthStatus::Healthy));
    }

    #[test]
    fn test_healing_command_queue_pops_once() {
        let registry = AgentRegistry::default();
        registry.set_healing_command("n1", "systemctl restart app");
        assert_eq!(
            registry.pop_healing_command("n1").as_deref(),
            Some("systemctl restart app")
        );
        assert_eq!(registry.pop_healing_command("n1"), None);
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = AgentRegistry::default();
        registry.register("n1");
        registry.set_healing_command("n1", "cmd");
        registry.register("n1");
        // Re-registering must not clobber pending state.
        assert!(registry.pop_healing_command("n1").is_some());
        assert_eq!(registry.total_count(), 1);
    }
}
