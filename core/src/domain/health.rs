// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::fingerprint::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unreachable,
}

/// Point-in-time health report from a node agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeHealth {
    pub node_id: String,
    pub status: HealthStatus,
    pub reported_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_fingerprint: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_fingerprint: Option<Fingerprint>,
}

impl NodeHealth {
    pub fn healthy(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            status: HealthStatus::Healthy,
            reported_at: Utc::now(),
            current_fingerprint: None,
            expected_fingerprint: None,
        }
    }

    pub fn has_drift(&self) -> bool {
        match (&self.current_fingerprint, &self.expected_fingerprint) {
            (Some(current), Some(expected)) => current != expected,
            _ => false,
        }
    }
}
