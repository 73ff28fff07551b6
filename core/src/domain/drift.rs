// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::fingerprint::Fingerprint;
use crate::domain::node::Node;

/// How bad a single node's drift is, classified from its environment and
/// how often it has drifted in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DriftSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Remediation suggested for a drifted node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuggestedAction {
    RestartService,
    RebuildConfig,
    RollbackGeneration,
    ManualIntervention,
}

impl SuggestedAction {
    /// Action for a given severity: restarts for noise, rebuilds for real
    /// divergence, rollback once production is repeatedly wrong.
    pub fn for_severity(severity: DriftSeverity) -> Self {
        match severity {
            DriftSeverity::Low => SuggestedAction::RestartService,
            DriftSeverity::Medium | DriftSeverity::High => SuggestedAction::RebuildConfig,
            DriftSeverity::Critical => SuggestedAction::RollbackGeneration,
        }
    }
}

/// A single node's divergence from the expected artifact, with the fleet
/// context baked in (blast radius) and a remediation suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub node: Node,
    pub expected: Fingerprint,
    pub actual: Option<Fingerprint>,
    pub severity: DriftSeverity,
    pub blast_radius_pct: f64,
    pub suggested_action: SuggestedAction,
    pub detected_at: DateTime<Utc>,
}

/// What the drift detection pass decided the fleet needs.
///
/// `requires_approval` is set whenever any report reached HIGH or CRITICAL;
/// callers must clear it through the policy engine before acting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingPlan {
    pub drift_reports: Vec<DriftReport>,
    pub global_action: SuggestedAction,
    pub requires_approval: bool,
}

impl HealingPlan {
    pub fn has_drift(&self) -> bool {
        !self.drift_reports.is_empty()
    }

    pub fn drifted_nodes(&self) -> Vec<Node> {
        self.drift_reports.iter().map(|r| r.node.clone()).collect()
    }

    pub fn max_severity(&self) -> Option<DriftSeverity> {
        self.drift_reports.iter().map(|r| r.severity).max()
    }
}
