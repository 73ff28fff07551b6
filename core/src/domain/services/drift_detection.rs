// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Drift detection: congruence survey, severity classification, blast
//! radius, and the healing plan handed to the autonomous loop.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::congruence::CongruenceReport;
use crate::domain::drift::{DriftReport, DriftSeverity, HealingPlan, SuggestedAction};
use crate::domain::fingerprint::Fingerprint;
use crate::domain::node::Node;
use crate::domain::ports::RemoteExecutorPort;

/// A fleet node plus the context the severity rules need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeContext {
    pub node: Node,
    /// Tagged production: drift here escalates faster.
    #[serde(default)]
    pub production: bool,
    /// How many consecutive checks have seen this node drifted.
    #[serde(default)]
    pub consecutive_drifts: u32,
}

impl NodeContext {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            production: false,
            consecutive_drifts: 0,
        }
    }

    pub fn production(mut self) -> Self {
        self.production = true;
        self
    }

    pub fn with_consecutive_drifts(mut self, count: u32) -> Self {
        self.consecutive_drifts = count;
        self
    }
}

/// Escalation thresholds. The defaults implement the standard rules;
/// operators can tune them per fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftThresholds {
    pub consecutive_critical: u32,
    pub consecutive_medium: u32,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            consecutive_critical: 3,
            consecutive_medium: 2,
        }
    }
}

impl DriftThresholds {
    /// Pure severity classification from node context:
    /// production + repeated drift is CRITICAL, either alone is HIGH,
    /// a second consecutive drift is MEDIUM, anything else LOW.
    pub fn classify(&self, production: bool, consecutive_drifts: u32) -> DriftSeverity {
        let repeated = consecutive_drifts >= self.consecutive_critical;
        if production && repeated {
            DriftSeverity::Critical
        } else if production || repeated {
            DriftSeverity::High
        } else if consecutive_drifts >= self.consecutive_medium {
            DriftSeverity::Medium
        } else {
            DriftSeverity::Low
        }
    }
}

/// Percentage of the fleet currently drifted, rounded half-up to one
/// decimal. Monotonic in the drifted count for a fixed fleet size.
pub fn blast_radius_pct(drifted: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = 100.0 * drifted as f64 / total as f64;
    (raw * 10.0 + 0.5).floor() / 10.0
}

pub struct DriftDetectionService {
    executor: Arc<dyn RemoteExecutorPort>,
    thresholds: DriftThresholds,
}

impl DriftDetectionService {
    pub fn new(executor: Arc<dyn RemoteExecutorPort>) -> Self {
        Self {
            executor,
            thresholds: DriftThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: DriftThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn thresholds(&self) -> DriftThresholds {
        self.thresholds
    }

    /// Probe every node concurrently and report congruence. A probe failure
    /// or a node with no recorded fingerprint surfaces as unreachable.
    pub async fn survey(
        &self,
        nodes: &[Node],
        expected: &Fingerprint,
    ) -> Vec<CongruenceReport> {
        let probes = nodes.iter().map(|node| {
            let executor = Arc::clone(&self.executor);
            async move {
                match executor.current_fingerprint(node).await {
                    Ok(Some(actual)) if &actual == expected => {
                        CongruenceReport::congruent(node.clone(), expected.clone())
                    }
                    Ok(Some(actual)) => {
                        CongruenceReport::drift(node.clone(), expected.clone(), actual)
                    }
                    Ok(None) => CongruenceReport::unreachable(node.clone(), expected.clone()),
                    Err(err) => {
                        warn!(node = %node, error = %err, "fingerprint probe failed");
                        CongruenceReport::unreachable(node.clone(), expected.clone())
                    }
                }
            }
        });
        join_all(probes).await
    }

    /// Full check: survey, classify, and produce a healing plan.
    ///
    /// Unreachable nodes count toward the blast radius but are not heal
    /// targets, so they carry no drift report.
    pub async fn check(&self, targets: &[NodeContext], expected: &Fingerprint) -> HealingPlan {
        let nodes: Vec<Node> = targets.iter().map(|c| c.node.clone()).collect();
        let reports = self.survey(&nodes, expected).await;
        self.plan(targets, &reports)
    }

    /// Pure planning step over an existing survey.
    pub fn plan(&self, targets: &[NodeContext], reports: &[CongruenceReport]) -> HealingPlan {
        let total = reports.len();
        let non_congruent = reports.iter().filter(|r| !r.is_congruent).count();
        let radius = blast_radius_pct(non_congruent, total);

        let mut drift_reports = Vec::new();
        for report in reports {
            if report.is_congruent || report.is_unreachable() {
                continue;
            }
            let context = targets.iter().find(|c| c.node == report.node);
            let (production, consecutive) = context
                .map(|c| (c.production, c.consecutive_drifts))
                .unwrap_or((false, 0));
            let severity = self.thresholds.classify(production, consecutive);
            debug!(
                node = %report.node,
                ?severity,
                consecutive,
                production,
                "drift classified"
            );
            drift_reports.push(DriftReport {
                node: report.node.clone(),
                expected: report.expected.clone(),
                actual: report.actual.clone(),
                severity,
                blast_radius_pct: radius,
                suggested_action: SuggestedAction::for_severity(severity),
                detected_at: Utc::now(),
            });
        }

        let max_severity = drift_reports.iter().map(|r| r.severity).max();
        let global_action = max_severity
            .map(SuggestedAction::for_severity)
            .unwrap_or(SuggestedAction::RestartService);
        let requires_approval = max_severity
            .map(|s| s >= DriftSeverity::High)
            .unwrap_or(false);

        HealingPlan {
            drift_reports,
            global_action,
            requires_approval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_classification_matrix() {
        let t = DriftThresholds::default();
        assert_eq!(t.classify(true, 3), DriftSeverity::Critical);
        assert_eq!(t.classify(true, 1), DriftSeverity::High);
        assert_eq!(t.classify(false, 3), DriftSeverity::High);
        assert_eq!(t.classify(false, 2), DriftSeverity::Medium);
        assert_eq!(t.classify(false, 1), DriftSeverity::Low);
        assert_eq!(t.classify(false, 0), DriftSeverity::Low);
    }

    #[test]
    fn test_blast_radius_rounding() {
        assert_eq!(blast_radius_pct(1, 3), 33.3);
        assert_eq!(blast_radius_pct(2, 3), 66.7);
        assert_eq!(blast_radius_pct(1, 2), 50.0);
        assert_eq!(blast_radius_pct(0, 5), 0.0);
        assert_eq!(blast_radius_pct(5, 5), 100.0);
        assert_eq!(blast_radius_pct(0, 0), 0.0);
    }

    #[test]
    fn test_blast_radius_monotonic() {
        let total = 7;
        let mut last = -1.0;
        for drifted in 0..=total {
            let radius = blast_radius_pct(drifted, total);
            assert!(radius >= last);
            last = radius;
        }
    }
}
