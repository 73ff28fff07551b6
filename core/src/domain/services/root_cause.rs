// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Root-cause correlation for drift events.
//!
//! The correlator watches the event stream (deployment completions and
//! drift detections) and, for a focal drift report, ranks candidate causes
//! by confidence. The heuristics are deliberately simple: proximity to a
//! deployment, fleet-wide spread of the same wrong artifact, and a history
//! of repeat offenses.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::domain::drift::DriftReport;
use crate::domain::events::{DomainEvent, EventPayload};
use crate::domain::fingerprint::Fingerprint;
use crate::domain::node::Node;

const MAX_WINDOW_RECORDS: usize = 1024;
const UNKNOWN_FLOOR_CONFIDENCE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CauseKind {
    RecentDeployment,
    FleetWide,
    RepeatedDrift,
    Unknown,
}

impl CauseKind {
    /// Tie-break rank: lower wins when confidences are equal.
    fn rank(self) -> u8 {
        match self {
            CauseKind::RecentDeployment => 0,
            CauseKind::FleetWide => 1,
            CauseKind::RepeatedDrift => 2,
            CauseKind::Unknown => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateCause {
    pub kind: CauseKind,
    pub evidence: String,
    pub confidence: f64,
}

/// Correlation windows. The kind ordering is fixed; these scales are
/// heuristic and tunable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationWindows {
    pub deployment_window_seconds: u64,
    pub spatial_window_seconds: u64,
    pub repeat_window_hours: u64,
}

impl Default for CorrelationWindows {
    fn default() -> Self {
        Self {
            deployment_window_seconds: 3600,
            spatial_window_seconds: 600,
            repeat_window_hours: 24,
        }
    }
}

#[derive(Debug, Clone)]
struct DeploymentSignal {
    node: Node,
    at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct DriftSignal {
    node: Node,
    actual: Option<Fingerprint>,
    at: DateTime<Utc>,
}

/// Event-window store plus the ranking logic. Subscribe `observe` to the
/// bus; query with `correlate`.
pub struct RootCauseCorrelator {
    windows: CorrelationWindows,
    deployments: RwLock<VecDeque<DeploymentSignal>>,
    drifts: RwLock<VecDeque<DriftSignal>>,
}

impl Default for RootCauseCorrelator {
    fn default() -> Self {
        Self::new(CorrelationWindows::default())
    }
}

impl RootCauseCorrelator {
    pub fn new(windows: CorrelationWindows) -> Self {
        Self {
            windows,
            deployments: RwLock::new(VecDeque::new()),
            drifts: RwLock::new(VecDeque::new()),
        }
    }

    /// Ingest a domain event into the correlation window. Irrelevant
    /// events are ignored.
    pub fn observe(&self, event: &DomainEvent) {
        match &event.payload {
            EventPayload::DeploymentCompleted { nodes, .. } => {
                let mut deployments = self.deployments.write();
                for node in nodes {
                    deployments.push_back(DeploymentSignal {
                        node: node.clone(),
                        at: event.occurred_at,
                    });
                }
                while deployments.len() > MAX_WINDOW_RECORDS {
                    deployments.pop_front();
                }
            }
            EventPayload::DriftDetected { report } => {
                let mut drifts = self.drifts.write();
                drifts.push_back(DriftSignal {
                    node: report.node.clone(),
                    actual: report.actual.clone(),
                    at: report.detected_at,
                });
                while drifts.len() > MAX_WINDOW_RECORDS {
                    drifts.pop_front();
                }
            }
            _ => {}
        }
    }

    /// Rank candidate causes for a focal drift report, highest confidence
    /// first; ties break on the fixed kind order.
    pub fn correlate(&self, focal: &DriftReport) -> Vec<CandidateCause> {
        let mut candidates = Vec::new();

        if let Some(candidate) = self.recent_deployment(focal) {
            candidates.push(candidate);
        }
        if let Some(candidate) = self.fleet_wide(focal) {
            candidates.push(candidate);
        }
        if let Some(candidate) = self.repeated_drift(focal) {
            candidates.push(candidate);
        }

        candidates.push(CandidateCause {
            kind: CauseKind::Unknown,
            evidence: "no stronger signal".to_string(),
            confidence: UNKNOWN_FLOOR_CONFIDENCE,
        });

        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.kind.rank().cmp(&b.kind.rank()))
        });
        candidates
    }

    /// One-line explanation of the top candidate.
    pub fn summarize(&self, focal: &DriftReport) -> String {
        let ranked = self.correlate(focal);
        let top = &ranked[0];
        format!(
            "{} drifted; most likely cause {:?} (confidence {:.0}%): {}",
            focal.node,
            top.kind,
            top.confidence * 100.0,
            top.evidence
        )
    }

    fn recent_deployment(&self, focal: &DriftReport) -> Option<CandidateCause> {
        let window = Duration::seconds(self.windows.deployment_window_seconds as i64);
        let deployments = self.deployments.read();
        let newest = deployments
            .iter()
            .filter(|d| d.node == focal.node)
            .filter(|d| {
                let age = focal.detected_at - d.at;
                age >= Duration::zero() && age <= window
            })
            .max_by_key(|d| d.at)?;

        let age = focal.detected_at - newest.at;
        let fraction = age.num_seconds() as f64 / window.num_seconds() as f64;
        let confidence = (1.0 - fraction).max(0.2);
        Some(CandidateCause {
            kind: CauseKind::RecentDeployment,
            evidence: format!(
                "deployment completed on {} {}s before drift",
                focal.node,
                age.num_seconds()
            ),
            confidence,
        })
    }

    fn fleet_wide(&self, focal: &DriftReport) -> Option<CandidateCause> {
        let actual = focal.actual.as_ref()?;
        let window = Duration::seconds(self.windows.spatial_window_seconds as i64);
        let drifts = self.drifts.read();
        let peers: Vec<&DriftSignal> = drifts
            .iter()
            .filter(|d| d.node != focal.node)
            .filter(|d| d.actual.as_ref() == Some(actual))
            .filter(|d| (focal.detected_at - d.at).abs() <= window)
            .collect();
        if peers.is_empty() {
            return None;
        }

        let confidence = (0.3 + 0.15 * peers.len() as f64).min(0.9);
        Some(CandidateCause {
            kind: CauseKind::FleetWide,
            evidence: format!(
                "{} other node(s) drifted to {} within {}s",
                peers.len(),
                actual,
                self.windows.spatial_window_seconds
            ),
            confidence,
        })
    }

    fn repeated_drift(&self, focal: &DriftReport) -> Option<CandidateCause> {
        let window = Duration::hours(self.windows.repeat_window_hours as i64);
        let drifts = self.drifts.read();
        let prior = drifts
            .iter()
            .filter(|d| d.node == focal.node)
            .filter(|d| d.at < focal.detected_at && focal.detected_at - d.at <= window)
            .count();
        if prior < 2 {
            return None;
        }

        let confidence = (0.25 + 0.1 * prior as f64).min(0.85);
        Some(CandidateCause {
            kind: CauseKind::RepeatedDrift,
            evidence: format!(
                "{prior} prior drift reports on {} in the last {}h",
                focal.node, self.windows.repeat_window_hours
            ),
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::drift::{DriftSeverity, SuggestedAction};
    use crate::domain::session::SessionId;

    fn node(name: &str) -> Node {
        Node::parse(&format!("root@{name}:22")).unwrap()
    }

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::new(s).unwrap()
    }

    fn report(name: &str, actual: &str, at: DateTime<Utc>) -> DriftReport {
        DriftReport {
            node: node(name),
            expected: fp("fp-expected"),
            actual: Some(fp(actual)),
            severity: DriftSeverity::Medium,
            blast_radius_pct: 50.0,
            suggested_action: SuggestedAction::RebuildConfig,
            detected_at: at,
        }
    }

    fn drift_event(name: &str, actual: &str, at: DateTime<Utc>) -> DomainEvent {
        let mut event = DomainEvent::new(EventPayload::DriftDetected {
            report: report(name, actual, at),
        });
        event.occurred_at = at;
        event
    }

    fn deployment_event(names: &[&str], at: DateTime<Utc>) -> DomainEvent {
        let mut event = DomainEvent::new(EventPayload::DeploymentCompleted {
            session_id: SessionId::new("s1").unwrap(),
            nodes: names.iter().map(|n| node(n)).collect(),
        });
        event.occurred_at = at;
        event
    }

    #[test]
    fn test_unknown_floor_always_present() {
        let correlator = RootCauseCorrelator::default();
        let ranked = correlator.correlate(&report("n1", "fp-bad", Utc::now()));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].kind, CauseKind::Unknown);
        assert!(ranked[0].confidence > 0.0);
    }

    #[test]
    fn test_recent_deployment_confidence_decays_with_age() {
        let now = Utc::now();
        let fresh = RootCauseCorrelator::default();
        fresh.observe(&deployment_event(&["n1"], now - Duration::seconds(60)));
        let stale = RootCauseCorrelator::default();
        stale.observe(&deployment_event(&["n1"], now - Duration::seconds(3000)));

        let focal = report("n1", "fp-bad", now);
        let fresh_top = &fresh.correlate(&focal)[0];
        let stale_top = &stale.correlate(&focal)[0];
        assert_eq!(fresh_top.kind, CauseKind::RecentDeployment);
        assert_eq!(stale_top.kind, CauseKind::RecentDeployment);
        assert!(fresh_top.confidence > stale_top.confidence);
    }

    #[test]
    fn test_deployment_outside_window_ignored() {
        let now = Utc::now();
        let correlator = RootCauseCorrelator::default();
        correlator.observe(&deployment_event(&["n1"], now - Duration::seconds(7200)));
        let ranked = correlator.correlate(&report("n1", "fp-bad", now));
        assert!(ranked.iter().all(|c| c.kind != CauseKind::RecentDeployment));
    }

    #[test]
    fn test_fleet_wide_scales_with_peer_count() {
        let now = Utc::now();
        let correlator = RootCauseCorrelator::default();
        correlator.observe(&drift_event("n2", "fp-bad", now - Duration::seconds(30)));
        correlator.observe(&drift_event("n3", "fp-bad", now - Duration::seconds(60)));
        // A peer that drifted to a different artifact is not corroboration.
        correlator.observe(&drift_event("n4", "fp-other", now - Duration::seconds(30)));

        let ranked = correlator.correlate(&report("n1", "fp-bad", now));
        let fleet = ranked
            .iter()
            .find(|c| c.kind == CauseKind::FleetWide)
            .unwrap();
        assert!(fleet.evidence.contains("2 other node(s)"));
    }

    #[test]
    fn test_repeated_drift_needs_two_priors() {
        let now = Utc::now();
        let correlator = RootCauseCorrelator::default();
        correlator.observe(&drift_event("n1", "fp-bad", now - Duration::hours(2)));
        let one = correlator.correlate(&report("n1", "fp-bad", now));
        assert!(one.iter().all(|c| c.kind != CauseKind::RepeatedDrift));

        correlator.observe(&drift_event("n1", "fp-bad", now - Duration::hours(1)));
        let two = correlator.correlate(&report("n1", "fp-bad", now));
        assert!(two.iter().any(|c| c.kind == CauseKind::RepeatedDrift));
    }

    #[test]
    fn test_ranking_descends_and_breaks_ties_by_kind() {
        let now = Utc::now();
        let correlator = RootCauseCorrelator::default();
        correlator.observe(&deployment_event(&["n1"], now - Duration::seconds(10)));
        correlator.observe(&drift_event("n2", "fp-bad", now - Duration::seconds(10)));
        correlator.observe(&drift_event("n1", "fp-bad", now - Duration::hours(3)));
        correlator.observe(&drift_event("n1", "fp-bad", now - Duration::hours(2)));

        let ranked = correlator.correlate(&report("n1", "fp-bad", now));
        let confidences: Vec<f64> = ranked.iter().map(|c| c.confidence).collect();
        assert!(confidences.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(ranked.last().unwrap().kind, CauseKind::Unknown);
    }
}
