// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Heuristic risk scoring from drift history and repair times.
//!
//! The score blends three normalized signals: how often a node drifts,
//! whether its drift severity is trending up, and how long it takes to
//! repair. No drift history at all means zero risk.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::domain::drift::DriftSeverity;
use crate::domain::node::Node;

const DRIFT_WINDOW_DAYS: i64 = 7;
const MTTR_WINDOW_DAYS: i64 = 30;
const TREND_SAMPLE: usize = 10;
const FREQUENCY_CEILING_PER_DAY: f64 = 5.0;
const MTTR_CEILING_MINUTES: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    fn from_score(score: f64) -> Self {
        if score >= 0.66 {
            RiskBand::High
        } else if score >= 0.33 {
            RiskBand::Medium
        } else {
            RiskBand::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub node: Node,
    pub score: f64,
    pub band: RiskBand,
    pub drift_frequency_per_day: f64,
    pub severity_trend: f64,
    /// Median repair time over the last 30 days; `None` means no sample
    /// exists and the signal saturates.
    pub mttr_minutes: Option<f64>,
    pub assessed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct DriftEvent {
    at: DateTime<Utc>,
    severity: DriftSeverity,
}

#[derive(Debug, Clone)]
struct MttrSample {
    at: DateTime<Utc>,
    minutes: f64,
}

fn norm(x: f64, ceiling: f64) -> f64 {
    (x / ceiling).min(1.0)
}

fn severity_weight(severity: DriftSeverity) -> f64 {
    match severity {
        DriftSeverity::Low => 1.0,
        DriftSeverity::Medium => 2.0,
        DriftSeverity::High => 3.0,
        DriftSeverity::Critical => 4.0,
    }
}

/// Monotone association between event order and severity over the last
/// `TREND_SAMPLE` events, in `[-1, 1]`. Concordant pairs (later event,
/// higher severity) push toward +1; ties contribute nothing.
fn severity_trend(events: &[DriftEvent]) -> f64 {
    let tail: Vec<f64> = events
        .iter()
        .rev()
        .take(TREND_SAMPLE)
        .rev()
        .map(|e| severity_weight(e.severity))
        .collect();
    if tail.len() < 2 {
        return 0.0;
    }

    let mut concordant = 0i64;
    let mut discordant = 0i64;
    let mut pairs = 0i64;
    for i in 0..tail.len() {
        for j in (i + 1)..tail.len() {
            pairs += 1;
            if tail[j] > tail[i] {
                concordant += 1;
            } else if tail[j] < tail[i] {
                discordant += 1;
            }
        }
    }
    (concordant - discordant) as f64 / pairs as f64
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// In-memory drift/repair history with per-node risk assessment.
/// Thread-safe; all mutation goes through the inner lock.
#[derive(Default)]
pub struct PredictiveAnalytics {
    drifts: RwLock<HashMap<Node, Vec<DriftEvent>>>,
    repairs: RwLock<HashMap<Node, Vec<MttrSample>>>,
}

impl PredictiveAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_drift(&self, node: &Node, severity: DriftSeverity, at: DateTime<Utc>) {
        self.drifts
            .write()
            .entry(node.clone())
            .or_default()
            .push(DriftEvent { at, severity });
    }

    pub fn record_repair(&self, node: &Node, minutes: f64, at: DateTime<Utc>) {
        self.repairs
            .write()
            .entry(node.clone())
            .or_default()
            .push(MttrSample { at, minutes });
    }

    pub fn assess(&self, node: &Node) -> RiskAssessment {
        self.assess_at(node, Utc::now())
    }

    pub fn assess_at(&self, node: &Node, now: DateTime<Utc>) -> RiskAssessment {
        let drift_window = now - Duration::days(DRIFT_WINDOW_DAYS);
        let drifts = self.drifts.read();
        let recent: Vec<DriftEvent> = drifts
            .get(node)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.at >= drift_window && e.at <= now)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(drifts);

        if recent.is_empty() {
            return RiskAssessment {
                node: node.clone(),
                score: 0.0,
                band: RiskBand::Low,
                drift_frequency_per_day: 0.0,
                severity_trend: 0.0,
                mttr_minutes: None,
                assessed_at: now,
            };
        }

        let frequency = recent.len() as f64 / DRIFT_WINDOW_DAYS as f64;
        let trend = severity_trend(&recent);

        let mttr_window = now - Duration::days(MTTR_WINDOW_DAYS);
        let mttr = median(
            self.repairs
                .read()
                .get(node)
                .map(|samples| {
                    samples
                        .iter()
                        .filter(|s| s.at >= mttr_window && s.at <= now)
                        .map(|s| s.minutes)
                        .collect()
                })
                .unwrap_or_default(),
        );

        // A node that has never been repaired gets the full MTTR penalty.
        let mttr_norm = mttr.map(|m| norm(m, MTTR_CEILING_MINUTES)).unwrap_or(1.0);

        let score = (0.4 * norm(frequency, FREQUENCY_CEILING_PER_DAY)
            + 0.3 * trend.max(0.0)
            + 0.3 * mttr_norm)
            .clamp(0.0, 1.0);

        RiskAssessment {
            node: node.clone(),
            score,
            band: RiskBand::from_score(score),
            drift_frequency_per_day: frequency,
            severity_trend: trend,
            mttr_minutes: mttr,
            assessed_at: now,
        }
    }

    /// Assess every node, highest risk first.
    pub fn assess_fleet(&self, nodes: &[Node]) -> Vec<RiskAssessment> {
        self.assess_fleet_at(nodes, Utc::now())
    }

    pub fn assess_fleet_at(&self, nodes: &[Node], now: DateTime<Utc>) -> Vec<RiskAssessment> {
        let mut assessments: Vec<RiskAssessment> =
            nodes.iter().map(|n| self.assess_at(n, now)).collect();
        assessments.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        assessments
    }

    /// Count of nodes per risk band.
    pub fn fleet_summary(&self, nodes: &[Node]) -> HashMap<RiskBand, usize> {
        let mut summary = HashMap::new();
        for assessment in self.assess_fleet(nodes) {
            *summary.entry(assessment.band).or_insert(0) += 1;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> Node {
        Node::parse(&format!("root@{name}:22")).unwrap()
    }

    #[test]
    fn test_empty_history_scores_zero() {
        let analytics = PredictiveAnalytics::new();
        let assessment = analytics.assess(&node("n1"));
        assert_eq!(assessment.score, 0.0);
        assert_eq!(assessment.band, RiskBand::Low);
    }

    #[test]
    fn test_score_bounded_for_saturated_inputs() {
        let analytics = PredictiveAnalytics::new();
        let now = Utc::now();
        let n = node("n1");
        // Far more than the frequency ceiling, escalating severity, no
        // repairs ever: every signal saturates.
        for i in 0..50 {
            let severity = match i / 15 {
                0 => DriftSeverity::Low,
                1 => DriftSeverity::Medium,
                2 => DriftSeverity::High,
                _ => DriftSeverity::Critical,
            };
            analytics.record_drift(&n, severity, now - Duration::minutes(50 - i));
        }
        let assessment = analytics.assess_at(&n, now);
        assert!(assessment.score > 0.6);
        assert!(assessment.score <= 1.0);
        assert_eq!(assessment.band, RiskBand::High);
    }

    #[test]
    fn test_fast_repairs_lower_risk() {
        let slow = PredictiveAnalytics::new();
        let fast = PredictiveAnalytics::new();
        let now = Utc::now();
        let n = node("n1");
        for analytics in [&slow, &fast] {
            analytics.record_drift(&n, DriftSeverity::Low, now - Duration::hours(2));
            analytics.record_drift(&n, DriftSeverity::Low, now - Duration::hours(1));
        }
        slow.record_repair(&n, 120.0, now - Duration::hours(1));
        fast.record_repair(&n, 3.0, now - Duration::hours(1));

        let slow_score = slow.assess_at(&n, now).score;
        let fast_score = fast.assess_at(&n, now).score;
        assert!(fast_score < slow_score);
    }

    #[test]
    fn test_trend_detects_escalation() {
        let events: Vec<DriftEvent> = [
            DriftSeverity::Low,
            DriftSeverity::Low,
            DriftSeverity::Medium,
            DriftSeverity::High,
            DriftSeverity::Critical,
        ]
        .iter()
        .enumerate()
        .map(|(i, s)| DriftEvent {
            at: Utc::now() + Duration::minutes(i as i64),
            severity: *s,
        })
        .collect();
        assert!(severity_trend(&events) > 0.5);

        let flat: Vec<DriftEvent> = (0..5)
            .map(|i| DriftEvent {
                at: Utc::now() + Duration::minutes(i),
                severity: DriftSeverity::Medium,
            })
            .collect();
        assert_eq!(severity_trend(&flat), 0.0);
    }

    #[test]
    fn test_old_events_fall_out_of_window() {
        let analytics = PredictiveAnalytics::new();
        let now = Utc::now();
        let n = node("n1");
        analytics.record_drift(&n, DriftSeverity::Critical, now - Duration::days(8));
        let assessment = analytics.assess_at(&n, now);
        assert_eq!(assessment.score, 0.0);
    }

    #[test]
    fn test_fleet_sorted_by_risk() {
        let analytics = PredictiveAnalytics::new();
        let now = Utc::now();
        let quiet = node("quiet");
        let noisy = node("noisy");
        for i in 0..10 {
            analytics.record_drift(&noisy, DriftSeverity::High, now - Duration::hours(i));
        }
        let fleet = analytics.assess_fleet_at(&[quiet.clone(), noisy.clone()], now);
        assert_eq!(fleet[0].node, noisy);
        assert_eq!(fleet[1].node, quiet);
        assert_eq!(fleet[1].score, 0.0);
    }

    #[test]
    fn test_median_of_even_sample() {
        assert_eq!(median(vec![1.0, 3.0]), Some(2.0));
        assert_eq!(median(vec![5.0]), Some(5.0));
        assert_eq!(median(vec![]), None);
    }
}
