// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SloError {
    #[error("SLO target must be in (0, 1], got {0}")]
    InvalidTarget(f64),
    #[error("SLO window must be positive")]
    EmptyWindow,
}

/// A service level objective over a resetting request window.
///
/// The window is resetting, not sliding: when an observation arrives after
/// `window_seconds` have elapsed, the counters restart from zero. This keeps
/// the accounting reproducible at the cost of edge granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slo {
    pub name: String,
    pub target: f64,
    pub window_seconds: u64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub window_start: DateTime<Utc>,
}

impl Slo {
    pub fn new(
        name: impl Into<String>,
        target: f64,
        window_seconds: u64,
    ) -> Result<Self, SloError> {
        if !(target > 0.0 && target <= 1.0) {
            return Err(SloError::InvalidTarget(target));
        }
        if window_seconds == 0 {
            return Err(SloError::EmptyWindow);
        }
        Ok(Self {
            name: name.into(),
            target,
            window_seconds,
            total_requests: 0,
            failed_requests: 0,
            window_start: Utc::now(),
        })
    }

    pub fn availability(&self) -> f64 {
        if self.total_requests == 0 {
            return 1.0;
        }
        1.0 - self.failed_requests as f64 / self.total_requests as f64
    }

    pub fn error_budget(&self) -> f64 {
        1.0 - self.target
    }

    /// Fraction of the error budget burned so far. Greater than 1.0 means
    /// the objective is violated. A zero budget with any failure is
    /// infinitely consumed.
    pub fn budget_consumed(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        let failure_rate = self.failed_requests as f64 / self.total_requests as f64;
        let budget = self.error_budget();
        if budget <= 0.0 {
            if failure_rate > 0.0 {
                f64::INFINITY
            } else {
                0.0
            }
        } else {
            failure_rate / budget
        }
    }

    pub fn violated(&self) -> bool {
        self.budget_consumed() > 1.0
    }

    fn observe(&mut self, ok: bool, now: DateTime<Utc>) {
        let elapsed = now - self.window_start;
        if elapsed > Duration::seconds(self.window_seconds as i64) {
            self.total_requests = 0;
            self.failed_requests = 0;
            self.window_start = now;
        }
        self.total_requests += 1;
        if !ok {
            self.failed_requests += 1;
        }
    }
}

/// Per-SLO error-budget accounting. Thread-safe; mutation is serialized
/// through the inner lock, queries read a consistent snapshot.
#[derive(Default)]
pub struct SloTracker {
    slos: Mutex<HashMap<String, Slo>>,
}

impl SloTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, slo: Slo) {
        self.slos.lock().insert(slo.name.clone(), slo);
    }

    pub fn record(&self, slo_name: &str, ok: bool) {
        self.record_at(slo_name, ok, Utc::now());
    }

    pub fn record_at(&self, slo_name: &str, ok: bool, now: DateTime<Utc>) {
        if let Some(slo) = self.slos.lock().get_mut(slo_name) {
            slo.observe(ok, now);
        }
    }

    pub fn violated(&self, slo_name: &str) -> bool {
        self.slos
            .lock()
            .get(slo_name)
            .map(Slo::violated)
            .unwrap_or(false)
    }

    pub fn budget_consumed(&self, slo_name: &str) -> f64 {
        self.slos
            .lock()
            .get(slo_name)
            .map(Slo::budget_consumed)
            .unwrap_or(0.0)
    }

    pub fn get(&self, slo_name: &str) -> Option<Slo> {
        self.slos.lock().get(slo_name).cloned()
    }

    pub fn snapshot(&self) -> Vec<Slo> {
        let mut all: Vec<Slo> = self.slos.lock().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}
