// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};

use crate::domain::fingerprint::Fingerprint;
use crate::domain::node::Node;

pub const UNREACHABLE_DETAILS: &str = "unreachable";

/// Snapshot of whether a node's actual artifact matches the expected one.
///
/// Invariant: `is_congruent` holds iff `actual` is present and equals
/// `expected`. A missing `actual` means the node could not be contacted and
/// the report carries `details = "unreachable"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CongruenceReport {
    pub node: Node,
    pub expected: Fingerprint,
    pub actual: Option<Fingerprint>,
    pub is_congruent: bool,
    pub details: String,
}

impl CongruenceReport {
    pub fn congruent(node: Node, fingerprint: Fingerprint) -> Self {
        Self {
            node,
            expected: fingerprint.clone(),
            actual: Some(fingerprint),
            is_congruent: true,
            details: "System state matches expected configuration".to_string(),
        }
    }

    pub fn drift(node: Node, expected: Fingerprint, actual: Fingerprint) -> Self {
        let details = format!("Expected {expected}, found {actual}");
        Self {
            node,
            expected,
            actual: Some(actual),
            is_congruent: false,
            details,
        }
    }

    pub fn unreachable(node: Node, expected: Fingerprint) -> Self {
        Self {
            node,
            expected,
            actual: None,
            is_congruent: false,
            details: UNREACHABLE_DETAILS.to_string(),
        }
    }

    pub fn is_unreachable(&self) -> bool {
        self.actual.is_none()
    }
}
