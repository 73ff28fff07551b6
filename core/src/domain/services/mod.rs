// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod drift_detection;
pub mod playbook_engine;
pub mod predictive_analytics;
pub mod root_cause;
