// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-process orchestrator adapter backed by the agent registry. Used
//! when the agent runs embedded in the same process as the control plane.

use std::sync::Arc;

use async_trait::async_trait;

use chimera_core::domain::drift::DriftReport;
use chimera_core::domain::health::NodeHealth;
use chimera_core::domain::ports::{OrchestratorPort, PortResult};
use chimera_core::infrastructure::agent_registry::AgentRegistry;

pub struct LocalOrchestrator {
    registry: Arc<AgentRegistry>,
}

impl LocalOrchestrator {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl OrchestratorPort for LocalOrchestrator {
    async fn report_health(&self, health: &NodeHealth) -> PortResult<()> {
        self.registry.update_health(health.clone());
        Ok(())
    }

    async fn report_drift(&self, report: &DriftReport) -> PortResult<()> {
        self.registry.update_drift(report.clone());
        Ok(())
    }

    async fn fetch_healing_command(&self, node_id: &str) -> PortResult<Option<String>> {
        Ok(self.registry.pop_healing_command(node_id))
    }

    async fn acknowledge_healing(&self, node_id: &str, success: bool) -> PortResult<()> {
        self.registry.acknowledge_healing(node_id, success);
        Ok(())
    }
}
