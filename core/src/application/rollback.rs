// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Rollback use case: switch every target to a previous generation.
//! Partial failure is expected; every target gets an outcome.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::application::{NodeOutcome, UseCaseError};
use crate::domain::events::{DomainEvent, EventPayload};
use crate::domain::node::Node;
use crate::domain::ports::{EventBusPort, PortError, RemoteExecutorPort};
use crate::infrastructure::config::OperationTimeouts;

pub struct RollbackDeployment {
    executor: Arc<dyn RemoteExecutorPort>,
    bus: Arc<dyn EventBusPort>,
    timeouts: OperationTimeouts,
}

impl RollbackDeployment {
    pub fn new(
        executor: Arc<dyn RemoteExecutorPort>,
        bus: Arc<dyn EventBusPort>,
        timeouts: OperationTimeouts,
    ) -> Self {
        Self {
            executor,
            bus,
            timeouts,
        }
    }

    /// Fan out `rollback` to every target concurrently. `generation = None`
    /// means the previous generation. Returns one outcome per target, in
    /// target order.
    pub async fn execute(
        &self,
        targets: &[Node],
        generation: Option<u32>,
    ) -> Result<Vec<(Node, NodeOutcome)>> {
        if targets.is_empty() {
            return Err(UseCaseError::Validation("no target nodes given".to_string()).into());
        }

        info!(targets = targets.len(), ?generation, "rolling back fleet");
        let results = join_all(targets.iter().map(|node| {
            let executor = Arc::clone(&self.executor);
            let exec_seconds = self.timeouts.exec_seconds;
            async move {
                let result = timeout(
                    Duration::from_secs(exec_seconds),
                    executor.rollback(std::slice::from_ref(node), generation),
                )
                .await
                .map_err(|_| PortError::timeout("rollback", exec_seconds))
                .and_then(|r| r);
                (node.clone(), result)
            }
        }))
        .await;

        let mut outcomes = Vec::with_capacity(targets.len());
        let mut events = Vec::new();
        for (node, result) in results {
            match result {
                Ok(()) => {
                    events.push(DomainEvent::new(EventPayload::DeploymentRolledBack {
                        session_id: None,
                        node: Some(node.clone()),
                        generation,
                    }));
                    outcomes.push((node, NodeOutcome::Ok));
                }
                Err(err) => {
                    warn!(%node, error = %err, "rollback failed");
                    outcomes.push((node, NodeOutcome::Fail(err.to_string())));
                }
            }
        }
        self.bus.publish(events).await;

        Ok(outcomes)
    }
}
