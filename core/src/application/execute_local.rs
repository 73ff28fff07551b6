// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Single-host deployment through the session port: build the
//! configuration, create (or reuse) the session, run the wrapped command
//! inside it. The Deployment aggregate drives every state change.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::time::timeout;
use tracing::info;

use crate::application::UseCaseError;
use crate::domain::deployment::Deployment;
use crate::domain::ports::{BuildPort, EventBusPort, PortError, SessionPort};
use crate::domain::session::{ConfigPath, SessionId};
use crate::infrastructure::config::OperationTimeouts;

pub struct ExecuteLocalDeployment {
    build: Arc<dyn BuildPort>,
    session: Arc<dyn SessionPort>,
    bus: Arc<dyn EventBusPort>,
    timeouts: OperationTimeouts,
}

impl ExecuteLocalDeployment {
    pub fn new(
        build: Arc<dyn BuildPort>,
        session: Arc<dyn SessionPort>,
        bus: Arc<dyn EventBusPort>,
        timeouts: OperationTimeouts,
    ) -> Self {
        Self {
            build,
            session,
            bus,
            timeouts,
        }
    }

    pub async fn execute(
        &self,
        config_path: &ConfigPath,
        command: &str,
        session_name: &str,
    ) -> Result<SessionId> {
        let session_id = SessionId::new(session_name)
            .map_err(|e| UseCaseError::Validation(e.to_string()))?;

        let deployment = Deployment::new(session_id.clone(), config_path.clone());
        let deployment = self.publish(deployment.start_build()?).await;

        let built = timeout(
            Duration::from_secs(self.timeouts.build_seconds),
            self.build.build(config_path),
        )
        .await
        .map_err(|_| PortError::timeout("build", self.timeouts.build_seconds))
        .and_then(|r| r);

        let fingerprint = match built {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                self.publish(deployment.fail(format!("build failed: {err}"))?)
                    .await;
                return Err(err.into());
            }
        };

        let deployment = self.publish(deployment.complete_build(fingerprint)?).await;
        let deployment = deployment.start_deploy()?;

        match self.run_in_session(config_path, command, &session_id).await {
            Ok(()) => {
                self.publish(deployment.complete(vec![])?).await;
                info!(session = %session_id, "local deployment completed");
                Ok(session_id)
            }
            Err(err) => {
                self.publish(deployment.fail(err.to_string())?).await;
                Err(err)
            }
        }
    }

    async fn run_in_session(
        &self,
        config_path: &ConfigPath,
        command: &str,
        session_id: &SessionId,
    ) -> Result<()> {
        self.session.create(session_id).await?;
        let shell_command = self.build.shell(config_path, command).await?;
        let sent = timeout(
            Duration::from_secs(self.timeouts.exec_seconds),
            self.session.run(session_id, &shell_command),
        )
        .await
        .map_err(|_| PortError::timeout("session run", self.timeouts.exec_seconds))
        .and_then(|r| r)?;
        if !sent {
            return Err(anyhow!("failed to send command to session {session_id}"));
        }
        Ok(())
    }

    /// Drain the aggregate's events onto the bus, preserving append order.
    async fn publish(&self, deployment: Deployment) -> Deployment {
        let (deployment, events) = deployment.take_events();
        self.bus.publish(events).await;
        deployment
    }
}
