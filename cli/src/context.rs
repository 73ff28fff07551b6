// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Composition root: wires adapters into ports, ports into use cases,
//! and cross-cutting subscribers onto the event bus.

use std::sync::Arc;

use chimera_core::application::autonomous_loop::AutonomousLoop;
use chimera_core::application::deploy_fleet::DeployFleet;
use chimera_core::application::execute_local::ExecuteLocalDeployment;
use chimera_core::application::rollback::RollbackDeployment;
use chimera_core::domain::events::{EventKind, EventPayload};
use chimera_core::domain::policy::Policy;
use chimera_core::domain::ports::{BuildPort, EventBusPort, RemoteExecutorPort, SessionPort};
use chimera_core::domain::services::drift_detection::DriftDetectionService;
use chimera_core::domain::services::predictive_analytics::PredictiveAnalytics;
use chimera_core::domain::services::root_cause::RootCauseCorrelator;
use chimera_core::domain::slo::{Slo, SloTracker};
use chimera_core::infrastructure::agent_registry::AgentRegistry;
use chimera_core::infrastructure::config::ChimeraConfig;
use chimera_core::infrastructure::event_bus::EventBus;
use chimera_core::presentation::mcp::McpServer;

use crate::adapters::nix::NixAdapter;
use crate::adapters::ssh::SshExecutor;
use crate::adapters::tmux::TmuxAdapter;

pub const DEPLOYMENT_SLO: &str = "deployments";

pub struct AppContext {
    pub config: ChimeraConfig,
    pub subject_id: String,
    pub policy: Policy,
    pub bus: Arc<EventBus>,
    pub build: Arc<dyn BuildPort>,
    pub sessions: Arc<dyn SessionPort>,
    pub executor: Arc<dyn RemoteExecutorPort>,
    pub registry: Arc<AgentRegistry>,
    pub slo: Arc<SloTracker>,
    pub analytics: Arc<PredictiveAnalytics>,
    pub correlator: Arc<RootCauseCorrelator>,
    pub drift: Arc<DriftDetectionService>,
    pub deploy_fleet: Arc<DeployFleet>,
    pub rollback: Arc<RollbackDeployment>,
    pub execute_local: Arc<ExecuteLocalDeployment>,
    pub autonomous: Arc<AutonomousLoop>,
}

impl AppContext {
    pub fn new(config: ChimeraConfig) -> Self {
        let bus = Arc::new(EventBus::new());
        let build: Arc<dyn BuildPort> = Arc::new(NixAdapter::new());
        let sessions: Arc<dyn SessionPort> = Arc::new(TmuxAdapter::new());
        let executor: Arc<dyn RemoteExecutorPort> = Arc::new(SshExecutor::new());

        let registry = Arc::new(AgentRegistry::new(config.agent.heartbeat_interval.max(1)));
        let slo = Arc::new(SloTracker::new());
        slo.register(
            Slo::new(DEPLOYMENT_SLO, 0.99, 86_400).expect("built-in SLO parameters are valid"),
        );
        let analytics = Arc::new(PredictiveAnalytics::new());
        let correlator = Arc::new(RootCauseCorrelator::default());

        let timeouts = config.timeouts;
        let drift = Arc::new(DriftDetectionService::new(Arc::clone(&executor)));
        let deploy_fleet = Arc::new(DeployFleet::new(
            Arc::clone(&build),
            Arc::clone(&executor),
            Arc::clone(&bus) as Arc<dyn EventBusPort>,
            timeouts,
        ));
        let rollback = Arc::new(RollbackDeployment::new(
            Arc::clone(&executor),
            Arc::clone(&bus) as Arc<dyn EventBusPort>,
            timeouts,
        ));
        let execute_local = Arc::new(ExecuteLocalDeployment::new(
            Arc::clone(&build),
            Arc::clone(&sessions),
            Arc::clone(&bus) as Arc<dyn EventBusPort>,
            timeouts,
        ));
        let autonomous = Arc::new(AutonomousLoop::new(
            Arc::clone(&build),
            Arc::clone(&executor),
            Arc::clone(&bus) as Arc<dyn EventBusPort>,
            Arc::clone(&drift),
            Arc::clone(&deploy_fleet),
            Arc::clone(&rollback),
            timeouts,
        ));

        let subject_id =
            std::env::var("CHIMERA_SUBJECT").unwrap_or_else(|_| "local-admin".to_string());
        let policy = Policy::with_builtin_roles().bind(subject_id.clone(), "admin");

        let context = Self {
            config,
            subject_id,
            policy,
            bus,
            build,
            sessions,
            executor,
            registry,
            slo,
            analytics,
            correlator,
            drift,
            deploy_fleet,
            rollback,
            execute_local,
            autonomous,
        };
        context.wire_subscribers();
        context
    }

    pub fn mcp_server(&self) -> McpServer {
        McpServer::new(
            Arc::clone(&self.deploy_fleet),
            Arc::clone(&self.rollback),
            Arc::clone(&self.drift),
            Arc::clone(&self.registry),
        )
    }

    /// Cross-cutting consumers never get direct calls from use cases;
    /// everything flows through the bus.
    fn wire_subscribers(&self) {
        let slo = Arc::clone(&self.slo);
        let correlator = Arc::clone(&self.correlator);
        self.bus.subscribe(
            EventKind::DeploymentCompleted,
            Arc::new(move |event| {
                let slo = Arc::clone(&slo);
                let correlator = Arc::clone(&correlator);
                Box::pin(async move {
                    slo.record(DEPLOYMENT_SLO, true);
                    correlator.observe(&event);
                    Ok(())
                })
            }),
        );

        let slo = Arc::clone(&self.slo);
        self.bus.subscribe(
            EventKind::DeploymentFailed,
            Arc::new(move |_event| {
                let slo = Arc::clone(&slo);
                Box::pin(async move {
                    slo.record(DEPLOYMENT_SLO, false);
                    Ok(())
                })
            }),
        );

        let analytics = Arc::clone(&self.analytics);
        let correlator = Arc::clone(&self.correlator);
        let registry = Arc::clone(&self.registry);
        self.bus.subscribe(
            EventKind::DriftDetected,
            Arc::new(move |event| {
                let analytics = Arc::clone(&analytics);
                let correlator = Arc::clone(&correlator);
                let registry = Arc::clone(&registry);
                Box::pin(async move {
                    if let EventPayload::DriftDetected { report } = &event.payload {
                        analytics.record_drift(&report.node, report.severity, report.detected_at);
                        registry.update_drift(report.clone());
                    }
                    correlator.observe(&event);
                    Ok(())
                })
            }),
        );
    }
}
