//! `chimera web [--port P] [--host H]` — fleet status over HTTP.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use colored::Colorize;
use serde_json::{json, Value};
use tracing::info;

use chimera_core::domain::services::predictive_analytics::PredictiveAnalytics;
use chimera_core::domain::services::root_cause::RootCauseCorrelator;
use chimera_core::domain::slo::SloTracker;
use chimera_core::infrastructure::agent_registry::AgentRegistry;

use crate::context::AppContext;
use crate::exit::EXIT_OK;

#[derive(Clone)]
struct WebState {
    registry: Arc<AgentRegistry>,
    slo: Arc<SloTracker>,
    analytics: Arc<PredictiveAnalytics>,
    correlator: Arc<RootCauseCorrelator>,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn status(State(state): State<WebState>) -> Json<Value> {
    let now = Utc::now();
    let agents: Vec<Value> = state
        .registry
        .all()
        .iter()
        .map(|record| {
            let root_cause = record
                .last_drift
                .as_ref()
                .map(|report| state.correlator.summarize(report));
            json!({
                "node_id": record.node_id,
                "health": state.registry.health_of(&record.node_id, now),
                "last_heartbeat": record.last_heartbeat,
                "drift": record.last_drift,
                "root_cause": root_cause,
            })
        })
        .collect();

    let nodes: Vec<_> = state
        .registry
        .all()
        .iter()
        .filter_map(|r| chimera_core::domain::node::Node::parse(&r.node_id).ok())
        .collect();
    let risk: Vec<Value> = state
        .analytics
        .assess_fleet(&nodes)
        .iter()
        .map(|a| {
            json!({
                "node": a.node.to_string(),
                "score": a.score,
                "band": a.band,
            })
        })
        .collect();

    Json(json!({
        "agents": agents,
        "slos": state.slo.snapshot(),
        "risk": risk,
    }))
}

pub async fn handle(ctx: &AppContext, host: Option<String>, port: Option<u16>) -> Result<i32> {
    let host = host.unwrap_or_else(|| ctx.config.web.host.clone());
    let port = port.unwrap_or(ctx.config.web.port);

    let state = WebState {
        registry: Arc::clone(&ctx.registry),
        slo: Arc::clone(&ctx.slo),
        analytics: Arc::clone(&ctx.analytics),
        correlator: Arc::clone(&ctx.correlator),
    };
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/status", get(status))
        .with_state(state);

    let bind = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    println!(
        "{} fleet status on http://{bind}/api/status (ctrl-c to stop)",
        "*".cyan().bold()
    );
    info!(%bind, "web server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("serving web dashboard")?;

    Ok(EXIT_OK)
}
