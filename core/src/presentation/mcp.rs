// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! MCP tool/resource dispatch.
//!
//! Translates JSON tool calls into use-case invocations and resource URIs
//! into read-model snapshots. Transport framing (stdio, HTTP) lives in the
//! CLI; this layer only shapes requests and responses.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::application::deploy_fleet::DeployFleet;
use crate::application::rollback::RollbackDeployment;
use crate::application::NodeOutcome;
use crate::domain::deployment::DeploymentStatus;
use crate::domain::fingerprint::Fingerprint;
use crate::domain::node::Node;
use crate::domain::services::drift_detection::DriftDetectionService;
use crate::domain::session::ConfigPath;
use crate::infrastructure::agent_registry::AgentRegistry;

pub const ERROR_TOOL_NOT_FOUND: &str = "tool_not_found";
pub const ERROR_RESOURCE_NOT_FOUND: &str = "resource_not_found";
pub const ERROR_INTERNAL: &str = "internal_error";

fn error_response(code: &str, message: impl Into<String>) -> Value {
    json!({
        "status": "error",
        "code": code,
        "message": message.into(),
    })
}

fn parse_targets(arguments: &Value) -> Result<Vec<Node>, String> {
    let raw = arguments
        .get("targets")
        .and_then(Value::as_array)
        .ok_or("missing 'targets' array")?;
    raw.iter()
        .map(|t| {
            t.as_str()
                .ok_or_else(|| "targets must be strings".to_string())
                .and_then(|s| Node::parse(s).map_err(|e| e.to_string()))
        })
        .collect()
}

fn outcomes_json(outcomes: &[(Node, NodeOutcome)]) -> Value {
    Value::Object(
        outcomes
            .iter()
            .map(|(node, outcome)| {
                let value = match outcome {
                    NodeOutcome::Ok => json!("ok"),
                    NodeOutcome::Fail(reason) => json!({"failed": reason}),
                };
                (node.to_string(), value)
            })
            .collect(),
    )
}

pub struct McpServer {
    deploy: Arc<DeployFleet>,
    rollback: Arc<RollbackDeployment>,
    drift: Arc<DriftDetectionService>,
    registry: Arc<AgentRegistry>,
    deployments: RwLock<HashMap<String, Value>>,
}

impl McpServer {
    pub fn new(
        deploy: Arc<DeployFleet>,
        rollback: Arc<RollbackDeployment>,
        drift: Arc<DriftDetectionService>,
        registry: Arc<AgentRegistry>,
    ) -> Self {
        Self {
            deploy,
            rollback,
            drift,
            registry,
            deployments: RwLock::new(HashMap::new()),
        }
    }

    pub async fn call_tool(&self, name: &str, arguments: &Value) -> Value {
        match name {
            "execute_deployment" => self.execute_deployment(arguments).await,
            "rollback_deployment" => self.rollback_deployment(arguments).await,
            "check_congruence" => self.check_congruence(arguments).await,
            other => error_response(ERROR_TOOL_NOT_FOUND, format!("unknown tool {other:?}")),
        }
    }

    pub fn read_resource(&self, uri: &str) -> Value {
        if uri == "node://health" {
            let now = Utc::now();
            let agents: Vec<Value> = self
                .registry
                .all()
                .iter()
                .map(|record| {
                    json!({
                        "node_id": record.node_id,
                        "health": self.registry.health_of(&record.node_id, now),
                        "last_heartbeat": record.last_heartbeat,
                        "drift": record.last_drift,
                    })
                })
                .collect();
            return json!({"status": "success", "agents": agents});
        }

        if let Some(session) = uri.strip_prefix("deployment://") {
            return match self.deployments.read().get(session) {
                Some(record) => record.clone(),
                None => error_response(
                    ERROR_RESOURCE_NOT_FOUND,
                    format!("no deployment for session {session:?}"),
                ),
            };
        }

        error_response(ERROR_RESOURCE_NOT_FOUND, format!("unknown resource {uri:?}"))
    }

    async fn execute_deployment(&self, arguments: &Value) -> Value {
        let targets = match parse_targets(arguments) {
            Ok(targets) => targets,
            Err(message) => return error_response(ERROR_INTERNAL, message),
        };
        let config_path = ConfigPath::new(
            arguments
                .get("config_path")
                .and_then(Value::as_str)
                .unwrap_or("default.nix"),
        );
        let command = arguments
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or("true");
        let session_name = arguments
            .get("session_name")
            .and_then(Value::as_str)
            .unwrap_or("chimera-mcp");

        match self
            .deploy
            .execute(&config_path, command, session_name, &targets)
            .await
        {
            Ok(outcome) => {
                let status = if outcome.status == DeploymentStatus::Completed {
                    "success"
                } else {
                    "failed"
                };
                let response = json!({
                    "status": status,
                    "message": format!(
                        "{}/{} nodes deployed",
                        outcome.succeeded_nodes(),
                        outcome.outcomes.len()
                    ),
                    "session_id": outcome.session_id.to_string(),
                    "fingerprint": outcome.fingerprint,
                    "results": outcomes_json(&outcome.outcomes),
                });
                self.deployments
                    .write()
                    .insert(outcome.session_id.to_string(), response.clone());
                response
            }
            Err(err) => error_response(ERROR_INTERNAL, err.to_string()),
        }
    }

    async fn rollback_deployment(&self, arguments: &Value) -> Value {
        let targets = match parse_targets(arguments) {
            Ok(targets) => targets,
            Err(message) => return error_response(ERROR_INTERNAL, message),
        };
        let generation = arguments
            .get("generation")
            .and_then(Value::as_u64)
            .map(|g| g as u32);

        match self.rollback.execute(&targets, generation).await {
            Ok(outcomes) => {
                let failed = outcomes.iter().filter(|(_, o)| !o.is_ok()).count();
                json!({
                    "status": if failed == 0 { "success" } else { "failed" },
                    "message": format!("{}/{} nodes rolled back", outcomes.len() - failed, outcomes.len()),
                    "results": outcomes_json(&outcomes),
                })
            }
            Err(err) => error_response(ERROR_INTERNAL, err.to_string()),
        }
    }

    async fn check_congruence(&self, arguments: &Value) -> Value {
        let targets = match parse_targets(arguments) {
            Ok(targets) => targets,
            Err(message) => return error_response(ERROR_INTERNAL, message),
        };
        let expected = match arguments
            .get("expected")
            .and_then(Value::as_str)
            .ok_or("missing 'expected' fingerprint")
            .and_then(|s| Fingerprint::new(s).map_err(|_| "invalid fingerprint"))
        {
            Ok(expected) => expected,
            Err(message) => return error_response(ERROR_INTERNAL, message),
        };

        let reports = self.drift.survey(&targets, &expected).await;
        let congruent = reports.iter().filter(|r| r.is_congruent).count();
        json!({
            "status": "success",
            "message": format!("{congruent}/{} nodes congruent", reports.len()),
            "reports": reports,
        })
    }
}
