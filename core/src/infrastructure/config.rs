// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration loading.
//!
//! Precedence: environment (`CHIMERA_SECTION_KEY`) > JSON file > built-in
//! defaults. Unknown file keys are ignored so configs survive version skew.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NixSection {
    pub config_path: String,
}

impl Default for NixSection {
    fn default() -> Self {
        Self {
            config_path: "default.nix".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSection {
    pub targets: Vec<String>,
    pub session_name: String,
    /// Targets treated as production for severity escalation.
    pub production_targets: Vec<String>,
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            session_name: "chimera-deploy".to_string(),
            production_targets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    pub interval_seconds: u64,
    pub session_name: String,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
            session_name: "chimera-watch".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub node_id: String,
    pub heartbeat_interval: u64,
    pub drift_check_interval: u64,
    pub auto_heal: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            heartbeat_interval: 5,
            drift_check_interval: 30,
            auto_heal: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub host: String,
    pub port: u16,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpSection {
    pub host: String,
    pub port: u16,
}

impl Default for McpSection {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8765,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    pub endpoint: String,
    pub insecure: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ItsmSection {
    pub provider: String,
    pub url: String,
    pub username: String,
    pub api_key: String,
    pub project_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsSection {
    pub slack_webhook_url: String,
    pub pagerduty_api_key: String,
    pub email_smtp_host: String,
    pub email_smtp_port: u16,
    pub email_from: String,
    pub email_to: String,
}

impl Default for NotificationsSection {
    fn default() -> Self {
        Self {
            slack_webhook_url: String::new(),
            pagerduty_api_key: String::new(),
            email_smtp_host: String::new(),
            email_smtp_port: 587,
            email_from: String::new(),
            email_to: String::new(),
        }
    }
}

/// Default timeouts for port calls issued by use cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationTimeouts {
    pub build_seconds: u64,
    pub exec_seconds: u64,
    pub sync_seconds: u64,
    pub heartbeat_seconds: u64,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            build_seconds: 300,
            exec_seconds: 120,
            sync_seconds: 600,
            heartbeat_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChimeraConfig {
    pub nix: NixSection,
    pub fleet: FleetSection,
    pub watch: WatchSection,
    pub agent: AgentSection,
    pub web: WebSection,
    pub mcp: McpSection,
    pub telemetry: TelemetrySection,
    pub itsm: ItsmSection,
    pub notifications: NotificationsSection,
    pub timeouts: OperationTimeouts,
    pub log_level: String,
}

impl Default for ChimeraConfig {
    fn default() -> Self {
        Self {
            nix: NixSection::default(),
            fleet: FleetSection::default(),
            watch: WatchSection::default(),
            agent: AgentSection::default(),
            web: WebSection::default(),
            mcp: McpSection::default(),
            telemetry: TelemetrySection::default(),
            itsm: ItsmSection::default(),
            notifications: NotificationsSection::default(),
            timeouts: OperationTimeouts::default(),
            log_level: "warn".to_string(),
        }
    }
}

impl ChimeraConfig {
    /// Load from an optional JSON file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut tree = serde_json::to_value(ChimeraConfig::default())
            .context("serializing default config")?;

        if let Some(path) = path {
            match std::fs::read_to_string(path) {
                Ok(raw) => {
                    let file_tree: Value = serde_json::from_str(&raw)
                        .with_context(|| format!("invalid config file {}", path.display()))?;
                    merge(&mut tree, &file_tree);
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "config file not found, using defaults");
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("reading config file {}", path.display()))
                }
            }
        }

        apply_env_overrides(&mut tree, std::env::vars());
        serde_json::from_value(tree).context("deserializing merged config")
    }
}

/// Deep-merge `overlay` into `base`. Objects merge key-wise; anything else
/// replaces.
fn merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Apply `CHIMERA_SECTION_KEY=value` overrides. The raw string is coerced
/// to match the shape of the value it replaces (bool, number, or a
/// comma-separated array).
fn apply_env_overrides(tree: &mut Value, vars: impl Iterator<Item = (String, String)>) {
    for (key, raw) in vars {
        let Some(rest) = key.strip_prefix("CHIMERA_") else {
            continue;
        };
        let rest = rest.to_lowercase();

        let target = match rest.split_once('_') {
            Some((section, field))
                if tree.get(section).map(Value::is_object).unwrap_or(false) =>
            {
                tree.get_mut(section).and_then(|s| {
                    let coerced = coerce(&raw, s.get(field));
                    s.as_object_mut()
                        .map(|map| map.insert(field.to_string(), coerced))
                })
            }
            _ => {
                let coerced = coerce(&raw, tree.get(&rest));
                tree.as_object_mut()
                    .map(|map| map.insert(rest.clone(), coerced))
            }
        };
        let _ = target;
    }
}

fn coerce(raw: &str, existing: Option<&Value>) -> Value {
    match existing {
        Some(Value::Bool(_)) => raw
            .parse::<bool>()
            .map(Value::Bool)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some(Value::Number(_)) => raw
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| raw.parse::<f64>().map(Value::from))
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some(Value::Array(_)) => Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        ),
        _ => Value::String(raw.to_string()),
    }
}
