// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("Node user cannot be empty")]
    EmptyUser,
    #[error("Port must be 1-65535, got {0}")]
    InvalidPort(String),
    #[error("Invalid hostname: {0:?}")]
    InvalidHostname(String),
    #[error("Unterminated IPv6 bracket in: {0:?}")]
    UnterminatedBracket(String),
}

/// A remote machine in the fleet, addressed as `user@host:port`.
///
/// Equality and hashing cover `(host, user, port)` only; `display_name` is
/// presentation metadata and never participates in identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub host: String,
    pub user: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.user == other.user && self.port == other.port
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.user.hash(state);
        self.port.hash(state);
    }
}

impl Node {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        port: u16,
    ) -> Result<Self, NodeError> {
        let host = host.into();
        let user = user.into();
        if user.is_empty() {
            return Err(NodeError::EmptyUser);
        }
        if port == 0 {
            return Err(NodeError::InvalidPort("0".to_string()));
        }
        if !is_valid_hostname(&host) {
            return Err(NodeError::InvalidHostname(host));
        }
        Ok(Self {
            host,
            user,
            port,
            display_name: None,
        })
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Parse `user@host[:port]`. Defaults: user `root`, port 22.
    /// IPv6 addresses use bracket notation: `root@[::1]:2222`.
    pub fn parse(connection: &str) -> Result<Self, NodeError> {
        let trimmed = connection.trim();
        let (user, rest) = match trimmed.split_once('@') {
            Some((u, r)) => (u.to_string(), r),
            None => ("root".to_string(), trimmed),
        };

        let (host, port) = if let Some(stripped) = rest.strip_prefix('[') {
            let (addr, remainder) = stripped
                .split_once(']')
                .ok_or_else(|| NodeError::UnterminatedBracket(connection.to_string()))?;
            let port = match remainder.strip_prefix(':') {
                Some(p) => p
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| NodeError::InvalidPort(p.to_string()))?,
                None => 22,
            };
            (addr.to_string(), port)
        } else if let Some(last_colon) = rest.rfind(':') {
            // Non-bracketed: the final colon separates the port. Anything
            // unparsable after it means the colon belongs to the host.
            match rest[last_colon + 1..].parse::<u16>() {
                Ok(p) if p != 0 => (rest[..last_colon].to_string(), p),
                Ok(_) => return Err(NodeError::InvalidPort("0".to_string())),
                Err(_) => (rest.to_string(), 22),
            }
        } else {
            (rest.to_string(), 22)
        };

        Self::new(host, user, port)
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}@[{}]:{}", self.user, self.host, self.port)
        } else {
            write!(f, "{}@{}:{}", self.user, self.host, self.port)
        }
    }
}

/// Validate a host as a DNS name (RFC 1123 labels), IPv4, or IPv6 literal.
fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }

    // IPv4
    let octets: Vec<&str> = host.split('.').collect();
    if octets.len() == 4 && octets.iter().all(|o| !o.is_empty() && o.chars().all(|c| c.is_ascii_digit())) {
        return octets.iter().all(|o| o.parse::<u16>().map(|v| v <= 255).unwrap_or(false));
    }

    // IPv6: hex digits and colons, at least one colon
    if host.contains(':') {
        return host.chars().all(|c| c.is_ascii_hexdigit() || c == ':');
    }

    // DNS name: dot-separated labels of alnum and interior hyphens
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
