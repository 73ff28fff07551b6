pub mod agent;
pub mod attach;
pub mod dash;
pub mod deploy;
pub mod mcp;
pub mod rollback;
pub mod run;
pub mod watch;
pub mod web;

use chimera_core::domain::node::Node;

use crate::exit::{CliError, EXIT_INVALID_ARGS};

/// Parse a comma-separated `user@host[:port]` target list.
pub fn parse_targets(raw: &str) -> Result<Vec<Node>, CliError> {
    let nodes: Result<Vec<Node>, _> = raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(Node::parse)
        .collect();
    match nodes {
        Ok(nodes) if !nodes.is_empty() => Ok(nodes),
        Ok(_) => Err(CliError::new(EXIT_INVALID_ARGS, "no targets given".to_string())),
        Err(err) => Err(CliError::new(
            EXIT_INVALID_ARGS,
            format!("invalid target: {err}"),
        )),
    }
}
