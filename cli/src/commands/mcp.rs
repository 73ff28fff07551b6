//! `chimera mcp` — newline-delimited JSON tool dispatch on stdio.
//!
//! Requests: `{"tool": "...", "arguments": {...}}` or
//! `{"resource": "node://health"}`. One response object per line.

use anyhow::Result;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use crate::context::AppContext;
use crate::exit::EXIT_OK;

pub async fn handle(ctx: &AppContext) -> Result<i32> {
    let server = ctx.mcp_server();
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    info!("mcp dispatch on stdio");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Value>(&line) {
            Ok(request) => dispatch(&server, &request).await,
            Err(err) => json!({
                "status": "error",
                "code": "internal_error",
                "message": format!("invalid request: {err}"),
            }),
        };
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    Ok(EXIT_OK)
}

async fn dispatch(
    server: &chimera_core::presentation::mcp::McpServer,
    request: &Value,
) -> Value {
    if let Some(tool) = request.get("tool").and_then(Value::as_str) {
        let default_args = json!({});
        let arguments = request.get("arguments").unwrap_or(&default_args);
        return server.call_tool(tool, arguments).await;
    }
    if let Some(uri) = request.get("resource").and_then(Value::as_str) {
        return server.read_resource(uri);
    }
    json!({
        "status": "error",
        "code": "internal_error",
        "message": "request must name a 'tool' or a 'resource'",
    })
}
