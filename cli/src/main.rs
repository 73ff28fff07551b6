// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Chimera CLI
//!
//! The `chimera` binary drives the fleet control plane: local runs,
//! fleet deploys, generation rollbacks, the autonomous watch loop, a
//! terminal dashboard, the web status endpoint, MCP dispatch, and the
//! node agent.
//!
//! Exit codes: 0 success, 1 partial or total failure, 2 invalid
//! arguments, 3 authorization denied.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod adapters;
mod commands;
mod context;
mod exit;

use context::AppContext;

use chimera_core::infrastructure::config::ChimeraConfig;

/// Chimera - autonomous determinism engine for content-addressed fleets
#[derive(Parser)]
#[command(name = "chimera")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to JSON configuration file
    #[arg(long, global = true, env = "CHIMERA_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CHIMERA_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy locally and run a command in a persistent session
    Run {
        /// Declarative configuration path
        #[arg(short = 'c', long = "config-path", value_name = "PATH")]
        config_path: Option<String>,

        /// Session name
        #[arg(short = 's', long, value_name = "SESSION")]
        session: Option<String>,

        /// Command to run
        #[arg(value_name = "CMD", trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    /// Attach the terminal to a session
    Attach {
        #[arg(value_name = "SESSION_ID")]
        session_id: String,
    },

    /// Build once and deploy to a fleet of nodes
    Deploy {
        /// Comma-separated user@host[:port] targets
        #[arg(short = 't', long, value_name = "TARGETS", required = true)]
        targets: String,

        #[arg(short = 'c', long = "config-path", value_name = "PATH")]
        config_path: Option<String>,

        #[arg(short = 's', long, value_name = "SESSION")]
        session: Option<String>,

        #[arg(value_name = "CMD", trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    /// Roll targets back to a previous generation
    Rollback {
        #[arg(short = 't', long, value_name = "TARGETS", required = true)]
        targets: String,

        /// Generation number (previous generation when omitted)
        #[arg(short = 'g', long, value_name = "GEN")]
        generation: Option<u32>,
    },

    /// Autonomous drift detection and healing loop
    Watch {
        #[arg(short = 't', long, value_name = "TARGETS", required = true)]
        targets: String,

        #[arg(short = 'c', long = "config-path", value_name = "PATH")]
        config_path: Option<String>,

        /// Check interval in seconds
        #[arg(short = 'i', long, value_name = "SECS")]
        interval: Option<u64>,

        #[arg(short = 's', long, value_name = "SESSION")]
        session: Option<String>,

        /// Run a single check-and-heal pass, then exit
        #[arg(long)]
        once: bool,
    },

    /// Terminal congruence dashboard
    Dash {
        #[arg(short = 't', long, value_name = "TARGETS", required = true)]
        targets: String,
    },

    /// Serve fleet status over HTTP
    Web {
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,

        #[arg(long, value_name = "HOST")]
        host: Option<String>,
    },

    /// MCP tool dispatch on stdio
    Mcp,

    /// Run the node agent
    Agent {
        /// This node's identity (user@host[:port])
        #[arg(long = "node-id", value_name = "ID", required = true)]
        node_id: String,

        /// Heartbeat interval in seconds
        #[arg(long, value_name = "SECS")]
        heartbeat: Option<u64>,

        /// Drift check interval in seconds
        #[arg(long = "drift-interval", value_name = "SECS")]
        drift_interval: Option<u64>,

        /// Disable automatic healing
        #[arg(long = "no-auto-heal")]
        no_auto_heal: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ChimeraConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            std::process::exit(exit::EXIT_INVALID_ARGS);
        }
    };

    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    if let Err(err) = init_logging(&level) {
        eprintln!("{} {err:#}", "error:".red().bold());
        std::process::exit(exit::EXIT_FAILURE);
    }

    let ctx = AppContext::new(config);
    match dispatch(cli.command, &ctx).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            std::process::exit(exit::exit_code_for(&err));
        }
    }
}

async fn dispatch(command: Commands, ctx: &AppContext) -> Result<i32> {
    match command {
        Commands::Run {
            config_path,
            session,
            command,
        } => commands::run::handle(ctx, config_path, session, &command.join(" ")).await,
        Commands::Attach { session_id } => commands::attach::handle(ctx, &session_id).await,
        Commands::Deploy {
            targets,
            config_path,
            session,
            command,
        } => commands::deploy::handle(ctx, &targets, config_path, session, &command.join(" "))
            .await,
        Commands::Rollback {
            targets,
            generation,
        } => commands::rollback::handle(ctx, &targets, generation).await,
        Commands::Watch {
            targets,
            config_path,
            interval,
            session,
            once,
        } => commands::watch::handle(ctx, &targets, config_path, interval, session, once).await,
        Commands::Dash { targets } => commands::dash::handle(ctx, &targets).await,
        Commands::Web { port, host } => commands::web::handle(ctx, host, port).await,
        Commands::Mcp => commands::mcp::handle(ctx).await,
        Commands::Agent {
            node_id,
            heartbeat,
            drift_interval,
            no_auto_heal,
        } => {
            commands::agent::handle(ctx, &node_id, heartbeat, drift_interval, no_auto_heal).await
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
