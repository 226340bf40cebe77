//! castctl binary entry point.
//!
//! Loads configuration, builds the subcommand parser from it, and runs the
//! selected orchestrator on a single-threaded runtime.  The process exits
//! with status 1 when the orchestrator reports a failure.
//!
//! # Logging
//!
//! `RUST_LOG` wins when set.  Otherwise `--debug` selects `debug`, and
//! without it the configured `client.log_level` applies (default `info`).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use castctl::application::lifecycle::CommandOutcome;
use castctl::cli::{config_path_from_args, CommandRegistry};
use castctl::infrastructure::config::load_config;
use castctl::infrastructure::transport::TcpTransport;

/// How long queued fire-and-forget frames get to reach the socket on exit.
const DRAIN_LIMIT: Duration = Duration::from_secs(2);

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // ── Configuration ─────────────────────────────────────────────────────────
    //
    // The parser depends on the configured URL launchers, so `--config` is
    // located before clap runs.
    let args: Vec<_> = std::env::args_os().collect();
    let explicit = config_path_from_args(&args);
    let config = load_config(explicit.as_deref()).context("failed to load configuration")?;

    // ── Parse CLI arguments ───────────────────────────────────────────────────
    let registry = CommandRegistry::with_builtins(&config);
    let matches = registry.command().get_matches_from(args);

    // ── Logging setup ─────────────────────────────────────────────────────────
    let fallback = if matches.get_flag("debug") {
        "debug"
    } else {
        config.client.log_level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .init();

    for name in registry.shadowed() {
        warn!(launcher = %name, "url launcher ignored: name is taken by another command");
    }

    let orchestrator = registry.build(&matches, &config)?;
    let name = orchestrator.name();
    let transport = Arc::new(TcpTransport::new());

    // ── Run ───────────────────────────────────────────────────────────────────
    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C signal: {e}");
            std::future::pending::<()>().await;
        }
    };
    let outcome = tokio::select! {
        outcome = orchestrator.run(transport.clone()) => outcome,
        () = interrupted => {
            info!(command = name, "interrupted");
            CommandOutcome::Cancelled
        }
    };

    if !matches!(outcome, CommandOutcome::Cancelled) {
        transport.drain(DRAIN_LIMIT).await;
    }

    if outcome.is_failure() {
        std::process::exit(1);
    }
    Ok(())
}
