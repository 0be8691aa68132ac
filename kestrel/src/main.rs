//! # kestrel - Main Entry Point
//!
//! Wires the pieces together: parse arguments, bind the instrument socket,
//! spawn the supervised child, run the pipeline until a termination trigger
//! fires, then report what happened.
//!
//! The socket is bound *before* the child starts so the instrument inside
//! the child can connect as soon as it initializes; failing to bind is
//! fatal, since profiling cannot proceed without the channel.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::net::UnixListener;
use tokio::sync::mpsc;

use kestrel::cli::Args;
use kestrel::config::Config;
use kestrel::domain::ConfigError;
use kestrel::emit::{Emitter, StdoutPublisher};
use kestrel::pipeline::Pipeline;
use kestrel::supervise;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_code_for(&e)
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ConfigError>().is_some() {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let (config, command) = Config::from_args(args)?;

    if !config.quiet {
        eprintln!("kestrel v{}", env!("CARGO_PKG_VERSION"));
        eprintln!("command: {}", command.join(" "));
    }

    let socket_path = config.socket_path(std::process::id());
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("failed to bind {}", socket_path.display()))?;
    let _socket_guard = SocketGuard(socket_path.clone());
    info!("listening on {}", socket_path.display());

    let (child, pid) = supervise::spawn(&command, &socket_path)?;
    let (shutdown_tx, shutdown_rx) = mpsc::channel(4);
    tokio::spawn(supervise::watch(child, shutdown_tx.clone()));
    tokio::spawn(supervise::relay_signals(pid, shutdown_tx));

    let emitter = Emitter::new(StdoutPublisher::new(), config.app_id.clone());
    let summary = Pipeline::new(config.interval, emitter).run(listener, shutdown_rx).await;

    if !config.quiet {
        eprintln!(
            "{}: {} units, {} snapshots published, {} dropped",
            summary.reason, summary.units, summary.snapshots_published, summary.snapshots_dropped
        );
    }

    Ok(())
}

/// Removes the socket file when the agent exits, whether the run
/// succeeded or bailed out right after the bind.
struct SocketGuard(std::path::PathBuf);

impl Drop for SocketGuard {
    fn drop(&mut self) {
        // Best effort; a stale socket file only costs a warning next run.
        let _ = std::fs::remove_file(&self.0);
    }
}
