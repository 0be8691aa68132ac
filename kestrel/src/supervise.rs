//! Child process supervision.
//!
//! Kestrel launches the instrumented target itself: the socket is bound
//! first, its path is exported to the child's environment, and the child's
//! stdout/stderr are piped through the agent so the target behaves like it
//! was run directly. Exit and OS signals both feed the pipeline's shutdown
//! channel; signals are additionally relayed to the child so it can die the
//! way the user asked.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use crate::domain::Pid;
use crate::pipeline::Shutdown;

/// Environment variable naming the instrument socket, read by the
/// instrumentation runtime inside the child.
pub const SOCKET_ENV: &str = "KESTREL_SOCKET";

/// Launch the supervised command with piped stdio and the socket path in
/// its environment. Stdout and stderr forwarding tasks start immediately.
pub fn spawn(command: &[String], socket_path: &Path) -> Result<(Child, Pid)> {
    let (program, args) = command.split_first().context("empty command")?;
    let mut child = Command::new(program)
        .args(args)
        .env(SOCKET_ENV, socket_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to launch {program}"))?;

    let id = child.id().context("child exited before it could be observed")?;
    let pid = Pid(i32::try_from(id).context("child pid out of range")?);
    info!("supervise: launched {program} ({pid})");

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, false));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, true));
    }

    Ok((child, pid))
}

/// Pass the child's output through to the agent's own streams, line by
/// line, until the pipe closes.
async fn forward_lines<R: AsyncRead + Unpin>(reader: R, to_stderr: bool) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if to_stderr {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
}

/// Wait for the child and report its exit into the shutdown channel.
///
/// There is an inherent race between child exit and socket EOF; the
/// pipeline treats whichever notification lands first as the trigger and
/// ignores the other.
pub async fn watch(mut child: Child, shutdown: mpsc::Sender<Shutdown>) {
    match child.wait().await {
        Ok(status) => {
            info!("supervise: child exited: {status}");
            let _ = shutdown.send(Shutdown::ChildExited(status)).await;
        }
        Err(e) => error!("supervise: wait failed: {e}"),
    }
}

/// Relay every SIGINT/SIGTERM to the child and notify the pipeline.
///
/// The loop keeps forwarding after the first signal: the pipeline only
/// needs one trigger to start draining, but an impatient second Ctrl-C
/// must still reach a child that ignored the first.
pub async fn relay_signals(child: Pid, shutdown: mpsc::Sender<Shutdown>) {
    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!("supervise: cannot install SIGINT handler: {e}");
            return;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("supervise: cannot install SIGTERM handler: {e}");
            return;
        }
    };

    loop {
        let (name, raw) = tokio::select! {
            _ = interrupt.recv() => ("SIGINT", libc::SIGINT),
            _ = terminate.recv() => ("SIGTERM", libc::SIGTERM),
        };
        info!("supervise: relaying {name} to {child}");

        // SAFETY: kill(2) with a known pid and signal constant touches no
        // memory; a failure comes back as a nonzero return code.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::kill(child.0, raw) };
        if rc != 0 {
            warn!("supervise: could not relay {name} to {child}");
        }

        // Once the pipeline has stopped, the receiver is gone and there is
        // no one left to forward for.
        if shutdown.send(Shutdown::Signal(name)).await.is_err() {
            return;
        }
    }
}
