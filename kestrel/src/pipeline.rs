//! Stage wiring, snapshot cadence, and the shutdown protocol.
//!
//! One tokio task per stage — relay, correlator, and the aggregate/emit
//! driver loop that lives in [`Pipeline::run`] — connected by bounded mpsc
//! channels. No shared mutable state crosses a channel boundary except by
//! ownership transfer: the live profile belongs to the driver task alone
//! until it is swapped out, after which it is immutable.
//!
//! ## Lifecycle
//!
//! `Idle → Running → Draining → Stopped`. Draining is triggered by the
//! first of: the unit channel closing (socket EOF or a protocol violation
//! cascading through the correlator), an OS signal, or the supervised
//! child exiting. Each stage closes its output when its input is
//! exhausted, so shutdown cascades without per-stage cancellation tokens.
//! The final snapshot is emitted exactly once, even if it is empty.

use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;

use kestrel_wire::Record;
use log::{debug, error, info};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio::time::{self, timeout, Instant};

use crate::emit::{Emitter, Publisher};
use crate::profile::{Aggregator, Correlator, Unit};
use crate::relay;

/// Budget for handing a completed unit to the next stage. Exceeding it
/// means the consumer has stalled; the producer drops rather than wedging
/// the agent.
pub const HANDOFF_TIMEOUT: Duration = Duration::from_secs(20);

const RECORD_CHANNEL_CAPACITY: usize = 1024;
const UNIT_CHANNEL_CAPACITY: usize = 256;

/// Pipeline lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// External termination triggers delivered into the scheduler's select
/// loop. Whichever arrives first drives the transition to Draining.
#[derive(Debug)]
pub enum Shutdown {
    /// An OS signal reached the agent (name for reporting).
    Signal(&'static str),
    /// The supervised child exited with this status.
    ChildExited(ExitStatus),
}

/// What the pipeline did, for the end-of-run report.
#[derive(Debug)]
pub struct PipelineSummary {
    pub reason: String,
    pub units: u64,
    pub snapshots_published: u64,
    pub snapshots_dropped: u64,
}

/// Owns the stage lifecycle and the live profile.
pub struct Pipeline<P> {
    interval: Duration,
    handoff_budget: Duration,
    aggregator: Aggregator,
    emitter: Emitter<P>,
}

impl<P: Publisher> Pipeline<P> {
    #[must_use]
    pub fn new(interval: Duration, emitter: Emitter<P>) -> Self {
        Self {
            interval,
            handoff_budget: HANDOFF_TIMEOUT,
            aggregator: Aggregator::new(),
            emitter,
        }
    }

    /// Override the stage handoff budget (the default is
    /// [`HANDOFF_TIMEOUT`]).
    #[must_use]
    pub fn with_handoff_budget(mut self, budget: Duration) -> Self {
        self.handoff_budget = budget;
        self
    }

    /// Drive the pipeline until a termination trigger fires, then drain.
    ///
    /// `listener` must already be bound; `shutdown` carries signal and
    /// child-exit notifications from the supervisor.
    pub async fn run(
        mut self,
        listener: UnixListener,
        mut shutdown: mpsc::Receiver<Shutdown>,
    ) -> PipelineSummary {
        let mut state = PipelineState::Idle;
        debug!("pipeline: {state}");

        let (record_tx, record_rx) = mpsc::channel::<Record>(RECORD_CHANNEL_CAPACITY);
        let (unit_tx, mut unit_rx) = mpsc::channel::<Unit>(UNIT_CHANNEL_CAPACITY);

        let relay_task = tokio::spawn(relay::run(listener, record_tx, self.handoff_budget));
        let correlate_task = tokio::spawn(correlate(record_rx, unit_tx, self.handoff_budget));

        state = PipelineState::Running;
        info!("pipeline: {state}, snapshot interval {:?}", self.interval);

        // First snapshot one full interval from now, not immediately.
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);

        let mut units: u64 = 0;
        let reason: String;

        loop {
            tokio::select! {
                maybe_unit = unit_rx.recv() => match maybe_unit {
                    Some(unit) => {
                        self.aggregator.add(&unit);
                        units += 1;
                    }
                    None => {
                        reason = "event stream closed".to_string();
                        break;
                    }
                },
                _ = ticker.tick() => {
                    // Swap the live tree out and start a fresh one. Empty
                    // intervals still publish an empty profile.
                    let snapshot = self.aggregator.take();
                    self.emitter.emit(&snapshot).await;
                }
                trigger = shutdown.recv() => {
                    reason = match trigger {
                        Some(Shutdown::Signal(name)) => format!("signal {name}"),
                        Some(Shutdown::ChildExited(status)) => format!("child exited ({status})"),
                        None => "supervisor gone".to_string(),
                    };
                    break;
                }
            }
        }

        state = PipelineState::Draining;
        info!("pipeline: {state} ({reason})");

        // Fold anything the correlator already handed off, then flush the
        // live profile exactly once — the loop above can only break once.
        while let Ok(unit) = unit_rx.try_recv() {
            self.aggregator.add(&unit);
            units += 1;
        }
        let last = self.aggregator.take();
        self.emitter.emit(&last).await;

        relay_task.abort();
        correlate_task.abort();

        state = PipelineState::Stopped;
        debug!("pipeline: {state}");

        PipelineSummary {
            reason,
            units,
            snapshots_published: self.emitter.emitted(),
            snapshots_dropped: self.emitter.dropped(),
        }
    }
}

/// Correlator stage: replay records against the shadow stack, forward
/// completed units. A protocol violation ends the stage; dropping the
/// unit sender lets downstream flush what was accumulated.
async fn correlate(
    mut records: mpsc::Receiver<Record>,
    units: mpsc::Sender<Unit>,
    budget: Duration,
) {
    let mut corr = Correlator::new();
    while let Some(record) = records.recv().await {
        let unit = match corr.apply(record) {
            Ok(Some(unit)) => unit,
            Ok(None) => continue,
            Err(e) => {
                error!("correlator: protocol violation, closing stream: {e}");
                return;
            }
        };
        match timeout(budget, units.send(unit)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                debug!("correlator: aggregator gone, stopping");
                return;
            }
            Err(_) => {
                error!("correlator: handoff timed out after {budget:?}, dropping unit");
            }
        }
    }
    debug!(
        "correlator: input exhausted ({} calls, {} frames left open)",
        corr.calls_emitted,
        corr.open_frames()
    );
}
