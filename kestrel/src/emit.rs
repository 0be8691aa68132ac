//! Snapshot serialization and the publisher seam.
//!
//! The emitter turns a finished [`Profile`] into its JSON envelope and
//! hands the bytes to a [`Publisher`]. Profile data is best-effort
//! telemetry, not transactional: a failed publish is logged, counted, and
//! the snapshot is discarded — no retry queue. The drop counter is the
//! observability signal a hardened deployment should watch.
//!
//! The backend wire clients (HTTPS, broker/TLS) live behind the
//! [`Publisher`] trait and are not part of this crate; the shipped
//! implementation writes JSON lines to stdout for local use.

use std::time::Duration;

use log::{debug, error};
use serde::Serialize;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::time::timeout;

use crate::domain::PublishError;
use crate::pipeline::HANDOFF_TIMEOUT;
use crate::profile::{Profile, ProfileNode};

/// External capability that accepts one serialized snapshot for delivery.
#[allow(async_fn_in_trait)]
pub trait Publisher {
    async fn publish(&mut self, payload: &[u8]) -> Result<(), PublishError>;
}

/// Serialized form of one snapshot.
#[derive(Serialize)]
struct Envelope<'a> {
    timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    app_id: Option<&'a str>,
    tree: &'a ProfileNode,
}

/// Serializes finished profiles and forwards them to the publisher.
pub struct Emitter<P> {
    publisher: P,
    app_id: Option<String>,
    budget: Duration,
    emitted: u64,
    dropped: u64,
}

impl<P: Publisher> Emitter<P> {
    pub fn new(publisher: P, app_id: Option<String>) -> Self {
        Self { publisher, app_id, budget: HANDOFF_TIMEOUT, emitted: 0, dropped: 0 }
    }

    /// Override the publish budget (the default is [`HANDOFF_TIMEOUT`]).
    #[must_use]
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Serialize and publish one snapshot. Failures are absorbed here:
    /// the pipeline keeps running and accumulating regardless. The publish
    /// itself is bounded by the handoff budget — a backend that never
    /// answers costs one dropped snapshot, not a wedged driver loop.
    pub async fn emit(&mut self, profile: &Profile) {
        let envelope = Envelope {
            timestamp_ms: profile.timestamp_ms,
            app_id: self.app_id.as_deref(),
            tree: &profile.root,
        };
        let payload = match serde_json::to_vec(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("failed to serialize snapshot: {e}");
                self.dropped += 1;
                return;
            }
        };

        match timeout(self.budget, self.publisher.publish(&payload)).await {
            Ok(Ok(())) => {
                self.emitted += 1;
                debug!("published snapshot ({} B)", payload.len());
            }
            Ok(Err(e)) => {
                self.dropped += 1;
                error!("snapshot dropped ({} so far): {e}", self.dropped);
            }
            Err(_) => {
                self.dropped += 1;
                error!(
                    "publisher stalled for {:?}, snapshot dropped ({} so far)",
                    self.budget, self.dropped
                );
            }
        }
    }

    /// Snapshots successfully handed to the publisher.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Snapshots discarded after a publish failure.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Writes each snapshot as one JSON line to stdout.
///
/// This is the agent's non-network mode, useful for local development and
/// for piping into other tools.
pub struct StdoutPublisher {
    out: Stdout,
}

impl StdoutPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self { out: tokio::io::stdout() }
    }
}

impl Default for StdoutPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for StdoutPublisher {
    async fn publish(&mut self, payload: &[u8]) -> Result<(), PublishError> {
        self.out.write_all(payload).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await?;
        Ok(())
    }
}
