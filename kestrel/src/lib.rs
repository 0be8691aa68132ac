//! # kestrel - Process-Supervising Profiling Agent
//!
//! Kestrel launches a target executable compiled with function entry/exit
//! instrumentation, receives its event stream over a local socket,
//! reconstructs a call graph with timing and frequency data, and
//! periodically ships snapshots to a telemetry backend while the child runs.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │            Instrumented Child Process                  │
//! │   (reports enter/exit events or stack snapshots)       │
//! └──────────────────────┬─────────────────────────────────┘
//!                        │ unix socket (kestrel-wire records)
//!                        ▼
//! ┌────────────────────────────────────────────────────────┐
//! │                 Kestrel (This Crate)                   │
//! │                                                        │
//! │  ┌───────┐    ┌────────────┐    ┌────────────┐         │
//! │  │ Relay │───▶│ Correlator │───▶│ Aggregator │         │
//! │  └───────┘    └────────────┘    └─────┬──────┘         │
//! │                  shadow stack         │ tick / drain   │
//! │                                       ▼                │
//! │                                 ┌───────────┐          │
//! │                                 │  Emitter  │──▶ Publisher
//! │                                 └───────────┘          │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`relay`]: accepts the instrument connection and decodes wire records
//! - [`profile`]: shadow-stack correlation and call-tree aggregation
//! - [`pipeline`]: stage wiring, snapshot cadence, shutdown protocol
//! - [`emit`]: snapshot serialization and the [`emit::Publisher`] seam
//! - [`supervise`]: child process spawn, stdio forwarding, exit reporting
//! - [`cli`], [`config`]: argument parsing and environment-backed settings
//! - [`domain`]: core types and structured errors
//!
//! ## Shutdown Protocol
//!
//! The pipeline moves `Idle → Running → Draining → Stopped`. Draining is
//! triggered by the first of: socket end-of-stream, an OS signal, or the
//! supervised child exiting. Whichever fires, exactly one final snapshot is
//! emitted, even if it is empty.

pub mod cli;
pub mod config;
pub mod domain;
pub mod emit;
pub mod pipeline;
pub mod profile;
pub mod relay;
pub mod supervise;
