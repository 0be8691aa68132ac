//! Domain model for kestrel
//!
//! Core identifier types and structured errors shared across the pipeline
//! stages.

pub mod errors;
pub mod types;

pub use errors::{ConfigError, ProtocolError, PublishError};
pub use types::Pid;
