//! Structured error types for kestrel
//!
//! Using thiserror for automatic Display implementation and error chaining.

use thiserror::Error;

/// A violation of the instrument's event protocol.
///
/// These are fatal to the stream that produced them, never to the agent:
/// correlation stops, the pipeline drains, and whatever was accumulated is
/// still emitted.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("exit event for fn 0x{function_addr:x} with no matching enter")]
    UnmatchedExit { function_addr: u64 },

    #[error("call completed with negative duration ({duration_ns} ns); events reordered or corrupt")]
    TimeReversal { duration_ns: i64 },

    #[error(transparent)]
    Undecodable(#[from] kestrel_wire::DecodeError),
}

/// Failure to hand a serialized snapshot to the backend.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("publisher rejected snapshot: {0}")]
    Rejected(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing command to supervise")]
    MissingCommand,

    #[error("snapshot interval must be at least one second")]
    ZeroInterval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_exit_names_the_function() {
        let err = ProtocolError::UnmatchedExit { function_addr: 0xdead };
        assert!(err.to_string().contains("0xdead"));
    }

    #[test]
    fn decode_errors_convert_transparently() {
        let err: ProtocolError = kestrel_wire::DecodeError::UnknownTag(0x33).into();
        assert!(err.to_string().contains("0x33"));
    }
}
