//! Profile construction
//!
//! Turns the instrument's flat event stream into an aggregated call tree:
//! - [`correlate`]: shadow-stack pairing of enter/exit events into calls
//! - [`aggregate`]: folding calls and samples into the call-tree trie
//! - [`tree`]: the trie itself and its serialized form

pub mod aggregate;
pub mod correlate;
pub mod tree;

pub use aggregate::Aggregator;
pub use correlate::Correlator;
pub use tree::{Profile, ProfileNode};

use kestrel_wire::{Frame, SampledFrame};

/// A completed invocation: the full call path at the moment the call
/// returned (root→leaf) and how long it ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub stack: Vec<Frame>,
    pub duration_ns: i64,
}

/// One instantaneous stack snapshot (root→leaf). The leaf counts one
/// sample; frames may additionally carry a pre-aggregated call count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub frames: Vec<SampledFrame>,
}

/// One unit of completed work handed from the correlator to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unit {
    Call(Call),
    Sample(Sample),
}
