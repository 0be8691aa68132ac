//! Folding calls and samples into the call tree.
//!
//! The aggregator owns exactly one live [`Profile`] tree at a time. It is
//! driven from a single task, so mutation and the swap performed by
//! [`Aggregator::take`] need no locking: no unit can be applied to a tree
//! that was already swapped out, and none can be lost across the swap.

use std::time::{SystemTime, UNIX_EPOCH};

use super::tree::{Profile, ProfileNode};
use super::{Call, Sample, Unit};

/// Streaming call-tree aggregator.
#[derive(Debug)]
pub struct Aggregator {
    live: ProfileNode,
    /// Units folded into the live tree since the last swap.
    units_applied: u64,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self { live: ProfileNode::root(), units_applied: 0 }
    }

    /// Fold one unit into the live tree.
    pub fn add(&mut self, unit: &Unit) {
        match unit {
            Unit::Call(call) => self.add_call(call),
            Unit::Sample(sample) => self.add_sample(sample),
        }
    }

    /// Record a completed invocation: walk the call path root→leaf,
    /// creating nodes on first visit, and charge count and duration to the
    /// leaf. O(depth) with O(1) expected work per level.
    pub fn add_call(&mut self, call: &Call) {
        let mut node = &mut self.live;
        for &frame in &call.stack {
            node = node.child_mut(frame);
        }
        node.ncalls += 1;
        node.time_ns += call.duration_ns;
        self.units_applied += 1;
    }

    /// Record a stack snapshot. The leaf counts one sample of this exact
    /// path. A frame carrying a pre-aggregated `ncalls` weight additionally
    /// charges that weight at its own level — every node along the path,
    /// not only the leaf, because "calls observed through this frame" and
    /// "times this path was sampled" are distinct backend quantities.
    pub fn add_sample(&mut self, sample: &Sample) {
        let mut node = &mut self.live;
        for sampled in &sample.frames {
            node = node.child_mut(sampled.frame);
            node.ncalls += u64::from(sampled.ncalls);
        }
        if !sample.frames.is_empty() {
            node.nsamples += 1;
        }
        self.units_applied += 1;
    }

    /// Swap the live tree for a fresh empty one and return the finished
    /// snapshot, stamped with the capture time. O(1).
    pub fn take(&mut self) -> Profile {
        let root = std::mem::replace(&mut self.live, ProfileNode::root());
        self.units_applied = 0;
        Profile { root, timestamp_ms: unix_millis() }
    }

    /// Units folded into the live tree since the last swap.
    #[must_use]
    pub fn pending_units(&self) -> u64 {
        self.units_applied
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
