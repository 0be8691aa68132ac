//! The call-tree trie and its serialized form.
//!
//! Each node is keyed by the [`Frame`] that reached it, so the path from
//! the root to any node is exactly the call path it represents. Children
//! use a dual representation: a `HashMap` index for O(1) lookup during
//! aggregation, plus an insertion-ordered `Vec` so serialization is
//! deterministic.
//!
//! Counts are exclusive per path. No inclusive subtree rollup happens
//! here; a consumer that wants subtree totals computes them itself.

use std::collections::HashMap;

use kestrel_wire::Frame;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One node of the call tree.
///
/// The root carries no frame; every other node is owned by its parent and
/// identified by the frame used to reach it.
#[derive(Debug, Clone)]
pub struct ProfileNode {
    frame: Option<Frame>,
    /// Completed invocations of exactly this path.
    pub ncalls: u64,
    /// Cumulative wall time of those invocations, in nanoseconds.
    pub time_ns: i64,
    /// Times this exact path was observed by a sampling instrument.
    pub nsamples: u64,
    index: HashMap<Frame, usize>,
    children: Vec<ProfileNode>,
}

impl ProfileNode {
    /// Create an empty root node.
    #[must_use]
    pub fn root() -> Self {
        Self::with_frame(None)
    }

    fn with_frame(frame: Option<Frame>) -> Self {
        Self {
            frame,
            ncalls: 0,
            time_ns: 0,
            nsamples: 0,
            index: HashMap::new(),
            children: Vec::new(),
        }
    }

    /// The frame that reached this node; `None` at the root.
    #[must_use]
    pub fn frame(&self) -> Option<Frame> {
        self.frame
    }

    /// Look up the child for `frame`, creating it on first visit.
    pub fn child_mut(&mut self, frame: Frame) -> &mut ProfileNode {
        let idx = *self.index.entry(frame).or_insert_with(|| {
            self.children.push(ProfileNode::with_frame(Some(frame)));
            self.children.len() - 1
        });
        &mut self.children[idx]
    }

    /// Look up an existing child.
    #[must_use]
    pub fn child(&self, frame: Frame) -> Option<&ProfileNode> {
        self.index.get(&frame).map(|&idx| &self.children[idx])
    }

    /// Children in insertion order.
    pub fn children(&self) -> impl Iterator<Item = &ProfileNode> {
        self.children.iter()
    }

    /// True if nothing has been recorded at or below this node.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ncalls == 0 && self.time_ns == 0 && self.nsamples == 0 && self.children.is_empty()
    }
}

/// A finished snapshot: everything aggregated since the previous snapshot
/// (or process start), immutable once swapped out of the aggregator.
#[derive(Debug, Clone)]
pub struct Profile {
    pub root: ProfileNode,
    /// Capture time, unix milliseconds.
    pub timestamp_ms: i64,
}

// ============================================================================
// Serialization
// ============================================================================
//
// The emitted shape mirrors the backend contract: zero-valued optional
// fields are omitted, children appear under "callees" in insertion order.
// (De)serialization goes through a plain derive-friendly mirror struct and
// rebuilds the lookup index on the way back in.

#[derive(Serialize, Deserialize, Default)]
struct NodeRepr {
    #[serde(rename = "fn", skip_serializing_if = "Option::is_none", default)]
    function_addr: Option<u64>,
    #[serde(rename = "cs", skip_serializing_if = "Option::is_none", default)]
    callsite_addr: Option<u64>,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    ncalls: u64,
    #[serde(skip_serializing_if = "is_zero_i64", default)]
    time_ns: i64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    nsamples: u64,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    callees: Vec<NodeRepr>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_u64(n: &u64) -> bool {
    *n == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_i64(n: &i64) -> bool {
    *n == 0
}

impl From<&ProfileNode> for NodeRepr {
    fn from(node: &ProfileNode) -> Self {
        Self {
            function_addr: node.frame.map(|f| f.function_addr),
            callsite_addr: node.frame.map(|f| f.callsite_addr),
            ncalls: node.ncalls,
            time_ns: node.time_ns,
            nsamples: node.nsamples,
            callees: node.children.iter().map(NodeRepr::from).collect(),
        }
    }
}

impl From<NodeRepr> for ProfileNode {
    fn from(repr: NodeRepr) -> Self {
        let frame = match (repr.function_addr, repr.callsite_addr) {
            (Some(function_addr), Some(callsite_addr)) => {
                Some(Frame::new(function_addr, callsite_addr))
            }
            _ => None,
        };
        let children: Vec<ProfileNode> =
            repr.callees.into_iter().map(ProfileNode::from).collect();
        let index = children
            .iter()
            .enumerate()
            .filter_map(|(idx, child)| child.frame.map(|f| (f, idx)))
            .collect();
        Self {
            frame,
            ncalls: repr.ncalls,
            time_ns: repr.time_ns,
            nsamples: repr.nsamples,
            index,
            children,
        }
    }
}

impl Serialize for ProfileNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        NodeRepr::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ProfileNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        NodeRepr::deserialize(deserializer).map(ProfileNode::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leafy_tree() -> ProfileNode {
        let mut root = ProfileNode::root();
        let a = root.child_mut(Frame::new(42, 311));
        a.ncalls = 2;
        a.time_ns = 200;
        let b = a.child_mut(Frame::new(7, 42));
        b.ncalls = 1;
        b.time_ns = 50;
        root.child_mut(Frame::new(9, 311)).nsamples = 3;
        root
    }

    #[test]
    fn child_lookup_is_lazy_and_unique() {
        let mut root = ProfileNode::root();
        let f = Frame::new(1, 2);
        root.child_mut(f).ncalls = 1;
        root.child_mut(f).ncalls += 1;
        assert_eq!(root.children().count(), 1);
        assert_eq!(root.child(f).map(|n| n.ncalls), Some(2));
    }

    #[test]
    fn children_keep_insertion_order() {
        let mut root = ProfileNode::root();
        for addr in [5u64, 3, 8, 1] {
            root.child_mut(Frame::new(addr, 0));
        }
        let order: Vec<u64> =
            root.children().filter_map(|c| c.frame()).map(|f| f.function_addr).collect();
        assert_eq!(order, vec![5, 3, 8, 1]);
    }

    #[test]
    fn serialization_omits_zero_fields() {
        let mut root = ProfileNode::root();
        root.child_mut(Frame::new(42, 311)).ncalls = 1;

        let json = serde_json::to_value(&root).expect("serializes");
        // Root has no frame and no counts: only callees appear.
        assert_eq!(json.as_object().unwrap().keys().count(), 1);
        let child = &json["callees"][0];
        assert_eq!(child["fn"], 42);
        assert_eq!(child["cs"], 311);
        assert_eq!(child["ncalls"], 1);
        assert!(child.get("time_ns").is_none());
        assert!(child.get("nsamples").is_none());
    }

    #[test]
    fn empty_root_serializes_to_empty_object() {
        let json = serde_json::to_string(&ProfileNode::root()).expect("serializes");
        assert_eq!(json, "{}");
    }

    #[test]
    fn round_trip_preserves_shape_and_counts() {
        let tree = leafy_tree();
        let json = serde_json::to_string(&tree).expect("serializes");
        let back: ProfileNode = serde_json::from_str(&json).expect("deserializes");

        let a = back.child(Frame::new(42, 311)).expect("child a");
        assert_eq!(a.ncalls, 2);
        assert_eq!(a.time_ns, 200);
        let b = a.child(Frame::new(7, 42)).expect("grandchild b");
        assert_eq!(b.ncalls, 1);
        assert_eq!(b.time_ns, 50);
        assert_eq!(back.child(Frame::new(9, 311)).expect("child c").nsamples, 3);
        assert_eq!(back.children().count(), 2);
    }
}
