//! Observed placement reported by data-plane nodes.
//!
//! The scheduler treats the [`Distribution`] as read-only ground truth: an action is
//! finished when the distribution says so, never because an RPC returned successfully.
//! Updates to the distribution are driven by node heartbeats elsewhere in the system and
//! are out of scope here — only the read side the scheduler depends on is modeled.
use crate::NodeId;
use crate::SegmentId;

/// Read-only view of the cluster's observed segment/channel placement and leader views.
pub trait Distribution: Send + Sync {
    /// Whether `segment` is reported present on `node`.
    fn segment_on_node(&self, node: NodeId, segment: SegmentId) -> bool;

    /// Whether `channel` is reported subscribed on `node`.
    fn channel_on_node(&self, node: NodeId, channel: &str) -> bool;

    /// The node currently serving as the serviceable delegator (leader) for `channel`,
    /// if any is known.
    fn channel_delegator(&self, channel: &str) -> Option<NodeId>;

    /// Whether the delegator leader view hosted at `leader` is accepting traffic.
    fn leader_serviceable(&self, leader: NodeId) -> bool;

    /// Whether the delegator leader view at `leader` reflects `segment` present at or
    /// beyond `min_version`.
    fn leader_has_segment(&self, leader: NodeId, segment: SegmentId, min_version: u64) -> bool;
}

#[cfg(any(test, feature = "test-fixture"))]
pub mod fixture {
    use super::Distribution;
    use crate::NodeId;
    use crate::SegmentId;
    use std::collections::HashMap;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// In-memory [`Distribution`] a test can mutate directly to simulate node heartbeats.
    #[derive(Default)]
    pub struct MemoryDistribution {
        inner: Mutex<State>,
    }

    #[derive(Default)]
    struct State {
        segments: HashMap<NodeId, HashSet<SegmentId>>,
        channels: HashMap<NodeId, HashSet<String>>,
        delegators: HashMap<String, NodeId>,
        serviceable: HashSet<NodeId>,
        leader_segments: HashMap<(NodeId, SegmentId), u64>,
    }

    impl MemoryDistribution {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_segment(&self, node: NodeId, segment: SegmentId) {
            self.inner
                .lock()
                .unwrap()
                .segments
                .entry(node)
                .or_default()
                .insert(segment);
        }

        pub fn remove_segment(&self, node: NodeId, segment: SegmentId) {
            if let Some(set) = self.inner.lock().unwrap().segments.get_mut(&node) {
                set.remove(&segment);
            }
        }

        pub fn add_channel(&self, node: NodeId, channel: impl Into<String>) {
            self.inner
                .lock()
                .unwrap()
                .channels
                .entry(node)
                .or_default()
                .insert(channel.into());
        }

        pub fn remove_channel(&self, node: NodeId, channel: &str) {
            if let Some(set) = self.inner.lock().unwrap().channels.get_mut(&node) {
                set.remove(channel);
            }
        }

        pub fn set_delegator(&self, channel: impl Into<String>, node: NodeId) {
            self.inner
                .lock()
                .unwrap()
                .delegators
                .insert(channel.into(), node);
        }

        pub fn clear_delegator(&self, channel: &str) {
            self.inner.lock().unwrap().delegators.remove(channel);
        }

        pub fn set_serviceable(&self, node: NodeId, serviceable: bool) {
            let mut inner = self.inner.lock().unwrap();
            if serviceable {
                inner.serviceable.insert(node);
            } else {
                inner.serviceable.remove(&node);
            }
        }

        pub fn set_leader_segment(&self, leader: NodeId, segment: SegmentId, version: u64) {
            self.inner
                .lock()
                .unwrap()
                .leader_segments
                .insert((leader, segment), version);
        }

        pub fn remove_leader_segment(&self, leader: NodeId, segment: SegmentId) {
            self.inner
                .lock()
                .unwrap()
                .leader_segments
                .remove(&(leader, segment));
        }
    }

    impl Distribution for MemoryDistribution {
        fn segment_on_node(&self, node: NodeId, segment: SegmentId) -> bool {
            self.inner
                .lock()
                .unwrap()
                .segments
                .get(&node)
                .map(|set| set.contains(&segment))
                .unwrap_or(false)
        }

        fn channel_on_node(&self, node: NodeId, channel: &str) -> bool {
            self.inner
                .lock()
                .unwrap()
                .channels
                .get(&node)
                .map(|set| set.contains(channel))
                .unwrap_or(false)
        }

        fn channel_delegator(&self, channel: &str) -> Option<NodeId> {
            self.inner.lock().unwrap().delegators.get(channel).copied()
        }

        fn leader_serviceable(&self, leader: NodeId) -> bool {
            self.inner.lock().unwrap().serviceable.contains(&leader)
        }

        fn leader_has_segment(&self, leader: NodeId, segment: SegmentId, min_version: u64) -> bool {
            self.inner
                .lock()
                .unwrap()
                .leader_segments
                .get(&(leader, segment))
                .map(|version| *version >= min_version)
                .unwrap_or(false)
        }
    }
}
