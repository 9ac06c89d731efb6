//! Desired future placement (next target) and promoted stable placement (current target).
use crate::CollectionId;
use crate::SegmentId;

/// Errors surfaced while refreshing a collection's next target.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("failed to refresh next target for collection {collection}: {reason}")]
    RefreshFailed {
        collection: CollectionId,
        reason: String,
    },
}

/// Read access to the desired placement produced by the target manager, plus the one
/// write operation the scheduler is allowed to trigger: a next-target refresh request
/// after a collaborator signals a subject no longer exists (see §7, RPC errors).
#[async_trait::async_trait]
pub trait Target: Send + Sync {
    /// Whether `segment` is part of `collection`'s next target.
    fn next_target_has_segment(&self, collection: CollectionId, segment: SegmentId) -> bool;

    /// Whether `channel` is part of `collection`'s next target.
    fn next_target_has_channel(&self, collection: CollectionId, channel: &str) -> bool;

    /// Request the target manager recompute the next target for `collection`.
    async fn update_next_target(&self, collection: CollectionId) -> Result<(), TargetError>;

    /// Request the target manager promote `collection`'s current next target to be its
    /// current (serving) target. A segment or channel can remain in the current target
    /// after being dropped from a later next-target recompute, which is how a subject
    /// already being served becomes stale without ever leaving the cluster.
    async fn update_current_target(&self, collection: CollectionId) -> Result<(), TargetError>;
}

#[cfg(any(test, feature = "test-fixture"))]
pub mod fixture {
    use super::Target;
    use super::TargetError;
    use crate::CollectionId;
    use crate::SegmentId;
    use std::collections::HashMap;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    /// In-memory [`Target`] a test can populate directly and inspect refresh requests on.
    #[derive(Default)]
    pub struct MemoryTarget {
        segments: Mutex<HashMap<CollectionId, HashSet<SegmentId>>>,
        channels: Mutex<HashMap<CollectionId, HashSet<String>>>,
        current_segments: Mutex<HashMap<CollectionId, HashSet<SegmentId>>>,
        current_channels: Mutex<HashMap<CollectionId, HashSet<String>>>,
        refreshes: AtomicUsize,
    }

    impl MemoryTarget {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_segment(&self, collection: CollectionId, segment: SegmentId) {
            self.segments
                .lock()
                .unwrap()
                .entry(collection)
                .or_default()
                .insert(segment);
        }

        pub fn remove_segment(&self, collection: CollectionId, segment: SegmentId) {
            if let Some(set) = self.segments.lock().unwrap().get_mut(&collection) {
                set.remove(&segment);
            }
        }

        pub fn add_channel(&self, collection: CollectionId, channel: impl Into<String>) {
            self.channels
                .lock()
                .unwrap()
                .entry(collection)
                .or_default()
                .insert(channel.into());
        }

        /// Number of times [`Target::update_next_target`] has been called.
        pub fn refresh_count(&self) -> usize {
            self.refreshes.load(Ordering::SeqCst)
        }

        /// Whether `segment` is part of `collection`'s current (serving) target, as of
        /// the last [`Target::update_current_target`] promotion.
        pub fn current_has_segment(&self, collection: CollectionId, segment: SegmentId) -> bool {
            self.current_segments
                .lock()
                .unwrap()
                .get(&collection)
                .map(|set| set.contains(&segment))
                .unwrap_or(false)
        }
    }

    #[async_trait::async_trait]
    impl Target for MemoryTarget {
        fn next_target_has_segment(&self, collection: CollectionId, segment: SegmentId) -> bool {
            self.segments
                .lock()
                .unwrap()
                .get(&collection)
                .map(|set| set.contains(&segment))
                .unwrap_or(false)
        }

        fn next_target_has_channel(&self, collection: CollectionId, channel: &str) -> bool {
            self.channels
                .lock()
                .unwrap()
                .get(&collection)
                .map(|set| set.contains(channel))
                .unwrap_or(false)
        }

        async fn update_next_target(&self, _collection: CollectionId) -> Result<(), TargetError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn update_current_target(&self, collection: CollectionId) -> Result<(), TargetError> {
            let segments = self
                .segments
                .lock()
                .unwrap()
                .get(&collection)
                .cloned()
                .unwrap_or_default();
            let channels = self
                .channels
                .lock()
                .unwrap()
                .get(&collection)
                .cloned()
                .unwrap_or_default();
            self.current_segments.lock().unwrap().insert(collection, segments);
            self.current_channels.lock().unwrap().insert(collection, channels);
            Ok(())
        }
    }
}
