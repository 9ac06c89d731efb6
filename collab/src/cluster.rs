//! RPC client interface to data-plane worker nodes.
use crate::broker::ChannelRecoveryInfo;
use crate::broker::CollectionSchema;
use crate::broker::IndexInfo;
use crate::CollectionId;
use crate::NodeId;
use crate::SegmentId;
use crate::SegmentScope;

/// Errors returned by [`Cluster`] RPCs.
///
/// [`ClusterError::SegmentNotFound`] carries diagnostic meaning beyond "this RPC failed":
/// the scheduler reacts to it by requesting a next-target refresh after the owning task
/// is retired (§7).
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("segment {0} not found on the target node")]
    SegmentNotFound(SegmentId),
    #[error("index not ready for collection {0}")]
    IndexNotReady(CollectionId),
    #[error("transport error talking to node {node}: {reason}")]
    Transport { node: NodeId, reason: String },
}

/// Request to load a segment's data onto a node.
#[derive(Debug, Clone)]
pub struct LoadSegmentsRequest {
    pub collection: CollectionId,
    pub channel: String,
    pub segment: SegmentId,
    pub scope: SegmentScope,
    pub shard_leader: NodeId,
    pub schema: CollectionSchema,
    pub indexes: Vec<IndexInfo>,
    pub recovery: ChannelRecoveryInfo,
}

/// Request to release a segment from a node.
#[derive(Debug, Clone)]
pub struct ReleaseSegmentsRequest {
    pub collection: CollectionId,
    pub channel: String,
    pub segment: SegmentId,
    pub scope: SegmentScope,
}

/// Request to subscribe a node to a channel's write-ahead log.
#[derive(Debug, Clone)]
pub struct WatchChannelsRequest {
    pub collection: CollectionId,
    pub channel: String,
    pub recovery: ChannelRecoveryInfo,
}

/// Request to unsubscribe a node from a channel.
#[derive(Debug, Clone)]
pub struct UnsubChannelRequest {
    pub collection: CollectionId,
    pub channel: String,
}

/// Request to bring a delegator leader's view in sync with an intended segment presence.
#[derive(Debug, Clone)]
pub struct SyncDistributionRequest {
    pub channel: String,
    pub segment: SegmentId,
    pub version: u64,
    pub present: bool,
}

/// Interface to the RPC client used to instruct worker nodes.
///
/// A successful return only means the RPC was accepted; it is never treated as action
/// completion by the scheduler (§4.C) — completion is always observed via the
/// [`crate::distribution::Distribution`].
#[async_trait::async_trait]
pub trait Cluster: Send + Sync {
    async fn watch_dm_channels(
        &self,
        node: NodeId,
        req: WatchChannelsRequest,
    ) -> Result<(), ClusterError>;

    async fn unsub_dm_channel(&self, node: NodeId, req: UnsubChannelRequest) -> Result<(), ClusterError>;

    async fn load_segments(&self, node: NodeId, req: LoadSegmentsRequest) -> Result<(), ClusterError>;

    async fn release_segments(
        &self,
        node: NodeId,
        req: ReleaseSegmentsRequest,
    ) -> Result<(), ClusterError>;

    async fn sync_distribution(
        &self,
        leader: NodeId,
        req: SyncDistributionRequest,
    ) -> Result<(), ClusterError>;
}

#[cfg(any(test, feature = "test-fixture"))]
pub mod fixture {
    use super::Cluster;
    use super::ClusterError;
    use super::LoadSegmentsRequest;
    use super::ReleaseSegmentsRequest;
    use super::SyncDistributionRequest;
    use super::UnsubChannelRequest;
    use super::WatchChannelsRequest;
    use crate::NodeId;
    use crate::SegmentId;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// A recorded RPC call, for assertions in tests.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Watch { node: NodeId, channel: String },
        Unsub { node: NodeId, channel: String },
        Load { node: NodeId, segment: SegmentId },
        Release { node: NodeId, segment: SegmentId },
        Sync { leader: NodeId, segment: SegmentId },
    }

    /// In-memory [`Cluster`] that records every call and can be scripted to fail.
    #[derive(Default)]
    pub struct MemoryCluster {
        calls: Mutex<Vec<Call>>,
        fail_segments: Mutex<HashSet<SegmentId>>,
        not_ready: Mutex<bool>,
    }

    impl MemoryCluster {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        /// Subsequent `load_segments`/`release_segments` calls for `segment` fail with
        /// [`ClusterError::SegmentNotFound`].
        pub fn fail_segment_not_found(&self, segment: SegmentId) {
            self.fail_segments.lock().unwrap().insert(segment);
        }

        /// Make every call fail with [`ClusterError::IndexNotReady`].
        pub fn set_not_ready(&self, not_ready: bool) {
            *self.not_ready.lock().unwrap() = not_ready;
        }
    }

    #[async_trait::async_trait]
    impl Cluster for MemoryCluster {
        async fn watch_dm_channels(
            &self,
            node: NodeId,
            req: WatchChannelsRequest,
        ) -> Result<(), ClusterError> {
            self.calls.lock().unwrap().push(Call::Watch {
                node,
                channel: req.channel,
            });
            Ok(())
        }

        async fn unsub_dm_channel(
            &self,
            node: NodeId,
            req: UnsubChannelRequest,
        ) -> Result<(), ClusterError> {
            self.calls.lock().unwrap().push(Call::Unsub {
                node,
                channel: req.channel,
            });
            Ok(())
        }

        async fn load_segments(
            &self,
            node: NodeId,
            req: LoadSegmentsRequest,
        ) -> Result<(), ClusterError> {
            if *self.not_ready.lock().unwrap() {
                return Err(ClusterError::IndexNotReady(req.collection));
            }
            if self.fail_segments.lock().unwrap().contains(&req.segment) {
                return Err(ClusterError::SegmentNotFound(req.segment));
            }
            self.calls.lock().unwrap().push(Call::Load {
                node,
                segment: req.segment,
            });
            Ok(())
        }

        async fn release_segments(
            &self,
            node: NodeId,
            req: ReleaseSegmentsRequest,
        ) -> Result<(), ClusterError> {
            if self.fail_segments.lock().unwrap().contains(&req.segment) {
                return Err(ClusterError::SegmentNotFound(req.segment));
            }
            self.calls.lock().unwrap().push(Call::Release {
                node,
                segment: req.segment,
            });
            Ok(())
        }

        async fn sync_distribution(
            &self,
            leader: NodeId,
            req: SyncDistributionRequest,
        ) -> Result<(), ClusterError> {
            self.calls.lock().unwrap().push(Call::Sync {
                leader,
                segment: req.segment,
            });
            Ok(())
        }
    }
}
