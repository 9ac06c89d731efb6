//! Recovery-info broker: schema, index and recovery metadata needed to assemble load
//! and subscribe requests before they are sent to a node.
use crate::CollectionId;
use crate::SegmentId;

/// Errors returned by the [`Broker`].
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("collection {0} not found")]
    CollectionNotFound(CollectionId),
    #[error("segment {0} not found")]
    SegmentNotFound(SegmentId),
    #[error("broker transport error: {0}")]
    Transport(String),
}

/// Minimal schema description of a collection's fields.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub field_count: u32,
}

/// Database-level metadata a collection belongs to.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
}

/// A single index definition on a collection field.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IndexInfo {
    pub index_id: i64,
    pub field_id: i64,
    pub index_name: String,
}

/// Per-segment metadata needed to build a load request.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SegmentMeta {
    pub segment_id: SegmentId,
    pub collection_id: CollectionId,
    pub partition_id: i64,
    pub channel: String,
    pub num_rows: i64,
}

/// Write-ahead log recovery checkpoint for a channel.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChannelRecoveryInfo {
    pub channel: String,
    pub seek_position: Vec<u8>,
}

/// Result of [`Broker::get_recovery_info_v2`]: the channels and growing segments a
/// collection needs replayed when a node starts serving it.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RecoveryInfo {
    pub channels: Vec<ChannelRecoveryInfo>,
    pub growing_segments: Vec<SegmentMeta>,
}

/// Interface to the component that holds collection/index/recovery metadata the
/// scheduler's executors need in order to assemble load and subscribe requests.
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    async fn describe_collection(
        &self,
        collection: CollectionId,
    ) -> Result<CollectionSchema, BrokerError>;

    async fn describe_database(&self, collection: CollectionId) -> Result<DatabaseInfo, BrokerError>;

    async fn list_indexes(&self, collection: CollectionId) -> Result<Vec<IndexInfo>, BrokerError>;

    async fn get_segment_info(&self, segment: SegmentId) -> Result<SegmentMeta, BrokerError>;

    async fn get_index_info(
        &self,
        collection: CollectionId,
        segment: SegmentId,
    ) -> Result<Vec<IndexInfo>, BrokerError>;

    async fn get_recovery_info_v2(&self, collection: CollectionId) -> Result<RecoveryInfo, BrokerError>;
}

#[cfg(any(test, feature = "test-fixture"))]
pub mod fixture {
    use super::Broker;
    use super::BrokerError;
    use super::ChannelRecoveryInfo;
    use super::CollectionSchema;
    use super::DatabaseInfo;
    use super::IndexInfo;
    use super::RecoveryInfo;
    use super::SegmentMeta;
    use crate::CollectionId;
    use crate::SegmentId;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory [`Broker`] returning scripted responses, with a "not ready" flag
    /// to simulate a collection whose index build has not completed yet.
    #[derive(Default)]
    pub struct MemoryBroker {
        segments: Mutex<HashMap<SegmentId, SegmentMeta>>,
        not_ready: Mutex<bool>,
    }

    impl MemoryBroker {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put_segment(&self, segment: SegmentMeta) {
            self.segments.lock().unwrap().insert(segment.segment_id, segment);
        }

        /// Make every call fail with an "index not ready" transport error.
        pub fn set_not_ready(&self, not_ready: bool) {
            *self.not_ready.lock().unwrap() = not_ready;
        }

        fn check_ready(&self) -> Result<(), BrokerError> {
            if *self.not_ready.lock().unwrap() {
                return Err(BrokerError::Transport("index not ready".into()));
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl Broker for MemoryBroker {
        async fn describe_collection(
            &self,
            collection: CollectionId,
        ) -> Result<CollectionSchema, BrokerError> {
            self.check_ready()?;
            Ok(CollectionSchema {
                name: format!("collection-{collection}"),
                field_count: 1,
            })
        }

        async fn describe_database(
            &self,
            _collection: CollectionId,
        ) -> Result<DatabaseInfo, BrokerError> {
            self.check_ready()?;
            Ok(DatabaseInfo::default())
        }

        async fn list_indexes(
            &self,
            _collection: CollectionId,
        ) -> Result<Vec<IndexInfo>, BrokerError> {
            self.check_ready()?;
            Ok(Vec::new())
        }

        async fn get_segment_info(&self, segment: SegmentId) -> Result<SegmentMeta, BrokerError> {
            self.check_ready()?;
            self.segments
                .lock()
                .unwrap()
                .get(&segment)
                .cloned()
                .ok_or(BrokerError::SegmentNotFound(segment))
        }

        async fn get_index_info(
            &self,
            _collection: CollectionId,
            _segment: SegmentId,
        ) -> Result<Vec<IndexInfo>, BrokerError> {
            self.check_ready()?;
            Ok(Vec::new())
        }

        async fn get_recovery_info_v2(
            &self,
            _collection: CollectionId,
        ) -> Result<RecoveryInfo, BrokerError> {
            self.check_ready()?;
            Ok(RecoveryInfo {
                channels: vec![ChannelRecoveryInfo {
                    channel: String::new(),
                    seek_position: Vec::new(),
                }],
                growing_segments: Vec::new(),
            })
        }
    }
}
