//! Collection, partition and replica metadata reads.
use crate::CollectionId;
use crate::NodeId;
use crate::ReplicaId;

/// Read-only access to replica membership and collection ownership.
///
/// The scheduler uses this only to validate that a task's `replica` is consistent with
/// its `collectionID` on admission (§4.D.1); it never writes to the catalog.
pub trait Meta: Send + Sync {
    /// The collection a replica belongs to, if the replica is known.
    fn collection_of_replica(&self, replica: ReplicaId) -> Option<CollectionId>;

    /// Nodes that are members of a replica.
    fn replica_nodes(&self, replica: ReplicaId) -> Vec<NodeId>;
}

#[cfg(any(test, feature = "test-fixture"))]
pub mod fixture {
    use super::Meta;
    use crate::CollectionId;
    use crate::NodeId;
    use crate::ReplicaId;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory [`Meta`] a test can populate with replica/collection/node associations.
    #[derive(Default)]
    pub struct MemoryMeta {
        replicas: Mutex<HashMap<ReplicaId, (CollectionId, Vec<NodeId>)>>,
    }

    impl MemoryMeta {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put_replica(&self, replica: ReplicaId, collection: CollectionId, nodes: Vec<NodeId>) {
            self.replicas
                .lock()
                .unwrap()
                .insert(replica, (collection, nodes));
        }
    }

    impl Meta for MemoryMeta {
        fn collection_of_replica(&self, replica: ReplicaId) -> Option<CollectionId> {
            self.replicas
                .lock()
                .unwrap()
                .get(&replica)
                .map(|(collection, _)| *collection)
        }

        fn replica_nodes(&self, replica: ReplicaId) -> Vec<NodeId> {
            self.replicas
                .lock()
                .unwrap()
                .get(&replica)
                .map(|(_, nodes)| nodes.clone())
                .unwrap_or_default()
        }
    }
}
