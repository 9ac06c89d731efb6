//! Interfaces for the collaborators the scheduler depends on but does not own.
//!
//! The scheduler is the hard part of the query coordinator; everything it calls out to —
//! the RPC client to worker nodes (`Cluster`), the recovery-info broker (`Broker`), the
//! metadata store (`Meta`), the target manager (`Target`) and the distribution manager
//! (`Distribution`) — is implemented elsewhere in the real system. Here we model only the
//! boundary: a narrow trait per collaborator, object-safe and `Send + Sync` so the scheduler
//! can hold them as `Arc<dyn Trait>` without caring about the concrete backend.
//!
//! Each module also exposes an in-memory fixture behind the `test-fixture` feature so the
//! scheduler's own test suite can exercise real scheduling decisions without a real cluster.

pub mod broker;
pub mod cluster;
pub mod distribution;
pub mod meta;
pub mod target;

/// Identifier of a collection (table-like grouping of partitions, segments and channels).
pub type CollectionId = i64;

/// Identifier of a data-plane worker node.
pub type NodeId = i64;

/// Identifier of an immutable data segment.
pub type SegmentId = i64;

/// Identifier of a replica (a load-balanced group of nodes serving a collection).
pub type ReplicaId = i64;

/// Scope of a segment: on-disk (historical) or still accumulating inserts (streaming).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SegmentScope {
    Historical,
    Streaming,
}
