//! Error taxonomy for task admission, dispatch and execution.
//!
//! Each variant here is returned directly by the scheduler API that detects it, and the
//! same value (boxed as [`anyhow::Error`]) is stored as a task's terminal `err` so callers
//! can later recover the concrete category with [`anyhow::Error::downcast_ref`] while
//! logging and JSON introspection treat it opaquely through `Display`.

use shardctl_collab::NodeId;
use shardctl_collab::SegmentId;

/// A task failed structural validation at construction or admission time.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParameterInvalid {
    #[error("task has no actions")]
    EmptyActions,
    #[error("task actions are not homogeneous for its inferred type")]
    Heterogeneous,
    #[error("move task requires exactly two segment actions on distinct nodes")]
    MalformedMove,
    #[error("channel balance task requires a grow on the new delegator paired with a reduce on the old one, for the same channel")]
    MalformedBalance,
    #[error("leader task requires exactly one action, channel task requires one or two")]
    TooManyActions,
    #[error("replica {replica} does not belong to collection {collection}")]
    ReplicaMismatch { replica: i64, collection: i64 },
}

/// A task's subject collided with an existing task of equal or higher priority.
#[derive(Debug, Clone, thiserror::Error)]
#[error("duplicate task for the same subject at priority {incumbent_priority:?} or higher")]
pub struct Duplicate {
    pub incumbent_priority: crate::task::Priority,
}

/// An incumbent task was canceled to make room for a higher-priority replacement.
#[derive(Debug, Clone, thiserror::Error)]
#[error("replaced by higher priority task")]
pub struct Preempted;

/// A task's subject is no longer part of the collection's next target.
#[derive(Debug, Clone, thiserror::Error)]
#[error("task subject is stale: no longer present in the next target")]
pub struct Stale;

/// A task's absolute deadline has passed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("task deadline exceeded")]
pub struct DeadlineExceeded;

/// A collaborator RPC failed. [`Rpc::SegmentNotFound`] additionally triggers a
/// next-target refresh once the owning task is retired.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Rpc {
    #[error("segment {segment} not found")]
    SegmentNotFound { segment: SegmentId },
    #[error("collaborator transport error: {0}")]
    Transport(String),
}

/// A Move task's Reduce action could not proceed because a precondition it depends on
/// no longer holds.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Precondition {
    #[error("shard leader changed since the paired grow action recorded it")]
    ShardLeaderChanged,
}

/// An action targets a node with no registered executor.
#[derive(Debug, Clone, thiserror::Error)]
#[error("no executor registered for node {0}")]
pub struct NoExecutor(pub NodeId);

/// A task was explicitly canceled by its caller.
#[derive(Debug, Clone, thiserror::Error)]
#[error("task canceled: {0}")]
pub struct Canceled(pub String);
