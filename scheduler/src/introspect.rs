//! JSON snapshots of scheduler state for metrics scraping.
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use shardctl_collab::CollectionId;
use shardctl_collab::NodeId;
use shardctl_collab::SegmentId;

use crate::action::Action;
use crate::task::Priority;
use crate::task::Task;
use crate::task::TaskKind;
use crate::task::TaskStatus;

/// Point-in-time view of a single task, shaped for the balancer/observer dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub node: NodeId,
    pub collection: CollectionId,
    pub channel: Option<String>,
    pub segment: Option<SegmentId>,
    pub priority: Priority,
    pub step: usize,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl TaskSnapshot {
    pub fn of(task: &Task) -> TaskSnapshot {
        let current = task.current_action().or_else(|| task.actions.last());
        let (node, channel, segment) = match current {
            Some(Action::Segment(a)) => (a.node, Some(a.channel.clone()), Some(a.segment)),
            Some(Action::Channel(a)) => (a.node, Some(a.channel.clone()), None),
            Some(Action::Leader(a)) => (a.node, Some(a.channel.clone()), Some(a.segment)),
            None => (0, None, None),
        };
        TaskSnapshot {
            id: task.id,
            kind: task.kind,
            status: task.status(),
            node,
            collection: task.collection,
            channel,
            segment,
            priority: task.priority(),
            step: task.step(),
            created_at: task.created_at,
        }
    }
}

/// Serialize a set of task snapshots to the JSON array shape described by `GetTasksJSON`.
pub fn tasks_json(tasks: &[TaskSnapshot]) -> serde_json::Result<String> {
    serde_json::to_string(tasks)
}
