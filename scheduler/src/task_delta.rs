//! Per-(node, collection) in-flight accounting used by balancers to throttle further
//! placements before they re-query the distribution.
use std::collections::HashMap;
use std::sync::Mutex;

use shardctl_collab::CollectionId;
use shardctl_collab::NodeId;

use crate::action::Action;
use crate::task::Task;
use crate::task::TaskKind;

const WILDCARD: i64 = -1;

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    segment_rows: i64,
    channel_count: i64,
}

/// A task's contribution to the delta cache, computed once at admission and reversed
/// unchanged at retirement regardless of what else happened to the cache in between.
#[derive(Debug, Clone, Copy)]
pub struct DeltaContribution {
    node: NodeId,
    collection: CollectionId,
    segment_rows: i64,
    channel_count: i64,
}

impl DeltaContribution {
    /// Compute the delta contribution a task makes on admission. Only segment tasks with
    /// a Grow action (Load, and the Grow half of Move) and channel tasks of any direction
    /// contribute; Release and Leader tasks contribute nothing.
    pub fn of(task: &Task) -> Option<DeltaContribution> {
        match task.kind {
            TaskKind::SegmentLoad | TaskKind::SegmentMove => {
                let grow = task.actions.iter().find_map(|a| match a {
                    Action::Segment(s) if s.kind == crate::action::ActionKind::Grow => Some(s),
                    _ => None,
                })?;
                Some(DeltaContribution {
                    node: grow.node,
                    collection: task.collection,
                    segment_rows: grow.rows.unwrap_or(0),
                    channel_count: 0,
                })
            }
            TaskKind::Channel => {
                let action = task.actions.first()?;
                Some(DeltaContribution {
                    node: action.node(),
                    collection: task.collection,
                    segment_rows: 0,
                    channel_count: 1,
                })
            }
            TaskKind::ChannelBalance => {
                let grow = task.actions.iter().find_map(|a| match a {
                    Action::Channel(c) if c.kind == crate::action::ActionKind::Grow => Some(c),
                    _ => None,
                })?;
                Some(DeltaContribution {
                    node: grow.node,
                    collection: task.collection,
                    segment_rows: 0,
                    channel_count: 1,
                })
            }
            TaskKind::SegmentRelease | TaskKind::Leader => None,
        }
    }
}

/// Per-(node, collection) counters of in-flight segment-grow rows and channel tasks.
#[derive(Default)]
pub struct TaskDeltaCache {
    inner: Mutex<HashMap<(NodeId, CollectionId), Counters>>,
}

impl TaskDeltaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a task's contribution on admission.
    pub fn add(&self, contribution: &DeltaContribution) {
        let mut inner = self.inner.lock().unwrap();
        let counters = inner
            .entry((contribution.node, contribution.collection))
            .or_default();
        counters.segment_rows += contribution.segment_rows;
        counters.channel_count += contribution.channel_count;
    }

    /// Reverse a task's contribution on retirement.
    pub fn sub(&self, contribution: &DeltaContribution) {
        let mut inner = self.inner.lock().unwrap();
        let counters = inner
            .entry((contribution.node, contribution.collection))
            .or_default();
        counters.segment_rows -= contribution.segment_rows;
        counters.channel_count -= contribution.channel_count;
    }

    /// Sum of in-flight segment-task Grow rows matching `node`/`collection`, `-1` wildcards
    /// either filter.
    pub fn segment_delta(&self, node: NodeId, collection: CollectionId) -> i64 {
        let inner = self.inner.lock().unwrap();
        inner
            .iter()
            .filter(|((n, c), _)| matches(node, *n) && matches(collection, *c))
            .map(|(_, counters)| counters.segment_rows)
            .sum()
    }

    /// Count of in-flight channel tasks matching `node`/`collection`, `-1` wildcards
    /// either filter.
    pub fn channel_delta(&self, node: NodeId, collection: CollectionId) -> i64 {
        let inner = self.inner.lock().unwrap();
        inner
            .iter()
            .filter(|((n, c), _)| matches(node, *n) && matches(collection, *c))
            .map(|(_, counters)| counters.channel_count)
            .sum()
    }
}

fn matches(filter: i64, value: i64) -> bool {
    filter == WILDCARD || filter == value
}
