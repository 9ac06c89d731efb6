//! End-to-end scenarios driving a [`crate::Scheduler`] against in-memory collaborators.
mod cancel;
mod channel_balance;
mod duplicate;
mod lifecycle;
mod move_task;
mod preempt;
mod release;

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;

use shardctl_collab::broker::fixture::MemoryBroker;
use shardctl_collab::cluster::fixture::MemoryCluster;
use shardctl_collab::distribution::fixture::MemoryDistribution;
use shardctl_collab::meta::fixture::MemoryMeta;
use shardctl_collab::target::fixture::MemoryTarget;
use shardctl_context::Context;

use crate::action::Action;
use crate::action::ActionKind;
use crate::action::ChannelAction;
use crate::action::SegmentAction;
use crate::config::SchedulerConf;
use crate::scheduler::Scheduler;
use crate::task::Priority;
use crate::task::Task;
use crate::task::TaskId;
use shardctl_collab::SegmentScope;

/// A scheduler wired to in-memory collaborators, plus handles to drive and inspect them.
pub struct Harness {
    pub scheduler: Arc<Scheduler>,
    pub cluster: Arc<MemoryCluster>,
    pub broker: Arc<MemoryBroker>,
    pub distribution: Arc<MemoryDistribution>,
    pub target: Arc<MemoryTarget>,
    next_id: TaskId,
}

impl Harness {
    pub fn new() -> Harness {
        let cluster = Arc::new(MemoryCluster::new());
        let broker = Arc::new(MemoryBroker::new());
        let distribution = Arc::new(MemoryDistribution::new());
        let target = Arc::new(MemoryTarget::new());
        let meta = Arc::new(MemoryMeta::new());
        let scheduler = Scheduler::new(
            Context::fixture(),
            SchedulerConf::default(),
            broker.clone(),
            cluster.clone(),
            distribution.clone(),
            target.clone(),
            meta,
        );
        Harness {
            scheduler,
            cluster,
            broker,
            distribution,
            target,
            next_id: 1,
        }
    }

    pub fn next_id(&mut self) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// A deadline far enough in the future that scenarios not exercising it never trip it.
    pub fn far_deadline(&self) -> DateTime<Utc> {
        now() + chrono::Duration::seconds(300)
    }

    /// Wait until `executor.submit` has actually run an action at least once for `node`,
    /// since dispatch hands work to a spawned task rather than running it inline.
    pub async fn settle(&self) {
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    pub fn channel_grow_task(&mut self, collection: i64, node: i64, channel: &str, priority: Priority) -> Arc<Task> {
        let id = self.next_id();
        let actions = vec![Action::Channel(ChannelAction {
            node,
            kind: ActionKind::Grow,
            channel: channel.to_string(),
        })];
        Arc::new(Task::new(id, "test", collection, None, priority, self.far_deadline(), actions, now()).unwrap())
    }

    pub fn segment_release_task(&mut self, collection: i64, node: i64, channel: &str, segment: i64) -> Arc<Task> {
        let id = self.next_id();
        let actions = vec![Action::Segment(SegmentAction {
            node,
            kind: ActionKind::Reduce,
            channel: channel.to_string(),
            segment,
            scope: SegmentScope::Streaming,
            rows: Some(10),
        })];
        Arc::new(Task::new(id, "test", collection, None, Priority::Normal, self.far_deadline(), actions, now()).unwrap())
    }

    pub fn segment_load_task(&mut self, collection: i64, node: i64, channel: &str, segment: i64) -> Arc<Task> {
        let id = self.next_id();
        let actions = vec![Action::Segment(SegmentAction {
            node,
            kind: ActionKind::Grow,
            channel: channel.to_string(),
            segment,
            scope: SegmentScope::Streaming,
            rows: Some(10),
        })];
        Arc::new(Task::new(id, "test", collection, None, Priority::Normal, self.far_deadline(), actions, now()).unwrap())
    }

    pub fn move_task(&mut self, collection: i64, channel: &str, segment: i64, from: i64, to: i64) -> Arc<Task> {
        let id = self.next_id();
        let actions = vec![
            Action::Segment(SegmentAction {
                node: to,
                kind: ActionKind::Grow,
                channel: channel.to_string(),
                segment,
                scope: SegmentScope::Streaming,
                rows: Some(10),
            }),
            Action::Segment(SegmentAction {
                node: from,
                kind: ActionKind::Reduce,
                channel: channel.to_string(),
                segment,
                scope: SegmentScope::Streaming,
                rows: Some(10),
            }),
        ];
        Arc::new(Task::new(id, "test", collection, None, Priority::Normal, self.far_deadline(), actions, now()).unwrap())
    }
}

pub fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}
