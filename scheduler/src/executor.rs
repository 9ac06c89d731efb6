//! Per-node executors: run one action at a time per action key against one node via the
//! `Cluster` RPC interface.
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use chrono::Utc;
use tokio::sync::Semaphore;

use shardctl_collab::broker::Broker;
use shardctl_collab::broker::BrokerError;
use shardctl_collab::broker::ChannelRecoveryInfo;
use shardctl_collab::cluster::Cluster;
use shardctl_collab::cluster::ClusterError;
use shardctl_collab::cluster::LoadSegmentsRequest;
use shardctl_collab::cluster::ReleaseSegmentsRequest;
use shardctl_collab::cluster::SyncDistributionRequest;
use shardctl_collab::cluster::UnsubChannelRequest;
use shardctl_collab::cluster::WatchChannelsRequest;
use shardctl_collab::distribution::Distribution;
use shardctl_collab::NodeId;
use shardctl_context::Context;

use crate::action::Action;
use crate::action::ActionKey;
use crate::action::ActionKind;
use crate::action::ChannelAction;
use crate::action::LeaderAction;
use crate::action::SegmentAction;
use crate::config::ExecutorConf;
use crate::error::DeadlineExceeded;
use crate::error::Precondition;
use crate::error::Rpc;
use crate::task::Task;
use crate::task::TaskKind;

/// Runs exactly one action at a time per action key against a single data-plane node.
///
/// Distinct action keys run concurrently, bounded by [`ExecutorConf::concurrent_actions`];
/// the same key is never offered twice — the scheduler is expected to hold its own
/// indices such that this never happens, so a collision here is treated as a defensive
/// no-op rather than queued.
pub struct Executor {
    node: NodeId,
    broker: Arc<dyn Broker>,
    cluster: Arc<dyn Cluster>,
    distribution: Arc<dyn Distribution>,
    conf: ExecutorConf,
    context: Context,
    in_flight: Mutex<HashSet<ActionKey>>,
    semaphore: Semaphore,
    executed: AtomicBool,
}

impl Executor {
    pub fn new(
        node: NodeId,
        broker: Arc<dyn Broker>,
        cluster: Arc<dyn Cluster>,
        distribution: Arc<dyn Distribution>,
        conf: ExecutorConf,
        context: Context,
    ) -> Arc<Executor> {
        let semaphore = Semaphore::new(conf.concurrent_actions);
        Arc::new(Executor {
            node,
            broker,
            cluster,
            distribution,
            conf,
            context,
            in_flight: Mutex::new(HashSet::new()),
            semaphore,
            executed: AtomicBool::new(false),
        })
    }

    /// Submit `task`'s current action for execution. Returns `false` without doing
    /// anything if the action's key is already in flight on this node.
    pub fn submit(self: &Arc<Self>, task: Arc<Task>) -> bool {
        let Some(action) = task.current_action().cloned() else {
            return false;
        };
        let key = action.key();
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if in_flight.contains(&key) {
                return false;
            }
            in_flight.insert(key.clone());
        }
        task.start();
        slog::debug!(
            self.context.logger, "dispatching action";
            "node" => self.node, "task_id" => task.id, "step" => task.step(),
        );

        let executor = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = executor
                .semaphore
                .acquire()
                .await
                .expect("executor semaphore never closes");
            executor.run_action(&task, &action).await;
            executor.in_flight.lock().unwrap().remove(&key);
            executor.executed.store(true, Ordering::SeqCst);
        });
        true
    }

    /// Consume the one-shot "an action completed" readiness signal.
    pub fn take_executed_flag(&self) -> bool {
        self.executed.swap(false, Ordering::SeqCst)
    }

    /// Number of action keys currently in flight on this node.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    async fn run_action(&self, task: &Task, action: &Action) {
        let now = Utc::now();
        let action_budget = ChronoDuration::from_std(self.conf.action_timeout())
            .unwrap_or_else(|_| ChronoDuration::seconds(30));
        let deadline = task.deadline.min(now + action_budget);
        let budget = (deadline - now).to_std().unwrap_or(Duration::ZERO);

        let result = match tokio::time::timeout(budget, self.dispatch(task, action)).await {
            Ok(result) => result,
            Err(_) => Err(DeadlineExceeded.into()),
        };

        if let Err(error) = result {
            slog::warn!(
                self.context.logger, "action execution failed";
                "node" => self.node, "task_id" => task.id, "error" => %error,
            );
            task.fail(error);
        }
    }

    async fn dispatch(&self, task: &Task, action: &Action) -> anyhow::Result<()> {
        match action {
            Action::Segment(a) if a.kind == ActionKind::Grow => self.load_segment(task, a).await,
            Action::Segment(a) if a.kind == ActionKind::Reduce => {
                self.release_segment(task, a).await
            }
            Action::Segment(_) => Ok(()),
            Action::Channel(a) if a.kind == ActionKind::Grow => {
                self.subscribe_channel(task, a).await
            }
            Action::Channel(a) if a.kind == ActionKind::Reduce => {
                self.unsubscribe_channel(task, a).await
            }
            Action::Channel(_) => Ok(()),
            Action::Leader(a) => self.sync_leader(a).await,
        }
    }

    async fn load_segment(&self, task: &Task, action: &SegmentAction) -> anyhow::Result<()> {
        let schema = self
            .broker
            .describe_collection(task.collection)
            .await
            .map_err(rpc_from_broker)?;
        let indexes = self
            .broker
            .list_indexes(task.collection)
            .await
            .map_err(rpc_from_broker)?;
        let recovery = self
            .broker
            .get_recovery_info_v2(task.collection)
            .await
            .map_err(rpc_from_broker)?;
        let channel_recovery = recovery
            .channels
            .into_iter()
            .find(|c| c.channel == action.channel)
            .unwrap_or_else(|| ChannelRecoveryInfo {
                channel: action.channel.clone(),
                seek_position: Vec::new(),
            });

        // The delegator observed now becomes the shard leader the paired Reduce (for a
        // Move) will later re-validate against.
        let leader = self
            .distribution
            .channel_delegator(&action.channel)
            .unwrap_or(action.node);
        task.set_shard_leader(leader);

        let req = LoadSegmentsRequest {
            collection: task.collection,
            channel: action.channel.clone(),
            segment: action.segment,
            scope: action.scope,
            shard_leader: leader,
            schema,
            indexes,
            recovery: channel_recovery,
        };
        self.cluster
            .load_segments(self.node, req)
            .await
            .map_err(rpc_from_cluster)
    }

    async fn release_segment(&self, task: &Task, action: &SegmentAction) -> anyhow::Result<()> {
        if task.kind == TaskKind::SegmentMove {
            let expected = task.shard_leader();
            let current = self.distribution.channel_delegator(&action.channel);
            if expected != current {
                return Err(Precondition::ShardLeaderChanged.into());
            }
        }
        let req = ReleaseSegmentsRequest {
            collection: task.collection,
            channel: action.channel.clone(),
            segment: action.segment,
            scope: action.scope,
        };
        self.cluster
            .release_segments(self.node, req)
            .await
            .map_err(rpc_from_cluster)
    }

    async fn subscribe_channel(&self, task: &Task, action: &ChannelAction) -> anyhow::Result<()> {
        let recovery = self
            .broker
            .get_recovery_info_v2(task.collection)
            .await
            .map_err(rpc_from_broker)?;
        let channel_recovery = recovery
            .channels
            .into_iter()
            .find(|c| c.channel == action.channel)
            .unwrap_or_else(|| ChannelRecoveryInfo {
                channel: action.channel.clone(),
                seek_position: Vec::new(),
            });
        let req = WatchChannelsRequest {
            collection: task.collection,
            channel: action.channel.clone(),
            recovery: channel_recovery,
        };
        self.cluster
            .watch_dm_channels(self.node, req)
            .await
            .map_err(rpc_from_cluster)
    }

    async fn unsubscribe_channel(&self, task: &Task, action: &ChannelAction) -> anyhow::Result<()> {
        let req = UnsubChannelRequest {
            collection: task.collection,
            channel: action.channel.clone(),
        };
        self.cluster
            .unsub_dm_channel(self.node, req)
            .await
            .map_err(rpc_from_cluster)
    }

    async fn sync_leader(&self, action: &LeaderAction) -> anyhow::Result<()> {
        let present = action.kind != ActionKind::Reduce;
        let req = SyncDistributionRequest {
            channel: action.channel.clone(),
            segment: action.segment,
            version: action.version,
            present,
        };
        self.cluster
            .sync_distribution(action.leader, req)
            .await
            .map_err(rpc_from_cluster)
    }
}

fn rpc_from_broker(err: BrokerError) -> anyhow::Error {
    match err {
        BrokerError::SegmentNotFound(segment) => Rpc::SegmentNotFound { segment }.into(),
        other => Rpc::Transport(other.to_string()).into(),
    }
}

fn rpc_from_cluster(err: ClusterError) -> anyhow::Error {
    match err {
        ClusterError::SegmentNotFound(segment) => Rpc::SegmentNotFound { segment }.into(),
        other => Rpc::Transport(other.to_string()).into(),
    }
}
