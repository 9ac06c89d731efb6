//! The scheduler: admission, dedup, priority preemption, dispatch, step advancement and
//! retirement of tasks.
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use shardctl_collab::broker::Broker;
use shardctl_collab::cluster::Cluster;
use shardctl_collab::distribution::Distribution;
use shardctl_collab::meta::Meta;
use shardctl_collab::target::Target;
use shardctl_collab::CollectionId;
use shardctl_collab::NodeId;
use shardctl_collab::ReplicaId;
use shardctl_collab::SegmentId;
use shardctl_context::Context;

use crate::action::Action;
use crate::action::ActionKind;
use crate::config::SchedulerConf;
use crate::error::DeadlineExceeded;
use crate::error::Duplicate;
use crate::error::NoExecutor;
use crate::error::ParameterInvalid;
use crate::error::Preempted;
use crate::error::Rpc;
use crate::executor::Executor;
use crate::introspect::TaskSnapshot;
use crate::task::Task;
use crate::task::TaskId;
use crate::task::TaskKind;
use crate::task_delta::DeltaContribution;
use crate::task_delta::TaskDeltaCache;
use crate::validate;

type SegmentKey = (CollectionId, Option<ReplicaId>, SegmentId);
type ChannelKey = (CollectionId, Option<ReplicaId>, String);

#[derive(Default)]
struct SchedulerState {
    wait_queue: VecDeque<TaskId>,
    process_queue: VecDeque<TaskId>,
    tasks: HashMap<TaskId, Arc<Task>>,
    segment_tasks: HashMap<SegmentKey, TaskId>,
    channel_tasks: HashMap<ChannelKey, TaskId>,
    executors: HashMap<NodeId, Arc<Executor>>,
}

/// The query coordinator's task scheduler.
///
/// Indices and queues are protected by a single coarse mutex (§5); collaborator RPCs and
/// task execution happen entirely inside per-node [`Executor`]s, outside that lock.
pub struct Scheduler {
    context: Context,
    conf: SchedulerConf,
    broker: Arc<dyn Broker>,
    cluster: Arc<dyn Cluster>,
    distribution: Arc<dyn Distribution>,
    target: Arc<dyn Target>,
    meta: Arc<dyn Meta>,
    state: Mutex<SchedulerState>,
    delta: TaskDeltaCache,
    next_id: AtomicU64,
    running: AtomicBool,
    stop: Notify,
    tick_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: Context,
        conf: SchedulerConf,
        broker: Arc<dyn Broker>,
        cluster: Arc<dyn Cluster>,
        distribution: Arc<dyn Distribution>,
        target: Arc<dyn Target>,
        meta: Arc<dyn Meta>,
    ) -> Arc<Scheduler> {
        Arc::new(Scheduler {
            context,
            conf,
            broker,
            cluster,
            distribution,
            target,
            meta,
            state: Mutex::new(SchedulerState::default()),
            delta: TaskDeltaCache::new(),
            next_id: AtomicU64::new(1),
            running: AtomicBool::new(false),
            stop: Notify::new(),
            tick_handle: Mutex::new(None),
        })
    }

    /// Allocate the next monotonic task id. Callers build a [`Task`] with this id before
    /// calling [`Scheduler::add`].
    pub fn next_task_id(&self) -> TaskId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Start the background tick loop: dispatches every registered executor and
    /// processes the process queue on a fixed interval. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.conf.tick_interval());
            loop {
                tokio::select! {
                    _ = scheduler.stop.notified() => break,
                    _ = interval.tick() => scheduler.tick(),
                }
            }
        });
        *self.tick_handle.lock().unwrap() = Some(handle);
    }

    /// Signal the tick loop to stop and wait for it to exit.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.stop.notify_one();
        let handle = self.tick_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn tick(&self) {
        let nodes: Vec<NodeId> = self.state.lock().unwrap().executors.keys().copied().collect();
        for node in nodes {
            self.dispatch(node);
        }
        self.process();
    }

    /// Register a per-node executor. Idempotent.
    pub fn add_executor(&self, node: NodeId) {
        let mut state = self.state.lock().unwrap();
        state.executors.entry(node).or_insert_with(|| {
            Executor::new(
                node,
                Arc::clone(&self.broker),
                Arc::clone(&self.cluster),
                Arc::clone(&self.distribution),
                self.conf.executor.clone(),
                self.context.clone(),
            )
        });
    }

    /// Tear down a node's executor. Tasks already dispatched there are retired as
    /// `Canceled("no executor")` on the next process tick.
    pub fn remove_executor(&self, node: NodeId) {
        self.state.lock().unwrap().executors.remove(&node);
    }

    /// Admit a task. Runs the admission pipeline (deadline, replica consistency,
    /// staleness, duplicate/priority-preempt) before enqueueing; on rejection the task's
    /// own status is set and the same error is returned to the caller.
    pub fn add(self: &Arc<Self>, task: Arc<Task>) -> anyhow::Result<()> {
        let now = Utc::now();

        if task.deadline <= now {
            task.fail(DeadlineExceeded);
            anyhow::bail!(DeadlineExceeded);
        }

        if let Some(replica) = task.replica {
            let owner = self.meta.collection_of_replica(replica);
            if owner != Some(task.collection) {
                let err = ParameterInvalid::ReplicaMismatch {
                    replica,
                    collection: task.collection,
                };
                task.cancel(err.clone());
                return Err(err.into());
            }
        }

        if let Err(stale) = validate::check_staleness(self.target.as_ref(), &task) {
            task.mark_stale(stale.clone());
            return Err(stale.into());
        }

        let mut state = self.state.lock().unwrap();
        let segment_key = segment_key(&task);
        let channel_key = channel_key(&task);

        if let Some(key) = &segment_key {
            if let Some(incumbent_id) = state.segment_tasks.get(key).copied() {
                if let Some(outcome) = preempt_or_reject(&self.delta, &mut state, incumbent_id, &task)? {
                    return outcome;
                }
            }
        }
        if let Some(key) = &channel_key {
            if let Some(incumbent_id) = state.channel_tasks.get(key).copied() {
                if let Some(outcome) = preempt_or_reject(&self.delta, &mut state, incumbent_id, &task)? {
                    return outcome;
                }
            }
        }

        state.tasks.insert(task.id, Arc::clone(&task));
        state.wait_queue.push_back(task.id);
        if let Some(key) = segment_key {
            state.segment_tasks.insert(key, task.id);
        }
        if let Some(key) = channel_key {
            state.channel_tasks.insert(key, task.id);
        }
        if let Some(contribution) = DeltaContribution::of(&task) {
            self.delta.add(&contribution);
        }
        slog::debug!(
            self.context.logger, "task admitted";
            "task_id" => task.id, "collection" => task.collection,
        );
        Ok(())
    }

    /// Advance the dispatch tick for `node`: pop admissible wait-queue entries addressed
    /// to it and hand their current action to its executor.
    pub fn dispatch(&self, node: NodeId) {
        let mut state = self.state.lock().unwrap();
        let executor = state.executors.get(&node).cloned();
        let mut remaining = VecDeque::with_capacity(state.wait_queue.len());
        let pending: Vec<TaskId> = state.wait_queue.drain(..).collect();

        for task_id in pending {
            let Some(task) = state.tasks.get(&task_id).cloned() else {
                continue;
            };
            if task.status().is_terminal() {
                continue;
            }
            let Some(action) = task.current_action().cloned() else {
                continue;
            };
            if action.node() != node {
                remaining.push_back(task_id);
                continue;
            }

            let Some(executor) = executor.clone() else {
                task.cancel(NoExecutor(node));
                self.retire_locked(&mut state, task_id);
                continue;
            };

            if !validate::delegator_ready(self.distribution.as_ref(), &action) {
                remaining.push_back(task_id);
                continue;
            }

            executor.submit(task);
            state.process_queue.push_back(task_id);
        }
        state.wait_queue = remaining;
    }

    /// Process every task currently in the process queue: retire finished/failed/expired
    /// tasks, advance the rest.
    pub fn process(&self) {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        let pending: Vec<TaskId> = state.process_queue.iter().copied().collect();
        let mut to_retire = Vec::new();
        let mut to_advance = Vec::new();

        for task_id in &pending {
            let Some(task) = state.tasks.get(task_id).cloned() else {
                continue;
            };
            if task.status().is_terminal() {
                to_retire.push(*task_id);
                continue;
            }
            if now > task.deadline {
                task.fail(DeadlineExceeded);
                to_retire.push(*task_id);
                continue;
            }
            let Some(action) = task.current_action() else {
                task.succeed();
                to_retire.push(*task_id);
                continue;
            };
            if state.executors.get(&action.node()).is_none() {
                task.cancel(NoExecutor(action.node()));
                to_retire.push(*task_id);
                continue;
            }
            if action.is_finished(self.distribution.as_ref()) {
                to_advance.push(*task_id);
            }
        }

        for task_id in to_advance {
            let Some(task) = state.tasks.get(&task_id).cloned() else {
                continue;
            };
            let has_more = task.advance_step();
            if !has_more {
                task.succeed();
                to_retire.push(task_id);
                continue;
            }
            slog::debug!(
                self.context.logger, "action finished, advancing task";
                "task_id" => task.id, "step" => task.step(),
            );
            if let Some(action) = task.current_action().cloned() {
                if let Some(executor) = state.executors.get(&action.node()).cloned() {
                    executor.submit(task);
                } else {
                    task.cancel(NoExecutor(action.node()));
                    to_retire.push(task_id);
                }
            }
        }

        for task_id in to_retire {
            self.retire_locked(&mut state, task_id);
        }
    }

    fn retire_locked(&self, state: &mut SchedulerState, task_id: TaskId) {
        let Some(task) = state.tasks.remove(&task_id) else {
            return;
        };
        state.wait_queue.retain(|id| *id != task_id);
        state.process_queue.retain(|id| *id != task_id);
        if let Some(key) = segment_key(&task) {
            if state.segment_tasks.get(&key) == Some(&task_id) {
                state.segment_tasks.remove(&key);
            }
        }
        if let Some(key) = channel_key(&task) {
            if state.channel_tasks.get(&key) == Some(&task_id) {
                state.channel_tasks.remove(&key);
            }
        }
        if let Some(contribution) = DeltaContribution::of(&task) {
            self.delta.sub(&contribution);
        }
        slog::info!(
            self.context.logger, "task retired";
            "task_id" => task.id, "status" => ?task.status(),
        );

        if let Some(err) = task.err() {
            if let Some(Rpc::SegmentNotFound { .. }) = err.downcast_ref::<Rpc>() {
                let target = Arc::clone(&self.target);
                let collection = task.collection;
                let context = self.context.clone();
                tokio::spawn(async move {
                    if let Err(error) = target.update_next_target(collection).await {
                        slog::warn!(context.logger, "next-target refresh failed"; "error" => %error);
                    }
                });
            }
        }
    }

    pub fn get_segment_task_delta(&self, node: NodeId, collection: CollectionId) -> i64 {
        self.delta.segment_delta(node, collection)
    }

    pub fn get_channel_task_delta(&self, node: NodeId, collection: CollectionId) -> i64 {
        self.delta.channel_delta(node, collection)
    }

    /// One-shot readiness signal set when `node`'s executor completes an action.
    pub fn get_executed_flag(&self, node: NodeId) -> bool {
        self.state
            .lock()
            .unwrap()
            .executors
            .get(&node)
            .map(|executor| executor.take_executed_flag())
            .unwrap_or(false)
    }

    /// JSON snapshot of every task currently known to the scheduler.
    pub fn get_tasks_json(&self) -> serde_json::Result<String> {
        let state = self.state.lock().unwrap();
        let snapshots: Vec<TaskSnapshot> = state.tasks.values().map(|t| TaskSnapshot::of(t)).collect();
        crate::introspect::tasks_json(&snapshots)
    }

    /// Snapshot of queue lengths, mostly useful for tests: `(process, wait)`.
    pub fn queue_lengths(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.process_queue.len(), state.wait_queue.len())
    }

    /// Snapshot of index sizes, mostly useful for tests: `(segment_tasks, channel_tasks)`.
    pub fn index_lengths(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.segment_tasks.len(), state.channel_tasks.len())
    }

    pub fn get_task(&self, id: TaskId) -> Option<Arc<Task>> {
        self.state.lock().unwrap().tasks.get(&id).cloned()
    }
}

fn segment_key(task: &Task) -> Option<SegmentKey> {
    match task.kind {
        TaskKind::SegmentLoad | TaskKind::SegmentMove => {
            task.actions.iter().find_map(|a| match a {
                Action::Segment(s) if s.kind == ActionKind::Grow => {
                    Some((task.collection, task.replica, s.segment))
                }
                _ => None,
            })
        }
        TaskKind::SegmentRelease => match &task.actions[0] {
            Action::Segment(s) => Some((task.collection, task.replica, s.segment)),
            _ => None,
        },
        TaskKind::Channel | TaskKind::ChannelBalance | TaskKind::Leader => None,
    }
}

fn channel_key(task: &Task) -> Option<ChannelKey> {
    match task.kind {
        TaskKind::Channel | TaskKind::ChannelBalance => match &task.actions[0] {
            Action::Channel(a) => Some((task.collection, task.replica, a.channel.clone())),
            _ => None,
        },
        _ => None,
    }
}

/// Resolve a duplicate-key collision: reject the new task if the incumbent is at equal
/// or higher priority, otherwise cancel the incumbent as preempted and let the caller
/// continue inserting the new task. Returns `Some(outcome)` when the new task was
/// rejected (the caller should return it directly), `None` when admission can proceed.
fn preempt_or_reject(
    delta: &TaskDeltaCache,
    state: &mut SchedulerState,
    incumbent_id: TaskId,
    task: &Arc<Task>,
) -> anyhow::Result<Option<anyhow::Result<()>>> {
    let Some(incumbent) = state.tasks.get(&incumbent_id).cloned() else {
        return Ok(None);
    };
    if incumbent.status().is_terminal() {
        return Ok(None);
    }
    if incumbent.priority() >= task.priority() {
        let err = Duplicate {
            incumbent_priority: incumbent.priority(),
        };
        task.cancel(err.clone());
        return Ok(Some(Err(err.into())));
    }
    incumbent.cancel(Preempted);
    retire_index_only(delta, state, incumbent_id);
    Ok(None)
}

/// Remove a preempted incumbent's bookkeeping, including its delta contribution: the
/// caller inserts the replacement's own contribution for the same slot right after, so
/// this must not leave the incumbent's share behind or the slot would double-count.
fn retire_index_only(delta: &TaskDeltaCache, state: &mut SchedulerState, task_id: TaskId) {
    let Some(task) = state.tasks.remove(&task_id) else {
        return;
    };
    state.wait_queue.retain(|id| *id != task_id);
    state.process_queue.retain(|id| *id != task_id);
    if let Some(contribution) = DeltaContribution::of(&task) {
        delta.sub(&contribution);
    }
}
