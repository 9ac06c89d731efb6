//! Tasks: ordered plans of actions with a single terminal outcome.
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::watch;

use shardctl_collab::CollectionId;
use shardctl_collab::NodeId;
use shardctl_collab::ReplicaId;

use crate::action::Action;
use crate::action::ActionKind;
use crate::error::ParameterInvalid;

/// Monotonic task identifier, assigned by the scheduler on `Add`.
pub type TaskId = u64;

/// Task priority. A strict total order: `Low < Normal < High`. Preemption only ever
/// promotes — replacing an incumbent requires strictly higher priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// Terminal or in-progress lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Created,
    Started,
    Succeeded,
    Canceled,
    Failed,
    Stale,
}

impl TaskStatus {
    /// Terminal statuses are sticky: once reached a task never reactivates.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Canceled | TaskStatus::Failed | TaskStatus::Stale
        )
    }
}

/// Task type, derived from the composition of its actions rather than stored directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Channel,
    ChannelBalance,
    SegmentLoad,
    SegmentRelease,
    SegmentMove,
    Leader,
}

/// An ordered plan of actions the scheduler drives to completion or failure.
///
/// Mutable fields (`status`, `err`, `step`, `priority`, `shard_leader`) are guarded by an
/// internal mutex so a `Task` can be shared as `Arc<Task>` between the scheduler's indices,
/// its executors, and external callers holding a handle for `Wait`.
pub struct Task {
    pub id: TaskId,
    pub source: String,
    pub collection: CollectionId,
    pub replica: Option<ReplicaId>,
    pub actions: Vec<Action>,
    pub kind: TaskKind,
    pub deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    state: Mutex<TaskState>,
    status_tx: watch::Sender<TaskStatus>,
}

struct TaskState {
    priority: Priority,
    status: TaskStatus,
    err: Option<Arc<anyhow::Error>>,
    step: usize,
    shard_leader: Option<NodeId>,
}

impl Task {
    /// Construct a task, enforcing the structural invariants from the data model.
    /// Violations are reported as [`ParameterInvalid`] and the caller is expected to
    /// mark the rejected task `Canceled`.
    pub fn new(
        id: TaskId,
        source: impl Into<String>,
        collection: CollectionId,
        replica: Option<ReplicaId>,
        priority: Priority,
        deadline: DateTime<Utc>,
        actions: Vec<Action>,
        now: DateTime<Utc>,
    ) -> Result<Task, ParameterInvalid> {
        let kind = classify(&actions)?;
        let state = TaskState {
            priority,
            status: TaskStatus::Created,
            err: None,
            step: 0,
            shard_leader: None,
        };
        let (status_tx, _) = watch::channel(TaskStatus::Created);
        Ok(Task {
            id,
            source: source.into(),
            collection,
            replica,
            actions,
            kind,
            deadline,
            created_at: now,
            state: Mutex::new(state),
            status_tx,
        })
    }

    pub fn priority(&self) -> Priority {
        self.state.lock().unwrap().priority
    }

    /// Change a non-terminal task's priority. Has no effect on a terminal task.
    pub fn set_priority(&self, priority: Priority) {
        let mut state = self.state.lock().unwrap();
        if !state.status.is_terminal() {
            state.priority = priority;
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().unwrap().status
    }

    pub fn err(&self) -> Option<Arc<anyhow::Error>> {
        self.state.lock().unwrap().err.clone()
    }

    pub fn step(&self) -> usize {
        self.state.lock().unwrap().step
    }

    pub fn shard_leader(&self) -> Option<NodeId> {
        self.state.lock().unwrap().shard_leader
    }

    /// Record the node that defines the shard leader for a Move task, captured when its
    /// Grow action executes. The paired Reduce later re-checks against this value.
    pub fn set_shard_leader(&self, node: NodeId) {
        self.state.lock().unwrap().shard_leader = Some(node);
    }

    /// The action at the task's current step, if any remain.
    pub fn current_action(&self) -> Option<&Action> {
        self.actions.get(self.step())
    }

    /// Mark the current step started. No-op once terminal.
    pub fn start(&self) {
        let mut state = self.state.lock().unwrap();
        if state.status == TaskStatus::Created {
            state.status = TaskStatus::Started;
        }
    }

    /// Advance to the next action. Returns `true` if actions remain, `false` if the task
    /// just completed its last step (caller should then call [`Task::succeed`]).
    pub fn advance_step(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.step += 1;
        state.step < self.actions.len()
    }

    /// Mark the task successfully completed. Edge-triggered: only the first terminal
    /// transition has effect.
    pub fn succeed(&self) -> bool {
        self.set_terminal(TaskStatus::Succeeded, None)
    }

    /// Mark the task failed with `err`. Edge-triggered.
    pub fn fail(&self, err: impl Into<anyhow::Error>) -> bool {
        self.set_terminal(TaskStatus::Failed, Some(err.into()))
    }

    /// Explicitly cancel the task with `err`. Edge-triggered: sets status atomically if
    /// not yet terminal and closes the completion signal; already-dispatched RPCs are not
    /// aborted, their result is discarded because the task is terminal by the time it
    /// returns.
    pub fn cancel(&self, err: impl Into<anyhow::Error>) -> bool {
        self.set_terminal(TaskStatus::Canceled, Some(err.into()))
    }

    /// Cancel the task because its subject is no longer present in the next target.
    pub fn mark_stale(&self, err: impl Into<anyhow::Error>) -> bool {
        self.set_terminal(TaskStatus::Stale, Some(err.into()))
    }

    fn set_terminal(&self, status: TaskStatus, err: Option<anyhow::Error>) -> bool {
        debug_assert!(status.is_terminal());
        let mut state = self.state.lock().unwrap();
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        state.err = err.map(Arc::new);
        drop(state);
        let _ = self.status_tx.send(status);
        true
    }

    /// Block until the task reaches a terminal status or `timeout` elapses, whichever is
    /// first. A terminal status set before `wait` is called is observed immediately.
    pub async fn wait(&self, timeout: Duration) -> TaskStatus {
        let mut rx = self.status_tx.subscribe();
        if rx.borrow().is_terminal() {
            return *rx.borrow();
        }
        let watch_terminal = async {
            loop {
                if rx.changed().await.is_err() {
                    return *rx.borrow();
                }
                let status = *rx.borrow();
                if status.is_terminal() {
                    return status;
                }
            }
        };
        match tokio::time::timeout(timeout, watch_terminal).await {
            Ok(status) => status,
            Err(_) => self.status(),
        }
    }
}

/// Derive the task type from its action composition, enforcing per-type invariants.
fn classify(actions: &[Action]) -> Result<TaskKind, ParameterInvalid> {
    if actions.is_empty() {
        return Err(ParameterInvalid::EmptyActions);
    }
    let all_segment = actions.iter().all(|a| matches!(a, Action::Segment(_)));
    let all_channel = actions.iter().all(|a| matches!(a, Action::Channel(_)));
    let all_leader = actions.iter().all(|a| matches!(a, Action::Leader(_)));

    if all_channel {
        return classify_channel(actions);
    }
    if all_leader {
        if actions.len() != 1 {
            return Err(ParameterInvalid::TooManyActions);
        }
        return Ok(TaskKind::Leader);
    }
    if all_segment {
        return classify_segment(actions);
    }
    Err(ParameterInvalid::Heterogeneous)
}

/// A single action is a plain subscribe/unsubscribe. A pair is only valid as a Grow on
/// the new delegator node paired with a Reduce on the old one for the same channel: the
/// two-action shape used to balance a channel's delegator off a draining node.
fn classify_channel(actions: &[Action]) -> Result<TaskKind, ParameterInvalid> {
    match actions.len() {
        1 => Ok(TaskKind::Channel),
        2 => {
            let (Action::Channel(a), Action::Channel(b)) = (&actions[0], &actions[1]) else {
                unreachable!("classify_channel called on non-channel actions");
            };
            let is_balance = a.kind == ActionKind::Grow
                && b.kind == ActionKind::Reduce
                && a.node != b.node
                && a.channel == b.channel;
            if is_balance {
                Ok(TaskKind::ChannelBalance)
            } else {
                Err(ParameterInvalid::MalformedBalance)
            }
        }
        _ => Err(ParameterInvalid::TooManyActions),
    }
}

fn classify_segment(actions: &[Action]) -> Result<TaskKind, ParameterInvalid> {
    match actions.len() {
        1 => match actions[0].kind() {
            ActionKind::Grow => Ok(TaskKind::SegmentLoad),
            ActionKind::Reduce => Ok(TaskKind::SegmentRelease),
            ActionKind::Update => Err(ParameterInvalid::Heterogeneous),
        },
        2 => {
            let (Action::Segment(a), Action::Segment(b)) = (&actions[0], &actions[1]) else {
                unreachable!("classify_segment called on non-segment actions");
            };
            let is_move = a.kind == ActionKind::Grow
                && b.kind == ActionKind::Reduce
                && a.node != b.node
                && a.segment == b.segment;
            if is_move {
                Ok(TaskKind::SegmentMove)
            } else {
                Err(ParameterInvalid::MalformedMove)
            }
        }
        _ => Err(ParameterInvalid::TooManyActions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ChannelAction;
    use chrono::Duration as ChronoDuration;

    fn now() -> DateTime<Utc> {
        // Fixed instant: deterministic tests must not depend on wall-clock time.
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn classify_single_channel_action() {
        let actions = vec![Action::Channel(ChannelAction {
            node: 1,
            kind: ActionKind::Grow,
            channel: "ch-0".into(),
        })];
        let task = Task::new(1, "test", 10, None, Priority::Normal, now(), actions, now()).unwrap();
        assert_eq!(task.kind, TaskKind::Channel);
        assert_eq!(task.status(), TaskStatus::Created);
    }

    #[test]
    fn empty_actions_rejected() {
        let err = Task::new(1, "test", 10, None, Priority::Normal, now(), vec![], now());
        assert!(matches!(err, Err(ParameterInvalid::EmptyActions)));
    }

    #[tokio::test]
    async fn wait_observes_terminal_status_set_before_call() {
        let actions = vec![Action::Channel(ChannelAction {
            node: 1,
            kind: ActionKind::Grow,
            channel: "ch-0".into(),
        })];
        let task = Task::new(1, "test", 10, None, Priority::Normal, now(), actions, now()).unwrap();
        assert!(task.succeed());
        let status = task.wait(Duration::from_millis(50)).await;
        assert_eq!(status, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn wait_times_out_on_non_terminal_task() {
        let actions = vec![Action::Channel(ChannelAction {
            node: 1,
            kind: ActionKind::Grow,
            channel: "ch-0".into(),
        })];
        let task = Task::new(1, "test", 10, None, Priority::Normal, now(), actions, now()).unwrap();
        let status = task.wait(Duration::from_millis(10)).await;
        assert_eq!(status, TaskStatus::Created);
    }

    #[test]
    fn cancel_is_edge_triggered() {
        let actions = vec![Action::Channel(ChannelAction {
            node: 1,
            kind: ActionKind::Grow,
            channel: "ch-0".into(),
        })];
        let task = Task::new(1, "test", 10, None, Priority::Normal, now(), actions, now()).unwrap();
        assert!(task.fail(anyhow::anyhow!("boom")));
        assert!(!task.cancel(anyhow::anyhow!("too late")));
        assert_eq!(task.status(), TaskStatus::Failed);
    }

    #[test]
    fn deadline_field_is_independent_of_created_at() {
        let deadline = now() + ChronoDuration::seconds(30);
        let actions = vec![Action::Channel(ChannelAction {
            node: 1,
            kind: ActionKind::Grow,
            channel: "ch-0".into(),
        })];
        let task = Task::new(1, "test", 10, None, Priority::Normal, deadline, actions, now()).unwrap();
        assert!(task.deadline > task.created_at);
    }
}
