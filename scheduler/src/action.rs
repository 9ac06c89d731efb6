//! Actions: the smallest unit of scheduled work, "node N grow/reduce shard S on channel C".
use shardctl_collab::distribution::Distribution;
use shardctl_collab::NodeId;
use shardctl_collab::SegmentId;
use shardctl_collab::SegmentScope;

/// Direction of an action: bring a subject onto a node, take it off, or refresh a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Grow,
    Reduce,
    Update,
}

/// Grow/reduce a segment's presence on a node.
#[derive(Debug, Clone)]
pub struct SegmentAction {
    pub node: NodeId,
    pub kind: ActionKind,
    pub channel: String,
    pub segment: SegmentId,
    pub scope: SegmentScope,
    pub rows: Option<i64>,
}

/// Subscribe/unsubscribe a node to a channel.
#[derive(Debug, Clone)]
pub struct ChannelAction {
    pub node: NodeId,
    pub kind: ActionKind,
    pub channel: String,
}

/// Sync a delegator leader's view of a segment to an intended presence and version.
#[derive(Debug, Clone)]
pub struct LeaderAction {
    pub node: NodeId,
    pub kind: ActionKind,
    pub leader: NodeId,
    pub channel: String,
    pub segment: SegmentId,
    pub version: u64,
}

/// Immutable unit of work issued to one node. Carries its own `step` index into the
/// owning task's action list.
#[derive(Debug, Clone)]
pub enum Action {
    Segment(SegmentAction),
    Channel(ChannelAction),
    Leader(LeaderAction),
}

/// Identifies a mutually-exclusive slot in an [`crate::executor::Executor`]'s in-flight
/// set. Two actions with the same key must never run concurrently on the same node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionKey {
    family: ActionFamily,
    channel: String,
    segment: Option<SegmentId>,
    kind: ActionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ActionFamily {
    Segment,
    Channel,
    Leader,
}

impl Action {
    /// The node this action is addressed to.
    pub fn node(&self) -> NodeId {
        match self {
            Action::Segment(a) => a.node,
            Action::Channel(a) => a.node,
            Action::Leader(a) => a.node,
        }
    }

    /// The action's direction: grow, reduce or update.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Segment(a) => a.kind,
            Action::Channel(a) => a.kind,
            Action::Leader(a) => a.kind,
        }
    }

    /// The channel this action concerns.
    pub fn channel(&self) -> &str {
        match self {
            Action::Segment(a) => &a.channel,
            Action::Channel(a) => &a.channel,
            Action::Leader(a) => &a.channel,
        }
    }

    /// The mutual-exclusion key this action occupies on its node's executor.
    pub fn key(&self) -> ActionKey {
        match self {
            Action::Segment(a) => ActionKey {
                family: ActionFamily::Segment,
                channel: a.channel.clone(),
                segment: Some(a.segment),
                kind: a.kind,
            },
            Action::Channel(a) => ActionKey {
                family: ActionFamily::Channel,
                channel: a.channel.clone(),
                segment: None,
                kind: a.kind,
            },
            Action::Leader(a) => ActionKey {
                family: ActionFamily::Leader,
                channel: a.channel.clone(),
                segment: Some(a.segment),
                kind: a.kind,
            },
        }
    }

    /// Whether the distribution now reflects the state this action intends to bring
    /// about. Completion of an action is purely a function of observed distribution,
    /// never of RPC return.
    pub fn is_finished(&self, dist: &dyn Distribution) -> bool {
        match self {
            Action::Segment(a) => segment_action_finished(a, dist),
            Action::Channel(a) => channel_action_finished(a, dist),
            Action::Leader(a) => leader_action_finished(a, dist),
        }
    }
}

fn segment_action_finished(a: &SegmentAction, dist: &dyn Distribution) -> bool {
    let on_node = dist.segment_on_node(a.node, a.segment);
    let historical = matches!(a.scope, SegmentScope::Historical);
    match a.kind {
        ActionKind::Grow | ActionKind::Update => {
            if !on_node {
                return false;
            }
            if !historical {
                return true;
            }
            match dist.channel_delegator(&a.channel) {
                Some(leader) => dist.leader_serviceable(leader) && dist.leader_has_segment(leader, a.segment, 0),
                None => false,
            }
        }
        ActionKind::Reduce => {
            if on_node {
                return false;
            }
            if !historical {
                return true;
            }
            match dist.channel_delegator(&a.channel) {
                Some(leader) => !dist.leader_has_segment(leader, a.segment, 0),
                None => true,
            }
        }
    }
}

fn channel_action_finished(a: &ChannelAction, dist: &dyn Distribution) -> bool {
    let on_node = dist.channel_on_node(a.node, &a.channel);
    match a.kind {
        ActionKind::Grow | ActionKind::Update => {
            on_node
                && dist
                    .channel_delegator(&a.channel)
                    .map(|leader| dist.leader_serviceable(leader))
                    .unwrap_or(false)
        }
        ActionKind::Reduce => !on_node,
    }
}

fn leader_action_finished(a: &LeaderAction, dist: &dyn Distribution) -> bool {
    match a.kind {
        ActionKind::Grow | ActionKind::Update => dist.leader_has_segment(a.leader, a.segment, a.version),
        ActionKind::Reduce => !dist.leader_has_segment(a.leader, a.segment, 0),
    }
}
