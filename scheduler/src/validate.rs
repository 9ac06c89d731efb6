//! Admission-time preconditions beyond structural validation: staleness against the
//! next target and delegator readiness for channel balancing.
use shardctl_collab::target::Target;

use crate::action::Action;
use crate::action::ActionKind;
use crate::error::Stale;
use crate::task::Task;
use crate::task::TaskKind;

/// Check that a task's subject is still present in the collection's next target, except
/// for pure-Reduce tasks, which are exempt regardless of target membership: releasing a
/// subject the target no longer wants is the expected case, not staleness.
pub fn check_staleness(target: &dyn Target, task: &Task) -> Result<(), Stale> {
    match task.kind {
        TaskKind::SegmentLoad | TaskKind::SegmentMove => {
            let grow = task
                .actions
                .iter()
                .find_map(|a| match a {
                    Action::Segment(s) if s.kind == ActionKind::Grow => Some(s),
                    _ => None,
                })
                .expect("load/move task always has a grow action");
            if target.next_target_has_segment(task.collection, grow.segment) {
                Ok(())
            } else {
                Err(Stale)
            }
        }
        TaskKind::SegmentRelease => Ok(()),
        TaskKind::Channel => match &task.actions[0] {
            Action::Channel(a) if a.kind != ActionKind::Reduce => {
                if target.next_target_has_channel(task.collection, &a.channel) {
                    Ok(())
                } else {
                    Err(Stale)
                }
            }
            _ => Ok(()),
        },
        TaskKind::ChannelBalance => {
            let grow = task
                .actions
                .iter()
                .find_map(|a| match a {
                    Action::Channel(c) if c.kind == ActionKind::Grow => Some(c),
                    _ => None,
                })
                .expect("channel balance task always has a grow action");
            if target.next_target_has_channel(task.collection, &grow.channel) {
                Ok(())
            } else {
                Err(Stale)
            }
        }
        TaskKind::Leader => Ok(()),
    }
}

/// Whether a channel-grow action's target node already hosts a serviceable delegator.
/// A task whose current action fails this check is left at step 0 and retried on a
/// later dispatch tick; this is not an admission error.
pub fn delegator_ready(distribution: &dyn shardctl_collab::distribution::Distribution, action: &Action) -> bool {
    match action {
        Action::Channel(a) if a.kind == ActionKind::Grow => distribution
            .channel_delegator(&a.channel)
            .map(|leader| distribution.leader_serviceable(leader))
            .unwrap_or(false),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ChannelAction;
    use crate::action::SegmentAction;
    use crate::task::Priority;
    use chrono::DateTime;
    use chrono::Utc;
    use shardctl_collab::distribution::fixture::MemoryDistribution;
    use shardctl_collab::target::fixture::MemoryTarget;
    use shardctl_collab::SegmentScope;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn grow_segment_stale_when_absent_from_next_target() {
        let target = MemoryTarget::new();
        let actions = vec![Action::Segment(SegmentAction {
            node: 1,
            kind: ActionKind::Grow,
            channel: "ch-0".into(),
            segment: 5,
            scope: SegmentScope::Streaming,
            rows: None,
        })];
        let task = Task::new(1, "t", 10, None, Priority::Normal, now(), actions, now()).unwrap();
        assert!(check_staleness(&target, &task).is_err());
        target.add_segment(10, 5);
        assert!(check_staleness(&target, &task).is_ok());
    }

    #[test]
    fn release_segment_is_never_stale() {
        let target = MemoryTarget::new();
        let actions = vec![Action::Segment(SegmentAction {
            node: 1,
            kind: ActionKind::Reduce,
            channel: "ch-0".into(),
            segment: 5,
            scope: SegmentScope::Streaming,
            rows: None,
        })];
        let task = Task::new(1, "t", 10, None, Priority::Normal, now(), actions, now()).unwrap();
        assert!(check_staleness(&target, &task).is_ok());
    }

    #[test]
    fn delegator_ready_requires_serviceable_leader() {
        let dist = MemoryDistribution::new();
        let action = Action::Channel(ChannelAction {
            node: 1,
            kind: ActionKind::Grow,
            channel: "ch-0".into(),
        });
        assert!(!delegator_ready(&dist, &action));
        dist.set_delegator("ch-0", 9);
        dist.set_serviceable(9, true);
        assert!(delegator_ready(&dist, &action));
    }
}
