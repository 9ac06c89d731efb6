use std::sync::Arc;

use super::now;
use super::Harness;
use crate::action::Action;
use crate::action::ActionKind;
use crate::action::SegmentAction;
use crate::task::Priority;
use crate::task::Task;
use crate::task::TaskStatus;
use shardctl_collab::target::Target;
use shardctl_collab::SegmentScope;

fn historical_move(h: &mut Harness, channel: &str, segment: i64, from: i64, to: i64) -> Arc<Task> {
    let id = h.next_id();
    let actions = vec![
        Action::Segment(SegmentAction {
            node: to,
            kind: ActionKind::Grow,
            channel: channel.to_string(),
            segment,
            scope: SegmentScope::Historical,
            rows: Some(10),
        }),
        Action::Segment(SegmentAction {
            node: from,
            kind: ActionKind::Reduce,
            channel: channel.to_string(),
            segment,
            scope: SegmentScope::Historical,
            rows: Some(10),
        }),
    ];
    Arc::new(Task::new(id, "test", 10, None, Priority::Normal, h.far_deadline(), actions, now()).unwrap())
}

#[tokio::test]
async fn move_segment_with_late_delegator() {
    let mut h = Harness::new();
    h.target.add_segment(10, 5);
    h.distribution.set_delegator("ch-0", 1);
    h.scheduler.add_executor(2);
    h.scheduler.add_executor(3);

    let task = historical_move(&mut h, "ch-0", 5, 2, 3);
    h.scheduler.add(task.clone()).unwrap();

    h.scheduler.dispatch(3);
    h.settle().await;
    assert_eq!(task.step(), 0);
    assert_eq!(task.shard_leader(), Some(1));

    // Segment physically lands on the new node, but the delegator leader view hasn't
    // caught up yet: the grow half is not finished.
    h.distribution.add_segment(3, 5);
    h.scheduler.process();
    assert_eq!(task.step(), 0);

    h.distribution.set_serviceable(1, true);
    h.distribution.set_leader_segment(1, 5, 0);
    h.scheduler.process();
    h.settle().await;
    assert_eq!(task.step(), 1);

    h.distribution.remove_segment(2, 5);
    h.scheduler.process();
    assert_eq!(task.step(), 1);

    h.distribution.remove_leader_segment(1, 5);
    h.scheduler.process();

    assert_eq!(task.status(), TaskStatus::Succeeded);
    assert_eq!(h.scheduler.queue_lengths(), (0, 0));
}

#[tokio::test]
async fn move_segment_stale_target_rejected_at_admission() {
    let mut h = Harness::new();
    h.distribution.set_delegator("ch-0", 1);
    h.scheduler.add_executor(2);
    h.scheduler.add_executor(3);

    // The segment was in the next target when it got promoted to the current (serving)
    // target, but a later next-target recompute drops it: it's still being served, just
    // no longer where the system wants it to stay, which is exactly what "stale" means.
    h.target.add_segment(10, 5);
    h.target.update_current_target(10).await.unwrap();
    h.target.remove_segment(10, 5);
    assert!(h.target.current_has_segment(10, 5));

    let task = historical_move(&mut h, "ch-0", 5, 2, 3);
    let err = h.scheduler.add(task.clone()).unwrap_err();
    assert!(err.downcast_ref::<crate::error::Stale>().is_some());
    assert_eq!(task.status(), TaskStatus::Stale);
    assert_eq!(h.scheduler.queue_lengths(), (0, 0));
}
