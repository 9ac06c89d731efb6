use std::sync::Arc;

use super::now;
use super::Harness;
use crate::action::Action;
use crate::action::ActionKind;
use crate::action::ChannelAction;
use crate::task::Priority;
use crate::task::Task;
use crate::task::TaskKind;
use crate::task::TaskStatus;

fn balance_task(h: &mut Harness, channel: &str, new_node: i64, old_node: i64) -> Arc<Task> {
    let id = h.next_id();
    let actions = vec![
        Action::Channel(ChannelAction {
            node: new_node,
            kind: ActionKind::Grow,
            channel: channel.to_string(),
        }),
        Action::Channel(ChannelAction {
            node: old_node,
            kind: ActionKind::Reduce,
            channel: channel.to_string(),
        }),
    ];
    Arc::new(Task::new(id, "test", 10, None, Priority::Normal, h.far_deadline(), actions, now()).unwrap())
}

#[tokio::test]
async fn balance_channel_delegator_three_tick_progression() {
    let mut h = Harness::new();
    // Channel is already served by its old delegator; the new delegator hasn't taken
    // over yet, so no serviceable delegator is currently known for the grow half.
    h.distribution.add_channel(2, "ch-0");
    h.target.add_channel(10, "ch-0");
    h.scheduler.add_executor(1);
    h.scheduler.add_executor(2);

    let task = balance_task(&mut h, "ch-0", 1, 2);
    assert_eq!(task.kind, TaskKind::ChannelBalance);
    h.scheduler.add(task.clone()).unwrap();

    // Step 0: new delegator not serviceable yet, dispatch never hands the grow action
    // to its executor.
    h.scheduler.dispatch(1);
    h.settle().await;
    assert_eq!(task.step(), 0);
    assert_eq!(h.scheduler.queue_lengths(), (0, 1));

    // New delegator becomes serviceable: dispatch can now proceed.
    h.distribution.set_delegator("ch-0", 1);
    h.distribution.set_serviceable(1, true);
    h.scheduler.dispatch(1);
    h.settle().await;
    assert_eq!(h.scheduler.queue_lengths(), (1, 0));

    // The subscribe RPC lands: node 1 now carries the channel.
    h.distribution.add_channel(1, "ch-0");
    h.scheduler.process();
    assert_eq!(task.step(), 1);

    // Old delegator's view still carries the channel: the reduce half isn't finished.
    h.scheduler.process();
    assert_eq!(task.step(), 1);
    assert_eq!(task.status(), TaskStatus::Started);

    // Old delegator's view drops the channel: the reduce half finishes and the task
    // succeeds with no more actions left to advance through.
    h.distribution.remove_channel(2, "ch-0");
    h.scheduler.process();
    assert_eq!(task.status(), TaskStatus::Succeeded);
    assert_eq!(h.scheduler.queue_lengths(), (0, 0));
}
