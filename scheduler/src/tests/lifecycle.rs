use std::time::Duration;

use super::Harness;
use crate::task::Priority;
use crate::task::TaskStatus;

#[tokio::test(flavor = "multi_thread")]
async fn tick_loop_drives_a_task_to_completion_without_manual_dispatch() {
    let mut h = Harness::new();
    h.distribution.set_delegator("sub-0", 9);
    h.distribution.set_serviceable(9, true);
    h.scheduler.add_executor(3);
    h.scheduler.start();
    h.scheduler.start(); // idempotent

    let task = h.channel_grow_task(10, 3, "sub-0", Priority::Normal);
    h.scheduler.add(task.clone()).unwrap();

    // Simulate the node heartbeat landing shortly after dispatch.
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.distribution.add_channel(3, "sub-0");

    let status = task.wait(Duration::from_secs(2)).await;
    assert_eq!(status, TaskStatus::Succeeded);

    h.scheduler.stop().await;
    h.scheduler.stop().await; // idempotent
}
