use super::Harness;
use crate::error::Duplicate;
use crate::error::Preempted;
use crate::task::Priority;
use crate::task::TaskStatus;

#[tokio::test]
async fn priority_preempt_replaces_incumbent() {
    let mut h = Harness::new();

    let normal1 = h.channel_grow_task(10, 3, "sub-0", Priority::Normal);
    h.scheduler.add(normal1.clone()).unwrap();
    assert_eq!(h.scheduler.get_channel_task_delta(3, 10), 1);

    let normal2 = h.channel_grow_task(10, 3, "sub-0", Priority::Normal);
    let err = h.scheduler.add(normal2.clone()).unwrap_err();
    assert!(err.downcast_ref::<Duplicate>().is_some());
    assert_eq!(normal2.status(), TaskStatus::Canceled);
    assert_eq!(normal1.status(), TaskStatus::Created);
    assert_eq!(h.scheduler.get_channel_task_delta(3, 10), 1);

    let high = h.channel_grow_task(10, 3, "sub-0", Priority::High);
    h.scheduler.add(high.clone()).unwrap();
    assert_eq!(normal1.status(), TaskStatus::Canceled);
    assert!(normal1.err().unwrap().downcast_ref::<Preempted>().is_some());
    assert_eq!(high.status(), TaskStatus::Created);
    assert_eq!(h.scheduler.get_channel_task_delta(3, 10), 1);
    assert_eq!(h.scheduler.queue_lengths(), (0, 1));
}
