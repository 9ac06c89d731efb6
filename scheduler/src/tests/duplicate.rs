use super::Harness;
use crate::error::Duplicate;
use crate::task::Priority;
use crate::task::TaskStatus;

#[tokio::test]
async fn duplicate_subscribe_rejected_at_same_priority() {
    let mut h = Harness::new();
    h.distribution.set_delegator("sub-0", 9);
    h.distribution.set_serviceable(9, true);
    h.scheduler.add_executor(3);

    let incumbent = h.channel_grow_task(10, 3, "sub-0", Priority::Normal);
    h.scheduler.add(incumbent.clone()).unwrap();

    let duplicate = h.channel_grow_task(10, 3, "sub-0", Priority::Normal);
    let err = h.scheduler.add(duplicate.clone()).unwrap_err();
    assert!(err.downcast_ref::<Duplicate>().is_some());

    assert_eq!(duplicate.status(), TaskStatus::Canceled);
    assert_eq!(incumbent.status(), TaskStatus::Created);
    assert_eq!(h.scheduler.queue_lengths(), (0, 1));
}
