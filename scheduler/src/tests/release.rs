use super::Harness;
use crate::task::TaskStatus;

#[tokio::test]
async fn release_growing_segment_retires_on_next_tick() {
    let mut h = Harness::new();
    h.distribution.add_segment(3, 3);
    h.distribution.add_segment(3, 4);
    h.scheduler.add_executor(3);

    let t0 = h.segment_release_task(10, 3, "ch-0", 3);
    let t1 = h.segment_release_task(10, 3, "ch-0", 4);
    h.scheduler.add(t0.clone()).unwrap();
    h.scheduler.add(t1.clone()).unwrap();

    h.scheduler.dispatch(3);
    h.settle().await;

    let calls = h.cluster.calls();
    assert_eq!(calls.len(), 2);

    // RPC acked but distribution hasn't caught up yet: not finished on this tick.
    h.scheduler.process();
    assert_eq!(h.scheduler.queue_lengths(), (2, 0));

    h.distribution.remove_segment(3, 3);
    h.distribution.remove_segment(3, 4);
    h.scheduler.process();

    assert_eq!(h.scheduler.queue_lengths(), (0, 0));
    assert_eq!(t0.status(), TaskStatus::Succeeded);
    assert_eq!(t1.status(), TaskStatus::Succeeded);
}
