use super::Harness;
use crate::error::Canceled;
use crate::task::TaskStatus;

#[tokio::test]
async fn cancel_mid_flight_ignores_in_flight_rpc_result() {
    let mut h = Harness::new();
    h.scheduler.add_executor(3);

    let task = h.segment_load_task(10, 3, "ch-0", 7);
    h.scheduler.add(task.clone()).unwrap();
    h.scheduler.dispatch(3);

    // Cancel before the spawned RPC has a chance to complete.
    assert!(task.cancel(Canceled("operator requested cancel".into())));
    h.settle().await;

    assert_eq!(task.status(), TaskStatus::Canceled);
    assert_eq!(
        task.err().unwrap().downcast_ref::<Canceled>().map(|e| e.0.clone()),
        Some("operator requested cancel".to_string())
    );

    h.scheduler.process();
    assert_eq!(h.scheduler.queue_lengths(), (0, 0));
    assert_eq!(h.scheduler.get_segment_task_delta(3, 10), 0);
}
