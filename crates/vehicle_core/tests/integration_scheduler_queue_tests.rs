//! Queue admission and eviction with real task types.

use vehicle_core::scheduler::{Priority, TaskQueue, MAX_TASKS};
use vehicle_core::tasks::{MqttKeepAliveTask, MqttPublishTask, NetTask};

fn publish_task() -> Box<dyn NetTask> {
    Box::new(MqttPublishTask::new("/telemetry/BIK_TEST", vec![1, 2, 3]))
}

#[test]
fn eviction_replaces_the_tail_and_keeps_order() {
    let mut queue = TaskQueue::default();

    // Fill to capacity: [3,3,2,2,1 x 15, 0].
    queue.enqueue(publish_task(), Priority::Critical);
    queue.enqueue(publish_task(), Priority::Critical);
    queue.enqueue(publish_task(), Priority::High);
    queue.enqueue(publish_task(), Priority::High);
    for _ in 0..15 {
        queue.enqueue(publish_task(), Priority::Normal);
    }
    queue.enqueue(Box::new(MqttKeepAliveTask::new()), Priority::Low);
    assert_eq!(queue.len(), MAX_TASKS);

    // New Normal outranks the Low tail: tail evicted, inserted before the
    // first lower-priority element, still sorted, still exactly full.
    assert!(queue.enqueue(publish_task(), Priority::Normal));
    let priorities = queue.priorities();
    assert_eq!(priorities.len(), MAX_TASKS);
    assert!(priorities.windows(2).all(|w| w[0] >= w[1]));
    assert!(!priorities.contains(&Priority::Low));
    assert_eq!(
        priorities.iter().filter(|p| **p == Priority::Normal).count(),
        16
    );
}

#[test]
fn critical_is_always_admitted_into_a_full_queue() {
    let mut queue = TaskQueue::default();
    for _ in 0..MAX_TASKS {
        queue.enqueue(publish_task(), Priority::Normal);
    }
    assert!(queue.enqueue(publish_task(), Priority::Critical));
    assert_eq!(queue.priorities()[0], Priority::Critical);
    assert_eq!(queue.len(), MAX_TASKS);
}

#[test]
fn equal_priority_into_a_full_queue_is_rejected_unchanged() {
    let mut queue = TaskQueue::default();
    for _ in 0..MAX_TASKS {
        queue.enqueue(publish_task(), Priority::Normal);
    }
    let before = queue.priorities();
    assert!(!queue.enqueue(publish_task(), Priority::Normal));
    assert_eq!(queue.priorities(), before);
}

#[test]
fn a_full_critical_queue_rejects_even_critical() {
    let mut queue = TaskQueue::default();
    for _ in 0..MAX_TASKS {
        queue.enqueue(publish_task(), Priority::Critical);
    }
    assert!(!queue.enqueue(publish_task(), Priority::Critical));
    assert_eq!(queue.len(), MAX_TASKS);
}
