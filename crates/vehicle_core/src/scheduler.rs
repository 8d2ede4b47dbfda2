//! Priority scheduler for network tasks.
//!
//! Bounded queue, always sorted by priority (descending; ties keep insertion
//! order). Only the head task ever runs, one `execute` per loop iteration.
//! There is deliberately no fairness: low-priority entries are filler
//! maintenance that the loop re-enqueues anyway, so starving them is free.

use bevy_ecs::prelude::Resource;
use tracing::{debug, trace};

use crate::tasks::{NetTask, TaskCtx};

/// Queue capacity.
pub const MAX_TASKS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Droppable filler (keep-alive, HTTP pump).
    Low = 0,
    Normal = 1,
    High = 2,
    /// Must not be dropped: alerts, validate/terminate.
    Critical = 3,
}

struct ScheduledTask {
    task: Box<dyn NetTask>,
    priority: Priority,
}

/// The bounded, sorted task queue.
#[derive(Default, Resource)]
pub struct TaskQueue {
    slots: Vec<ScheduledTask>,
}

impl TaskQueue {
    /// Enqueue with eviction. When the queue is full, the new task is
    /// admitted only if it outranks the lowest-priority (tail) entry, which
    /// is then destroyed; otherwise the new task is dropped.
    ///
    /// Returns whether the task was admitted.
    pub fn enqueue(&mut self, task: Box<dyn NetTask>, priority: Priority) -> bool {
        if self.slots.len() >= MAX_TASKS {
            let lowest = self.slots.last().map(|s| s.priority).unwrap_or(Priority::Low);
            if priority <= lowest {
                debug!(label = task.label(), ?priority, "queue full, dropping new task");
                return false;
            }
            let evicted = self.slots.pop();
            if let Some(evicted) = evicted {
                debug!(
                    label = evicted.task.label(),
                    priority = ?evicted.priority,
                    "queue full, evicting tail task"
                );
            }
        }
        self.insert_sorted(task, priority);
        true
    }

    /// Enqueue only if a slot is free; never evicts. For filler maintenance.
    pub fn enqueue_if_space(&mut self, task: Box<dyn NetTask>, priority: Priority) -> bool {
        if self.slots.len() >= MAX_TASKS {
            trace!(label = task.label(), "queue full, skipping filler task");
            return false;
        }
        self.insert_sorted(task, priority);
        true
    }

    /// Run exactly one tick of the head task; retire it when completed.
    pub fn step(&mut self, ctx: &mut TaskCtx<'_>) {
        let Some(current) = self.slots.first_mut() else {
            return;
        };

        current.task.execute(ctx);

        if current.task.is_completed() {
            debug!(
                label = current.task.label(),
                priority = ?current.priority,
                "task completed"
            );
            self.slots.remove(0);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        !self.slots.is_empty()
    }

    /// True if any queued task has at least the given priority.
    pub fn has_pending_at_least(&self, min: Priority) -> bool {
        self.slots.iter().any(|s| s.priority >= min)
    }

    /// Priorities from head to tail (diagnostics and invariant tests).
    pub fn priorities(&self) -> Vec<Priority> {
        self.slots.iter().map(|s| s.priority).collect()
    }

    /// Labels from head to tail.
    pub fn labels(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.task.label()).collect()
    }

    fn insert_sorted(&mut self, task: Box<dyn NetTask>, priority: Priority) {
        let position = self
            .slots
            .iter()
            .position(|s| priority > s.priority)
            .unwrap_or(self.slots.len());
        self.slots.insert(position, ScheduledTask { task, priority });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{NetTask, TaskState};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Completes after a configurable number of ticks.
    struct CountdownTask {
        ticks_left: u32,
        state: TaskState,
    }

    impl CountdownTask {
        fn new(ticks: u32) -> Box<dyn NetTask> {
            Box::new(Self {
                ticks_left: ticks,
                state: TaskState::default(),
            })
        }
    }

    impl NetTask for CountdownTask {
        fn label(&self) -> &'static str {
            "countdown"
        }

        fn execute(&mut self, ctx: &mut TaskCtx<'_>) {
            self.state.mark_started(ctx.now_ms);
            self.ticks_left = self.ticks_left.saturating_sub(1);
            if self.ticks_left == 0 {
                self.state.mark_completed();
            }
        }

        fn is_started(&self) -> bool {
            self.state.is_started()
        }

        fn is_completed(&self) -> bool {
            self.state.is_completed()
        }

        fn start_ms(&self) -> u64 {
            self.state.start_ms()
        }
    }

    fn assert_sorted(queue: &TaskQueue) {
        let priorities = queue.priorities();
        assert!(
            priorities.windows(2).all(|w| w[0] >= w[1]),
            "queue not sorted: {priorities:?}"
        );
        assert!(queue.len() <= MAX_TASKS);
    }

    #[test]
    fn inserts_keep_priority_order_with_stable_ties() {
        let mut queue = TaskQueue::default();
        queue.enqueue(CountdownTask::new(1), Priority::Normal);
        queue.enqueue(CountdownTask::new(1), Priority::Critical);
        queue.enqueue(CountdownTask::new(1), Priority::Low);
        queue.enqueue(CountdownTask::new(1), Priority::Normal);
        queue.enqueue(CountdownTask::new(1), Priority::High);

        assert_eq!(
            queue.priorities(),
            vec![
                Priority::Critical,
                Priority::High,
                Priority::Normal,
                Priority::Normal,
                Priority::Low
            ]
        );
        assert_sorted(&queue);
    }

    #[test]
    fn full_queue_evicts_tail_only_for_higher_priority() {
        let mut queue = TaskQueue::default();
        // Fill: priorities [3,3,2,2,1,...,1,0].
        queue.enqueue(CountdownTask::new(1), Priority::Critical);
        queue.enqueue(CountdownTask::new(1), Priority::Critical);
        queue.enqueue(CountdownTask::new(1), Priority::High);
        queue.enqueue(CountdownTask::new(1), Priority::High);
        for _ in 0..15 {
            queue.enqueue(CountdownTask::new(1), Priority::Normal);
        }
        queue.enqueue(CountdownTask::new(1), Priority::Low);
        assert_eq!(queue.len(), MAX_TASKS);

        // Equal to the minimum: rejected, queue unchanged.
        let before = queue.priorities();
        assert!(!queue.enqueue(CountdownTask::new(1), Priority::Low));
        assert_eq!(queue.priorities(), before);

        // Higher than the minimum: tail Low evicted, new High in place.
        assert!(queue.enqueue(CountdownTask::new(1), Priority::High));
        assert_eq!(queue.len(), MAX_TASKS);
        let priorities = queue.priorities();
        assert_eq!(priorities[2..5], [Priority::High, Priority::High, Priority::High]);
        assert!(!priorities.contains(&Priority::Low));
        assert_sorted(&queue);
    }

    #[test]
    fn enqueue_if_space_never_evicts() {
        let mut queue = TaskQueue::default();
        for _ in 0..MAX_TASKS {
            assert!(queue.enqueue_if_space(CountdownTask::new(1), Priority::Normal));
        }
        assert!(!queue.enqueue_if_space(CountdownTask::new(1), Priority::Critical));
        assert_eq!(queue.len(), MAX_TASKS);
    }

    #[test]
    fn step_runs_only_the_head_and_retires_completed_tasks() {
        let mut queue = TaskQueue::default();
        queue.enqueue(CountdownTask::new(3), Priority::High);
        queue.enqueue(CountdownTask::new(1), Priority::Low);

        let config = crate::boot::VehicleConfig::for_bike("BIK_T");
        let mut transport = crate::test_helpers::loopback_transport();
        let mut rental = crate::rental::RentalState::default();
        let mut nav = crate::geo::NavState::default();
        let mut ui = crate::ui::UiState::default();

        for tick in 0..3 {
            let mut ctx = TaskCtx {
                now_ms: tick * 10,
                now_unix_ms: None,
                config: &config,
                transport: &mut transport,
                rental: &mut rental,
                nav: &mut nav,
                ui: &mut ui,
            };
            queue.step(&mut ctx);
        }
        // Head needed 3 ticks; the Low filler has not run at all yet.
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.priorities(), vec![Priority::Low]);
    }

    #[test]
    fn random_operation_sequences_preserve_invariants() {
        let mut rng = StdRng::seed_from_u64(0xC0FFEE);
        let mut queue = TaskQueue::default();

        let config = crate::boot::VehicleConfig::for_bike("BIK_T");
        let mut transport = crate::test_helpers::loopback_transport();
        let mut rental = crate::rental::RentalState::default();
        let mut nav = crate::geo::NavState::default();
        let mut ui = crate::ui::UiState::default();

        for step in 0..2_000u64 {
            let priority = match rng.gen_range(0..4) {
                0 => Priority::Low,
                1 => Priority::Normal,
                2 => Priority::High,
                _ => Priority::Critical,
            };
            match rng.gen_range(0..3) {
                0 => {
                    queue.enqueue(CountdownTask::new(rng.gen_range(1..4)), priority);
                }
                1 => {
                    queue.enqueue_if_space(CountdownTask::new(1), priority);
                }
                _ => {
                    let mut ctx = TaskCtx {
                        now_ms: step,
                        now_unix_ms: None,
                        config: &config,
                        transport: &mut transport,
                        rental: &mut rental,
                        nav: &mut nav,
                        ui: &mut ui,
                    };
                    queue.step(&mut ctx);
                }
            }
            assert_sorted(&queue);
        }
    }
}
