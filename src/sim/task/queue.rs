use super::{Task, TaskBehavior, TaskContext, TaskKind};
use crate::sim::state::BehaviorState;
use std::collections::VecDeque;
use tracing::trace;

/// FIFO of pending tasks plus at most one current task.
///
/// A head task whose `can_execute` is false still becomes current but is
/// never executed; it keeps being polled through `is_complete`. Callers must
/// only enqueue tasks whose precondition will eventually hold.
#[derive(Debug, Default)]
pub struct TaskQueue {
    pending: VecDeque<Task>,
    current: Option<Task>,
    started: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, task: impl Into<Task>) {
        self.pending.push_back(task.into());
    }

    /// Advance the queue by one tick. Returns the kind of task that started executing, if any.
    pub fn update(&mut self, state: &mut BehaviorState, ctx: &mut TaskContext<'_>) -> Option<TaskKind> {
        let advance = match self.current.as_mut() {
            None => true,
            Some(task) => task.is_complete(state, ctx),
        };

        let mut started = None;
        if advance {
            if let Some(mut finished) = self.current.take() {
                trace!("Task {} finished", finished.kind());
                finished.on_exit(state, ctx);
            }

            if let Some(mut next) = self.pending.pop_front() {
                if next.can_execute(state, ctx) {
                    next.execute(state, ctx);
                    self.started += 1;
                    started = Some(next.kind());
                } else {
                    trace!("Task {} not ready, parked as current", next.kind());
                }
                self.current = Some(next);
            }
        }

        state.is_complete = self.is_empty();
        started
    }

    /// Drop pending work and exit the current task
    pub fn clear_tasks(&mut self, state: &mut BehaviorState, ctx: &mut TaskContext<'_>) {
        self.pending.clear();
        if let Some(mut current) = self.current.take() {
            current.on_exit(state, ctx);
        }
        state.is_complete = true;
    }

    /// No current task and nothing pending
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn current(&self) -> Option<&Task> {
        self.current.as_ref()
    }

    pub fn current_kind(&self) -> Option<TaskKind> {
        self.current.as_ref().map(Task::kind)
    }

    /// Current task first, then pending tasks in order
    pub fn tasks_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.current.iter_mut().chain(self.pending.iter_mut())
    }

    /// Tasks that have executed over the queue's lifetime
    pub fn started_count(&self) -> u64 {
        self.started
    }
}
