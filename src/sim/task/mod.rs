//! Cooperative task scheduling
//!
//! A task is one step of behavior with a fixed lifecycle: it becomes current
//! when it reaches the head of its queue, runs `execute` once if
//! `can_execute` holds, is polled through `is_complete` every tick, and gets
//! exactly one `on_exit` before it is dropped. Neither `execute` nor
//! `is_complete` may block.

mod basic;
mod formation;
mod queue;

pub use basic::{ActionTask, CombatTask, MoveTask};
pub use formation::{FormationCombatTask, FormationFollowTask, FormationMoveTask};
pub use queue::TaskQueue;

use crate::sim::command::CommandBuffer;
use crate::sim::combat::CombatStats;
use crate::sim::entity::{EntityId, EntityStore};
use crate::sim::formation::{FormationId, FormationStore};
use crate::sim::state::BehaviorState;
use serde::Serialize;
use std::fmt;

/// Who owns the queue being advanced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOwner {
    Entity(EntityId),
    Formation(FormationId),
}

/// Read-only view of the world plus a command sink, handed to every task call
pub struct TaskContext<'a> {
    /// Simulation clock in seconds
    pub now: f64,
    pub owner: TaskOwner,
    /// Combat stats of the owning entity, if it has any
    pub owner_combat: Option<&'a CombatStats>,
    pub entities: &'a EntityStore,
    pub formations: &'a FormationStore,
    pub commands: &'a mut CommandBuffer,
}

impl TaskContext<'_> {
    pub fn owner_entity(&self) -> Option<EntityId> {
        match self.owner {
            TaskOwner::Entity(id) => Some(id),
            TaskOwner::Formation(_) => None,
        }
    }

    pub fn owner_formation(&self) -> Option<FormationId> {
        match self.owner {
            TaskOwner::Formation(id) => Some(id),
            TaskOwner::Entity(_) => None,
        }
    }
}

/// Capability set every task implements
pub trait TaskBehavior {
    fn can_execute(&self, state: &BehaviorState, ctx: &TaskContext<'_>) -> bool;
    fn execute(&mut self, state: &mut BehaviorState, ctx: &mut TaskContext<'_>);
    fn is_complete(&mut self, state: &mut BehaviorState, ctx: &mut TaskContext<'_>) -> bool;
    fn on_exit(&mut self, state: &mut BehaviorState, ctx: &mut TaskContext<'_>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskKind {
    Move,
    Action,
    Combat,
    FormationMove,
    FormationFollow,
    FormationCombat,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Move => "move",
            TaskKind::Action => "action",
            TaskKind::Combat => "combat",
            TaskKind::FormationMove => "formation_move",
            TaskKind::FormationFollow => "formation_follow",
            TaskKind::FormationCombat => "formation_combat",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    Move(MoveTask),
    Action(ActionTask),
    Combat(CombatTask),
    FormationMove(FormationMoveTask),
    FormationFollow(FormationFollowTask),
    FormationCombat(FormationCombatTask),
}

macro_rules! dispatch {
    ($self:expr, $task:ident => $body:expr) => {
        match $self {
            Task::Move($task) => $body,
            Task::Action($task) => $body,
            Task::Combat($task) => $body,
            Task::FormationMove($task) => $body,
            Task::FormationFollow($task) => $body,
            Task::FormationCombat($task) => $body,
        }
    };
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::Move(_) => TaskKind::Move,
            Task::Action(_) => TaskKind::Action,
            Task::Combat(_) => TaskKind::Combat,
            Task::FormationMove(_) => TaskKind::FormationMove,
            Task::FormationFollow(_) => TaskKind::FormationFollow,
            Task::FormationCombat(_) => TaskKind::FormationCombat,
        }
    }
}

impl TaskBehavior for Task {
    fn can_execute(&self, state: &BehaviorState, ctx: &TaskContext<'_>) -> bool {
        dispatch!(self, task => task.can_execute(state, ctx))
    }

    fn execute(&mut self, state: &mut BehaviorState, ctx: &mut TaskContext<'_>) {
        dispatch!(self, task => task.execute(state, ctx))
    }

    fn is_complete(&mut self, state: &mut BehaviorState, ctx: &mut TaskContext<'_>) -> bool {
        dispatch!(self, task => task.is_complete(state, ctx))
    }

    fn on_exit(&mut self, state: &mut BehaviorState, ctx: &mut TaskContext<'_>) {
        dispatch!(self, task => task.on_exit(state, ctx))
    }
}

macro_rules! impl_from_task {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Task {
                fn from(task: $ty) -> Self {
                    Task::$variant(task)
                }
            }
        )*
    };
}

impl_from_task! {
    Move => MoveTask,
    Action => ActionTask,
    Combat => CombatTask,
    FormationMove => FormationMoveTask,
    FormationFollow => FormationFollowTask,
    FormationCombat => FormationCombatTask,
}
