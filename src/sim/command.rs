//! Deferred cross-entity mutations
//!
//! Tasks and coordinators only get shared access to the rest of the world.
//! Anything they want to change elsewhere is queued here and applied by the
//! world immediately after the update that produced it, within the same tick.

use crate::sim::entity::EntityId;
use crate::sim::formation::FormationId;
use crate::sim::task::Task;
use crate::util::vec2::Vec2;

#[derive(Debug)]
pub enum Command {
    /// Append a task to an entity's queue
    AddTask { entity: EntityId, task: Task },
    /// Drop an entity's pending tasks and exit its current one
    ClearTasks { entity: EntityId },
    /// One strike from `source` against `target`
    Damage {
        source: EntityId,
        target: EntityId,
        amount: f32,
    },
    /// Point an entity's follow tasks at a new slot offset
    RefreshFollowOffset { entity: EntityId, offset: Vec2 },
    StartFormationCombat {
        formation: FormationId,
        target: FormationId,
    },
    StopFormationCombat { formation: FormationId },
}

#[derive(Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn add_task(&mut self, entity: EntityId, task: impl Into<Task>) {
        self.push(Command::AddTask {
            entity,
            task: task.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Take everything queued so far, leaving the buffer empty
    pub fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }
}
