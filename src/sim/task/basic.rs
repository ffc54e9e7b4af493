use super::{TaskBehavior, TaskContext};
use crate::constants::task::{ARRIVAL_TOLERANCE, TIME_EPSILON};
use crate::sim::command::Command;
use crate::sim::entity::EntityId;
use crate::sim::state::BehaviorState;
use crate::util::vec2::Vec2;

// ============================================================================
// Move
// ============================================================================

/// Walk to a fixed point; integration happens in the world tick
#[derive(Debug, Clone, PartialEq)]
pub struct MoveTask {
    target: Vec2,
    speed: f32,
}

impl MoveTask {
    pub fn new(target: Vec2, speed: f32) -> Self {
        Self { target, speed }
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }
}

impl TaskBehavior for MoveTask {
    fn can_execute(&self, state: &BehaviorState, _ctx: &TaskContext<'_>) -> bool {
        !state.is_acting
    }

    fn execute(&mut self, state: &mut BehaviorState, _ctx: &mut TaskContext<'_>) {
        state.is_moving = true;
        state.target = self.target;
        state.move_speed = self.speed;
    }

    fn is_complete(&mut self, state: &mut BehaviorState, _ctx: &mut TaskContext<'_>) -> bool {
        state.position().distance_to(self.target) < ARRIVAL_TOLERANCE
    }

    fn on_exit(&mut self, state: &mut BehaviorState, _ctx: &mut TaskContext<'_>) {
        state.is_moving = false;
        state.move_speed = 0.0;
    }
}

// ============================================================================
// Action
// ============================================================================

/// Stand still and act for a fixed duration
#[derive(Debug, Clone, PartialEq)]
pub struct ActionTask {
    duration: f64,
    started_at: Option<f64>,
}

impl ActionTask {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            started_at: None,
        }
    }
}

impl TaskBehavior for ActionTask {
    fn can_execute(&self, state: &BehaviorState, _ctx: &TaskContext<'_>) -> bool {
        !state.is_moving
    }

    fn execute(&mut self, state: &mut BehaviorState, ctx: &mut TaskContext<'_>) {
        self.started_at = Some(ctx.now);
        state.is_acting = true;
    }

    fn is_complete(&mut self, _state: &mut BehaviorState, ctx: &mut TaskContext<'_>) -> bool {
        self.started_at
            .is_some_and(|start| ctx.now - start + TIME_EPSILON >= self.duration)
    }

    fn on_exit(&mut self, state: &mut BehaviorState, _ctx: &mut TaskContext<'_>) {
        state.is_acting = false;
    }
}

// ============================================================================
// Combat
// ============================================================================

/// Strike a target every `interval` seconds until it dies or the queue is cleared.
///
/// The first strike lands one interval after the task starts.
#[derive(Debug, Clone, PartialEq)]
pub struct CombatTask {
    target: EntityId,
    interval: f64,
    next_attack_at: Option<f64>,
}

impl CombatTask {
    pub fn new(target: EntityId, interval: f64) -> Self {
        Self {
            target,
            interval,
            next_attack_at: None,
        }
    }

    pub fn target(&self) -> EntityId {
        self.target
    }
}

impl TaskBehavior for CombatTask {
    fn can_execute(&self, state: &BehaviorState, ctx: &TaskContext<'_>) -> bool {
        let (Some(owner), Some((target_position, _))) =
            (ctx.owner_combat, ctx.entities.combat_target(self.target))
        else {
            return false;
        };
        !state.is_moving && state.position().distance_to(target_position) <= owner.attack_range
    }

    fn execute(&mut self, state: &mut BehaviorState, ctx: &mut TaskContext<'_>) {
        state.is_acting = true;
        self.next_attack_at = Some(ctx.now + self.interval);
    }

    fn is_complete(&mut self, _state: &mut BehaviorState, ctx: &mut TaskContext<'_>) -> bool {
        if ctx.entities.combat_target(self.target).is_none() {
            return true;
        }

        // Never executed: keep the queue parked until the target goes away
        let Some(next) = self.next_attack_at else {
            return false;
        };

        if ctx.now + TIME_EPSILON >= next {
            if let (Some(source), Some(owner)) = (ctx.owner_entity(), ctx.owner_combat) {
                ctx.commands.push(Command::Damage {
                    source,
                    target: self.target,
                    amount: owner.attack_damage,
                });
            }
            self.next_attack_at = Some(ctx.now + self.interval);
        }
        false
    }

    fn on_exit(&mut self, state: &mut BehaviorState, _ctx: &mut TaskContext<'_>) {
        state.is_acting = false;
    }
}
