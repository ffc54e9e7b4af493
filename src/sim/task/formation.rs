use super::{MoveTask, TaskBehavior, TaskContext};
use crate::constants::task::ARRIVAL_TOLERANCE;
use crate::sim::command::Command;
use crate::sim::entity::{Entity, EntityId};
use crate::sim::formation::FormationId;
use crate::sim::state::BehaviorState;
use crate::util::vec2::Vec2;

fn live_leader<'a>(ctx: &'a TaskContext<'_>, leader: EntityId) -> Option<&'a Entity> {
    ctx.entities.get(leader).filter(|e| e.is_alive())
}

// ============================================================================
// Formation move (runs on the formation's queue)
// ============================================================================

/// Walk the formation's leader to `target`; followers are driven separately
#[derive(Debug, Clone, PartialEq)]
pub struct FormationMoveTask {
    leader: EntityId,
    target: Vec2,
    speed: f32,
}

impl FormationMoveTask {
    pub fn new(leader: EntityId, target: Vec2, speed: f32) -> Self {
        Self { leader, target, speed }
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }
}

impl TaskBehavior for FormationMoveTask {
    fn can_execute(&self, state: &BehaviorState, _ctx: &TaskContext<'_>) -> bool {
        !state.is_acting
    }

    fn execute(&mut self, state: &mut BehaviorState, ctx: &mut TaskContext<'_>) {
        state.target = self.target;
        state.move_speed = self.speed;
        state.is_moving = true;
        ctx.commands
            .add_task(self.leader, MoveTask::new(self.target, self.speed));
    }

    fn is_complete(&mut self, _state: &mut BehaviorState, ctx: &mut TaskContext<'_>) -> bool {
        match live_leader(ctx, self.leader) {
            Some(leader) => leader.position().distance_to(self.target) < ARRIVAL_TOLERANCE,
            None => true,
        }
    }

    fn on_exit(&mut self, state: &mut BehaviorState, _ctx: &mut TaskContext<'_>) {
        state.is_moving = false;
    }
}

// ============================================================================
// Formation follow (runs on each follower's queue)
// ============================================================================

/// Track the leader's position plus a slot offset, retargeting every tick
#[derive(Debug, Clone, PartialEq)]
pub struct FormationFollowTask {
    leader: EntityId,
    offset: Vec2,
    speed: f32,
}

impl FormationFollowTask {
    pub fn new(leader: EntityId, offset: Vec2, speed: f32) -> Self {
        Self { leader, offset, speed }
    }

    pub fn leader(&self) -> EntityId {
        self.leader
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: Vec2) {
        self.offset = offset;
    }
}

impl TaskBehavior for FormationFollowTask {
    fn can_execute(&self, state: &BehaviorState, _ctx: &TaskContext<'_>) -> bool {
        !state.is_acting
    }

    fn execute(&mut self, state: &mut BehaviorState, ctx: &mut TaskContext<'_>) {
        state.is_moving = true;
        state.move_speed = self.speed;
        if let Some(leader) = ctx.entities.get(self.leader) {
            state.target = leader.position() + self.offset;
        }
    }

    fn is_complete(&mut self, state: &mut BehaviorState, ctx: &mut TaskContext<'_>) -> bool {
        let Some(leader) = live_leader(ctx, self.leader) else {
            return true;
        };

        state.target = leader.position() + self.offset;

        match leader.state() {
            Some(leader_state) => {
                leader.is_idle()
                    || leader.position().distance_to(leader_state.target) < ARRIVAL_TOLERANCE
            }
            None => true,
        }
    }

    fn on_exit(&mut self, state: &mut BehaviorState, _ctx: &mut TaskContext<'_>) {
        state.is_moving = false;
        state.move_speed = 0.0;
    }
}

// ============================================================================
// Formation combat (runs on the formation's queue)
// ============================================================================

/// Hold the formation in combat against another formation until one side breaks
#[derive(Debug, Clone, PartialEq)]
pub struct FormationCombatTask {
    target: FormationId,
    started: bool,
}

impl FormationCombatTask {
    pub fn new(target: FormationId) -> Self {
        Self { target, started: false }
    }

    pub fn target(&self) -> FormationId {
        self.target
    }
}

impl TaskBehavior for FormationCombatTask {
    fn can_execute(&self, state: &BehaviorState, _ctx: &TaskContext<'_>) -> bool {
        !state.is_moving
    }

    fn execute(&mut self, state: &mut BehaviorState, ctx: &mut TaskContext<'_>) {
        let Some(formation) = ctx.owner_formation() else {
            return;
        };
        state.is_acting = true;
        self.started = true;
        ctx.commands.push(Command::StartFormationCombat {
            formation,
            target: self.target,
        });
    }

    fn is_complete(&mut self, state: &mut BehaviorState, ctx: &mut TaskContext<'_>) -> bool {
        if !self.started {
            return true;
        }
        let wiped_out = ctx
            .formations
            .get(self.target)
            .map_or(true, |enemy| enemy.alive_count(ctx.entities) == 0);
        wiped_out || !state.is_acting
    }

    fn on_exit(&mut self, state: &mut BehaviorState, ctx: &mut TaskContext<'_>) {
        state.is_acting = false;
        if !self.started {
            return;
        }
        if let Some(formation) = ctx.owner_formation() {
            ctx.commands.push(Command::StopFormationCombat { formation });
        }
    }
}
