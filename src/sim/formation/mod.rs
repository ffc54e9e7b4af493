//! Formation coordinator
//!
//! A formation is a leader plus ordered followers. It owns its own behavior
//! state and task queue (formation-level move and combat), keeps per-slot
//! offsets current as the leader turns, and runs tactic selection and target
//! assignment while engaged with another formation. Every effect on member
//! entities goes out as a [`Command`].

pub mod shape;
pub mod targeting;

pub use shape::{FormationSettings, FormationShape, Tactic, UnitRole};
pub use targeting::Combatant;

use crate::constants::combat::{APPROACH_RANGE_FACTOR, UNARMED_ACTION_DURATION};
use crate::constants::formation::morale::RETREAT_BELOW;
use crate::constants::formation::{
    CHASE_DISTANCE, COMBAT_STANDOFF, DIRECTION_THRESHOLD_DEG, INLINE_UNITS,
};
use crate::constants::task::{ARRIVAL_TOLERANCE, DEFAULT_MOVE_SPEED};
use crate::sim::command::{Command, CommandBuffer};
use crate::sim::entity::{Entity, EntityId, EntityStore};
use crate::sim::state::BehaviorState;
use crate::sim::task::{
    ActionTask, CombatTask, FormationFollowTask, FormationMoveTask, MoveTask, TaskQueue,
};
use crate::util::vec2::Vec2;
use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use tracing::{debug, info};

/// Per-slot offsets, in slot order
pub type SlotVec = SmallVec<[Vec2; INLINE_UNITS]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FormationId(pub u64);

impl fmt::Display for FormationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "formation#{}", self.0)
    }
}

/// Membership record; `index` is the slot and never changes
#[derive(Debug, Clone, PartialEq)]
pub struct FormationUnit {
    pub entity: EntityId,
    pub role: UnitRole,
    pub index: usize,
    engaged: Option<EntityId>,
}

impl FormationUnit {
    /// Enemy this unit is currently fighting
    pub fn engaged(&self) -> Option<EntityId> {
        self.engaged
    }
}

fn alive(entities: &EntityStore, id: EntityId) -> Option<&Entity> {
    entities.get(id).filter(|e| e.is_alive())
}

#[derive(Debug)]
pub struct Formation {
    id: FormationId,
    shape: FormationShape,
    tactic: Tactic,
    /// Slot order; index 0 is the leader
    units: Vec<FormationUnit>,
    offsets: SlotVec,
    follower_targets: SlotVec,
    pub state: BehaviorState,
    pub queue: TaskQueue,
    in_combat: bool,
    combat_target: Option<FormationId>,
    last_direction: Vec2,
    reached_target: bool,
    needs_reassign: bool,
    last_enemy_count: usize,
    assignment_passes: u64,
    move_speed: f32,
    settings: FormationSettings,
}

impl Formation {
    /// `members[0]` must be the leader; callers validate composition
    pub(crate) fn new(
        id: FormationId,
        shape: FormationShape,
        members: &[(EntityId, UnitRole)],
        leader_position: Vec2,
        facing: Vec2,
        settings: FormationSettings,
    ) -> Self {
        let units = members
            .iter()
            .enumerate()
            .map(|(index, &(entity, role))| FormationUnit {
                entity,
                role,
                index,
                engaged: None,
            })
            .collect();

        let mut formation = Self {
            id,
            shape,
            tactic: Tactic::Normal,
            units,
            offsets: SmallVec::new(),
            follower_targets: SmallVec::new(),
            state: BehaviorState::new(leader_position),
            queue: TaskQueue::new(),
            in_combat: false,
            combat_target: None,
            last_direction: Vec2::ZERO,
            reached_target: true,
            needs_reassign: false,
            last_enemy_count: 0,
            assignment_passes: 0,
            move_speed: DEFAULT_MOVE_SPEED,
            settings,
        };
        formation.recompute_offsets(facing);
        formation.refresh_follower_targets(leader_position);
        formation
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> FormationId {
        self.id
    }

    pub fn shape(&self) -> FormationShape {
        self.shape
    }

    pub fn tactic(&self) -> Tactic {
        self.tactic
    }

    pub fn leader(&self) -> Option<EntityId> {
        self.units.first().map(|u| u.entity)
    }

    pub fn units(&self) -> &[FormationUnit] {
        &self.units
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.units.iter().any(|u| u.entity == entity)
    }

    /// Per-slot offsets relative to the leader, in slot order
    pub fn offsets(&self) -> &[Vec2] {
        &self.offsets
    }

    pub fn offset_of(&self, entity: EntityId) -> Option<Vec2> {
        let unit = self.units.iter().find(|u| u.entity == entity)?;
        self.offsets.get(unit.index).copied()
    }

    /// Where each slot should stand, as of the last refresh
    pub fn follower_targets(&self) -> &[Vec2] {
        &self.follower_targets
    }

    pub fn in_combat(&self) -> bool {
        self.in_combat
    }

    pub fn combat_target(&self) -> Option<FormationId> {
        self.combat_target
    }

    pub fn reached_target(&self) -> bool {
        self.reached_target
    }

    pub fn settings(&self) -> &FormationSettings {
        &self.settings
    }

    /// How many times targets were (re)assigned while engaged
    pub fn assignment_passes(&self) -> u64 {
        self.assignment_passes
    }

    pub fn alive_count(&self, entities: &EntityStore) -> usize {
        self.units
            .iter()
            .filter(|u| alive(entities, u.entity).is_some())
            .count()
    }

    pub fn alive_fraction(&self, entities: &EntityStore) -> f32 {
        if self.units.is_empty() {
            return 0.0;
        }
        self.alive_count(entities) as f32 / self.units.len() as f32
    }

    /// Alive members as targeting input, in slot order
    pub fn combatants(&self, entities: &EntityStore) -> Vec<Combatant> {
        self.units
            .iter()
            .filter_map(|unit| {
                alive(entities, unit.entity).map(|e| Combatant {
                    entity: unit.entity,
                    role: unit.role,
                    position: e.position(),
                })
            })
            .collect()
    }

    // ========================================================================
    // Geometry
    // ========================================================================

    /// Slot offsets for facing `direction` under the current shape and tactic.
    /// Index 0 is the leader and always zero; nothing is cached.
    pub fn formation_offsets(&self, direction: Vec2) -> SlotVec {
        self.units
            .iter()
            .map(|u| shape::slot_offset(self.shape, self.tactic, u.role, u.index, direction, &self.settings))
            .collect()
    }

    fn recompute_offsets(&mut self, direction: Vec2) {
        self.offsets = self.formation_offsets(direction);
        self.last_direction = direction;
    }

    fn refresh_follower_targets(&mut self, leader_position: Vec2) {
        self.follower_targets = self.offsets.iter().map(|o| leader_position + *o).collect();
    }

    /// Direction used when nothing better is known
    fn resting_direction(&self, entities: &EntityStore) -> Vec2 {
        let alive_facing = self
            .units
            .iter()
            .find_map(|u| alive(entities, u.entity))
            .map(|e| e.facing);
        match alive_facing {
            Some(facing) => facing,
            None if self.last_direction.length_sq() > 0.0 => self.last_direction,
            None => Vec2::UP,
        }
    }

    fn followers(&self) -> impl Iterator<Item = (&FormationUnit, Vec2)> + '_ {
        self.units
            .iter()
            .zip(self.offsets.iter().copied())
            .filter(|(u, _)| u.role != UnitRole::Leader)
    }

    // ========================================================================
    // Movement
    // ========================================================================

    /// Plan a formation move. The leader walks via the formation's queue;
    /// every live follower gets a follow task. Rejected while in combat.
    pub fn move_to(
        &mut self,
        target: Vec2,
        speed: f32,
        entities: &EntityStore,
        commands: &mut CommandBuffer,
    ) -> bool {
        if self.in_combat {
            debug!("{} is in combat, move to ({:.1}, {:.1}) rejected", self.id, target.x, target.y);
            return false;
        }
        let Some(leader_id) = self.leader() else {
            return false;
        };
        let Some(leader) = alive(entities, leader_id) else {
            debug!("{} has no live leader, move rejected", self.id);
            return false;
        };

        let to_target = target - leader.position();
        let direction = if to_target.length_sq() > 0.0 {
            to_target.normalize()
        } else {
            leader.facing
        };
        self.recompute_offsets(direction);
        self.reached_target = false;
        self.move_speed = speed;

        self.queue
            .add_task(FormationMoveTask::new(leader_id, target, speed));
        for (unit, offset) in self.followers() {
            if alive(entities, unit.entity).is_some() {
                commands.add_task(unit.entity, FormationFollowTask::new(leader_id, offset, speed));
            }
        }
        true
    }

    /// Per-tick coordination, run after every task queue has advanced
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        entities: &EntityStore,
        enemy: Option<&[Combatant]>,
        rng: &mut R,
        commands: &mut CommandBuffer,
    ) {
        if let Some(leader) = self.leader().and_then(|id| entities.get(id)) {
            self.state.set_position(leader.position());
        }

        if self.state.is_moving && !self.in_combat {
            self.update_movement(entities, commands);
        }

        if self.in_combat {
            self.update_combat(entities, enemy, rng, commands);
        }
    }

    fn update_movement(&mut self, entities: &EntityStore, commands: &mut CommandBuffer) {
        let Some(leader) = self.leader().and_then(|id| alive(entities, id)) else {
            return;
        };
        let leader_position = leader.position();
        let to_target = self.state.target - leader_position;
        let direction = if to_target.length_sq() > 0.0 {
            to_target.normalize()
        } else {
            leader.facing
        };

        let turned = self.last_direction.length_sq() == 0.0
            || self.last_direction.angle_between_deg(direction) > DIRECTION_THRESHOLD_DEG;
        if turned {
            self.recompute_offsets(direction);
            self.refresh_follower_targets(leader_position);
            for (unit, offset) in self.followers() {
                commands.push(Command::RefreshFollowOffset {
                    entity: unit.entity,
                    offset,
                });
            }
        }

        if !self.reached_target && to_target.length() < ARRIVAL_TOLERANCE {
            self.reached_target = true;
            self.refresh_follower_targets(leader_position);
            for (unit, offset) in self.followers() {
                if alive(entities, unit.entity).is_some() {
                    commands.add_task(
                        unit.entity,
                        MoveTask::new(leader_position + offset, self.move_speed),
                    );
                }
            }
            debug!("{} arrived at ({:.1}, {:.1})", self.id, leader_position.x, leader_position.y);
        }
    }

    // ========================================================================
    // Combat
    // ========================================================================

    /// Engage `target`, whose alive units are `enemy`. No-op if already fighting.
    pub fn start_combat<R: Rng + ?Sized>(
        &mut self,
        target: FormationId,
        enemy: &[Combatant],
        entities: &EntityStore,
        rng: &mut R,
        commands: &mut CommandBuffer,
    ) -> bool {
        if self.in_combat {
            return false;
        }
        if enemy.is_empty() {
            debug!("{} has no one left to fight in {}", self.id, target);
            return false;
        }

        info!("{} engaging {} ({} enemies)", self.id, target, enemy.len());
        self.in_combat = true;
        self.combat_target = Some(target);
        self.state.is_moving = false;
        self.reached_target = true;
        self.last_enemy_count = enemy.len();
        self.assign_targets(enemy, entities, rng, commands);
        true
    }

    /// Leave combat: release every engaged unit and regroup on the leader
    pub fn stop_combat(&mut self, entities: &EntityStore, commands: &mut CommandBuffer) {
        if !self.in_combat {
            return;
        }
        info!("{} leaving combat (tactic {})", self.id, self.tactic);

        self.in_combat = false;
        self.combat_target = None;
        self.state.is_acting = false;
        self.needs_reassign = false;

        let direction = self.resting_direction(entities);
        self.recompute_offsets(direction);
        let leader_position = self.state.position();
        self.refresh_follower_targets(leader_position);

        let speed = self.move_speed;
        for (unit, offset) in self.units.iter_mut().zip(self.offsets.iter().copied()) {
            if unit.engaged.take().is_none() || alive(entities, unit.entity).is_none() {
                continue;
            }
            commands.push(Command::ClearTasks { entity: unit.entity });
            if unit.role != UnitRole::Leader {
                commands.add_task(unit.entity, MoveTask::new(leader_position + offset, speed));
            }
        }
    }

    fn update_combat<R: Rng + ?Sized>(
        &mut self,
        entities: &EntityStore,
        enemy: Option<&[Combatant]>,
        rng: &mut R,
        commands: &mut CommandBuffer,
    ) {
        let Some(enemy) = enemy.filter(|e| !e.is_empty()) else {
            self.stop_combat(entities, commands);
            return;
        };

        let leader_alive = self.leader().and_then(|id| alive(entities, id)).is_some();
        let tactic = if leader_alive {
            Tactic::from_alive_fraction(self.alive_fraction(entities))
        } else {
            Tactic::Defensive
        };
        if tactic != self.tactic {
            info!("{} tactic {} -> {}", self.id, self.tactic, tactic);
            self.tactic = tactic;
            let direction = self.resting_direction(entities);
            self.recompute_offsets(direction);
            self.needs_reassign = true;
        }

        if enemy.len() != self.last_enemy_count {
            self.last_enemy_count = enemy.len();
            self.needs_reassign = true;
        }

        let engaged = if !self.settings.reassign_on_change || self.needs_reassign {
            self.assign_targets(enemy, entities, rng, commands)
        } else {
            SmallVec::new()
        };
        self.chase(entities, &engaged, commands);
    }

    /// Returns the units that were sent after a new target in this pass
    fn assign_targets<R: Rng + ?Sized>(
        &mut self,
        enemy: &[Combatant],
        entities: &EntityStore,
        rng: &mut R,
        commands: &mut CommandBuffer,
    ) -> SmallVec<[EntityId; INLINE_UNITS]> {
        let ours = self.combatants(entities);
        let assignment = match self.tactic {
            Tactic::Aggressive => targeting::assign_aggressive(&ours, enemy, rng),
            Tactic::Defensive => targeting::assign_defensive(&ours, enemy),
            Tactic::Normal | Tactic::Retreat => targeting::assign_round_robin(&ours, enemy),
        };

        let mut engaged = SmallVec::new();
        for (unit, target) in assignment {
            if self.engage(unit, target, false, entities, commands) {
                engaged.push(unit);
            }
        }
        self.needs_reassign = false;
        self.assignment_passes += 1;
        engaged
    }

    /// Send one unit after `target`. Re-engaging the same target is a no-op unless forced.
    fn engage(
        &mut self,
        entity: EntityId,
        target: EntityId,
        force: bool,
        entities: &EntityStore,
        commands: &mut CommandBuffer,
    ) -> bool {
        let speed = self.move_speed;
        let Some(slot) = self.units.iter_mut().find(|u| u.entity == entity) else {
            return false;
        };
        if slot.engaged == Some(target) && !force {
            return false;
        }
        let (Some(unit), Some(target_position)) = (alive(entities, entity), entities.position_of(target))
        else {
            return false;
        };
        slot.engaged = Some(target);

        commands.push(Command::ClearTasks { entity });
        let position = unit.position();
        let away = (position - target_position).normalize();
        match unit.combat {
            Some(stats) => {
                if position.distance_to(target_position) > stats.attack_range {
                    let standoff = COMBAT_STANDOFF.min(stats.attack_range * APPROACH_RANGE_FACTOR);
                    commands.add_task(entity, MoveTask::new(target_position + away * standoff, speed));
                }
                commands.add_task(entity, CombatTask::new(target, stats.attack_interval));
            }
            None => {
                commands.add_task(entity, MoveTask::new(target_position + away * COMBAT_STANDOFF, speed));
                commands.add_task(entity, ActionTask::new(UNARMED_ACTION_DURATION));
            }
        }
        true
    }

    /// Re-engage units that are standing still but not fighting, or whose target slipped away.
    /// Units in `fresh` already got their orders this tick.
    fn chase(&mut self, entities: &EntityStore, fresh: &[EntityId], commands: &mut CommandBuffer) {
        let mut stale = SmallVec::<[(EntityId, EntityId); INLINE_UNITS]>::new();
        for unit in &self.units {
            let Some(target) = unit.engaged else { continue };
            if fresh.contains(&unit.entity) {
                continue;
            }
            let (Some(entity), Some((target_position, _))) =
                (alive(entities, unit.entity), entities.combat_target(target))
            else {
                continue;
            };
            let Some(state) = entity.state() else { continue };
            if state.is_moving {
                continue;
            }
            let reach = entity.combat.map_or(CHASE_DISTANCE, |c| c.attack_range);
            if !state.is_acting || entity.position().distance_to(target_position) > reach {
                stale.push((unit.entity, target));
            }
        }
        for (unit, target) in stale {
            self.engage(unit, target, true, entities, commands);
        }
    }

    /// React to a member's death
    pub fn handle_unit_death(
        &mut self,
        entity: EntityId,
        entities: &EntityStore,
        commands: &mut CommandBuffer,
    ) {
        let Some(unit) = self.units.iter_mut().find(|u| u.entity == entity) else {
            return;
        };
        unit.engaged = None;
        let role = unit.role;
        self.needs_reassign = true;

        if role == UnitRole::Leader {
            info!("{} lost its leader, switching to defensive", self.id);
            self.tactic = Tactic::Defensive;
            let direction = self.resting_direction(entities);
            self.recompute_offsets(direction);
        } else if self.alive_fraction(entities) < RETREAT_BELOW {
            info!("{} broken ({} alive), retreating", self.id, self.alive_count(entities));
            self.tactic = Tactic::Retreat;
            self.stop_combat(entities, commands);
        }
    }

    /// Release all members without issuing any orders; the caller clears the formation queue
    pub(crate) fn dispose(&mut self) -> Vec<EntityId> {
        self.in_combat = false;
        self.combat_target = None;
        self.state.is_acting = false;
        self.needs_reassign = false;
        self.offsets.clear();
        self.follower_targets.clear();
        self.units.drain(..).map(|u| u.entity).collect()
    }
}

// ============================================================================
// Store
// ============================================================================

/// Formations in creation order
#[derive(Debug, Default)]
pub struct FormationStore {
    formations: FxHashMap<FormationId, Formation>,
    order: Vec<FormationId>,
    next_id: u64,
}

impl FormationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_with(&mut self, build: impl FnOnce(FormationId) -> Formation) -> FormationId {
        self.next_id += 1;
        let id = FormationId(self.next_id);
        self.formations.insert(id, build(id));
        self.order.push(id);
        id
    }

    pub(crate) fn remove(&mut self, id: FormationId) -> Option<Formation> {
        let formation = self.formations.remove(&id)?;
        self.order.retain(|other| *other != id);
        Some(formation)
    }

    /// Detach for an in-place update; must be paired with [`FormationStore::restore`]
    pub(crate) fn take(&mut self, id: FormationId) -> Option<Formation> {
        self.formations.remove(&id)
    }

    pub(crate) fn restore(&mut self, formation: Formation) {
        self.formations.insert(formation.id, formation);
    }

    pub fn get(&self, id: FormationId) -> Option<&Formation> {
        self.formations.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: FormationId) -> Option<&mut Formation> {
        self.formations.get_mut(&id)
    }

    pub fn contains(&self, id: FormationId) -> bool {
        self.formations.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.formations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formations.is_empty()
    }

    pub fn ids(&self) -> &[FormationId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &Formation> {
        self.order.iter().filter_map(|id| self.formations.get(id))
    }
}
