//! World: entity and formation ownership plus the fixed-order tick
//!
//! Tick order:
//! 1. visibility against the supplied viewport
//! 2. formation queues
//! 3. entity queues (spawn order), position integration, animation
//! 4. formation coordinators
//! 5. dirty positions flushed into the spatial index
//!
//! Commands emitted during any update are applied right after it.

use crate::config::SimConfig;
use crate::constants::combat::APPROACH_RANGE_FACTOR;
use crate::constants::sim::MAX_COMMAND_PASSES;
use crate::constants::task::DEFAULT_MOVE_SPEED;
use crate::error::{SimError, SimResult};
use crate::sim::command::{Command, CommandBuffer};
use crate::sim::entity::{Entity, EntityId, EntityStore, SceneHandle, SpawnDesc};
use crate::sim::formation::{
    Combatant, Formation, FormationId, FormationShape, FormationStore, UnitRole,
};
use crate::sim::task::{
    ActionTask, CombatTask, FormationCombatTask, MoveTask, Task, TaskContext, TaskOwner,
};
use crate::spatial::{ViewportCamera, VisibilityTracker};
use crate::util::rect::Rect;
use crate::util::vec2::Vec2;
use hashbrown::HashSet;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

/// What the presentation layer is looking at this tick
#[derive(Clone, Copy)]
pub enum ViewportFeed<'a> {
    /// Skip visibility this tick
    None,
    /// Viewport rectangle in world space
    Rect(Rect),
    Camera(&'a dyn ViewportCamera),
}

/// Summary of one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub time: f64,
    pub visibility_recomputed: bool,
    pub entered: usize,
    pub exited: usize,
    pub tasks_started: usize,
    pub damage_events: usize,
    pub deaths: usize,
    /// Entities whose position changed
    pub moved: usize,
}

/// Side effects accumulated while applying commands
#[derive(Debug, Default)]
struct Counters {
    tasks_started: usize,
    damage_events: usize,
    deaths: usize,
}

pub struct World {
    config: SimConfig,
    tracker: VisibilityTracker<SceneHandle>,
    entities: EntityStore,
    formations: FormationStore,
    commands: CommandBuffer,
    rng: StdRng,
    counters: Counters,
    time: f64,
    tick: u64,
}

impl World {
    pub fn new(config: SimConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            tracker: VisibilityTracker::new(config.visibility_settings()),
            config,
            entities: EntityStore::new(),
            formations: FormationStore::new(),
            commands: CommandBuffer::new(),
            rng,
            counters: Counters::default(),
            time: 0.0,
            tick: 0,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn formations(&self) -> &FormationStore {
        &self.formations
    }

    pub fn formation(&self, id: FormationId) -> Option<&Formation> {
        self.formations.get(id)
    }

    pub fn tracker(&self) -> &VisibilityTracker<SceneHandle> {
        &self.tracker
    }

    // ========================================================================
    // Layers
    // ========================================================================

    /// (Re)create a visibility layer and re-index entities already registered on it
    pub fn reset_layer(&mut self, layer: &str, world_bounds: Rect) {
        self.tracker.reset_layer(layer, world_bounds);
        for entity in self.entities.iter() {
            if entity.layer.as_deref() == Some(layer) {
                self.tracker
                    .insert(layer, entity.position(), entity.handle().clone());
            }
        }
    }

    pub fn remove_layer(&mut self, layer: &str) -> bool {
        self.tracker.remove_layer(layer)
    }

    // ========================================================================
    // Entities
    // ========================================================================

    pub fn spawn(&mut self, desc: SpawnDesc) -> SimResult<EntityId> {
        if let Some(layer) = &desc.layer {
            if !self.tracker.has_layer(layer) {
                return Err(SimError::UnknownLayer(layer.clone()));
            }
        }

        let id = self.entities.spawn(desc);
        if let Some(entity) = self.entities.get(id) {
            if let Some(layer) = &entity.layer {
                self.tracker
                    .insert(layer, entity.position(), entity.handle().clone());
            }
        }
        Ok(id)
    }

    /// Remove an entity; its formation treats it as a casualty
    pub fn despawn(&mut self, id: EntityId) -> SimResult<()> {
        if !self.entities.contains(id) {
            return Err(SimError::UnknownEntity(id));
        }
        self.clear_entity_queue(id);
        let Some(entity) = self.entities.despawn(id) else {
            return Err(SimError::UnknownEntity(id));
        };

        if let Some(layer) = &entity.layer {
            self.tracker.remove(layer, entity.handle());
        }
        if let Some(formation) = entity.formation.and_then(|fid| self.formations.get_mut(fid)) {
            formation.handle_unit_death(id, &self.entities, &mut self.commands);
        }
        self.apply_commands();
        Ok(())
    }

    /// Teleport an entity; the spatial index follows immediately
    pub fn set_position(&mut self, id: EntityId, position: Vec2) -> SimResult<()> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or(SimError::UnknownEntity(id))?;
        entity.set_position(position);
        if entity.take_dirty() {
            if let Some(layer) = &entity.layer {
                self.tracker
                    .update_position(layer, position, entity.handle().clone());
            }
        }
        Ok(())
    }

    pub fn add_task(&mut self, id: EntityId, task: impl Into<Task>) -> SimResult<()> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or(SimError::UnknownEntity(id))?;
        let movement = entity.movement.as_mut().ok_or(SimError::NotMovable(id))?;
        movement.queue.add_task(task);
        Ok(())
    }

    pub fn clear_tasks(&mut self, id: EntityId) -> SimResult<()> {
        let entity = self.entities.get(id).ok_or(SimError::UnknownEntity(id))?;
        if entity.movement.is_none() {
            return Err(SimError::NotMovable(id));
        }
        self.clear_entity_queue(id);
        self.apply_commands();
        Ok(())
    }

    pub fn move_to(&mut self, id: EntityId, target: Vec2, speed: f32) -> SimResult<()> {
        self.add_task(id, MoveTask::new(target, speed))
    }

    pub fn perform_action(&mut self, id: EntityId, duration: f64) -> SimResult<()> {
        self.add_task(id, ActionTask::new(duration))
    }

    /// Walk into range of `target` if needed, then fight it
    pub fn start_combat(&mut self, id: EntityId, target: EntityId) -> SimResult<()> {
        let attacker = self.entities.get(id).ok_or(SimError::UnknownEntity(id))?;
        let stats = attacker.combat.ok_or(SimError::NotCombatant(id))?;
        if attacker.movement.is_none() {
            return Err(SimError::NotMovable(id));
        }
        if stats.is_dead() {
            return Err(SimError::Dead(id));
        }
        let defender = self.entities.get(target).ok_or(SimError::UnknownEntity(target))?;
        let Some((target_position, _)) = self.entities.combat_target(target) else {
            return Err(match defender.combat {
                Some(_) => SimError::Dead(target),
                None => SimError::NotCombatant(target),
            });
        };

        let position = attacker.position();
        if position.distance_to(target_position) > stats.attack_range {
            let away = (position - target_position).normalize();
            let approach = target_position + away * (stats.attack_range * APPROACH_RANGE_FACTOR);
            self.add_task(id, MoveTask::new(approach, DEFAULT_MOVE_SPEED))?;
        }
        self.add_task(id, CombatTask::new(target, stats.attack_interval))
    }

    // ========================================================================
    // Formations
    // ========================================================================

    /// Leader plus soldiers, in slot order
    pub fn create_formation(
        &mut self,
        shape: FormationShape,
        leader: EntityId,
        followers: &[EntityId],
    ) -> SimResult<FormationId> {
        let followers: Vec<(EntityId, UnitRole)> =
            followers.iter().map(|&id| (id, UnitRole::Soldier)).collect();
        self.create_formation_with_roles(shape, leader, &followers)
    }

    /// Followers may be guards or soldiers; each is placed on its slot right away
    pub fn create_formation_with_roles(
        &mut self,
        shape: FormationShape,
        leader: EntityId,
        followers: &[(EntityId, UnitRole)],
    ) -> SimResult<FormationId> {
        let mut members = Vec::with_capacity(followers.len() + 1);
        members.push((leader, UnitRole::Leader));
        members.extend_from_slice(followers);

        let mut seen = HashSet::with_capacity(members.len());
        for (i, &(id, role)) in members.iter().enumerate() {
            if i > 0 && role == UnitRole::Leader {
                return Err(SimError::InvalidFormation(format!("{} cannot be a second leader", id)));
            }
            if !seen.insert(id) {
                return Err(SimError::InvalidFormation(format!("{} listed twice", id)));
            }
            let entity = self.entities.get(id).ok_or(SimError::UnknownEntity(id))?;
            if entity.movement.is_none() {
                return Err(SimError::NotMovable(id));
            }
            if let Some(formation) = entity.formation {
                return Err(SimError::AlreadyInFormation { entity: id, formation });
            }
        }

        let (leader_position, facing) = self
            .entities
            .get(leader)
            .map(|e| (e.position(), e.facing))
            .ok_or(SimError::UnknownEntity(leader))?;
        let settings = self.config.formation_settings();
        let id = self.formations.insert_with(|id| {
            Formation::new(id, shape, &members, leader_position, facing, settings)
        });

        let placements: Vec<(EntityId, Vec2)> = match self.formations.get(id) {
            Some(formation) => formation
                .units()
                .iter()
                .zip(formation.follower_targets().iter().copied())
                .skip(1)
                .map(|(u, target)| (u.entity, target))
                .collect(),
            None => Vec::new(),
        };
        for &(member, _) in &members {
            if let Some(entity) = self.entities.get_mut(member) {
                entity.formation = Some(id);
            }
        }
        for (member, slot) in placements {
            self.set_position(member, slot)?;
        }

        info!("{} formed: {:?} with {} units", id, shape, members.len());
        Ok(id)
    }

    /// Returns false when the formation refuses to move (it is fighting)
    pub fn formation_move_to(&mut self, id: FormationId, target: Vec2, speed: f32) -> SimResult<bool> {
        let formation = self
            .formations
            .get_mut(id)
            .ok_or(SimError::UnknownFormation(id))?;
        let accepted = formation.move_to(target, speed, &self.entities, &mut self.commands);
        self.apply_commands();
        Ok(accepted)
    }

    /// Queue combat against `target`; it starts once the formation stops moving
    pub fn formation_start_combat(&mut self, id: FormationId, target: FormationId) -> SimResult<()> {
        if !self.formations.contains(target) {
            return Err(SimError::UnknownFormation(target));
        }
        if id == target {
            return Err(SimError::InvalidFormation(format!("{} cannot fight itself", id)));
        }
        self.formation_add_task(id, FormationCombatTask::new(target))
    }

    pub fn formation_stop_combat(&mut self, id: FormationId) -> SimResult<()> {
        let formation = self
            .formations
            .get_mut(id)
            .ok_or(SimError::UnknownFormation(id))?;
        formation.stop_combat(&self.entities, &mut self.commands);
        self.apply_commands();
        Ok(())
    }

    pub fn formation_add_task(&mut self, id: FormationId, task: impl Into<Task>) -> SimResult<()> {
        let formation = self
            .formations
            .get_mut(id)
            .ok_or(SimError::UnknownFormation(id))?;
        formation.queue.add_task(task);
        Ok(())
    }

    pub fn formation_clear_tasks(&mut self, id: FormationId) -> SimResult<()> {
        if !self.formations.contains(id) {
            return Err(SimError::UnknownFormation(id));
        }
        self.clear_formation_queue(id);
        self.apply_commands();
        Ok(())
    }

    /// Dissolve a formation; member entities stay in the world and keep their own queues
    pub fn dispose_formation(&mut self, id: FormationId) -> SimResult<()> {
        if !self.formations.contains(id) {
            return Err(SimError::UnknownFormation(id));
        }
        self.clear_formation_queue(id);

        let Some(mut formation) = self.formations.remove(id) else {
            return Err(SimError::UnknownFormation(id));
        };
        for member in formation.dispose() {
            if let Some(entity) = self.entities.get_mut(member) {
                entity.formation = None;
            }
        }
        self.apply_commands();
        info!("{} disposed", id);
        Ok(())
    }

    // ========================================================================
    // Tick
    // ========================================================================

    pub fn tick(&mut self, dt: f32, viewport: ViewportFeed<'_>) -> TickReport {
        self.tick += 1;
        self.time += f64::from(dt);

        let mut report = TickReport {
            tick: self.tick,
            time: self.time,
            ..TickReport::default()
        };

        let delta = match viewport {
            ViewportFeed::None => None,
            ViewportFeed::Rect(rect) => self.tracker.recompute_visibility(rect),
            ViewportFeed::Camera(camera) => self.tracker.update_visibility(camera),
        };
        if let Some(delta) = delta {
            report.visibility_recomputed = true;
            report.entered = delta.entered;
            report.exited = delta.exited;
        }

        let formation_ids = self.formations.ids().to_vec();
        for &id in &formation_ids {
            self.update_formation_queue(id);
        }

        let entity_ids = self.entities.ids().to_vec();
        for id in entity_ids {
            self.update_entity(id, dt);
        }

        for &id in &formation_ids {
            self.update_coordinator(id);
        }

        let before = self.tracker.stats();
        report.moved = self.flush_positions();
        let after = self.tracker.stats();
        report.entered += (after.entered - before.entered) as usize;
        report.exited += (after.exited - before.exited) as usize;

        let counters = std::mem::take(&mut self.counters);
        report.tasks_started = counters.tasks_started;
        report.damage_events = counters.damage_events;
        report.deaths = counters.deaths;
        report
    }

    fn update_formation_queue(&mut self, id: FormationId) {
        let Some(mut formation) = self.formations.take(id) else {
            return;
        };
        let mut ctx = TaskContext {
            now: self.time,
            owner: TaskOwner::Formation(id),
            owner_combat: None,
            entities: &self.entities,
            formations: &self.formations,
            commands: &mut self.commands,
        };
        if formation
            .queue
            .update(&mut formation.state, &mut ctx)
            .is_some()
        {
            self.counters.tasks_started += 1;
        }
        self.formations.restore(formation);
        self.apply_commands();
    }

    fn update_entity(&mut self, id: EntityId, dt: f32) {
        let Some(mut entity) = self.entities.take(id) else {
            return;
        };

        if entity.is_alive() {
            if let Some(movement) = entity.movement.as_mut() {
                let mut ctx = TaskContext {
                    now: self.time,
                    owner: TaskOwner::Entity(id),
                    owner_combat: entity.combat.as_ref(),
                    entities: &self.entities,
                    formations: &self.formations,
                    commands: &mut self.commands,
                };
                if movement.queue.update(&mut movement.state, &mut ctx).is_some() {
                    self.counters.tasks_started += 1;
                }
                if let Some(direction) = movement.state.integrate(dt) {
                    entity.facing = direction;
                }
            }
        }

        if let Some(animator) = entity.animator.as_mut() {
            animator.update(entity.movement.as_ref().map(|m| &m.state), dt);
        }

        self.entities.restore(entity);
        self.apply_commands();
    }

    fn update_coordinator(&mut self, id: FormationId) {
        let enemy = self.enemy_snapshot(id);
        let Some(formation) = self.formations.get_mut(id) else {
            return;
        };
        formation.update(
            &self.entities,
            enemy.as_deref(),
            &mut self.rng,
            &mut self.commands,
        );
        self.apply_commands();
    }

    /// Alive units of the formation `id` is fighting; `None` once that formation is gone
    fn enemy_snapshot(&self, id: FormationId) -> Option<Vec<Combatant>> {
        let target = self.formations.get(id)?.combat_target()?;
        let enemy = self.formations.get(target)?;
        Some(enemy.combatants(&self.entities))
    }

    fn flush_positions(&mut self) -> usize {
        let mut moved = 0;
        for entity in self.entities.values_mut() {
            if !entity.take_dirty() {
                continue;
            }
            moved += 1;
            if let Some(layer) = &entity.layer {
                self.tracker
                    .update_position(layer, entity.position(), entity.handle().clone());
            }
        }
        moved
    }

    // ========================================================================
    // Queue helpers
    // ========================================================================

    fn clear_entity_queue(&mut self, id: EntityId) {
        let Some(mut entity) = self.entities.take(id) else {
            return;
        };
        if let Some(movement) = entity.movement.as_mut() {
            let mut ctx = TaskContext {
                now: self.time,
                owner: TaskOwner::Entity(id),
                owner_combat: entity.combat.as_ref(),
                entities: &self.entities,
                formations: &self.formations,
                commands: &mut self.commands,
            };
            movement.queue.clear_tasks(&mut movement.state, &mut ctx);
        }
        self.entities.restore(entity);
    }

    fn clear_formation_queue(&mut self, id: FormationId) {
        let Some(mut formation) = self.formations.take(id) else {
            return;
        };
        let mut ctx = TaskContext {
            now: self.time,
            owner: TaskOwner::Formation(id),
            owner_combat: None,
            entities: &self.entities,
            formations: &self.formations,
            commands: &mut self.commands,
        };
        formation.queue.clear_tasks(&mut formation.state, &mut ctx);
        self.formations.restore(formation);
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn apply_commands(&mut self) {
        for _ in 0..MAX_COMMAND_PASSES {
            let batch = self.commands.take();
            if batch.is_empty() {
                return;
            }
            for command in batch {
                self.apply(command);
            }
        }
        if !self.commands.is_empty() {
            warn!(
                "Command cascade did not settle after {} passes, dropping {}",
                MAX_COMMAND_PASSES,
                self.commands.len()
            );
            self.commands.clear();
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::AddTask { entity, task } => {
                match self.entities.get_mut(entity).and_then(|e| e.movement.as_mut()) {
                    Some(movement) => movement.queue.add_task(task),
                    None => debug!("Dropping {} task for {}: not movable", task.kind(), entity),
                }
            }
            Command::ClearTasks { entity } => self.clear_entity_queue(entity),
            Command::Damage {
                source,
                target,
                amount,
            } => self.apply_damage(source, target, amount),
            Command::RefreshFollowOffset { entity, offset } => {
                let Some(movement) = self.entities.get_mut(entity).and_then(|e| e.movement.as_mut())
                else {
                    return;
                };
                for task in movement.queue.tasks_mut() {
                    if let Task::FormationFollow(follow) = task {
                        follow.set_offset(offset);
                    }
                }
            }
            Command::StartFormationCombat { formation, target } => {
                let Some(enemy) = self
                    .formations
                    .get(target)
                    .map(|f| f.combatants(&self.entities))
                else {
                    debug!("{} cannot engage missing {}", formation, target);
                    return;
                };
                if let Some(own) = self.formations.get_mut(formation) {
                    own.start_combat(
                        target,
                        &enemy,
                        &self.entities,
                        &mut self.rng,
                        &mut self.commands,
                    );
                }
            }
            Command::StopFormationCombat { formation } => {
                if let Some(own) = self.formations.get_mut(formation) {
                    own.stop_combat(&self.entities, &mut self.commands);
                }
            }
        }
    }

    fn apply_damage(&mut self, source: EntityId, target: EntityId, amount: f32) {
        let Some(entity) = self.entities.get_mut(target) else {
            return;
        };
        let Some(stats) = entity.combat.as_mut() else {
            return;
        };
        let outcome = stats.take_damage(amount);
        if outcome.dealt <= 0.0 {
            return;
        }
        self.counters.damage_events += 1;

        if !outcome.killed {
            if let Some(animator) = entity.animator.as_mut() {
                animator.trigger_hit();
            }
            return;
        }

        debug!("{} killed {}", source, target);
        self.counters.deaths += 1;
        if let Some(animator) = entity.animator.as_mut() {
            animator.trigger_death();
        }
        let formation = entity.formation;
        self.clear_entity_queue(target);
        if let Some(own) = formation.and_then(|fid| self.formations.get_mut(fid)) {
            own.handle_unit_death(target, &self.entities, &mut self.commands);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::animation::AnimationKind;
    use crate::sim::combat::CombatStats;
    use crate::sim::formation::Tactic;
    use crate::sim::task::TaskKind;
    use crate::spatial::OrthographicCamera;

    fn world() -> World {
        World::new(SimConfig {
            seed: Some(11),
            ..SimConfig::default()
        })
    }

    fn bounds() -> Rect {
        Rect::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0))
    }

    fn tick_n(world: &mut World, n: usize, dt: f32) -> Vec<TickReport> {
        (0..n).map(|_| world.tick(dt, ViewportFeed::None)).collect()
    }

    #[test]
    fn test_spawn_on_unknown_layer_fails() {
        let mut world = world();
        let result = world.spawn(SpawnDesc::new("tree", Vec2::ZERO).on_layer("objects"));
        assert_eq!(result, Err(SimError::UnknownLayer("objects".to_string())));
        assert!(world.entities().is_empty());
    }

    #[test]
    fn test_visibility_follows_viewport_and_moves() {
        let mut world = world();
        world.reset_layer("objects", bounds());
        let near = world
            .spawn(SpawnDesc::new("tree", Vec2::new(1.0, 1.0)).on_layer("objects"))
            .unwrap();
        let far = world
            .spawn(SpawnDesc::new("rock", Vec2::new(50.0, 50.0)).on_layer("objects"))
            .unwrap();

        let view = Rect::new(Vec2::new(-10.0, -10.0), Vec2::new(10.0, 10.0));
        let report = world.tick(0.1, ViewportFeed::Rect(view));
        assert!(report.visibility_recomputed);
        assert_eq!((report.entered, report.exited), (1, 0));
        assert!(world.entity(near).unwrap().is_visible());
        assert!(!world.entity(far).unwrap().is_visible());

        // Same viewport, nothing moved: skipped
        let report = world.tick(0.1, ViewportFeed::Rect(view));
        assert!(!report.visibility_recomputed);

        // Teleports are reconciled one by one; the viewport guard still holds
        world.set_position(far, Vec2::new(2.0, 2.0)).unwrap();
        world.set_position(near, Vec2::new(60.0, 60.0)).unwrap();
        assert!(world.entity(far).unwrap().is_visible());
        assert!(!world.entity(near).unwrap().is_visible());
        let report = world.tick(0.1, ViewportFeed::Rect(view));
        assert!(!report.visibility_recomputed);
        assert_eq!(world.tracker().stats().recomputes, 1);
    }

    #[test]
    fn test_walking_unit_keeps_viewport_guard() {
        let mut world = world();
        world.reset_layer("units", bounds());
        let scout = world
            .spawn(SpawnDesc::new("scout", Vec2::ZERO).movable().on_layer("units"))
            .unwrap();
        world.move_to(scout, Vec2::new(50.0, 0.0), 1.0).unwrap();

        let view = Rect::new(Vec2::new(-10.0, -10.0), Vec2::new(10.0, 10.0));
        let reports: Vec<TickReport> = (0..20)
            .map(|_| world.tick(1.0, ViewportFeed::Rect(view)))
            .collect();

        assert_eq!(world.tracker().stats().recomputes, 1);
        assert!(reports.iter().skip(1).all(|r| !r.visibility_recomputed));
        assert!(reports.iter().all(|r| r.moved == 1));
        // Entered on the first recompute, left once it walked past the margin
        assert_eq!(reports.iter().map(|r| r.entered).sum::<usize>(), 1);
        assert_eq!(reports.iter().map(|r| r.exited).sum::<usize>(), 1);
        assert!(!world.entity(scout).unwrap().is_visible());
    }

    #[test]
    fn test_spawn_inside_viewport_is_visible_at_once() {
        let mut world = world();
        world.reset_layer("objects", bounds());
        let view = Rect::new(Vec2::new(-10.0, -10.0), Vec2::new(10.0, 10.0));
        world.tick(0.1, ViewportFeed::Rect(view));

        let tree = world
            .spawn(SpawnDesc::new("tree", Vec2::new(3.0, 3.0)).on_layer("objects"))
            .unwrap();
        assert!(world.entity(tree).unwrap().is_visible());
        assert!(!world.tick(0.1, ViewportFeed::Rect(view)).visibility_recomputed);
    }

    #[test]
    fn test_camera_feed() {
        let mut world = world();
        world.reset_layer("objects", bounds());
        let tree = world
            .spawn(SpawnDesc::new("tree", Vec2::new(30.0, 0.0)).on_layer("objects"))
            .unwrap();

        let mut camera = OrthographicCamera::new(Vec2::ZERO, 5.0, 1.0);
        world.tick(0.1, ViewportFeed::Camera(&camera));
        assert!(!world.entity(tree).unwrap().is_visible());

        camera.position = Vec2::new(28.0, 0.0);
        let report = world.tick(0.1, ViewportFeed::Camera(&camera));
        assert_eq!(report.entered, 1);
        assert!(world.entity(tree).unwrap().is_visible());
    }

    #[test]
    fn test_despawn_hides_and_unindexes() {
        let mut world = world();
        world.reset_layer("objects", bounds());
        let tree = world
            .spawn(SpawnDesc::new("tree", Vec2::ZERO).on_layer("objects"))
            .unwrap();
        world.tick(0.1, ViewportFeed::Rect(Rect::new(Vec2::new(-5.0, -5.0), Vec2::new(5.0, 5.0))));
        let handle = world.entity(tree).unwrap().handle().clone();
        assert!(handle.presentation().is_active());

        world.despawn(tree).unwrap();
        assert!(!handle.presentation().is_active());
        assert_eq!(world.tracker().total_count("objects"), 0);
        assert_eq!(world.despawn(tree), Err(SimError::UnknownEntity(tree)));
    }

    #[test]
    fn test_move_to_walks_and_finishes() {
        let mut world = world();
        let scout = world
            .spawn(SpawnDesc::new("scout", Vec2::ZERO).movable())
            .unwrap();
        world.move_to(scout, Vec2::new(3.0, 0.0), 1.0).unwrap();

        let first = world.tick(0.5, ViewportFeed::None);
        assert_eq!(first.tasks_started, 1);
        assert_eq!(first.moved, 1);
        assert!(world.entity(scout).unwrap().position().approx_eq(Vec2::new(0.5, 0.0), 1e-5));
        assert_eq!(world.entity(scout).unwrap().facing, Vec2::RIGHT);

        tick_n(&mut world, 6, 0.5);
        let scout = world.entity(scout).unwrap();
        assert_eq!(scout.position(), Vec2::new(3.0, 0.0));
        assert!(scout.is_idle());
        assert!(!scout.state().unwrap().is_moving);
    }

    #[test]
    fn test_static_entities_reject_tasks() {
        let mut world = world();
        let rock = world.spawn(SpawnDesc::new("rock", Vec2::ZERO)).unwrap();
        assert_eq!(
            world.move_to(rock, Vec2::ONE, 1.0),
            Err(SimError::NotMovable(rock))
        );
        assert_eq!(
            world.move_to(EntityId(99), Vec2::ONE, 1.0),
            Err(SimError::UnknownEntity(EntityId(99)))
        );
    }

    #[test]
    fn test_combat_interval_in_world() {
        let mut world = world();
        let knight = world
            .spawn(SpawnDesc::unit("knight", Vec2::ZERO, CombatStats::new(50.0, 4.0, 1.5)))
            .unwrap();
        let dummy = world
            .spawn(SpawnDesc::unit("dummy", Vec2::new(1.0, 0.0), CombatStats::new(100.0, 0.0, 1.0)))
            .unwrap();
        world.start_combat(knight, dummy).unwrap();

        let reports = tick_n(&mut world, 10, 0.25);
        let hits: usize = reports.iter().map(|r| r.damage_events).sum();
        assert_eq!(hits, 2);
        let health = world.entity(dummy).unwrap().combat.unwrap().current_health;
        assert_eq!(health, 92.0);
        // Idle -> Hit -> Idle, twice
        assert_eq!(
            world.entity(dummy).unwrap().animator.as_ref().unwrap().transitions(),
            4
        );
    }

    #[test]
    fn test_start_combat_approaches_first() {
        let mut world = world();
        let knight = world
            .spawn(SpawnDesc::unit("knight", Vec2::ZERO, CombatStats::new(50.0, 10.0, 1.0)))
            .unwrap();
        let wolf = world
            .spawn(SpawnDesc::unit("wolf", Vec2::new(5.0, 0.0), CombatStats::new(10.0, 0.0, 1.0)))
            .unwrap();
        world.start_combat(knight, wolf).unwrap();
        assert_eq!(
            world.entity(knight).unwrap().queue().unwrap().pending_len(),
            2
        );

        let reports = tick_n(&mut world, 80, 0.1);
        assert_eq!(reports.iter().map(|r| r.deaths).sum::<usize>(), 1);
        let wolf = world.entity(wolf).unwrap();
        assert!(!wolf.is_alive());
        assert!(wolf.is_idle());
        assert_eq!(wolf.animator.as_ref().unwrap().current(), AnimationKind::Death);
        assert!(world.entity(knight).unwrap().is_idle());
    }

    #[test]
    fn test_start_combat_rejects_bad_targets() {
        let mut world = world();
        let knight = world
            .spawn(SpawnDesc::unit("knight", Vec2::ZERO, CombatStats::new(50.0, 10.0, 1.0)))
            .unwrap();
        let tree = world.spawn(SpawnDesc::new("tree", Vec2::ONE)).unwrap();
        assert_eq!(world.start_combat(knight, tree), Err(SimError::NotCombatant(tree)));
        assert_eq!(world.start_combat(tree, knight), Err(SimError::NotCombatant(tree)));
    }

    fn squad(world: &mut World, origin: Vec2, size: usize, stats: CombatStats) -> FormationId {
        let ids: Vec<EntityId> = (0..size)
            .map(|i| {
                world
                    .spawn(SpawnDesc::unit(format!("u{}", i), origin, stats))
                    .unwrap()
            })
            .collect();
        world
            .create_formation(FormationShape::Triangle, ids[0], &ids[1..])
            .unwrap()
    }

    #[test]
    fn test_create_formation_places_followers() {
        let mut world = world();
        let id = squad(&mut world, Vec2::new(5.0, 5.0), 3, CombatStats::new(10.0, 1.0, 1.0));
        let formation = world.formation(id).unwrap();
        for (unit, offset) in formation.units().iter().zip(formation.offsets()) {
            let entity = world.entity(unit.entity).unwrap();
            assert_eq!(entity.position(), Vec2::new(5.0, 5.0) + *offset);
            assert_eq!(entity.formation, Some(id));
        }
    }

    #[test]
    fn test_create_formation_validation() {
        let mut world = world();
        let stats = CombatStats::new(10.0, 1.0, 1.0);
        let a = world.spawn(SpawnDesc::unit("a", Vec2::ZERO, stats)).unwrap();
        let b = world.spawn(SpawnDesc::unit("b", Vec2::ZERO, stats)).unwrap();
        let rock = world.spawn(SpawnDesc::new("rock", Vec2::ZERO)).unwrap();

        assert!(matches!(
            world.create_formation(FormationShape::Square, a, &[b, b]),
            Err(SimError::InvalidFormation(_))
        ));
        assert!(matches!(
            world.create_formation(FormationShape::Square, a, &[a]),
            Err(SimError::InvalidFormation(_))
        ));
        assert!(matches!(
            world.create_formation_with_roles(FormationShape::Square, a, &[(b, UnitRole::Leader)]),
            Err(SimError::InvalidFormation(_))
        ));
        assert_eq!(
            world.create_formation(FormationShape::Square, a, &[rock]),
            Err(SimError::NotMovable(rock))
        );

        let formed = world
            .create_formation_with_roles(FormationShape::Square, a, &[(b, UnitRole::Guard)])
            .unwrap();
        assert_eq!(
            world.create_formation(FormationShape::Square, b, &[]),
            Err(SimError::AlreadyInFormation { entity: b, formation: formed })
        );
    }

    #[test]
    fn test_formation_move_scenario() {
        let mut world = world();
        let id = squad(&mut world, Vec2::ZERO, 3, CombatStats::new(10.0, 1.0, 1.0));
        assert!(world.formation_move_to(id, Vec2::new(10.0, 0.0), 1.0).unwrap());

        let mut arrived = false;
        for _ in 0..200 {
            world.tick(0.1, ViewportFeed::None);
            if world.formation(id).unwrap().reached_target() {
                arrived = true;
                break;
            }
        }
        assert!(arrived);

        let formation = world.formation(id).unwrap();
        let leader = formation.leader().unwrap();
        let leader_position = world.entity(leader).unwrap().position();
        assert!(leader_position.distance_to(Vec2::new(10.0, 0.0)) < 0.1 + 1e-4);

        let mut final_moves = Vec::new();
        for (unit, offset) in formation.units().iter().zip(formation.offsets()).skip(1) {
            let expected = leader_position + *offset;
            assert_eq!(formation.follower_targets()[unit.index], expected);

            // The final move is queued behind (or instead of) the follow task
            let queue = world.entity(unit.entity).unwrap().queue().unwrap();
            assert!(!queue.is_empty());
            assert_ne!(queue.current_kind(), Some(TaskKind::Combat));
            final_moves.push((unit.entity, expected));
        }

        tick_n(&mut world, 50, 0.1);
        for (entity, expected) in final_moves {
            let entity = world.entity(entity).unwrap();
            assert!(entity.position().distance_to(expected) < 0.1);
            assert!(entity.is_idle());
        }
        let formation = world.formation(id).unwrap();
        assert!(formation.queue.is_empty());
        assert!(!formation.state.is_moving);
    }

    #[test]
    fn test_formation_combat_until_wiped_out() {
        // Re-rolling leaderless targets every tick would keep resetting the strike timer
        let mut world = World::new(SimConfig {
            seed: Some(11),
            formation_reassign_on_change: true,
            ..SimConfig::default()
        });
        let strong = squad(&mut world, Vec2::ZERO, 3, CombatStats::new(20.0, 5.0, 1.5));
        let weak = squad(&mut world, Vec2::new(4.0, 0.0), 3, CombatStats::new(5.0, 1.0, 1.5));
        world.formation_start_combat(strong, weak).unwrap();

        world.tick(0.1, ViewportFeed::None);
        assert!(world.formation(strong).unwrap().in_combat());
        assert_eq!(world.formation(strong).unwrap().tactic(), Tactic::Aggressive);

        let mut deaths = 0;
        for _ in 0..600 {
            deaths += world.tick(0.1, ViewportFeed::None).deaths;
            if !world.formation(strong).unwrap().in_combat() {
                break;
            }
        }
        assert_eq!(deaths, 3);
        assert_eq!(world.formation(weak).unwrap().alive_count(world.entities()), 0);
        assert!(!world.formation(strong).unwrap().in_combat());

        tick_n(&mut world, 3, 0.1);
        assert!(world.formation(strong).unwrap().queue.is_empty());
        for unit in world.formation(weak).unwrap().units() {
            let entity = world.entity(unit.entity).unwrap();
            assert_eq!(entity.animator.as_ref().unwrap().current(), AnimationKind::Death);
        }
    }

    #[test]
    fn test_formation_move_rejected_in_combat() {
        let mut world = world();
        let a = squad(&mut world, Vec2::ZERO, 2, CombatStats::new(20.0, 1.0, 1.5));
        let b = squad(&mut world, Vec2::new(3.0, 0.0), 2, CombatStats::new(20.0, 1.0, 1.5));
        world.formation_start_combat(a, b).unwrap();
        world.tick(0.1, ViewportFeed::None);

        assert!(!world.formation_move_to(a, Vec2::new(-20.0, 0.0), 1.0).unwrap());
        world.formation_stop_combat(a).unwrap();
        assert!(world.formation_move_to(a, Vec2::new(-20.0, 0.0), 1.0).unwrap());
    }

    #[test]
    fn test_dispose_formation_releases_members() {
        let mut world = world();
        let id = squad(&mut world, Vec2::ZERO, 3, CombatStats::new(10.0, 1.0, 1.0));
        world.formation_move_to(id, Vec2::new(5.0, 0.0), 1.0).unwrap();
        world.tick(0.1, ViewportFeed::None);

        let members: Vec<EntityId> = world
            .formation(id)
            .unwrap()
            .units()
            .iter()
            .map(|u| u.entity)
            .collect();
        world.dispose_formation(id).unwrap();

        assert!(world.formation(id).is_none());
        for member in members {
            assert_eq!(world.entity(member).unwrap().formation, None);
        }
        assert_eq!(world.dispose_formation(id), Err(SimError::UnknownFormation(id)));
    }

    #[test]
    fn test_dispose_in_combat_issues_no_regroup() {
        let mut world = world();
        let a = squad(&mut world, Vec2::ZERO, 3, CombatStats::new(50.0, 1.0, 1.5));
        let b = squad(&mut world, Vec2::new(8.0, 0.0), 3, CombatStats::new(50.0, 1.0, 1.5));
        world.formation_start_combat(a, b).unwrap();
        world.tick(0.1, ViewportFeed::None);
        assert!(world.formation(a).unwrap().in_combat());

        let members: Vec<EntityId> = world.formation(a).unwrap().units().iter().map(|u| u.entity).collect();
        let snapshot = |world: &World| -> Vec<(Option<TaskKind>, usize)> {
            members
                .iter()
                .map(|&m| {
                    let queue = world.entity(m).unwrap().queue().unwrap();
                    (queue.current_kind(), queue.pending_len())
                })
                .collect()
        };
        let before = snapshot(&world);
        world.dispose_formation(a).unwrap();

        assert_eq!(snapshot(&world), before);
        for &member in &members {
            assert_eq!(world.entity(member).unwrap().formation, None);
        }
    }
}
