//! Map entities built by composition
//!
//! One entity type carries optional components (movement, combat, animation)
//! chosen at spawn time. Static scenery has none of them; units have all.

use crate::sim::animation::Animator;
use crate::sim::combat::CombatStats;
use crate::sim::formation::FormationId;
use crate::sim::state::BehaviorState;
use crate::sim::task::TaskQueue;
use crate::spatial::visibility::VisibilityObject;
use crate::util::vec2::Vec2;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

// ============================================================================
// Presentation handle
// ============================================================================

/// Presentation-side state toggled by visibility callbacks
#[derive(Debug, Default)]
pub struct Presentation {
    active: Cell<bool>,
    toggles: Cell<u32>,
}

impl Presentation {
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// How many times the active flag actually flipped
    pub fn toggles(&self) -> u32 {
        self.toggles.get()
    }

    fn set_active(&self, active: bool) {
        if self.active.replace(active) != active {
            self.toggles.set(self.toggles.get() + 1);
        }
    }
}

/// Cheap handle stored in the spatial index; identity is the entity id
#[derive(Clone)]
pub struct SceneHandle {
    id: EntityId,
    presentation: Rc<Presentation>,
}

impl SceneHandle {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            presentation: Rc::new(Presentation::default()),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }
}

impl fmt::Debug for SceneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneHandle")
            .field("id", &self.id)
            .field("active", &self.presentation.is_active())
            .finish()
    }
}

impl PartialEq for SceneHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SceneHandle {}

impl Hash for SceneHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl VisibilityObject for SceneHandle {
    fn on_visibility_changed(&self, visible: bool) {
        self.presentation.set_active(visible);
    }
}

// ============================================================================
// Entity
// ============================================================================

/// Movement component: behavior state plus the task queue driving it
#[derive(Debug)]
pub struct Movement {
    pub state: BehaviorState,
    pub queue: TaskQueue,
}

impl Movement {
    pub fn new(position: Vec2) -> Self {
        Self {
            state: BehaviorState::new(position),
            queue: TaskQueue::new(),
        }
    }
}

#[derive(Debug)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    /// Visibility layer this entity is indexed on
    pub layer: Option<String>,
    pub facing: Vec2,
    pub movement: Option<Movement>,
    pub combat: Option<CombatStats>,
    pub animator: Option<Animator>,
    pub formation: Option<FormationId>,
    handle: SceneHandle,
    anchor: Vec2,
    anchor_dirty: bool,
}

impl Entity {
    pub fn handle(&self) -> &SceneHandle {
        &self.handle
    }

    pub fn position(&self) -> Vec2 {
        match &self.movement {
            Some(movement) => movement.state.position(),
            None => self.anchor,
        }
    }

    /// The single position setter; the change reaches the spatial index on flush
    pub fn set_position(&mut self, position: Vec2) {
        match &mut self.movement {
            Some(movement) => movement.state.set_position(position),
            None => {
                if self.anchor != position {
                    self.anchor = position;
                    self.anchor_dirty = true;
                }
            }
        }
    }

    pub(crate) fn take_dirty(&mut self) -> bool {
        match &mut self.movement {
            Some(movement) => movement.state.take_dirty(),
            None => std::mem::replace(&mut self.anchor_dirty, false),
        }
    }

    pub fn state(&self) -> Option<&BehaviorState> {
        self.movement.as_ref().map(|m| &m.state)
    }

    pub fn queue(&self) -> Option<&TaskQueue> {
        self.movement.as_ref().map(|m| &m.queue)
    }

    pub fn is_alive(&self) -> bool {
        self.combat.map_or(true, |c| !c.is_dead())
    }

    /// Nothing running and nothing pending (static entities are always idle)
    pub fn is_idle(&self) -> bool {
        self.queue().map_or(true, TaskQueue::is_empty)
    }

    pub fn is_visible(&self) -> bool {
        self.handle.presentation().is_active()
    }
}

/// Spawn description; components are opted into with the builder methods
#[derive(Debug, Clone)]
pub struct SpawnDesc {
    pub name: String,
    pub position: Vec2,
    pub facing: Vec2,
    pub layer: Option<String>,
    pub movable: bool,
    pub combat: Option<CombatStats>,
    pub animated: bool,
}

impl SpawnDesc {
    pub fn new(name: impl Into<String>, position: Vec2) -> Self {
        Self {
            name: name.into(),
            position,
            facing: Vec2::UP,
            layer: None,
            movable: false,
            combat: None,
            animated: false,
        }
    }

    pub fn on_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    pub fn facing(mut self, facing: Vec2) -> Self {
        self.facing = facing.normalize();
        self
    }

    pub fn movable(mut self) -> Self {
        self.movable = true;
        self
    }

    pub fn with_combat(mut self, stats: CombatStats) -> Self {
        self.combat = Some(stats);
        self
    }

    pub fn animated(mut self) -> Self {
        self.animated = true;
        self
    }

    /// Movable, animated fighter
    pub fn unit(name: impl Into<String>, position: Vec2, stats: CombatStats) -> Self {
        Self::new(name, position).movable().with_combat(stats).animated()
    }

    pub(crate) fn build(self, id: EntityId) -> Entity {
        Entity {
            id,
            name: self.name,
            layer: self.layer,
            facing: if self.facing.length_sq() > 0.0 { self.facing } else { Vec2::UP },
            movement: self.movable.then(|| Movement::new(self.position)),
            combat: self.combat,
            animator: self.animated.then(Animator::new),
            formation: None,
            handle: SceneHandle::new(id),
            anchor: self.position,
            anchor_dirty: false,
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// Entity storage with stable spawn-order iteration.
///
/// During a tick the world temporarily takes an entity out to update it
/// while tasks read every other entity through a shared borrow.
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: FxHashMap<EntityId, Entity>,
    order: Vec<EntityId>,
    next_id: u64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn spawn(&mut self, desc: SpawnDesc) -> EntityId {
        self.next_id += 1;
        let id = EntityId(self.next_id);
        self.entities.insert(id, desc.build(id));
        self.order.push(id);
        id
    }

    pub(crate) fn despawn(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;
        self.order.retain(|other| *other != id);
        Some(entity)
    }

    /// Detach for an in-place update; must be paired with [`EntityStore::restore`]
    pub(crate) fn take(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub(crate) fn restore(&mut self, entity: Entity) {
        self.entities.insert(entity.id, entity);
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Ids in spawn order
    pub fn ids(&self) -> &[EntityId] {
        &self.order
    }

    /// Entities in spawn order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    pub fn position_of(&self, id: EntityId) -> Option<Vec2> {
        self.get(id).map(Entity::position)
    }

    /// Position and stats of a live combat-capable entity
    pub fn combat_target(&self, id: EntityId) -> Option<(Vec2, &CombatStats)> {
        let entity = self.get(id)?;
        let stats = entity.combat.as_ref()?;
        (!stats.is_dead()).then(|| (entity.position(), stats))
    }

    pub fn alive_count(&self) -> usize {
        self.entities.values().filter(|e| e.is_alive()).count()
    }
}
