//! Per-entity behavior state shared between an entity and its task queue

use crate::util::vec2::Vec2;

/// Mutable movement/action flags driven by tasks.
///
/// Position is private: every write goes through [`BehaviorState::set_position`],
/// which marks the state dirty so the world can mirror the change into the
/// spatial index at the end of the tick.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorState {
    position: Vec2,
    pub target: Vec2,
    pub is_moving: bool,
    pub is_acting: bool,
    /// Set when the owning queue has nothing left to run
    pub is_complete: bool,
    pub move_speed: f32,
    dirty: bool,
}

impl BehaviorState {
    pub fn new(position: Vec2) -> Self {
        Self {
            position,
            target: position,
            is_moving: false,
            is_acting: false,
            is_complete: true,
            move_speed: 0.0,
            dirty: false,
        }
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec2) {
        if position != self.position {
            self.position = position;
            self.dirty = true;
        }
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns whether the position changed since the last call
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    /// Advance toward `target` for one tick.
    ///
    /// Snaps onto the target when the remaining distance fits in this step.
    /// Returns the travel direction when the position changed.
    pub fn integrate(&mut self, dt: f32) -> Option<Vec2> {
        if !self.is_moving {
            return None;
        }
        let to_target = self.target - self.position;
        if to_target.length_sq() == 0.0 {
            return None;
        }
        let step = self.move_speed * dt;
        if step <= 0.0 {
            return None;
        }
        let direction = to_target.normalize();
        self.set_position(self.position.move_towards(self.target, step));
        Some(direction)
    }
}

impl Default for BehaviorState {
    fn default() -> Self {
        Self::new(Vec2::ZERO)
    }
}
