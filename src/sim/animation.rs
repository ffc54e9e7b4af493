//! Animation state selection
//!
//! The core never plays clips; it only decides which clip the presentation
//! layer should be showing, based on behavior flags and one-shot triggers.

use crate::constants::animation::HIT_REACTION;
use crate::sim::state::BehaviorState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimationKind {
    Idle,
    Move,
    Attack,
    Hit,
    Death,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Animator {
    current: AnimationKind,
    hit_remaining: f32,
    dead: bool,
    transitions: u32,
}

impl Animator {
    pub fn new() -> Self {
        Self {
            current: AnimationKind::Idle,
            hit_remaining: 0.0,
            dead: false,
            transitions: 0,
        }
    }

    pub fn current(&self) -> AnimationKind {
        self.current
    }

    /// Number of clip changes so far
    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    pub fn trigger_hit(&mut self) {
        if !self.dead {
            self.hit_remaining = HIT_REACTION;
            self.set(AnimationKind::Hit);
        }
    }

    pub fn trigger_death(&mut self) {
        self.dead = true;
        self.set(AnimationKind::Death);
    }

    /// Re-derive the clip for this tick; returns the new clip on change
    pub fn update(&mut self, state: Option<&BehaviorState>, dt: f32) -> Option<AnimationKind> {
        if self.dead {
            return None;
        }
        if self.hit_remaining > 0.0 {
            self.hit_remaining = (self.hit_remaining - dt).max(0.0);
            if self.hit_remaining > 0.0 {
                return None;
            }
        }

        let next = match state {
            Some(s) if s.is_acting => AnimationKind::Attack,
            Some(s) if s.is_moving => AnimationKind::Move,
            _ => AnimationKind::Idle,
        };
        if self.set(next) {
            Some(next)
        } else {
            None
        }
    }

    fn set(&mut self, kind: AnimationKind) -> bool {
        if self.current == kind {
            return false;
        }
        self.current = kind;
        self.transitions += 1;
        true
    }
}

impl Default for Animator {
    fn default() -> Self {
        Self::new()
    }
}
