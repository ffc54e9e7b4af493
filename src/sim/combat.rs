//! Combat stats supplied per entity by game logic

use crate::constants::combat::DEFAULT_ATTACK_INTERVAL;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatStats {
    pub max_health: f32,
    pub current_health: f32,
    pub attack_damage: f32,
    pub attack_range: f32,
    /// Seconds between strikes
    pub attack_interval: f64,
}

/// Result of a single damage application
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageOutcome {
    pub dealt: f32,
    /// This hit took the last of the target's health
    pub killed: bool,
}

impl CombatStats {
    pub fn new(max_health: f32, attack_damage: f32, attack_range: f32) -> Self {
        Self {
            max_health,
            current_health: max_health,
            attack_damage,
            attack_range,
            attack_interval: DEFAULT_ATTACK_INTERVAL,
        }
    }

    pub fn with_interval(mut self, attack_interval: f64) -> Self {
        self.attack_interval = attack_interval;
        self
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.current_health <= 0.0
    }

    pub fn health_fraction(&self) -> f32 {
        if self.max_health <= 0.0 {
            return 0.0;
        }
        (self.current_health / self.max_health).clamp(0.0, 1.0)
    }

    /// Apply `amount` damage, clamping health at zero. Dead targets take nothing.
    pub fn take_damage(&mut self, amount: f32) -> DamageOutcome {
        if self.is_dead() || amount <= 0.0 {
            return DamageOutcome {
                dealt: 0.0,
                killed: false,
            };
        }
        let dealt = amount.min(self.current_health);
        self.current_health = (self.current_health - amount).max(0.0);
        DamageOutcome {
            dealt,
            killed: self.is_dead(),
        }
    }
}
