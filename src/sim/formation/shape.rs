//! Formation geometry: per-slot offsets by shape, tactic and role

use crate::constants::formation::morale::{AGGRESSIVE_ABOVE, DEFENSIVE_BELOW, RETREAT_BELOW};
use crate::constants::formation::tactic::{
    AGGRESSIVE_FORWARD, DEFENSIVE_LEADER, DEFENSIVE_OTHERS, RETREAT,
};
use crate::constants::formation::{CIRCLE_RADIUS, CIRCLE_SLOTS, DEFAULT_SPACING};
use crate::util::vec2::Vec2;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormationShape {
    /// Everyone stacks on the leader
    Single,
    Square,
    Triangle,
    /// Ring of eight slots around the leader
    Circle,
    /// V trailing behind the leader
    Arrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Tactic {
    #[default]
    Normal,
    Aggressive,
    Defensive,
    Retreat,
}

impl Tactic {
    /// Morale-driven tactic for the share of units still standing
    pub fn from_alive_fraction(fraction: f32) -> Self {
        if fraction < RETREAT_BELOW {
            Tactic::Retreat
        } else if fraction < DEFENSIVE_BELOW {
            Tactic::Defensive
        } else if fraction > AGGRESSIVE_ABOVE {
            Tactic::Aggressive
        } else {
            Tactic::Normal
        }
    }
}

impl fmt::Display for Tactic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tactic::Normal => "normal",
            Tactic::Aggressive => "aggressive",
            Tactic::Defensive => "defensive",
            Tactic::Retreat => "retreat",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitRole {
    Leader,
    Guard,
    Soldier,
}

/// Tunables shared by every formation in a world
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormationSettings {
    /// Distance between neighbouring slots
    pub spacing: f32,
    /// Rotate slot offsets so the formation faces its travel direction
    pub rotate_offsets: bool,
    /// Only re-run target assignment after a tactic change or a casualty
    pub reassign_on_change: bool,
}

impl Default for FormationSettings {
    fn default() -> Self {
        Self {
            spacing: DEFAULT_SPACING,
            rotate_offsets: false,
            reassign_on_change: false,
        }
    }
}

/// Unscaled slot for `index` in `shape`; the leader always sits at the origin
pub fn base_offset(shape: FormationShape, role: UnitRole, index: usize) -> Vec2 {
    if role == UnitRole::Leader {
        return Vec2::ZERO;
    }

    let i = index as f32;
    match shape {
        FormationShape::Single => Vec2::ZERO,
        FormationShape::Triangle => {
            let row = ((-1.0 + (1.0 + 8.0 * i).sqrt()) / 2.0).floor();
            let column = i - row * (row + 1.0) / 2.0;
            Vec2::new(column - row / 2.0, -row)
        }
        FormationShape::Square => {
            let size = ((index + 1) as f32).sqrt().ceil().max(1.0) as usize;
            let row = (index / size) as f32;
            let column = (index % size) as f32;
            let half = (size - 1) as f32 / 2.0;
            Vec2::new(column - half, -row + half)
        }
        FormationShape::Circle => {
            let angle = i * TAU / CIRCLE_SLOTS as f32;
            Vec2::new(angle.cos(), angle.sin()) * CIRCLE_RADIUS
        }
        FormationShape::Arrow => {
            let rank = ((index + 1) / 2) as f32;
            let side = if index % 2 == 1 { -1.0 } else { 1.0 };
            Vec2::new(side * rank, -rank)
        }
    }
}

pub fn apply_tactic(offset: Vec2, tactic: Tactic, role: UnitRole) -> Vec2 {
    match tactic {
        Tactic::Normal => offset,
        Tactic::Aggressive => Vec2::new(offset.x, offset.y * AGGRESSIVE_FORWARD),
        Tactic::Defensive if role == UnitRole::Leader => offset * DEFENSIVE_LEADER,
        Tactic::Defensive => offset * DEFENSIVE_OTHERS,
        Tactic::Retreat => offset * RETREAT,
    }
}

/// Final offset of one slot relative to the leader
pub fn slot_offset(
    shape: FormationShape,
    tactic: Tactic,
    role: UnitRole,
    index: usize,
    direction: Vec2,
    settings: &FormationSettings,
) -> Vec2 {
    let offset = apply_tactic(base_offset(shape, role, index), tactic, role) * settings.spacing;
    if settings.rotate_offsets && direction.length_sq() > 0.0 {
        offset.rotate(Vec2::UP.angle_to(direction))
    } else {
        offset
    }
}
