/// Spatial index defaults
pub mod spatial {
    /// Default leaf capacity before a split is considered
    pub const MAX_ITEMS_PER_NODE: usize = 8;
    /// Default minimum node width; nodes this narrow never split
    pub const MIN_NODE_SIZE: f32 = 1.0;
    /// Inline leaf storage before spilling to the heap
    pub const LEAF_INLINE: usize = 8;
}

/// Viewport culling constants
pub mod visibility {
    /// Leaf capacity used by per-layer trees
    pub const MAX_ITEMS_PER_NODE: usize = 8;
    /// Minimum node width used by per-layer trees (world units)
    pub const MIN_NODE_SIZE: f32 = 10.0;
    /// Camera travel required before visibility is recomputed (world units)
    pub const UPDATE_THRESHOLD: f32 = 0.5;
    /// Margin added around the viewport on every side (world units)
    pub const MARGIN: f32 = 2.0;
    /// Tolerance when comparing successive viewport rectangles
    pub const RECT_EPSILON: f32 = 1e-4;
}

/// Task scheduling constants
pub mod task {
    /// Distance below which a mover counts as arrived
    pub const ARRIVAL_TOLERANCE: f32 = 0.1;
    /// Default move speed (world units per second)
    pub const DEFAULT_MOVE_SPEED: f32 = 1.0;
    /// Slack when comparing the clock against a scheduled strike
    pub const TIME_EPSILON: f64 = 1e-9;
}

/// Combat constants
pub mod combat {
    /// Default strike interval in seconds
    pub const DEFAULT_ATTACK_INTERVAL: f64 = 1.0;
    /// Fraction of attack range a lone attacker closes to before striking
    pub const APPROACH_RANGE_FACTOR: f32 = 0.9;
    /// Duration of the placeholder action for units without combat stats
    pub const UNARMED_ACTION_DURATION: f64 = 1.0;
}

/// Animation state constants
pub mod animation {
    /// How long a hit reaction overrides the base animation (seconds)
    pub const HIT_REACTION: f32 = 0.3;
}

/// Formation constants
pub mod formation {
    /// Direction change (degrees) that triggers an offset recompute
    pub const DIRECTION_THRESHOLD_DEG: f32 = 10.0;
    /// Default spacing between formation slots (world units)
    pub const DEFAULT_SPACING: f32 = 1.0;
    /// Slots on the circle shape
    pub const CIRCLE_SLOTS: usize = 8;
    /// Radius of the circle shape in spacing units
    pub const CIRCLE_RADIUS: f32 = 1.0;
    /// Distance from the target an engaged unit closes to
    pub const COMBAT_STANDOFF: f32 = 1.5;
    /// Distance beyond which an engaged unit chases its target
    pub const CHASE_DISTANCE: f32 = 2.0;
    /// Expected formation size for inline offset storage
    pub const INLINE_UNITS: usize = 16;

    /// Tactic scaling factors
    pub mod tactic {
        /// Forward-axis compression when aggressive
        pub const AGGRESSIVE_FORWARD: f32 = 0.8;
        /// Leader slot compression when defensive
        pub const DEFENSIVE_LEADER: f32 = 0.5;
        /// Compression of every other slot when defensive
        pub const DEFENSIVE_OTHERS: f32 = 0.7;
        /// Expansion when retreating
        pub const RETREAT: f32 = 1.2;
    }

    /// Alive-fraction thresholds driving tactic changes
    pub mod morale {
        /// Below this alive fraction the formation retreats and stops fighting
        pub const RETREAT_BELOW: f32 = 0.3;
        /// Below this alive fraction the formation turns defensive
        pub const DEFENSIVE_BELOW: f32 = 0.5;
        /// Above this alive fraction the formation turns aggressive
        pub const AGGRESSIVE_ABOVE: f32 = 0.7;
    }
}

/// Simulation clock constants
pub mod sim {
    /// Default tick rate in Hz
    pub const TICK_RATE: u32 = 30;
    /// Delta time per tick in seconds
    pub const DT: f32 = 1.0 / 30.0;
    /// Command application rounds per update before the rest is dropped
    pub const MAX_COMMAND_PASSES: usize = 8;
}
