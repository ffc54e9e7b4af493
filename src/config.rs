use crate::constants::{formation, sim, visibility};
use crate::sim::formation::FormationSettings;
use crate::spatial::VisibilitySettings;
use std::str::FromStr;

/// Simulation configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Ticks per second driven by the binary
    pub tick_rate: u32,
    /// Camera travel required before visibility is recomputed
    pub visibility_update_threshold: f32,
    /// Margin added around the viewport before culling
    pub visibility_margin: f32,
    /// Leaf capacity before a quadtree node splits
    pub quadtree_max_items: usize,
    /// Nodes this wide or narrower never split
    pub quadtree_min_node_size: f32,
    /// Distance between formation slots
    pub formation_spacing: f32,
    /// Rotate formation slots toward the travel direction
    pub formation_rotate_offsets: bool,
    /// Only reassign combat targets after a tactic change or casualty
    pub formation_reassign_on_change: bool,
    /// Seed for target selection randomness; entropy when unset
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: sim::TICK_RATE,
            visibility_update_threshold: visibility::UPDATE_THRESHOLD,
            visibility_margin: visibility::MARGIN,
            quadtree_max_items: visibility::MAX_ITEMS_PER_NODE,
            quadtree_min_node_size: visibility::MIN_NODE_SIZE,
            formation_spacing: formation::DEFAULT_SPACING,
            formation_rotate_offsets: false,
            formation_reassign_on_change: false,
            seed: None,
        }
    }
}

/// Parse `name` from `lookup`, keeping `current` (with a warning) when the
/// value is malformed or rejected by `accept`.
fn read_var<T, L, A>(lookup: &L, name: &str, current: T, accept: A, rule: &str) -> T
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
    A: Fn(&T) -> bool,
{
    let Some(raw) = lookup(name) else {
        return current;
    };
    match raw.trim().parse::<T>() {
        Ok(parsed) if accept(&parsed) => parsed,
        Ok(_) => {
            tracing::warn!("{} must be {}, using default", name, rule);
            current
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            current
        }
    }
}

impl SimConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load config from an arbitrary variable source
    pub fn from_lookup<L: Fn(&str) -> Option<String>>(lookup: L) -> Self {
        let defaults = Self::default();

        Self {
            tick_rate: read_var(&lookup, "TICK_RATE", defaults.tick_rate, |v| (1..=1000).contains(v), "1-1000"),
            visibility_update_threshold: read_var(
                &lookup,
                "VISIBILITY_UPDATE_THRESHOLD",
                defaults.visibility_update_threshold,
                |v: &f32| v.is_finite() && *v >= 0.0,
                ">= 0",
            ),
            visibility_margin: read_var(
                &lookup,
                "VISIBILITY_MARGIN",
                defaults.visibility_margin,
                |v: &f32| v.is_finite() && *v >= 0.0,
                ">= 0",
            ),
            quadtree_max_items: read_var(
                &lookup,
                "QUADTREE_MAX_ITEMS",
                defaults.quadtree_max_items,
                |v| *v > 0,
                "> 0",
            ),
            quadtree_min_node_size: read_var(
                &lookup,
                "QUADTREE_MIN_NODE_SIZE",
                defaults.quadtree_min_node_size,
                |v: &f32| v.is_finite() && *v > 0.0,
                "> 0",
            ),
            formation_spacing: read_var(
                &lookup,
                "FORMATION_SPACING",
                defaults.formation_spacing,
                |v: &f32| v.is_finite() && *v > 0.0,
                "> 0",
            ),
            formation_rotate_offsets: read_var(
                &lookup,
                "FORMATION_ROTATE_OFFSETS",
                defaults.formation_rotate_offsets,
                |_| true,
                "true or false",
            ),
            formation_reassign_on_change: read_var(
                &lookup,
                "FORMATION_REASSIGN_ON_CHANGE",
                defaults.formation_reassign_on_change,
                |_| true,
                "true or false",
            ),
            seed: lookup("SIM_SEED").and_then(|raw| match raw.trim().parse::<u64>() {
                Ok(seed) => Some(seed),
                Err(_) => {
                    tracing::warn!("Invalid SIM_SEED '{}', using entropy", raw);
                    None
                }
            }),
        }
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_rate == 0 {
            return Err("tick_rate cannot be 0".to_string());
        }
        if !(self.visibility_update_threshold >= 0.0) {
            return Err("visibility_update_threshold cannot be negative".to_string());
        }
        if !(self.visibility_margin >= 0.0) {
            return Err("visibility_margin cannot be negative".to_string());
        }
        if self.quadtree_max_items == 0 {
            return Err("quadtree_max_items must be at least 1".to_string());
        }
        if !(self.quadtree_min_node_size > 0.0) {
            return Err("quadtree_min_node_size must be positive".to_string());
        }
        if !(self.formation_spacing > 0.0) {
            return Err("formation_spacing must be positive".to_string());
        }
        Ok(())
    }

    /// Fixed step in seconds
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    pub fn visibility_settings(&self) -> VisibilitySettings {
        VisibilitySettings {
            max_items_per_node: self.quadtree_max_items,
            min_node_size: self.quadtree_min_node_size,
            update_threshold: self.visibility_update_threshold,
            margin: self.visibility_margin,
        }
    }

    pub fn formation_settings(&self) -> FormationSettings {
        FormationSettings {
            spacing: self.formation_spacing,
            rotate_offsets: self.formation_rotate_offsets,
            reassign_on_change: self.formation_reassign_on_change,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> SimConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SimConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.visibility_update_threshold, 0.5);
        assert_eq!(config.quadtree_max_items, 8);
        assert!(!config.formation_rotate_offsets);
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = SimConfig::load_or_default();
        assert!(config.tick_rate > 0);
    }

    #[test]
    fn test_env_overrides() {
        let config = from_pairs(&[
            ("TICK_RATE", "60"),
            ("VISIBILITY_MARGIN", "4.5"),
            ("FORMATION_ROTATE_OFFSETS", "true"),
            ("SIM_SEED", "1234"),
        ]);
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.visibility_margin, 4.5);
        assert!(config.formation_rotate_offsets);
        assert_eq!(config.seed, Some(1234));
        assert!(config.formation_settings().rotate_offsets);
        assert_eq!(config.visibility_settings().margin, 4.5);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = from_pairs(&[
            ("TICK_RATE", "0"),
            ("QUADTREE_MAX_ITEMS", "many"),
            ("FORMATION_SPACING", "-1"),
            ("SIM_SEED", "abc"),
        ]);
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SimConfig::default();
        config.quadtree_min_node_size = 0.0;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.visibility_margin = -1.0;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.tick_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dt_follows_tick_rate() {
        let config = SimConfig {
            tick_rate: 20,
            ..SimConfig::default()
        };
        assert!((config.dt() - 0.05).abs() < 1e-6);
    }
}
