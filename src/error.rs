//! Errors surfaced at the `World` API boundary
//!
//! Tick-time degradation (out-of-bounds inserts, dead targets, unknown layers
//! during updates) is logged and absorbed; only caller mistakes land here.

use crate::sim::entity::EntityId;
use crate::sim::formation::FormationId;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("Entity not found: {0}")]
    UnknownEntity(EntityId),
    #[error("Formation not found: {0}")]
    UnknownFormation(FormationId),
    #[error("Layer not found: {0}")]
    UnknownLayer(String),
    #[error("{0} has no movement component")]
    NotMovable(EntityId),
    #[error("{0} has no combat component")]
    NotCombatant(EntityId),
    #[error("{0} is dead")]
    Dead(EntityId),
    #[error("Invalid formation: {0}")]
    InvalidFormation(String),
    #[error("{entity} already belongs to {formation}")]
    AlreadyInFormation {
        entity: EntityId,
        formation: FormationId,
    },
}

pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            SimError::UnknownEntity(EntityId(4)).to_string(),
            "Entity not found: entity#4"
        );
        assert_eq!(
            SimError::AlreadyInFormation {
                entity: EntityId(2),
                formation: FormationId(1),
            }
            .to_string(),
            "entity#2 already belongs to formation#1"
        );
    }
}
