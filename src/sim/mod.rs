pub mod animation;
pub mod combat;
pub mod command;
pub mod entity;
pub mod formation;
pub mod performance;
pub mod state;
pub mod task;
pub mod world;

pub use entity::{EntityId, SpawnDesc};
pub use formation::{FormationId, FormationShape, Tactic, UnitRole};
pub use world::{TickReport, ViewportFeed, World};
