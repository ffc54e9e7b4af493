//! Spatial indexing and viewport culling

pub mod quadtree;
pub mod viewport;
pub mod visibility;

pub use quadtree::{QuadTree, QuadTreeStats};
pub use viewport::{visible_bounds, OrthographicCamera, ViewportCamera};
pub use visibility::{VisibilityDelta, VisibilityObject, VisibilitySettings, VisibilityTracker};
