//! Camera-to-world viewport projection
//!
//! The presentation layer owns the real camera; the tracker only needs its
//! world position and the world-space corners of its near plane.

use crate::util::rect::Rect;
use crate::util::vec2::Vec2;
use serde::{Deserialize, Serialize};

/// Anything that can report where its viewport lands on the map plane
pub trait ViewportCamera {
    /// World position of the camera, used for the movement threshold
    fn position(&self) -> Vec2;

    /// World-space positions of the viewport corners (0,0), (1,0), (0,1), (1,1)
    /// projected at the near plane
    fn viewport_corners(&self) -> [Vec2; 4];
}

/// Axis-aligned bound of the camera's projected viewport, grown by `margin`
pub fn visible_bounds<C: ViewportCamera + ?Sized>(camera: &C, margin: f32) -> Rect {
    let corners = camera.viewport_corners();
    let rect = Rect::from_points(corners)
        .unwrap_or_else(|| Rect::new(camera.position(), camera.position()));
    rect.expand(margin)
}

/// Orthographic top-down camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrthographicCamera {
    pub position: Vec2,
    /// Half the viewport height in world units
    pub orthographic_size: f32,
    /// Width divided by height
    pub aspect: f32,
    /// Roll around the view axis, radians
    pub rotation: f32,
}

impl OrthographicCamera {
    pub fn new(position: Vec2, orthographic_size: f32, aspect: f32) -> Self {
        Self {
            position,
            orthographic_size,
            aspect,
            rotation: 0.0,
        }
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    fn viewport_to_world(&self, vx: f32, vy: f32) -> Vec2 {
        let half_h = self.orthographic_size;
        let half_w = half_h * self.aspect;
        let local = Vec2::new((vx * 2.0 - 1.0) * half_w, (vy * 2.0 - 1.0) * half_h);
        self.position + local.rotate(self.rotation)
    }
}

impl ViewportCamera for OrthographicCamera {
    fn position(&self) -> Vec2 {
        self.position
    }

    fn viewport_corners(&self) -> [Vec2; 4] {
        [
            self.viewport_to_world(0.0, 0.0),
            self.viewport_to_world(1.0, 0.0),
            self.viewport_to_world(0.0, 1.0),
            self.viewport_to_world(1.0, 1.0),
        ]
    }
}
