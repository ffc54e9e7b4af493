//! Axis-aligned world rectangle used for quadtree bounds and viewport queries.
//!
//! Containment and intersection are closed on every edge, so a point lying
//! exactly on a query edge is reported.

use crate::util::vec2::Vec2;
use serde::{Deserialize, Serialize};

/// Quadrant index bit for the east half (`x >= center.x`)
const EAST: usize = 0b01;
/// Quadrant index bit for the north half (`y >= center.y`)
const NORTH: usize = 0b10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center_half_extents(center: Vec2, half_extents: Vec2) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    /// Smallest rectangle enclosing every point, `None` for an empty input
    pub fn from_points<I: IntoIterator<Item = Vec2>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
        Some(Self { min, max })
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    #[inline]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Grow by `margin` on all four sides
    pub fn expand(&self, margin: f32) -> Self {
        let m = Vec2::new(margin, margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Quadrant a point falls into, indexed as in [`Rect::quadrants`].
    ///
    /// Points on the centre lines go east / north, so every point maps to
    /// exactly one quadrant.
    #[inline]
    pub fn quadrant_of(&self, point: Vec2) -> usize {
        let c = self.center();
        let mut index = 0;
        if point.x >= c.x {
            index |= EAST;
        }
        if point.y >= c.y {
            index |= NORTH;
        }
        index
    }

    /// Four equal quadrants: south-west, south-east, north-west, north-east
    pub fn quadrants(&self) -> [Rect; 4] {
        let c = self.center();
        [
            Rect { min: self.min, max: c },
            Rect {
                min: Vec2::new(c.x, self.min.y),
                max: Vec2::new(self.max.x, c.y),
            },
            Rect {
                min: Vec2::new(self.min.x, c.y),
                max: Vec2::new(c.x, self.max.y),
            },
            Rect { min: c, max: self.max },
        ]
    }

    pub fn approx_eq(&self, other: &Rect, epsilon: f32) -> bool {
        self.min.approx_eq(other.min, epsilon) && self.max.approx_eq(other.max, epsilon)
    }
}
