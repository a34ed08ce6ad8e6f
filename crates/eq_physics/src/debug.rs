//! Debug visualization of world state
//!
//! The world does not render anything itself. Game code supplies a
//! [`DebugDrawSink`] and the world emits boxes and lines into it.

use crate::body::CollisionObject;
use crate::world::PhysicsWorld;
use rapier3d::parry::math::{Point, Real};
use std::ops::BitOr;

/// RGBA colour
pub type DebugColor = [f32; 4];

pub const COLOR_DYNAMIC: DebugColor = [0.2, 0.9, 0.2, 1.0];
pub const COLOR_FROZEN: DebugColor = [0.2, 0.4, 0.9, 1.0];
pub const COLOR_STATIC: DebugColor = [0.6, 0.6, 0.6, 1.0];
pub const COLOR_GHOST: DebugColor = [0.9, 0.8, 0.1, 0.5];
pub const COLOR_CELL: DebugColor = [0.4, 0.1, 0.4, 0.3];
pub const COLOR_CONTACT: DebugColor = [1.0, 0.1, 0.1, 1.0];

/// Length of drawn contact normals
const NORMAL_LENGTH: Real = 0.5;

/// What to draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugDrawMode(u32);

impl DebugDrawMode {
    pub const NONE: Self = Self(0);
    pub const AABBS: Self = Self(1 << 0);
    pub const GRID: Self = Self(1 << 1);
    pub const CONTACTS: Self = Self(1 << 2);
    pub const ALL: Self = Self(Self::AABBS.0 | Self::GRID.0 | Self::CONTACTS.0);

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DebugDrawMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Receiver of debug primitives
pub trait DebugDrawSink {
    fn draw_box(&mut self, mins: Point<Real>, maxs: Point<Real>, color: DebugColor);
    fn draw_line(&mut self, from: Point<Real>, to: Point<Real>, color: DebugColor);
}

fn object_color(object: &CollisionObject) -> DebugColor {
    if object.is_ghost() {
        COLOR_GHOST
    } else if object.is_static() {
        COLOR_STATIC
    } else if object.is_frozen() {
        COLOR_FROZEN
    } else {
        COLOR_DYNAMIC
    }
}

impl PhysicsWorld {
    /// Emit debug primitives for the current world state
    pub fn debug_draw_bodies(&self, mode: DebugDrawMode, sink: &mut dyn DebugDrawSink) {
        if mode.contains(DebugDrawMode::AABBS) {
            for (_, object) in self.iter_objects() {
                let aabb = object.aabb();
                sink.draw_box(aabb.mins, aabb.maxs, object_color(object));
            }
        }

        if mode.contains(DebugDrawMode::GRID) {
            let grid = self.grid();
            for cell in grid.occupied() {
                let bounds = grid.cell_bounds(cell);
                sink.draw_box(bounds.mins, bounds.maxs, COLOR_CELL);
            }
        }

        if mode.contains(DebugDrawMode::CONTACTS) {
            for pair in self.contacts() {
                sink.draw_line(pair.position, pair.position + pair.normal * NORMAL_LENGTH, COLOR_CONTACT);
            }
        }
    }
}
