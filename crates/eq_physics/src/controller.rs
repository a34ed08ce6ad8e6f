//! Controllers and constraints run inside the simulation loop
//!
//! Controllers drive bodies every substep (vehicle wheels, hovering props,
//! scripted movers). Constraints are applied right after them. The world
//! takes both lists out while they run, so a controller may freely mutate
//! the world it is given.

use crate::world::PhysicsWorld;
use rapier3d::parry::math::Real;

/// Identifier returned when registering a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(pub(crate) u32);

/// Identifier returned when registering a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(pub(crate) u32);

/// Per-substep driver of one or more bodies
pub trait PhysicsController: Send + Sync {
    /// Disabled controllers stay registered but are skipped
    fn is_enabled(&self) -> bool {
        true
    }

    /// Called once per substep before integration
    fn update(&mut self, world: &mut PhysicsWorld, dt: Real);
}

/// Per-substep constraint between bodies
pub trait PhysicsConstraint: Send + Sync {
    fn is_enabled(&self) -> bool {
        true
    }

    /// Called once per substep after controllers
    fn apply(&mut self, world: &mut PhysicsWorld, dt: Real);
}

impl<F> PhysicsController for F
where
    F: FnMut(&mut PhysicsWorld, Real) + Send + Sync,
{
    fn update(&mut self, world: &mut PhysicsWorld, dt: Real) {
        self(world, dt)
    }
}

pub(crate) struct ControllerEntry {
    pub id: ControllerId,
    pub controller: Box<dyn PhysicsController>,
}

pub(crate) struct ConstraintEntry {
    pub id: ConstraintId,
    pub constraint: Box<dyn PhysicsConstraint>,
}
