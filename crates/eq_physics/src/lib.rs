//! EQ Physics - rigid-body core for racing games
//!
//! This crate provides the collision world used by vehicles and props:
//! a grid broadphase over the XZ plane, per-shape-family narrow phase built
//! on parry, impulse contact resolution and filtered line/sweep queries.
//!
//! # Features
//!
//! - Dynamic, static and ghost (trigger) objects behind generational handles
//! - Sparse XZ grid broadphase, re-indexed as bodies move
//! - Impulse resolution with restitution, friction and position correction
//! - Per-object and per-triangle surface parameters
//! - Line and convex sweep queries with bounded collision filters
//! - Resting bodies freeze until something touches them
//! - Contact events over channels
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  PhysicsWorld                     │
//! │  ┌─────────────┐  ┌───────────────┐  ┌─────────┐ │
//! │  │ ObjectArena │  │ BroadphaseGrid│  │ Queries │ │
//! │  └─────────────┘  └───────────────┘  └─────────┘ │
//! │  ┌──────────────────────────────────────────────┐│
//! │  │               simulate_step                  ││
//! │  │  (integrate, detect, resolve, freeze)        ││
//! │  └──────────────────────────────────────────────┘│
//! └──────────────────────────────────────────────────┘
//!                         │
//!          ┌──────────────┼──────────────┐
//!          ▼              ▼              ▼
//!    ┌──────────┐   ┌───────────┐   ┌──────────┐
//!    │ Convex   │   │ Compound  │   │ Mesh     │
//!    │ Tester   │   │ Tester    │   │ Tester   │
//!    └──────────┘   └───────────┘   └──────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use eq_physics::prelude::*;
//!
//! let mut physics = PhysicsWorld::new(PhysicsConfig::default())?;
//!
//! // Static ground
//! let ground = ObjectDesc::new(ColliderShape::cuboid(50.0, 0.5, 50.0))
//!     .with_position(0.0, -0.5, 0.0)
//!     .build()?;
//! physics.add_static_object(ground);
//!
//! // A falling crate
//! let body = ObjectDesc::new(ColliderShape::cuboid(0.5, 0.5, 0.5))
//!     .with_position(0.0, 10.0, 0.0)
//!     .build()?;
//! let handle = physics.add_to_world(body, true);
//!
//! // Step simulation
//! physics.update(1.0 / 60.0);
//! ```

mod arena;

pub mod body;
pub mod collider;
pub mod config;
pub mod contact;
pub mod controller;
#[cfg(feature = "debug-render")]
pub mod debug;
pub mod error;
pub mod filter;
pub mod grid;
pub mod material;
pub mod narrowphase;
pub mod query;
pub mod world;

pub use arena::ObjectHandle;

pub mod prelude {
    //! Common imports for physics functionality
    pub use crate::arena::ObjectHandle;
    pub use crate::body::{CollisionObject, ObjectDesc, ObjectFlags, ObjectKind};
    pub use crate::collider::{ColliderShape, CompoundPart, ShapeCategory};
    pub use crate::config::PhysicsConfig;
    pub use crate::contact::{CollisionData, CollisionPairData, ContactPair, ContactPairFlags};
    pub use crate::controller::{ConstraintId, ControllerId, PhysicsConstraint, PhysicsController};
    #[cfg(feature = "debug-render")]
    pub use crate::debug::{DebugDrawMode, DebugDrawSink};
    pub use crate::error::{PhysicsError, Result};
    pub use crate::filter::{CollisionFilter, FilterFlags, FilterType};
    pub use crate::material::{CombineRule, SurfaceParam, SurfaceParamId, SurfaceParamTable};
    pub use crate::query::PhysicsQuery;
    pub use crate::world::{PhysicsWorld, SharedPhysicsWorld};
}

pub use prelude::*;
