//! Collision objects and rigid body state
//!
//! A [`CollisionObject`] is anything the world can place in the grid: a
//! dynamic rigid body, an immovable static object or a ghost (trigger)
//! volume. Game code builds objects and registers them; the registration
//! call decides the [`ObjectKind`].

use crate::collider::{isometry_from_parts, ColliderShape, ShapeCategory};
use crate::contact::CollisionPairData;
use crate::error::Result;
use crate::grid::CellRange;
use crate::material::SurfaceParamId;
use rapier3d::na::{Matrix3, Translation3, UnitQuaternion};
use rapier3d::parry::bounding_volume::Aabb;
use rapier3d::parry::math::{Isometry, Point, Real, Vector};
use rapier3d::parry::shape::{Shape, SharedShape};
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// Contents bit set on objects that do not choose their own
pub const CONTENTS_DEFAULT: u32 = 1;

/// Mask matching every contents bit
pub const COLLISION_MASK_ALL: u32 = u32::MAX;

/// Role of an object in the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Integrated and resolved every step
    #[default]
    Dynamic,
    /// Never moves; immovable collision target
    Static,
    /// Reports overlaps, never receives or causes a response
    Ghost,
}

/// Per-object behaviour flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ObjectFlags(u32);

impl ObjectFlags {
    pub const NONE: Self = Self(0);
    /// Contacts with this object are detected but never resolved
    pub const NO_RESPONSE: Self = Self(1 << 0);
    /// Ignored by queries unless the filter forces raycasts
    pub const NO_RAYCAST: Self = Self(1 << 1);
    /// Record contacts into the object's collision list
    pub const COLLISION_LIST: Self = Self(1 << 2);
    /// Contacts are marked as silent for impact audio
    pub const NO_SOUND: Self = Self(1 << 3);
    /// Excluded from step collision detection entirely
    pub const DISABLE_COLLISION_CHECK: Self = Self(1 << 4);
    /// Never frozen when resting
    pub const NO_AUTO_FREEZE: Self = Self(1 << 5);

    /// Raw bits
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Create from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Check if all flags in `other` are set
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the flags in `other`
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the flags in `other`
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for ObjectFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ObjectFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Anything the physics world can hold
pub struct CollisionObject {
    kind: ObjectKind,
    shape: SharedShape,
    category: ShapeCategory,
    triangle_surfaces: Option<Vec<SurfaceParamId>>,
    part_surfaces: Option<Vec<Option<SurfaceParamId>>>,

    position: Point<Real>,
    orientation: UnitQuaternion<Real>,
    linear_velocity: Vector<Real>,
    angular_velocity: Vector<Real>,
    force: Vector<Real>,
    torque: Vector<Real>,

    inv_mass: Real,
    inv_principal_inertia: Vector<Real>,
    inertia_frame: UnitQuaternion<Real>,
    gravity_scale: Real,
    linear_damping: Real,
    angular_damping: Real,

    surface: Option<SurfaceParamId>,
    flags: ObjectFlags,
    contents: u32,
    collision_mask: u32,
    user_data: u128,

    aabb: Aabb,
    pub(crate) cell: Option<CellRange>,
    pub(crate) moveable: bool,
    frozen: bool,
    freeze_timer: Real,
    pub(crate) collisions: Vec<CollisionPairData>,
}

impl CollisionObject {
    /// Wrap a geometry-library shape. The object starts at the origin with
    /// unit mass.
    pub fn new(shape: SharedShape) -> Self {
        let category = ShapeCategory::of(shape.as_ref());
        let mut object = Self {
            kind: ObjectKind::Dynamic,
            shape,
            category,
            triangle_surfaces: None,
            part_surfaces: None,
            position: Point::origin(),
            orientation: UnitQuaternion::identity(),
            linear_velocity: Vector::zeros(),
            angular_velocity: Vector::zeros(),
            force: Vector::zeros(),
            torque: Vector::zeros(),
            inv_mass: 0.0,
            inv_principal_inertia: Vector::zeros(),
            inertia_frame: UnitQuaternion::identity(),
            gravity_scale: 1.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            surface: None,
            flags: ObjectFlags::COLLISION_LIST,
            contents: CONTENTS_DEFAULT,
            collision_mask: COLLISION_MASK_ALL,
            user_data: 0,
            aabb: Aabb::new_invalid(),
            cell: None,
            moveable: false,
            frozen: false,
            freeze_timer: 0.0,
            collisions: Vec::new(),
        };
        object.set_mass(1.0);
        object.update_aabb();
        object
    }

    // ==================== Identity ====================

    /// Role assigned at registration
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub(crate) fn set_kind(&mut self, kind: ObjectKind) {
        self.kind = kind;
        if kind != ObjectKind::Dynamic {
            self.linear_velocity = Vector::zeros();
            self.angular_velocity = Vector::zeros();
            self.frozen = false;
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind == ObjectKind::Dynamic
    }

    pub fn is_static(&self) -> bool {
        self.kind == ObjectKind::Static
    }

    pub fn is_ghost(&self) -> bool {
        self.kind == ObjectKind::Ghost
    }

    /// Shape handle from the geometry library
    pub fn shape(&self) -> &dyn Shape {
        self.shape.as_ref()
    }

    /// Shared shape handle
    pub fn shared_shape(&self) -> &SharedShape {
        &self.shape
    }

    /// Narrow-phase category of the shape
    pub fn category(&self) -> ShapeCategory {
        self.category
    }

    /// Opaque game-side value (entity id, etc.)
    pub fn user_data(&self) -> u128 {
        self.user_data
    }

    pub fn set_user_data(&mut self, data: u128) {
        self.user_data = data;
    }

    // ==================== Transform ====================

    pub fn position(&self) -> Point<Real> {
        self.position
    }

    pub fn orientation(&self) -> UnitQuaternion<Real> {
        self.orientation
    }

    /// Rigid transform of the shape
    pub fn isometry(&self) -> Isometry<Real> {
        Isometry::from_parts(Translation3::from(self.position.coords), self.orientation)
    }

    /// World-space bounding box for the current transform
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// Grid cells this object currently occupies
    pub fn cell_range(&self) -> Option<CellRange> {
        self.cell
    }

    pub(crate) fn set_position(&mut self, position: Point<Real>) {
        self.position = position;
        self.update_aabb();
    }

    pub(crate) fn set_orientation(&mut self, orientation: UnitQuaternion<Real>) {
        self.orientation = orientation;
        self.update_aabb();
    }

    fn update_aabb(&mut self) {
        self.aabb = self.shape.compute_aabb(&self.isometry());
    }

    // ==================== Motion ====================

    pub fn linear_velocity(&self) -> Vector<Real> {
        self.linear_velocity
    }

    pub fn angular_velocity(&self) -> Vector<Real> {
        self.angular_velocity
    }

    /// Set linear velocity. Wakes a frozen body.
    pub fn set_linear_velocity(&mut self, velocity: Vector<Real>) {
        if self.is_dynamic() {
            self.linear_velocity = velocity;
            self.wake();
        }
    }

    /// Set angular velocity. Wakes a frozen body.
    pub fn set_angular_velocity(&mut self, velocity: Vector<Real>) {
        if self.is_dynamic() {
            self.angular_velocity = velocity;
            self.wake();
        }
    }

    /// Velocity of the body at a world point
    pub fn velocity_at_point(&self, point: &Point<Real>) -> Vector<Real> {
        self.linear_velocity + self.angular_velocity.cross(&(point - self.position))
    }

    /// Accumulate a force through the center of mass until the next integration
    pub fn apply_force(&mut self, force: Vector<Real>) {
        if self.is_dynamic() {
            self.force += force;
            self.wake();
        }
    }

    /// Accumulate a torque until the next integration
    pub fn apply_torque(&mut self, torque: Vector<Real>) {
        if self.is_dynamic() {
            self.torque += torque;
            self.wake();
        }
    }

    /// Apply an impulse through the center of mass
    pub fn apply_linear_impulse(&mut self, impulse: Vector<Real>) {
        if self.is_dynamic() {
            self.linear_velocity += impulse * self.inv_mass;
            self.wake();
        }
    }

    /// Apply an impulse at a world point
    pub fn apply_impulse_at_point(&mut self, impulse: Vector<Real>, point: &Point<Real>) {
        if self.is_dynamic() {
            self.apply_impulse_unchecked(&impulse, point);
            self.wake();
        }
    }

    pub(crate) fn apply_impulse_unchecked(&mut self, impulse: &Vector<Real>, point: &Point<Real>) {
        let arm = point - self.position;
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.world_inv_inertia() * arm.cross(impulse);
    }

    // ==================== Mass ====================

    /// Set mass; zero or less means infinite mass
    pub fn set_mass(&mut self, mass: Real) {
        if !(mass.is_finite() && mass > 0.0) {
            self.inv_mass = 0.0;
            self.inv_principal_inertia = Vector::zeros();
            self.inertia_frame = UnitQuaternion::identity();
            return;
        }

        let props = self.shape.mass_properties(1.0);
        let unit_mass = props.mass();
        if unit_mass.is_finite() && unit_mass > Real::EPSILON {
            let scale = mass / unit_mass;
            self.inv_principal_inertia = props.inv_principal_inertia_sqrt.map(|v| v * v / scale);
            self.inertia_frame = props.principal_inertia_local_frame;
        } else {
            // Zero-volume shapes (open meshes) get a solid sphere around their bounds.
            let radius = self.shape.compute_local_aabb().half_extents().norm().max(0.01);
            let inertia = 0.4 * mass * radius * radius;
            self.inv_principal_inertia = Vector::repeat(1.0 / inertia);
            self.inertia_frame = UnitQuaternion::identity();
        }
        self.inv_mass = 1.0 / mass;
    }

    /// Mass, or infinity for immovable objects
    pub fn mass(&self) -> Real {
        if self.inv_mass > 0.0 {
            1.0 / self.inv_mass
        } else {
            Real::INFINITY
        }
    }

    /// Inverse mass as seen by contact resolution (zero unless dynamic)
    pub fn effective_inv_mass(&self) -> Real {
        if self.is_dynamic() {
            self.inv_mass
        } else {
            0.0
        }
    }

    /// World-space inverse inertia tensor (zero unless dynamic)
    pub fn world_inv_inertia(&self) -> Matrix3<Real> {
        if !self.is_dynamic() {
            return Matrix3::zeros();
        }
        let rotation = (self.orientation * self.inertia_frame).to_rotation_matrix();
        let basis = rotation.matrix();
        basis * Matrix3::from_diagonal(&self.inv_principal_inertia) * basis.transpose()
    }

    pub fn gravity_scale(&self) -> Real {
        self.gravity_scale
    }

    pub fn set_gravity_scale(&mut self, scale: Real) {
        self.gravity_scale = scale;
    }

    pub fn set_damping(&mut self, linear: Real, angular: Real) {
        self.linear_damping = linear.max(0.0);
        self.angular_damping = angular.max(0.0);
    }

    // ==================== Surface & filtering ====================

    /// Surface parameter of the whole object
    pub fn surface(&self) -> Option<SurfaceParamId> {
        self.surface
    }

    pub fn set_surface(&mut self, surface: Option<SurfaceParamId>) {
        self.surface = surface;
    }

    /// Surface of one mesh triangle, falling back to the object surface
    pub fn triangle_surface(&self, triangle: u32) -> Option<SurfaceParamId> {
        self.triangle_surfaces
            .as_ref()
            .and_then(|surfaces| surfaces.get(triangle as usize).copied())
            .or(self.surface)
    }

    /// Surface of one compound part, falling back to the object surface
    pub fn part_surface(&self, part: usize) -> Option<SurfaceParamId> {
        self.part_surfaces
            .as_ref()
            .and_then(|surfaces| surfaces.get(part).copied().flatten())
            .or(self.surface)
    }

    /// Attach per-triangle surfaces to a mesh object
    pub fn set_triangle_surfaces(&mut self, surfaces: Option<Vec<SurfaceParamId>>) {
        self.triangle_surfaces = surfaces;
    }

    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: ObjectFlags) {
        self.flags = flags;
    }

    /// Contents bits tested against query masks
    pub fn contents(&self) -> u32 {
        self.contents
    }

    /// Contents bits this object collides with
    pub fn collision_mask(&self) -> u32 {
        self.collision_mask
    }

    pub fn set_contents(&mut self, contents: u32, collision_mask: u32) {
        self.contents = contents;
        self.collision_mask = collision_mask;
    }

    /// Check contents/mask compatibility in both directions
    pub fn can_collide_with(&self, other: &CollisionObject) -> bool {
        (self.contents & other.collision_mask) != 0 && (other.contents & self.collision_mask) != 0
    }

    // ==================== Simulation state ====================

    /// Re-indexed into the grid every step
    pub fn is_moveable(&self) -> bool {
        self.moveable
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Unfreeze the body
    pub fn wake(&mut self) {
        self.frozen = false;
        self.freeze_timer = 0.0;
    }

    /// Contacts recorded during the last simulate call
    pub fn collision_list(&self) -> &[CollisionPairData] {
        &self.collisions
    }

    /// Advance position and orientation by the current velocity.
    /// Returns `true` if the transform changed.
    pub(crate) fn integrate(&mut self, dt: Real, gravity: &Vector<Real>) -> bool {
        if !self.is_dynamic() || self.frozen {
            return false;
        }

        if self.inv_mass > 0.0 {
            self.linear_velocity += (gravity * self.gravity_scale + self.force * self.inv_mass) * dt;
            self.angular_velocity += self.world_inv_inertia() * self.torque * dt;
        }
        self.force = Vector::zeros();
        self.torque = Vector::zeros();

        if self.linear_damping > 0.0 {
            self.linear_velocity *= 1.0 / (1.0 + dt * self.linear_damping);
        }
        if self.angular_damping > 0.0 {
            self.angular_velocity *= 1.0 / (1.0 + dt * self.angular_damping);
        }

        let moves = self.linear_velocity != Vector::zeros();
        let spins = self.angular_velocity != Vector::zeros();
        if !moves && !spins {
            return false;
        }

        if moves {
            self.position += self.linear_velocity * dt;
        }
        if spins {
            self.orientation = UnitQuaternion::from_scaled_axis(self.angular_velocity * dt) * self.orientation;
            self.orientation.renormalize_fast();
        }
        self.update_aabb();
        true
    }

    /// Track resting time and freeze the body once it stayed slow long enough
    pub(crate) fn update_freeze(&mut self, dt: Real, linear_threshold: Real, angular_threshold: Real, freeze_time: Real) {
        if !self.is_dynamic() || self.frozen || self.flags.contains(ObjectFlags::NO_AUTO_FREEZE) {
            return;
        }

        let slow = self.linear_velocity.norm() < linear_threshold
            && self.angular_velocity.norm() < angular_threshold;
        if !slow {
            self.freeze_timer = 0.0;
            return;
        }

        self.freeze_timer += dt;
        if self.freeze_timer >= freeze_time {
            self.frozen = true;
            self.linear_velocity = Vector::zeros();
            self.angular_velocity = Vector::zeros();
        }
    }
}

impl std::fmt::Debug for CollisionObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionObject")
            .field("kind", &self.kind)
            .field("category", &self.category)
            .field("position", &self.position)
            .field("linear_velocity", &self.linear_velocity)
            .field("flags", &self.flags)
            .field("frozen", &self.frozen)
            .finish()
    }
}

/// Description for creating a collision object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDesc {
    /// Collision shape
    pub shape: ColliderShape,
    /// Initial position
    pub position: [f32; 3],
    /// Initial rotation (quaternion: x, y, z, w)
    pub rotation: [f32; 4],
    /// Initial linear velocity
    pub linear_velocity: [f32; 3],
    /// Initial angular velocity
    pub angular_velocity: [f32; 3],
    /// Mass (0 = immovable)
    pub mass: f32,
    /// Gravity scale (0 = no gravity, 1 = normal, 2 = double)
    pub gravity_scale: f32,
    /// Linear damping (air resistance)
    pub linear_damping: f32,
    /// Angular damping (rotational resistance)
    pub angular_damping: f32,
    /// Surface parameter id
    pub surface: Option<SurfaceParamId>,
    /// Behaviour flags
    pub flags: ObjectFlags,
    /// Contents bits
    pub contents: u32,
    /// Contents this object collides with
    pub collision_mask: u32,
    /// User data (entity ID, etc.)
    pub user_data: u128,
}

impl Default for ObjectDesc {
    fn default() -> Self {
        Self {
            shape: ColliderShape::default(),
            position: [0.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
            linear_velocity: [0.0, 0.0, 0.0],
            angular_velocity: [0.0, 0.0, 0.0],
            mass: 1.0,
            gravity_scale: 1.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            surface: None,
            flags: ObjectFlags::COLLISION_LIST,
            contents: CONTENTS_DEFAULT,
            collision_mask: COLLISION_MASK_ALL,
            user_data: 0,
        }
    }
}

impl ObjectDesc {
    /// Create a description with a shape
    pub fn new(shape: ColliderShape) -> Self {
        Self {
            shape,
            ..Default::default()
        }
    }

    /// Set position
    pub fn with_position(mut self, x: f32, y: f32, z: f32) -> Self {
        self.position = [x, y, z];
        self
    }

    /// Set rotation from euler angles (radians)
    pub fn with_rotation_euler(mut self, x: f32, y: f32, z: f32) -> Self {
        self.rotation = euler_to_quat(x, y, z);
        self
    }

    /// Set linear velocity
    pub fn with_linear_velocity(mut self, x: f32, y: f32, z: f32) -> Self {
        self.linear_velocity = [x, y, z];
        self
    }

    /// Set angular velocity
    pub fn with_angular_velocity(mut self, x: f32, y: f32, z: f32) -> Self {
        self.angular_velocity = [x, y, z];
        self
    }

    /// Set mass
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    /// Set gravity scale
    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    /// Set damping
    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    /// Set surface parameter
    pub fn with_surface(mut self, surface: SurfaceParamId) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Set behaviour flags
    pub fn with_flags(mut self, flags: ObjectFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set contents and collision mask
    pub fn with_contents(mut self, contents: u32, collision_mask: u32) -> Self {
        self.contents = contents;
        self.collision_mask = collision_mask;
        self
    }

    /// Set user data
    pub fn with_user_data(mut self, data: u128) -> Self {
        self.user_data = data;
        self
    }

    /// Build the object
    pub fn build(&self) -> Result<CollisionObject> {
        let shape = self.shape.to_shared()?;
        let mut object = CollisionObject::new(shape);

        let transform = isometry_from_parts(self.position, self.rotation);
        object.position = Point::from(transform.translation.vector);
        object.orientation = transform.rotation;
        object.linear_velocity = Vector::from(self.linear_velocity);
        object.angular_velocity = Vector::from(self.angular_velocity);
        object.set_mass(self.mass);
        object.gravity_scale = self.gravity_scale;
        object.set_damping(self.linear_damping, self.angular_damping);
        object.surface = self.surface;
        object.triangle_surfaces = self.shape.triangle_surfaces().map(|s| s.to_vec());
        object.part_surfaces = self.shape.part_surfaces();
        object.flags = self.flags;
        object.contents = self.contents;
        object.collision_mask = self.collision_mask;
        object.user_data = self.user_data;
        object.update_aabb();
        Ok(object)
    }
}

/// Convert euler angles to quaternion
fn euler_to_quat(x: f32, y: f32, z: f32) -> [f32; 4] {
    let (sx, cx) = (x * 0.5).sin_cos();
    let (sy, cy) = (y * 0.5).sin_cos();
    let (sz, cz) = (z * 0.5).sin_cos();

    [
        sx * cy * cz - cx * sy * sz,
        cx * sy * cz + sx * cy * sz,
        cx * cy * sz - sx * sy * cz,
        cx * cy * cz + sx * sy * sz,
    ]
}
