//! Physics world - main simulation container

use crate::arena::{ObjectArena, ObjectHandle};
use crate::body::{CollisionObject, ObjectFlags, ObjectKind};
use crate::config::PhysicsConfig;
use crate::contact::{CollisionData, ContactEventHub, ContactPair, ContactPairFlags};
use crate::controller::{
    ConstraintEntry, ConstraintId, ControllerEntry, ControllerId, PhysicsConstraint, PhysicsController,
};
use crate::error::{PhysicsError, Result};
use crate::filter::CollisionFilter;
use crate::grid::{BroadphaseGrid, WORLD_LIMIT};
use crate::material::{SurfaceParam, SurfaceParamId, SurfaceParamTable};
use crate::narrowphase::pair_tester;
use crate::query::PhysicsQuery;
use crossbeam_channel::Receiver;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rapier3d::na::UnitQuaternion;
use rapier3d::parry::bounding_volume::{Aabb, BoundingVolume};
use rapier3d::parry::math::{Point, Real, Vector};
use rapier3d::parry::shape::Shape;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// The main physics world containing all simulation state
pub struct PhysicsWorld {
    /// Configuration
    config: PhysicsConfig,

    /// Gravity
    gravity: Vector<Real>,

    /// Every registered object
    objects: ObjectArena<CollisionObject>,

    /// Broadphase grid
    grid: BroadphaseGrid,

    /// Dynamic bodies, in registration order
    dynamics: Vec<ObjectHandle>,

    /// Dynamic bodies re-indexed every step
    moveables: Vec<ObjectHandle>,

    /// Static objects
    statics: Vec<ObjectHandle>,

    /// Ghost objects
    ghosts: Vec<ObjectHandle>,

    controllers: Vec<ControllerEntry>,
    constraints: Vec<ConstraintEntry>,
    next_controller_id: u32,
    next_constraint_id: u32,

    /// Surface parameters shared with game code
    surface_params: Arc<SurfaceParamTable>,

    /// Contacts resolved during the last simulate call
    contacts: Vec<ContactPair>,

    /// Contact subscribers
    events: ContactEventHub,

    /// Narrow-phase tests run by queries since the last simulate call
    raycast_counter: AtomicU32,

    /// Accumulated time for fixed timestep
    accumulated_time: Real,
}

impl PhysicsWorld {
    /// Create a new physics world
    pub fn new(config: PhysicsConfig) -> Result<Self> {
        if let Err(err) = config.validate() {
            log::error!("Failed to create physics world: {}", err);
            return Err(err);
        }
        let world = Self::with_valid_config(config);
        log::debug!(
            "Created physics world (cell size {}, timestep {})",
            world.config.grid_cell_size,
            world.config.timestep
        );
        Ok(world)
    }

    fn with_valid_config(config: PhysicsConfig) -> Self {
        Self {
            gravity: Vector::from(config.gravity),
            grid: BroadphaseGrid::new(config.grid_cell_size),
            config,
            objects: ObjectArena::new(),
            dynamics: Vec::new(),
            moveables: Vec::new(),
            statics: Vec::new(),
            ghosts: Vec::new(),
            controllers: Vec::new(),
            constraints: Vec::new(),
            next_controller_id: 0,
            next_constraint_id: 0,
            surface_params: Arc::new(SurfaceParamTable::new()),
            contacts: Vec::new(),
            events: ContactEventHub::default(),
            raycast_counter: AtomicU32::new(0),
            accumulated_time: 0.0,
        }
    }

    /// Get the physics configuration
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Set gravity
    pub fn set_gravity(&mut self, x: f32, y: f32, z: f32) {
        self.gravity = Vector::new(x, y, z);
    }

    /// Get gravity
    pub fn gravity(&self) -> [f32; 3] {
        [self.gravity.x, self.gravity.y, self.gravity.z]
    }

    // ==================== Registration ====================

    /// Add a dynamic body. Moveable bodies are re-indexed into the grid
    /// every step; others only when they actually move.
    pub fn add_to_world(&mut self, mut object: CollisionObject, moveable: bool) -> ObjectHandle {
        object.set_kind(ObjectKind::Dynamic);
        object.moveable = moveable;
        let handle = self.insert_object(object);
        self.dynamics.push(handle);
        if moveable {
            self.moveables.push(handle);
        }
        log::debug!("Added dynamic body {:?} (moveable: {})", handle, moveable);
        handle
    }

    /// Add an immovable object
    pub fn add_static_object(&mut self, mut object: CollisionObject) -> ObjectHandle {
        object.set_kind(ObjectKind::Static);
        let handle = self.insert_object(object);
        self.statics.push(handle);
        log::debug!("Added static object {:?}", handle);
        handle
    }

    /// Add a ghost (trigger) object
    pub fn add_ghost_object(&mut self, mut object: CollisionObject) -> ObjectHandle {
        object.set_kind(ObjectKind::Ghost);
        let handle = self.insert_object(object);
        self.ghosts.push(handle);
        log::debug!("Added ghost object {:?}", handle);
        handle
    }

    fn insert_object(&mut self, mut object: CollisionObject) -> ObjectHandle {
        object.moveable = object.moveable && object.is_dynamic();
        object.cell = None;
        object.collisions.clear();
        let handle = self.objects.insert(object);
        if let Some(object) = self.objects.get(handle) {
            warn_outside_limit(handle, object);
        }
        self.refresh_cells(handle);
        handle
    }

    /// Remove a dynamic body and hand it back
    pub fn remove_from_world(&mut self, handle: ObjectHandle) -> Option<CollisionObject> {
        if !self.is_valid_body(handle) {
            return None;
        }
        self.dynamics.retain(|h| *h != handle);
        self.moveables.retain(|h| *h != handle);
        log::debug!("Removed dynamic body {:?}", handle);
        self.detach_object(handle)
    }

    /// Remove a static object and hand it back
    pub fn remove_static_object(&mut self, handle: ObjectHandle) -> Option<CollisionObject> {
        if !self.is_valid_static_object(handle) {
            return None;
        }
        self.statics.retain(|h| *h != handle);
        log::debug!("Removed static object {:?}", handle);
        self.detach_object(handle)
    }

    /// Remove a ghost object and hand it back
    pub fn remove_ghost_object(&mut self, handle: ObjectHandle) -> Option<CollisionObject> {
        if !self.is_valid_ghost_object(handle) {
            return None;
        }
        self.ghosts.retain(|h| *h != handle);
        log::debug!("Removed ghost object {:?}", handle);
        self.detach_object(handle)
    }

    fn detach_object(&mut self, handle: ObjectHandle) -> Option<CollisionObject> {
        let mut object = self.objects.remove(handle)?;
        if let Some(range) = object.cell.take() {
            self.grid.remove_object(handle, range);
        }
        self.wake_frozen_near(object.aabb(), handle);
        object.moveable = false;
        object.collisions.clear();
        Some(object)
    }

    /// Wake frozen dynamic bodies touching `region`. Frozen bodies run no
    /// detection, so nothing else notices a support moving away.
    fn wake_frozen_near(&mut self, region: &Aabb, except: ObjectHandle) {
        let reach = self.config.contact_prediction.max(self.config.penetration_slop).max(0.0);
        let region = region.loosened(reach);
        let range = self.grid.cell_range(&region);
        let mut sleepers: Vec<ObjectHandle> = self
            .grid
            .objects_in_range(range)
            .filter(|handle| *handle != except)
            .filter(|handle| {
                self.objects.get(*handle).map_or(false, |object| {
                    object.is_dynamic() && object.is_frozen() && object.aabb().intersects(&region)
                })
            })
            .collect();
        sleepers.sort_unstable();
        sleepers.dedup();
        for handle in sleepers {
            if let Some(object) = self.objects.get_mut(handle) {
                log::trace!("Waking {:?} after a neighbour moved", handle);
                object.wake();
            }
        }
    }

    /// Remove and drop a dynamic body
    pub fn destroy_body(&mut self, handle: ObjectHandle) -> bool {
        self.remove_from_world(handle).is_some()
    }

    /// Remove and drop a static object
    pub fn destroy_static_object(&mut self, handle: ObjectHandle) -> bool {
        self.remove_static_object(handle).is_some()
    }

    /// Remove and drop a ghost object
    pub fn destroy_ghost_object(&mut self, handle: ObjectHandle) -> bool {
        self.remove_ghost_object(handle).is_some()
    }

    /// Check that the handle refers to a live dynamic body
    pub fn is_valid_body(&self, handle: ObjectHandle) -> bool {
        self.is_valid_kind(handle, ObjectKind::Dynamic)
    }

    /// Check that the handle refers to a live static object
    pub fn is_valid_static_object(&self, handle: ObjectHandle) -> bool {
        self.is_valid_kind(handle, ObjectKind::Static)
    }

    /// Check that the handle refers to a live ghost object
    pub fn is_valid_ghost_object(&self, handle: ObjectHandle) -> bool {
        self.is_valid_kind(handle, ObjectKind::Ghost)
    }

    fn is_valid_kind(&self, handle: ObjectHandle, kind: ObjectKind) -> bool {
        self.objects.get(handle).map_or(false, |object| object.kind() == kind)
    }

    // ==================== Objects ====================

    /// Get a registered object
    pub fn object(&self, handle: ObjectHandle) -> Option<&CollisionObject> {
        self.objects.get(handle)
    }

    /// Get a registered object mutably
    pub fn object_mut(&mut self, handle: ObjectHandle) -> Option<&mut CollisionObject> {
        self.objects.get_mut(handle)
    }

    fn object_or_err(&mut self, handle: ObjectHandle) -> Result<&mut CollisionObject> {
        self.objects.get_mut(handle).ok_or(PhysicsError::ObjectNotFound(handle))
    }

    /// Iterate over every registered object
    pub fn iter_objects(&self) -> impl Iterator<Item = (ObjectHandle, &CollisionObject)> {
        self.objects.iter()
    }

    /// Dynamic body handles
    pub fn bodies(&self) -> &[ObjectHandle] {
        &self.dynamics
    }

    /// Moveable body handles
    pub fn moveable_bodies(&self) -> &[ObjectHandle] {
        &self.moveables
    }

    /// Static object handles
    pub fn static_objects(&self) -> &[ObjectHandle] {
        &self.statics
    }

    /// Ghost object handles
    pub fn ghost_objects(&self) -> &[ObjectHandle] {
        &self.ghosts
    }

    /// Get number of registered objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Get the broadphase grid
    pub fn grid(&self) -> &BroadphaseGrid {
        &self.grid
    }

    /// Change whether a dynamic body is re-indexed every step
    pub fn set_moveable(&mut self, handle: ObjectHandle, moveable: bool) -> Result<()> {
        if !self.is_valid_body(handle) {
            return Err(PhysicsError::ObjectNotFound(handle));
        }
        self.object_or_err(handle)?.moveable = moveable;
        self.moveables.retain(|h| *h != handle);
        if moveable {
            self.moveables.push(handle);
        }
        Ok(())
    }

    /// Re-index an object into the grid cells its bounds overlap.
    /// Returns `true` if its cell set changed.
    pub fn setup_body_on_cell(&mut self, handle: ObjectHandle) -> Result<bool> {
        if !self.objects.contains(handle) {
            return Err(PhysicsError::ObjectNotFound(handle));
        }
        Ok(self.refresh_cells(handle))
    }

    fn refresh_cells(&mut self, handle: ObjectHandle) -> bool {
        let Some(object) = self.objects.get_mut(handle) else {
            return false;
        };
        let range = self.grid.cell_range(object.aabb());
        let old = object.cell.replace(range);
        self.grid.setup_object(handle, range, old)
    }

    /// Teleport an object
    pub fn set_object_position(&mut self, handle: ObjectHandle, position: Point<Real>) -> Result<()> {
        let object = self.object_or_err(handle)?;
        let before = *object.aabb();
        object.set_position(position);
        object.wake();
        let after = *object.aabb();
        self.refresh_cells(handle);
        self.wake_frozen_near(&before, handle);
        self.wake_frozen_near(&after, handle);
        Ok(())
    }

    /// Rotate an object in place
    pub fn set_object_orientation(&mut self, handle: ObjectHandle, orientation: UnitQuaternion<Real>) -> Result<()> {
        let object = self.object_or_err(handle)?;
        let before = *object.aabb();
        object.set_orientation(orientation);
        object.wake();
        let after = *object.aabb();
        self.refresh_cells(handle);
        self.wake_frozen_near(&before, handle);
        self.wake_frozen_near(&after, handle);
        Ok(())
    }

    /// Set linear velocity of a body
    pub fn set_linear_velocity(&mut self, handle: ObjectHandle, velocity: Vector<Real>) -> Result<()> {
        self.object_or_err(handle)?.set_linear_velocity(velocity);
        Ok(())
    }

    /// Set angular velocity of a body
    pub fn set_angular_velocity(&mut self, handle: ObjectHandle, velocity: Vector<Real>) -> Result<()> {
        self.object_or_err(handle)?.set_angular_velocity(velocity);
        Ok(())
    }

    /// Apply a force to a body until the next integration
    pub fn apply_force(&mut self, handle: ObjectHandle, force: Vector<Real>) -> Result<()> {
        self.object_or_err(handle)?.apply_force(force);
        Ok(())
    }

    /// Apply an impulse through the center of mass
    pub fn apply_linear_impulse(&mut self, handle: ObjectHandle, impulse: Vector<Real>) -> Result<()> {
        self.object_or_err(handle)?.apply_linear_impulse(impulse);
        Ok(())
    }

    /// Apply an impulse at a world point
    pub fn apply_impulse_at_point(
        &mut self,
        handle: ObjectHandle,
        impulse: Vector<Real>,
        point: Point<Real>,
    ) -> Result<()> {
        self.object_or_err(handle)?.apply_impulse_at_point(impulse, &point);
        Ok(())
    }

    /// Unfreeze a body
    pub fn wake_body(&mut self, handle: ObjectHandle) -> Result<()> {
        self.object_or_err(handle)?.wake();
        Ok(())
    }

    // ==================== Controllers ====================

    /// Register a controller updated every substep
    pub fn add_controller(&mut self, controller: Box<dyn PhysicsController>) -> ControllerId {
        let id = ControllerId(self.next_controller_id);
        self.next_controller_id += 1;
        self.controllers.push(ControllerEntry { id, controller });
        id
    }

    /// Unregister a controller
    pub fn remove_controller(&mut self, id: ControllerId) -> Option<Box<dyn PhysicsController>> {
        let index = self.controllers.iter().position(|entry| entry.id == id)?;
        Some(self.controllers.remove(index).controller)
    }

    /// Register a constraint applied every substep
    pub fn add_constraint(&mut self, constraint: Box<dyn PhysicsConstraint>) -> ConstraintId {
        let id = ConstraintId(self.next_constraint_id);
        self.next_constraint_id += 1;
        self.constraints.push(ConstraintEntry { id, constraint });
        id
    }

    /// Unregister a constraint
    pub fn remove_constraint(&mut self, id: ConstraintId) -> Option<Box<dyn PhysicsConstraint>> {
        let index = self.constraints.iter().position(|entry| entry.id == id)?;
        Some(self.constraints.remove(index).constraint)
    }

    fn run_controllers(&mut self, dt: Real) {
        let mut running = std::mem::take(&mut self.controllers);
        for entry in running.iter_mut() {
            if entry.controller.is_enabled() {
                entry.controller.update(self, dt);
            }
        }
        running.append(&mut self.controllers);
        self.controllers = running;
    }

    fn run_constraints(&mut self, dt: Real) {
        let mut running = std::mem::take(&mut self.constraints);
        for entry in running.iter_mut() {
            if entry.constraint.is_enabled() {
                entry.constraint.apply(self, dt);
            }
        }
        running.append(&mut self.constraints);
        self.constraints = running;
    }

    // ==================== Simulation ====================

    /// Run `iterations` substeps of `dt` each
    pub fn simulate_step(&mut self, dt: Real, iterations: u32) {
        self.simulate_step_with(dt, iterations, |_, _, _| {});
    }

    /// Run `iterations` substeps of `dt` each, calling `pre_integrate` with
    /// the substep index before every integration
    pub fn simulate_step_with<F>(&mut self, dt: Real, iterations: u32, mut pre_integrate: F)
    where
        F: FnMut(&mut PhysicsWorld, Real, u32),
    {
        for list in [&self.dynamics, &self.statics, &self.ghosts] {
            for &handle in list.iter() {
                if let Some(object) = self.objects.get_mut(handle) {
                    object.collisions.clear();
                }
            }
        }
        self.raycast_counter.store(0, Ordering::Relaxed);
        self.contacts.clear();

        for iteration in 0..iterations {
            pre_integrate(self, dt, iteration);
            self.run_controllers(dt);
            self.run_constraints(dt);

            for index in 0..self.dynamics.len() {
                let handle = self.dynamics[index];
                self.integrate_single(handle, dt);
            }

            let mut pairs = BTreeMap::new();
            for &handle in &self.dynamics {
                for pair in self.detect_collisions_single(handle) {
                    pairs.entry(pair.key()).or_insert(pair);
                }
            }

            let mut resolved = Vec::with_capacity(pairs.len());
            for (_, mut pair) in pairs {
                self.process_contact_pair(&mut pair);
                resolved.push(pair);
            }

            if self.config.sleeping_enabled {
                self.update_freeze(dt);
            }

            self.events.publish(&resolved);
            self.contacts.extend(resolved);
        }
    }

    /// Advance by frame time using the fixed timestep.
    /// Returns the number of substeps run.
    pub fn update(&mut self, frame_time: Real) -> u32 {
        let timestep = self.config.timestep;
        self.accumulated_time += frame_time.max(0.0);

        let mut steps = 0;
        while self.accumulated_time >= timestep && steps < self.config.max_substeps {
            self.accumulated_time -= timestep;
            steps += 1;
        }
        // Drop backlog the substep cap could not consume
        if self.accumulated_time >= timestep {
            self.accumulated_time %= timestep;
        }

        if steps > 0 {
            self.simulate_step(timestep, steps);
        }
        steps
    }

    /// Integrate one dynamic body and re-index it when needed.
    /// Returns `true` if the body moved.
    pub fn integrate_single(&mut self, handle: ObjectHandle, dt: Real) -> bool {
        let gravity = self.gravity;
        let Some(object) = self.objects.get_mut(handle) else {
            return false;
        };
        let moved = object.integrate(dt, &gravity);
        if moved || object.moveable {
            self.refresh_cells(handle);
        }
        moved
    }

    /// Find the contacts of one dynamic body against its grid neighbours.
    ///
    /// A pair of two awake dynamic bodies is only reported by the body with
    /// the lower handle.
    pub fn detect_collisions_single(&self, handle: ObjectHandle) -> Vec<ContactPair> {
        let mut pairs = Vec::new();
        let Some(body) = self.objects.get(handle) else {
            return pairs;
        };
        if !body.is_dynamic() || body.is_frozen() || body.flags().contains(ObjectFlags::DISABLE_COLLISION_CHECK) {
            return pairs;
        }
        let Some(range) = body.cell_range() else {
            return pairs;
        };

        let prediction = self.config.contact_prediction.max(0.0);
        let probe = body.aabb().loosened(prediction);
        let mut seen = HashSet::new();

        for other_handle in self.grid.objects_in_range(range) {
            if other_handle == handle || !seen.insert(other_handle) {
                continue;
            }
            let Some(other) = self.objects.get(other_handle) else {
                continue;
            };
            if other.flags().contains(ObjectFlags::DISABLE_COLLISION_CHECK) {
                continue;
            }
            if other.is_dynamic() && !other.is_frozen() && other_handle < handle {
                continue;
            }
            if !body.can_collide_with(other) || !probe.intersects(other.aabb()) {
                continue;
            }

            let Some(contact) = pair_tester(body, other).contact(body, other, prediction) else {
                continue;
            };
            pairs.push(ContactPair {
                position: contact.position,
                normal: contact.normal,
                body_a: handle,
                body_b: other_handle,
                restitution: self
                    .config
                    .restitution_combine
                    .combine(self.surface_restitution(body), self.surface_restitution(other)),
                friction: self
                    .config
                    .friction_combine
                    .combine(self.surface_friction(body), self.surface_friction(other)),
                depth: contact.depth,
                applied_impulse: 0.0,
                impact_velocity: 0.0,
                flags: pair_flags(body, other),
            });
        }
        pairs
    }

    fn surface_friction(&self, object: &CollisionObject) -> Real {
        object
            .surface()
            .and_then(|id| self.surface_params.get(id))
            .map_or(self.config.default_friction, |param| param.friction)
    }

    fn surface_restitution(&self, object: &CollisionObject) -> Real {
        object
            .surface()
            .and_then(|id| self.surface_params.get(id))
            .map_or(self.config.default_restitution, |param| param.restitution)
    }

    /// Resolve one contact and record it in the collision lists
    pub fn process_contact_pair(&mut self, pair: &mut ContactPair) {
        let slop = self.config.penetration_slop;
        let correction_rate = self.config.position_correction;
        let restitution_threshold = self.config.restitution_threshold;

        let Some((a, b)) = self.objects.get2_mut(pair.body_a, pair.body_b) else {
            return;
        };

        let point = pair.position;
        let normal = pair.normal;
        let closing = (a.velocity_at_point(&point) - b.velocity_at_point(&point)).dot(&normal);
        pair.impact_velocity = (-closing).max(0.0);

        let mut moved = (false, false);
        if !pair.is_response_disabled() {
            let inv_mass_a = a.effective_inv_mass();
            let inv_mass_b = b.effective_inv_mass();
            let inv_mass_sum = inv_mass_a + inv_mass_b;

            // Positional correction beyond the slop
            let excess = pair.depth - slop;
            if excess > 0.0 && inv_mass_sum > 0.0 {
                let push = normal * (excess * correction_rate / inv_mass_sum);
                if inv_mass_a > 0.0 {
                    a.set_position(a.position() + push * inv_mass_a);
                    moved.0 = true;
                }
                if inv_mass_b > 0.0 {
                    b.set_position(b.position() - push * inv_mass_b);
                    moved.1 = true;
                }
            }

            if closing < 0.0 {
                let normal_mass = effective_mass(a, b, &point, &normal);
                if normal_mass > 0.0 {
                    let restitution = if -closing < restitution_threshold {
                        0.0
                    } else {
                        pair.restitution
                    };
                    let normal_impulse = -(1.0 + restitution) * closing * normal_mass;
                    apply_pair_impulse(a, b, &(normal * normal_impulse), &point);
                    pair.applied_impulse = normal_impulse;

                    // Coulomb friction
                    let relative = a.velocity_at_point(&point) - b.velocity_at_point(&point);
                    let tangential = relative - normal * relative.dot(&normal);
                    let slide = tangential.norm();
                    if slide > Real::EPSILON {
                        let tangent = tangential / slide;
                        let tangent_mass = effective_mass(a, b, &point, &tangent);
                        let friction_impulse = (slide * tangent_mass).min(pair.friction * normal_impulse);
                        apply_pair_impulse(a, b, &(-tangent * friction_impulse), &point);
                    }
                }
            }

            if a.is_dynamic() && b.is_dynamic() {
                if !a.is_frozen() && b.is_frozen() {
                    b.wake();
                } else if a.is_frozen() && !b.is_frozen() {
                    a.wake();
                }
            }
        }

        if a.flags().contains(ObjectFlags::COLLISION_LIST) {
            a.collisions.push(pair.for_body_a());
        }
        if b.flags().contains(ObjectFlags::COLLISION_LIST) {
            b.collisions.push(pair.for_body_b());
        }

        if moved.0 {
            self.refresh_cells(pair.body_a);
        }
        if moved.1 {
            self.refresh_cells(pair.body_b);
        }
    }

    fn update_freeze(&mut self, dt: Real) {
        let config = &self.config;
        for &handle in &self.dynamics {
            if let Some(object) = self.objects.get_mut(handle) {
                object.update_freeze(
                    dt,
                    config.sleep_linear_threshold,
                    config.sleep_angular_threshold,
                    config.freeze_time,
                );
            }
        }
    }

    // ==================== Contacts ====================

    /// Contacts resolved during the last simulate call, in resolution order
    pub fn contacts(&self) -> &[ContactPair] {
        &self.contacts
    }

    /// Receive every resolved contact from now on
    pub fn subscribe_contacts(&mut self) -> Receiver<ContactPair> {
        self.events.subscribe()
    }

    // ==================== Surfaces ====================

    /// Replace the surface parameter table
    pub fn set_surface_params(&mut self, params: Arc<SurfaceParamTable>) {
        log::debug!("Surface parameter table set ({} entries)", params.len());
        self.surface_params = params;
    }

    /// Get the surface parameter table
    pub fn surface_params(&self) -> &SurfaceParamTable {
        &self.surface_params
    }

    /// Look up a surface by name (case-insensitive)
    pub fn find_surface_param(&self, name: &str) -> Option<&SurfaceParam> {
        self.surface_params.find(name)
    }

    /// Look up a surface by id
    pub fn get_surface_param_by_id(&self, id: SurfaceParamId) -> Option<&SurfaceParam> {
        self.surface_params.get(id)
    }

    // ==================== Queries ====================

    /// Get a query interface for line and sweep tests
    pub fn query(&self) -> PhysicsQuery<'_> {
        PhysicsQuery {
            objects: &self.objects,
            grid: &self.grid,
            raycast_counter: &self.raycast_counter,
        }
    }

    /// See [`PhysicsQuery::test_line_collision`]
    pub fn test_line_collision(
        &self,
        start: &Point<Real>,
        end: &Point<Real>,
        coll: &mut CollisionData,
        content_mask: u32,
        filter: Option<&CollisionFilter>,
    ) -> bool {
        self.query().test_line_collision(start, end, coll, content_mask, filter)
    }

    /// See [`PhysicsQuery::test_convex_sweep_collision`]
    #[allow(clippy::too_many_arguments)]
    pub fn test_convex_sweep_collision(
        &self,
        shape: &dyn Shape,
        rotation: &UnitQuaternion<Real>,
        start: &Point<Real>,
        end: &Point<Real>,
        coll: &mut CollisionData,
        content_mask: u32,
        filter: Option<&CollisionFilter>,
    ) -> bool {
        self.query()
            .test_convex_sweep_collision(shape, rotation, start, end, coll, content_mask, filter)
    }

    /// See [`PhysicsQuery::test_line_single_object`]
    pub fn test_line_single_object(
        &self,
        handle: ObjectHandle,
        start: &Point<Real>,
        end: &Point<Real>,
        coll: &mut CollisionData,
    ) -> bool {
        self.query().test_line_single_object(handle, start, end, coll)
    }

    /// See [`PhysicsQuery::test_convex_sweep_single_object`]
    pub fn test_convex_sweep_single_object(
        &self,
        shape: &dyn Shape,
        rotation: &UnitQuaternion<Real>,
        start: &Point<Real>,
        end: &Point<Real>,
        handle: ObjectHandle,
        coll: &mut CollisionData,
    ) -> bool {
        self.query()
            .test_convex_sweep_single_object(shape, rotation, start, end, handle, coll)
    }

    /// Check whether a query with `filter` may test an object
    pub fn check_allow_contact_test(&self, filter: Option<&CollisionFilter>, handle: ObjectHandle) -> bool {
        self.query().check_allow_contact_test(filter, handle)
    }

    /// Narrow-phase tests run by queries since the last simulate call
    pub fn raycast_count(&self) -> u32 {
        self.raycast_counter.load(Ordering::Relaxed)
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::with_valid_config(PhysicsConfig::default())
    }
}

/// Response and sound flags of a pair, from the first object's side
fn pair_flags(a: &CollisionObject, b: &CollisionObject) -> ContactPairFlags {
    let mut flags = ContactPairFlags::NONE;
    if a.is_ghost() || b.is_ghost() {
        flags |= ContactPairFlags::NO_RESPONSE | ContactPairFlags::NO_SOUND;
    }
    if a.flags().contains(ObjectFlags::NO_RESPONSE) {
        flags |= ContactPairFlags::BODY_A_NO_RESPONSE;
    }
    if b.flags().contains(ObjectFlags::NO_RESPONSE) {
        flags |= ContactPairFlags::BODY_B_NO_RESPONSE;
    }
    if a.flags().contains(ObjectFlags::NO_SOUND) || b.flags().contains(ObjectFlags::NO_SOUND) {
        flags |= ContactPairFlags::NO_SOUND;
    }
    flags
}

/// Inverse of the impulse-to-velocity ratio along `direction` at `point`
fn effective_mass(a: &CollisionObject, b: &CollisionObject, point: &Point<Real>, direction: &Vector<Real>) -> Real {
    let arm_a = point - a.position();
    let arm_b = point - b.position();
    let angular_a = (a.world_inv_inertia() * arm_a.cross(direction)).cross(&arm_a);
    let angular_b = (b.world_inv_inertia() * arm_b.cross(direction)).cross(&arm_b);
    let k = a.effective_inv_mass() + b.effective_inv_mass() + direction.dot(&(angular_a + angular_b));
    if k > Real::EPSILON {
        1.0 / k
    } else {
        0.0
    }
}

/// Apply `impulse` to `a` and its opposite to `b`, dynamic sides only
fn apply_pair_impulse(a: &mut CollisionObject, b: &mut CollisionObject, impulse: &Vector<Real>, point: &Point<Real>) {
    if a.is_dynamic() {
        a.apply_impulse_unchecked(impulse, point);
    }
    if b.is_dynamic() {
        b.apply_impulse_unchecked(&-impulse, point);
    }
}

fn warn_outside_limit(handle: ObjectHandle, object: &CollisionObject) {
    let aabb = object.aabb();
    let outside = [aabb.mins.x, aabb.mins.z, aabb.maxs.x, aabb.maxs.z]
        .iter()
        .any(|v| !v.is_finite() || v.abs() > WORLD_LIMIT);
    if outside {
        log::warn!(
            "Object {:?} registered outside the world limit ({:?} .. {:?})",
            handle,
            aabb.mins,
            aabb.maxs
        );
    }
}

/// Physics world shared between threads.
///
/// Queries take the read lock and may run concurrently; stepping and
/// mutation take the write lock.
#[derive(Clone)]
pub struct SharedPhysicsWorld {
    inner: Arc<RwLock<PhysicsWorld>>,
}

impl SharedPhysicsWorld {
    pub fn new(world: PhysicsWorld) -> Self {
        Self {
            inner: Arc::new(RwLock::new(world)),
        }
    }

    /// Lock for queries
    pub fn read(&self) -> RwLockReadGuard<'_, PhysicsWorld> {
        self.inner.read()
    }

    /// Lock for stepping and mutation
    pub fn write(&self) -> RwLockWriteGuard<'_, PhysicsWorld> {
        self.inner.write()
    }

    /// Step under the write lock
    pub fn simulate_step(&self, dt: Real, iterations: u32) {
        self.inner.write().simulate_step(dt, iterations);
    }

    /// Line test under the read lock
    pub fn test_line_collision(
        &self,
        start: &Point<Real>,
        end: &Point<Real>,
        coll: &mut CollisionData,
        content_mask: u32,
        filter: Option<&CollisionFilter>,
    ) -> bool {
        self.inner.read().test_line_collision(start, end, coll, content_mask, filter)
    }
}
