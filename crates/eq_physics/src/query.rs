//! Physics queries (line tests and convex sweeps)
//!
//! Queries walk the broadphase grid along the segment, gate every candidate
//! through [`check_allow_contact_test`] and keep the nearest hit. They only
//! read world state; the debug raycast counter is atomic so queries can run
//! from several readers at once.

use crate::arena::{ObjectArena, ObjectHandle};
use crate::body::CollisionObject;
use crate::contact::CollisionData;
use crate::filter::{check_allow_contact_test, CollisionFilter};
use crate::grid::BroadphaseGrid;
use crate::narrowphase::tester_for;
use rapier3d::na::{Translation3, UnitQuaternion};
use rapier3d::parry::bounding_volume::{Aabb, BoundingVolume};
use rapier3d::parry::math::{Isometry, Point, Real};
use rapier3d::parry::shape::Shape;
use std::sync::atomic::{AtomicU32, Ordering};

/// Nearest hit found so far by one query
struct Nearest {
    fract: Real,
    /// No hit recorded yet, so a hit at exactly `fract` still counts
    open: bool,
    hit: Option<CollisionData>,
}

impl Nearest {
    fn new(coll: &CollisionData) -> Self {
        Self {
            fract: coll.fract,
            open: coll.hit_object.is_none(),
            hit: None,
        }
    }

    /// Keep `hit` if strictly closer; ties keep the earlier hit
    fn offer(&mut self, hit: CollisionData) {
        if hit.fract < self.fract || (self.open && hit.fract <= self.fract) {
            self.fract = hit.fract;
            self.open = false;
            self.hit = Some(hit);
        }
    }

    fn write(self, coll: &mut CollisionData) -> bool {
        match self.hit {
            Some(hit) => {
                *coll = hit;
                true
            }
            None => false,
        }
    }
}

/// Query interface for a physics world
pub struct PhysicsQuery<'a> {
    pub(crate) objects: &'a ObjectArena<CollisionObject>,
    pub(crate) grid: &'a BroadphaseGrid,
    pub(crate) raycast_counter: &'a AtomicU32,
}

impl<'a> PhysicsQuery<'a> {
    /// Narrow-phase tests run since the last simulate call
    pub fn raycast_count(&self) -> u32 {
        self.raycast_counter.load(Ordering::Relaxed)
    }

    fn count_test(&self) {
        self.raycast_counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Trace a segment through the world.
    ///
    /// `coll` is only written when a hit closer than `coll.fract` is found,
    /// so chained queries keep the nearest result. While `coll` holds no hit
    /// object, a hit at exactly `coll.fract` also counts; on a fresh
    /// `CollisionData` that admits a hit at the segment end. Returns `true`
    /// if `coll` was updated.
    pub fn test_line_collision(
        &self,
        start: &Point<Real>,
        end: &Point<Real>,
        coll: &mut CollisionData,
        content_mask: u32,
        filter: Option<&CollisionFilter>,
    ) -> bool {
        let bounds = Aabb::new(start.inf(end), start.sup(end));
        let mut nearest = Nearest::new(coll);

        self.grid.for_each_along_segment(start, end, 0.0, |handle| {
            let Some(object) = self.candidate(handle, content_mask, filter, &bounds) else {
                return;
            };
            self.count_test();
            if let Some(hit) = tester_for(object.category()).cast_ray(object, start, end) {
                nearest.offer(CollisionData {
                    position: hit.position,
                    normal: hit.normal,
                    hit_object: Some(handle),
                    fract: hit.fract,
                    material_index: hit.surface,
                });
            }
        });

        nearest.write(coll)
    }

    /// Sweep a convex shape from `start` to `end` through the world.
    ///
    /// Same contract as [`test_line_collision`](Self::test_line_collision).
    /// The reported position is the contact point on the hit object.
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
        let start_pos = sweep_isometry(start, rotation);
        let end_pos = sweep_isometry(end, rotation);
        let bounds = shape.compute_aabb(&start_pos).merged(&shape.compute_aabb(&end_pos));
        let margin = sweep_margin(shape);
        let motion = end - start;
        let mut nearest = Nearest::new(coll);

        self.grid.for_each_along_segment(start, end, margin, |handle| {
            let Some(object) = self.candidate(handle, content_mask, filter, &bounds) else {
                return;
            };
            self.count_test();
            if let Some(hit) = tester_for(object.category()).cast_shape(object, shape, &start_pos, &motion) {
                nearest.offer(CollisionData {
                    position: hit.position,
                    normal: hit.normal,
                    hit_object: Some(handle),
                    fract: hit.fract,
                    material_index: hit.surface,
                });
            }
        });

        nearest.write(coll)
    }

    /// Trace a segment against one object, bypassing the grid and filters
    pub fn test_line_single_object(
        &self,
        handle: ObjectHandle,
        start: &Point<Real>,
        end: &Point<Real>,
        coll: &mut CollisionData,
    ) -> bool {
        let Some(object) = self.objects.get(handle) else {
            return false;
        };
        let mut nearest = Nearest::new(coll);
        self.count_test();
        if let Some(hit) = tester_for(object.category()).cast_ray(object, start, end) {
            nearest.offer(CollisionData {
                position: hit.position,
                normal: hit.normal,
                hit_object: Some(handle),
                fract: hit.fract,
                material_index: hit.surface,
            });
        }
        nearest.write(coll)
    }

    /// Sweep a convex shape against one object, bypassing the grid and filters
    pub fn test_convex_sweep_single_object(
        &self,
        shape: &dyn Shape,
        rotation: &UnitQuaternion<Real>,
        start: &Point<Real>,
        end: &Point<Real>,
        handle: ObjectHandle,
        coll: &mut CollisionData,
    ) -> bool {
        let Some(object) = self.objects.get(handle) else {
            return false;
        };
        let start_pos = sweep_isometry(start, rotation);
        let mut nearest = Nearest::new(coll);
        self.count_test();
        if let Some(hit) = tester_for(object.category()).cast_shape(object, shape, &start_pos, &(end - start)) {
            nearest.offer(CollisionData {
                position: hit.position,
                normal: hit.normal,
                hit_object: Some(handle),
                fract: hit.fract,
                material_index: hit.surface,
            });
        }
        nearest.write(coll)
    }

    /// Check whether a query with `filter` may test an object
    pub fn check_allow_contact_test(&self, filter: Option<&CollisionFilter>, handle: ObjectHandle) -> bool {
        self.objects
            .get(handle)
            .map_or(false, |object| check_allow_contact_test(filter, handle, object))
    }

    /// Validity, contents, filter and bounds rejection for one candidate
    fn candidate(
        &self,
        handle: ObjectHandle,
        content_mask: u32,
        filter: Option<&CollisionFilter>,
        bounds: &Aabb,
    ) -> Option<&'a CollisionObject> {
        let object = self.objects.get(handle)?;
        if object.contents() & content_mask == 0 {
            return None;
        }
        if !check_allow_contact_test(filter, handle, object) {
            return None;
        }
        object.aabb().intersects(bounds).then_some(object)
    }
}

fn sweep_isometry(position: &Point<Real>, rotation: &UnitQuaternion<Real>) -> Isometry<Real> {
    Isometry::from_parts(Translation3::from(position.coords), *rotation)
}

/// Grid traversal margin covering the shape in any orientation
fn sweep_margin(shape: &dyn Shape) -> Real {
    let sphere = shape.compute_local_bounding_sphere();
    sphere.center().coords.norm() + sphere.radius()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{ObjectDesc, ObjectFlags, ObjectKind};
    use crate::collider::ColliderShape;
    use crate::filter::{FilterFlags, FilterType};
    use approx::assert_relative_eq;

    struct Scene {
        objects: ObjectArena<CollisionObject>,
        grid: BroadphaseGrid,
        counter: AtomicU32,
    }

    impl Scene {
        fn new() -> Self {
            Self {
                objects: ObjectArena::new(),
                grid: BroadphaseGrid::new(8.0),
                counter: AtomicU32::new(0),
            }
        }

        fn add(&mut self, desc: ObjectDesc, kind: ObjectKind) -> ObjectHandle {
            let mut object = desc.build().unwrap();
            object.set_kind(kind);
            let range = self.grid.cell_range(object.aabb());
            object.cell = Some(range);
            let handle = self.objects.insert(object);
            self.grid.setup_object(handle, range, None);
            handle
        }

        fn query(&self) -> PhysicsQuery<'_> {
            PhysicsQuery {
                objects: &self.objects,
                grid: &self.grid,
                raycast_counter: &self.counter,
            }
        }
    }

    fn wall(x: f32) -> ObjectDesc {
        ObjectDesc::new(ColliderShape::cuboid(0.5, 5.0, 5.0)).with_position(x, 0.0, 0.0)
    }

    fn ray() -> (Point<Real>, Point<Real>) {
        (Point::new(0.0, 0.0, 0.0), Point::new(40.0, 0.0, 0.0))
    }

    #[test]
    fn test_line_returns_nearest_hit() {
        let mut scene = Scene::new();
        let far = scene.add(wall(30.0), ObjectKind::Static);
        let near = scene.add(wall(10.0), ObjectKind::Static);
        let (start, end) = ray();

        let mut coll = CollisionData::default();
        assert!(scene.query().test_line_collision(&start, &end, &mut coll, u32::MAX, None));
        assert_eq!(coll.hit_object, Some(near));
        assert_relative_eq!(coll.fract, 9.5 / 40.0, epsilon = 1e-5);
        assert_relative_eq!(coll.normal.x, -1.0, epsilon = 1e-5);

        let filter = CollisionFilter::exclude_object(near);
        let mut coll = CollisionData::default();
        assert!(scene.query().test_line_collision(&start, &end, &mut coll, u32::MAX, Some(&filter)));
        assert_eq!(coll.hit_object, Some(far));
    }

    #[test]
    fn test_line_keeps_closer_previous_hit() {
        let mut scene = Scene::new();
        scene.add(wall(10.0), ObjectKind::Static);
        let (start, end) = ray();

        let mut coll = CollisionData {
            fract: 0.1,
            ..Default::default()
        };
        assert!(!scene.query().test_line_collision(&start, &end, &mut coll, u32::MAX, None));
        assert_eq!(coll.fract, 0.1);
        assert!(coll.hit_object.is_none());
    }

    #[test]
    fn test_line_miss_leaves_sentinels() {
        let mut scene = Scene::new();
        scene.add(wall(10.0), ObjectKind::Static);
        let mut coll = CollisionData::default();
        let hit = scene.query().test_line_collision(
            &Point::new(0.0, 20.0, 0.0),
            &Point::new(40.0, 20.0, 0.0),
            &mut coll,
            u32::MAX,
            None,
        );
        assert!(!hit);
        assert_eq!(coll, CollisionData::default());
    }

    #[test]
    fn test_include_only_never_reports_others() {
        let mut scene = Scene::new();
        let _near = scene.add(wall(10.0), ObjectKind::Static);
        let far = scene.add(wall(30.0), ObjectKind::Static);
        let (start, end) = ray();

        let filter = CollisionFilter::include_only(&[far]);
        let mut coll = CollisionData::default();
        scene.query().test_line_collision(&start, &end, &mut coll, u32::MAX, Some(&filter));
        assert_eq!(coll.hit_object, Some(far));
    }

    #[test]
    fn test_content_mask_and_no_raycast() {
        let mut scene = Scene::new();
        let masked = scene.add(wall(10.0).with_contents(2, u32::MAX), ObjectKind::Static);
        let hidden = scene.add(wall(20.0).with_flags(ObjectFlags::NO_RAYCAST), ObjectKind::Static);
        let (start, end) = ray();

        let mut coll = CollisionData::default();
        assert!(!scene.query().test_line_collision(&start, &end, &mut coll, 1, None));

        let mut coll = CollisionData::default();
        scene.query().test_line_collision(&start, &end, &mut coll, u32::MAX, None);
        assert_eq!(coll.hit_object, Some(masked));

        let forced = CollisionFilter::new(FilterType::Exclude).with_flags(FilterFlags::FORCE_RAYCAST);
        let mut coll = CollisionData::default();
        scene.query().test_line_collision(&start, &end, &mut coll, 1, Some(&forced));
        assert_eq!(coll.hit_object, Some(hidden));
    }

    #[test]
    fn test_sweep_hits_before_line() {
        let mut scene = Scene::new();
        let target = scene.add(wall(10.0), ObjectKind::Static);
        let (start, end) = ray();
        let ball = ColliderShape::sphere(1.0).to_shared().unwrap();

        let mut coll = CollisionData::default();
        let hit = scene.query().test_convex_sweep_collision(
            ball.as_ref(),
            &UnitQuaternion::identity(),
            &start,
            &end,
            &mut coll,
            u32::MAX,
            None,
        );
        assert!(hit);
        assert_eq!(coll.hit_object, Some(target));
        assert_relative_eq!(coll.fract, 8.5 / 40.0, epsilon = 1e-3);
    }

    fn sweep(
        scene: &Scene,
        coll: &mut CollisionData,
        content_mask: u32,
        filter: Option<&CollisionFilter>,
    ) -> bool {
        let ball = ColliderShape::sphere(1.0).to_shared().unwrap();
        let (start, end) = ray();
        scene.query().test_convex_sweep_collision(
            ball.as_ref(),
            &UnitQuaternion::identity(),
            &start,
            &end,
            coll,
            content_mask,
            filter,
        )
    }

    #[test]
    fn test_sweep_respects_filters() {
        let mut scene = Scene::new();
        let near = scene.add(wall(10.0), ObjectKind::Dynamic);
        let far = scene.add(wall(30.0), ObjectKind::Static);

        let mut coll = CollisionData::default();
        assert!(sweep(&scene, &mut coll, u32::MAX, None));
        assert_eq!(coll.hit_object, Some(near));

        let exclude = CollisionFilter::exclude_object(near);
        let mut coll = CollisionData::default();
        assert!(sweep(&scene, &mut coll, u32::MAX, Some(&exclude)));
        assert_eq!(coll.hit_object, Some(far));

        let include = CollisionFilter::include_only(&[far]);
        let mut coll = CollisionData::default();
        assert!(sweep(&scene, &mut coll, u32::MAX, Some(&include)));
        assert_eq!(coll.hit_object, Some(far));

        let include_none = CollisionFilter::include_only(&[]);
        let mut coll = CollisionData::default();
        assert!(!sweep(&scene, &mut coll, u32::MAX, Some(&include_none)));
        assert!(coll.hit_object.is_none());

        let no_dynamic = CollisionFilter::new(FilterType::Exclude).with_flags(FilterFlags::DISALLOW_DYNAMIC);
        let mut coll = CollisionData::default();
        assert!(sweep(&scene, &mut coll, u32::MAX, Some(&no_dynamic)));
        assert_eq!(coll.hit_object, Some(far));
    }

    #[test]
    fn test_sweep_respects_content_mask() {
        let mut scene = Scene::new();
        scene.add(wall(10.0).with_contents(2, u32::MAX), ObjectKind::Static);
        let far = scene.add(wall(30.0).with_contents(1, u32::MAX), ObjectKind::Static);

        let mut coll = CollisionData::default();
        assert!(sweep(&scene, &mut coll, 1, None));
        assert_eq!(coll.hit_object, Some(far));

        let mut coll = CollisionData::default();
        assert!(!sweep(&scene, &mut coll, 4, None));
    }

    #[test]
    fn test_hit_at_segment_end_counts_on_fresh_data() {
        let end_hit = CollisionData {
            fract: 1.0,
            ..Default::default()
        };

        let mut coll = CollisionData::default();
        let mut nearest = Nearest::new(&coll);
        nearest.offer(end_hit);
        assert!(nearest.write(&mut coll));
        assert_eq!(coll.fract, 1.0);

        // An existing hit at the same fraction is kept
        let mut coll = CollisionData {
            fract: 1.0,
            hit_object: Some(ObjectHandle::NULL),
            ..Default::default()
        };
        let mut nearest = Nearest::new(&coll);
        nearest.offer(end_hit);
        assert!(!nearest.write(&mut coll));
        assert_eq!(coll.hit_object, Some(ObjectHandle::NULL));
    }

    #[test]
    fn test_single_object_queries() {
        let mut scene = Scene::new();
        let near = scene.add(wall(10.0), ObjectKind::Static);
        let far = scene.add(wall(30.0), ObjectKind::Static);
        let (start, end) = ray();
        let query = scene.query();

        let mut coll = CollisionData::default();
        assert!(query.test_line_single_object(far, &start, &end, &mut coll));
        assert_relative_eq!(coll.fract, 29.5 / 40.0, epsilon = 1e-5);

        let ball = ColliderShape::sphere(1.0).to_shared().unwrap();
        let mut coll = CollisionData::default();
        assert!(query.test_convex_sweep_single_object(
            ball.as_ref(),
            &UnitQuaternion::identity(),
            &start,
            &end,
            near,
            &mut coll
        ));
        assert_eq!(coll.hit_object, Some(near));
        assert!(query.raycast_count() >= 2);
    }
}
