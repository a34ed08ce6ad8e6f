//! Narrow-phase testers
//!
//! Every object is tested through the tester of its [`ShapeCategory`]. A
//! pair of objects uses the tester of the more complex category. All
//! testers delegate the geometry to parry; a pair parry cannot handle is
//! reported as no contact.

use crate::body::CollisionObject;
use crate::collider::ShapeCategory;
use crate::material::SurfaceParamId;
use rapier3d::na;
use rapier3d::parry::math::{Isometry, Point, Real, Vector};
use rapier3d::parry::query::{self, PointQuery, Ray, RayCast, ShapeCastOptions};
use rapier3d::parry::shape::{FeatureId, Shape};

/// Segments shorter than this are treated as points
pub const DEGENERATE_SEGMENT: Real = 1.0e-6;

/// Contact between two objects
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NarrowContact {
    /// Contact point in world space
    pub position: Point<Real>,
    /// Normal pointing from the second object toward the first
    pub normal: Vector<Real>,
    /// Penetration depth (negative when separated within the prediction)
    pub depth: Real,
}

/// Hit of a segment against one object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Fraction of the segment before the hit
    pub fract: Real,
    pub position: Point<Real>,
    pub normal: Vector<Real>,
    pub surface: Option<SurfaceParamId>,
}

/// Hit of a swept shape against one object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepHit {
    /// Fraction of the motion before the hit
    pub fract: Real,
    pub position: Point<Real>,
    pub normal: Vector<Real>,
    pub surface: Option<SurfaceParamId>,
}

/// Shape-family specific collision tests
pub trait NarrowPhaseTester: Send + Sync {
    /// Tester name used in logs
    fn name(&self) -> &'static str;

    /// Closest contact between two objects, if closer than `prediction`
    fn contact(&self, a: &CollisionObject, b: &CollisionObject, prediction: Real) -> Option<NarrowContact> {
        match query::contact(&a.isometry(), a.shape(), &b.isometry(), b.shape(), prediction) {
            Ok(contact) => contact.map(|c| NarrowContact {
                position: na::center(&c.point1, &c.point2),
                normal: -c.normal1.into_inner(),
                depth: -c.dist,
            }),
            Err(_) => {
                log::trace!(
                    "{}: unsupported contact pair {:?} / {:?}",
                    self.name(),
                    a.shape().shape_type(),
                    b.shape().shape_type()
                );
                None
            }
        }
    }

    /// First hit of the segment `start..end` against the object
    fn cast_ray(&self, object: &CollisionObject, start: &Point<Real>, end: &Point<Real>) -> Option<RayHit> {
        let position = object.isometry();
        let motion = end - start;
        if motion.norm_squared() < DEGENERATE_SEGMENT * DEGENERATE_SEGMENT {
            return object.shape().contains_point(&position, start).then(|| RayHit {
                fract: 0.0,
                position: *start,
                normal: Vector::zeros(),
                surface: self.surface_at(object, FeatureId::Unknown, &position.inverse_transform_point(start)),
            });
        }

        let ray = Ray::new(*start, motion);
        object
            .shape()
            .cast_ray_and_get_normal(&position, &ray, 1.0, true)
            .map(|hit| {
                let point = ray.point_at(hit.time_of_impact);
                RayHit {
                    fract: hit.time_of_impact,
                    position: point,
                    normal: hit.normal,
                    surface: self.surface_at(object, hit.feature, &position.inverse_transform_point(&point)),
                }
            })
    }

    /// First hit of `shape` moving by `motion` from `start` against the object
    fn cast_shape(
        &self,
        object: &CollisionObject,
        shape: &dyn Shape,
        start: &Isometry<Real>,
        motion: &Vector<Real>,
    ) -> Option<SweepHit> {
        let target = object.isometry();
        let options = ShapeCastOptions {
            max_time_of_impact: 1.0,
            stop_at_penetration: true,
            ..Default::default()
        };

        match query::cast_shapes(start, motion, shape, &target, &Vector::zeros(), object.shape(), options) {
            Ok(hit) => hit.map(|hit| SweepHit {
                fract: hit.time_of_impact,
                position: target * hit.witness2,
                normal: target.rotation * hit.normal2.into_inner(),
                surface: self.surface_at(object, FeatureId::Unknown, &hit.witness2),
            }),
            Err(_) => {
                log::trace!(
                    "{}: unsupported sweep {:?} against {:?}",
                    self.name(),
                    shape.shape_type(),
                    object.shape().shape_type()
                );
                None
            }
        }
    }

    /// Surface at a hit. `local_point` is in the object's local space;
    /// `feature` is `Unknown` when the hit did not report one.
    fn surface_at(
        &self,
        object: &CollisionObject,
        _feature: FeatureId,
        _local_point: &Point<Real>,
    ) -> Option<SurfaceParamId> {
        object.surface()
    }
}

/// Convex primitives and hulls
pub struct ConvexTester;

impl NarrowPhaseTester for ConvexTester {
    fn name(&self) -> &'static str {
        "convex"
    }
}

/// Compound shapes; resolves the surface of the part that was hit
pub struct CompoundTester;

impl NarrowPhaseTester for CompoundTester {
    fn name(&self) -> &'static str {
        "compound"
    }

    fn surface_at(
        &self,
        object: &CollisionObject,
        _feature: FeatureId,
        local_point: &Point<Real>,
    ) -> Option<SurfaceParamId> {
        let Some(compound) = object.shape().as_compound() else {
            return object.surface();
        };
        let nearest = compound
            .shapes()
            .iter()
            .enumerate()
            .map(|(index, (placement, part))| {
                let distance = part.distance_to_local_point(&placement.inverse_transform_point(local_point), true);
                (index, distance)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match nearest {
            Some((index, _)) => object.part_surface(index),
            None => object.surface(),
        }
    }
}

/// Triangle meshes and heightfields; resolves per-triangle surfaces
pub struct MeshTester;

impl NarrowPhaseTester for MeshTester {
    fn name(&self) -> &'static str {
        "mesh"
    }

    fn surface_at(
        &self,
        object: &CollisionObject,
        feature: FeatureId,
        local_point: &Point<Real>,
    ) -> Option<SurfaceParamId> {
        let Some(mesh) = object.shape().as_trimesh() else {
            return object.surface();
        };
        let count = mesh.indices().len() as u32;
        let feature = match feature {
            FeatureId::Face(_) => feature,
            _ => mesh.project_local_point_and_get_feature(local_point).1,
        };
        match feature {
            // Back-face hits are reported past the triangle count
            FeatureId::Face(face) if count > 0 => object.triangle_surface(face % count),
            _ => object.surface(),
        }
    }
}

static CONVEX: ConvexTester = ConvexTester;
static COMPOUND: CompoundTester = CompoundTester;
static MESH: MeshTester = MeshTester;

/// Tester for a shape category
pub fn tester_for(category: ShapeCategory) -> &'static dyn NarrowPhaseTester {
    match category {
        ShapeCategory::Convex => &CONVEX,
        ShapeCategory::Compound => &COMPOUND,
        ShapeCategory::TriMesh => &MESH,
    }
}

/// Tester for a pair of objects
pub fn pair_tester(a: &CollisionObject, b: &CollisionObject) -> &'static dyn NarrowPhaseTester {
    tester_for(a.category().max(b.category()))
}
