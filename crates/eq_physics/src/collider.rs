//! Collider shape descriptions
//!
//! Shapes are serializable descriptions that build the opaque
//! [`SharedShape`] handles the narrow phase works with. Each built shape is
//! classified once into a [`ShapeCategory`], which selects the narrow-phase
//! tester used for the object.

use crate::error::{PhysicsError, Result};
use crate::material::SurfaceParamId;
use rapier3d::na::{DMatrix, Quaternion, Translation3, UnitQuaternion};
use rapier3d::parry::math::{Isometry, Point, Real, Vector};
use rapier3d::parry::shape::{Shape, ShapeType, SharedShape};
use serde::{Deserialize, Serialize};

/// Collision shape type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ColliderShape {
    /// Sphere with radius
    Sphere {
        radius: f32,
    },
    /// Box with half-extents
    Box {
        half_extents: [f32; 3],
    },
    /// Capsule aligned along Y axis
    CapsuleY {
        half_height: f32,
        radius: f32,
    },
    /// Cylinder aligned along Y axis
    CylinderY {
        half_height: f32,
        radius: f32,
    },
    /// Cone aligned along Y axis
    ConeY {
        half_height: f32,
        radius: f32,
    },
    /// Convex hull from points
    ConvexHull {
        points: Vec<[f32; 3]>,
    },
    /// Triangle mesh with optional per-triangle surfaces
    TriMesh {
        vertices: Vec<[f32; 3]>,
        indices: Vec<[u32; 3]>,
        #[serde(default)]
        surfaces: Vec<SurfaceParamId>,
    },
    /// Heightfield terrain
    HeightField {
        heights: Vec<f32>,
        rows: usize,
        cols: usize,
        scale: [f32; 3],
    },
    /// Several shapes rigidly attached together
    Compound {
        parts: Vec<CompoundPart>,
    },
}

/// One child of a compound shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundPart {
    /// Offset from the compound origin
    pub offset: [f32; 3],
    /// Rotation relative to the compound (quaternion: x, y, z, w)
    pub rotation: [f32; 4],
    /// Child shape
    pub shape: ColliderShape,
    /// Surface of this part, overriding the object surface
    #[serde(default)]
    pub surface: Option<SurfaceParamId>,
}

impl Default for ColliderShape {
    fn default() -> Self {
        Self::Box {
            half_extents: [0.5, 0.5, 0.5],
        }
    }
}

impl ColliderShape {
    /// Create a sphere shape
    pub fn sphere(radius: f32) -> Self {
        Self::Sphere { radius }
    }

    /// Create a box shape from half-extents
    pub fn cuboid(hx: f32, hy: f32, hz: f32) -> Self {
        Self::Box {
            half_extents: [hx, hy, hz],
        }
    }

    /// Create a capsule shape (Y-aligned)
    pub fn capsule(half_height: f32, radius: f32) -> Self {
        Self::CapsuleY { half_height, radius }
    }

    /// Create a cylinder shape (Y-aligned)
    pub fn cylinder(half_height: f32, radius: f32) -> Self {
        Self::CylinderY { half_height, radius }
    }

    /// Create a triangle mesh without per-triangle surfaces
    pub fn trimesh(vertices: Vec<[f32; 3]>, indices: Vec<[u32; 3]>) -> Self {
        Self::TriMesh {
            vertices,
            indices,
            surfaces: Vec::new(),
        }
    }

    /// Per-triangle surfaces, if this is a mesh that carries them
    pub fn triangle_surfaces(&self) -> Option<&[SurfaceParamId]> {
        match self {
            Self::TriMesh { surfaces, .. } if !surfaces.is_empty() => Some(surfaces),
            _ => None,
        }
    }

    /// Per-part surfaces, if this is a compound with any part surface set
    pub fn part_surfaces(&self) -> Option<Vec<Option<SurfaceParamId>>> {
        match self {
            Self::Compound { parts } if parts.iter().any(|part| part.surface.is_some()) => {
                Some(parts.iter().map(|part| part.surface).collect())
            }
            _ => None,
        }
    }

    /// Build the geometry-library shape
    pub fn to_shared(&self) -> Result<SharedShape> {
        let shape = match self {
            Self::Sphere { radius } => {
                check_positive("sphere radius", *radius)?;
                SharedShape::ball(*radius)
            }
            Self::Box { half_extents } => {
                for extent in half_extents {
                    check_positive("box half-extent", *extent)?;
                }
                SharedShape::cuboid(half_extents[0], half_extents[1], half_extents[2])
            }
            Self::CapsuleY { half_height, radius } => {
                check_positive("capsule radius", *radius)?;
                SharedShape::capsule_y(*half_height, *radius)
            }
            Self::CylinderY { half_height, radius } => {
                check_positive("cylinder radius", *radius)?;
                SharedShape::cylinder(*half_height, *radius)
            }
            Self::ConeY { half_height, radius } => {
                check_positive("cone radius", *radius)?;
                SharedShape::cone(*half_height, *radius)
            }
            Self::ConvexHull { points } => {
                let points: Vec<_> = points.iter().map(|p| Point::new(p[0], p[1], p[2])).collect();
                SharedShape::convex_hull(&points).ok_or_else(|| {
                    PhysicsError::ShapeCreationFailed(format!(
                        "convex hull of {} points is degenerate",
                        points.len()
                    ))
                })?
            }
            Self::TriMesh {
                vertices,
                indices,
                surfaces,
            } => {
                if indices.is_empty() {
                    return Err(PhysicsError::ShapeCreationFailed("triangle mesh has no triangles".into()));
                }
                if indices.iter().flatten().any(|i| *i as usize >= vertices.len()) {
                    return Err(PhysicsError::ShapeCreationFailed(
                        "triangle mesh index out of range".into(),
                    ));
                }
                if !surfaces.is_empty() && surfaces.len() != indices.len() {
                    return Err(PhysicsError::ShapeCreationFailed(format!(
                        "{} triangle surfaces for {} triangles",
                        surfaces.len(),
                        indices.len()
                    )));
                }
                let vertices: Vec<_> = vertices.iter().map(|v| Point::new(v[0], v[1], v[2])).collect();
                SharedShape::trimesh(vertices, indices.clone())
            }
            Self::HeightField {
                heights,
                rows,
                cols,
                scale,
            } => {
                if *rows < 2 || *cols < 2 || heights.len() != rows * cols {
                    return Err(PhysicsError::ShapeCreationFailed(format!(
                        "heightfield needs {}x{} samples, got {}",
                        rows,
                        cols,
                        heights.len()
                    )));
                }
                let matrix = DMatrix::from_row_slice(*rows, *cols, heights);
                SharedShape::heightfield(matrix, Vector::new(scale[0], scale[1], scale[2]))
            }
            Self::Compound { parts } => {
                if parts.is_empty() {
                    return Err(PhysicsError::ShapeCreationFailed("compound has no parts".into()));
                }
                let mut children = Vec::with_capacity(parts.len());
                for part in parts {
                    let position = isometry_from_parts(part.offset, part.rotation);
                    children.push((position, part.shape.to_shared()?));
                }
                SharedShape::compound(children)
            }
        };
        Ok(shape)
    }
}

fn check_positive(what: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::ShapeCreationFailed(format!("{} must be positive, got {}", what, value)))
    }
}

/// Build an isometry from a position and an `[x, y, z, w]` quaternion
pub(crate) fn isometry_from_parts(position: [f32; 3], rotation: [f32; 4]) -> Isometry<Real> {
    Isometry::from_parts(
        Translation3::new(position[0], position[1], position[2]),
        UnitQuaternion::from_quaternion(Quaternion::new(
            rotation[3],
            rotation[0],
            rotation[1],
            rotation[2],
        )),
    )
}

/// Shape family used to pick a narrow-phase tester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapeCategory {
    /// Convex primitive (sphere, box, capsule, hull, ...)
    Convex,
    /// Compound of several shapes
    Compound,
    /// Triangle mesh or heightfield
    TriMesh,
}

impl ShapeCategory {
    /// Classify a geometry-library shape
    pub fn of(shape: &dyn Shape) -> Self {
        match shape.shape_type() {
            ShapeType::TriMesh | ShapeType::HeightField => Self::TriMesh,
            ShapeType::Compound => Self::Compound,
            _ if shape.is_convex() => Self::Convex,
            _ => Self::Compound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> ColliderShape {
        ColliderShape::TriMesh {
            vertices: vec![
                [-1.0, 0.0, -1.0],
                [1.0, 0.0, -1.0],
                [1.0, 0.0, 1.0],
                [-1.0, 0.0, 1.0],
            ],
            indices: vec![[0, 2, 1], [0, 3, 2]],
            surfaces: vec![SurfaceParamId(3), SurfaceParamId(4)],
        }
    }

    #[test]
    fn test_categories() {
        let ball = ColliderShape::sphere(1.0).to_shared().unwrap();
        assert_eq!(ShapeCategory::of(ball.as_ref()), ShapeCategory::Convex);

        let mesh = quad().to_shared().unwrap();
        assert_eq!(ShapeCategory::of(mesh.as_ref()), ShapeCategory::TriMesh);

        let compound = ColliderShape::Compound {
            parts: vec![
                CompoundPart {
                    offset: [0.0, 0.0, 1.0],
                    rotation: [0.0, 0.0, 0.0, 1.0],
                    shape: ColliderShape::cuboid(1.0, 0.5, 2.0),
                    surface: None,
                },
                CompoundPart {
                    offset: [0.0, 1.0, 0.0],
                    rotation: [0.0, 0.0, 0.0, 1.0],
                    shape: ColliderShape::sphere(0.5),
                    surface: None,
                },
            ],
        }
        .to_shared()
        .unwrap();
        assert_eq!(ShapeCategory::of(compound.as_ref()), ShapeCategory::Compound);
    }

    #[test]
    fn test_invalid_shapes_rejected() {
        assert!(ColliderShape::sphere(0.0).to_shared().is_err());
        assert!(ColliderShape::cuboid(1.0, -1.0, 1.0).to_shared().is_err());
        assert!(ColliderShape::trimesh(vec![[0.0; 3]], vec![[0, 1, 2]]).to_shared().is_err());
        assert!(ColliderShape::Compound { parts: Vec::new() }.to_shared().is_err());
    }

    #[test]
    fn test_triangle_surfaces() {
        assert_eq!(quad().triangle_surfaces().map(|s| s.len()), Some(2));
        assert!(ColliderShape::sphere(1.0).triangle_surfaces().is_none());
    }

    #[test]
    fn test_mismatched_surface_count_rejected() {
        let shape = ColliderShape::TriMesh {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            indices: vec![[0, 1, 2]],
            surfaces: vec![SurfaceParamId(0), SurfaceParamId(1)],
        };
        assert!(shape.to_shared().is_err());
    }
}
