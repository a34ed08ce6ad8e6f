//! Broadphase grid over the world XZ plane
//!
//! The world is cut into square columns of `cell_size` units. An object
//! lives in every cell its AABB overlaps, so pair candidates and segment
//! candidates come from a handful of bucket lookups. Cells are stored
//! sparsely; only occupied cells allocate.
//!
//! Coordinates are clamped to [`WORLD_LIMIT`] before indexing. Anything
//! outside that range collapses into the edge cells, which keeps indexing
//! valid but degrades rejection.

use crate::arena::ObjectHandle;
use rapier3d::parry::bounding_volume::Aabb;
use rapier3d::parry::math::{Point, Real};
use std::collections::{HashMap, HashSet};

/// Largest coordinate on X and Z the grid indexes exactly
pub const WORLD_LIMIT: Real = 32767.0;

/// Integer cell coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    pub x: i32,
    pub z: i32,
}

impl CellCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// Inclusive rectangle of cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub min: CellCoord,
    pub max: CellCoord,
}

impl CellRange {
    /// Range covering a single cell
    pub const fn single(cell: CellCoord) -> Self {
        Self { min: cell, max: cell }
    }

    /// Check if a cell lies inside the range
    pub fn contains(&self, cell: CellCoord) -> bool {
        (self.min.x..=self.max.x).contains(&cell.x) && (self.min.z..=self.max.z).contains(&cell.z)
    }

    /// Number of cells covered
    pub fn cell_count(&self) -> usize {
        let width = (self.max.x - self.min.x + 1).max(0) as usize;
        let depth = (self.max.z - self.min.z + 1).max(0) as usize;
        width * depth
    }

    /// Iterate cells, X outer and Z inner, both ascending
    pub fn iter(&self) -> impl Iterator<Item = CellCoord> {
        let (min, max) = (self.min, self.max);
        (min.x..=max.x).flat_map(move |x| (min.z..=max.z).map(move |z| CellCoord::new(x, z)))
    }
}

/// One bucket of the grid
#[derive(Debug, Default, Clone)]
pub struct GridCell {
    objects: Vec<ObjectHandle>,
}

impl GridCell {
    /// Objects overlapping the cell, in insertion order
    pub fn objects(&self) -> &[ObjectHandle] {
        &self.objects
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.objects.contains(&handle)
    }

    fn insert(&mut self, handle: ObjectHandle) {
        if !self.objects.contains(&handle) {
            self.objects.push(handle);
        }
    }

    fn remove(&mut self, handle: ObjectHandle) {
        self.objects.retain(|h| *h != handle);
    }
}

/// Sparse 2D spatial partition
#[derive(Debug)]
pub struct BroadphaseGrid {
    cell_size: Real,
    inv_cell_size: Real,
    max_cell: i32,
    cells: HashMap<CellCoord, GridCell>,
}

impl BroadphaseGrid {
    /// Create a grid with square cells of `cell_size` units
    pub fn new(cell_size: Real) -> Self {
        let cell_size = cell_size.max(1.0);
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            max_cell: (WORLD_LIMIT / cell_size).floor() as i32,
            cells: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> Real {
        self.cell_size
    }

    /// Cell containing a world XZ position
    pub fn cell_coord(&self, x: Real, z: Real) -> CellCoord {
        CellCoord::new(self.axis_cell(x), self.axis_cell(z))
    }

    fn axis_cell(&self, value: Real) -> i32 {
        let value = if value.is_nan() { 0.0 } else { value.clamp(-WORLD_LIMIT, WORLD_LIMIT) };
        ((value * self.inv_cell_size).floor() as i32).clamp(-self.max_cell - 1, self.max_cell)
    }

    /// Cells overlapped by an AABB
    pub fn cell_range(&self, aabb: &Aabb) -> CellRange {
        CellRange {
            min: self.cell_coord(aabb.mins.x, aabb.mins.z),
            max: self.cell_coord(aabb.maxs.x, aabb.maxs.z),
        }
    }

    /// World-space bounds of a cell, spanning the whole height of the world
    pub fn cell_bounds(&self, cell: CellCoord) -> Aabb {
        let x = cell.x as Real * self.cell_size;
        let z = cell.z as Real * self.cell_size;
        Aabb::new(
            Point::new(x, -WORLD_LIMIT, z),
            Point::new(x + self.cell_size, WORLD_LIMIT, z + self.cell_size),
        )
    }

    /// Move an object from `old` to `new`. Returns `true` if residency changed.
    pub fn setup_object(&mut self, handle: ObjectHandle, new: CellRange, old: Option<CellRange>) -> bool {
        if old == Some(new) {
            return false;
        }

        if let Some(old) = old {
            for cell in old.iter().filter(|cell| !new.contains(*cell)) {
                self.remove_from_cell(cell, handle);
            }
        }
        for cell in new.iter() {
            if old.map_or(true, |old| !old.contains(cell)) {
                self.cells.entry(cell).or_default().insert(handle);
            }
        }
        true
    }

    /// Remove an object from every cell of its range
    pub fn remove_object(&mut self, handle: ObjectHandle, range: CellRange) {
        for cell in range.iter() {
            self.remove_from_cell(cell, handle);
        }
    }

    fn remove_from_cell(&mut self, cell: CellCoord, handle: ObjectHandle) {
        if let Some(bucket) = self.cells.get_mut(&cell) {
            bucket.remove(handle);
            if bucket.objects.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }

    /// Get a cell if anything occupies it
    pub fn cell(&self, cell: CellCoord) -> Option<&GridCell> {
        self.cells.get(&cell)
    }

    /// Number of occupied cells
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Occupied cells in coordinate order
    pub fn occupied(&self) -> Vec<CellCoord> {
        let mut cells: Vec<_> = self.cells.keys().copied().collect();
        cells.sort();
        cells
    }

    /// Objects of every cell in a range. A handle repeats once per shared cell.
    pub fn objects_in_range(&self, range: CellRange) -> impl Iterator<Item = ObjectHandle> + '_ {
        range
            .iter()
            .filter_map(move |cell| self.cells.get(&cell))
            .flat_map(|bucket| bucket.objects.iter().copied())
    }

    fn segment_span(&self, start: &Point<Real>, end: &Point<Real>, margin: Real) -> SegmentSpan {
        let x_step = if end.x < start.x { -1 } else { 1 };
        let z_step = if end.z < start.z { -1 } else { 1 };
        SegmentSpan {
            from: CellCoord::new(
                self.axis_cell(start.x - margin * x_step as Real),
                self.axis_cell(start.z - margin * z_step as Real),
            ),
            to: CellCoord::new(
                self.axis_cell(end.x + margin * x_step as Real),
                self.axis_cell(end.z + margin * z_step as Real),
            ),
            x_step,
            z_step,
        }
    }

    /// Cells overlapping the XZ bounding box of a segment, grown by `margin`.
    ///
    /// Cells are stepped from the start cell toward the end cell, X outer and
    /// Z inner, so near cells come first. The iterator is lazy.
    pub fn segment_cells(
        &self,
        start: &Point<Real>,
        end: &Point<Real>,
        margin: Real,
    ) -> impl Iterator<Item = CellCoord> {
        self.segment_span(start, end, margin).cells()
    }

    /// Visit each object near a segment once, in segment cell order.
    ///
    /// When the segment covers more cells than are occupied, the occupied
    /// cells are walked instead, sorted into the same order.
    pub fn for_each_along_segment<F>(&self, start: &Point<Real>, end: &Point<Real>, margin: Real, mut visit: F)
    where
        F: FnMut(ObjectHandle),
    {
        let span = self.segment_span(start, end, margin);
        let mut seen = HashSet::new();
        let mut visit_cell = |cell: CellCoord| {
            let Some(bucket) = self.cells.get(&cell) else {
                return;
            };
            for &handle in &bucket.objects {
                if seen.insert(handle) {
                    visit(handle);
                }
            }
        };

        if span.cell_count() > self.cells.len() as u64 {
            let bounds = span.range();
            let mut occupied: Vec<CellCoord> =
                self.cells.keys().copied().filter(|cell| bounds.contains(*cell)).collect();
            occupied.sort_unstable_by_key(|cell| span.rank(*cell));
            occupied.into_iter().for_each(&mut visit_cell);
        } else {
            span.cells().for_each(&mut visit_cell);
        }
    }
}

/// Cell rectangle of a segment, stepped from the start corner
#[derive(Debug, Clone, Copy)]
struct SegmentSpan {
    from: CellCoord,
    to: CellCoord,
    x_step: i32,
    z_step: i32,
}

impl SegmentSpan {
    fn cell_count(&self) -> u64 {
        let width = u64::from((self.to.x - self.from.x).unsigned_abs()) + 1;
        let depth = u64::from((self.to.z - self.from.z).unsigned_abs()) + 1;
        width * depth
    }

    fn range(&self) -> CellRange {
        CellRange {
            min: CellCoord::new(self.from.x.min(self.to.x), self.from.z.min(self.to.z)),
            max: CellCoord::new(self.from.x.max(self.to.x), self.from.z.max(self.to.z)),
        }
    }

    /// Position of a cell in stepping order
    fn rank(&self, cell: CellCoord) -> (i32, i32) {
        ((cell.x - self.from.x) * self.x_step, (cell.z - self.from.z) * self.z_step)
    }

    fn cells(self) -> impl Iterator<Item = CellCoord> {
        stepped(self.from.x, self.to.x, self.x_step)
            .flat_map(move |x| stepped(self.from.z, self.to.z, self.z_step).map(move |z| CellCoord::new(x, z)))
    }
}

fn stepped(from: i32, to: i32, step: i32) -> impl Iterator<Item = i32> {
    (0..=(to - from).unsigned_abs()).map(move |i| from + step * i as i32)
}
