//! Plane descriptors shared by slice extraction, overlay lookup and tumor
//! scanning.
//!
//! Every plane is described by the axis it holds fixed, the axis that runs
//! along screen columns and the axis that runs along screen rows. Rows are
//! flipped so that superior/anterior ends up at the top of the image.

use crate::enums::Plane;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Plane whose slice index is selected along this axis.
    pub fn slicing_plane(&self) -> Plane {
        match self {
            Axis::X => Plane::Sagittal,
            Axis::Y => Plane::Coronal,
            Axis::Z => Plane::Axial,
        }
    }
}

/// Voxel extents of a volume along X, Y and Z.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extent {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Extent {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    pub fn get(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn voxel_count(&self) -> usize {
        self.x * self.y * self.z
    }

    /// Equal, or off by at most one voxel on every axis.
    pub fn within_one_voxel(&self, other: &Extent) -> bool {
        self.x.abs_diff(other.x) <= 1 && self.y.abs_diff(other.y) <= 1 && self.z.abs_diff(other.z) <= 1
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneGeometry {
    pub fixed: Axis,
    pub column: Axis,
    pub row: Axis,
    pub flip_rows: bool,
}

impl PlaneGeometry {
    pub const fn of(plane: Plane) -> Self {
        match plane {
            Plane::Axial => Self {
                fixed: Axis::Z,
                column: Axis::X,
                row: Axis::Y,
                flip_rows: true,
            },
            Plane::Coronal => Self {
                fixed: Axis::Y,
                column: Axis::X,
                row: Axis::Z,
                flip_rows: true,
            },
            Plane::Sagittal => Self {
                fixed: Axis::X,
                column: Axis::Y,
                row: Axis::Z,
                flip_rows: true,
            },
        }
    }

    pub fn slice_count(&self, extent: &Extent) -> usize {
        extent.get(self.fixed)
    }

    /// Output image size as (width, height).
    pub fn output_dimensions(&self, extent: &Extent) -> (usize, usize) {
        (extent.get(self.column), extent.get(self.row))
    }

    /// Voxel coordinate `[x, y, z]` shown at output pixel (`col`, `row`) of
    /// slice `index`.
    #[inline]
    pub fn voxel(&self, extent: &Extent, index: usize, col: usize, row: usize) -> [usize; 3] {
        let row = if self.flip_rows {
            extent.get(self.row) - 1 - row
        } else {
            row
        };
        let mut coord = [0usize; 3];
        coord[axis_slot(self.fixed)] = index;
        coord[axis_slot(self.column)] = col;
        coord[axis_slot(self.row)] = row;
        coord
    }
}

#[inline]
pub(crate) fn axis_slot(axis: Axis) -> usize {
    match axis {
        Axis::X => 0,
        Axis::Y => 1,
        Axis::Z => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_dimensions_follow_in_plane_axes() {
        let extent = Extent::new(4, 5, 6);
        assert_eq!(PlaneGeometry::of(Plane::Axial).output_dimensions(&extent), (4, 5));
        assert_eq!(PlaneGeometry::of(Plane::Coronal).output_dimensions(&extent), (4, 6));
        assert_eq!(PlaneGeometry::of(Plane::Sagittal).output_dimensions(&extent), (5, 6));
    }

    #[test]
    fn top_row_is_the_far_end_of_the_row_axis() {
        let extent = Extent::new(4, 5, 6);
        assert_eq!(PlaneGeometry::of(Plane::Axial).voxel(&extent, 2, 1, 0), [1, 4, 2]);
        assert_eq!(PlaneGeometry::of(Plane::Coronal).voxel(&extent, 3, 1, 0), [1, 3, 5]);
        assert_eq!(PlaneGeometry::of(Plane::Sagittal).voxel(&extent, 0, 2, 5), [0, 2, 0]);
    }

    #[test]
    fn tolerance_is_one_voxel_per_axis() {
        let base = Extent::new(10, 10, 10);
        assert!(base.within_one_voxel(&Extent::new(11, 9, 10)));
        assert!(!base.within_one_voxel(&Extent::new(12, 10, 10)));
    }
}
