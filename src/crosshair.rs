//! Shared 3D cursor and per-plane slice indices.
//!
//! In [`Discipline::Linked`] the normalized crosshair is the single source of
//! truth and every plane's slice index is derived from it. In
//! [`Discipline::Independent`] each plane keeps its own index and the
//! crosshair is left alone.

use crate::enums::Plane;
use crate::geometry::{Axis, Extent, PlaneGeometry};
use crate::layout::{Pane, QuadrantLayout, Viewport};

use serde::{Deserialize, Serialize};

/// Normalized cursor, `u` along X, `v` along Y, `w` along Z.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrosshairPosition {
    pub u: f32,
    pub v: f32,
    pub w: f32,
}

impl Default for CrosshairPosition {
    fn default() -> Self {
        Self {
            u: 0.5,
            v: 0.5,
            w: 0.5,
        }
    }
}

impl CrosshairPosition {
    pub fn new(u: f32, v: f32, w: f32) -> Self {
        Self {
            u: u.clamp(0.0, 1.0),
            v: v.clamp(0.0, 1.0),
            w: w.clamp(0.0, 1.0),
        }
    }

    pub fn from_indices(extent: &Extent, indices: [(Axis, usize); 3]) -> Self {
        let mut position = Self::default();
        for (axis, index) in indices {
            position.set(axis, index_to_coord(index, extent.get(axis)));
        }
        position
    }

    pub fn get(&self, axis: Axis) -> f32 {
        match axis {
            Axis::X => self.u,
            Axis::Y => self.v,
            Axis::Z => self.w,
        }
    }

    pub fn set(&mut self, axis: Axis, value: f32) {
        let value = value.clamp(0.0, 1.0);
        match axis {
            Axis::X => self.u = value,
            Axis::Y => self.v = value,
            Axis::Z => self.w = value,
        }
    }

    /// `round(coord · (extent - 1))` along the plane's fixed axis.
    pub fn slice_index(&self, plane: Plane, extent: &Extent) -> usize {
        let axis = PlaneGeometry::of(plane).fixed;
        coord_to_index(self.get(axis), extent.get(axis))
    }
}

pub fn coord_to_index(coord: f32, axis_extent: usize) -> usize {
    let last = axis_extent.saturating_sub(1);
    ((coord.clamp(0.0, 1.0) * last as f32).round() as usize).min(last)
}

pub fn index_to_coord(index: usize, axis_extent: usize) -> f32 {
    if axis_extent <= 1 {
        0.5
    } else {
        (index as f32 / (axis_extent - 1) as f32).clamp(0.0, 1.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceIndices {
    pub axial: usize,
    pub coronal: usize,
    pub sagittal: usize,
}

impl SliceIndices {
    pub fn get(&self, plane: Plane) -> usize {
        match plane {
            Plane::Axial => self.axial,
            Plane::Coronal => self.coronal,
            Plane::Sagittal => self.sagittal,
        }
    }

    pub fn set(&mut self, plane: Plane, index: usize) {
        match plane {
            Plane::Axial => self.axial = index,
            Plane::Coronal => self.coronal = index,
            Plane::Sagittal => self.sagittal = index,
        }
    }

    fn from_position(position: &CrosshairPosition, extent: &Extent) -> Self {
        let mut indices = Self::default();
        for plane in Plane::ALL {
            indices.set(plane, position.slice_index(plane, extent));
        }
        indices
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Discipline {
    #[default]
    Independent,
    Linked,
}

/// Pointer drag pinned to the pane it started in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DragSession {
    pub plane: Plane,
    pub viewport: Viewport,
}

#[derive(Clone, Debug)]
pub struct CrosshairController {
    position: CrosshairPosition,
    extent: Extent,
    discipline: Discipline,
    linked: SliceIndices,
    independent: SliceIndices,
    drag: Option<DragSession>,
}

impl CrosshairController {
    pub fn new(extent: Extent) -> Self {
        let position = CrosshairPosition::default();
        let linked = SliceIndices::from_position(&position, &extent);
        Self {
            position,
            extent,
            discipline: Discipline::default(),
            linked,
            independent: linked,
            drag: None,
        }
    }

    /// Back to defaults for a freshly loaded volume; the discipline is kept.
    pub fn reset(&mut self, extent: Extent) {
        let discipline = self.discipline;
        *self = Self::new(extent);
        self.discipline = discipline;
    }

    pub fn position(&self) -> CrosshairPosition {
        self.position
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    pub fn set_discipline(&mut self, discipline: Discipline) {
        if self.discipline != discipline {
            log::debug!("crosshair discipline {:?} -> {:?}", self.discipline, discipline);
            self.discipline = discipline;
            self.drag = None;
        }
    }

    pub fn slice_index(&self, plane: Plane) -> usize {
        self.slices().get(plane)
    }

    /// Indices currently displayed under the active discipline.
    pub fn slices(&self) -> SliceIndices {
        match self.discipline {
            Discipline::Independent => self.independent,
            Discipline::Linked => self.linked,
        }
    }

    pub fn independent_slices(&self) -> SliceIndices {
        self.independent
    }

    pub fn restore_independent_slices(&mut self, slices: SliceIndices) {
        for plane in Plane::ALL {
            let last = self.last_index(plane);
            self.independent.set(plane, slices.get(plane).min(last));
        }
    }

    /// Map a click at normalized (`local_x`, `local_y`) inside `plane`'s
    /// viewport onto the two in-plane coordinates. Returns the planes that
    /// must re-render; clicks do nothing in independent mode.
    pub fn set_from_plane_click(&mut self, plane: Plane, local_x: f32, local_y: f32) -> Vec<Plane> {
        if self.discipline == Discipline::Independent {
            return Vec::new();
        }
        let geometry = PlaneGeometry::of(plane);
        let vertical = if geometry.flip_rows { 1.0 - local_y } else { local_y };
        self.position.set(geometry.column, local_x);
        self.position.set(geometry.row, vertical);
        self.propagate(&[geometry.column, geometry.row])
    }

    /// Recompute the slice index of every plane that depends on `changed`.
    pub fn propagate(&mut self, changed: &[Axis]) -> Vec<Plane> {
        changed
            .iter()
            .map(|axis| {
                let plane = axis.slicing_plane();
                self.linked
                    .set(plane, self.position.slice_index(plane, &self.extent));
                plane
            })
            .collect()
    }

    pub fn set_slice(&mut self, plane: Plane, index: usize) -> Vec<Plane> {
        let index = index.min(self.last_index(plane));
        match self.discipline {
            Discipline::Independent => {
                self.independent.set(plane, index);
                vec![plane]
            }
            Discipline::Linked => {
                let axis = PlaneGeometry::of(plane).fixed;
                self.position
                    .set(axis, index_to_coord(index, self.extent.get(axis)));
                self.propagate(&[axis])
            }
        }
    }

    pub fn step_slice(&mut self, plane: Plane, delta: i64) -> Vec<Plane> {
        let current = self.slice_index(plane) as i64;
        let target = (current + delta).clamp(0, self.last_index(plane) as i64);
        self.set_slice(plane, target as usize)
    }

    /// Slider position in [0, 1].
    pub fn set_slice_fraction(&mut self, plane: Plane, fraction: f32) -> Vec<Plane> {
        let count = PlaneGeometry::of(plane).slice_count(&self.extent);
        self.set_slice(plane, coord_to_index(fraction, count))
    }

    pub fn slice_fraction(&self, plane: Plane) -> f32 {
        let count = PlaneGeometry::of(plane).slice_count(&self.extent);
        index_to_coord(self.slice_index(plane), count)
    }

    /// Jump every plane to `position`, e.g. the best tumor slices.
    pub fn set_position(&mut self, position: CrosshairPosition) -> Vec<Plane> {
        self.position = position;
        self.independent = SliceIndices::from_position(&position, &self.extent);
        self.propagate(&[Axis::X, Axis::Y, Axis::Z])
    }

    /// Start a drag in whichever slice quadrant contains the pointer.
    pub fn begin_drag(&mut self, layout: &QuadrantLayout, px: f32, py: f32) -> Option<Plane> {
        match layout.pane_at(px, py)? {
            Pane::Slice(plane) => {
                self.begin_drag_in(plane, layout.viewport_of(Pane::Slice(plane)), px, py);
                Some(plane)
            }
            Pane::Render3D => None,
        }
    }

    pub fn begin_drag_in(&mut self, plane: Plane, viewport: Viewport, px: f32, py: f32) -> Vec<Plane> {
        if self.discipline == Discipline::Independent {
            return Vec::new();
        }
        self.drag = Some(DragSession { plane, viewport });
        self.drag_to(px, py)
    }

    /// Follow the pointer inside the pane the drag started in, even when the
    /// pointer has left it.
    pub fn drag_to(&mut self, px: f32, py: f32) -> Vec<Plane> {
        match self.drag {
            Some(DragSession { plane, viewport }) => {
                let (lx, ly) = viewport.local(px, py);
                self.set_from_plane_click(plane, lx, ly)
            }
            None => Vec::new(),
        }
    }

    pub fn end_drag(&mut self, px: f32, py: f32) -> Vec<Plane> {
        let planes = self.drag_to(px, py);
        self.drag = None;
        planes
    }

    pub fn dragging(&self) -> Option<&DragSession> {
        self.drag.as_ref()
    }

    fn last_index(&self, plane: Plane) -> usize {
        PlaneGeometry::of(plane)
            .slice_count(&self.extent)
            .saturating_sub(1)
    }
}
