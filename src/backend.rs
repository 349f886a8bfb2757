//! Typed facade over whatever draws the panes.
//!
//! The viewer only talks to [`RenderBackend`]; [`CpuBackend`] is the
//! software implementation built on the slice extractor and compositor.

use std::sync::Arc;

use image::RgbImage;
use rayon::prelude::*;
use thiserror::Error;

use crate::colormap::ColorLut;
use crate::crosshair::{CrosshairPosition, SliceIndices, index_to_coord};
use crate::enums::Plane;
use crate::geometry::{Axis, Extent, axis_slot};
use crate::overlay::{DimensionMatch, DimensionMismatch, OverlayCompositor, OverlayStyle, OverlayVolume};
use crate::slice_extractor::{RawSlice, SliceError, SliceExtractor};
use crate::viewport::Camera;
use crate::volume::Volume;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no volume loaded")]
    NoVolume,

    #[error("render context lost")]
    ContextLost,

    #[error(transparent)]
    Slice(#[from] SliceError),
}

/// What the next frame shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderTarget {
    Slice(Plane),
    Volume,
}

/// Overlay drawn over the base image, bottom to top in insertion order.
#[derive(Clone, Debug)]
pub struct OverlayLayer {
    pub overlay: Arc<OverlayVolume>,
    pub style: OverlayStyle,
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub target: RenderTarget,
    pub image: RgbImage,
    /// Overlays left out of this frame because they do not line up.
    pub mismatches: Vec<DimensionMismatch>,
}

pub trait RenderBackend {
    fn load(&mut self, volume: Arc<Volume>);
    fn set_plane(&mut self, target: RenderTarget);
    fn set_crosshair(&mut self, position: CrosshairPosition, slices: SliceIndices);
    fn composite(&mut self, layers: Vec<OverlayLayer>);
    fn set_clip_plane(&mut self, clip: Option<[f32; 4]>);
    fn set_camera(&mut self, camera: Camera);
    fn set_color_lut(&mut self, lut: ColorLut);

    /// # Errors
    ///
    /// [`BackendError::ContextLost`] while the context is gone; the caller
    /// skips the frame and keeps its state.
    fn draw_frame(&mut self) -> Result<Frame, BackendError>;

    fn context_lost(&self) -> bool;
}

/// Axis-aligned projection closest to the camera's line of sight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Projection {
    pub depth: Axis,
    pub column: Axis,
    pub row: Axis,
    pub mirror_columns: bool,
}

impl Default for Projection {
    fn default() -> Self {
        Self::from_camera(Camera::frontal())
    }
}

impl Projection {
    pub fn from_camera(camera: Camera) -> Self {
        let (azimuth, elevation) = (camera.azimuth.to_radians(), camera.elevation.to_radians());
        let sight = [
            azimuth.sin() * elevation.cos(),
            azimuth.cos() * elevation.cos(),
            elevation.sin(),
        ];
        let [x, y, z] = sight.map(f32::abs);
        if z > x && z > y {
            Self {
                depth: Axis::Z,
                column: Axis::X,
                row: Axis::Y,
                mirror_columns: sight[2] < 0.0,
            }
        } else if x > y {
            Self {
                depth: Axis::X,
                column: Axis::Y,
                row: Axis::Z,
                mirror_columns: sight[0] < 0.0,
            }
        } else {
            Self {
                depth: Axis::Y,
                column: Axis::X,
                row: Axis::Z,
                mirror_columns: sight[1] < 0.0,
            }
        }
    }

    /// Output image size as (width, height).
    pub fn output_dimensions(&self, extent: &Extent) -> (usize, usize) {
        (extent.get(self.column), extent.get(self.row))
    }

    #[inline]
    fn voxel(&self, extent: &Extent, col: usize, row: usize, depth: usize) -> [usize; 3] {
        let col = if self.mirror_columns {
            extent.get(self.column) - 1 - col
        } else {
            col
        };
        let mut voxel = [0usize; 3];
        voxel[axis_slot(self.depth)] = depth;
        voxel[axis_slot(self.column)] = col;
        voxel[axis_slot(self.row)] = extent.get(self.row) - 1 - row;
        voxel
    }
}

#[derive(Clone, Debug, Default)]
pub struct CpuBackend {
    volume: Option<Arc<Volume>>,
    target: Option<RenderTarget>,
    position: CrosshairPosition,
    slices: SliceIndices,
    layers: Vec<OverlayLayer>,
    clip: Option<[f32; 4]>,
    projection: Projection,
    lut: ColorLut,
    lost: bool,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lose_context(&mut self) {
        log::warn!("render context lost");
        self.lost = true;
    }

    pub fn restore_context(&mut self) {
        if self.lost {
            log::info!("render context restored");
            self.lost = false;
        }
    }

    pub fn crosshair(&self) -> CrosshairPosition {
        self.position
    }

    fn draw_slice(&self, volume: &Volume, plane: Plane) -> Result<Frame, BackendError> {
        let extent = volume.extent();
        let index = self.slices.get(plane);
        let gray = SliceExtractor::extract_slice(volume, plane, index)?;
        let mut image = self.lut.colorize(&gray);
        let mut mismatches = Vec::new();
        for layer in &self.layers {
            let composite =
                OverlayCompositor::composite_rgb(&image, &extent, &layer.overlay, plane, index, layer.style);
            image = composite.image;
            mismatches.extend(composite.mismatch);
        }
        Ok(Frame {
            target: RenderTarget::Slice(plane),
            image,
            mismatches,
        })
    }

    /// Maximum intensity projection along the axis the camera looks down,
    /// with voxels in front of the coronal clip plane cut away.
    fn draw_volume(&self, volume: &Volume) -> Frame {
        let extent = volume.extent();
        let first_y = self.first_visible_y(&extent);
        let projection = self.projection;
        let (width, height) = projection.output_dimensions(&extent);
        let depth = extent.get(projection.depth);

        let values: Vec<f32> = (0..height)
            .into_par_iter()
            .flat_map_iter(|row| {
                (0..width).map(move |col| {
                    (0..depth)
                        .map(|d| projection.voxel(&extent, col, row, d))
                        .filter(|voxel| voxel[1] >= first_y)
                        .filter_map(|[x, y, z]| volume.get(x, y, z))
                        .fold(0.0f32, f32::max)
                })
            })
            .collect();
        let gray = SliceExtractor::normalize(&RawSlice {
            width,
            height,
            values,
        });
        let mut image = self.lut.colorize(&gray);

        let mut mismatches = Vec::new();
        for layer in &self.layers {
            if layer.overlay.dimension_match(&extent) == DimensionMatch::Mismatch {
                mismatches.push(DimensionMismatch {
                    base: extent,
                    overlay: layer.overlay.extent(),
                });
                continue;
            }
            let pixels: &mut [u8] = &mut image;
            pixels
                .par_chunks_exact_mut(3)
                .enumerate()
                .for_each(|(i, pixel)| {
                    let (col, row) = (i % width, i / width);
                    let hit = (0..depth)
                        .map(|d| projection.voxel(&extent, col, row, d))
                        .any(|voxel| voxel[1] >= first_y && layer.overlay.is_marked(voxel));
                    if hit {
                        layer.style.blend(pixel);
                    }
                });
        }
        Frame {
            target: RenderTarget::Volume,
            image,
            mismatches,
        }
    }

    fn first_visible_y(&self, extent: &Extent) -> usize {
        match self.clip {
            Some([_, _, _, offset]) => {
                let cut = offset + 0.5;
                (0..extent.y)
                    .find(|&y| index_to_coord(y, extent.y) >= cut)
                    .unwrap_or(extent.y.saturating_sub(1))
            }
            None => 0,
        }
    }
}

impl RenderBackend for CpuBackend {
    fn load(&mut self, volume: Arc<Volume>) {
        log::debug!("backend received volume {:?}", volume.id());
        self.volume = Some(volume);
    }

    fn set_plane(&mut self, target: RenderTarget) {
        self.target = Some(target);
    }

    fn set_crosshair(&mut self, position: CrosshairPosition, slices: SliceIndices) {
        self.position = position;
        self.slices = slices;
    }

    fn composite(&mut self, layers: Vec<OverlayLayer>) {
        self.layers = layers;
    }

    fn set_clip_plane(&mut self, clip: Option<[f32; 4]>) {
        self.clip = clip;
    }

    fn set_camera(&mut self, camera: Camera) {
        self.projection = Projection::from_camera(camera);
    }

    fn set_color_lut(&mut self, lut: ColorLut) {
        self.lut = lut;
    }

    fn draw_frame(&mut self) -> Result<Frame, BackendError> {
        if self.lost {
            return Err(BackendError::ContextLost);
        }
        let volume = self.volume.as_ref().ok_or(BackendError::NoVolume)?;
        match self.target.unwrap_or(RenderTarget::Slice(Plane::Axial)) {
            RenderTarget::Slice(plane) => self.draw_slice(volume, plane),
            RenderTarget::Volume => Ok(self.draw_volume(volume)),
        }
    }

    fn context_lost(&self) -> bool {
        self.lost
    }
}
