use crate::colormap::gray_to_rgb;
use crate::enums::{Plane, PresetColor};
use crate::geometry::{Extent, PlaneGeometry};
use crate::volume::{Volume, VolumeId};

use image::{GrayImage, RgbImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_OPACITY: f32 = 0.7;

/// Mask volume rendered as a colored layer over a base slice.
#[derive(Clone, Debug)]
pub struct OverlayVolume {
    volume: Arc<Volume>,
    threshold: f32,
}

impl OverlayVolume {
    pub fn new(volume: Arc<Volume>) -> Self {
        Self::with_threshold(volume, DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(volume: Arc<Volume>, threshold: f32) -> Self {
        Self { volume, threshold }
    }

    pub fn volume(&self) -> &Arc<Volume> {
        &self.volume
    }

    pub fn id(&self) -> VolumeId {
        self.volume.id()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn extent(&self) -> Extent {
        self.volume.extent()
    }

    pub fn dimension_match(&self, base: &Extent) -> DimensionMatch {
        let own = self.extent();
        if own == *base {
            DimensionMatch::Exact
        } else if own.within_one_voxel(base) {
            DimensionMatch::Tolerated
        } else {
            DimensionMatch::Mismatch
        }
    }

    /// Whether the voxel at `[x, y, z]` is above threshold; out-of-extent
    /// coordinates count as below.
    #[inline]
    pub fn is_marked(&self, [x, y, z]: [usize; 3]) -> bool {
        self.volume
            .get(x, y, z)
            .is_some_and(|value| value > self.threshold)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DimensionMatch {
    Exact,
    Tolerated,
    Mismatch,
}

/// Non-fatal signal: the overlay could not be aligned with the base volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DimensionMismatch {
    pub base: Extent,
    pub overlay: Extent,
}

impl fmt::Display for DimensionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "overlay {}x{}x{} does not match base {}x{}x{}",
            self.overlay.x, self.overlay.y, self.overlay.z, self.base.x, self.base.y, self.base.z
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayStyle {
    pub color: [u8; 3],
    pub opacity: f32,
}

impl OverlayStyle {
    pub fn new(color: [u8; 3], opacity: f32) -> Self {
        Self {
            color,
            opacity: opacity.clamp(0.0, 1.0),
        }
    }

    pub fn preset(color: PresetColor, opacity: f32) -> Self {
        Self::new(color.rgb(), opacity)
    }

    /// `out = base·(1-opacity) + color·opacity` on one RGB pixel.
    #[inline]
    pub fn blend(&self, pixel: &mut [u8]) {
        for (channel, color) in pixel.iter_mut().zip(self.color) {
            *channel = (*channel as f32 * (1.0 - self.opacity) + color as f32 * self.opacity)
                .round()
                .clamp(0.0, 255.0) as u8;
        }
    }
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self::preset(PresetColor::Green, DEFAULT_OPACITY)
    }
}

#[derive(Clone, Debug)]
pub struct Composite {
    pub image: RgbImage,
    pub mismatch: Option<DimensionMismatch>,
}

pub struct OverlayCompositor;

impl OverlayCompositor {
    /// Blend `overlay` onto a grayscale base slice.
    ///
    /// The base is never modified. When the overlay does not line up with
    /// `base_extent`, the unblended base is returned together with a
    /// [`DimensionMismatch`].
    pub fn composite(
        base: &GrayImage,
        base_extent: &Extent,
        overlay: &OverlayVolume,
        plane: Plane,
        index: usize,
        style: OverlayStyle,
    ) -> Composite {
        Self::composite_rgb(&gray_to_rgb(base), base_extent, overlay, plane, index, style)
    }

    /// Same as [`OverlayCompositor::composite`] for an already colorized base.
    pub fn composite_rgb(
        base: &RgbImage,
        base_extent: &Extent,
        overlay: &OverlayVolume,
        plane: Plane,
        index: usize,
        style: OverlayStyle,
    ) -> Composite {
        let mut image = base.clone();
        if overlay.dimension_match(base_extent) == DimensionMatch::Mismatch {
            return Composite {
                image,
                mismatch: Some(DimensionMismatch {
                    base: *base_extent,
                    overlay: overlay.extent(),
                }),
            };
        }

        let geometry = PlaneGeometry::of(plane);
        let width = image.width() as usize;
        if width == 0 || !overlay.volume().is_valid_index(index, plane) {
            return Composite {
                image,
                mismatch: None,
            };
        }
        let pixels: &mut [u8] = &mut image;

        pixels
            .par_chunks_exact_mut(width * 3)
            .enumerate()
            .for_each(|(row, line)| {
                for (col, pixel) in line.chunks_exact_mut(3).enumerate() {
                    let voxel = geometry.voxel(base_extent, index, col, row);
                    if overlay.is_marked(voxel) {
                        style.blend(pixel);
                    }
                }
            });

        Composite {
            image,
            mismatch: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn base_volume() -> Volume {
        Volume::new(Array3::from_elem((4, 4, 4), 10.0), 16)
    }

    fn single_voxel_overlay(extent: (usize, usize, usize), voxel: [usize; 3]) -> OverlayVolume {
        let (x, y, z) = extent;
        let mut data = Array3::zeros((z, y, x));
        data[[voxel[2], voxel[1], voxel[0]]] = 1.0;
        OverlayVolume::new(Arc::new(Volume::new(data, 2)))
    }

    #[test]
    fn composite_does_not_touch_the_base() {
        let base = GrayImage::from_pixel(4, 4, image::Luma([100]));
        let before = base.clone();
        let overlay = single_voxel_overlay((4, 4, 4), [2, 2, 3]);
        let extent = base_volume().extent();
        let out = OverlayCompositor::composite(&base, &extent, &overlay, Plane::Axial, 3, OverlayStyle::default());
        assert_eq!(base, before);
        assert!(out.mismatch.is_none());
    }

    #[test]
    fn marked_pixel_is_blended_at_the_flipped_row() {
        let base = GrayImage::from_pixel(4, 4, image::Luma([100]));
        let overlay = single_voxel_overlay((4, 4, 4), [2, 2, 3]);
        let extent = base_volume().extent();
        let style = OverlayStyle::new([0, 255, 0], 0.5);
        let out = OverlayCompositor::composite(&base, &extent, &overlay, Plane::Axial, 3, style);

        // y = 2 is displayed at row 4 - 1 - 2 = 1
        assert_eq!(out.image.get_pixel(2, 1).0, [50, 178, 50]);
        assert_eq!(out.image.get_pixel(2, 2).0, [100, 100, 100]);
        assert_eq!(out.image.get_pixel(0, 0).0, [100, 100, 100]);
    }

    #[test]
    fn other_slices_are_unblended() {
        let base = GrayImage::from_pixel(4, 4, image::Luma([100]));
        let overlay = single_voxel_overlay((4, 4, 4), [2, 2, 3]);
        let extent = base_volume().extent();
        let out = OverlayCompositor::composite(&base, &extent, &overlay, Plane::Axial, 1, OverlayStyle::default());
        assert!(out.image.pixels().all(|p| p.0 == [100, 100, 100]));
    }

    #[test]
    fn one_voxel_difference_is_tolerated() {
        let overlay = single_voxel_overlay((5, 4, 3), [0, 0, 0]);
        assert_eq!(overlay.dimension_match(&Extent::new(4, 4, 4)), DimensionMatch::Tolerated);
        assert_eq!(overlay.dimension_match(&Extent::new(5, 4, 3)), DimensionMatch::Exact);
    }

    #[test]
    fn taller_overlay_resolves_the_same_voxel() {
        let base = GrayImage::from_pixel(4, 4, image::Luma([100]));
        let overlay = single_voxel_overlay((4, 5, 4), [2, 2, 3]);
        let extent = base_volume().extent();
        assert_eq!(overlay.dimension_match(&extent), DimensionMatch::Tolerated);

        let style = OverlayStyle::new([0, 255, 0], 0.5);
        let out = OverlayCompositor::composite(&base, &extent, &overlay, Plane::Axial, 3, style);
        assert!(out.mismatch.is_none());
        // rows flip with the base extent, so y = 2 is still row 1
        assert_eq!(out.image.get_pixel(2, 1).0, [50, 178, 50]);
        assert_eq!(out.image.pixels().filter(|p| p.0 != [100, 100, 100]).count(), 1);
    }

    #[test]
    fn voxels_outside_a_smaller_overlay_stay_unblended() {
        let base = GrayImage::from_pixel(4, 4, image::Luma([100]));
        // one voxel short in x and z, marked everywhere it exists
        let overlay = OverlayVolume::new(Arc::new(Volume::new(Array3::from_elem((3, 4, 3), 1.0), 2)));
        let extent = base_volume().extent();
        let style = OverlayStyle::new([0, 255, 0], 0.5);

        let out = OverlayCompositor::composite(&base, &extent, &overlay, Plane::Axial, 2, style);
        assert!(out.mismatch.is_none());
        for row in 0..4 {
            assert_eq!(out.image.get_pixel(0, row).0, [50, 178, 50]);
            assert_eq!(out.image.get_pixel(2, row).0, [50, 178, 50]);
            assert_eq!(out.image.get_pixel(3, row).0, [100, 100, 100]);
        }

        let beyond = OverlayCompositor::composite(&base, &extent, &overlay, Plane::Axial, 3, style);
        assert!(beyond.image.pixels().all(|p| p.0 == [100, 100, 100]));
    }

    #[test]
    fn mismatched_overlay_is_dropped_with_a_signal() {
        let base = GrayImage::from_pixel(4, 4, image::Luma([100]));
        let overlay = single_voxel_overlay((8, 8, 8), [2, 2, 3]);
        let extent = base_volume().extent();
        let out = OverlayCompositor::composite(&base, &extent, &overlay, Plane::Axial, 3, OverlayStyle::default());
        let mismatch = out.mismatch.expect("mismatch signal");
        assert_eq!(mismatch.overlay, Extent::new(8, 8, 8));
        assert!(out.image.pixels().all(|p| p.0 == [100, 100, 100]));
    }
}
