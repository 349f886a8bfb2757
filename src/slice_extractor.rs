use crate::enums::Plane;
use crate::geometry::PlaneGeometry;
use crate::volume::Volume;

use image::GrayImage;
use rayon::prelude::*;
use thiserror::Error;

const LOWER_PERCENTILE: f64 = 0.05;
const UPPER_PERCENTILE: f64 = 0.95;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SliceError {
    #[error("slice index {index} is outside the {plane} range 0..{count}")]
    OutOfRange {
        plane: Plane,
        index: usize,
        count: usize,
    },
}

/// Display-oriented raw voxel values of one slice, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct RawSlice {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f32>,
}

/// Linear mapping from raw intensities to 8-bit gray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntensityWindow {
    pub lower: f32,
    pub upper: f32,
}

impl IntensityWindow {
    /// 5th/95th percentile of the non-zero values; `[0, 255]` when there are none.
    pub fn from_values(values: &[f32]) -> Self {
        let mut samples: Vec<f32> = values
            .iter()
            .copied()
            .filter(|v| *v != 0.0 && v.is_finite())
            .collect();
        if samples.is_empty() {
            return Self {
                lower: 0.0,
                upper: 255.0,
            };
        }
        samples.par_sort_unstable_by(f32::total_cmp);
        let len = samples.len() as f64;
        let lower_index = (len * LOWER_PERCENTILE).floor() as usize;
        let upper_index = ((len * UPPER_PERCENTILE).floor() as usize).min(samples.len() - 1);
        Self {
            lower: samples[lower_index],
            upper: samples[upper_index],
        }
    }

    #[inline]
    pub fn map(&self, value: f32) -> u8 {
        if self.upper > self.lower && self.upper > 0.0 {
            let scaled = (value - self.lower) / (self.upper - self.lower) * 255.0;
            scaled.clamp(0.0, 255.0) as u8
        } else if value > 0.0 {
            128
        } else {
            0
        }
    }
}

pub struct SliceExtractor;

impl SliceExtractor {
    /// Extract and normalize one slice.
    ///
    /// # Errors
    ///
    /// [`SliceError::OutOfRange`] when `index` is not a valid slice of `plane`.
    /// Interactive callers should go through [`SliceExtractor::clamp_index`].
    pub fn extract_slice(volume: &Volume, plane: Plane, index: usize) -> Result<GrayImage, SliceError> {
        let raw = Self::extract_raw(volume, plane, index)?;
        Ok(Self::normalize(&raw))
    }

    pub fn extract_raw(volume: &Volume, plane: Plane, index: usize) -> Result<RawSlice, SliceError> {
        let count = volume.slice_count(plane);
        if index >= count {
            return Err(SliceError::OutOfRange { plane, index, count });
        }

        let extent = volume.extent();
        let geometry = PlaneGeometry::of(plane);
        let (width, height) = geometry.output_dimensions(&extent);
        let data = volume.data();

        let values: Vec<f32> = (0..height)
            .into_par_iter()
            .flat_map_iter(|row| {
                (0..width).map(move |col| {
                    let [x, y, z] = geometry.voxel(&extent, index, col, row);
                    data[[z, y, x]]
                })
            })
            .collect();

        Ok(RawSlice {
            width,
            height,
            values,
        })
    }

    pub fn normalize(raw: &RawSlice) -> GrayImage {
        let window = IntensityWindow::from_values(&raw.values);
        log::trace!(
            "slice window {:.3}..{:.3} over {}x{}",
            window.lower,
            window.upper,
            raw.width,
            raw.height
        );
        let mut image = GrayImage::new(raw.width as u32, raw.height as u32);
        let pixels: &mut [u8] = &mut image;
        pixels
            .par_iter_mut()
            .zip(raw.values.par_iter())
            .for_each(|(pixel, &value)| *pixel = window.map(value));
        image
    }

    /// Clamp a scrubbed index into the valid range of `plane`.
    pub fn clamp_index(volume: &Volume, plane: Plane, index: i64) -> usize {
        let last = volume.slice_count(plane).saturating_sub(1) as i64;
        index.clamp(0, last) as usize
    }
}
