use crate::enums::Plane;
use crate::geometry::{Extent, PlaneGeometry};
use crate::gpu_sampler::{GpuError, GpuSliceSampler};
use crate::slice_extractor::{RawSlice, SliceError, SliceExtractor};
use crate::volume_loader::VolumeLoaderError;

use image::GrayImage;
use ndarray::{Array3, ArrayView2, s};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VOLUME_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a loaded volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VolumeId(u64);

impl VolumeId {
    fn next() -> Self {
        Self(NEXT_VOLUME_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Payload handed over by an external container decoder.
#[derive(Clone, Debug)]
pub struct DecodedVolume {
    /// `[time, x, y, z]`; the leading entry is carried but unused.
    pub dims: [usize; 4],
    pub datatype_code: i16,
    /// Flat buffer, index = z·dimX·dimY + y·dimX + x.
    pub buffer: Vec<f32>,
    pub spacing: (f32, f32, f32),
    pub affine: Option<[f64; 16]>,
}

#[derive(Debug)]
pub struct Volume {
    id: VolumeId,
    dims: [usize; 4],
    datatype_code: i16,
    /// Stored as (depth, height, width) = (z, y, x).
    data: Array3<f32>,
    spacing: (f32, f32, f32),
    affine: Option<[f64; 16]>,
}

impl Volume {
    /// Build a volume from a (z, y, x) array of float voxels.
    pub fn new(data: Array3<f32>, datatype_code: i16) -> Self {
        let (depth, height, width) = data.dim();
        Self {
            id: VolumeId::next(),
            dims: [1, width, height, depth],
            datatype_code,
            data,
            spacing: (1.0, 1.0, 1.0),
            affine: None,
        }
    }

    pub fn from_decoded(decoded: DecodedVolume) -> Result<Self, VolumeLoaderError> {
        let [_, width, height, depth] = decoded.dims;
        if width == 0 || height == 0 || depth == 0 {
            return Err(VolumeLoaderError::Format(format!(
                "volume has an empty axis: {:?}",
                decoded.dims
            )));
        }
        let expected = width * height * depth;
        if decoded.buffer.len() != expected {
            return Err(VolumeLoaderError::Format(format!(
                "buffer holds {} voxels, header describes {}",
                decoded.buffer.len(),
                expected
            )));
        }
        let data = Array3::from_shape_vec((depth, height, width), decoded.buffer)
            .map_err(|e| VolumeLoaderError::Format(e.to_string()))?;

        Ok(Self {
            id: VolumeId::next(),
            dims: decoded.dims,
            datatype_code: decoded.datatype_code,
            data,
            spacing: decoded.spacing,
            affine: decoded.affine,
        })
    }

    pub fn id(&self) -> VolumeId {
        self.id
    }

    /// `[time, x, y, z]` as reported by the container.
    pub fn dims(&self) -> [usize; 4] {
        self.dims
    }

    pub fn extent(&self) -> Extent {
        let (depth, height, width) = self.data.dim();
        Extent::new(width, height, depth)
    }

    pub fn datatype_code(&self) -> i16 {
        self.datatype_code
    }

    pub fn spacing(&self) -> (f32, f32, f32) {
        self.spacing
    }

    /// Row-major 4x4 voxel-to-world transform, when the header carried one.
    pub fn affine(&self) -> Option<&[f64; 16]> {
        self.affine.as_ref()
    }

    /// Get a reference to the underlying (z, y, x) data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    #[inline]
    pub fn flat_index(&self, x: usize, y: usize, z: usize) -> usize {
        let extent = self.extent();
        z * extent.x * extent.y + y * extent.x + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<f32> {
        self.data.get((z, y, x)).copied()
    }

    pub fn slice_count(&self, plane: Plane) -> usize {
        PlaneGeometry::of(plane).slice_count(&self.extent())
    }

    pub fn is_valid_index(&self, index: usize, plane: Plane) -> bool {
        index < self.slice_count(plane)
    }

    pub fn central_slice(&self, plane: Plane) -> usize {
        self.slice_count(plane) / 2
    }

    /// Unoriented view of one slice in array order.
    pub fn get_slice_from_axis(&self, index: usize, plane: Plane) -> Option<ArrayView2<'_, f32>> {
        if !self.is_valid_index(index, plane) {
            return None;
        }
        let slice_result = match plane {
            Plane::Axial => self.data.slice(s![index, .., ..]),
            Plane::Coronal => self.data.slice(s![.., index, ..]),
            Plane::Sagittal => self.data.slice(s![.., .., index]),
        };
        Some(slice_result)
    }

    /// Normalized 8-bit image of one slice, display-oriented.
    pub fn get_image_from_axis(&self, index: usize, plane: Plane) -> Result<GrayImage, SliceError> {
        SliceExtractor::extract_slice(self, plane, index)
    }

    /// Same as [`Volume::get_image_from_axis`], sampling the raw slice on the GPU.
    pub async fn get_image_from_axis_gpu(
        &self,
        index: usize,
        plane: Plane,
        sampler: &GpuSliceSampler,
    ) -> Result<GrayImage, GpuError> {
        if sampler.volume_id() != self.id {
            return Err(GpuError::VolumeMismatch);
        }
        if !self.is_valid_index(index, plane) {
            return Err(SliceError::OutOfRange {
                plane,
                index,
                count: self.slice_count(plane),
            }
            .into());
        }
        let (width, height) = PlaneGeometry::of(plane).output_dimensions(&self.extent());
        let values = sampler.sample_slice(index, plane).await?;
        let raw = RawSlice {
            width,
            height,
            values,
        };
        Ok(SliceExtractor::normalize(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize, depth: usize) -> Volume {
        let data = Array3::from_shape_fn((depth, height, width), |(z, y, x)| {
            (z * width * height + y * width + x) as f32
        });
        Volume::new(data, 16)
    }

    #[test]
    fn get_uses_the_canonical_flat_index() {
        let volume = ramp(3, 4, 5);
        assert_eq!(volume.dims(), [1, 3, 4, 5]);
        for (x, y, z) in [(0, 0, 0), (2, 3, 4), (1, 2, 3)] {
            let expected = volume.flat_index(x, y, z) as f32;
            assert_eq!(volume.get(x, y, z), Some(expected));
        }
        assert_eq!(volume.get(3, 0, 0), None);
    }

    #[test]
    fn slice_counts_per_plane() {
        let volume = ramp(3, 4, 5);
        assert_eq!(volume.slice_count(Plane::Axial), 5);
        assert_eq!(volume.slice_count(Plane::Coronal), 4);
        assert_eq!(volume.slice_count(Plane::Sagittal), 3);
        assert_eq!(volume.central_slice(Plane::Axial), 2);
    }

    #[test]
    fn decoded_buffer_must_match_dims() {
        let decoded = DecodedVolume {
            dims: [1, 2, 2, 2],
            datatype_code: 16,
            buffer: vec![0.0; 7],
            spacing: (1.0, 1.0, 1.0),
            affine: None,
        };
        assert!(matches!(
            Volume::from_decoded(decoded),
            Err(VolumeLoaderError::Format(_))
        ));
    }

    #[test]
    fn every_volume_gets_a_fresh_id() {
        assert_ne!(ramp(1, 1, 1).id(), ramp(1, 1, 1).id());
    }
}
