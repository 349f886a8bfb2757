use crate::volume::{DecodedVolume, Volume};

use flate2::read::GzDecoder;
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("Unrecognized volume container: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Decode a NIfTI-1 container, gzip compressed or not.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeLoaderError::Format`] if the bytes do not hold a
    /// readable container with at least three spatial dimensions.
    pub fn load_from_bytes(bytes: &[u8]) -> Result<Volume, VolumeLoaderError> {
        let decompressed;
        let raw = if Self::is_gzip(bytes) {
            let mut buffer = Vec::new();
            GzDecoder::new(Cursor::new(bytes))
                .read_to_end(&mut buffer)
                .map_err(|e| VolumeLoaderError::Format(format!("gzip stream: {e}")))?;
            decompressed = buffer;
            decompressed.as_slice()
        } else {
            bytes
        };

        let object = InMemNiftiObject::from_reader(Cursor::new(raw))
            .map_err(|e| VolumeLoaderError::Format(e.to_string()))?;
        let decoded = Self::decode_object(object)?;
        log::debug!(
            "decoded volume dims={:?} datatype={}",
            decoded.dims,
            decoded.datatype_code
        );
        Volume::from_decoded(decoded)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::load_from_bytes(&bytes)
    }

    fn is_gzip(bytes: &[u8]) -> bool {
        bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
    }

    fn decode_object(object: InMemNiftiObject) -> Result<DecodedVolume, VolumeLoaderError> {
        let header = object.header().clone();
        let ndim = header.dim[0] as usize;
        if ndim < 3 {
            return Err(VolumeLoaderError::Format(format!(
                "expected at least 3 dimensions, got {ndim}"
            )));
        }
        let (nx, ny, nz) = (
            header.dim[1] as usize,
            header.dim[2] as usize,
            header.dim[3] as usize,
        );
        let time_points = if ndim >= 4 { (header.dim[4] as usize).max(1) } else { 1 };

        let array = object
            .into_volume()
            .into_ndarray::<f32>()
            .map_err(|e| VolumeLoaderError::Format(e.to_string()))?;
        if array.ndim() < 3 {
            return Err(VolumeLoaderError::Format(format!(
                "decoded array has {} dimensions",
                array.ndim()
            )));
        }

        // Reversing the (x, y, z, t) axes makes logical iteration order
        // x-fastest, which is the flat layout; the first time point comes first.
        let voxel_count = nx * ny * nz;
        let buffer: Vec<f32> = array
            .reversed_axes()
            .iter()
            .take(voxel_count)
            .copied()
            .collect();

        Ok(DecodedVolume {
            dims: [time_points, nx, ny, nz],
            datatype_code: header.datatype,
            buffer,
            spacing: (header.pixdim[1], header.pixdim[2], header.pixdim[3]),
            affine: Some(Self::get_affine(&header)),
        })
    }

    fn get_affine(header: &NiftiHeader) -> [f64; 16] {
        if header.sform_code > 0 {
            let (s, t, u) = (&header.srow_x, &header.srow_y, &header.srow_z);
            [
                s[0] as f64, s[1] as f64, s[2] as f64, s[3] as f64,
                t[0] as f64, t[1] as f64, t[2] as f64, t[3] as f64,
                u[0] as f64, u[1] as f64, u[2] as f64, u[3] as f64,
                0.0, 0.0, 0.0, 1.0,
            ]
        } else {
            let (sx, sy, sz) = (
                header.pixdim[1] as f64,
                header.pixdim[2] as f64,
                header.pixdim[3] as f64,
            );
            [
                sx, 0.0, 0.0, 0.0,
                0.0, sy, 0.0, 0.0,
                0.0, 0.0, sz, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ]
        }
    }
}

/// Holds the active volume of one viewer.
///
/// Readers take `Arc` snapshots, so a replacement is never observed half
/// installed and a failed load leaves the previous volume in place.
#[derive(Debug, Default)]
pub struct VolumeStore {
    current: Option<Arc<Volume>>,
}

impl VolumeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, bytes: &[u8]) -> Result<Arc<Volume>, VolumeLoaderError> {
        match VolumeLoader::load_from_bytes(bytes) {
            Ok(volume) => Ok(self.install(volume)),
            Err(err) => {
                log::error!("volume load failed, keeping previous volume: {err}");
                Err(err)
            }
        }
    }

    pub fn install(&mut self, volume: Volume) -> Arc<Volume> {
        let volume = Arc::new(volume);
        log::info!(
            "installed volume {:?} with dims {:?}",
            volume.id(),
            volume.dims()
        );
        self.current = Some(Arc::clone(&volume));
        volume
    }

    pub fn current(&self) -> Option<Arc<Volume>> {
        self.current.clone()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Minimal single-file NIfTI-1 float32 image.
    pub(crate) fn nifti_bytes(dims: (usize, usize, usize), data: &[f32]) -> Vec<u8> {
        let (nx, ny, nz) = dims;
        let mut header = [0u8; 348];
        header[0..4].copy_from_slice(&348i32.to_le_bytes());
        let dim: [i16; 8] = [3, nx as i16, ny as i16, nz as i16, 1, 1, 1, 1];
        for (i, d) in dim.iter().enumerate() {
            header[40 + i * 2..42 + i * 2].copy_from_slice(&d.to_le_bytes());
        }
        header[70..72].copy_from_slice(&16i16.to_le_bytes());
        header[72..74].copy_from_slice(&32i16.to_le_bytes());
        for i in 0..8 {
            header[76 + i * 4..80 + i * 4].copy_from_slice(&1.0f32.to_le_bytes());
        }
        header[108..112].copy_from_slice(&352.0f32.to_le_bytes());
        header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
        header[344..348].copy_from_slice(b"n+1\0");

        let mut bytes = header.to_vec();
        bytes.extend_from_slice(&[0u8; 4]);
        for value in data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::nifti_bytes;
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32).collect()
    }

    #[test]
    fn loads_plain_nifti_in_flat_order() {
        let bytes = nifti_bytes((3, 2, 2), &ramp(12));
        let volume = VolumeLoader::load_from_bytes(&bytes).unwrap();
        assert_eq!(volume.dims(), [1, 3, 2, 2]);
        assert_eq!(volume.datatype_code(), 16);
        assert_eq!(volume.get(2, 1, 1), Some(11.0));
        assert_eq!(volume.get(1, 0, 1), Some(7.0));
    }

    #[test]
    fn loads_gzipped_nifti() {
        let bytes = nifti_bytes((2, 2, 2), &ramp(8));
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes).unwrap();
        let gz = encoder.finish().unwrap();

        let volume = VolumeLoader::load_from_bytes(&gz).unwrap();
        assert_eq!(volume.get(1, 1, 1), Some(7.0));
    }

    #[test]
    fn garbage_is_a_format_error() {
        let result = VolumeLoader::load_from_bytes(b"definitely not a volume");
        assert!(matches!(result, Err(VolumeLoaderError::Format(_))));
    }

    #[test]
    fn failed_load_keeps_previous_volume() {
        let mut store = VolumeStore::new();
        let first = store.load(&nifti_bytes((2, 2, 2), &ramp(8))).unwrap();
        assert!(store.load(&[0x1f, 0x8b, 0, 1, 2]).is_err());
        let current = store.current().unwrap();
        assert_eq!(current.id(), first.id());
    }

    #[test]
    fn successful_load_replaces_volume() {
        let mut store = VolumeStore::new();
        let first = store.load(&nifti_bytes((2, 2, 2), &ramp(8))).unwrap();
        let second = store.load(&nifti_bytes((2, 2, 2), &ramp(8))).unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(store.current().unwrap().id(), second.id());
    }
}
