//! Common test utilities for tumor-mpr integration tests

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;

/// Single-file NIfTI-1 float32 image, x-fastest voxel order.
pub fn nifti_bytes(dims: (usize, usize, usize), data: &[f32]) -> Vec<u8> {
    let (nx, ny, nz) = dims;
    assert_eq!(data.len(), nx * ny * nz);

    let mut header = [0u8; 348];
    header[0..4].copy_from_slice(&348i32.to_le_bytes());
    let dim: [i16; 8] = [3, nx as i16, ny as i16, nz as i16, 1, 1, 1, 1];
    for (i, d) in dim.iter().enumerate() {
        header[40 + i * 2..42 + i * 2].copy_from_slice(&d.to_le_bytes());
    }
    // datatype FLOAT32, 32 bits per voxel
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

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// All-zero mask of `dims` with the listed `[x, y, z]` voxels set to 1.
pub fn mask(dims: (usize, usize, usize), marked: &[[usize; 3]]) -> Vec<f32> {
    let (nx, ny, nz) = dims;
    let mut data = vec![0.0; nx * ny * nz];
    for [x, y, z] in marked {
        data[z * nx * ny + y * nx + x] = 1.0;
    }
    data
}

/// Intensity ramp so every slice has a non-degenerate window.
pub fn ramp(dims: (usize, usize, usize)) -> Vec<f32> {
    let (nx, ny, nz) = dims;
    (0..nx * ny * nz).map(|i| (i + 1) as f32).collect()
}
