//! Gray-to-color lookup for the base slice, with gamma correction.

use image::{GrayImage, Rgb, RgbImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    #[default]
    Gray,
    Hot,
    Cool,
    Jet,
}

impl Colormap {
    fn color(&self, t: f32) -> [f32; 3] {
        match self {
            Colormap::Gray => [t, t, t],
            Colormap::Hot => {
                if t < 1.0 / 3.0 {
                    [t * 3.0, 0.0, 0.0]
                } else if t < 2.0 / 3.0 {
                    [1.0, (t - 1.0 / 3.0) * 3.0, 0.0]
                } else {
                    [1.0, 1.0, (t - 2.0 / 3.0) * 3.0]
                }
            }
            Colormap::Cool => [1.0 - t, t, 1.0],
            Colormap::Jet => [
                (1.5 - (4.0 * t - 3.0).abs()).clamp(0.0, 1.0),
                (1.5 - (4.0 * t - 2.0).abs()).clamp(0.0, 1.0),
                (1.5 - (4.0 * t - 1.0).abs()).clamp(0.0, 1.0),
            ],
        }
    }
}

/// 256-entry table combining a colormap and a gamma curve.
#[derive(Clone, Debug)]
pub struct ColorLut {
    table: Vec<[u8; 3]>,
    identity: bool,
}

impl ColorLut {
    pub fn new(colormap: Colormap, gamma: f32) -> Self {
        let gamma = if gamma > 0.0 { gamma } else { 1.0 };
        let table = (0..256)
            .map(|level| {
                let t = (level as f32 / 255.0).powf(1.0 / gamma);
                colormap
                    .color(t)
                    .map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8)
            })
            .collect();
        Self {
            table,
            identity: colormap == Colormap::Gray && (gamma - 1.0).abs() < f32::EPSILON,
        }
    }

    pub fn lookup(&self, level: u8) -> [u8; 3] {
        self.table[level as usize]
    }

    /// Gray replicated across channels when the table is the identity.
    pub fn colorize(&self, gray: &GrayImage) -> RgbImage {
        let (width, height) = gray.dimensions();
        let mut out = RgbImage::new(width, height);
        let rgb: &mut [u8] = &mut out;
        rgb.par_chunks_exact_mut(3)
            .zip(gray.as_raw().par_iter())
            .for_each(|(pixel, &level)| {
                let color = if self.identity {
                    [level; 3]
                } else {
                    self.lookup(level)
                };
                pixel.copy_from_slice(&color);
            });
        out
    }
}

impl Default for ColorLut {
    fn default() -> Self {
        Self::new(Colormap::Gray, 1.0)
    }
}

/// Plain gray→RGB replication.
pub fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let level = gray.get_pixel(x, y)[0];
        Rgb([level, level, level])
    })
}
