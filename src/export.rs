//! Flattening a rendered view into a single image for download or upload.

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage, RgbImage};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

use crate::zoom::Transform;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Draw `base` onto a black canvas of `size` the way a pane shows it:
/// fitted inside the canvas with its aspect kept, then scaled and panned by
/// `transform` about the canvas center. `transform` is in canvas pixels.
pub fn place(base: &RgbImage, size: (u32, u32), transform: Transform) -> RgbImage {
    let (width, height) = size;
    let mut canvas = RgbImage::new(width, height);
    let (base_width, base_height) = base.dimensions();
    if base_width == 0 || base_height == 0 || width == 0 || height == 0 {
        return canvas;
    }

    let fit = (width as f32 / base_width as f32).min(height as f32 / base_height as f32);
    let (fit_width, fit_height) = (base_width as f32 * fit, base_height as f32 * fit);
    let scaled_width = (fit_width * transform.scale).round() as u32;
    let scaled_height = (fit_height * transform.scale).round() as u32;
    if scaled_width == 0 || scaled_height == 0 {
        return canvas;
    }
    let scaled = if (scaled_width, scaled_height) == base.dimensions() {
        base.clone()
    } else {
        imageops::resize(base, scaled_width, scaled_height, FilterType::Triangle)
    };

    let center = (width as f32 / 2.0, height as f32 / 2.0);
    let (left, top) = transform.apply(center, (-fit_width / 2.0, -fit_height / 2.0));
    imageops::replace(&mut canvas, &scaled, left.round() as i64, top.round() as i64);
    canvas
}

/// Place `base` on the annotation surface and draw the surface on top.
/// An empty surface leaves `base` at its own size.
pub fn flatten(base: &RgbImage, annotations: &RgbaImage, transform: Transform) -> RgbaImage {
    let (width, height) = annotations.dimensions();
    if width == 0 || height == 0 {
        return DynamicImage::ImageRgb8(base.clone()).to_rgba8();
    }
    let placed = place(base, (width, height), transform);

    RgbaImage::from_fn(width, height, |x, y| {
        let under = placed.get_pixel(x, y);
        let over = annotations.get_pixel(x, y);
        let alpha = over[3] as f32 / 255.0;
        let mix = |channel: usize| {
            (over[channel] as f32 * alpha + under[channel] as f32 * (1.0 - alpha)).round() as u8
        };
        Rgba([mix(0), mix(1), mix(2), 255])
    })
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image.clone()).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

pub fn save_png(image: &RgbaImage, path: impl AsRef<Path>) -> Result<(), ExportError> {
    let bytes = encode_png(image)?;
    std::fs::write(path.as_ref(), bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationLayer, StrokePoint, ToolSettings};
    use image::Rgb;

    #[test]
    fn annotations_are_drawn_over_the_scaled_slice() {
        let base = RgbImage::from_pixel(10, 10, Rgb([40, 40, 40]));
        let mut layer = AnnotationLayer::new(20.0, 20.0, 1.0);
        layer.begin_stroke(&ToolSettings::default(), StrokePoint::new(2.0, 10.0));
        layer.extend_stroke(StrokePoint::new(18.0, 10.0));
        layer.end_stroke();

        let flat = flatten(&base, layer.surface(), Transform::IDENTITY);
        assert_eq!(flat.dimensions(), (20, 20));
        assert_eq!(flat.get_pixel(10, 10).0, [255, 0, 0, 255]);
        assert_eq!(flat.get_pixel(10, 2).0, [40, 40, 40, 255]);
    }

    #[test]
    fn export_produces_a_png() {
        let base = RgbImage::from_pixel(8, 8, Rgb([0, 128, 0]));
        let layer = AnnotationLayer::new(8.0, 8.0, 1.0);
        let png = layer.export(&base, Transform::IDENTITY).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(3, 3).0, [0, 128, 0, 255]);
    }

    #[test]
    fn zoom_and_pan_place_the_slice_about_the_center() {
        let base = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
        let transform = Transform {
            scale: 0.5,
            pan_x: 10.0,
            pan_y: 0.0,
        };
        let placed = place(&base, (100, 100), transform);
        // fitted to 100x100, halved, centered on (60, 50): x in 35..85, y in 25..75
        assert_eq!(placed.get_pixel(36, 50).0, [255, 255, 255]);
        assert_eq!(placed.get_pixel(84, 74).0, [255, 255, 255]);
        assert_eq!(placed.get_pixel(30, 50).0, [0, 0, 0]);
        assert_eq!(placed.get_pixel(90, 50).0, [0, 0, 0]);
        assert_eq!(placed.get_pixel(60, 20).0, [0, 0, 0]);
    }

    #[test]
    fn non_square_slices_keep_their_aspect() {
        let base = RgbImage::from_pixel(20, 10, Rgb([200, 0, 0]));
        let placed = place(&base, (40, 40), Transform::IDENTITY);
        // 40x20 band in the middle
        assert_eq!(placed.get_pixel(20, 10).0, [200, 0, 0]);
        assert_eq!(placed.get_pixel(20, 29).0, [200, 0, 0]);
        assert_eq!(placed.get_pixel(20, 5).0, [0, 0, 0]);
        assert_eq!(placed.get_pixel(20, 35).0, [0, 0, 0]);
    }

    #[test]
    fn png_can_be_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("view.png");
        save_png(&RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255])), &path).unwrap();
        assert!(path.exists());
    }
}
