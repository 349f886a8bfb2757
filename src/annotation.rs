//! Freehand drawing surface composited above the slice image.
//!
//! The surface is an RGBA raster at the viewport's device resolution.
//! Strokes are kept as point lists so a resize can replay them at the new
//! resolution instead of stretching pixels.

use crate::enums::{PresetColor, Tool};
use crate::export::{self, ExportError};
use crate::zoom::Transform;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage, RgbImage};
use serde::{Deserialize, Serialize};

pub const PEN_WIDTH_RANGE: (f32, f32) = (1.0, 10.0);
pub const HIGHLIGHTER_WIDTH_RANGE: (f32, f32) = (5.0, 25.0);
pub const HIGHLIGHTER_OPACITY_RANGE: (f32, f32) = (0.1, 1.0);
pub const ERASER_SIZE_RANGE: (f32, f32) = (5.0, 50.0);
/// Committed strokes kept as vectors; older ones are baked into a raster.
pub const REPLAY_LIMIT: usize = 32;

/// Pointer position in CSS pixels relative to the surface origin.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
}

impl StrokePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub tool: Tool,
    pub color: PresetColor,
    pub pen_width: f32,
    pub highlighter_width: f32,
    pub highlighter_opacity: f32,
    pub eraser_size: f32,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            tool: Tool::Pen,
            color: PresetColor::Red,
            pen_width: 3.0,
            highlighter_width: 12.0,
            highlighter_opacity: 0.1,
            eraser_size: 15.0,
        }
    }
}

impl ToolSettings {
    pub fn set_pen_width(&mut self, width: f32) {
        self.pen_width = width.clamp(PEN_WIDTH_RANGE.0, PEN_WIDTH_RANGE.1);
    }

    pub fn set_highlighter_width(&mut self, width: f32) {
        self.highlighter_width = width.clamp(HIGHLIGHTER_WIDTH_RANGE.0, HIGHLIGHTER_WIDTH_RANGE.1);
    }

    pub fn set_highlighter_opacity(&mut self, opacity: f32) {
        self.highlighter_opacity =
            opacity.clamp(HIGHLIGHTER_OPACITY_RANGE.0, HIGHLIGHTER_OPACITY_RANGE.1);
    }

    pub fn set_eraser_size(&mut self, size: f32) {
        self.eraser_size = size.clamp(ERASER_SIZE_RANGE.0, ERASER_SIZE_RANGE.1);
    }

    /// Stroke template for the active tool, without points.
    pub fn stroke(&self) -> Stroke {
        let (width, opacity) = match self.tool {
            Tool::Pen => (self.pen_width, 1.0),
            Tool::Highlighter => (self.highlighter_width, self.highlighter_opacity),
            Tool::Eraser => (self.eraser_size, 1.0),
        };
        Stroke {
            tool: self.tool,
            color: self.color.rgb(),
            width,
            opacity,
            points: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub tool: Tool,
    pub color: [u8; 3],
    /// CSS pixels.
    pub width: f32,
    pub opacity: f32,
    pub points: Vec<StrokePoint>,
}

/// Gate for destructive clears, usually a confirmation dialog.
pub trait ConfirmClear {
    fn confirm_clear(&self) -> bool;
}

impl<F: Fn() -> bool> ConfirmClear for F {
    fn confirm_clear(&self) -> bool {
        self()
    }
}

struct ActiveStroke {
    stroke: Stroke,
    snapshot: RgbaImage,
    touched: Vec<bool>,
}

pub struct AnnotationLayer {
    css_width: f32,
    css_height: f32,
    device_pixel_ratio: f32,
    surface: RgbaImage,
    /// Surface as it was when the stroke history was last baked.
    baked: Option<RgbaImage>,
    strokes: Vec<Stroke>,
    active: Option<ActiveStroke>,
}

impl AnnotationLayer {
    pub fn new(css_width: f32, css_height: f32, device_pixel_ratio: f32) -> Self {
        let dpr = sanitize_ratio(device_pixel_ratio);
        let (width, height) = backing_size(css_width, css_height, dpr);
        Self {
            css_width,
            css_height,
            device_pixel_ratio: dpr,
            surface: RgbaImage::new(width, height),
            baked: None,
            strokes: Vec::new(),
            active: None,
        }
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    /// Strokes since the history was last baked, oldest first.
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }

    pub fn css_size(&self) -> (f32, f32) {
        (self.css_width, self.css_height)
    }

    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.active.is_none() && self.baked.is_none()
    }

    /// Follow a viewport resize or a device-pixel-ratio change. The baked
    /// raster is rescaled and recent strokes are replayed at the new
    /// backing resolution.
    pub fn resize(&mut self, css_width: f32, css_height: f32, device_pixel_ratio: f32) {
        let dpr = sanitize_ratio(device_pixel_ratio);
        let size = backing_size(css_width, css_height, dpr);
        let unchanged = size == self.surface.dimensions() && dpr == self.device_pixel_ratio;
        self.css_width = css_width;
        self.css_height = css_height;
        self.device_pixel_ratio = dpr;
        if unchanged {
            return;
        }
        log::debug!(
            "annotation surface resynced to {}x{} (dpr {dpr})",
            size.0,
            size.1
        );
        self.surface = match &self.baked {
            Some(baked) => imageops::resize(baked, size.0, size.1, FilterType::Triangle),
            None => RgbaImage::new(size.0, size.1),
        };
        let active = self.active.take().map(|active| active.stroke);
        for stroke in std::mem::take(&mut self.strokes) {
            self.replay(stroke);
        }
        if let Some(stroke) = active {
            self.start(stroke);
            self.redraw_active_path();
        }
    }

    pub fn begin_stroke(&mut self, settings: &ToolSettings, point: StrokePoint) {
        if self.active.is_some() {
            self.end_stroke();
        }
        let mut stroke = settings.stroke();
        stroke.points.push(point);
        self.start(stroke);
        self.draw_segment(point, point);
    }

    /// Append `point` and rasterize only the segment it adds.
    pub fn extend_stroke(&mut self, point: StrokePoint) -> bool {
        let Some(last) = self
            .active
            .as_mut()
            .and_then(|active| {
                let last = active.stroke.points.last().copied();
                active.stroke.points.push(point);
                last
            })
        else {
            return false;
        };
        self.draw_segment(last, point);
        true
    }

    pub fn end_stroke(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                self.strokes.push(active.stroke);
                if self.strokes.len() >= REPLAY_LIMIT {
                    log::debug!("baking {} strokes into the annotation raster", self.strokes.len());
                    self.baked = Some(self.surface.clone());
                    self.strokes.clear();
                }
                true
            }
            None => false,
        }
    }

    /// Wipe this surface once `confirm` agrees. Returns whether it was cleared.
    pub fn clear(&mut self, confirm: &impl ConfirmClear) -> bool {
        if !confirm.confirm_clear() {
            log::debug!("annotation clear declined");
            return false;
        }
        let (width, height) = self.surface.dimensions();
        self.surface = RgbaImage::new(width, height);
        self.baked = None;
        self.strokes.clear();
        self.active = None;
        log::info!("annotation surface cleared");
        true
    }

    /// Flatten `composite` (slice plus overlay), placed by the pane's zoom
    /// `transform`, and this surface into a PNG. Pan is in CSS pixels.
    pub fn export(&self, composite: &RgbImage, transform: Transform) -> Result<Vec<u8>, ExportError> {
        let transform = Transform {
            pan_x: transform.pan_x * self.device_pixel_ratio,
            pan_y: transform.pan_y * self.device_pixel_ratio,
            ..transform
        };
        export::encode_png(&export::flatten(composite, &self.surface, transform))
    }

    fn start(&mut self, stroke: Stroke) {
        let (width, height) = self.surface.dimensions();
        self.active = Some(ActiveStroke {
            stroke,
            snapshot: self.surface.clone(),
            touched: vec![false; width as usize * height as usize],
        });
    }

    fn replay(&mut self, stroke: Stroke) {
        self.start(stroke);
        self.redraw_active_path();
        self.end_stroke();
    }

    fn redraw_active_path(&mut self) {
        let points = match &self.active {
            Some(active) => active.stroke.points.clone(),
            None => return,
        };
        if let Some(first) = points.first() {
            self.draw_segment(*first, *first);
        }
        for pair in points.windows(2) {
            self.draw_segment(pair[0], pair[1]);
        }
    }

    /// Capsule between `from` and `to` with the stroke's width. Each pixel is
    /// composited at most once per stroke, against the surface as it was
    /// when the stroke began.
    fn draw_segment(&mut self, from: StrokePoint, to: StrokePoint) {
        let dpr = self.device_pixel_ratio;
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let (width, height) = self.surface.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        let radius = (active.stroke.width * dpr / 2.0).max(0.5);
        let (ax, ay) = (from.x * dpr, from.y * dpr);
        let (bx, by) = (to.x * dpr, to.y * dpr);

        let min_x = (ax.min(bx) - radius).floor().max(0.0) as u32;
        let min_y = (ay.min(by) - radius).floor().max(0.0) as u32;
        let max_x = ((ax.max(bx) + radius).ceil() as i64).clamp(0, width as i64 - 1) as u32;
        let max_y = ((ay.max(by) + radius).ceil() as i64).clamp(0, height as i64 - 1) as u32;
        if min_x > max_x || min_y > max_y {
            return;
        }

        let stroke = &active.stroke;
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let slot = (y * width + x) as usize;
                if active.touched[slot] {
                    continue;
                }
                let distance = distance_to_segment(x as f32 + 0.5, y as f32 + 0.5, ax, ay, bx, by);
                if distance > radius {
                    continue;
                }
                active.touched[slot] = true;
                let below = *active.snapshot.get_pixel(x, y);
                let out = match stroke.tool {
                    Tool::Eraser => destination_out(below, 1.0),
                    Tool::Pen | Tool::Highlighter => source_over(below, stroke.color, stroke.opacity),
                };
                self.surface.put_pixel(x, y, out);
            }
        }
    }
}

fn sanitize_ratio(ratio: f32) -> f32 {
    if ratio.is_finite() && ratio > 0.0 { ratio } else { 1.0 }
}

fn backing_size(css_width: f32, css_height: f32, dpr: f32) -> (u32, u32) {
    (
        (css_width.max(0.0) * dpr).round() as u32,
        (css_height.max(0.0) * dpr).round() as u32,
    )
}

fn distance_to_segment(px: f32, py: f32, ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let (dx, dy) = (bx - ax, by - ay);
    let length_sq = dx * dx + dy * dy;
    let t = if length_sq > 0.0 {
        (((px - ax) * dx + (py - ay) * dy) / length_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}

/// Straight-alpha source-over.
fn source_over(below: Rgba<u8>, color: [u8; 3], opacity: f32) -> Rgba<u8> {
    let src_a = opacity.clamp(0.0, 1.0);
    let dst_a = below[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mut out = [0u8; 4];
    for channel in 0..3 {
        let src = color[channel] as f32;
        let dst = below[channel] as f32;
        out[channel] = ((src * src_a + dst * dst_a * (1.0 - src_a)) / out_a)
            .round()
            .clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round() as u8;
    Rgba(out)
}

fn destination_out(below: Rgba<u8>, coverage: f32) -> Rgba<u8> {
    let alpha = (below[3] as f32 * (1.0 - coverage.clamp(0.0, 1.0))).round() as u8;
    if alpha == 0 {
        Rgba([0, 0, 0, 0])
    } else {
        Rgba([below[0], below[1], below[2], alpha])
    }
}
