//! Zoom percent to render scale, and the pan offset that goes with it.

/// Accepted range of the zoom control.
pub const ZOOM_RANGE: (f32, f32) = (10.0, 100.0);
pub const DEFAULT_ZOOM: f32 = 50.0;
/// Control units added or removed per wheel notch.
pub const DEFAULT_ZOOM_STEP: f32 = 5.0;

const MIN_SCALE: f32 = 0.2;
const SCALE_SPAN: f32 = 1.3;

/// Render scale for a zoom control value, clamped into [`ZOOM_RANGE`].
pub fn zoom_to_scale(zoom: f32) -> f32 {
    let (lo, hi) = ZOOM_RANGE;
    let zoom = zoom.clamp(lo, hi);
    MIN_SCALE + ((zoom - lo) / (hi - lo)) * SCALE_SPAN
}

/// Uniform scale plus pan, applied about the viewport center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale: f32,
    pub pan_x: f32,
    pub pan_y: f32,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        pan_x: 0.0,
        pan_y: 0.0,
    };

    /// Maps an image-space offset from the viewport center to screen space.
    pub fn apply(&self, center: (f32, f32), offset: (f32, f32)) -> (f32, f32) {
        (
            center.0 + self.pan_x + offset.0 * self.scale,
            center.1 + self.pan_y + offset.1 * self.scale,
        )
    }

    /// Inverse of [`Transform::apply`].
    pub fn unapply(&self, center: (f32, f32), screen: (f32, f32)) -> (f32, f32) {
        (
            (screen.0 - center.0 - self.pan_x) / self.scale,
            (screen.1 - center.1 - self.pan_y) / self.scale,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomController {
    zoom: f32,
    step: f32,
    pan_x: f32,
    pan_y: f32,
}

impl Default for ZoomController {
    fn default() -> Self {
        Self::new(DEFAULT_ZOOM_STEP)
    }
}

impl ZoomController {
    pub fn new(step: f32) -> Self {
        Self {
            zoom: DEFAULT_ZOOM,
            step,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn scale(&self) -> f32 {
        zoom_to_scale(self.zoom)
    }

    pub fn set_zoom(&mut self, zoom: f32) -> f32 {
        let (lo, hi) = ZOOM_RANGE;
        self.zoom = zoom.clamp(lo, hi);
        self.scale()
    }

    /// Wheel notch; positive `notches` zoom in.
    pub fn step(&mut self, notches: i32) -> f32 {
        self.set_zoom(self.zoom + notches as f32 * self.step)
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    pub fn pan(&self) -> (f32, f32) {
        (self.pan_x, self.pan_y)
    }

    /// Restores the default zoom and drops any pan.
    pub fn reset(&mut self) {
        self.zoom = DEFAULT_ZOOM;
        self.pan_x = 0.0;
        self.pan_y = 0.0;
    }

    pub fn transform(&self) -> Transform {
        Transform {
            scale: self.scale(),
            pan_x: self.pan_x,
            pan_y: self.pan_y,
        }
    }
}
