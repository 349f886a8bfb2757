use crate::enums::Plane;

/// Screen rectangle in CSS pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && py >= self.y && px < self.x + self.width && py < self.y + self.height
    }

    /// Pointer position as a fraction of the viewport, clamped to [0, 1].
    pub fn local(&self, px: f32, py: f32) -> (f32, f32) {
        let fx = if self.width > 0.0 { (px - self.x) / self.width } else { 0.5 };
        let fy = if self.height > 0.0 { (py - self.y) / self.height } else { 0.5 };
        (fx.clamp(0.0, 1.0), fy.clamp(0.0, 1.0))
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pane {
    Slice(Plane),
    Render3D,
}

/// Two-by-two split used by the combined MPR + 3D mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadrantLayout {
    pub bounds: Viewport,
}

impl QuadrantLayout {
    pub const PANES: [Pane; 4] = [
        Pane::Slice(Plane::Axial),
        Pane::Slice(Plane::Coronal),
        Pane::Slice(Plane::Sagittal),
        Pane::Render3D,
    ];

    pub fn new(bounds: Viewport) -> Self {
        Self { bounds }
    }

    pub fn viewport_of(&self, pane: Pane) -> Viewport {
        let half_w = self.bounds.width / 2.0;
        let half_h = self.bounds.height / 2.0;
        let (col, row) = match pane {
            Pane::Slice(Plane::Axial) => (0.0, 0.0),
            Pane::Slice(Plane::Coronal) => (1.0, 0.0),
            Pane::Slice(Plane::Sagittal) => (0.0, 1.0),
            Pane::Render3D => (1.0, 1.0),
        };
        Viewport::new(
            self.bounds.x + col * half_w,
            self.bounds.y + row * half_h,
            half_w,
            half_h,
        )
    }

    pub fn pane_at(&self, px: f32, py: f32) -> Option<Pane> {
        Self::PANES
            .into_iter()
            .find(|pane| self.viewport_of(*pane).contains(px, py))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadrants_cover_the_bounds() {
        let layout = QuadrantLayout::new(Viewport::new(0.0, 0.0, 200.0, 100.0));
        assert_eq!(layout.pane_at(10.0, 10.0), Some(Pane::Slice(Plane::Axial)));
        assert_eq!(layout.pane_at(150.0, 10.0), Some(Pane::Slice(Plane::Coronal)));
        assert_eq!(layout.pane_at(10.0, 60.0), Some(Pane::Slice(Plane::Sagittal)));
        assert_eq!(layout.pane_at(150.0, 60.0), Some(Pane::Render3D));
        assert_eq!(layout.pane_at(250.0, 60.0), None);
    }

    #[test]
    fn local_coordinates_clamp_outside_the_viewport() {
        let viewport = Viewport::new(100.0, 0.0, 100.0, 50.0);
        assert_eq!(viewport.local(150.0, 25.0), (0.5, 0.5));
        assert_eq!(viewport.local(400.0, -10.0), (1.0, 0.0));
    }
}
