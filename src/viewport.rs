//! View modes, their panes and per-mode transient state.

use crate::crosshair::{CrosshairController, Discipline, SliceIndices};
use crate::enums::Plane;
use crate::layout::{Pane, QuadrantLayout, Viewport};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    SinglePlane2D(Plane),
    CombinedMpr3D,
    FreeOblique3D,
    Full3D,
}

impl Default for ViewMode {
    fn default() -> Self {
        ViewMode::SinglePlane2D(Plane::Axial)
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::SinglePlane2D(plane) => write!(f, "{plane}"),
            ViewMode::CombinedMpr3D => write!(f, "mpr+3d"),
            ViewMode::FreeOblique3D => write!(f, "oblique"),
            ViewMode::Full3D => write!(f, "3d"),
        }
    }
}

impl ViewMode {
    pub fn discipline(&self) -> Discipline {
        match self {
            ViewMode::SinglePlane2D(_) => Discipline::Independent,
            _ => Discipline::Linked,
        }
    }

    pub fn allows_drawing(&self) -> bool {
        !matches!(self, ViewMode::Full3D)
    }

    /// Panes of this mode and where they sit inside `bounds`.
    pub fn panes(&self, bounds: Viewport) -> Vec<(Pane, Viewport)> {
        match self {
            ViewMode::SinglePlane2D(plane) => vec![(Pane::Slice(*plane), bounds)],
            ViewMode::CombinedMpr3D => {
                let layout = QuadrantLayout::new(bounds);
                QuadrantLayout::PANES
                    .into_iter()
                    .map(|pane| (pane, layout.viewport_of(pane)))
                    .collect()
            }
            ViewMode::FreeOblique3D | ViewMode::Full3D => vec![(Pane::Render3D, bounds)],
        }
    }
}

/// Drawing order inside a pane, bottom first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderLayer {
    BaseSlice,
    OverlayComposite,
    Annotation,
    Decoration,
}

pub const RENDER_ORDER: [RenderLayer; 4] = [
    RenderLayer::BaseSlice,
    RenderLayer::OverlayComposite,
    RenderLayer::Annotation,
    RenderLayer::Decoration,
];

pub fn render_layers(pane: Pane) -> Vec<RenderLayer> {
    match pane {
        Pane::Slice(_) => RENDER_ORDER.to_vec(),
        Pane::Render3D => RENDER_ORDER
            .into_iter()
            .filter(|layer| *layer != RenderLayer::Annotation)
            .collect(),
    }
}

pub const OBLIQUE_DEFAULT: f32 = 0.5;
pub const OBLIQUE_STEP: f32 = 0.05;
pub const OBLIQUE_RANGE: (f32, f32) = (0.01, 0.99);

/// Coronal cut through the 3D render, moved with the wheel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObliqueCut {
    position: f32,
}

impl Default for ObliqueCut {
    fn default() -> Self {
        Self {
            position: OBLIQUE_DEFAULT,
        }
    }
}

impl ObliqueCut {
    pub fn position(&self) -> f32 {
        self.position
    }

    /// Positive `delta_y` (wheel down) pushes the cut back.
    pub fn scroll(&mut self, delta_y: f32) -> [f32; 4] {
        if delta_y != 0.0 {
            let step = if delta_y > 0.0 { OBLIQUE_STEP } else { -OBLIQUE_STEP };
            self.position = (self.position + step).clamp(OBLIQUE_RANGE.0, OBLIQUE_RANGE.1);
        }
        self.clip_plane()
    }

    /// Plane equation `[nx, ny, nz, d]` handed to the renderer.
    pub fn clip_plane(&self) -> [f32; 4] {
        [0.0, 1.0, 0.0, self.position - 0.5]
    }
}

/// Orbit camera for the 3D pane, in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub azimuth: f32,
    pub elevation: f32,
}

impl Camera {
    pub const DEGREES_PER_PIXEL: f32 = 0.5;

    pub fn overview() -> Self {
        Self {
            azimuth: 45.0,
            elevation: -10.0,
        }
    }

    pub fn frontal() -> Self {
        Self {
            azimuth: 0.0,
            elevation: 0.0,
        }
    }

    /// Unbounded orbit; angles wrap at a full turn.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.azimuth = (self.azimuth + dx * Self::DEGREES_PER_PIXEL) % 360.0;
        self.elevation = (self.elevation + dy * Self::DEGREES_PER_PIXEL) % 360.0;
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::overview()
    }
}

/// Owns the active mode and whatever state only lives while a mode is active.
#[derive(Clone, Debug)]
pub struct ViewportManager {
    mode: ViewMode,
    saved_slices: Option<SliceIndices>,
    oblique: ObliqueCut,
    camera: Camera,
    drawing_enabled: bool,
}

impl Default for ViewportManager {
    fn default() -> Self {
        Self::new(ViewMode::default())
    }
}

impl ViewportManager {
    pub fn new(mode: ViewMode) -> Self {
        Self {
            mode,
            saved_slices: None,
            oblique: ObliqueCut::default(),
            camera: Self::entry_camera(mode),
            drawing_enabled: mode.allows_drawing(),
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn oblique(&self) -> &ObliqueCut {
        &self.oblique
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    pub fn drawing_enabled(&self) -> bool {
        self.drawing_enabled
    }

    /// Returns whether drawing is now enabled; modes without drawing refuse.
    pub fn set_drawing_enabled(&mut self, enabled: bool) -> bool {
        self.drawing_enabled = enabled && self.mode.allows_drawing();
        self.drawing_enabled
    }

    /// Switch modes. Independent slice positions survive the round trip
    /// through linked modes; oblique cut and camera start fresh.
    pub fn set_mode(&mut self, mode: ViewMode, crosshair: &mut CrosshairController) -> bool {
        if mode == self.mode {
            return false;
        }
        log::info!("view mode {} -> {}", self.mode, mode);

        if self.mode.discipline() == Discipline::Independent {
            self.saved_slices = Some(crosshair.independent_slices());
        }
        crosshair.set_discipline(mode.discipline());
        if mode.discipline() == Discipline::Independent {
            if let Some(saved) = self.saved_slices {
                crosshair.restore_independent_slices(saved);
            }
        }

        self.oblique = ObliqueCut::default();
        self.camera = Self::entry_camera(mode);
        if !mode.allows_drawing() {
            self.drawing_enabled = false;
        }
        self.mode = mode;
        true
    }

    /// Wheel over the oblique view; `None` in other modes.
    pub fn scroll_oblique(&mut self, delta_y: f32) -> Option<[f32; 4]> {
        match self.mode {
            ViewMode::FreeOblique3D => Some(self.oblique.scroll(delta_y)),
            _ => None,
        }
    }

    /// Active clip plane, if the mode has one.
    pub fn clip_plane(&self) -> Option<[f32; 4]> {
        match self.mode {
            ViewMode::FreeOblique3D => Some(self.oblique.clip_plane()),
            _ => None,
        }
    }

    pub fn rotate_camera(&mut self, dx: f32, dy: f32) -> bool {
        match self.mode {
            ViewMode::FreeOblique3D | ViewMode::Full3D | ViewMode::CombinedMpr3D => {
                self.camera.rotate(dx, dy);
                true
            }
            ViewMode::SinglePlane2D(_) => false,
        }
    }

    pub fn panes(&self, bounds: Viewport) -> Vec<(Pane, Viewport)> {
        self.mode.panes(bounds)
    }

    fn entry_camera(mode: ViewMode) -> Camera {
        match mode {
            ViewMode::FreeOblique3D => Camera::frontal(),
            _ => Camera::overview(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Extent;
    use approx::assert_relative_eq;

    #[test]
    fn oblique_cut_steps_and_clamps() {
        let mut cut = ObliqueCut::default();
        assert_eq!(cut.clip_plane(), [0.0, 1.0, 0.0, 0.0]);
        cut.scroll(1.0);
        assert_relative_eq!(cut.position(), 0.55);
        for _ in 0..20 {
            cut.scroll(1.0);
        }
        assert_relative_eq!(cut.position(), 0.99);
        for _ in 0..40 {
            cut.scroll(-3.0);
        }
        assert_relative_eq!(cut.position(), 0.01);
        assert_relative_eq!(cut.clip_plane()[3], -0.49);
    }

    #[test]
    fn independent_slices_survive_linked_modes() {
        let mut crosshair = CrosshairController::new(Extent::new(10, 10, 10));
        let mut manager = ViewportManager::new(ViewMode::SinglePlane2D(Plane::Axial));
        crosshair.set_slice(Plane::Axial, 7);
        crosshair.set_slice(Plane::Sagittal, 2);

        assert!(manager.set_mode(ViewMode::CombinedMpr3D, &mut crosshair));
        assert_eq!(crosshair.discipline(), Discipline::Linked);
        crosshair.set_from_plane_click(Plane::Axial, 0.0, 0.0);

        manager.set_mode(ViewMode::SinglePlane2D(Plane::Sagittal), &mut crosshair);
        assert_eq!(crosshair.discipline(), Discipline::Independent);
        assert_eq!(crosshair.slice_index(Plane::Axial), 7);
        assert_eq!(crosshair.slice_index(Plane::Sagittal), 2);
    }

    #[test]
    fn oblique_state_resets_on_entry() {
        let mut crosshair = CrosshairController::new(Extent::new(4, 4, 4));
        let mut manager = ViewportManager::default();
        manager.set_mode(ViewMode::FreeOblique3D, &mut crosshair);
        manager.scroll_oblique(1.0);
        manager.rotate_camera(20.0, 0.0);
        assert_eq!(manager.camera().azimuth, 10.0);

        manager.set_mode(ViewMode::Full3D, &mut crosshair);
        assert_eq!(manager.clip_plane(), None);
        manager.set_mode(ViewMode::FreeOblique3D, &mut crosshair);
        assert_eq!(manager.oblique().position(), OBLIQUE_DEFAULT);
        assert_eq!(manager.camera(), Camera::frontal());
    }

    #[test]
    fn full_3d_disables_drawing() {
        let mut crosshair = CrosshairController::new(Extent::new(4, 4, 4));
        let mut manager = ViewportManager::default();
        assert!(manager.drawing_enabled());
        manager.set_mode(ViewMode::Full3D, &mut crosshair);
        assert!(!manager.drawing_enabled());
        assert!(!manager.set_drawing_enabled(true));
        manager.set_mode(ViewMode::SinglePlane2D(Plane::Coronal), &mut crosshair);
        assert!(manager.set_drawing_enabled(true));
    }

    #[test]
    fn layers_draw_bottom_up() {
        assert_eq!(render_layers(Pane::Slice(Plane::Axial)), RENDER_ORDER.to_vec());
        assert_eq!(
            render_layers(Pane::Render3D),
            vec![
                RenderLayer::BaseSlice,
                RenderLayer::OverlayComposite,
                RenderLayer::Decoration
            ]
        );
    }

    #[test]
    fn mpr_mode_has_four_panes() {
        let panes = ViewMode::CombinedMpr3D.panes(Viewport::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(panes.len(), 4);
        assert_eq!(panes[3].0, Pane::Render3D);
        assert_eq!(ViewMode::Full3D.panes(Viewport::new(0.0, 0.0, 10.0, 10.0)).len(), 1);
    }
}
