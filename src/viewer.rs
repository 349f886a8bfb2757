//! One viewer instance: input dispatch, mode handling and frame assembly
//! on top of a [`RenderBackend`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use image::{RgbImage, RgbaImage};
use thiserror::Error;

use crate::annotation::{AnnotationLayer, ConfirmClear, StrokePoint, ToolSettings};
use crate::backend::{BackendError, OverlayLayer, RenderBackend, RenderTarget};
use crate::config::ViewerConfig;
use crate::crosshair::{CrosshairController, Discipline};
use crate::enums::Plane;
use crate::export::ExportError;
use crate::geometry::{Extent, PlaneGeometry};
use crate::layout::{Pane, Viewport};
use crate::overlay::{DimensionMatch, OverlayVolume};
use crate::scheduler::{FrameThrottle, LoadSupervisor, LoadTicket, RenderTicket, RenderWorker};
use crate::tumor::{BestSlices, TumorSliceSelector};
use crate::viewport::{RenderLayer, ViewMode, ViewportManager, render_layers};
use crate::volume::{Volume, VolumeId};
use crate::volume_loader::{VolumeLoaderError, VolumeStore};
use crate::zoom::ZoomController;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error(transparent)]
    Load(#[from] VolumeLoaderError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Externally selected overlays, shared read-only by every viewer.
#[derive(Clone, Debug, Default)]
pub struct OverlayContext {
    pub overlay: Option<Arc<OverlayVolume>>,
    pub tumor: Option<Arc<OverlayVolume>>,
}

/// Snapshot of what one plane's view shows.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewState {
    pub plane: Plane,
    pub slice_index: usize,
    pub zoom: f32,
    pub pan: (f32, f32),
    pub tools: ToolSettings,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp { x: f32, y: f32 },
    /// `modifier` is ctrl/meta/shift held.
    Wheel { x: f32, y: f32, delta_y: f32, modifier: bool },
    SelectMode(ViewMode),
    ArrowLeft,
    ArrowRight,
    Resize { width: f32, height: f32, device_pixel_ratio: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Gesture {
    Idle,
    Crosshair,
    Drawing { plane: Plane, viewport: Viewport },
    Rotating { last: (f32, f32) },
}

/// Crosshair mark and label drawn over a pane.
#[derive(Clone, Debug, PartialEq)]
pub struct Decoration {
    pub label: &'static str,
    /// Normalized position inside the pane, top-left origin.
    pub crosshair: Option<(f32, f32)>,
}

#[derive(Clone, Debug)]
pub struct PaneFrame {
    pub pane: Pane,
    pub viewport: Viewport,
    pub layers: Vec<RenderLayer>,
    pub image: RgbImage,
    pub annotations: Option<RgbaImage>,
    pub decoration: Decoration,
    /// Applied after fitting `image` into the viewport, about its center.
    pub zoom: f32,
    pub pan: (f32, f32),
}

/// Everything in a [`PaneFrame`] except the drawn image.
struct PaneChrome {
    pane: Pane,
    viewport: Viewport,
    annotations: Option<RgbaImage>,
    decoration: Decoration,
    zoom: ZoomController,
}

impl PaneChrome {
    fn with_image(self, image: RgbImage) -> PaneFrame {
        PaneFrame {
            pane: self.pane,
            viewport: self.viewport,
            layers: render_layers(self.pane),
            image,
            annotations: self.annotations,
            decoration: self.decoration,
            zoom: self.zoom.scale(),
            pan: self.zoom.pan(),
        }
    }
}

type PaneImages = Option<Vec<Option<RgbImage>>>;

/// A frame being drawn on the blocking pool, see [`Viewer::submit_render`].
pub struct RenderJob {
    ticket: RenderTicket<PaneImages>,
    chrome: Vec<PaneChrome>,
}

impl RenderJob {
    pub fn generation(&self) -> u64 {
        self.ticket.generation()
    }

    /// The finished panes, or `None` when a newer frame superseded this one.
    pub async fn wait(self) -> Option<Vec<PaneFrame>> {
        let images = self.ticket.wait().await?;
        Some(assemble(self.chrome, images))
    }
}

pub struct Viewer<B: RenderBackend> {
    config: ViewerConfig,
    backend: B,
    store: VolumeStore,
    loads: LoadSupervisor,
    overlays: OverlayContext,
    crosshair: CrosshairController,
    viewport: ViewportManager,
    selector: TumorSliceSelector,
    zoom: HashMap<Plane, ZoomController>,
    volume_zoom: ZoomController,
    annotations: HashMap<Plane, AnnotationLayer>,
    tools: ToolSettings,
    bounds: Viewport,
    device_pixel_ratio: f32,
    active_plane: Plane,
    gesture: Gesture,
    moves: FrameThrottle<(f32, f32)>,
    worker: RenderWorker,
    warned: HashSet<VolumeId>,
}

impl<B: RenderBackend> Viewer<B> {
    pub fn new(config: ViewerConfig, mut backend: B, bounds: Viewport) -> Self {
        backend.set_color_lut(config.color_lut());
        let zoom = Plane::ALL
            .into_iter()
            .map(|plane| (plane, initial_zoom(&config)))
            .collect();
        let volume_zoom = initial_zoom(&config);
        let mut viewer = Self {
            tools: config.tools,
            moves: FrameThrottle::new(config.frame_budget()),
            config,
            backend,
            store: VolumeStore::new(),
            loads: LoadSupervisor::new(),
            overlays: OverlayContext::default(),
            crosshair: CrosshairController::new(Extent::default()),
            viewport: ViewportManager::default(),
            selector: TumorSliceSelector::new(),
            zoom,
            volume_zoom,
            annotations: HashMap::new(),
            bounds,
            device_pixel_ratio: 1.0,
            active_plane: Plane::Axial,
            gesture: Gesture::Idle,
            worker: RenderWorker::new(),
            warned: HashSet::new(),
        };
        viewer.resize_annotations();
        viewer
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn crosshair(&self) -> &CrosshairController {
        &self.crosshair
    }

    pub fn viewport(&self) -> &ViewportManager {
        &self.viewport
    }

    pub fn mode(&self) -> ViewMode {
        self.viewport.mode()
    }

    pub fn volume(&self) -> Option<Arc<Volume>> {
        self.store.current()
    }

    pub fn active_plane(&self) -> Plane {
        self.active_plane
    }

    pub fn tools(&self) -> &ToolSettings {
        &self.tools
    }

    pub fn tools_mut(&mut self) -> &mut ToolSettings {
        &mut self.tools
    }

    pub fn annotations(&self, plane: Plane) -> Option<&AnnotationLayer> {
        self.annotations.get(&plane)
    }

    pub fn zoom(&self, plane: Plane) -> Option<&ZoomController> {
        self.zoom.get(&plane)
    }

    /// Zoom of the 3D pane.
    pub fn volume_zoom(&self) -> &ZoomController {
        &self.volume_zoom
    }

    pub fn view_state(&self, plane: Plane) -> ViewState {
        let zoom = self.zoom.get(&plane).copied().unwrap_or_default();
        ViewState {
            plane,
            slice_index: self.crosshair.slice_index(plane),
            zoom: zoom.zoom(),
            pan: zoom.pan(),
            tools: self.tools,
        }
    }

    /// Decode and install a volume synchronously. On failure the current
    /// volume stays active.
    pub fn load_volume(&mut self, bytes: &[u8]) -> Result<Arc<Volume>, ViewerError> {
        let volume = self.store.load(bytes)?;
        self.activate(Arc::clone(&volume));
        Ok(volume)
    }

    /// Decode on the blocking pool; any load still in flight is abandoned.
    /// Hand the result to [`Viewer::install_volume`].
    pub fn start_load(&mut self, bytes: Vec<u8>) -> LoadTicket<Volume> {
        self.loads.load_bytes(bytes)
    }

    pub fn install_volume(&mut self, volume: Volume) -> Arc<Volume> {
        let volume = self.store.install(volume);
        self.activate(Arc::clone(&volume));
        volume
    }

    fn activate(&mut self, volume: Arc<Volume>) {
        self.crosshair.reset(volume.extent());
        self.backend.load(volume);
        self.apply_overlays();
        self.seed_from_tumor();
        self.sync_backend();
    }

    /// Replace the shared overlays. Overlays that do not fit the current
    /// volume are left out and reported once. Only a different tumor mask
    /// moves the slices.
    pub fn set_overlays(&mut self, overlays: OverlayContext) {
        let tumor_changed =
            overlays.tumor.as_ref().map(|tumor| tumor.id()) != self.overlays.tumor.as_ref().map(|tumor| tumor.id());
        self.overlays = overlays;
        self.apply_overlays();
        if tumor_changed {
            self.seed_from_tumor();
        }
        self.sync_backend();
    }

    fn apply_overlays(&mut self) {
        let Some(extent) = self.store.current().map(|volume| volume.extent()) else {
            return;
        };
        let candidates = [
            (self.overlays.overlay.clone(), self.config.overlay.style()),
            (self.overlays.tumor.clone(), self.config.tumor_overlay.style()),
        ];
        let mut layers = Vec::new();
        for (overlay, style) in candidates {
            let Some(overlay) = overlay else { continue };
            if self.overlay_fits(&overlay, &extent) {
                layers.push(OverlayLayer { overlay, style });
            }
        }
        self.backend.composite(layers);
    }

    fn overlay_fits(&mut self, overlay: &OverlayVolume, extent: &Extent) -> bool {
        if overlay.dimension_match(extent) != DimensionMatch::Mismatch {
            return true;
        }
        if self.warned.insert(overlay.id()) {
            let own = overlay.extent();
            log::warn!(
                "overlay {}x{}x{} does not match volume {}x{}x{}, not shown",
                own.x,
                own.y,
                own.z,
                extent.x,
                extent.y,
                extent.z
            );
        }
        false
    }

    /// Move every plane to the slice with the most tumor.
    pub fn seed_from_tumor(&mut self) -> Option<BestSlices> {
        let extent = self.store.current()?.extent();
        let tumor = self.overlays.tumor.clone()?;
        if tumor.dimension_match(&extent) == DimensionMatch::Mismatch {
            return None;
        }
        let best = self.selector.find_best_slices(&tumor);
        log::info!(
            "tumor slices axial={} coronal={} sagittal={}",
            best.axial,
            best.coronal,
            best.sagittal
        );
        self.crosshair.set_position(best.to_crosshair(&extent));
        self.sync_backend();
        Some(best)
    }

    pub fn handle(&mut self, event: InputEvent) -> bool {
        match event {
            InputEvent::PointerDown { x, y } => self.pointer_down(x, y),
            InputEvent::PointerMove { x, y } => self.pointer_move(x, y),
            InputEvent::PointerUp { x, y } => self.pointer_up(x, y),
            InputEvent::Wheel {
                x,
                y,
                delta_y,
                modifier,
            } => self.wheel(x, y, delta_y, modifier),
            InputEvent::SelectMode(mode) => self.select_mode(mode),
            InputEvent::ArrowLeft => self.step_active(-1),
            InputEvent::ArrowRight => self.step_active(1),
            InputEvent::Resize {
                width,
                height,
                device_pixel_ratio,
            } => {
                self.bounds = Viewport::new(self.bounds.x, self.bounds.y, width, height);
                self.device_pixel_ratio = device_pixel_ratio;
                self.resize_annotations();
                true
            }
        }
    }

    /// Emit a pointer move held back by the frame throttle, if its frame has come.
    pub fn poll(&mut self) -> bool {
        match self.moves.poll() {
            Some((x, y)) => self.apply_move(x, y),
            None => false,
        }
    }

    fn pane_at(&self, x: f32, y: f32) -> Option<(Pane, Viewport)> {
        self.viewport
            .panes(self.bounds)
            .into_iter()
            .find(|(_, viewport)| viewport.contains(x, y))
    }

    fn pointer_down(&mut self, x: f32, y: f32) -> bool {
        let Some((pane, viewport)) = self.pane_at(x, y) else {
            return false;
        };
        match pane {
            Pane::Slice(plane) => {
                self.active_plane = plane;
                let single = matches!(self.mode(), ViewMode::SinglePlane2D(_));
                if single && self.viewport.drawing_enabled() {
                    if let Some(layer) = self.annotations.get_mut(&plane) {
                        layer.begin_stroke(&self.tools, local_point(&viewport, x, y));
                        self.gesture = Gesture::Drawing { plane, viewport };
                        return true;
                    }
                    false
                } else if self.crosshair.discipline() == Discipline::Linked {
                    let dirty = self.crosshair.begin_drag_in(plane, viewport, x, y);
                    self.gesture = Gesture::Crosshair;
                    self.sync_backend();
                    !dirty.is_empty()
                } else {
                    false
                }
            }
            Pane::Render3D => {
                self.gesture = Gesture::Rotating { last: (x, y) };
                false
            }
        }
    }

    fn pointer_move(&mut self, x: f32, y: f32) -> bool {
        match self.gesture {
            Gesture::Idle => false,
            Gesture::Drawing { plane, viewport } => self
                .annotations
                .get_mut(&plane)
                .is_some_and(|layer| layer.extend_stroke(local_point(&viewport, x, y))),
            Gesture::Crosshair | Gesture::Rotating { .. } => match self.moves.push((x, y)) {
                Some((x, y)) => self.apply_move(x, y),
                None => false,
            },
        }
    }

    fn apply_move(&mut self, x: f32, y: f32) -> bool {
        match self.gesture {
            Gesture::Crosshair => {
                let dirty = self.crosshair.drag_to(x, y);
                self.sync_backend();
                !dirty.is_empty()
            }
            Gesture::Rotating { last } => {
                self.gesture = Gesture::Rotating { last: (x, y) };
                self.viewport.rotate_camera(x - last.0, y - last.1)
            }
            Gesture::Idle | Gesture::Drawing { .. } => false,
        }
    }

    fn pointer_up(&mut self, x: f32, y: f32) -> bool {
        let mut redraw = match self.moves.flush() {
            Some((px, py)) => self.apply_move(px, py),
            None => false,
        };
        redraw |= match self.gesture {
            Gesture::Drawing { plane, viewport } => self.annotations.get_mut(&plane).is_some_and(|layer| {
                layer.extend_stroke(local_point(&viewport, x, y));
                layer.end_stroke()
            }),
            Gesture::Crosshair => {
                let dirty = self.crosshair.end_drag(x, y);
                self.sync_backend();
                !dirty.is_empty()
            }
            Gesture::Rotating { .. } => self.apply_move(x, y),
            Gesture::Idle => false,
        };
        self.gesture = Gesture::Idle;
        redraw
    }

    fn wheel(&mut self, x: f32, y: f32, delta_y: f32, modifier: bool) -> bool {
        if self.backend.context_lost() {
            log::debug!("wheel ignored while the render context is lost");
            return false;
        }
        let Some((pane, _)) = self.pane_at(x, y) else {
            return false;
        };
        let notch: i64 = if delta_y > 0.0 {
            1
        } else if delta_y < 0.0 {
            -1
        } else {
            0
        };
        if notch == 0 {
            return false;
        }
        match pane {
            Pane::Slice(plane) if modifier => self
                .zoom
                .get_mut(&plane)
                .map(|zoom| {
                    let before = zoom.zoom();
                    zoom.step(-notch as i32);
                    zoom.zoom() != before
                })
                .unwrap_or(false),
            Pane::Slice(plane) => {
                self.active_plane = plane;
                let dirty = self
                    .crosshair
                    .step_slice(plane, notch * self.config.scrub_step);
                self.sync_backend();
                !dirty.is_empty()
            }
            Pane::Render3D if !modifier && self.mode() == ViewMode::FreeOblique3D => {
                match self.viewport.scroll_oblique(delta_y) {
                    Some(clip) => {
                        self.backend.set_clip_plane(Some(clip));
                        true
                    }
                    None => false,
                }
            }
            Pane::Render3D => {
                let before = self.volume_zoom.zoom();
                self.volume_zoom.step(-notch as i32);
                self.volume_zoom.zoom() != before
            }
        }
    }

    fn select_mode(&mut self, mode: ViewMode) -> bool {
        self.finish_gesture();
        if !self.viewport.set_mode(mode, &mut self.crosshair) {
            return false;
        }
        if let ViewMode::SinglePlane2D(plane) = mode {
            self.active_plane = plane;
        }
        self.volume_zoom = initial_zoom(&self.config);
        self.backend.set_clip_plane(self.viewport.clip_plane());
        self.resize_annotations();
        self.sync_backend();
        true
    }

    fn step_active(&mut self, delta: i64) -> bool {
        let dirty = self.crosshair.step_slice(self.active_plane, delta);
        self.sync_backend();
        !dirty.is_empty()
    }

    fn finish_gesture(&mut self) {
        if let Gesture::Drawing { plane, .. } = self.gesture {
            if let Some(layer) = self.annotations.get_mut(&plane) {
                layer.end_stroke();
            }
        }
        self.moves.flush();
        self.gesture = Gesture::Idle;
    }

    pub fn set_drawing_enabled(&mut self, enabled: bool) -> bool {
        self.viewport.set_drawing_enabled(enabled)
    }

    pub fn set_zoom(&mut self, plane: Plane, zoom: f32) -> Option<f32> {
        self.zoom.get_mut(&plane).map(|controller| controller.set_zoom(zoom))
    }

    pub fn reset_zoom(&mut self, plane: Plane) {
        if let Some(controller) = self.zoom.get_mut(&plane) {
            controller.reset();
        }
    }

    /// Percentage slider of `plane`.
    pub fn set_slice_fraction(&mut self, plane: Plane, fraction: f32) -> bool {
        let dirty = self.crosshair.set_slice_fraction(plane, fraction);
        self.sync_backend();
        !dirty.is_empty()
    }

    /// Wipe the active view's drawings if `confirm` agrees.
    pub fn clear_annotations(&mut self, confirm: &impl ConfirmClear) -> bool {
        self.annotations
            .get_mut(&self.active_plane)
            .is_some_and(|layer| layer.clear(confirm))
    }

    fn resize_annotations(&mut self) {
        let mode = self.mode();
        for plane in Plane::ALL {
            let size = mode
                .panes(self.bounds)
                .into_iter()
                .find(|(pane, _)| *pane == Pane::Slice(plane))
                .map(|(_, viewport)| (viewport.width, viewport.height));
            let Some((width, height)) = size else { continue };
            let dpr = self.device_pixel_ratio;
            self.annotations
                .entry(plane)
                .and_modify(|layer| layer.resize(width, height, dpr))
                .or_insert_with(|| AnnotationLayer::new(width, height, dpr));
        }
    }

    fn sync_backend(&mut self) {
        self.backend
            .set_crosshair(self.crosshair.position(), self.crosshair.slices());
        self.backend.set_camera(self.viewport.camera());
    }

    /// Draw every pane of the active mode, bottom layer first. A lost
    /// render context skips the whole frame and keeps all state.
    pub fn render(&mut self) -> Vec<PaneFrame> {
        self.sync_backend();
        let chrome = self.chrome();
        let panes: Vec<Pane> = chrome.iter().map(|part| part.pane).collect();
        let images = draw_panes(&mut self.backend, &panes);
        assemble(chrome, images)
    }

    fn chrome(&self) -> Vec<PaneChrome> {
        self.viewport
            .panes(self.bounds)
            .into_iter()
            .map(|(pane, viewport)| {
                let (annotations, zoom) = match pane {
                    Pane::Slice(plane) => (
                        self.annotations.get(&plane).map(|layer| layer.surface().clone()),
                        self.zoom.get(&plane).copied().unwrap_or_default(),
                    ),
                    Pane::Render3D => (None, self.volume_zoom),
                };
                PaneChrome {
                    pane,
                    viewport,
                    annotations,
                    decoration: self.decoration(pane),
                    zoom,
                }
            })
            .collect()
    }

    fn decoration(&self, pane: Pane) -> Decoration {
        match pane {
            Pane::Slice(plane) => {
                let crosshair = (self.crosshair.discipline() == Discipline::Linked).then(|| {
                    let geometry = PlaneGeometry::of(plane);
                    let position = self.crosshair.position();
                    let x = position.get(geometry.column);
                    let y = position.get(geometry.row);
                    (x, if geometry.flip_rows { 1.0 - y } else { y })
                });
                Decoration {
                    label: plane.name(),
                    crosshair,
                }
            }
            Pane::Render3D => Decoration {
                label: "3d",
                crosshair: None,
            },
        }
    }

    /// PNG of `plane`'s slice, overlays and drawings flattened together.
    pub fn export_view(&mut self, plane: Plane) -> Result<Vec<u8>, ViewerError> {
        self.sync_backend();
        self.backend.set_plane(RenderTarget::Slice(plane));
        let frame = self.backend.draw_frame()?;
        let transform = self.zoom.get(&plane).copied().unwrap_or_default().transform();
        let png = match self.annotations.get(&plane) {
            Some(layer) => layer.export(&frame.image, transform)?,
            None => crate::export::encode_png(&image::DynamicImage::ImageRgb8(frame.image).to_rgba8())?,
        };
        Ok(png)
    }
}

impl<B: RenderBackend + Clone + Send + 'static> Viewer<B> {
    /// Draw the current state on the render worker. Submitting again before
    /// this one finishes makes its [`RenderJob::wait`] return `None`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit_render(&mut self) -> RenderJob {
        self.sync_backend();
        let chrome = self.chrome();
        let panes: Vec<Pane> = chrome.iter().map(|part| part.pane).collect();
        let mut backend = self.backend.clone();
        let ticket = self.worker.submit(move || draw_panes(&mut backend, &panes));
        RenderJob { ticket, chrome }
    }
}

/// One image per pane, `None` for panes that failed to draw. The whole
/// frame is `None` once the render context is lost.
fn draw_panes<B: RenderBackend>(backend: &mut B, panes: &[Pane]) -> PaneImages {
    let mut images = Vec::with_capacity(panes.len());
    for pane in panes {
        let target = match pane {
            Pane::Slice(plane) => RenderTarget::Slice(*plane),
            Pane::Render3D => RenderTarget::Volume,
        };
        backend.set_plane(target);
        match backend.draw_frame() {
            Ok(frame) => images.push(Some(frame.image)),
            Err(BackendError::ContextLost) => {
                log::warn!("render context lost, frame skipped");
                return None;
            }
            Err(err) => {
                log::error!("failed to draw {pane:?}: {err}");
                images.push(None);
            }
        }
    }
    Some(images)
}

fn assemble(chrome: Vec<PaneChrome>, images: PaneImages) -> Vec<PaneFrame> {
    let Some(images) = images else {
        return Vec::new();
    };
    chrome
        .into_iter()
        .zip(images)
        .filter_map(|(part, image)| image.map(|image| part.with_image(image)))
        .collect()
}

fn initial_zoom(config: &ViewerConfig) -> ZoomController {
    let mut controller = ZoomController::new(config.zoom_step);
    controller.set_zoom(config.zoom);
    controller
}

fn local_point(viewport: &Viewport, x: f32, y: f32) -> StrokePoint {
    StrokePoint::new(x - viewport.x, y - viewport.y)
}
