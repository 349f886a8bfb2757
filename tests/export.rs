mod common;

use tumor_mpr::annotation::{AnnotationLayer, StrokePoint, ToolSettings};
use tumor_mpr::backend::CpuBackend;
use tumor_mpr::config::ViewerConfig;
use tumor_mpr::export;
use tumor_mpr::layout::Viewport;
use tumor_mpr::viewer::{InputEvent, Viewer};
use tumor_mpr::zoom::Transform;
use tumor_mpr::{Plane, Tool, VolumeLoader};

#[test]
fn volume_round_trips_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brain.nii.gz");
    let dims = (4, 3, 2);
    std::fs::write(&path, common::gzip(&common::nifti_bytes(dims, &common::ramp(dims)))).unwrap();

    let volume = VolumeLoader::load_from_file(&path).unwrap();
    assert_eq!(volume.dims(), [1, 4, 3, 2]);
    assert!(VolumeLoader::load_from_file(dir.path().join("missing.nii")).is_err());
}

#[test]
fn annotated_view_is_written_as_png() {
    let dims = (8, 8, 8);
    let mut viewer = Viewer::new(
        ViewerConfig::default(),
        CpuBackend::new(),
        Viewport::new(0.0, 0.0, 80.0, 80.0),
    );
    viewer
        .load_volume(&common::nifti_bytes(dims, &common::ramp(dims)))
        .unwrap();
    viewer.handle(InputEvent::PointerDown { x: 10.0, y: 40.0 });
    viewer.handle(InputEvent::PointerMove { x: 70.0, y: 40.0 });
    viewer.handle(InputEvent::PointerUp { x: 70.0, y: 40.0 });

    let png = viewer.export_view(Plane::Axial).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("axial.png");
    std::fs::write(&path, &png).unwrap();

    let decoded = image::open(&path).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (80, 80));
    assert_eq!(decoded.get_pixel(40, 40).0, [255, 0, 0, 255]);
}

#[test]
fn eraser_cuts_a_gap_into_a_pen_stroke() {
    let mut layer = AnnotationLayer::new(90.0, 40.0, 1.0);
    let mut tools = ToolSettings::default();
    tools.set_pen_width(4.0);
    layer.begin_stroke(&tools, StrokePoint::new(0.0, 20.0));
    layer.extend_stroke(StrokePoint::new(90.0, 20.0));
    layer.end_stroke();

    tools.tool = Tool::Eraser;
    tools.set_eraser_size(20.0);
    layer.begin_stroke(&tools, StrokePoint::new(40.0, 20.0));
    layer.extend_stroke(StrokePoint::new(50.0, 20.0));
    layer.end_stroke();

    let surface = layer.surface();
    for x in 0..30 {
        assert_eq!(surface.get_pixel(x, 20).0[3], 255, "x = {x}");
        assert_eq!(surface.get_pixel(x + 60, 20).0[3], 255, "x = {}", x + 60);
    }
    for x in 30..60 {
        assert_eq!(surface.get_pixel(x, 20).0[3], 0, "x = {x}");
    }

    let flat = export::flatten(&image::RgbImage::new(90, 40), surface, Transform::IDENTITY);
    assert_eq!(flat.get_pixel(45, 20).0, [0, 0, 0, 255]);
}
