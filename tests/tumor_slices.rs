mod common;

use std::sync::Arc;

use tumor_mpr::viewer::{OverlayContext, Viewer};
use tumor_mpr::backend::CpuBackend;
use tumor_mpr::config::ViewerConfig;
use tumor_mpr::layout::Viewport;
use tumor_mpr::{OverlayCompositor, OverlayStyle, OverlayVolume, Plane, PresetColor, TumorSliceSelector, VolumeLoader};

#[test]
fn single_voxel_tumor_end_to_end() {
    let dims = (4, 4, 4);
    let volume = VolumeLoader::load_from_bytes(&common::nifti_bytes(dims, &common::ramp(dims))).unwrap();
    let mask = VolumeLoader::load_from_bytes(&common::nifti_bytes(dims, &common::mask(dims, &[[2, 2, 3]])))
        .unwrap();
    assert_eq!(volume.dims(), [1, 4, 4, 4]);

    let overlay = OverlayVolume::new(Arc::new(mask));
    let mut selector = TumorSliceSelector::new();
    assert_eq!(selector.find_best_slice(&overlay, Plane::Axial), 3);
    assert_eq!(selector.find_best_slice(&overlay, Plane::Coronal), 2);
    assert_eq!(selector.find_best_slice(&overlay, Plane::Sagittal), 2);

    let base = volume.get_image_from_axis(3, Plane::Axial).unwrap();
    let composite = OverlayCompositor::composite(
        &base,
        &volume.extent(),
        &overlay,
        Plane::Axial,
        3,
        OverlayStyle::preset(PresetColor::Red, 1.0),
    );
    // voxel (2, 2) is shown at row 4 - 1 - 2 = 1
    assert_eq!(composite.image.get_pixel(2, 1).0, [255, 0, 0]);
    let unmarked = composite.image.get_pixel(1, 1).0;
    assert_eq!(unmarked[0], unmarked[1]);
}

#[test]
fn gzipped_volume_loads_like_plain() {
    let dims = (3, 2, 5);
    let bytes = common::nifti_bytes(dims, &common::ramp(dims));
    let plain = VolumeLoader::load_from_bytes(&bytes).unwrap();
    let packed = VolumeLoader::load_from_bytes(&common::gzip(&bytes)).unwrap();
    assert_eq!(plain.data(), packed.data());
    assert_eq!(packed.get(2, 1, 4), Some(30.0));
}

#[test]
fn viewer_opens_on_the_tumor() {
    let dims = (6, 5, 4);
    let mut viewer = Viewer::new(
        ViewerConfig::default(),
        CpuBackend::new(),
        Viewport::new(0.0, 0.0, 300.0, 300.0),
    );
    viewer
        .load_volume(&common::nifti_bytes(dims, &common::ramp(dims)))
        .unwrap();
    let tumor = VolumeLoader::load_from_bytes(&common::nifti_bytes(
        dims,
        &common::mask(dims, &[[4, 1, 2], [4, 2, 2], [3, 1, 0]]),
    ))
    .unwrap();
    viewer.set_overlays(OverlayContext {
        overlay: None,
        tumor: Some(Arc::new(OverlayVolume::new(Arc::new(tumor)))),
    });

    assert_eq!(viewer.view_state(Plane::Axial).slice_index, 2);
    assert_eq!(viewer.view_state(Plane::Sagittal).slice_index, 4);
    assert_eq!(viewer.view_state(Plane::Coronal).slice_index, 1);

    let frames = viewer.render();
    assert_eq!(frames.len(), 1);
    let red = frames[0]
        .image
        .pixels()
        .filter(|pixel| pixel.0[0] > pixel.0[1])
        .count();
    assert_eq!(red, 2);
}
