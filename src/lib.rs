//! # tumor-mpr
//!
//! Slice viewing and tumor highlighting for NIfTI volumes, as used by MPR
//! (multi-planar reconstruction) viewers.
//!
//! A volume is decoded from NIfTI-1 bytes (optionally gzip compressed) and
//! can be sliced along the three medical axes:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//! Slices are windowed to the 5th/95th percentile of their non-zero voxels
//! and flipped so that superior/anterior is at the top. A segmentation mask
//! of the same shape can be blended on top, and the slice that shows the
//! most of it is located per plane. Pixel loops run in parallel using rayon;
//! raw slices can alternatively be sampled on the GPU with wgpu.
//!
//! On top of that the crate keeps the interactive state of a viewer: a
//! shared crosshair that either links the three planes or leaves each plane
//! alone, zoom, freehand annotations with PNG export, and the view modes of
//! a single-plane, MPR + 3D, oblique and full 3D layout.
//!
//! # Examples
//!
//! ## Finding the slices with the most tumor
//!
//! ```no_run
//! # use tumor_mpr::{OverlayVolume, Plane, TumorSliceSelector, VolumeLoader};
//! # use std::sync::Arc;
//! let volume = VolumeLoader::load_from_file("t1.nii.gz")
//!     .expect("should have loaded the volume");
//! let mask = VolumeLoader::load_from_file("tumor.nii.gz")
//!     .expect("should have loaded the mask");
//! let overlay = OverlayVolume::new(Arc::new(mask));
//! let best = TumorSliceSelector::new().find_best_slices(&overlay);
//! let image = volume
//!     .get_image_from_axis(best.get(Plane::Axial), Plane::Axial)
//!     .expect("should have returned the axial slice");
//! image.save("axial.png");
//! ```

pub mod annotation;
pub mod backend;
pub mod colormap;
pub mod config;
pub mod crosshair;
pub mod enums;
pub mod export;
pub mod geometry;
pub mod gpu_sampler;
pub mod layout;
pub mod overlay;
pub mod scheduler;
pub mod slice_extractor;
pub mod tumor;
pub mod viewer;
pub mod viewport;
pub mod volume;
pub mod volume_loader;
pub mod zoom;

pub use enums::{Plane, PresetColor, Processor, Tool};
pub use overlay::{OverlayCompositor, OverlayStyle, OverlayVolume};
pub use slice_extractor::SliceExtractor;
pub use tumor::{BestSlices, TumorSliceSelector};
pub use volume::Volume;
pub use volume_loader::{VolumeLoader, VolumeStore};
