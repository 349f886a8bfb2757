//! Locating the slice that shows the most tumor in each plane.

use crate::crosshair::CrosshairPosition;
use crate::enums::Plane;
use crate::geometry::{Axis, Extent};
use crate::overlay::OverlayVolume;
use crate::volume::{Volume, VolumeId};

use rayon::prelude::*;

/// Threshold used for the single retry when nothing exceeds the overlay's own.
pub const FALLBACK_THRESHOLD: f32 = 0.0;

/// Best slice per plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BestSlices {
    pub axial: usize,
    pub coronal: usize,
    pub sagittal: usize,
}

impl BestSlices {
    pub fn get(&self, plane: Plane) -> usize {
        match plane {
            Plane::Axial => self.axial,
            Plane::Coronal => self.coronal,
            Plane::Sagittal => self.sagittal,
        }
    }

    /// Crosshair that puts every plane on its best slice.
    pub fn to_crosshair(&self, extent: &Extent) -> CrosshairPosition {
        CrosshairPosition::from_indices(
            extent,
            [
                (Axis::X, self.sagittal),
                (Axis::Y, self.coronal),
                (Axis::Z, self.axial),
            ],
        )
    }
}

/// Overlays wrapping the same mask share its id, so the threshold is part
/// of the identity.
#[derive(Clone, Copy, Debug, PartialEq)]
struct CacheKey {
    overlay: VolumeId,
    threshold: u32,
}

/// Caches scan results for the overlay it last saw. A different overlay
/// reference discards every cached plane.
#[derive(Debug, Default)]
pub struct TumorSliceSelector {
    key: Option<CacheKey>,
    cached: [Option<usize>; 3],
}

impl TumorSliceSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_best_slice(&mut self, overlay: &OverlayVolume, plane: Plane) -> usize {
        let key = CacheKey {
            overlay: overlay.id(),
            threshold: overlay.threshold().to_bits(),
        };
        if self.key != Some(key) {
            self.key = Some(key);
            self.cached = [None; 3];
        }
        let slot = plane_slot(plane);
        if let Some(index) = self.cached[slot] {
            return index;
        }
        let index = Self::scan(overlay, plane);
        self.cached[slot] = Some(index);
        index
    }

    pub fn find_best_slices(&mut self, overlay: &OverlayVolume) -> BestSlices {
        BestSlices {
            axial: self.find_best_slice(overlay, Plane::Axial),
            coronal: self.find_best_slice(overlay, Plane::Coronal),
            sagittal: self.find_best_slice(overlay, Plane::Sagittal),
        }
    }

    /// Uncached scan.
    pub fn scan(overlay: &OverlayVolume, plane: Plane) -> usize {
        let volume = overlay.volume();
        for threshold in [overlay.threshold(), FALLBACK_THRESHOLD] {
            let counts = count_per_slice(volume, plane, threshold);
            if let Some((index, count)) = densest(&counts) {
                log::debug!(
                    "best {plane} slice {index} with {count} voxels above {threshold}"
                );
                return index;
            }
            if threshold <= FALLBACK_THRESHOLD {
                break;
            }
        }
        let central = volume.central_slice(plane);
        log::debug!("overlay empty in {plane}, using central slice {central}");
        central
    }
}

/// Above-threshold voxel count of every slice in `plane`.
pub fn count_per_slice(volume: &Volume, plane: Plane, threshold: f32) -> Vec<usize> {
    (0..volume.slice_count(plane))
        .into_par_iter()
        .map(|index| {
            volume
                .get_slice_from_axis(index, plane)
                .map_or(0, |slice| slice.iter().filter(|&&v| v > threshold).count())
        })
        .collect()
}

/// Index of the largest non-zero count, lowest index on ties.
fn densest(counts: &[usize]) -> Option<(usize, usize)> {
    counts
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (index, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ if count == 0 => best,
            _ => Some((index, count)),
        })
}

fn plane_slot(plane: Plane) -> usize {
    match plane {
        Plane::Axial => 0,
        Plane::Coronal => 1,
        Plane::Sagittal => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use std::sync::Arc;

    fn overlay_from(data: Array3<f32>) -> OverlayVolume {
        OverlayVolume::new(Arc::new(Volume::new(data, 16)))
    }

    #[test]
    fn single_voxel_is_found_in_every_plane() {
        let mut data = Array3::zeros((4, 4, 4));
        data[[3, 2, 2]] = 1.0;
        let overlay = overlay_from(data);
        let mut selector = TumorSliceSelector::new();
        assert_eq!(selector.find_best_slice(&overlay, Plane::Axial), 3);
        assert_eq!(selector.find_best_slice(&overlay, Plane::Coronal), 2);
        assert_eq!(selector.find_best_slice(&overlay, Plane::Sagittal), 2);
    }

    #[test]
    fn strictly_densest_slice_wins() {
        let mut data = Array3::zeros((6, 5, 5));
        for x in 0..3 {
            data[[1, 0, x]] = 1.0;
        }
        for x in 0..5 {
            data[[4, 2, x]] = 1.0;
        }
        let overlay = overlay_from(data);
        assert_eq!(TumorSliceSelector::scan(&overlay, Plane::Axial), 4);
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let mut data = Array3::zeros((6, 4, 4));
        data[[2, 0, 0]] = 1.0;
        data[[5, 1, 1]] = 1.0;
        data[[4, 3, 3]] = 1.0;
        let overlay = overlay_from(data);
        assert_eq!(TumorSliceSelector::scan(&overlay, Plane::Axial), 2);
    }

    #[test]
    fn faint_masks_fall_back_to_any_positive_value() {
        let mut data = Array3::zeros((5, 4, 4));
        data[[1, 0, 0]] = 0.2;
        data[[1, 0, 1]] = 0.3;
        data[[3, 2, 2]] = 0.1;
        let overlay = overlay_from(data);
        assert_eq!(TumorSliceSelector::scan(&overlay, Plane::Axial), 1);
    }

    #[test]
    fn empty_mask_uses_central_slice() {
        let overlay = overlay_from(Array3::zeros((7, 4, 6)));
        assert_eq!(TumorSliceSelector::scan(&overlay, Plane::Axial), 3);
        assert_eq!(TumorSliceSelector::scan(&overlay, Plane::Sagittal), 3);
        assert_eq!(TumorSliceSelector::scan(&overlay, Plane::Coronal), 2);
    }

    #[test]
    fn cache_is_keyed_on_overlay_identity() {
        let mut first = Array3::zeros((4, 4, 4));
        first[[1, 1, 1]] = 1.0;
        let mut second = Array3::zeros((4, 4, 4));
        second[[2, 1, 1]] = 1.0;
        let first = overlay_from(first);
        let second = overlay_from(second);

        let mut selector = TumorSliceSelector::new();
        assert_eq!(selector.find_best_slice(&first, Plane::Axial), 1);
        assert_eq!(selector.find_best_slice(&first.clone(), Plane::Axial), 1);
        assert_eq!(selector.find_best_slice(&second, Plane::Axial), 2);
    }

    #[test]
    fn one_mask_at_two_thresholds_is_cached_apart() {
        let mut data = Array3::zeros((4, 4, 4));
        data[[1, 0, 0]] = 1.0;
        data[[1, 0, 1]] = 1.0;
        data[[1, 0, 2]] = 1.0;
        data[[2, 3, 3]] = 3.0;
        let mask = Arc::new(Volume::new(data, 16));
        let faint = OverlayVolume::with_threshold(Arc::clone(&mask), 0.5);
        let strong = OverlayVolume::with_threshold(mask, 2.0);
        assert_eq!(faint.id(), strong.id());

        let mut selector = TumorSliceSelector::new();
        assert_eq!(selector.find_best_slice(&faint, Plane::Axial), 1);
        assert_eq!(selector.find_best_slice(&strong, Plane::Axial), 2);
        assert_eq!(selector.find_best_slice(&faint, Plane::Axial), 1);
    }

    #[test]
    fn best_slices_seed_the_crosshair() {
        let best = BestSlices {
            axial: 3,
            coronal: 0,
            sagittal: 2,
        };
        let position = best.to_crosshair(&Extent::new(5, 4, 4));
        assert_eq!(position.w, 1.0);
        assert_eq!(position.v, 0.0);
        assert_eq!(position.u, 0.5);
    }
}
