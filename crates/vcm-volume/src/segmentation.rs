//! Committed segmentation results

use chrono::{DateTime, Utc};
use serde::Serialize;
use vcm_paramset::ParamSetId;

use crate::ids::{LocalMaskId, SegmentationId, VolumeId};
use crate::mask::Mask;
use crate::volume::{LabelVolume, VolumeShape};

/// The committed result of segmenting one volume under one ParamSet
///
/// Holds the full mask list sorted by ascending local id. Immutable once
/// built; the execution engine constructs one per completed segmentation
/// task and it never changes afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Segmentation {
    id: SegmentationId,
    volume: VolumeId,
    paramset: ParamSetId,
    masks: Vec<Mask>,
    executed_at: DateTime<Utc>,
}

impl Segmentation {
    /// Build a segmentation row, minting a fresh id
    ///
    /// Masks are sorted by local id so lookups can binary-search.
    #[must_use]
    pub fn new(volume: VolumeId, paramset: ParamSetId, mut masks: Vec<Mask>) -> Self {
        masks.sort_by_key(Mask::id);
        Self {
            id: SegmentationId::new(),
            volume,
            paramset,
            masks,
            executed_at: Utc::now(),
        }
    }

    /// Row identity
    #[inline]
    #[must_use]
    pub const fn id(&self) -> SegmentationId {
        self.id
    }

    /// The segmented volume
    #[inline]
    #[must_use]
    pub const fn volume(&self) -> VolumeId {
        self.volume
    }

    /// The ParamSet this segmentation ran under
    #[inline]
    #[must_use]
    pub const fn paramset(&self) -> ParamSetId {
        self.paramset
    }

    /// All masks, ascending by local id
    #[inline]
    #[must_use]
    pub fn masks(&self) -> &[Mask] {
        &self.masks
    }

    /// When the segmentation completed
    #[inline]
    #[must_use]
    pub const fn executed_at(&self) -> DateTime<Utc> {
        self.executed_at
    }

    /// Look up one mask by its local id
    #[must_use]
    pub fn mask(&self, id: LocalMaskId) -> Option<&Mask> {
        self.masks
            .binary_search_by_key(&id, Mask::id)
            .ok()
            .map(|i| &self.masks[i])
    }

    /// Rasterise the mask list into a dense label array
    ///
    /// Voxel values are the local mask ids, 0 is background. Assumes masks
    /// were bounds-checked against `shape` before commit.
    #[must_use]
    pub fn label_volume(&self, shape: &VolumeShape) -> LabelVolume {
        let mut labels = LabelVolume::zeros(shape.as_dim());
        for mask in &self.masks {
            let value = mask.id().0;
            for voxel in mask.voxels() {
                debug_assert!(shape.contains(*voxel));
                if shape.contains(*voxel) {
                    labels[[
                        voxel[0] as usize,
                        voxel[1] as usize,
                        voxel[2] as usize,
                    ]] = value;
                }
            }
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcm_paramset::{canonical_hash, ParamContent, ParamSetId};

    fn paramset_id() -> ParamSetId {
        ParamSetId::new(canonical_hash(&ParamContent::new()).unwrap())
    }

    fn sample() -> Segmentation {
        let masks = vec![
            Mask::new(LocalMaskId(2), vec![[1, 1, 1], [1, 1, 2]], 0.9),
            Mask::new(LocalMaskId(1), vec![[0, 0, 0]], 1.0),
        ];
        Segmentation::new(VolumeId::new(), paramset_id(), masks)
    }

    #[test]
    fn masks_are_sorted_and_lookupable() {
        let seg = sample();
        let ids: Vec<u32> = seg.masks().iter().map(|m| m.id().0).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(seg.mask(LocalMaskId(2)).unwrap().voxel_count(), 2);
        assert!(seg.mask(LocalMaskId(3)).is_none());
    }

    #[test]
    fn label_volume_paints_local_ids() {
        let seg = sample();
        let labels = seg.label_volume(&VolumeShape::new(2, 2, 3));
        assert_eq!(labels[[0, 0, 0]], 1);
        assert_eq!(labels[[1, 1, 1]], 2);
        assert_eq!(labels[[1, 1, 2]], 2);
        assert_eq!(labels[[0, 1, 0]], 0);
    }
}
