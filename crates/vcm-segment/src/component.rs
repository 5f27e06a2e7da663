//! Segmentation component: model invocation plus output validation

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use vcm_paramset::ParamSet;
use vcm_volume::{
    LocalMaskId, Mask, VolumeError, VolumeId, VolumeProvider, VolumeShape, Voxel,
};

use crate::segmenter::{RawMask, Segmenter, SegmenterError};

/// Raised when a segmentation cannot be produced for a volume
#[derive(Debug, Error)]
pub enum SegmentError {
    /// The volume could not be fetched
    #[error(transparent)]
    Volume(#[from] VolumeError),
    /// The model boundary failed
    #[error(transparent)]
    Model(#[from] SegmenterError),
    /// The model emitted geometry outside the volume
    #[error("mask {mask} has voxel {voxel:?} outside volume bounds")]
    OutOfBounds {
        /// The offending mask's label
        mask: LocalMaskId,
        /// The first out-of-bounds voxel found
        voxel: Voxel,
    },
    /// The model emitted two masks under one label
    #[error("model output repeats mask label {label}")]
    DuplicateLabel {
        /// The repeated label
        label: u32,
    },
}

/// Runs the model for one volume and validates what comes back
///
/// One call serves exactly one `(volume, paramset)` pair, so a
/// segmentation can never blend model output across parameter sets.
pub struct SegmentationComponent {
    provider: Arc<dyn VolumeProvider>,
    segmenter: Arc<dyn Segmenter>,
}

impl SegmentationComponent {
    /// Wire the component to a volume source and a model
    #[must_use]
    pub fn new(provider: Arc<dyn VolumeProvider>, segmenter: Arc<dyn Segmenter>) -> Self {
        Self {
            provider,
            segmenter,
        }
    }

    /// Segment one volume under one ParamSet
    ///
    /// # Errors
    /// Fetch failures, model failures, and structurally bad model output.
    /// Empty masks are not an error; they are dropped with a warning.
    pub async fn segment(
        &self,
        volume: VolumeId,
        params: &ParamSet,
    ) -> Result<Vec<Mask>, SegmentError> {
        let info = self.provider.info(volume).await?;
        let image = self.provider.image(volume).await?;
        tracing::debug!(
            "segmenting volume {volume} ({} voxels) with paramset {}",
            info.shape.voxel_count(),
            params.id().short()
        );
        let raw = self
            .segmenter
            .segment(&info, &image, params.content())
            .await?;
        let masks = normalize(raw, &info.shape)?;
        tracing::info!("volume {volume} segmented into {} masks", masks.len());
        Ok(masks)
    }
}

/// Turn raw model output into validated, label-ordered masks
fn normalize(raw: Vec<RawMask>, shape: &VolumeShape) -> Result<Vec<Mask>, SegmentError> {
    let mut seen = HashSet::with_capacity(raw.len());
    let mut masks = Vec::with_capacity(raw.len());
    for r in raw {
        if r.voxels.is_empty() {
            tracing::warn!("dropping empty mask {} from model output", r.label);
            continue;
        }
        if !seen.insert(r.label) {
            return Err(SegmentError::DuplicateLabel { label: r.label });
        }
        if let Some(voxel) = r.voxels.iter().find(|v| !shape.contains(**v)) {
            return Err(SegmentError::OutOfBounds {
                mask: LocalMaskId(r.label),
                voxel: *voxel,
            });
        }
        let confidence = match r.confidence {
            None => 1.0,
            Some(c) if !c.is_finite() => {
                tracing::warn!("mask {} confidence {c} is not finite, using 1.0", r.label);
                1.0
            }
            Some(c) if (0.0..=1.0).contains(&c) => c,
            Some(c) => {
                tracing::warn!("clamping mask {} confidence {c} into [0, 1]", r.label);
                c.clamp(0.0, 1.0)
            }
        };
        masks.push(Mask::new(LocalMaskId(r.label), r.voxels, confidence));
    }
    masks.sort_by_key(Mask::id);
    Ok(masks)
}
