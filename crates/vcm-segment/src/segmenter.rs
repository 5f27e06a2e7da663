//! The external segmentation model boundary

use async_trait::async_trait;
use thiserror::Error;
use vcm_paramset::ParamContent;
use vcm_volume::{VolumeImage, VolumeInfo, Voxel};

/// Mask geometry as the model reports it, before validation
#[derive(Debug, Clone)]
pub struct RawMask {
    /// Model-assigned label, expected unique within one volume
    pub label: u32,
    /// Voxels belonging to the mask, `(z, y, x)`
    pub voxels: Vec<Voxel>,
    /// Model confidence; absent means the model does not score masks
    pub confidence: Option<f32>,
}

/// Raised by the model boundary
#[derive(Debug, Error)]
pub enum SegmenterError {
    /// The model service cannot be reached or is overloaded; retryable
    #[error("segmentation model unavailable: {reason}")]
    Unavailable {
        /// What the model client reported
        reason: String,
    },
    /// The model refused this input; retrying the same input cannot help
    #[error("segmentation model rejected the input: {reason}")]
    Rejected {
        /// What the model client reported
        reason: String,
    },
}

impl SegmenterError {
    /// A retryable availability failure
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// A non-retryable input rejection
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// The segmentation model, treated as a black box
///
/// Receives the volume image plus the ParamSet content as model
/// configuration and reports raw masks. Output is not trusted; the
/// component validates geometry and confidence before anything persists.
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Run the model over one volume
    async fn segment(
        &self,
        info: &VolumeInfo,
        image: &VolumeImage,
        params: &ParamContent,
    ) -> Result<Vec<RawMask>, SegmenterError>;
}
