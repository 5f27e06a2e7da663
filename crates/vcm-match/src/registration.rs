//! Frame registration between a member volume and the reference

use thiserror::Error;
use vcm_volume::{centroid_of, Point3};

use crate::config::MatchConfig;
use crate::transform::AffineTransform;

/// Raised when a member cannot be aligned to the reference frame
///
/// Fatal to the whole match task; no transformation rows survive it.
#[derive(Debug, Error, PartialEq)]
pub enum RegistrationError {
    /// One side offered fewer landmarks than the configured minimum
    #[error("too few landmarks for registration: have {have}, need {need}")]
    TooFewLandmarks {
        /// Landmarks available on the smaller side
        have: usize,
        /// Configured minimum
        need: usize,
    },
    /// Alignment succeeded numerically but the fit is too loose
    #[error("alignment residual {residual:.3} exceeds limit {limit:.3}")]
    ResidualTooHigh {
        /// RMS nearest-neighbour residual in voxels
        residual: f64,
        /// Configured maximum
        limit: f64,
    },
}

/// Estimates the transform mapping `moving` landmarks onto `reference` ones
///
/// Implementations must be deterministic for a given input; the match task
/// identity does not capture which algorithm ran.
pub trait RegistrationAlgorithm: Send + Sync {
    /// Estimate a transform, or fail if the members cannot be aligned
    fn estimate(
        &self,
        reference: &[Point3],
        moving: &[Point3],
        config: &MatchConfig,
    ) -> Result<AffineTransform, RegistrationError>;
}

/// Translation-only registration by centroid difference
///
/// Shifts the moving cloud so its centroid lands on the reference
/// centroid, then scores the fit as the RMS distance from each shifted
/// landmark to its nearest reference landmark. Good enough when sessions
/// image the same field of view with drift but little rotation.
#[derive(Debug, Default, Clone, Copy)]
pub struct CentroidAlignment;

impl RegistrationAlgorithm for CentroidAlignment {
    fn estimate(
        &self,
        reference: &[Point3],
        moving: &[Point3],
        config: &MatchConfig,
    ) -> Result<AffineTransform, RegistrationError> {
        let need = config.min_landmarks.max(1);
        let have = reference.len().min(moving.len());
        if have < need {
            return Err(RegistrationError::TooFewLandmarks { have, need });
        }

        let (Some(ref_centroid), Some(mov_centroid)) =
            (centroid_of(reference), centroid_of(moving))
        else {
            return Err(RegistrationError::TooFewLandmarks { have: 0, need });
        };
        let shift = ref_centroid.sub(mov_centroid);
        let transform = AffineTransform::from_translation([shift.z, shift.y, shift.x]);

        let residual = rms_nearest_residual(reference, moving, &transform);
        if residual > config.max_residual {
            return Err(RegistrationError::ResidualTooHigh {
                residual,
                limit: config.max_residual,
            });
        }
        tracing::debug!(
            "centroid alignment: shift ({:.2}, {:.2}, {:.2}), residual {:.3}",
            shift.z,
            shift.y,
            shift.x,
            residual
        );
        Ok(transform)
    }
}

fn rms_nearest_residual(reference: &[Point3], moving: &[Point3], t: &AffineTransform) -> f64 {
    let mut sum = 0.0;
    for p in moving {
        let moved = t.apply(*p);
        let nearest = reference
            .iter()
            .map(|r| r.distance(moved))
            .fold(f64::INFINITY, f64::min);
        sum += nearest * nearest;
    }
    (sum / moving.len() as f64).sqrt()
}
