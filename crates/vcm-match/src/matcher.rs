//! The match computation: registration, projection, correspondence

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use vcm_volume::{LocalMaskId, Point3, Segmentation, VolumeId};

use crate::config::{ConfigError, MatchConfig};
use crate::correspondence::{correspond, ProjectedMask};
use crate::outcome::MatchOutcome;
use crate::registration::{CentroidAlignment, RegistrationAlgorithm, RegistrationError};
use crate::transform::AffineTransform;

/// Raised when a match computation cannot produce an outcome
#[derive(Debug, Error)]
pub enum MatchError {
    /// Matching needs at least two member volumes
    #[error("match requires at least 2 member volumes, got {have}")]
    InsufficientVolumes {
        /// Members offered
        have: usize,
    },
    /// The same volume appeared twice in the member set
    #[error("volume {volume} appears twice in the member set")]
    DuplicateMember {
        /// The repeated volume
        volume: VolumeId,
    },
    /// A member could not be aligned to the reference frame
    #[error("registration failed for volume {volume}: {source}")]
    Registration {
        /// The member that failed to align
        volume: VolumeId,
        /// What went wrong
        #[source]
        source: RegistrationError,
    },
    /// The ParamSet carried malformed matching thresholds
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Runs the full match over one group of segmentations
///
/// Deterministic: the member with the lowest [`VolumeId`] becomes the
/// reference frame and keeps the identity transform; every product of the
/// run is ordered by `(volume, mask)` so identical input reproduces
/// identical cluster numbering.
pub struct VolumeMatcher {
    config: MatchConfig,
    registration: Arc<dyn RegistrationAlgorithm>,
}

impl VolumeMatcher {
    /// A matcher with the default centroid-alignment registration
    #[must_use]
    pub fn new(config: MatchConfig) -> Self {
        Self::with_registration(config, Arc::new(CentroidAlignment))
    }

    /// A matcher with a caller-supplied registration algorithm
    #[must_use]
    pub fn with_registration(
        config: MatchConfig,
        registration: Arc<dyn RegistrationAlgorithm>,
    ) -> Self {
        Self {
            config,
            registration,
        }
    }

    /// The thresholds this matcher runs with
    #[must_use]
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Match member segmentations into common identities
    ///
    /// # Errors
    /// [`MatchError::Registration`] aborts the whole run; no partial
    /// transformations escape. Correspondence itself cannot fail.
    pub fn match_volumes(&self, members: &[&Segmentation]) -> Result<MatchOutcome, MatchError> {
        if members.len() < 2 {
            return Err(MatchError::InsufficientVolumes {
                have: members.len(),
            });
        }
        let mut ordered: Vec<&Segmentation> = members.to_vec();
        ordered.sort_by_key(|s| s.volume());
        for pair in ordered.windows(2) {
            if pair[0].volume() == pair[1].volume() {
                return Err(MatchError::DuplicateMember {
                    volume: pair[0].volume(),
                });
            }
        }

        // Landmarks: each mask contributes its centroid.
        let landmarks: Vec<(VolumeId, Vec<(LocalMaskId, Point3)>)> = ordered
            .iter()
            .map(|seg| {
                let points = seg
                    .masks()
                    .iter()
                    .filter_map(|m| m.centroid().map(|c| (m.id(), c)))
                    .collect();
                (seg.volume(), points)
            })
            .collect();

        let reference = &landmarks[0];
        let reference_points: Vec<_> = reference.1.iter().map(|(_, p)| *p).collect();

        let mut transformations = BTreeMap::new();
        transformations.insert(reference.0, AffineTransform::identity());
        for (volume, points) in &landmarks[1..] {
            let moving: Vec<_> = points.iter().map(|(_, p)| *p).collect();
            let transform = self
                .registration
                .estimate(&reference_points, &moving, &self.config)
                .map_err(|source| MatchError::Registration {
                    volume: *volume,
                    source,
                })?;
            transformations.insert(*volume, transform);
        }

        let mut projected = Vec::new();
        for (volume, points) in &landmarks {
            let transform = &transformations[volume];
            for (mask, centroid) in points {
                projected.push(ProjectedMask {
                    volume: *volume,
                    mask: *mask,
                    centroid: transform.apply(*centroid),
                });
            }
        }

        let (common_masks, volume_masks) =
            correspond(&projected, self.config.distance_tolerance);
        tracing::info!(
            "matched {} volumes: {} clusters from {} masks ({} linked)",
            ordered.len(),
            common_masks.len(),
            projected.len(),
            volume_masks.len()
        );
        Ok(MatchOutcome {
            transformations,
            common_masks,
            volume_masks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vcm_paramset::{canonical_hash, ParamContent, ParamSetId};
    use vcm_volume::{LocalMaskId, Mask, Voxel};

    fn paramset() -> ParamSetId {
        ParamSetId::new(canonical_hash(&ParamContent::new()).unwrap())
    }

    fn single_voxel_mask(id: u32, at: Voxel) -> Mask {
        Mask::new(LocalMaskId(id), vec![at], 1.0)
    }

    fn seg(volume: VolumeId, masks: Vec<Mask>) -> Segmentation {
        Segmentation::new(volume, paramset(), masks)
    }

    fn sorted_volumes<const N: usize>() -> [VolumeId; N] {
        let mut ids: Vec<VolumeId> = (0..N).map(|_| VolumeId::new()).collect();
        ids.sort();
        let mut out = [VolumeId::default(); N];
        out.copy_from_slice(&ids);
        out
    }

    fn relaxed() -> MatchConfig {
        MatchConfig {
            distance_tolerance: 8.0,
            min_landmarks: 1,
            max_residual: 6.0,
        }
    }

    #[test]
    fn three_volumes_one_structure_yield_one_cluster() {
        let [va, vb, vc] = sorted_volumes::<3>();
        let segs = [
            seg(va, vec![single_voxel_mask(1, [10, 10, 10])]),
            seg(vb, vec![single_voxel_mask(1, [10, 10, 12])]),
            seg(vc, vec![single_voxel_mask(1, [10, 12, 10])]),
        ];
        let members: Vec<&Segmentation> = segs.iter().collect();

        let outcome = VolumeMatcher::new(relaxed()).match_volumes(&members).unwrap();
        assert_eq!(outcome.common_masks.len(), 1);
        assert_eq!(outcome.volume_masks.len(), 3);
        assert_eq!(outcome.transformations.len(), 3);
        assert_eq!(outcome.transformations[&va], AffineTransform::identity());
    }

    #[test]
    fn ambiguous_pairing_keeps_higher_confidence() {
        let [va, vb] = sorted_volumes::<2>();
        // Centroids coincide by construction, so projection is the
        // identity: both vb masks 1 and 2 land within tolerance of va's
        // mask 1, and mask 2 is the nearer of the two.
        let segs = [
            seg(
                va,
                vec![
                    single_voxel_mask(1, [10, 10, 10]),
                    single_voxel_mask(9, [10, 10, 100]),
                ],
            ),
            seg(
                vb,
                vec![
                    single_voxel_mask(1, [10, 10, 14]),
                    single_voxel_mask(2, [10, 10, 12]),
                    single_voxel_mask(9, [10, 10, 139]),
                ],
            ),
        ];
        let members: Vec<&Segmentation> = segs.iter().collect();

        let config = MatchConfig {
            distance_tolerance: 8.0,
            min_landmarks: 1,
            max_residual: 30.0,
        };
        let outcome = VolumeMatcher::new(config).match_volumes(&members).unwrap();

        let linked: Vec<_> = outcome
            .volume_masks
            .iter()
            .map(|r| (r.volume, r.local_mask))
            .collect();
        assert!(linked.contains(&(va, LocalMaskId(1))));
        assert!(linked.contains(&(vb, LocalMaskId(2))));
        assert!(!linked.contains(&(vb, LocalMaskId(1))));
    }

    #[test]
    fn registration_failure_aborts_whole_match() {
        let [va, vb] = sorted_volumes::<2>();
        let segs = [
            seg(
                va,
                vec![
                    single_voxel_mask(1, [0, 0, 0]),
                    single_voxel_mask(2, [0, 0, 40]),
                ],
            ),
            // Both masks collapse to the midpoint: residual 20 after the
            // centroid shift, far over the 6 voxel limit.
            seg(
                vb,
                vec![
                    single_voxel_mask(1, [0, 0, 20]),
                    single_voxel_mask(2, [0, 0, 20]),
                ],
            ),
        ];
        let members: Vec<&Segmentation> = segs.iter().collect();

        let config = MatchConfig {
            distance_tolerance: 8.0,
            min_landmarks: 2,
            max_residual: 6.0,
        };
        let err = VolumeMatcher::new(config).match_volumes(&members).unwrap_err();
        assert!(matches!(
            err,
            MatchError::Registration {
                volume,
                source: RegistrationError::ResidualTooHigh { .. },
            } if volume == vb
        ));
    }

    #[test]
    fn rerun_reproduces_identical_numbering() {
        let [va, vb, vc] = sorted_volumes::<3>();
        let segs = [
            seg(
                va,
                vec![
                    single_voxel_mask(1, [5, 5, 5]),
                    single_voxel_mask(2, [5, 40, 5]),
                ],
            ),
            seg(
                vb,
                vec![
                    single_voxel_mask(1, [5, 5, 7]),
                    single_voxel_mask(2, [5, 40, 7]),
                ],
            ),
            seg(
                vc,
                vec![
                    single_voxel_mask(3, [5, 5, 6]),
                    single_voxel_mask(4, [5, 40, 6]),
                ],
            ),
        ];
        let members: Vec<&Segmentation> = segs.iter().collect();
        let matcher = VolumeMatcher::new(relaxed());

        let first = matcher.match_volumes(&members).unwrap();
        let second = matcher.match_volumes(&members).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.common_masks.len(), 2);
    }

    #[test]
    fn single_member_is_rejected() {
        let segs = [seg(VolumeId::new(), vec![single_voxel_mask(1, [0, 0, 0])])];
        let members: Vec<&Segmentation> = segs.iter().collect();
        let err = VolumeMatcher::new(relaxed()).match_volumes(&members).unwrap_err();
        assert!(matches!(err, MatchError::InsufficientVolumes { have: 1 }));
    }

    #[test]
    fn duplicate_member_is_rejected() {
        let volume = VolumeId::new();
        let segs = [
            seg(volume, vec![single_voxel_mask(1, [0, 0, 0])]),
            seg(volume, vec![single_voxel_mask(1, [0, 0, 0])]),
        ];
        let members: Vec<&Segmentation> = segs.iter().collect();
        let err = VolumeMatcher::new(relaxed()).match_volumes(&members).unwrap_err();
        assert!(matches!(err, MatchError::DuplicateMember { .. }));
    }
}
