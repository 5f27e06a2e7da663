//! Segmented masks

use serde::{Deserialize, Serialize};

use crate::geometry::{Point3, Voxel};
use crate::ids::LocalMaskId;
use crate::volume::VolumeShape;

/// One segmented structure inside a volume
///
/// Geometry is the explicit voxel list (compact for sparse structures) with
/// a detection confidence in `[0, 1]`. Validation of raw segmenter output
/// (bounds, empties, confidence defaults) happens before a `Mask` is built,
/// so downstream consumers can rely on non-empty, in-bounds geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    id: LocalMaskId,
    voxels: Vec<Voxel>,
    confidence: f32,
}

impl Mask {
    /// Create a mask from its label, geometry and confidence
    #[must_use]
    pub fn new(id: LocalMaskId, voxels: Vec<Voxel>, confidence: f32) -> Self {
        Self {
            id,
            voxels,
            confidence,
        }
    }

    /// Local label of this mask
    #[inline]
    #[must_use]
    pub const fn id(&self) -> LocalMaskId {
        self.id
    }

    /// The voxel coordinates making up this mask
    #[inline]
    #[must_use]
    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    /// Detection confidence in `[0, 1]`
    #[inline]
    #[must_use]
    pub const fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Number of voxels in the mask
    #[inline]
    #[must_use]
    pub fn voxel_count(&self) -> usize {
        self.voxels.len()
    }

    /// Whether the mask has no geometry
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// Mean voxel position, `None` for an empty mask
    #[must_use]
    pub fn centroid(&self) -> Option<Point3> {
        if self.voxels.is_empty() {
            return None;
        }
        let mut sum = Point3::zero();
        for v in &self.voxels {
            sum = sum.add(Point3::new(
                f64::from(v[0]),
                f64::from(v[1]),
                f64::from(v[2]),
            ));
        }
        Some(sum.scale(1.0 / self.voxels.len() as f64))
    }

    /// Whether every voxel lies inside `shape`
    #[must_use]
    pub fn in_bounds(&self, shape: &VolumeShape) -> bool {
        self.voxels.iter().all(|v| shape.contains(*v))
    }
}
