//! Volume metadata and the volume access boundary

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::geometry::Voxel;
use crate::ids::{SessionId, VolumeId};

/// Volume image data, (z, y, x) indexed
pub type VolumeImage = ndarray::Array3<u16>;

/// Dense label array produced from a segmentation, (z, y, x) indexed,
/// value 0 = background
pub type LabelVolume = ndarray::Array3<u32>;

/// Voxel dimensions of a volume in (z, y, x) order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeShape {
    /// Slice count along the optical axis
    pub z: u32,
    /// Rows per slice
    pub y: u32,
    /// Columns per slice
    pub x: u32,
}

impl VolumeShape {
    /// Create a shape from (z, y, x) voxel counts
    #[inline]
    #[must_use]
    pub const fn new(z: u32, y: u32, x: u32) -> Self {
        Self { z, y, x }
    }

    /// Whether a voxel coordinate lies inside this shape
    #[inline]
    #[must_use]
    pub const fn contains(&self, voxel: Voxel) -> bool {
        voxel[0] < self.z && voxel[1] < self.y && voxel[2] < self.x
    }

    /// Total voxel count
    #[inline]
    #[must_use]
    pub const fn voxel_count(&self) -> u64 {
        self.z as u64 * self.y as u64 * self.x as u64
    }

    /// Shape as an ndarray dimension tuple
    #[inline]
    #[must_use]
    pub const fn as_dim(&self) -> (usize, usize, usize) {
        (self.z as usize, self.y as usize, self.x as usize)
    }
}

/// Physical voxel size in micrometres
///
/// Width/height/depth are the x/y/z extents of one voxel, matching the
/// acquisition metadata convention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelSize {
    /// Voxel extent along x
    pub width_um: f64,
    /// Voxel extent along y
    pub height_um: f64,
    /// Voxel extent along z
    pub depth_um: f64,
}

impl VoxelSize {
    /// Create a voxel size from x/y/z extents in micrometres
    #[inline]
    #[must_use]
    pub const fn new(width_um: f64, height_um: f64, depth_um: f64) -> Self {
        Self {
            width_um,
            height_um,
            depth_um,
        }
    }

    /// Extents reordered to (z, y, x), the order content stores expect
    #[inline]
    #[must_use]
    pub const fn zyx(&self) -> [f64; 3] {
        [self.depth_um, self.height_um, self.width_um]
    }
}

/// Acquisition metadata for one volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// The volume's identity
    pub id: VolumeId,
    /// The acquisition session this volume was imaged in
    pub session: SessionId,
    /// Acquisition channel name, e.g. `"GCaMP6"`
    pub channel: String,
    /// Voxel dimensions
    pub shape: VolumeShape,
    /// Physical voxel size
    pub voxel_size: VoxelSize,
}

/// Errors from the volume access boundary
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    /// No volume registered under this id
    #[error("unknown volume {0}")]
    UnknownVolume(VolumeId),

    /// The backing store failed to produce the data
    #[error("volume backend error: {0}")]
    Backend(String),
}

/// Read access to acquired volumes
///
/// Implementations wrap whatever holds the acquired data (an in-memory
/// fixture in tests, an imaging database in production). The pipeline only
/// ever reads through this boundary.
#[async_trait]
pub trait VolumeProvider: Send + Sync {
    /// Acquisition metadata for a volume
    async fn info(&self, volume: VolumeId) -> Result<VolumeInfo, VolumeError>;

    /// The full image data for a volume
    async fn image(&self, volume: VolumeId) -> Result<VolumeImage, VolumeError>;
}
