//! VCM volume domain vocabulary
//!
//! The shared types every pipeline stage speaks: volumes and their
//! acquisition metadata, segmented masks, committed segmentations, and the
//! read-only [`VolumeProvider`] boundary to wherever the image data lives.
//!
//! # Core Concepts
//!
//! - [`VolumeId`] / [`SessionId`]: identities of acquisitions
//! - [`VolumeInfo`]: shape, channel and physical voxel size of one volume
//! - [`Mask`]: one segmented structure (voxel list + confidence)
//! - [`Segmentation`]: committed per-volume result, masks sorted by id
//! - [`VolumeProvider`]: async boundary to the acquired image data

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod geometry;
mod ids;
mod mask;
mod segmentation;
mod volume;

pub use geometry::{centroid_of, Point3, Voxel};
pub use ids::{LocalMaskId, SegmentationId, SessionId, VolumeId};
pub use mask::Mask;
pub use segmentation::Segmentation;
pub use volume::{
    LabelVolume, VolumeError, VolumeImage, VolumeInfo, VolumeProvider, VolumeShape, VoxelSize,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
