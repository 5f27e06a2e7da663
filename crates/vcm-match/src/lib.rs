//! Cross-volume mask matching
//!
//! # Core Concepts
//!
//! - **Registration**: align each member volume to a deterministic
//!   reference frame (the lowest [`vcm_volume::VolumeId`] in the group)
//! - **Projection**: carry every mask centroid into that frame
//! - **Correspondence**: link nearby centroids across volumes and fold the
//!   links into clusters, each cluster becoming one [`CommonMaskId`]
//!
//! Registration failures abort a match with nothing persisted; the
//! correspondence step never fails, it just leaves masks unmatched.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod config;
mod correspondence;
mod matcher;
mod outcome;
mod registration;
mod transform;

pub use config::{ConfigError, MatchConfig};
pub use matcher::{MatchError, VolumeMatcher};
pub use outcome::{CommonMaskId, MatchOutcome, VolumeMask};
pub use registration::{CentroidAlignment, RegistrationAlgorithm, RegistrationError};
pub use transform::AffineTransform;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
