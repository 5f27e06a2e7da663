//! Segmentation component
//!
//! Wraps the external segmentation model behind the [`Segmenter`] trait and
//! turns its raw output into validated [`vcm_volume::Mask`] records: empty
//! masks dropped, geometry bounds-checked, labels unique, confidences
//! normalized. One invocation serves one `(volume, paramset)` pair.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod component;
mod segmenter;

pub use component::{SegmentError, SegmentationComponent};
pub use segmenter::{RawMask, Segmenter, SegmenterError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
