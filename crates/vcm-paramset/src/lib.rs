//! VCM ParamSet Registry
//!
//! Content-addressed segmentation parameter bundles.
//!
//! # Core Concepts
//!
//! - [`ParamSet`]: Immutable named bundle of segmentation parameters
//! - [`ParamHash`]: 32-byte Blake3 hash over the canonical content encoding
//! - [`ParamSetId`]: Identity of a bundle, equal iff its content is equal
//! - [`ParamSetRegistry`]: Idempotent registration with conflict detection
//!
//! Identity is derived from content, never from registration order: the
//! canonical encoding sorts keys at every nesting level, so
//! `{"a": 1, "b": 2}` and `{"b": 2, "a": 1}` are the same ParamSet.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod hash;
mod paramset;
mod registry;

pub use hash::{HashError, ParamHash};
pub use paramset::{canonical_hash, ParamContent, ParamSet, ParamSetId};
pub use registry::{ParamSetError, ParamSetRegistry};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
