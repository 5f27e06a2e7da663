//! Publication of committed segmentations to a remote content store
//!
//! Turns an in-memory [`Segmentation`](vcm_volume::Segmentation) and its
//! source image into two sealed remote arrays plus a viewer locator, without
//! assuming the store stays reachable for the whole upload.
//!
//! # Core Concepts
//!
//! - **Namespace**: the `collection/experiment/channel` triple addressing one
//!   remote array. Labels land next to their image under a derived channel.
//! - **Chunk**: one z slab of an array. Uploads happen per chunk, with
//!   bounded retries and doubling backoff on transient store failures.
//! - **Ledger**: per-segmentation record of the chunks that already landed.
//!   A publication that dies halfway resumes from the ledger instead of
//!   re-uploading everything.
//! - **Upload record**: the durable proof of a completed publication, with
//!   the locators a caller hands to downstream viewers.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod publisher;
mod store;

pub use publisher::{PublishConfig, PublishError, Publisher, UploadRecord};
pub use store::{
    ArrayKind, ChunkCoords, ChunkData, ContentStore, CreateOutcome, Namespace, StoreError,
};

/// Library version, mirrors the crate version in `Cargo.toml`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
