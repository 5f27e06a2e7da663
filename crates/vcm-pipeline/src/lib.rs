//! End-to-end assembly of the volumetric cell matching pipeline
//!
//! Wires the component crates into one facade: parameter bundles go in,
//! segmentation and match tasks run at most once each, and committed
//! segmentations publish to a content store with resumable uploads.
//!
//! # Core Concepts
//!
//! - **Facade**: [`Pipeline`] owns the registry, engine and publisher;
//!   callers inject the volume provider, segmenter and content store.
//! - **Runner**: [`PipelineRunner`] is the engine's worker. It resolves a
//!   claimed task to the right component and maps component failures onto
//!   the engine's retry taxonomy.
//!
//! # Example
//!
//! ```rust,ignore
//! use vcm_paramset::ParamContent;
//! use vcm_pipeline::Pipeline;
//!
//! # async fn example() -> Result<(), vcm_pipeline::PipelineError> {
//! let pipeline = Pipeline::new(provider, segmenter, store);
//! let params = pipeline.register_paramset("prod", 1, "", ParamContent::new())?;
//! let task = pipeline.declare_segmentation(volume, params);
//! pipeline.execute(&task).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod pipeline;
mod runner;

pub use pipeline::{Pipeline, PipelineError};
pub use runner::PipelineRunner;

/// Library version, mirrors the crate version in `Cargo.toml`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
