//! The remote content-store boundary

use std::fmt::{self, Display, Formatter};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vcm_volume::{LabelVolume, VolumeImage};

/// Remote addressing triple for one uploaded array
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    /// Top-level grouping, usually one project
    pub collection: String,
    /// One experiment within the collection
    pub experiment: String,
    /// One array within the experiment
    pub channel: String,
}

impl Namespace {
    /// Build a namespace from its three components
    pub fn new(
        collection: impl Into<String>,
        experiment: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            experiment: experiment.into(),
            channel: channel.into(),
        }
    }

    /// The channel name carrying this namespace's mask labels
    #[must_use]
    pub fn label_channel(&self) -> String {
        format!("{}--seg", self.channel)
    }

    /// The sibling namespace holding the mask label array
    #[must_use]
    pub fn for_labels(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            experiment: self.experiment.clone(),
            channel: self.label_channel(),
        }
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.collection, self.experiment, self.channel)
    }
}

/// Z-extent of one uploaded slab, end exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkCoords {
    /// First z slice in the slab
    pub z_start: u32,
    /// One past the last z slice
    pub z_end: u32,
}

impl Display for ChunkCoords {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "z[{}..{})", self.z_start, self.z_end)
    }
}

/// Which of the two published arrays a chunk belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayKind {
    /// The acquired volume image
    Image,
    /// The rasterized mask labels
    Labels,
}

/// One slab of array data, owned so the upload can retry it
#[derive(Debug, Clone)]
pub enum ChunkData {
    /// Image intensities for the slab
    Image(VolumeImage),
    /// Label values for the slab
    Labels(LabelVolume),
}

/// Result of a namespace creation attempt
///
/// Concurrent creators racing on one namespace both succeed; the loser
/// simply observes `AlreadyExists`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// This call created the namespace
    Created,
    /// The namespace was already there
    AlreadyExists,
}

/// Raised by the content-store boundary
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached or is overloaded; retryable
    #[error("content store unavailable: {reason}")]
    Unavailable {
        /// What the store client reported
        reason: String,
    },
    /// The store refused the request; retrying the same request cannot help
    #[error("content store rejected the request: {reason}")]
    Rejected {
        /// What the store client reported
        reason: String,
    },
}

impl StoreError {
    /// A retryable availability failure
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// A non-retryable rejection
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// The remote content store, treated as a black box
///
/// Chunk uploads must be idempotent per `(namespace, coords)`; the
/// publisher may deliver a chunk more than once when racing itself.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Create a namespace, tolerating concurrent creators
    async fn create_namespace(&self, ns: &Namespace) -> Result<CreateOutcome, StoreError>;

    /// Upload one slab of array data
    async fn upload_chunk(
        &self,
        ns: &Namespace,
        coords: ChunkCoords,
        data: ChunkData,
    ) -> Result<(), StoreError>;

    /// Seal the uploaded array and return its public locator
    async fn finalize(&self, ns: &Namespace) -> Result<String, StoreError>;

    /// A viewer locator for the sealed array
    async fn visualization_url(&self, ns: &Namespace) -> Result<String, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_namespace_derives_from_channel() {
        let ns = Namespace::new("lab", "exp7", "GCaMP6");
        let labels = ns.for_labels();
        assert_eq!(labels.channel, "GCaMP6--seg");
        assert_eq!(labels.collection, ns.collection);
        assert_eq!(labels.to_string(), "lab/exp7/GCaMP6--seg");
    }
}
