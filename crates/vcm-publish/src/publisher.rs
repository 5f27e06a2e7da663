//! Resumable chunked publication of committed segmentations

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use ndarray::s;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use vcm_volume::{LocalMaskId, Segmentation, SegmentationId, VolumeImage, VolumeShape};

use crate::store::{
    ArrayKind, ChunkCoords, ChunkData, ContentStore, CreateOutcome, Namespace, StoreError,
};

/// Tuning knobs for the publication pipeline
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Z extent of each uploaded slab
    pub chunk_depth: u32,
    /// Upload attempts per chunk before giving up
    pub max_attempts: u32,
    /// Delay before the first retry, doubled after each failure
    pub retry_backoff: Duration,
    /// Chunk uploads allowed in flight at once
    pub max_concurrent_chunks: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            chunk_depth: 16,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(250),
            max_concurrent_chunks: 4,
        }
    }
}

/// Proof that one segmentation reached the content store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// The published segmentation
    pub segmentation: SegmentationId,
    /// Collection the arrays were written into
    pub collection: String,
    /// Experiment the arrays were written into
    pub experiment: String,
    /// Channel holding the image array
    pub channel: String,
    /// Public locator of the sealed image array
    pub image_url: String,
    /// Viewer locator for inspecting the published arrays
    pub neuroglancer_url: String,
}

/// Raised when a publication cannot complete
#[derive(Debug, Error)]
pub enum PublishError {
    /// The store stayed unavailable through every allowed attempt
    #[error("content store unavailable after {attempts} attempt(s): {reason}")]
    Store {
        /// Attempts made before giving up
        attempts: u32,
        /// What the store reported on the last attempt
        reason: String,
    },
    /// The store refused the publication outright
    #[error("content store rejected the publication: {reason}")]
    Rejected {
        /// What the store reported
        reason: String,
    },
    /// A mask holds voxels outside the image being published
    #[error("mask {mask} lies outside the published image bounds")]
    ShapeMismatch {
        /// The offending mask
        mask: LocalMaskId,
    },
}

impl PublishError {
    /// Whether re-running the publication could succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. })
    }
}

impl From<StoreError> for PublishError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable { reason } => Self::Store { attempts: 1, reason },
            StoreError::Rejected { reason } => Self::Rejected { reason },
        }
    }
}

/// Uploads segmentations and their source images to a content store
///
/// Publication is idempotent per segmentation: a second call for an already
/// published segmentation returns the stored [`UploadRecord`] without
/// touching the store. Interrupted publications leave a chunk ledger behind,
/// so the next attempt uploads only the chunks that never landed. Concurrent
/// callers may race on the uploads (the store contract makes chunk writes
/// idempotent) but always converge on a single record.
pub struct Publisher {
    store: Arc<dyn ContentStore>,
    config: PublishConfig,
    ledger: DashMap<SegmentationId, HashSet<(ArrayKind, u32)>>,
    records: DashMap<SegmentationId, UploadRecord>,
}

impl Publisher {
    /// Build a publisher over `store`
    pub fn new(store: Arc<dyn ContentStore>, config: PublishConfig) -> Self {
        Self {
            store,
            config,
            ledger: DashMap::new(),
            records: DashMap::new(),
        }
    }

    /// The active configuration
    #[must_use]
    pub const fn config(&self) -> &PublishConfig {
        &self.config
    }

    /// The upload record for a segmentation, if it was published
    #[must_use]
    pub fn record(&self, segmentation: SegmentationId) -> Option<UploadRecord> {
        self.records.get(&segmentation).map(|r| r.clone())
    }

    /// Publish a segmentation and its source image
    ///
    /// Writes the image into `namespace` and the rasterised mask labels into
    /// the derived label namespace, both in z slabs of `chunk_depth` slices.
    /// Each chunk upload retries transient store failures with doubling
    /// backoff; a chunk that exhausts its attempts aborts the publication,
    /// leaving completed chunks recorded for the next attempt.
    pub async fn publish(
        &self,
        segmentation: &Segmentation,
        image: &VolumeImage,
        namespace: &Namespace,
    ) -> Result<UploadRecord, PublishError> {
        let seg_id = segmentation.id();
        if let Some(record) = self.records.get(&seg_id) {
            debug!(segmentation = %seg_id, "already published, reusing record");
            return Ok(record.clone());
        }

        let (z, y, x) = image.dim();
        let shape = VolumeShape::new(z as u32, y as u32, x as u32);
        if let Some(mask) = segmentation.masks().iter().find(|m| !m.in_bounds(&shape)) {
            return Err(PublishError::ShapeMismatch { mask: mask.id() });
        }
        let labels = segmentation.label_volume(&shape);
        let labels_ns = namespace.for_labels();

        for ns in [namespace, &labels_ns] {
            match self.store.create_namespace(ns).await? {
                CreateOutcome::Created => info!(%ns, "created namespace"),
                CreateOutcome::AlreadyExists => debug!(%ns, "namespace already present"),
            }
        }

        let done = self
            .ledger
            .get(&seg_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let mut jobs = Vec::new();
        for (index, coords) in chunk_bounds(shape.z, self.config.chunk_depth)
            .into_iter()
            .enumerate()
        {
            let index = index as u32;
            let z_range = coords.z_start as usize..coords.z_end as usize;
            if !done.contains(&(ArrayKind::Image, index)) {
                let slab = image.slice(s![z_range.clone(), .., ..]).to_owned();
                jobs.push(self.upload_with_retry(
                    seg_id,
                    namespace,
                    ArrayKind::Image,
                    index,
                    coords,
                    ChunkData::Image(slab),
                ));
            }
            if !done.contains(&(ArrayKind::Labels, index)) {
                let slab = labels.slice(s![z_range, .., ..]).to_owned();
                jobs.push(self.upload_with_retry(
                    seg_id,
                    &labels_ns,
                    ArrayKind::Labels,
                    index,
                    coords,
                    ChunkData::Labels(slab),
                ));
            }
        }
        let pending = jobs.len();
        let mut uploads =
            stream::iter(jobs).buffer_unordered(self.config.max_concurrent_chunks.max(1));
        while let Some(result) = uploads.next().await {
            result?;
        }
        drop(uploads);

        let image_url = self.store.finalize(namespace).await?;
        self.store.finalize(&labels_ns).await?;
        let neuroglancer_url = self.store.visualization_url(namespace).await?;

        let record = UploadRecord {
            segmentation: seg_id,
            collection: namespace.collection.clone(),
            experiment: namespace.experiment.clone(),
            channel: namespace.channel.clone(),
            image_url,
            neuroglancer_url,
        };
        let record = self.records.entry(seg_id).or_insert(record).clone();
        self.ledger.remove(&seg_id);
        info!(
            segmentation = %seg_id,
            %namespace,
            chunks = pending,
            "publication complete"
        );
        Ok(record)
    }

    async fn upload_with_retry(
        &self,
        segmentation: SegmentationId,
        ns: &Namespace,
        kind: ArrayKind,
        index: u32,
        coords: ChunkCoords,
        data: ChunkData,
    ) -> Result<(), PublishError> {
        let mut attempt = 1u32;
        let mut backoff = self.config.retry_backoff;
        loop {
            match self.store.upload_chunk(ns, coords, data.clone()).await {
                Ok(()) => {
                    self.ledger
                        .entry(segmentation)
                        .or_default()
                        .insert((kind, index));
                    debug!(%ns, %coords, ?kind, "chunk uploaded");
                    return Ok(());
                }
                Err(StoreError::Rejected { reason }) => {
                    return Err(PublishError::Rejected { reason });
                }
                Err(StoreError::Unavailable { reason }) => {
                    if attempt >= self.config.max_attempts {
                        return Err(PublishError::Store {
                            attempts: attempt,
                            reason,
                        });
                    }
                    warn!(%ns, %coords, attempt, %reason, "chunk upload failed, retrying");
                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }
}

/// Z slabs covering `depth` slices in steps of `chunk_depth`
fn chunk_bounds(depth: u32, chunk_depth: u32) -> Vec<ChunkCoords> {
    let step = chunk_depth.max(1);
    let mut coords = Vec::new();
    let mut z = 0;
    while z < depth {
        coords.push(ChunkCoords {
            z_start: z,
            z_end: z.saturating_add(step).min(depth),
        });
        z = z.saturating_add(step);
    }
    coords
}
