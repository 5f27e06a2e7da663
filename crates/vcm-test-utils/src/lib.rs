//! Testing utilities for the VCM workspace
//!
//! Shared fixtures and in-memory doubles for the capability seams.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use vcm_paramset::ParamContent;
use vcm_publish::{ChunkCoords, ChunkData, ContentStore, CreateOutcome, Namespace, StoreError};
use vcm_segment::{RawMask, Segmenter, SegmenterError};
use vcm_volume::{
    SessionId, VolumeError, VolumeId, VolumeImage, VolumeInfo, VolumeProvider, VolumeShape, Voxel,
    VoxelSize,
};

/// Installs a fmt subscriber once per process, honouring `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    static GUARD: OnceCell<()> = OnceCell::new();
    GUARD.get_or_init(|| {
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::from_default_env())
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .init();
    });
}

pub fn volume_info(id: VolumeId, session: SessionId, shape: VolumeShape) -> VolumeInfo {
    VolumeInfo {
        id,
        session,
        channel: "ch0".to_string(),
        shape,
        voxel_size: VoxelSize::new(0.5, 0.5, 1.0),
    }
}

pub fn flat_image(shape: &VolumeShape, value: u16) -> VolumeImage {
    VolumeImage::from_elem(shape.as_dim(), value)
}

/// An axis-aligned cube of voxels, handy for scripting segmenter output.
pub fn cube(corner: Voxel, edge: u32) -> Vec<Voxel> {
    let mut voxels = Vec::new();
    for dz in 0..edge {
        for dy in 0..edge {
            for dx in 0..edge {
                voxels.push([corner[0] + dz, corner[1] + dy, corner[2] + dx]);
            }
        }
    }
    voxels
}

pub fn raw_mask(label: u32, voxels: Vec<Voxel>) -> RawMask {
    RawMask {
        label,
        voxels,
        confidence: None,
    }
}

/// Volume provider backed by a plain map.
#[derive(Default)]
pub struct InMemoryVolumes {
    volumes: Mutex<HashMap<VolumeId, (VolumeInfo, VolumeImage)>>,
}

impl InMemoryVolumes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, info: VolumeInfo, image: VolumeImage) {
        self.volumes.lock().insert(info.id, (info, image));
    }
}

#[async_trait]
impl VolumeProvider for InMemoryVolumes {
    async fn info(&self, volume: VolumeId) -> Result<VolumeInfo, VolumeError> {
        self.volumes
            .lock()
            .get(&volume)
            .map(|(info, _)| info.clone())
            .ok_or(VolumeError::UnknownVolume(volume))
    }

    async fn image(&self, volume: VolumeId) -> Result<VolumeImage, VolumeError> {
        self.volumes
            .lock()
            .get(&volume)
            .map(|(_, image)| image.clone())
            .ok_or(VolumeError::UnknownVolume(volume))
    }
}

/// Segmenter that replays pre-scripted masks per volume.
///
/// Counts calls and optionally fails the next N of them, so tests can
/// observe at-most-once execution and retry behaviour.
#[derive(Default)]
pub struct ScriptedSegmenter {
    outputs: Mutex<HashMap<VolumeId, Vec<RawMask>>>,
    calls: AtomicUsize,
    failures_left: AtomicUsize,
}

impl ScriptedSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, volume: VolumeId, masks: Vec<RawMask>) {
        self.outputs.lock().insert(volume, masks);
    }

    pub fn inject_failures(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Segmenter for ScriptedSegmenter {
    async fn segment(
        &self,
        info: &VolumeInfo,
        _image: &VolumeImage,
        _params: &ParamContent,
    ) -> Result<Vec<RawMask>, SegmenterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok()
        {
            return Err(SegmenterError::unavailable("model endpoint offline"));
        }
        self.outputs
            .lock()
            .get(&info.id)
            .cloned()
            .ok_or_else(|| SegmenterError::rejected(format!("no scripted output for {}", info.id)))
    }
}

/// Content store that keeps everything in maps.
///
/// `fail_uploads_after(n)` makes every upload fail once `n` distinct chunks
/// have landed, which is how tests simulate a store dying mid-publication.
#[derive(Default)]
pub struct InMemoryContentStore {
    namespaces: Mutex<HashSet<Namespace>>,
    chunks: Mutex<HashMap<(Namespace, ChunkCoords), ChunkData>>,
    fail_after: Mutex<Option<usize>>,
    upload_calls: AtomicUsize,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace_exists(&self, ns: &Namespace) -> bool {
        self.namespaces.lock().contains(ns)
    }

    pub fn chunk_count(&self, ns: &Namespace) -> usize {
        self.chunks
            .lock()
            .keys()
            .filter(|(stored, _)| stored == ns)
            .count()
    }

    pub fn chunk(&self, ns: &Namespace, coords: ChunkCoords) -> Option<ChunkData> {
        self.chunks.lock().get(&(ns.clone(), coords)).cloned()
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn fail_uploads_after(&self, n: usize) {
        *self.fail_after.lock() = Some(n);
    }

    pub fn heal(&self) {
        *self.fail_after.lock() = None;
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn create_namespace(&self, ns: &Namespace) -> Result<CreateOutcome, StoreError> {
        if self.namespaces.lock().insert(ns.clone()) {
            Ok(CreateOutcome::Created)
        } else {
            Ok(CreateOutcome::AlreadyExists)
        }
    }

    async fn upload_chunk(
        &self,
        ns: &Namespace,
        coords: ChunkCoords,
        data: ChunkData,
    ) -> Result<(), StoreError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let mut chunks = self.chunks.lock();
        if let Some(limit) = *self.fail_after.lock() {
            if chunks.len() >= limit {
                return Err(StoreError::unavailable("store went away mid-publish"));
            }
        }
        chunks.insert((ns.clone(), coords), data);
        Ok(())
    }

    async fn finalize(&self, ns: &Namespace) -> Result<String, StoreError> {
        if !self.namespace_exists(ns) {
            return Err(StoreError::rejected(format!("unknown namespace {ns}")));
        }
        Ok(format!("https://store.test/{ns}"))
    }

    async fn visualization_url(&self, ns: &Namespace) -> Result<String, StoreError> {
        Ok(format!("https://viewer.test/{ns}"))
    }
}
