//! The result store
//!
//! One table pair (Segmentation, VolumeMatch) behind a single lock. Commits
//! are all-or-nothing: rows are validated fully staged, then spliced in
//! under one write guard, so a reader can never observe a partial result.
//! Write methods are crate-private; the execution engine owns the write
//! path, everyone else reads.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;
use vcm_match::{CommonMaskId, MatchOutcome};
use vcm_volume::{LocalMaskId, Mask, Segmentation, SegmentationId, VolumeId};

use crate::task::{MatchTaskKey, SegmentationTaskKey};

/// Identity of a committed VolumeMatch row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MatchId(pub Uuid);

impl MatchId {
    /// Mint a fresh random match id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for MatchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The committed result of one match task
#[derive(Debug, Clone, Serialize)]
pub struct VolumeMatch {
    id: MatchId,
    key: MatchTaskKey,
    outcome: MatchOutcome,
    executed_at: DateTime<Utc>,
    duration_secs: f64,
}

impl VolumeMatch {
    pub(crate) fn new(key: MatchTaskKey, outcome: MatchOutcome, duration_secs: f64) -> Self {
        Self {
            id: MatchId::new(),
            key,
            outcome,
            executed_at: Utc::now(),
            duration_secs,
        }
    }

    /// Row identity
    #[inline]
    #[must_use]
    pub const fn id(&self) -> MatchId {
        self.id
    }

    /// The task key this result belongs to
    #[inline]
    #[must_use]
    pub const fn key(&self) -> &MatchTaskKey {
        &self.key
    }

    /// Transformations, common masks and evidence rows
    #[inline]
    #[must_use]
    pub const fn outcome(&self) -> &MatchOutcome {
        &self.outcome
    }

    /// When the match completed
    #[inline]
    #[must_use]
    pub const fn executed_at(&self) -> DateTime<Utc> {
        self.executed_at
    }

    /// Wall-clock duration of the computation in seconds
    #[inline]
    #[must_use]
    pub const fn duration_secs(&self) -> f64 {
        self.duration_secs
    }
}

/// Structural rejection of a staged commit
///
/// Any of these means the commit wrote nothing.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// The task already has a committed result
    #[error("result already committed for this task")]
    AlreadyCommitted,

    /// Two staged masks share a local id
    #[error("duplicate local mask id {mask} in staged segmentation")]
    DuplicateMaskId { mask: LocalMaskId },

    /// A staged mask has no geometry
    #[error("staged mask {mask} has empty geometry")]
    EmptyMask { mask: LocalMaskId },

    /// A staged mask confidence is outside [0, 1]
    #[error("mask {mask} confidence {value} outside [0, 1]")]
    ConfidenceOutOfRange { mask: LocalMaskId, value: f32 },

    /// A match member has no committed segmentation to reference
    #[error("member volume {volume} has no committed segmentation")]
    MissingSegmentation { volume: VolumeId },

    /// A match member is missing its transformation
    #[error("no transformation staged for member volume {volume}")]
    MissingTransformation { volume: VolumeId },

    /// A transformation was staged for a volume outside the member set
    #[error("transformation staged for non-member volume {volume}")]
    ForeignTransformation { volume: VolumeId },

    /// Two common masks share an id
    #[error("duplicate common mask id {0}")]
    DuplicateCommonMask(CommonMaskId),

    /// An evidence row references an unknown common mask
    #[error("evidence row references unknown common mask {0}")]
    UnknownCommonMask(CommonMaskId),

    /// An evidence row references a volume outside the member set
    #[error("evidence row references non-member volume {volume}")]
    ForeignVolume { volume: VolumeId },

    /// An evidence row references a mask absent from the member's segmentation
    #[error("evidence row references unknown mask {mask} in volume {volume}")]
    DanglingMaskRef { volume: VolumeId, mask: LocalMaskId },

    /// A source mask appears in two evidence rows
    #[error("mask {mask} in volume {volume} assigned to two common masks")]
    DuplicateAssignment { volume: VolumeId, mask: LocalMaskId },
}

#[derive(Default)]
struct StoreInner {
    segmentations: HashMap<SegmentationTaskKey, Arc<Segmentation>>,
    seg_index: HashMap<SegmentationId, SegmentationTaskKey>,
    matches: HashMap<MatchTaskKey, Arc<VolumeMatch>>,
}

/// Committed results of executed tasks
///
/// Reads are lock-cheap `Arc` clones. Only the engine commits.
#[derive(Default)]
pub struct ResultStore {
    inner: RwLock<StoreInner>,
}

impl ResultStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and commit a segmentation result in one step
    pub(crate) fn commit_segmentation(
        &self,
        key: SegmentationTaskKey,
        masks: Vec<Mask>,
    ) -> Result<SegmentationId, CommitError> {
        let mut seen = HashSet::with_capacity(masks.len());
        for mask in &masks {
            if mask.is_empty() {
                return Err(CommitError::EmptyMask { mask: mask.id() });
            }
            if !(0.0..=1.0).contains(&mask.confidence()) {
                return Err(CommitError::ConfidenceOutOfRange {
                    mask: mask.id(),
                    value: mask.confidence(),
                });
            }
            if !seen.insert(mask.id()) {
                return Err(CommitError::DuplicateMaskId { mask: mask.id() });
            }
        }

        let mut inner = self.inner.write();
        if inner.segmentations.contains_key(&key) {
            return Err(CommitError::AlreadyCommitted);
        }
        let segmentation = Segmentation::new(key.volume, key.paramset, masks);
        let id = segmentation.id();
        inner.seg_index.insert(id, key);
        inner.segmentations.insert(key, Arc::new(segmentation));
        Ok(id)
    }

    /// Validate and commit a match result in one step
    pub(crate) fn commit_match(
        &self,
        key: MatchTaskKey,
        outcome: MatchOutcome,
        duration_secs: f64,
    ) -> Result<MatchId, CommitError> {
        let mut inner = self.inner.write();
        if inner.matches.contains_key(&key) {
            return Err(CommitError::AlreadyCommitted);
        }

        // Referential integrity against the member segmentations, all
        // checked before anything is inserted.
        let members: BTreeSet<VolumeId> = key.members().iter().copied().collect();
        let mut member_segs: HashMap<VolumeId, Arc<Segmentation>> = HashMap::new();
        for volume in &members {
            let seg_key = SegmentationTaskKey::new(*volume, key.paramset());
            let seg = inner
                .segmentations
                .get(&seg_key)
                .ok_or(CommitError::MissingSegmentation { volume: *volume })?;
            member_segs.insert(*volume, Arc::clone(seg));
        }

        for volume in outcome.transformations.keys() {
            if !members.contains(volume) {
                return Err(CommitError::ForeignTransformation { volume: *volume });
            }
        }
        for volume in &members {
            if !outcome.transformations.contains_key(volume) {
                return Err(CommitError::MissingTransformation { volume: *volume });
            }
        }

        let mut common_ids = BTreeSet::new();
        for id in &outcome.common_masks {
            if !common_ids.insert(*id) {
                return Err(CommitError::DuplicateCommonMask(*id));
            }
        }

        let mut assigned: HashSet<(VolumeId, LocalMaskId)> = HashSet::new();
        for row in &outcome.volume_masks {
            if !common_ids.contains(&row.common_mask) {
                return Err(CommitError::UnknownCommonMask(row.common_mask));
            }
            let seg = member_segs
                .get(&row.volume)
                .ok_or(CommitError::ForeignVolume { volume: row.volume })?;
            if seg.mask(row.local_mask).is_none() {
                return Err(CommitError::DanglingMaskRef {
                    volume: row.volume,
                    mask: row.local_mask,
                });
            }
            if !assigned.insert((row.volume, row.local_mask)) {
                return Err(CommitError::DuplicateAssignment {
                    volume: row.volume,
                    mask: row.local_mask,
                });
            }
        }

        let row = VolumeMatch::new(key.clone(), outcome, duration_secs);
        let id = row.id();
        inner.matches.insert(key, Arc::new(row));
        Ok(id)
    }

    /// The committed segmentation for a task key, if any
    #[must_use]
    pub fn segmentation(&self, key: &SegmentationTaskKey) -> Option<Arc<Segmentation>> {
        self.inner.read().segmentations.get(key).cloned()
    }

    /// Look up a committed segmentation by its row id
    #[must_use]
    pub fn segmentation_by_id(&self, id: SegmentationId) -> Option<Arc<Segmentation>> {
        let inner = self.inner.read();
        let key = inner.seg_index.get(&id)?;
        inner.segmentations.get(key).cloned()
    }

    /// Whether a task key has a committed segmentation
    #[must_use]
    pub fn has_segmentation(&self, key: &SegmentationTaskKey) -> bool {
        self.inner.read().segmentations.contains_key(key)
    }

    /// The committed match result for a task key, if any
    #[must_use]
    pub fn volume_match(&self, key: &MatchTaskKey) -> Option<Arc<VolumeMatch>> {
        self.inner.read().matches.get(key).cloned()
    }

    /// Number of committed segmentations
    #[must_use]
    pub fn segmentation_count(&self) -> usize {
        self.inner.read().segmentations.len()
    }

    /// Number of committed match results
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.inner.read().matches.len()
    }
}
