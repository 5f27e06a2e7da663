//! Task identities and records
//!
//! Tasks are keyed by natural composite keys, not minted ids: a
//! segmentation task *is* its `(volume, paramset)` pair, and a match task
//! *is* its member set plus paramset. Declaring the same work twice lands
//! on the same key, which is what makes declaration idempotent.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vcm_paramset::{ParamHash, ParamSetId};
use vcm_volume::VolumeId;

use crate::state::TaskState;

/// Caller-chosen label for a match group (e.g. one animal across weeks)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    /// Create a group label
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }
}

impl Display for GroupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Natural key of a segmentation task: one volume under one ParamSet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentationTaskKey {
    /// The volume to segment
    pub volume: VolumeId,
    /// The ParamSet the model runs under
    pub paramset: ParamSetId,
}

impl SegmentationTaskKey {
    /// Create a segmentation task key
    #[inline]
    #[must_use]
    pub const fn new(volume: VolumeId, paramset: ParamSetId) -> Self {
        Self { volume, paramset }
    }
}

impl Display for SegmentationTaskKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "seg:{}:{}", self.volume, self.paramset.short())
    }
}

/// Natural key of a match task: a member volume *set* plus ParamSet
///
/// Members are sorted and deduplicated on construction so that equal sets
/// always compare (and hash) equal regardless of declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchTaskKey {
    members: Vec<VolumeId>,
    paramset: ParamSetId,
}

impl MatchTaskKey {
    /// Build a key from member volumes, normalizing to a sorted set
    #[must_use]
    pub fn new(members: impl IntoIterator<Item = VolumeId>, paramset: ParamSetId) -> Self {
        let mut members: Vec<VolumeId> = members.into_iter().collect();
        members.sort_unstable();
        members.dedup();
        Self { members, paramset }
    }

    /// The member volumes, ascending
    #[inline]
    #[must_use]
    pub fn members(&self) -> &[VolumeId] {
        &self.members
    }

    /// The bound ParamSet
    #[inline]
    #[must_use]
    pub const fn paramset(&self) -> ParamSetId {
        self.paramset
    }

    /// Content digest over the sorted member set and paramset
    ///
    /// Stable across processes; used as the short log handle for the task.
    #[must_use]
    pub fn digest(&self) -> ParamHash {
        let mut bytes = Vec::with_capacity(self.members.len() * 16 + 32);
        for member in &self.members {
            bytes.extend_from_slice(member.0.as_bytes());
        }
        bytes.extend_from_slice(self.paramset.hash().as_bytes());
        ParamHash::compute(&bytes)
    }
}

impl Display for MatchTaskKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "match:{}[{} volumes]:{}",
            self.digest().short(),
            self.members.len(),
            self.paramset.short()
        )
    }
}

/// What kind of computation a task runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    /// Segment one volume
    Segmentation,
    /// Match segmentations across a volume group
    Match,
}

/// Identity of a declared task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskId {
    /// A segmentation task, identified by its natural key
    Segmentation(SegmentationTaskKey),
    /// A match task, identified by its normalized member set
    Match(MatchTaskKey),
}

impl TaskId {
    /// The computation kind behind this id
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        match self {
            TaskId::Segmentation(_) => TaskKind::Segmentation,
            TaskId::Match(_) => TaskKind::Match,
        }
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Segmentation(key) => Display::fmt(key, f),
            TaskId::Match(key) => Display::fmt(key, f),
        }
    }
}

impl From<SegmentationTaskKey> for TaskId {
    fn from(key: SegmentationTaskKey) -> Self {
        TaskId::Segmentation(key)
    }
}

impl From<MatchTaskKey> for TaskId {
    fn from(key: MatchTaskKey) -> Self {
        TaskId::Match(key)
    }
}

/// A declared task and its lifecycle bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// The task's natural key
    pub id: TaskId,
    /// Group label, set for match tasks only
    pub group: Option<GroupId>,
    /// Current lifecycle state
    pub state: TaskState,
    /// When the task was declared
    pub created_at: DateTime<Utc>,
    /// Number of times the task has been claimed
    pub attempts: u32,
}

impl TaskRecord {
    pub(crate) fn new(id: TaskId, group: Option<GroupId>) -> Self {
        Self {
            id,
            group,
            state: TaskState::Pending,
            created_at: Utc::now(),
            attempts: 0,
        }
    }
}
