//! Result rows produced by one match task

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use vcm_volume::{LocalMaskId, VolumeId};

use crate::transform::AffineTransform;

/// Identity of one matched cell cluster, unique within a match task
///
/// Numbering is deterministic for a given input: clusters are numbered in
/// ascending order of their smallest `(volume, mask)` member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommonMaskId(pub u32);

impl Display for CommonMaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "cm-{}", self.0)
    }
}

/// Evidence linking a common identity back to one volume's local mask
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeMask {
    /// The cluster this mask belongs to
    pub common_mask: CommonMaskId,
    /// The member volume the mask was segmented in
    pub volume: VolumeId,
    /// The mask's label within that volume's segmentation
    pub local_mask: LocalMaskId,
    /// Geometric link confidence in `[0, 1]`
    pub confidence: f32,
}

/// Everything one match task produces, committed as a unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// Per-member map into the reference frame; identity for the reference
    pub transformations: BTreeMap<VolumeId, AffineTransform>,
    /// Matched clusters, in deterministic numbering order
    pub common_masks: Vec<CommonMaskId>,
    /// One row per matched mask; unmatched masks are absent
    pub volume_masks: Vec<VolumeMask>,
}

impl MatchOutcome {
    /// Rows belonging to one cluster
    pub fn masks_of(&self, id: CommonMaskId) -> impl Iterator<Item = &VolumeMask> {
        self.volume_masks.iter().filter(move |m| m.common_mask == id)
    }
}
