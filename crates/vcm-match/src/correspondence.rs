//! Grouping projected masks into common identities
//!
//! Candidate links connect masks from different volumes whose projected
//! centroids lie closer than the distance tolerance. Links are taken greedily
//! in descending confidence order and merged through a union-find; a link
//! that would put two masks of the same volume into one cluster is
//! dropped, leaving the lower-confidence mask unmatched. This step never
//! fails: worst case, every mask stays unmatched.

use std::collections::{BTreeSet, HashMap};

use vcm_volume::{LocalMaskId, Point3, VolumeId};

use crate::outcome::{CommonMaskId, VolumeMask};

/// One mask's centroid after projection into the reference frame
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProjectedMask {
    pub(crate) volume: VolumeId,
    pub(crate) mask: LocalMaskId,
    pub(crate) centroid: Point3,
}

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] == x {
            return x;
        }
        let root = self.find(self.parent[x]);
        self.parent[x] = root;
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let mut ra = self.find(a);
        let mut rb = self.find(b);
        if ra == rb {
            return;
        }
        if self.rank[ra] < self.rank[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        if self.rank[ra] == self.rank[rb] {
            self.rank[ra] = self.rank[ra].saturating_add(1);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CandidateLink {
    a: usize,
    b: usize,
    confidence: f32,
}

/// Group projected masks into clusters
///
/// `masks` must be sorted ascending by `(volume, mask)`; index order then
/// doubles as the deterministic tie-break order, and cluster numbering
/// follows each cluster's smallest member.
pub(crate) fn correspond(
    masks: &[ProjectedMask],
    tolerance: f64,
) -> (Vec<CommonMaskId>, Vec<VolumeMask>) {
    debug_assert!(masks.windows(2).all(|w| {
        (w[0].volume, w[0].mask) < (w[1].volume, w[1].mask)
    }));

    let links = candidate_links(masks, tolerance);

    let mut uf = UnionFind::new(masks.len());
    let mut volumes_in: HashMap<usize, BTreeSet<VolumeId>> = (0..masks.len())
        .map(|i| (i, BTreeSet::from([masks[i].volume])))
        .collect();
    // Confidence of the first (strongest) accepted link touching each mask.
    let mut link_confidence: Vec<Option<f32>> = vec![None; masks.len()];

    for link in links {
        let ra = uf.find(link.a);
        let rb = uf.find(link.b);
        if ra == rb {
            continue;
        }
        let disjoint = match (volumes_in.get(&ra), volumes_in.get(&rb)) {
            (Some(sa), Some(sb)) => sa.is_disjoint(sb),
            _ => false,
        };
        if !disjoint {
            // Would put two masks of one volume into the same cluster.
            continue;
        }
        uf.union(ra, rb);
        let root = uf.find(ra);
        let mut merged = volumes_in.remove(&ra).unwrap_or_default();
        merged.extend(volumes_in.remove(&rb).unwrap_or_default());
        volumes_in.insert(root, merged);
        for idx in [link.a, link.b] {
            if link_confidence[idx].is_none() {
                link_confidence[idx] = Some(link.confidence);
            }
        }
    }

    let mut members_of: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut root_order: Vec<usize> = Vec::new();
    for i in 0..masks.len() {
        let root = uf.find(i);
        let members = members_of.entry(root).or_default();
        if members.is_empty() {
            root_order.push(root);
        }
        members.push(i);
    }

    let mut common_masks = Vec::new();
    let mut volume_masks = Vec::new();
    for root in root_order {
        let members = &members_of[&root];
        if members.len() < 2 {
            continue;
        }
        let id = CommonMaskId(common_masks.len() as u32);
        common_masks.push(id);
        for &i in members {
            volume_masks.push(VolumeMask {
                common_mask: id,
                volume: masks[i].volume,
                local_mask: masks[i].mask,
                confidence: link_confidence[i].unwrap_or(0.0),
            });
        }
    }
    (common_masks, volume_masks)
}

fn candidate_links(masks: &[ProjectedMask], tolerance: f64) -> Vec<CandidateLink> {
    let mut links = Vec::new();
    for a in 0..masks.len() {
        for b in (a + 1)..masks.len() {
            if masks[a].volume == masks[b].volume {
                continue;
            }
            let d = masks[a].centroid.distance(masks[b].centroid);
            // Strict: a pair exactly at tolerance would carry confidence 0.
            if d < tolerance {
                let confidence = (1.0 - d / tolerance).clamp(0.0, 1.0) as f32;
                links.push(CandidateLink { a, b, confidence });
            }
        }
    }
    // Strongest first; ties resolve by the smallest endpoint pair.
    links.sort_by(|x, y| {
        y.confidence
            .total_cmp(&x.confidence)
            .then_with(|| (x.a, x.b).cmp(&(y.a, y.b)))
    });
    links
}
