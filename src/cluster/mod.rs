//! Agglomerative clustering of accessions, used for stratified sampling.
//!
//! Accessions stream in one at a time; each arrival becomes a singleton
//! cluster, and whenever the cluster count exceeds the target the two
//! nearest clusters merge. Candidate pairs wait in a min-heap; entries
//! referring to already-merged clusters are skipped lazily when popped,
//! and a merged cluster takes a fresh id so no stale pair can ever match
//! it by accident.

use std::cmp::Ordering as CmpOrdering;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use rand::Rng;

use crate::data::AccessionTable;
use crate::measures::{DistanceKind, PairDistance};

/// How the distance between two clusters is derived from the accession
/// distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClusterDistanceKind {
    /// Distance between the running centroid profiles.
    Centroid,
    /// Mean distance over all cross-cluster member pairs.
    GroupAverage,
}

/// Cluster-level distance on top of a memoized pairwise measure.
#[derive(Debug)]
pub struct ClusterDistance {
    kind: ClusterDistanceKind,
    pair: PairDistance,
}

impl ClusterDistance {
    pub fn new(kind: ClusterDistanceKind, distance: DistanceKind, accession_count: usize) -> Self {
        Self {
            kind,
            pair: PairDistance::with_capacity(distance, accession_count),
        }
    }

    fn needs_centroid(&self) -> bool {
        self.kind == ClusterDistanceKind::Centroid
    }

    fn between(&self, a: &AccessionCluster, b: &AccessionCluster, table: &AccessionTable) -> f64 {
        match self.kind {
            ClusterDistanceKind::Centroid => match (a.centroid(), b.centroid()) {
                (Some(ca), Some(cb)) => self.pair.kind().profile_distance(ca, cb),
                _ => 0.0,
            },
            ClusterDistanceKind::GroupAverage => {
                let mut sum = 0.0;
                for &x in a.members() {
                    for &y in b.members() {
                        sum += self.pair.between_ids(x, y, table);
                    }
                }
                sum / (a.size() * b.size()) as f64
            }
        }
    }
}

/// A cluster of accession ids with an optional running centroid profile.
#[derive(Debug, Clone)]
pub struct AccessionCluster {
    id: u64,
    members: Vec<usize>,
    centroid: Option<Vec<Vec<Option<f64>>>>,
}

impl AccessionCluster {
    fn new(id: u64, with_centroid: bool) -> Self {
        Self {
            id,
            members: Vec::new(),
            centroid: if with_centroid { Some(Vec::new()) } else { None },
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn centroid(&self) -> Option<&[Vec<Option<f64>>]> {
        self.centroid.as_deref()
    }

    /// Adds one member, folding its profile into the running centroid.
    fn absorb(&mut self, id: usize, table: &AccessionTable) {
        if let Some(centroid) = &mut self.centroid {
            let prev = self.members.len();
            let markers = table.get(id).markers();
            if prev == 0 {
                *centroid = markers.to_vec();
            } else {
                for (mean_alleles, new_alleles) in centroid.iter_mut().zip(markers.iter()) {
                    for (mean, new) in mean_alleles.iter_mut().zip(new_alleles.iter()) {
                        if let Some(new) = new {
                            *mean = match *mean {
                                Some(prev_mean) => {
                                    Some((prev_mean * prev as f64 + new) / (prev as f64 + 1.0))
                                }
                                None => Some(*new),
                            };
                        }
                    }
                }
            }
        }
        self.members.push(id);
    }

    fn merge(&mut self, other: AccessionCluster, table: &AccessionTable) {
        for id in other.members {
            self.absorb(id, table);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ClusterPair {
    a: u64,
    b: u64,
    dist: f64,
}

impl PartialEq for ClusterPair {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for ClusterPair {}

impl PartialOrd for ClusterPair {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClusterPair {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.dist.total_cmp(&other.dist)
    }
}

/// Incremental agglomerative clustering towards a target cluster count.
#[derive(Debug)]
pub struct Clustering {
    clusters: HashMap<u64, AccessionCluster>,
    heap: BinaryHeap<Reverse<ClusterPair>>,
    target: usize,
    dist: ClusterDistance,
    next_id: u64,
}

impl Clustering {
    pub fn new(target: usize, dist: ClusterDistance) -> Self {
        Self {
            clusters: HashMap::new(),
            heap: BinaryHeap::new(),
            target,
            dist,
            next_id: 0,
        }
    }

    pub fn reset(&mut self) {
        self.clusters.clear();
        self.heap.clear();
    }

    pub fn set_target(&mut self, target: usize) {
        self.target = target;
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn clusters(&self) -> impl Iterator<Item = &AccessionCluster> {
        self.clusters.values()
    }

    /// Inserts one accession as a singleton cluster and re-merges down to
    /// the target count if it was exceeded.
    pub fn add_accession(&mut self, id: usize, table: &AccessionTable) {
        let mut cluster = AccessionCluster::new(self.next_id, self.dist.needs_centroid());
        self.next_id += 1;
        cluster.absorb(id, table);
        self.enqueue_distances(&cluster, table);
        self.clusters.insert(cluster.id, cluster);
        while self.clusters.len() > self.target {
            self.merge_closest(table);
        }
    }

    fn enqueue_distances(&mut self, cluster: &AccessionCluster, table: &AccessionTable) {
        for (&cid, other) in &self.clusters {
            let dist = self.dist.between(cluster, other, table);
            self.heap.push(Reverse(ClusterPair {
                a: cid,
                b: cluster.id,
                dist,
            }));
        }
    }

    fn merge_closest(&mut self, table: &AccessionTable) {
        while let Some(Reverse(pair)) = self.heap.pop() {
            let Some(mut merged) = self.clusters.remove(&pair.a) else {
                continue;
            };
            let Some(other) = self.clusters.remove(&pair.b) else {
                self.clusters.insert(pair.a, merged);
                continue;
            };
            merged.merge(other, table);
            // fresh id invalidates every queued pair involving the parents
            merged.id = self.next_id;
            self.next_id += 1;
            self.enqueue_distances(&merged, table);
            self.clusters.insert(merged.id, merged);
            return;
        }
    }

    /// One uniformly chosen member per cluster.
    pub fn sample_stratified<R: Rng>(&self, rng: &mut R) -> Vec<usize> {
        self.clusters
            .values()
            .map(|c| c.members[rng.random_range(0..c.members.len())])
            .collect()
    }
}
