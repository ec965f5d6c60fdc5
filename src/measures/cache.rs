//! Incremental scoring state.
//!
//! Re-scoring a subset after a single-accession move must not cost O(|S|²).
//! Every measure therefore keeps an aggregate state next to the previously
//! scored subset, and folds only the membership difference into it. The
//! state lives in a [`ScoreCache`] owned by exactly one replica and passed
//! explicitly to every `calculate` call, so no synchronization is needed on
//! the aggregates themselves.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque per-run cache identity.
///
/// Aggregate state is only meaningful while reused under the same id; a
/// fresh id always starts from an empty subset. The id itself is purely
/// diagnostic; the state travels inside the [`ScoreCache`] handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheId(u64);

impl CacheId {
    /// Allocates the next run-scoped id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        CacheId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache:{}", self.0)
    }
}

/// Membership difference between the previously scored subset and the
/// current one.
#[derive(Debug, Default)]
pub(crate) struct SubsetDiff {
    pub added: Vec<usize>,
    pub removed: Vec<usize>,
    pub common: Vec<usize>,
}

/// The subset a cache entry last aggregated, kept sorted for O(n) diffing.
#[derive(Debug, Default)]
pub(crate) struct PrevSubset {
    ids: Vec<usize>,
}

impl PrevSubset {
    pub fn diff(&self, current: &[usize]) -> SubsetDiff {
        let mut cur: Vec<usize> = current.to_vec();
        cur.sort_unstable();
        let mut diff = SubsetDiff::default();
        let (mut i, mut j) = (0, 0);
        while i < self.ids.len() && j < cur.len() {
            match self.ids[i].cmp(&cur[j]) {
                std::cmp::Ordering::Less => {
                    diff.removed.push(self.ids[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    diff.added.push(cur[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    diff.common.push(cur[j]);
                    i += 1;
                    j += 1;
                }
            }
        }
        diff.removed.extend_from_slice(&self.ids[i..]);
        diff.added.extend_from_slice(&cur[j..]);
        diff
    }

    /// Commits the current subset as the new baseline.
    pub fn replace(&mut self, current: &[usize]) {
        self.ids.clear();
        self.ids.extend_from_slice(current);
        self.ids.sort_unstable();
    }
}

/// Ordering key for a non-negative distance value.
///
/// For non-negative IEEE doubles the raw bit pattern orders exactly like
/// the numeric value, which makes a plain `BTreeMap` usable as the sorted
/// multiset required by minimum aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct DistKey(u64);

impl DistKey {
    pub fn new(d: f64) -> Self {
        debug_assert!(d >= 0.0);
        DistKey(d.to_bits())
    }

    pub fn value(self) -> f64 {
        f64::from_bits(self.0)
    }
}

/// Aggregate state of one measure under one cache id.
#[derive(Debug)]
pub enum MeasureState {
    /// Running sum and pair count of pairwise distances (mean aggregation).
    MeanDistance {
        prev: PrevSubset,
        total: f64,
        count: f64,
    },
    /// Sorted multiset of pairwise distances (minimum aggregation);
    /// zero-count keys are evicted, the minimum is the smallest key.
    MinDistance {
        prev: PrevSubset,
        counts: BTreeMap<DistKey, usize>,
    },
    /// Flat per-allele frequency totals plus their grand total.
    AlleleTotals {
        prev: PrevSubset,
        totals: Vec<f64>,
        total: f64,
    },
    /// Per-marker, per-allele frequency totals.
    MarkerTotals {
        prev: PrevSubset,
        totals: Vec<Vec<f64>>,
    },
    /// Per-allele presence counts (frequency > 0).
    AlleleCounts {
        prev: PrevSubset,
        counts: Vec<i64>,
    },
    /// Running sum of external distances.
    ExternalSum { prev: PrevSubset, sum: f64 },
}

/// Per-replica incremental scoring handle for one [`PseudoMeasure`].
///
/// Holds one [`MeasureState`] per registered measure, in registration
/// order. Never shared between replicas.
///
/// [`PseudoMeasure`]: crate::measures::PseudoMeasure
#[derive(Debug)]
pub struct ScoreCache {
    id: CacheId,
    pub(crate) states: Vec<MeasureState>,
}

impl ScoreCache {
    pub(crate) fn new(states: Vec<MeasureState>) -> Self {
        Self {
            id: CacheId::next(),
            states,
        }
    }

    pub fn id(&self) -> CacheId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_ids_are_unique() {
        let a = CacheId::next();
        let b = CacheId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_prev_subset_diff() {
        let mut prev = PrevSubset::default();
        prev.replace(&[5, 1, 3]);
        let diff = prev.diff(&[3, 7, 1, 0]);
        assert_eq!(diff.added, vec![0, 7]);
        assert_eq!(diff.removed, vec![5]);
        assert_eq!(diff.common, vec![1, 3]);
    }

    #[test]
    fn test_prev_subset_diff_from_empty() {
        let prev = PrevSubset::default();
        let diff = prev.diff(&[2, 0]);
        assert_eq!(diff.added, vec![0, 2]);
        assert!(diff.removed.is_empty() && diff.common.is_empty());
    }

    #[test]
    fn test_dist_key_orders_numerically() {
        let mut keys = [DistKey::new(0.5), DistKey::new(0.0), DistKey::new(0.25)];
        keys.sort();
        assert_eq!(keys[0].value(), 0.0);
        assert_eq!(keys[1].value(), 0.25);
        assert_eq!(keys[2].value(), 0.5);
    }
}
