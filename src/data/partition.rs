//! Core/complement partition of a collection.

use rand::seq::SliceRandom;
use rand::Rng;

/// Two disjoint ordered index sequences partitioning an accession table.
///
/// Every accession id is in exactly one of the two sequences at all times.
/// Order is significant: perturbation undo restores the exact positions a
/// move disturbed, so membership *and* order round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub(crate) core: Vec<usize>,
    pub(crate) unselected: Vec<usize>,
}

impl Partition {
    /// Random core of exactly `size` accessions out of `n`.
    pub fn random<R: Rng>(n: usize, size: usize, rng: &mut R) -> Self {
        let mut unselected: Vec<usize> = (0..n).collect();
        let mut core = Vec::with_capacity(size);
        for _ in 0..size.min(n) {
            let i = rng.random_range(0..unselected.len());
            core.push(unselected.swap_remove(i));
        }
        // swap_remove disturbs complement order; restore for reproducibility
        unselected.sort_unstable();
        unselected.shuffle(rng);
        Self { core, unselected }
    }

    /// Partition with the given core; the complement is every other id in
    /// ascending order.
    pub fn from_core(core: Vec<usize>, n: usize) -> Self {
        let mut in_core = vec![false; n];
        for &id in &core {
            in_core[id] = true;
        }
        let unselected = (0..n).filter(|&id| !in_core[id]).collect();
        Self { core, unselected }
    }

    /// Everything selected; used by shrinking searches starting from the
    /// full collection.
    pub fn full(n: usize) -> Self {
        Self {
            core: (0..n).collect(),
            unselected: Vec::new(),
        }
    }

    pub fn core(&self) -> &[usize] {
        &self.core
    }

    pub fn unselected(&self) -> &[usize] {
        &self.unselected
    }

    pub fn core_size(&self) -> usize {
        self.core.len()
    }

    pub fn total(&self) -> usize {
        self.core.len() + self.unselected.len()
    }
}
