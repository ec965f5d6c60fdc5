//! Exhaustive enumeration of all cores of a fixed size.
//!
//! Subsets are produced by the revolving-door successor algorithm
//! (Kreher & Stinson, "Combinatorial Algorithms"), which changes exactly
//! one element per step. Together with the incremental score cache that
//! makes each evaluation an `O(|S|)` delta instead of a full rescore.

use std::sync::Arc;

use log::debug;

use crate::data::AccessionTable;
use crate::error::CoreHunterError;
use crate::measures::PseudoMeasure;
use crate::progress::ProgressTracker;
use crate::search::{SearchConfig, StopMonitor};

/// How many subsets to score between deadline checks.
const STOP_CHECK_INTERVAL: u128 = 512;

/// Revolving-door generator of k-subsets of `{1, ..., n}`.
pub(crate) struct KSubsetGenerator {
    k: usize,
    n: usize,
}

impl KSubsetGenerator {
    pub fn new(k: usize, n: usize) -> Self {
        Self { k, n }
    }

    pub fn count(&self) -> u128 {
        let (n, k) = (self.n as u128, self.k as u128);
        let k = k.min(n - k);
        let mut c: u128 = 1;
        for i in 1..=k {
            c = c * (n - k + i) / i;
        }
        c
    }

    /// The lexicographically first subset, 1-based.
    pub fn first(&self) -> Vec<usize> {
        (1..=self.k).collect()
    }

    /// Advances `t` to its revolving-door successor in place.
    pub fn successor(&self, t: &mut [usize]) {
        let k = self.k;
        // sentinel-framed working copy: s[0] = 0, s[k+1] = n + 1
        let mut s = vec![0; k + 2];
        s[1..=k].copy_from_slice(t);
        s[k + 1] = self.n + 1;

        let mut j = 1;
        while j <= k && s[j] == j {
            j += 1;
        }
        if k % 2 != j % 2 {
            if j == 1 {
                s[1] -= 1;
            } else {
                s[j - 1] = j;
                s[j - 2] = j - 1;
            }
        } else if s[j + 1] != s[j] + 1 {
            s[j - 1] = s[j];
            s[j] += 1;
        } else {
            s[j + 1] = s[j];
            s[j] = j;
        }

        t.copy_from_slice(&s[1..=k]);
    }
}

/// Best subset of exactly `k` accessions, by full enumeration. Used to
/// seed deterministic searches; no time limit applies.
pub(crate) fn best_k_subset(table: &AccessionTable, pm: &PseudoMeasure, k: usize) -> Vec<usize> {
    let gen = KSubsetGenerator::new(k, table.len());
    let mut cache = pm.new_cache(table);
    let mut t = gen.first();
    let total = gen.count();

    let mut best_core = Vec::new();
    let mut best_score = f64::NEG_INFINITY;
    for i in 0..total {
        let core: Vec<usize> = t.iter().map(|&v| v - 1).collect();
        let score = pm.calculate(&core, table, Some(&mut cache));
        if score > best_score {
            best_score = score;
            best_core = core;
        }
        if i + 1 < total {
            gen.successor(&mut t);
        }
    }
    best_core
}

pub(crate) fn run(
    table: &Arc<AccessionTable>,
    pm: &Arc<PseudoMeasure>,
    config: &SearchConfig,
    tracker: &mut ProgressTracker<'_>,
) -> Result<(Vec<usize>, f64), CoreHunterError> {
    if config.min_size != config.max_size {
        return Err(CoreHunterError::InvalidConfig(
            "exhaustive search requires a fixed core size (min == max)".to_string(),
        ));
    }
    let k = config.min_size;
    let gen = KSubsetGenerator::new(k, table.len());
    let total = gen.count();
    debug!("enumerating {total} subsets of size {k}");

    let mut monitor = StopMonitor::new(config);
    let mut cache = pm.new_cache(table);
    let mut t = gen.first();
    let mut best_core = Vec::new();

    for i in 0..total {
        let core: Vec<usize> = t.iter().map(|&v| v - 1).collect();
        let score = pm.calculate(&core, table, Some(&mut cache));
        if monitor.record(score, core.len()) {
            best_core = core;
            tracker.update(score);
        }
        if i % STOP_CHECK_INTERVAL == 0 && monitor.should_stop() {
            debug!("runtime exhausted after {} of {} subsets", i + 1, total);
            break;
        }
        if i + 1 < total {
            gen.successor(&mut t);
        }
    }

    Ok((best_core, monitor.best_score()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::reference_table;
    use crate::progress::ProgressTracker;
    use std::time::Duration;

    #[test]
    fn test_generator_visits_every_subset_once() {
        let gen = KSubsetGenerator::new(2, 4);
        assert_eq!(gen.count(), 6);
        let mut t = gen.first();
        let mut seen = Vec::new();
        for i in 0..6 {
            let mut s = t.clone();
            s.sort_unstable();
            seen.push(s);
            if i < 5 {
                gen.successor(&mut t);
            }
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 6, "all 6 pairs out of 4 visited exactly once");
    }

    #[test]
    fn test_generator_changes_one_element_per_step() {
        let gen = KSubsetGenerator::new(3, 6);
        let mut t = gen.first();
        for _ in 0..gen.count() - 1 {
            let prev = t.clone();
            gen.successor(&mut t);
            let common = t.iter().filter(|v| prev.contains(v)).count();
            assert_eq!(common, 2, "revolving door swaps exactly one element");
        }
    }

    #[test]
    fn test_exhaustive_matches_brute_force() {
        let table = Arc::new(reference_table());
        let pm = Arc::new(PseudoMeasure::from_names(&[("MR", 1.0)], 4).unwrap());
        let config = SearchConfig::new(2, 2).with_runtime(Duration::from_secs(30));
        let mut tracker = ProgressTracker::new(None, Duration::from_secs(1));
        let (core, score) = run(&table, &pm, &config, &mut tracker).unwrap();

        let mut best = f64::NEG_INFINITY;
        for a in 0..4 {
            for b in a + 1..4 {
                best = best.max(pm.calculate(&[a, b], &table, None));
            }
        }
        assert!((score - best).abs() < 1e-12);
        assert_eq!(core.len(), 2);
        // the best pair in the reference data is A2, A4
        let mut sorted = core;
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 3]);
    }

    #[test]
    fn test_exhaustive_requires_fixed_size() {
        let table = Arc::new(reference_table());
        let pm = Arc::new(PseudoMeasure::from_names(&[("MR", 1.0)], 4).unwrap());
        let config = SearchConfig::new(2, 3);
        let mut tracker = ProgressTracker::new(None, Duration::from_secs(1));
        assert!(matches!(
            run(&table, &pm, &config, &mut tracker),
            Err(CoreHunterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_best_k_subset_seeds_best_pair() {
        let table = reference_table();
        let pm = PseudoMeasure::from_names(&[("MR", 1.0)], 4).unwrap();
        let mut pair = best_k_subset(&table, &pm, 2);
        pair.sort_unstable();
        assert_eq!(pair, vec![1, 3]);
    }
}
