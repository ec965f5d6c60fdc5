//! Tabu search: always move to the best neighbor, tabu or not worse,
//! while a FIFO list of recently changed core positions blocks cycling.
//! An aspiration rule overrides the list for moves that beat the best
//! score found so far.

use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::{AccessionTable, Partition};
use crate::measures::PseudoMeasure;
use crate::neighborhood::{BestNeighborStrategy, SingleNeighborhood};
use crate::progress::ProgressTracker;
use crate::search::{SearchConfig, StopMonitor};

pub(crate) fn run(
    table: &Arc<AccessionTable>,
    pm: &Arc<PseudoMeasure>,
    config: &SearchConfig,
    list_size: usize,
    tracker: &mut ProgressTracker<'_>,
) -> (Vec<usize>, f64) {
    let mut rng = StdRng::seed_from_u64(config.resolved_seed());
    let mut part = Partition::random(table.len(), config.max_size, &mut rng);
    let mut nh = SingleNeighborhood::new(
        config.min_size,
        config.max_size,
        BestNeighborStrategy::Heuristic,
    );
    let mut cache = pm.new_cache(table);
    let score = pm.calculate(part.core(), table, Some(&mut cache));

    let mut tabu: VecDeque<isize> = VecDeque::with_capacity(list_size);
    let mut monitor = StopMonitor::new(config);
    monitor.record(score, part.core_size());
    let mut best_core = part.core().to_vec();

    while !monitor.should_stop() {
        let moved = nh.gen_best_neighbor(
            &mut part,
            Some(&mut tabu),
            monitor.best_score(),
            pm,
            table,
            &mut cache,
        );
        let Some(changed_position) = moved else {
            debug!("all neighbors tabu, stopping");
            break;
        };
        let new_score = pm.calculate(part.core(), table, Some(&mut cache));
        if monitor.record(new_score, part.core_size()) {
            best_core = part.core().to_vec();
            tracker.update(new_score);
        }
        if tabu.len() == list_size {
            tabu.pop_front();
        }
        tabu.push_back(changed_position);
    }

    (best_core, monitor.best_score())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::reference_table;
    use std::time::Duration;

    #[test]
    fn test_tabu_finds_global_best_pair() {
        let table = Arc::new(reference_table());
        let pm = Arc::new(PseudoMeasure::from_names(&[("MR", 1.0)], 4).unwrap());
        let config = SearchConfig::new(2, 2)
            .with_runtime(Duration::from_millis(200))
            .with_seed(2);
        let mut tracker = ProgressTracker::new(None, Duration::from_secs(1));
        let (mut core, score) = run(&table, &pm, &config, 1, &mut tracker);
        core.sort_unstable();
        assert_eq!(core, vec![1, 3]);
        assert!((score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_tabu_respects_size_bounds() {
        let table = Arc::new(reference_table());
        let pm = Arc::new(PseudoMeasure::from_names(&[("SH", 1.0)], 4).unwrap());
        let config = SearchConfig::new(2, 3)
            .with_runtime(Duration::from_millis(100))
            .with_seed(6);
        let mut tracker = ProgressTracker::new(None, Duration::from_secs(1));
        let (core, _) = run(&table, &pm, &config, 2, &mut tracker);
        assert!(core.len() >= 2 && core.len() <= 3);
    }
}
