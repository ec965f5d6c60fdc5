//! Genetic search over a ranked population of candidate cores.

use std::sync::Arc;

use crate::data::AccessionTable;
use crate::genetic::GeneticPopulation;
use crate::measures::PseudoMeasure;
use crate::progress::ProgressTracker;
use crate::search::{SearchConfig, StopMonitor};

#[allow(clippy::too_many_arguments)]
pub(crate) fn run(
    table: &Arc<AccessionTable>,
    pm: &Arc<PseudoMeasure>,
    config: &SearchConfig,
    pop_size: usize,
    children: usize,
    tournament: usize,
    mutation_rate: f64,
    tracker: &mut ProgressTracker<'_>,
) -> (Vec<usize>, f64) {
    let mut population = GeneticPopulation::new(
        pop_size,
        config.min_size,
        config.max_size,
        Arc::clone(table),
        Arc::clone(pm),
        children,
        tournament,
        mutation_rate,
        config.resolved_seed(),
    );
    population.init();

    let mut monitor = StopMonitor::new(config);
    let mut best_core = population.best_core().to_vec();
    monitor.record(population.best_score(), best_core.len());

    while !monitor.should_stop() {
        population.next_gen();
        if monitor.record(population.best_score(), population.best_core().len()) {
            best_core = population.best_core().to_vec();
            tracker.update(monitor.best_score());
        }
    }

    (best_core, monitor.best_score())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::reference_table;
    use std::time::Duration;

    #[test]
    fn test_genetic_search_finds_best_pair() {
        let table = Arc::new(reference_table());
        let pm = Arc::new(PseudoMeasure::from_names(&[("MR", 1.0)], 4).unwrap());
        let config = SearchConfig::new(2, 2)
            .with_runtime(Duration::from_millis(300))
            .with_seed(16);
        let mut tracker = ProgressTracker::new(None, Duration::from_secs(1));
        let (mut core, score) = run(&table, &pm, &config, 8, 4, 2, 0.3, &mut tracker);
        core.sort_unstable();
        assert_eq!(core, vec![1, 3]);
        assert!((score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_genetic_search_variable_size_in_bounds() {
        let table = Arc::new(reference_table());
        let pm = Arc::new(PseudoMeasure::from_names(&[("HE", 1.0)], 4).unwrap());
        let config = SearchConfig::new(2, 3)
            .with_runtime(Duration::from_millis(200))
            .with_seed(25);
        let mut tracker = ProgressTracker::new(None, Duration::from_secs(1));
        let (core, _) = run(&table, &pm, &config, 6, 3, 2, 0.3, &mut tracker);
        assert!(core.len() >= 2 && core.len() <= 3);
    }
}
