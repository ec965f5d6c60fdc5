//! Single-trajectory hill climbers: a stochastic first-improvement walk
//! and deterministic steepest descent.

use std::sync::Arc;

use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::{AccessionTable, Partition};
use crate::measures::PseudoMeasure;
use crate::neighborhood::{BestNeighborStrategy, SingleNeighborhood};
use crate::progress::ProgressTracker;
use crate::search::{SearchConfig, StopMonitor};

/// Random-descent search: draw a random neighbor, keep it when it does
/// not hurt, undo it otherwise.
pub(crate) fn local(
    table: &Arc<AccessionTable>,
    pm: &Arc<PseudoMeasure>,
    config: &SearchConfig,
    tracker: &mut ProgressTracker<'_>,
) -> (Vec<usize>, f64) {
    let mut rng = StdRng::seed_from_u64(config.resolved_seed());
    let mut part = Partition::random(table.len(), config.max_size, &mut rng);
    let mut nh = SingleNeighborhood::new(
        config.min_size,
        config.max_size,
        BestNeighborStrategy::Exhaustive,
    );
    let mut cache = pm.new_cache(table);
    let mut score = pm.calculate(part.core(), table, Some(&mut cache));

    let mut monitor = StopMonitor::new(config);
    monitor.record(score, part.core_size());
    let mut best_core = part.core().to_vec();

    while !monitor.should_stop() {
        let size = part.core_size();
        if nh.gen_random_neighbor(&mut part, &mut rng).is_none() {
            break;
        }
        let new_score = pm.calculate(part.core(), table, Some(&mut cache));
        if new_score > score || (new_score == score && part.core_size() < size) {
            score = new_score;
            if monitor.record(score, part.core_size()) {
                best_core = part.core().to_vec();
                debug!("local search improved to {score:.6}");
                tracker.update(score);
            }
        } else {
            nh.undo_last_perturbation(&mut part, None);
        }
    }

    (best_core, monitor.best_score())
}

/// Steepest descent: always take the single best neighbor, stop at the
/// first local optimum. The heuristic flavour scans a reduced
/// neighborhood (additions first) like the MSTRAT procedure.
pub(crate) fn steepest_descent(
    table: &Arc<AccessionTable>,
    pm: &Arc<PseudoMeasure>,
    config: &SearchConfig,
    heuristic: bool,
    tracker: &mut ProgressTracker<'_>,
) -> (Vec<usize>, f64) {
    let strategy = if heuristic {
        BestNeighborStrategy::Heuristic
    } else {
        BestNeighborStrategy::Exhaustive
    };
    let mut rng = StdRng::seed_from_u64(config.resolved_seed());
    let mut part = Partition::random(table.len(), config.max_size, &mut rng);
    let mut nh = SingleNeighborhood::new(config.min_size, config.max_size, strategy);
    let mut cache = pm.new_cache(table);
    let mut score = pm.calculate(part.core(), table, Some(&mut cache));

    let mut monitor = StopMonitor::new(config);
    monitor.record(score, part.core_size());
    let mut best_core = part.core().to_vec();

    while !monitor.should_stop() {
        let size = part.core_size();
        if nh
            .gen_best_neighbor(&mut part, None, score, pm, table, &mut cache)
            .is_none()
        {
            break;
        }
        let new_score = pm.calculate(part.core(), table, Some(&mut cache));
        if new_score > score || (new_score == score && part.core_size() < size) {
            score = new_score;
            if monitor.record(score, part.core_size()) {
                best_core = part.core().to_vec();
                tracker.update(score);
            }
        } else {
            // local optimum reached
            nh.undo_last_perturbation(&mut part, None);
            break;
        }
    }

    debug!("steepest descent settled at {:.6}", monitor.best_score());
    (best_core, monitor.best_score())
}
