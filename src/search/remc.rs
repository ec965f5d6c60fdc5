//! Replica exchange Monte Carlo: a ladder of annealing replicas at
//! different temperatures, periodically swapping temperatures between
//! neighbors so good cores migrate toward the cold end of the ladder.

use std::sync::Arc;

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::data::AccessionTable;
use crate::measures::PseudoMeasure;
use crate::neighborhood::{BestNeighborStrategy, SingleNeighborhood};
use crate::progress::ProgressTracker;
use crate::replica::{Replica, Strategy};
use crate::search::{SearchConfig, StopMonitor};

/// Boltzmann-like constant scaling the temperature in the swap
/// acceptance probability.
const K_B2: f64 = 1.360572e-9;

#[allow(clippy::too_many_arguments)]
pub(crate) fn run(
    table: &Arc<AccessionTable>,
    pm: &Arc<PseudoMeasure>,
    config: &SearchConfig,
    replicas: usize,
    min_t: f64,
    max_t: f64,
    mc_steps: usize,
    parallel: bool,
    tracker: &mut ProgressTracker<'_>,
) -> (Vec<usize>, f64) {
    let replicas = replicas.max(2);
    let seed = config.resolved_seed();
    let mut rng = StdRng::seed_from_u64(seed);

    let mut pool: Vec<Replica> = (0..replicas)
        .map(|i| {
            let t = min_t + i as f64 * (max_t - min_t) / (replicas - 1) as f64;
            let nh = SingleNeighborhood::new(
                config.min_size,
                config.max_size,
                BestNeighborStrategy::Exhaustive,
            );
            let mut rep = Replica::new(
                Strategy::SimAn { temperature: t },
                Some(nh),
                Arc::clone(table),
                Arc::clone(pm),
                config.min_size,
                config.max_size,
                Some(mc_steps),
                None,
                seed.wrapping_add(i as u64 + 1),
            );
            rep.init_random();
            rep
        })
        .collect();

    let mut monitor = StopMonitor::new(config);
    let mut best_core = Vec::new();
    for rep in &pool {
        if monitor.record(rep.best_score(), rep.best_core().len()) {
            best_core = rep.best_core().to_vec();
        }
    }

    let mut swap_base = 0;
    while !monitor.should_stop() {
        if parallel {
            pool.par_iter_mut().for_each(Replica::do_steps);
        } else {
            for rep in &mut pool {
                rep.do_steps();
            }
        }
        for rep in &pool {
            if monitor.record(rep.best_score(), rep.best_core().len()) {
                best_core = rep.best_core().to_vec();
                debug!("remc improved to {:.6}", monitor.best_score());
                tracker.update(monitor.best_score());
            }
        }

        // swap sweep over alternating neighbor pairs of the ladder
        let mut i = swap_base;
        while i + 1 < replicas {
            let t_m = pool[i].temperature();
            let t_n = pool[i + 1].temperature();
            let b_m = 1.0 / (K_B2 * t_m);
            let b_n = 1.0 / (K_B2 * t_n);
            let delta_e = pool[i].score() - pool[i + 1].score();
            let accept = delta_e <= 0.0 || {
                let p: f64 = rng.random();
                ((b_n - b_m) * delta_e).exp() > p
            };
            if accept {
                trace!("swapping replicas {i} and {} (T {t_m:.1} / {t_n:.1})", i + 1);
                pool[i].set_temperature(t_n);
                pool[i + 1].set_temperature(t_m);
                pool.swap(i, i + 1);
            }
            i += 2;
        }
        swap_base = 1 - swap_base;
    }

    (best_core, monitor.best_score())
}
