//! Merge replica search: a pool of local-search replicas where stuck
//! trajectories are discarded and replaced by children merged from two
//! tournament-selected survivors.

use std::sync::Arc;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::cluster::{ClusterDistance, ClusterDistanceKind, Clustering};
use crate::data::AccessionTable;
use crate::genetic::stratified_crossover;
use crate::measures::{DistanceKind, PseudoMeasure};
use crate::neighborhood::{BestNeighborStrategy, SingleNeighborhood};
use crate::progress::ProgressTracker;
use crate::replica::{Replica, Strategy};
use crate::search::{SearchConfig, StopMonitor};

/// Smallest pool the stuck-removal pass may leave behind.
const MIN_POOL: usize = 2;

#[allow(clippy::too_many_arguments)]
pub(crate) fn run(
    table: &Arc<AccessionTable>,
    pm: &Arc<PseudoMeasure>,
    config: &SearchConfig,
    replicas: usize,
    steps: usize,
    children: usize,
    tournament: usize,
    parallel: bool,
    tracker: &mut ProgressTracker<'_>,
) -> (Vec<usize>, f64) {
    let replicas = replicas.max(MIN_POOL);
    let seed = config.resolved_seed();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut next_seed = seed;
    let mut fresh_seed = move || {
        next_seed = next_seed.wrapping_add(1);
        next_seed
    };

    let make_replica = |seed: u64| {
        let nh = SingleNeighborhood::new(
            config.min_size,
            config.max_size,
            BestNeighborStrategy::Exhaustive,
        );
        Replica::new(
            Strategy::Local,
            Some(nh),
            Arc::clone(table),
            Arc::clone(pm),
            config.min_size,
            config.max_size,
            Some(steps),
            None,
            seed,
        )
    };

    let mut pool: Vec<Replica> = (0..replicas)
        .map(|_| {
            let mut rep = make_replica(fresh_seed());
            rep.init_random();
            rep
        })
        .collect();
    let mut clustering = Clustering::new(
        config.max_size,
        ClusterDistance::new(
            ClusterDistanceKind::GroupAverage,
            DistanceKind::ModifiedRogers,
            table.len(),
        ),
    );

    let mut monitor = StopMonitor::new(config);
    let mut best_core = Vec::new();

    while !monitor.should_stop() {
        if parallel {
            pool.par_iter_mut().for_each(Replica::do_steps);
        } else {
            for rep in &mut pool {
                rep.do_steps();
            }
        }
        for rep in &mut pool {
            if monitor.record(rep.best_score(), rep.best_core().len()) {
                best_core = rep.best_core().to_vec();
                tracker.update(monitor.best_score());
            }
        }

        // drop stuck replicas, never below the minimum pool size
        let mut i = 0;
        while i < pool.len() && pool.len() > MIN_POOL {
            if pool[i].stuck() {
                pool.swap_remove(i);
            } else {
                i += 1;
            }
        }

        // refill with merged children of tournament-selected parents
        let mut spawned = 0;
        while pool.len() < replicas && spawned < children.max(1) {
            let p1 = tournament_select(&pool, tournament, &mut rng);
            let p2 = tournament_select(&pool, tournament, &mut rng);
            let child_core = stratified_crossover(
                pool[p1].best_core(),
                pool[p2].best_core(),
                &mut clustering,
                table,
                &mut rng,
            );
            let mut child = make_replica(fresh_seed());
            child.init_with(child_core);
            if monitor.record(child.best_score(), child.best_core().len()) {
                best_core = child.best_core().to_vec();
            }
            pool.push(child);
            spawned += 1;
        }
        if spawned > 0 {
            debug!("merged {spawned} children, pool size {}", pool.len());
        }
    }

    (best_core, monitor.best_score())
}

/// Index of the best replica among `size` uniformly drawn candidates.
fn tournament_select(pool: &[Replica], size: usize, rng: &mut StdRng) -> usize {
    let mut best = rng.random_range(0..pool.len());
    for _ in 1..size.max(1) {
        let cand = rng.random_range(0..pool.len());
        if pool[cand].best_score() > pool[best].best_score() {
            best = cand;
        }
    }
    best
}
