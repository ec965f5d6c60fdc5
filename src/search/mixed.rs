//! Mixed replica search: the default engine. Combines long threaded tabu
//! bursts, a pool of short local and annealing bursts advanced on the
//! rayon pool, one background semi-deterministic LR replica, and stall
//! boosting that injects fresh random replicas when the whole ensemble
//! stops improving.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

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
use crate::replica::{LrState, Replica, Strategy};
use crate::search::{SearchConfig, StopMonitor};

/// Tuning knobs of the mixed replica search.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MixedReplicaParams {
    /// Tabu replicas running long bursts on their own threads.
    pub tabu_replicas: usize,
    /// Local and annealing replicas sharing the rayon pool.
    pub non_tabu_replicas: usize,
    /// Rounds before the first tabu replicas are launched, giving the
    /// cheap replicas time to find a decent seed core.
    pub rounds_without_tabu: usize,
    /// Steps per tabu burst.
    pub tabu_steps: usize,
    /// Steps per local or annealing burst.
    pub local_steps: usize,
    /// Tabu list capacity.
    pub tabu_list_size: usize,
    /// Tournament size for selecting crossover parents.
    pub tournament: usize,
    /// Fresh random replicas injected per boost.
    pub boost_replicas: usize,
    /// Rounds without global improvement before boosting.
    pub boost_after_rounds: usize,
    /// Coldest annealing temperature.
    pub min_temperature: f64,
    /// Hottest annealing temperature.
    pub max_temperature: f64,
}

impl Default for MixedReplicaParams {
    fn default() -> Self {
        Self {
            tabu_replicas: 2,
            non_tabu_replicas: 3,
            rounds_without_tabu: 10,
            tabu_steps: 500,
            local_steps: 50,
            tabu_list_size: 30,
            tournament: 2,
            boost_replicas: 2,
            boost_after_rounds: 5,
            min_temperature: 50.0,
            max_temperature: 200.0,
        }
    }
}

pub(crate) fn run(
    table: &Arc<AccessionTable>,
    pm: &Arc<PseudoMeasure>,
    config: &SearchConfig,
    params: &MixedReplicaParams,
    tracker: &mut ProgressTracker<'_>,
) -> (Vec<usize>, f64) {
    let seed = config.resolved_seed();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut next_seed = seed;
    let mut fresh_seed = move || {
        next_seed = next_seed.wrapping_add(1);
        next_seed
    };

    let nh = || {
        SingleNeighborhood::new(
            config.min_size,
            config.max_size,
            BestNeighborStrategy::Exhaustive,
        )
    };
    let make = |strategy: Strategy, steps: Option<usize>, seed: u64| {
        let with_nh = !matches!(strategy, Strategy::Lr(_));
        Replica::new(
            strategy,
            with_nh.then(nh),
            Arc::clone(table),
            Arc::clone(pm),
            config.min_size,
            config.max_size,
            steps,
            None,
            seed,
        )
    };

    // short-burst pool: alternating local and annealing replicas
    let non_tabu = params.non_tabu_replicas.max(1);
    let mut pool: Vec<Replica> = (0..non_tabu)
        .map(|i| {
            let strategy = if i % 2 == 0 {
                Strategy::Local
            } else {
                let f = i as f64 / (non_tabu - 1).max(1) as f64;
                Strategy::SimAn {
                    temperature: params.min_temperature
                        + f * (params.max_temperature - params.min_temperature),
                }
            };
            let mut rep = make(strategy, Some(params.local_steps), fresh_seed());
            rep.init_random();
            rep
        })
        .collect();

    // background semi-LR replica on a dedicated thread
    let mut lr = make(Strategy::Lr(LrState::new(2, 1, false)), None, fresh_seed());
    lr.init_random();
    let lr_stop = lr.stop_handle();
    let lr_thread: JoinHandle<Replica> = std::thread::spawn(move || {
        lr.do_steps();
        lr
    });

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
    for rep in &pool {
        if monitor.record(rep.best_score(), rep.best_core().len()) {
            best_core = rep.best_core().to_vec();
        }
    }

    let mut tabu_threads: Vec<Option<JoinHandle<Replica>>> = Vec::new();
    let mut round = 0usize;
    let mut rounds_since_improvement = 0usize;

    let spawn_tabu = |core: Vec<usize>, list_size: usize, steps: usize, seed: u64,
                      make: &dyn Fn(Strategy, Option<usize>, u64) -> Replica|
     -> JoinHandle<Replica> {
        let mut rep = make(
            Strategy::Tabu {
                list: std::collections::VecDeque::with_capacity(list_size),
                capacity: list_size,
                last_improvement: f64::MAX,
            },
            Some(steps),
            seed,
        );
        rep.init_with(core);
        std::thread::spawn(move || {
            rep.do_steps();
            rep
        })
    };

    while !monitor.should_stop() {
        pool.par_iter_mut().for_each(Replica::do_steps);

        let mut improved = false;
        for rep in &pool {
            if monitor.record(rep.best_score(), rep.best_core().len()) {
                best_core = rep.best_core().to_vec();
                improved = true;
            }
        }

        // launch the tabu replicas once a decent seed exists
        if round == params.rounds_without_tabu {
            for _ in 0..params.tabu_replicas {
                tabu_threads.push(Some(spawn_tabu(
                    best_core.clone(),
                    params.tabu_list_size,
                    params.tabu_steps,
                    fresh_seed(),
                    &make,
                )));
            }
            debug!("launched {} tabu replicas", params.tabu_replicas);
        }

        // harvest finished tabu bursts and respawn from a merged core
        for slot in &mut tabu_threads {
            let finished = slot.as_ref().is_some_and(JoinHandle::is_finished);
            if !finished {
                continue;
            }
            let Some(handle) = slot.take() else { continue };
            let Ok(rep) = handle.join() else { continue };
            if monitor.record(rep.best_score(), rep.best_core().len()) {
                best_core = rep.best_core().to_vec();
                improved = true;
            }
            let parent = tournament_best(&pool, params.tournament, &mut rng);
            let child = stratified_crossover(&best_core, parent, &mut clustering, table, &mut rng);
            *slot = Some(spawn_tabu(
                child,
                params.tabu_list_size,
                params.tabu_steps,
                fresh_seed(),
                &make,
            ));
        }

        // stall boosting
        if improved {
            rounds_since_improvement = 0;
        } else {
            rounds_since_improvement += 1;
            if rounds_since_improvement >= params.boost_after_rounds {
                rounds_since_improvement = 0;
                for _ in 0..params.boost_replicas {
                    let mut rep = make(Strategy::Local, Some(params.local_steps), fresh_seed());
                    rep.init_random();
                    pool.push(rep);
                }
                debug!("boosted with {} fresh replicas", params.boost_replicas);
            }
        }

        // keep the pool from growing without bound: drop stuck boosted
        // replicas beyond the configured size, best is safe in the monitor
        let mut i = non_tabu;
        while i < pool.len() {
            if pool[i].stuck() {
                pool.swap_remove(i);
            } else {
                i += 1;
            }
        }

        tracker.update(monitor.best_score());
        round += 1;
        std::thread::sleep(Duration::from_millis(1));
    }

    // shutdown: cancel the LR replica and collect everything
    if let Some(stop) = lr_stop {
        stop.store(false, std::sync::atomic::Ordering::Relaxed);
    }
    if let Ok(rep) = lr_thread.join() {
        // a cancelled LR replica may never have reached the size bounds,
        // in which case it has no reportable best
        let len = rep.best_core().len();
        if len >= config.min_size
            && len <= config.max_size
            && monitor.record(rep.best_score(), len)
        {
            best_core = rep.best_core().to_vec();
        }
    }
    for slot in &mut tabu_threads {
        if let Some(handle) = slot.take() {
            if let Ok(rep) = handle.join() {
                if monitor.record(rep.best_score(), rep.best_core().len()) {
                    best_core = rep.best_core().to_vec();
                }
            }
        }
    }

    (best_core, monitor.best_score())
}

/// Best core among `size` uniformly drawn pool members.
fn tournament_best<'a>(pool: &'a [Replica], size: usize, rng: &mut StdRng) -> &'a [usize] {
    let mut best = rng.random_range(0..pool.len());
    for _ in 1..size.max(1) {
        let cand = rng.random_range(0..pool.len());
        if pool[cand].best_score() > pool[best].best_score() {
            best = cand;
        }
    }
    pool[best].best_core()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::reference_table;

    #[test]
    fn test_mixed_replica_finds_best_pair() {
        let table = Arc::new(reference_table());
        let pm = Arc::new(PseudoMeasure::from_names(&[("MR", 1.0)], 4).unwrap());
        let config = SearchConfig::new(2, 2)
            .with_runtime(Duration::from_millis(500))
            .with_seed(10);
        let params = MixedReplicaParams {
            rounds_without_tabu: 2,
            tabu_steps: 20,
            local_steps: 10,
            ..MixedReplicaParams::default()
        };
        let mut tracker = ProgressTracker::new(None, Duration::from_secs(1));
        let (mut core, score) = run(&table, &pm, &config, &params, &mut tracker);
        core.sort_unstable();
        assert_eq!(core, vec![1, 3]);
        assert!((score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_mixed_replica_variable_size_stays_in_bounds() {
        let table = Arc::new(reference_table());
        let pm = Arc::new(PseudoMeasure::from_names(&[("MR", 0.7), ("SH", 0.3)], 4).unwrap());
        let config = SearchConfig::new(2, 3)
            .with_runtime(Duration::from_millis(300))
            .with_seed(20);
        let mut tracker = ProgressTracker::new(None, Duration::from_secs(1));
        let (core, score) = run(
            &table,
            &pm,
            &config,
            &MixedReplicaParams::default(),
            &mut tracker,
        );
        assert!(core.len() >= 2 && core.len() <= 3);
        let check = pm.calculate(&core, &table, None);
        assert!((score - check).abs() < 1e-12);
    }
}
