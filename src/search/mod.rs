//! Core selection searches.
//!
//! Every search takes the same inputs: an [`AccessionTable`], a
//! [`PseudoMeasure`], a [`SearchStrategy`] and a [`SearchConfig`], and
//! returns the best core found as a [`SearchResult`]. The heavy lifting
//! happens in per-strategy submodules; this module owns configuration,
//! validation, the shared stop policy and result assembly.
//!
//! All iterative searches stop cooperatively at round boundaries, driven
//! by the same triggers: total runtime, time since the last global
//! improvement, and improvements falling below the minimum progression.

pub(crate) mod exhaustive;
mod genetic;
mod local;
mod lr;
mod merge;
mod mixed;
mod random;
mod remc;
mod tabu;

use std::sync::Arc;
use std::time::{Duration, Instant};

pub use mixed::MixedReplicaParams;

use log::info;

use crate::data::AccessionTable;
use crate::error::CoreHunterError;
use crate::measures::PseudoMeasure;
use crate::progress::{ProgressSink, ProgressTracker};

/// Shared knobs of every search run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchConfig {
    /// Smallest acceptable core size.
    pub min_size: usize,
    /// Largest acceptable core size.
    pub max_size: usize,
    /// Total wall-clock runtime limit.
    pub runtime: Duration,
    /// Stop early after this long without any global improvement.
    pub stuck_time: Option<Duration>,
    /// Stop once improvements drop below this threshold (0 disables).
    pub min_progression: f64,
    /// Seed for reproducible runs; a random seed is drawn when `None`.
    pub seed: Option<u64>,
    /// Progress sampling interval.
    pub sample_interval: Duration,
}

impl SearchConfig {
    pub fn new(min_size: usize, max_size: usize) -> Self {
        Self {
            min_size,
            max_size,
            runtime: Duration::from_secs(60),
            stuck_time: None,
            min_progression: 0.0,
            seed: None,
            sample_interval: Duration::from_secs(1),
        }
    }

    pub fn with_runtime(mut self, runtime: Duration) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_stuck_time(mut self, stuck_time: Duration) -> Self {
        self.stuck_time = Some(stuck_time);
        self
    }

    pub fn with_min_progression(mut self, min_progression: f64) -> Self {
        self.min_progression = min_progression;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn validate(&self, table: &AccessionTable) -> Result<(), CoreHunterError> {
        if self.min_size < 2 || self.min_size > self.max_size || self.max_size > table.len() {
            return Err(CoreHunterError::InvalidSizeRange {
                min: self.min_size,
                max: self.max_size,
                collection: table.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn resolved_seed(&self) -> u64 {
        self.seed.unwrap_or_else(rand::random)
    }
}

/// Which search to run, with its strategy-specific parameters.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchStrategy {
    /// Enumerate every subset of the (fixed) target size.
    Exhaustive,
    /// One uniformly random core of a random legal size.
    Random,
    /// Accept-improving random walk.
    Local,
    /// Always move to the best neighbor; stop at a local optimum.
    /// The heuristic flavour scans additions first (MSTRAT style).
    SteepestDescent { heuristic: bool },
    /// Best-neighbor walk with a FIFO tabu list.
    Tabu { list_size: usize },
    /// Genetic algorithm over a ranked population.
    Genetic {
        pop_size: usize,
        children: usize,
        tournament: usize,
        mutation_rate: f64,
    },
    /// Replica exchange Monte Carlo over a temperature ladder.
    Remc {
        replicas: usize,
        min_t: f64,
        max_t: f64,
        mc_steps: usize,
    },
    /// REMC with every round fanned out over the thread pool.
    ParallelRemc {
        replicas: usize,
        min_t: f64,
        max_t: f64,
        mc_steps: usize,
    },
    /// Pool of local-search replicas, merging stuck ones into children.
    MergeReplica {
        replicas: usize,
        steps: usize,
        children: usize,
        tournament: usize,
    },
    /// Merge replica search with parallel bursts.
    ParallelMergeReplica {
        replicas: usize,
        steps: usize,
        children: usize,
        tournament: usize,
    },
    /// Heterogeneous pool: threaded tabu bursts, interleaved local and
    /// annealing bursts, a background LR replica and stall boosting.
    MixedReplica(MixedReplicaParams),
    /// Deterministic (l,r) greedy selection.
    Lr {
        l: usize,
        r: usize,
        exhaustive_seed: bool,
    },
}

impl SearchStrategy {
    /// Sequential forward selection.
    pub fn forward() -> Self {
        SearchStrategy::Lr {
            l: 1,
            r: 0,
            exhaustive_seed: true,
        }
    }

    /// Forward selection from a random first pair.
    pub fn semi_forward() -> Self {
        SearchStrategy::Lr {
            l: 1,
            r: 0,
            exhaustive_seed: false,
        }
    }

    /// Sequential backward selection.
    pub fn backward() -> Self {
        SearchStrategy::Lr {
            l: 0,
            r: 1,
            exhaustive_seed: true,
        }
    }

    pub fn lr(l: usize, r: usize) -> Self {
        SearchStrategy::Lr {
            l,
            r,
            exhaustive_seed: true,
        }
    }

    pub fn semi_lr(l: usize, r: usize) -> Self {
        SearchStrategy::Lr {
            l,
            r,
            exhaustive_seed: false,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            SearchStrategy::Exhaustive => "exhaustive",
            SearchStrategy::Random => "random",
            SearchStrategy::Local => "local",
            SearchStrategy::SteepestDescent { heuristic: false } => "steepest descent",
            SearchStrategy::SteepestDescent { heuristic: true } => "heuristic steepest descent",
            SearchStrategy::Tabu { .. } => "tabu",
            SearchStrategy::Genetic { .. } => "genetic",
            SearchStrategy::Remc { .. } => "remc",
            SearchStrategy::ParallelRemc { .. } => "parallel remc",
            SearchStrategy::MergeReplica { .. } => "merge replica",
            SearchStrategy::ParallelMergeReplica { .. } => "parallel merge replica",
            SearchStrategy::MixedReplica(_) => "mixed replica",
            SearchStrategy::Lr { .. } => "lr",
        }
    }
}

/// Outcome of one search run.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Selected accession ids, in selection order.
    pub core: Vec<usize>,
    /// Names of the selected accessions.
    pub names: Vec<String>,
    /// Best pseudo-measure score reached.
    pub score: f64,
    /// Unweighted value of each registered measure on the final core.
    pub component_scores: Vec<(String, f64)>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Runs `strategy` and returns the best core it found.
pub fn search(
    table: &Arc<AccessionTable>,
    pm: &Arc<PseudoMeasure>,
    strategy: &SearchStrategy,
    config: &SearchConfig,
    progress: Option<&mut dyn ProgressSink>,
) -> Result<SearchResult, CoreHunterError> {
    config.validate(table)?;
    pm.validate(table)?;
    if pm.is_empty() {
        return Err(CoreHunterError::InvalidConfig(
            "at least one measure must be registered".to_string(),
        ));
    }

    info!(
        "starting {} search, core size {}..={}, collection size {}",
        strategy.name(),
        config.min_size,
        config.max_size,
        table.len()
    );

    let start = Instant::now();
    let mut tracker = ProgressTracker::new(progress, config.sample_interval);
    let (core, score) = match strategy {
        SearchStrategy::Exhaustive => exhaustive::run(table, pm, config, &mut tracker)?,
        SearchStrategy::Random => random::run(table, pm, config),
        SearchStrategy::Local => local::local(table, pm, config, &mut tracker),
        SearchStrategy::SteepestDescent { heuristic } => {
            local::steepest_descent(table, pm, config, *heuristic, &mut tracker)
        }
        SearchStrategy::Tabu { list_size } => {
            tabu::run(table, pm, config, *list_size, &mut tracker)
        }
        SearchStrategy::Genetic {
            pop_size,
            children,
            tournament,
            mutation_rate,
        } => genetic::run(
            table,
            pm,
            config,
            *pop_size,
            *children,
            *tournament,
            *mutation_rate,
            &mut tracker,
        ),
        SearchStrategy::Remc {
            replicas,
            min_t,
            max_t,
            mc_steps,
        } => remc::run(
            table, pm, config, *replicas, *min_t, *max_t, *mc_steps, false, &mut tracker,
        ),
        SearchStrategy::ParallelRemc {
            replicas,
            min_t,
            max_t,
            mc_steps,
        } => remc::run(
            table, pm, config, *replicas, *min_t, *max_t, *mc_steps, true, &mut tracker,
        ),
        SearchStrategy::MergeReplica {
            replicas,
            steps,
            children,
            tournament,
        } => merge::run(
            table,
            pm,
            config,
            *replicas,
            *steps,
            *children,
            *tournament,
            false,
            &mut tracker,
        ),
        SearchStrategy::ParallelMergeReplica {
            replicas,
            steps,
            children,
            tournament,
        } => merge::run(
            table,
            pm,
            config,
            *replicas,
            *steps,
            *children,
            *tournament,
            true,
            &mut tracker,
        ),
        SearchStrategy::MixedReplica(params) => {
            mixed::run(table, pm, config, params, &mut tracker)
        }
        SearchStrategy::Lr {
            l,
            r,
            exhaustive_seed,
        } => lr::run(table, pm, config, *l, *r, *exhaustive_seed)?,
    };
    tracker.finish();

    let elapsed = start.elapsed();
    info!(
        "{} search finished: score {:.6}, core size {}, {:.2}s",
        strategy.name(),
        score,
        core.len(),
        elapsed.as_secs_f64()
    );

    Ok(SearchResult {
        names: table.names_of(&core),
        component_scores: pm.component_scores(&core, table, None),
        core,
        score,
        elapsed,
    })
}

/// Shared stop policy of the iterative searches.
pub(crate) struct StopMonitor {
    deadline: Instant,
    stuck_time: Option<Duration>,
    min_progression: f64,
    last_improvement_at: Instant,
    last_delta: f64,
    last_shrunk: bool,
    improved_once: bool,
    best_score: f64,
    best_size: usize,
}

impl StopMonitor {
    pub fn new(config: &SearchConfig) -> Self {
        let now = Instant::now();
        Self {
            deadline: now + config.runtime,
            stuck_time: config.stuck_time,
            min_progression: config.min_progression,
            last_improvement_at: now,
            last_delta: f64::INFINITY,
            last_shrunk: false,
            improved_once: false,
            best_score: f64::NEG_INFINITY,
            best_size: usize::MAX,
        }
    }

    /// Feeds one candidate; returns whether it became the new global best.
    pub fn record(&mut self, score: f64, size: usize) -> bool {
        let improved =
            score > self.best_score || (score == self.best_score && size < self.best_size);
        if improved {
            self.last_delta = score - self.best_score;
            self.last_shrunk = size < self.best_size;
            self.improved_once = true;
            self.best_score = score;
            self.best_size = size;
            self.last_improvement_at = Instant::now();
        }
        improved
    }

    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    pub fn should_stop(&self) -> bool {
        if Instant::now() >= self.deadline {
            return true;
        }
        if let Some(stuck) = self.stuck_time {
            if self.last_improvement_at.elapsed() >= stuck {
                return true;
            }
        }
        self.min_progression > 0.0
            && self.improved_once
            && self.last_delta.is_finite()
            && self.last_delta < self.min_progression
            && !self.last_shrunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::reference_table;

    fn setup() -> (Arc<AccessionTable>, Arc<PseudoMeasure>) {
        let table = Arc::new(reference_table());
        let pm = Arc::new(PseudoMeasure::from_names(&[("MR", 1.0)], 4).unwrap());
        (table, pm)
    }

    #[test]
    fn test_invalid_size_range_rejected() {
        let (table, pm) = setup();
        for (min, max) in [(1, 2), (3, 2), (2, 5)] {
            let config = SearchConfig::new(min, max);
            let err = search(&table, &pm, &SearchStrategy::Random, &config, None);
            assert!(matches!(
                err,
                Err(CoreHunterError::InvalidSizeRange { .. })
            ));
        }
    }

    #[test]
    fn test_empty_pseudo_measure_rejected() {
        let table = Arc::new(reference_table());
        let pm = Arc::new(PseudoMeasure::new());
        let config = SearchConfig::new(2, 3);
        let err = search(&table, &pm, &SearchStrategy::Random, &config, None);
        assert!(matches!(err, Err(CoreHunterError::InvalidConfig(_))));
    }

    #[test]
    fn test_result_carries_names_and_components() {
        let (table, pm) = setup();
        let config = SearchConfig::new(2, 3).with_seed(4);
        let result = search(&table, &pm, &SearchStrategy::Random, &config, None).unwrap();
        assert_eq!(result.core.len(), result.names.len());
        assert_eq!(result.component_scores.len(), 1);
        assert_eq!(result.component_scores[0].0, "MR");
        for name in &result.names {
            assert!(table.index_of(name).is_some());
        }
    }

    #[test]
    fn test_stop_monitor_runtime_deadline() {
        let config = SearchConfig::new(2, 3).with_runtime(Duration::ZERO);
        let monitor = StopMonitor::new(&config);
        assert!(monitor.should_stop());
    }

    #[test]
    fn test_stop_monitor_min_progression() {
        let config = SearchConfig::new(2, 3)
            .with_runtime(Duration::from_secs(3600))
            .with_min_progression(0.1);
        let mut monitor = StopMonitor::new(&config);
        assert!(monitor.record(1.0, 3));
        assert!(!monitor.should_stop(), "first improvement never stops");
        assert!(monitor.record(1.05, 3));
        assert!(monitor.should_stop(), "tiny improvement falls below 0.1");
        // a shrinking improvement resets the stop condition
        assert!(monitor.record(1.05, 2));
        assert!(!monitor.should_stop());
    }

    #[test]
    fn test_stop_monitor_prefers_smaller_equal_score() {
        let config = SearchConfig::new(2, 3);
        let mut monitor = StopMonitor::new(&config);
        assert!(monitor.record(0.5, 3));
        assert!(!monitor.record(0.5, 3));
        assert!(monitor.record(0.5, 2));
        assert!(!monitor.record(0.4, 2));
    }
}
