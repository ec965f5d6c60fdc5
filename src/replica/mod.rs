//! Search replicas: one partition plus one acceptance rule.
//!
//! A [`Replica`] owns everything one independent search trajectory needs:
//! its partition, its incremental score cache, its random generator and
//! its best-ever core. The orchestrators in [`crate::search`] advance
//! replicas in bounded bursts through [`Replica::do_steps`] and only
//! inspect or exchange state at burst boundaries, which is what makes the
//! parallel searches coordination-free inside a round.
//!
//! The acceptance rule lives in [`Strategy`]:
//!
//! - `Local`: accept improvements (or equal score with a smaller core).
//! - `SimAn`: Metropolis acceptance at a fixed temperature, with the
//!   temperature swappable between replicas for replica exchange.
//! - `Tabu`: always move to the best non-tabu neighbor, remembering the
//!   changed core positions in a FIFO list.
//! - `Lr`: deterministic (l,r) greedy growth or shrinkage, cancellable
//!   from another thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::{AccessionTable, Partition};
use crate::measures::{PseudoMeasure, ScoreCache};
use crate::neighborhood::{Perturbation, SingleNeighborhood};
use crate::search::exhaustive::best_k_subset;

/// Boltzmann-like constant scaling simulated annealing temperatures.
pub const K_B: f64 = 7.213475e-7;

/// A tabu replica counts as stuck once its last improvement drops below
/// this threshold.
const TABU_MIN_PROG: f64 = 1e-8;

/// Number of times a finished LR replica reports "not stuck" before
/// allowing its removal, so its result is not discarded immediately.
const LR_STUCK_STAY: usize = 10;

/// Per-replica acceptance rule and its private state.
#[derive(Debug)]
pub enum Strategy {
    Local,
    SimAn {
        temperature: f64,
    },
    Tabu {
        list: VecDeque<isize>,
        capacity: usize,
        last_improvement: f64,
    },
    Lr(LrState),
}

/// State of a deterministic (l,r) replica.
#[derive(Debug)]
pub struct LrState {
    l: usize,
    r: usize,
    /// Seed the growing search with the exhaustively best pair instead of
    /// a random one.
    exhaustive_seed: bool,
    history: Vec<Perturbation>,
    /// Cleared to stop the search cooperatively from another thread.
    active: Arc<AtomicBool>,
    skip_add: bool,
    total_steps: usize,
    stuck_polls: usize,
}

impl LrState {
    pub fn new(l: usize, r: usize, exhaustive_seed: bool) -> Self {
        Self {
            l,
            r,
            exhaustive_seed,
            history: Vec::new(),
            active: Arc::new(AtomicBool::new(true)),
            skip_add: false,
            total_steps: 0,
            stuck_polls: 0,
        }
    }
}

/// One search trajectory over the accession table.
pub struct Replica {
    strategy: Strategy,
    nh: Option<SingleNeighborhood>,
    part: Partition,
    score: f64,
    best_core: Vec<usize>,
    best_score: f64,
    cache: ScoreCache,
    stuck: bool,
    steps: Option<usize>,
    burst_time: Option<Duration>,
    min_size: usize,
    max_size: usize,
    rng: StdRng,
    pm: Arc<PseudoMeasure>,
    table: Arc<AccessionTable>,
}

impl Replica {
    /// Creates an uninitialized replica; call [`Replica::init_random`] or
    /// [`Replica::init_with`] before stepping.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategy: Strategy,
        nh: Option<SingleNeighborhood>,
        table: Arc<AccessionTable>,
        pm: Arc<PseudoMeasure>,
        min_size: usize,
        max_size: usize,
        steps: Option<usize>,
        burst_time: Option<Duration>,
        seed: u64,
    ) -> Self {
        let cache = pm.new_cache(&table);
        Self {
            strategy,
            nh,
            part: Partition::from_core(Vec::new(), table.len()),
            score: f64::NEG_INFINITY,
            best_core: Vec::new(),
            best_score: f64::NEG_INFINITY,
            cache,
            stuck: false,
            steps,
            burst_time,
            min_size,
            max_size,
            rng: StdRng::seed_from_u64(seed),
            pm,
            table,
        }
    }

    /// Starts from a random core of maximal size; LR replicas instead
    /// build their own start per their direction.
    pub fn init_random(&mut self) {
        if matches!(self.strategy, Strategy::Lr(_)) {
            self.init_lr();
            return;
        }
        let part = Partition::random(self.table.len(), self.max_size, &mut self.rng);
        self.finish_init(part);
    }

    /// Starts from a given core. LR replicas always start empty or full,
    /// so a supplied core is ignored there.
    pub fn init_with(&mut self, core: Vec<usize>) {
        if matches!(self.strategy, Strategy::Lr(_)) {
            self.init_lr();
            return;
        }
        let part = Partition::from_core(core, self.table.len());
        self.finish_init(part);
    }

    fn init_lr(&mut self) {
        let n = self.table.len();
        let (l, r, exhaustive_seed) = match &self.strategy {
            Strategy::Lr(state) => (state.l, state.r, state.exhaustive_seed),
            _ => return,
        };
        let part = if l > r {
            // distance measures need at least a pair to be computable
            let pair = if exhaustive_seed {
                best_k_subset(&self.table, &self.pm, 2)
            } else {
                Partition::random(n, 2, &mut self.rng).core().to_vec()
            };
            Partition::from_core(pair, n)
        } else {
            Partition::full(n)
        };
        if let Strategy::Lr(state) = &mut self.strategy {
            state.history.clear();
            state.active.store(true, Ordering::Relaxed);
            state.skip_add = l <= r;
            state.total_steps = 0;
            state.stuck_polls = 0;
        }
        self.finish_init(part);
    }

    fn finish_init(&mut self, part: Partition) {
        self.part = part;
        self.cache = self.pm.new_cache(&self.table);
        self.score = self
            .pm
            .calculate(self.part.core(), &self.table, Some(&mut self.cache));
        // an LR seed outside the size bounds is not a reportable best
        let size = self.part.core_size();
        if size >= self.min_size && size <= self.max_size {
            self.best_core = self.part.core().to_vec();
            self.best_score = self.score;
        } else {
            self.best_core.clear();
            self.best_score = f64::NEG_INFINITY;
        }
        self.stuck = false;
        if let Strategy::Tabu {
            list,
            last_improvement,
            ..
        } = &mut self.strategy
        {
            list.clear();
            *last_improvement = f64::MAX;
        }
    }

    /// Runs one bounded burst of steps.
    pub fn do_steps(&mut self) {
        match self.strategy {
            Strategy::Local => self.local_steps(),
            Strategy::SimAn { .. } => self.sim_an_steps(),
            Strategy::Tabu { .. } => self.tabu_steps(),
            Strategy::Lr(_) => self.lr_steps(),
        }
    }

    fn burst_deadline(&self) -> Option<Instant> {
        self.burst_time.map(|d| Instant::now() + d)
    }

    fn local_steps(&mut self) {
        self.stuck = true;
        let deadline = self.burst_deadline();
        let mut i = 0;
        while burst_continues(self.steps, i, deadline, false) {
            let Some(nh) = self.nh.as_mut() else { return };
            let size = self.part.core_size();
            if nh.gen_random_neighbor(&mut self.part, &mut self.rng).is_none() {
                return;
            }
            let new_score = self
                .pm
                .calculate(self.part.core(), &self.table, Some(&mut self.cache));
            let new_size = self.part.core_size();

            if new_score > self.score || (new_score == self.score && new_size < size) {
                self.score = new_score;
                self.stuck = false;
            } else {
                nh.undo_last_perturbation(&mut self.part, None);
            }
            i += 1;
        }
        if self.score > self.best_score
            || (self.score == self.best_score && self.part.core_size() < self.best_core.len())
        {
            self.best_score = self.score;
            self.best_core = self.part.core().to_vec();
        }
    }

    fn sim_an_steps(&mut self) {
        self.stuck = true;
        let deadline = self.burst_deadline();
        let temperature = self.temperature();
        let mut i = 0;
        while burst_continues(self.steps, i, deadline, false) {
            let Some(nh) = self.nh.as_mut() else { return };
            let size = self.part.core_size();
            if nh.gen_random_neighbor(&mut self.part, &mut self.rng).is_none() {
                return;
            }
            let new_score = self
                .pm
                .calculate(self.part.core(), &self.table, Some(&mut self.cache));
            let new_size = self.part.core_size();
            let delta_score = new_score - self.score;

            if delta_score > 0.0 {
                self.score = new_score;
            } else if new_size > size {
                // no better score and the core grew: never accept
                nh.undo_last_perturbation(&mut self.part, None);
            } else {
                let p = (delta_score / (temperature * K_B)).exp();
                let q: f64 = self.rng.random();
                if q > p {
                    nh.undo_last_perturbation(&mut self.part, None);
                } else {
                    self.score = new_score;
                }
            }

            if self.score > self.best_score
                || (self.score == self.best_score && self.part.core_size() < self.best_core.len())
            {
                self.stuck = false;
                self.best_score = self.score;
                self.best_core = self.part.core().to_vec();
            }
            i += 1;
        }
    }

    fn tabu_steps(&mut self) {
        let Strategy::Tabu {
            last_improvement, ..
        } = &self.strategy
        else {
            return;
        };
        if *last_improvement < TABU_MIN_PROG {
            return;
        }
        self.stuck = true;
        let deadline = self.burst_deadline();
        let mut i = 0;
        while burst_continues(self.steps, i, deadline, false) {
            let Strategy::Tabu {
                list,
                capacity,
                last_improvement,
            } = &mut self.strategy
            else {
                return;
            };
            let Some(nh) = self.nh.as_mut() else { return };

            // always move, even when the best neighbor is worse
            let moved = nh.gen_best_neighbor(
                &mut self.part,
                Some(&mut *list),
                self.best_score,
                &self.pm,
                &self.table,
                &mut self.cache,
            );
            let Some(changed_position) = moved else {
                // every legal move is tabu, nothing to do this burst
                return;
            };
            self.score = self
                .pm
                .calculate(self.part.core(), &self.table, Some(&mut self.cache));

            if self.score > self.best_score
                || (self.score == self.best_score && self.part.core_size() < self.best_core.len())
            {
                self.stuck = false;
                *last_improvement = self.score - self.best_score;
                self.best_score = self.score;
                self.best_core = self.part.core().to_vec();
            }

            if list.len() == *capacity {
                list.pop_front();
            }
            list.push_back(changed_position);
            i += 1;
        }
    }

    fn lr_steps(&mut self) {
        let deadline = self.burst_deadline();
        let mut i = 0;
        loop {
            let Strategy::Lr(state) = &mut self.strategy else {
                return;
            };
            if !state.active.load(Ordering::Relaxed)
                || !burst_continues(self.steps, i, deadline, true)
            {
                return;
            }

            let round_start_score = self.score;
            let mut best_new_score = self.score;

            if state.skip_add {
                // the shrinking search starts from the full set, only the
                // very first round skips its addition phase
                state.skip_add = false;
            } else {
                for _ in 0..state.l {
                    if self.part.unselected.is_empty() {
                        state.active.store(false, Ordering::Relaxed);
                        return;
                    }
                    best_new_score = f64::NEG_INFINITY;
                    let mut best_add = 0;
                    for j in 0..self.part.unselected.len() {
                        self.part.core.push(self.part.unselected[j]);
                        let s = self
                            .pm
                            .calculate(&self.part.core, &self.table, Some(&mut self.cache));
                        if s > best_new_score {
                            best_new_score = s;
                            best_add = j;
                        }
                        self.part.core.pop();
                    }
                    let a = self.part.unselected.remove(best_add);
                    self.part.core.push(a);
                    state.history.push(Perturbation::Addition {
                        unsel_idx: best_add,
                    });
                }
            }

            for _ in 0..state.r {
                best_new_score = f64::NEG_INFINITY;
                let mut best_rem = 0;
                for j in 0..self.part.core.len() {
                    let a = self.part.core.remove(j);
                    let s = self
                        .pm
                        .calculate(&self.part.core, &self.table, Some(&mut self.cache));
                    if s > best_new_score {
                        best_new_score = s;
                        best_rem = j;
                    }
                    self.part.core.insert(j, a);
                }
                let a = self.part.core.remove(best_rem);
                self.part.unselected.push(a);
                state.history.push(Perturbation::Deletion {
                    core_idx: best_rem,
                    adjusts_tabu: false,
                });
            }

            let dscore = best_new_score - self.score;
            self.score = best_new_score;
            let size = self.part.core_size();

            if state.l > state.r {
                if size > self.max_size || (size > self.min_size && dscore <= 0.0) {
                    // out of bounds or no gain past the minimum size:
                    // revert the round
                    state.active.store(false, Ordering::Relaxed);
                    for _ in 0..(state.l + state.r) {
                        if let Some(pert) = state.history.pop() {
                            pert.undo(&mut self.part, None);
                        }
                    }
                    self.score = round_start_score;
                } else if size + state.l > self.max_size + state.r {
                    state.active.store(false, Ordering::Relaxed);
                }
            } else if size < self.min_size || (size < self.max_size && dscore < 0.0) {
                state.active.store(false, Ordering::Relaxed);
                for _ in 0..(state.l + state.r) {
                    if let Some(pert) = state.history.pop() {
                        pert.undo(&mut self.part, None);
                    }
                }
                self.score = round_start_score;
            } else if size + state.l < self.min_size + state.r {
                state.active.store(false, Ordering::Relaxed);
            }

            let size = self.part.core_size();
            if size >= self.min_size
                && size <= self.max_size
                && (self.score > self.best_score
                    || (self.score == self.best_score && size < self.best_core.len()))
            {
                self.best_score = self.score;
                self.best_core = self.part.core().to_vec();
            }
            trace!(
                "lr round {}: size {} score {:.6}",
                state.total_steps,
                self.part.core_size(),
                self.score
            );
            state.total_steps += 1;
            i += 1;
        }
    }

    /// Requests cooperative stop of an LR replica; handle shared with the
    /// thread running it.
    pub fn stop_handle(&self) -> Option<Arc<AtomicBool>> {
        match &self.strategy {
            Strategy::Lr(state) => Some(Arc::clone(&state.active)),
            _ => None,
        }
    }

    /// Whether an LR replica has finished its deterministic trajectory.
    pub fn is_done(&self) -> bool {
        match &self.strategy {
            Strategy::Lr(state) => !state.active.load(Ordering::Relaxed),
            _ => false,
        }
    }

    /// Whether the last burst made no progress. A finished LR replica only
    /// reports stuck after a few polls, giving the orchestrator time to
    /// collect its result.
    pub fn stuck(&mut self) -> bool {
        match &mut self.strategy {
            Strategy::Tabu {
                last_improvement, ..
            } => self.stuck || *last_improvement < TABU_MIN_PROG,
            Strategy::Lr(state) => {
                state.stuck_polls += 1;
                !state.active.load(Ordering::Relaxed) && state.stuck_polls > LR_STUCK_STAY
            }
            _ => self.stuck,
        }
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    pub fn best_core(&self) -> &[usize] {
        &self.best_core
    }

    pub fn core(&self) -> &[usize] {
        self.part.core()
    }

    /// Annealing temperature; zero for non-annealing strategies.
    pub fn temperature(&self) -> f64 {
        match self.strategy {
            Strategy::SimAn { temperature } => temperature,
            _ => 0.0,
        }
    }

    pub fn set_temperature(&mut self, temp: f64) {
        if let Strategy::SimAn { temperature } = &mut self.strategy {
            *temperature = temp.max(0.0);
        }
    }
}

/// Whether a burst may take another step. `unbounded_ok` lets a fully
/// unconstrained burst run until the strategy itself stops (LR).
fn burst_continues(
    steps: Option<usize>,
    done: usize,
    deadline: Option<Instant>,
    unbounded_ok: bool,
) -> bool {
    match (steps, deadline) {
        (Some(n), Some(d)) => done < n || Instant::now() < d,
        (Some(n), None) => done < n,
        (None, Some(d)) => Instant::now() < d,
        (None, None) => unbounded_ok,
    }
}
