//! Genetic population over candidate cores.
//!
//! Individuals are scored cores kept sorted best-first (higher score wins,
//! smaller size breaks ties). Generations follow the classic loop:
//! tournament parent selection, stratified crossover, low-probability
//! mutation, then survival selection that keeps the elite plus a few
//! random survivors so the population does not collapse prematurely.
//!
//! Crossover is stratified rather than positional: the union of both
//! parents is clustered into as many groups as the child has slots and one
//! accession is drawn per group, so the child spreads over the combined
//! genetic range of its parents instead of inheriting contiguous chunks.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cluster::{ClusterDistance, ClusterDistanceKind, Clustering};
use crate::data::{AccessionTable, Partition};
use crate::measures::{DistanceKind, PseudoMeasure};

#[derive(Debug, Clone)]
struct ScoredCore {
    core: Vec<usize>,
    score: f64,
}

/// Ranked population of candidate cores.
pub struct GeneticPopulation {
    pop: Vec<ScoredCore>,
    pop_size: usize,
    min_size: usize,
    max_size: usize,
    children: usize,
    tournament: usize,
    mutation_rate: f64,
    random_survival: usize,
    clustering: Clustering,
    table: Arc<AccessionTable>,
    pm: Arc<PseudoMeasure>,
    rng: StdRng,
}

impl GeneticPopulation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pop_size: usize,
        min_size: usize,
        max_size: usize,
        table: Arc<AccessionTable>,
        pm: Arc<PseudoMeasure>,
        children: usize,
        tournament: usize,
        mutation_rate: f64,
        seed: u64,
    ) -> Self {
        let clustering = Clustering::new(
            max_size,
            ClusterDistance::new(
                ClusterDistanceKind::GroupAverage,
                DistanceKind::ModifiedRogers,
                table.len(),
            ),
        );
        Self {
            pop: Vec::with_capacity(pop_size),
            pop_size,
            min_size,
            max_size,
            children,
            tournament,
            mutation_rate,
            random_survival: (children / 2).max(1),
            clustering,
            table,
            pm,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Builds the initial population: every fourth individual is uniform
    /// random, the rest are stratified samples over the whole collection.
    pub fn init(&mut self) {
        let n = self.table.len();
        self.pop.clear();
        for i in 0..self.pop_size {
            let size = self
                .rng
                .random_range(self.min_size..=self.max_size)
                .min(n);
            let core = if i % 4 == 0 {
                Partition::random(n, size, &mut self.rng).core().to_vec()
            } else {
                self.clustering.reset();
                self.clustering.set_target(size);
                for id in 0..n {
                    self.clustering.add_accession(id, &self.table);
                }
                self.clustering.sample_stratified(&mut self.rng)
            };
            // fresh unrelated sets, caching buys nothing here
            let score = self.pm.calculate(&core, &self.table, None);
            self.pop.push(ScoredCore { core, score });
        }
        self.sort();
    }

    pub fn best_core(&self) -> &[usize] {
        &self.pop[0].core
    }

    pub fn best_score(&self) -> f64 {
        self.pop[0].score
    }

    pub fn len(&self) -> usize {
        self.pop.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pop.is_empty()
    }

    /// Advances one generation: selection, crossover, mutation, survival.
    pub fn next_gen(&mut self) {
        let parents = self.select_parents();
        self.crossover_and_mutate(&parents);
        self.survival_selection();
    }

    fn select_parents(&mut self) -> Vec<Vec<usize>> {
        let mut parents = Vec::with_capacity(2 * self.children);
        for _ in 0..2 * self.children {
            let mut best: Option<&ScoredCore> = None;
            for _ in 0..self.tournament {
                let candidate = &self.pop[self.rng.random_range(0..self.pop.len())];
                if best.map_or(true, |b| candidate.score > b.score) {
                    best = Some(candidate);
                }
            }
            if let Some(best) = best {
                parents.push(best.core.clone());
            }
        }
        parents
    }

    fn crossover_and_mutate(&mut self, parents: &[Vec<usize>]) {
        for pair in parents.chunks_exact(2) {
            let mut child = stratified_crossover(
                &pair[0],
                &pair[1],
                &mut self.clustering,
                &self.table,
                &mut self.rng,
            );
            if self.rng.random::<f64>() <= self.mutation_rate {
                mutate(
                    &mut child,
                    self.min_size,
                    self.max_size,
                    self.table.len(),
                    &mut self.rng,
                );
            }
            let score = self.pm.calculate(&child, &self.table, None);
            self.pop.push(ScoredCore { core: child, score });
        }
    }

    fn survival_selection(&mut self) {
        self.sort();
        self.pop.truncate(self.pop_size + self.random_survival);
        // thin randomly down to size, never touching the best individual
        while self.pop.len() > self.pop_size {
            let idx = self.rng.random_range(1..self.pop.len());
            self.pop.remove(idx);
        }
    }

    fn sort(&mut self) {
        self.pop.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.core.len().cmp(&b.core.len()))
        });
    }
}

/// Crossover of two cores: cluster the union into a size drawn between the
/// parents' sizes and sample one accession per cluster.
pub(crate) fn stratified_crossover<R: Rng>(
    parent1: &[usize],
    parent2: &[usize],
    clustering: &mut Clustering,
    table: &AccessionTable,
    rng: &mut R,
) -> Vec<usize> {
    let mut union: Vec<usize> = parent1.to_vec();
    for &id in parent2 {
        if !union.contains(&id) {
            union.push(id);
        }
    }
    let lo = parent1.len().min(parent2.len());
    let hi = parent1.len().max(parent2.len());
    let child_size = rng.random_range(lo..=hi).min(union.len());

    clustering.reset();
    clustering.set_target(child_size);
    for &id in &union {
        clustering.add_accession(id, table);
    }
    clustering.sample_stratified(rng)
}

/// Random single-accession mutation: add, remove or swap with the
/// complement, respecting the size bounds.
pub(crate) fn mutate<R: Rng>(
    core: &mut Vec<usize>,
    min_size: usize,
    max_size: usize,
    n: usize,
    rng: &mut R,
) {
    let mut member = vec![false; n];
    for &id in core.iter() {
        member[id] = true;
    }
    let complement: Vec<usize> = (0..n).filter(|&id| !member[id]).collect();

    let r: f64 = rng.random();
    if r <= 0.33 && core.len() < max_size && !complement.is_empty() {
        core.push(complement[rng.random_range(0..complement.len())]);
    } else if r <= 0.66 && core.len() > min_size {
        core.remove(rng.random_range(0..core.len()));
    } else if !complement.is_empty() {
        let pos = rng.random_range(0..core.len());
        core[pos] = complement[rng.random_range(0..complement.len())];
    }
}
