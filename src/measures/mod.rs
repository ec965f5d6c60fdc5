//! Diversity and distance measures with incremental scoring.
//!
//! A [`Measure`] computes one statistic of a candidate core subset.
//! Distance measures aggregate memoized pairwise distances as either a
//! mean or a minimum; the diversity indices maintain running allele
//! totals. Every measure honours the incremental-cache contract: given the
//! [`ScoreCache`] entry it produced for the previously scored subset, it
//! re-evaluates in `O(|Δ| · |S|)` instead of `O(|S|²)`.
//!
//! [`PseudoMeasure`] combines registered measures into a single scalar
//! fitness `Σ wᵢ · signᵢ · mᵢ(S)`, where the sign is negative only for
//! minimizing measures.

pub mod cache;
mod distance;
mod diversity;

pub use cache::{CacheId, MeasureState, ScoreCache};
pub use distance::{DistanceKind, PairDistance};

use crate::data::AccessionTable;
use crate::error::CoreHunterError;
use cache::{DistKey, PrevSubset};

/// Registry names of every available measure.
pub const MEASURE_NAMES: &[&str] = &[
    "MR", "MRmin", "CE", "CEmin", "SH", "HE", "NE", "PN", "CV", "EX",
];

/// How pairwise distances are folded into one subset statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DistanceAggregate {
    /// Mean over all pairs in the subset.
    Mean,
    /// Smallest pairwise distance in the subset.
    Min,
}

/// One subset statistic with its incremental-cache contract.
#[derive(Debug)]
pub enum Measure {
    /// Aggregated genetic distance (`MR`, `MRmin`, `CE`, `CEmin`).
    Distance {
        pair: PairDistance,
        aggregate: DistanceAggregate,
    },
    /// Shannon's diversity index over pooled allele frequencies (`SH`).
    Shannon,
    /// Expected proportion of heterozygous loci (`HE`).
    Heterozygosity,
    /// Number of effective alleles (`NE`).
    EffectiveAlleles,
    /// Proportion of non-informative alleles (`PN`, minimizing).
    NonInformative,
    /// Allele coverage relative to the full collection (`CV`, `1 − PN`).
    Coverage,
    /// Mean externally supplied distance (`EX`).
    External,
}

impl Measure {
    /// Looks a measure up by registry name.
    ///
    /// `accession_count` pre-sizes the pairwise memoization matrix of
    /// distance measures.
    pub fn from_name(name: &str, accession_count: usize) -> Result<Self, CoreHunterError> {
        let dist = |kind, aggregate| Measure::Distance {
            pair: PairDistance::with_capacity(kind, accession_count),
            aggregate,
        };
        match name {
            "MR" => Ok(dist(DistanceKind::ModifiedRogers, DistanceAggregate::Mean)),
            "MRmin" => Ok(dist(DistanceKind::ModifiedRogers, DistanceAggregate::Min)),
            "CE" => Ok(dist(
                DistanceKind::CavalliSforzaEdwards,
                DistanceAggregate::Mean,
            )),
            "CEmin" => Ok(dist(
                DistanceKind::CavalliSforzaEdwards,
                DistanceAggregate::Min,
            )),
            "SH" => Ok(Measure::Shannon),
            "HE" => Ok(Measure::Heterozygosity),
            "NE" => Ok(Measure::EffectiveAlleles),
            "PN" => Ok(Measure::NonInformative),
            "CV" => Ok(Measure::Coverage),
            "EX" => Ok(Measure::External),
            _ => Err(CoreHunterError::UnknownMeasure(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Measure::Distance { pair, aggregate } => {
                match (pair.kind(), aggregate) {
                    (DistanceKind::ModifiedRogers, DistanceAggregate::Mean) => "MR",
                    (DistanceKind::ModifiedRogers, DistanceAggregate::Min) => "MRmin",
                    (DistanceKind::CavalliSforzaEdwards, DistanceAggregate::Mean) => "CE",
                    (DistanceKind::CavalliSforzaEdwards, DistanceAggregate::Min) => "CEmin",
                }
            }
            Measure::Shannon => "SH",
            Measure::Heterozygosity => "HE",
            Measure::EffectiveAlleles => "NE",
            Measure::NonInformative => "PN",
            Measure::Coverage => "CV",
            Measure::External => "EX",
        }
    }

    /// Whether lower values of this measure are better.
    pub fn is_minimizing(&self) -> bool {
        matches!(self, Measure::NonInformative)
    }

    /// Creates an empty aggregate state for this measure.
    pub fn new_state(&self, table: &AccessionTable) -> MeasureState {
        let shape = table.accessions().first();
        match self {
            Measure::Distance { aggregate, .. } => match aggregate {
                DistanceAggregate::Mean => MeasureState::MeanDistance {
                    prev: PrevSubset::default(),
                    total: 0.0,
                    count: 0.0,
                },
                DistanceAggregate::Min => MeasureState::MinDistance {
                    prev: PrevSubset::default(),
                    counts: Default::default(),
                },
            },
            Measure::Shannon => MeasureState::AlleleTotals {
                prev: PrevSubset::default(),
                totals: vec![0.0; shape.map_or(0, |a| a.num_alleles())],
                total: 0.0,
            },
            Measure::Heterozygosity | Measure::EffectiveAlleles => MeasureState::MarkerTotals {
                prev: PrevSubset::default(),
                totals: shape.map_or_else(Vec::new, |a| {
                    a.markers().iter().map(|m| vec![0.0; m.len()]).collect()
                }),
            },
            Measure::NonInformative | Measure::Coverage => MeasureState::AlleleCounts {
                prev: PrevSubset::default(),
                counts: vec![0; shape.map_or(0, |a| a.num_alleles())],
            },
            Measure::External => MeasureState::ExternalSum {
                prev: PrevSubset::default(),
                sum: 0.0,
            },
        }
    }

    /// Incrementally re-evaluates the measure for `core`, folding the
    /// membership delta since the previous call into `state`.
    pub fn calculate(
        &self,
        core: &[usize],
        table: &AccessionTable,
        state: &mut MeasureState,
    ) -> f64 {
        match (self, state) {
            (
                Measure::Distance { pair, aggregate },
                MeasureState::MeanDistance { prev, total, count },
            ) => {
                debug_assert_eq!(*aggregate, DistanceAggregate::Mean);
                let diff = prev.diff(core);
                for &a in &diff.added {
                    for &b in &diff.common {
                        *total += pair.between_ids(a, b, table);
                        *count += 1.0;
                    }
                }
                for &r in &diff.removed {
                    for &b in &diff.common {
                        *total -= pair.between_ids(r, b, table);
                        *count -= 1.0;
                    }
                }
                for i in 0..diff.added.len() {
                    for j in i + 1..diff.added.len() {
                        *total += pair.between_ids(diff.added[i], diff.added[j], table);
                        *count += 1.0;
                    }
                }
                for i in 0..diff.removed.len() {
                    for j in i + 1..diff.removed.len() {
                        *total -= pair.between_ids(diff.removed[i], diff.removed[j], table);
                        *count -= 1.0;
                    }
                }
                prev.replace(core);
                if *count > 0.0 {
                    *total / *count
                } else {
                    0.0
                }
            }
            (
                Measure::Distance { pair, aggregate },
                MeasureState::MinDistance { prev, counts },
            ) => {
                debug_assert_eq!(*aggregate, DistanceAggregate::Min);
                let diff = prev.diff(core);
                let mut bump = |a: usize, b: usize, sign: i64| {
                    let key = DistKey::new(pair.between_ids(a, b, table));
                    if sign > 0 {
                        *counts.entry(key).or_insert(0) += 1;
                    } else if let Some(c) = counts.get_mut(&key) {
                        *c -= 1;
                        if *c == 0 {
                            counts.remove(&key);
                        }
                    }
                };
                for &a in &diff.added {
                    for &b in &diff.common {
                        bump(a, b, 1);
                    }
                }
                for &r in &diff.removed {
                    for &b in &diff.common {
                        bump(r, b, -1);
                    }
                }
                for i in 0..diff.added.len() {
                    for j in i + 1..diff.added.len() {
                        bump(diff.added[i], diff.added[j], 1);
                    }
                }
                for i in 0..diff.removed.len() {
                    for j in i + 1..diff.removed.len() {
                        bump(diff.removed[i], diff.removed[j], -1);
                    }
                }
                prev.replace(core);
                counts.keys().next().map_or(0.0, |k| k.value())
            }
            (Measure::Shannon, MeasureState::AlleleTotals { prev, totals, total }) => {
                let diff = prev.diff(core);
                diversity::apply_flat_delta(totals, total, &diff, table);
                prev.replace(core);
                diversity::shannon_index(totals, *total)
            }
            (Measure::Heterozygosity, MeasureState::MarkerTotals { prev, totals }) => {
                let diff = prev.diff(core);
                diversity::apply_marker_delta(totals, &diff, table);
                prev.replace(core);
                diversity::heterozygosity(totals)
            }
            (Measure::EffectiveAlleles, MeasureState::MarkerTotals { prev, totals }) => {
                let diff = prev.diff(core);
                diversity::apply_marker_delta(totals, &diff, table);
                prev.replace(core);
                diversity::effective_alleles(totals)
            }
            (Measure::NonInformative, MeasureState::AlleleCounts { prev, counts }) => {
                let diff = prev.diff(core);
                diversity::apply_count_delta(counts, &diff, table);
                prev.replace(core);
                diversity::non_informative(counts)
            }
            (Measure::Coverage, MeasureState::AlleleCounts { prev, counts }) => {
                let diff = prev.diff(core);
                diversity::apply_count_delta(counts, &diff, table);
                prev.replace(core);
                1.0 - diversity::non_informative(counts)
            }
            (Measure::External, MeasureState::ExternalSum { prev, sum }) => {
                let diff = prev.diff(core);
                for &id in &diff.added {
                    // presence is validated before any search starts
                    *sum += table.get(id).external_distance().unwrap_or(0.0);
                }
                for &id in &diff.removed {
                    *sum -= table.get(id).external_distance().unwrap_or(0.0);
                }
                prev.replace(core);
                if core.is_empty() {
                    0.0
                } else {
                    *sum / core.len() as f64
                }
            }
            _ => unreachable!("cache state does not match measure"),
        }
    }

    /// From-scratch evaluation through a one-shot state.
    pub fn calculate_fresh(&self, core: &[usize], table: &AccessionTable) -> f64 {
        let mut state = self.new_state(table);
        self.calculate(core, table, &mut state)
    }
}

/// Weighted linear combination of registered measures.
///
/// Shared read-only between replicas; each replica scores through its own
/// [`ScoreCache`] handle obtained from [`PseudoMeasure::new_cache`].
#[derive(Debug, Default)]
pub struct PseudoMeasure {
    entries: Vec<(Measure, f64)>,
}

impl PseudoMeasure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a pseudo-measure from `(registry name, weight)` pairs.
    pub fn from_names(
        weighted_names: &[(&str, f64)],
        accession_count: usize,
    ) -> Result<Self, CoreHunterError> {
        let mut pm = Self::new();
        for &(name, weight) in weighted_names {
            pm.add_measure(Measure::from_name(name, accession_count)?, weight)?;
        }
        Ok(pm)
    }

    /// Registers a measure under its name; names must be unique.
    pub fn add_measure(&mut self, measure: Measure, weight: f64) -> Result<(), CoreHunterError> {
        if self.entries.iter().any(|(m, _)| m.name() == measure.name()) {
            return Err(CoreHunterError::DuplicateMeasure(
                measure.name().to_string(),
            ));
        }
        self.entries.push((measure, weight));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fresh incremental cache with one empty state per registered measure.
    pub fn new_cache(&self, table: &AccessionTable) -> ScoreCache {
        ScoreCache::new(self.entries.iter().map(|(m, _)| m.new_state(table)).collect())
    }

    /// Weighted fitness of `core`; incremental when a cache is supplied.
    pub fn calculate(
        &self,
        core: &[usize],
        table: &AccessionTable,
        mut cache: Option<&mut ScoreCache>,
    ) -> f64 {
        let mut score = 0.0;
        for (i, (m, weight)) in self.entries.iter().enumerate() {
            let mut s = match cache.as_mut() {
                Some(c) => m.calculate(core, table, &mut c.states[i]),
                None => m.calculate_fresh(core, table),
            };
            if m.is_minimizing() {
                s = -s;
            }
            score += s * weight;
        }
        score
    }

    /// Unweighted per-measure values, in registration order.
    pub fn component_scores(
        &self,
        core: &[usize],
        table: &AccessionTable,
        mut cache: Option<&mut ScoreCache>,
    ) -> Vec<(String, f64)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, (m, _))| {
                let s = match cache.as_mut() {
                    Some(c) => m.calculate(core, table, &mut c.states[i]),
                    None => m.calculate_fresh(core, table),
                };
                (m.name().to_string(), s)
            })
            .collect()
    }

    /// Checks requirements that depend on the dataset, before any search
    /// starts: the external distance measure needs a distance on every
    /// accession.
    pub fn validate(&self, table: &AccessionTable) -> Result<(), CoreHunterError> {
        if self.entries.iter().any(|(m, _)| matches!(m, Measure::External)) {
            for a in table.accessions() {
                if a.external_distance().is_none() {
                    return Err(CoreHunterError::MissingExternalDistance(
                        a.name().to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{reference_table, AccessionTable, TraitSource};
    use proptest::prelude::*;

    const EPS: f64 = 1e-5;

    fn pm(names: &[(&str, f64)]) -> PseudoMeasure {
        PseudoMeasure::from_names(names, 4).unwrap()
    }

    #[test]
    fn test_mean_rogers_reference_value() {
        let table = reference_table();
        let pm = pm(&[("MR", 1.0)]);
        let score = pm.calculate(&[0, 1, 2, 3], &table, None);
        assert!(
            (score - 0.32258).abs() < EPS,
            "expected 0.32258, got {score}"
        );
    }

    #[test]
    fn test_cached_matches_fresh_after_move_sequence() {
        let table = reference_table();
        let subsets: [&[usize]; 6] = [
            &[0, 1],
            &[0, 1, 2],
            &[1, 2],
            &[1, 2, 3],
            &[0, 3],
            &[0, 1, 2, 3],
        ];
        for name in MEASURE_NAMES.iter().filter(|&&n| n != "EX") {
            let m = Measure::from_name(name, 4).unwrap();
            let mut state = m.new_state(&table);
            for core in subsets {
                let cached = m.calculate(core, &table, &mut state);
                let fresh = m.calculate_fresh(core, &table);
                assert!(
                    (cached - fresh).abs() < 1e-10,
                    "{name}: cached {cached} != fresh {fresh} for {core:?}"
                );
            }
        }
    }

    #[test]
    fn test_min_distance_is_smallest_pair() {
        let table = reference_table();
        let m = Measure::from_name("MRmin", 4).unwrap();
        let v = m.calculate_fresh(&[0, 1, 2, 3], &table);
        // smallest reference pairwise value is MR(A1, A3)
        assert!((v - 0.070710678118655).abs() < EPS);
    }

    #[test]
    fn test_duplicate_measure_rejected() {
        let mut pm = PseudoMeasure::new();
        pm.add_measure(Measure::from_name("SH", 4).unwrap(), 1.0)
            .unwrap();
        let err = pm.add_measure(Measure::from_name("SH", 4).unwrap(), 0.5);
        assert!(matches!(err, Err(CoreHunterError::DuplicateMeasure(_))));
    }

    #[test]
    fn test_unknown_measure_rejected() {
        assert!(matches!(
            Measure::from_name("nope", 4),
            Err(CoreHunterError::UnknownMeasure(_))
        ));
    }

    #[test]
    fn test_minimizing_sign_applied() {
        let table = reference_table();
        let pm = pm(&[("PN", 1.0)]);
        let raw = Measure::from_name("PN", 4)
            .unwrap()
            .calculate_fresh(&[2], &table);
        assert!(raw > 0.0, "A3 misses alleles, PN must be positive");
        let score = pm.calculate(&[2], &table, None);
        assert!((score + raw).abs() < 1e-12, "PN contributes negated");
    }

    #[test]
    fn test_coverage_complements_non_informative() {
        let table = reference_table();
        let cv = Measure::from_name("CV", 4).unwrap();
        let pn = Measure::from_name("PN", 4).unwrap();
        for core in [&[0][..], &[1, 2][..], &[0, 1, 2, 3][..]] {
            let c = cv.calculate_fresh(core, &table);
            let p = pn.calculate_fresh(core, &table);
            assert!((c + p - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_component_scores_are_unweighted() {
        let table = reference_table();
        let pm = pm(&[("MR", 2.0), ("SH", 0.5)]);
        let components = pm.component_scores(&[0, 1, 2, 3], &table, None);
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].0, "MR");
        assert!((components[0].1 - 0.32258).abs() < EPS);
    }

    #[test]
    fn test_external_requires_distances() {
        let table = reference_table();
        let pm = pm(&[("EX", 1.0)]);
        assert!(matches!(
            pm.validate(&table),
            Err(CoreHunterError::MissingExternalDistance(_))
        ));

        let mut with_ext = AccessionTable::new();
        for (i, d) in [0.1, 0.4].iter().enumerate() {
            with_ext
                .add_with_external(format!("a{i}"), TraitSource::Dart(vec![Some(1.0)]), *d)
                .unwrap();
        }
        let pm = PseudoMeasure::from_names(&[("EX", 1.0)], 2).unwrap();
        pm.validate(&with_ext).unwrap();
        let score = pm.calculate(&[0, 1], &with_ext, None);
        assert!((score - 0.25).abs() < 1e-12);
    }

    proptest! {
        // The incremental cache must agree with a from-scratch recomputation
        // after an arbitrary sequence of subset changes.
        #[test]
        fn prop_incremental_matches_fresh(
            subsets in proptest::collection::vec(
                proptest::collection::btree_set(0usize..4, 1..=4),
                1..12,
            )
        ) {
            let table = reference_table();
            for name in ["MR", "MRmin", "SH", "HE", "NE", "PN", "CV"] {
                let m = Measure::from_name(name, 4).unwrap();
                let mut state = m.new_state(&table);
                for subset in &subsets {
                    let core: Vec<usize> = subset.iter().copied().collect();
                    let cached = m.calculate(&core, &table, &mut state);
                    let fresh = m.calculate_fresh(&core, &table);
                    prop_assert!(
                        (cached - fresh).abs() < 1e-10,
                        "{} diverged on {:?}: {} vs {}", name, core, cached, fresh
                    );
                }
            }
        }
    }
}
