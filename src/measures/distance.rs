//! Genetic distances between accessions.
//!
//! Pairwise values are memoized in a triangular matrix indexed by accession
//! id. The matrix is shared by every replica evaluating the same measure,
//! so it sits behind a `RwLock`; two replicas may race to compute the same
//! entry, which is benign because the value is deterministic.

use std::sync::RwLock;

use crate::data::{Accession, AccessionTable};

/// Initial number of accessions the memoization matrix is sized for.
const DEFAULT_CAPACITY: usize = 512;

/// Hard cap on matrix growth; distances above this id are recomputed.
const MAX_CAPACITY: usize = 8192;

/// Distance formula between two allele-frequency profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DistanceKind {
    /// Modified Rogers distance.
    ModifiedRogers,
    /// Cavalli-Sforza & Edwards distance (on square roots of frequencies).
    CavalliSforzaEdwards,
}

impl DistanceKind {
    /// Distance between two bound marker profiles.
    ///
    /// Marker positions where either frequency is missing contribute zero
    /// difference; the marker still counts towards the normalization, as in
    /// the reference formulas.
    pub fn profile_distance(
        self,
        a: &[Vec<Option<f64>>],
        b: &[Vec<Option<f64>>],
    ) -> f64 {
        let mut marker_count: f64 = 0.0;
        let mut sum_sq_diff = 0.0;
        for (ma, mb) in a.iter().zip(b.iter()) {
            for (fa, fb) in ma.iter().zip(mb.iter()) {
                if let (Some(fa), Some(fb)) = (fa, fb) {
                    let d = match self {
                        DistanceKind::ModifiedRogers => fa - fb,
                        DistanceKind::CavalliSforzaEdwards => fa.sqrt() - fb.sqrt(),
                    };
                    sum_sq_diff += d * d;
                }
            }
            marker_count += 1.0;
        }
        if marker_count == 0.0 {
            return 0.0;
        }
        sum_sq_diff.sqrt() / (2.0 * marker_count).sqrt()
    }
}

/// Grow-on-demand triangular matrix of memoized pairwise distances,
/// NaN-initialized.
#[derive(Debug)]
struct DistanceMatrix {
    rows: RwLock<Vec<Vec<f64>>>,
}

impl DistanceMatrix {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_CAPACITY);
        let rows = (0..capacity).map(|i| vec![f64::NAN; i + 1]).collect();
        Self {
            rows: RwLock::new(rows),
        }
    }

    fn get(&self, id1: usize, id2: usize) -> Option<f64> {
        let (a, b) = (id1.max(id2), id1.min(id2));
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        let v = *rows.get(a)?.get(b)?;
        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    }

    fn set(&self, id1: usize, id2: usize, value: f64) {
        let (a, b) = (id1.max(id2), id1.min(id2));
        if a >= MAX_CAPACITY {
            return;
        }
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        while rows.len() <= a {
            let i = rows.len();
            rows.push(vec![f64::NAN; i + 1]);
        }
        rows[a][b] = value;
    }
}

/// A distance formula together with its shared memoization matrix.
#[derive(Debug)]
pub struct PairDistance {
    kind: DistanceKind,
    matrix: DistanceMatrix,
}

impl PairDistance {
    pub fn new(kind: DistanceKind) -> Self {
        Self::with_capacity(kind, DEFAULT_CAPACITY)
    }

    /// Pre-sizes the memoization matrix for `accession_count` accessions.
    pub fn with_capacity(kind: DistanceKind, accession_count: usize) -> Self {
        Self {
            kind,
            matrix: DistanceMatrix::new(accession_count),
        }
    }

    pub fn kind(&self) -> DistanceKind {
        self.kind
    }

    /// Memoized distance between two accessions.
    pub fn between(&self, a: &Accession, b: &Accession) -> f64 {
        if let Some(v) = self.matrix.get(a.id(), b.id()) {
            return v;
        }
        let v = self.kind.profile_distance(a.markers(), b.markers());
        self.matrix.set(a.id(), b.id(), v);
        v
    }

    /// Memoized distance between two table entries.
    pub fn between_ids(&self, a: usize, b: usize, table: &AccessionTable) -> f64 {
        self.between(table.get(a), table.get(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::reference_table;

    const EPS: f64 = 1e-5;

    #[test]
    fn test_modified_rogers_reference_values() {
        let table = reference_table();
        let mr = PairDistance::new(DistanceKind::ModifiedRogers);
        let expected = [
            (0, 1, 0.374165738677394),
            (0, 2, 0.070710678118655),
            (0, 3, 0.374165738677394),
            (1, 2, 0.308220700148449),
            (1, 3, 0.500000000000000),
            (2, 3, 0.308220700148449),
        ];
        for (a, b, d) in expected {
            assert!(
                (mr.between_ids(a, b, &table) - d).abs() < EPS,
                "MR({a},{b}) expected {d}"
            );
        }
    }

    #[test]
    fn test_distance_is_symmetric_and_memoized() {
        let table = reference_table();
        let mr = PairDistance::new(DistanceKind::ModifiedRogers);
        let d1 = mr.between_ids(1, 3, &table);
        let d2 = mr.between_ids(3, 1, &table);
        assert_eq!(d1, d2);
        assert_eq!(mr.matrix.get(3, 1), Some(d1));
    }

    #[test]
    fn test_cavalli_sforza_differs_from_rogers() {
        let table = reference_table();
        let mr = DistanceKind::ModifiedRogers;
        let ce = DistanceKind::CavalliSforzaEdwards;
        let a = table.get(0).markers();
        let b = table.get(1).markers();
        let dm = mr.profile_distance(a, b);
        let dc = ce.profile_distance(a, b);
        assert!(dm > 0.0 && dc > 0.0);
        assert!((dm - dc).abs() > 1e-9);
    }

    #[test]
    fn test_all_missing_profiles_give_zero() {
        let kind = DistanceKind::ModifiedRogers;
        let a = vec![vec![None, None]];
        let b = vec![vec![Some(0.5), Some(0.5)]];
        assert_eq!(kind.profile_distance(&a, &b), 0.0);
    }

    #[test]
    fn test_matrix_grows_on_demand() {
        let m = DistanceMatrix::new(2);
        assert_eq!(m.get(100, 3), None);
        m.set(100, 3, 0.5);
        assert_eq!(m.get(3, 100), Some(0.5));
    }
}
