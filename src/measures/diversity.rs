//! Allele-frequency diversity statistics.
//!
//! All four indices are computed from running allele totals maintained by
//! the incremental cache; the functions here only apply membership deltas
//! and evaluate the closed-form index on the current totals. NaN arising
//! from an all-missing marker is treated as zero contribution.

use crate::data::AccessionTable;
use crate::measures::cache::SubsetDiff;

/// Running totals below this magnitude are cancellation residue from
/// removed accessions and are snapped to exactly zero.
const TOTAL_EPS: f64 = 1e-9;

/// Folds added/removed accessions into flat per-allele totals and the
/// grand total (Shannon).
pub(crate) fn apply_flat_delta(
    totals: &mut [f64],
    total: &mut f64,
    diff: &SubsetDiff,
    table: &AccessionTable,
) {
    for (&id, sign) in diff
        .added
        .iter()
        .map(|id| (id, 1.0))
        .chain(diff.removed.iter().map(|id| (id, -1.0)))
    {
        let mut i = 0;
        for marker in table.get(id).markers() {
            for freq in marker {
                if let Some(f) = freq {
                    totals[i] += sign * f;
                    if totals[i].abs() < TOTAL_EPS {
                        totals[i] = 0.0;
                    }
                    *total += sign * f;
                }
                i += 1;
            }
        }
    }
    if total.abs() < TOTAL_EPS {
        *total = 0.0;
    }
}

/// Folds added/removed accessions into per-marker allele totals (HE, NE).
pub(crate) fn apply_marker_delta(
    totals: &mut [Vec<f64>],
    diff: &SubsetDiff,
    table: &AccessionTable,
) {
    for (&id, sign) in diff
        .added
        .iter()
        .map(|id| (id, 1.0))
        .chain(diff.removed.iter().map(|id| (id, -1.0)))
    {
        for (m, marker) in table.get(id).markers().iter().enumerate() {
            for (a, freq) in marker.iter().enumerate() {
                if let Some(f) = freq {
                    totals[m][a] += sign * f;
                    if totals[m][a].abs() < TOTAL_EPS {
                        totals[m][a] = 0.0;
                    }
                }
            }
        }
    }
}

/// Folds added/removed accessions into per-allele presence counts (PN, CV).
pub(crate) fn apply_count_delta(
    counts: &mut [i64],
    diff: &SubsetDiff,
    table: &AccessionTable,
) {
    for (&id, sign) in diff
        .added
        .iter()
        .map(|id| (id, 1i64))
        .chain(diff.removed.iter().map(|id| (id, -1i64)))
    {
        let mut i = 0;
        for marker in table.get(id).markers() {
            for freq in marker {
                if let Some(f) = freq {
                    if *f > 0.0 {
                        counts[i] += sign;
                    }
                }
                i += 1;
            }
        }
    }
}

/// Shannon's diversity index over flat allele totals: `−Σ f·ln f` with
/// `f = total_i / total`.
pub(crate) fn shannon_index(totals: &[f64], total: f64) -> f64 {
    let mut sum = 0.0;
    for &t in totals {
        let fraction = t / total;
        if fraction.is_nan() || fraction == 0.0 {
            continue;
        }
        let term = fraction * fraction.ln();
        if !term.is_nan() {
            sum += term;
        }
    }
    -sum
}

/// Expected proportion of heterozygous loci: mean over markers of
/// `1 − Σ t² / (Σ t)²`.
pub(crate) fn heterozygosity(totals: &[Vec<f64>]) -> f64 {
    if totals.is_empty() {
        return 0.0;
    }
    let mut diversity_total = 0.0;
    for marker in totals {
        let locus_total: f64 = marker.iter().sum();
        let locus_term: f64 = marker.iter().map(|t| t * t).sum();
        if locus_total > 0.0 {
            diversity_total += 1.0 - locus_term / (locus_total * locus_total);
        }
    }
    diversity_total / totals.len() as f64
}

/// Number of effective alleles: mean over markers of `(Σ t)² / Σ t²`.
pub(crate) fn effective_alleles(totals: &[Vec<f64>]) -> f64 {
    if totals.is_empty() {
        return 0.0;
    }
    let mut diversity_total = 0.0;
    for marker in totals {
        let locus_total: f64 = marker.iter().sum();
        let locus_term: f64 = marker.iter().map(|t| t * t).sum();
        if locus_term > 0.0 {
            diversity_total += (locus_total * locus_total) / locus_term;
        }
    }
    diversity_total / totals.len() as f64
}

/// Proportion of alleles absent from the subset.
pub(crate) fn non_informative(counts: &[i64]) -> f64 {
    if counts.is_empty() {
        return 0.0;
    }
    let absent = counts.iter().filter(|&&c| c <= 0).count();
    absent as f64 / counts.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::reference_table;
    use crate::measures::cache::PrevSubset;

    fn diff_for(core: &[usize]) -> SubsetDiff {
        PrevSubset::default().diff(core)
    }

    #[test]
    fn test_flat_delta_handles_missing_values() {
        let table = reference_table();
        let mut totals = vec![0.0; table.get(0).num_alleles()];
        let mut total = 0.0;
        // A3 is missing both alleles of the second marker
        apply_flat_delta(&mut totals, &mut total, &diff_for(&[2]), &table);
        assert_eq!(totals[3], 0.0);
        assert_eq!(totals[4], 0.0);
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_marker_delta_symmetry() {
        let table = reference_table();
        let mut totals = vec![vec![0.0; 3], vec![0.0; 2]];
        apply_marker_delta(&mut totals, &diff_for(&[0, 1]), &table);
        let mut removed = SubsetDiff::default();
        removed.removed = vec![0, 1];
        apply_marker_delta(&mut totals, &removed, &table);
        for marker in &totals {
            for &t in marker {
                assert!(t.abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_shannon_zero_fractions_excluded() {
        let totals = vec![0.5, 0.5, 0.0];
        let v = shannon_index(&totals, 1.0);
        assert!((v - 2.0f64.ln() * 0.5 * 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_heterozygosity_all_missing_marker_contributes_zero() {
        // second marker has zero totals everywhere
        let totals = vec![vec![1.0, 1.0], vec![0.0, 0.0]];
        let v = heterozygosity(&totals);
        assert!((v - 0.25).abs() < 1e-12);
        assert!(!v.is_nan());
    }

    #[test]
    fn test_indices_after_removal_match_fresh_totals() {
        let table = reference_table();
        // grow to {A1, A2}, then step to {A3}; the second marker empties
        // and its totals must come back to exactly zero
        let mut totals = vec![vec![0.0; 3], vec![0.0; 2]];
        apply_marker_delta(&mut totals, &diff_for(&[0, 1]), &table);
        let mut step = SubsetDiff::default();
        step.added = vec![2];
        step.removed = vec![0, 1];
        apply_marker_delta(&mut totals, &step, &table);
        let mut fresh = vec![vec![0.0; 3], vec![0.0; 2]];
        apply_marker_delta(&mut fresh, &diff_for(&[2]), &table);
        assert_eq!(totals[1], vec![0.0, 0.0]);
        assert!((heterozygosity(&totals) - heterozygosity(&fresh)).abs() < 1e-12);
        assert!((heterozygosity(&totals) - 0.33).abs() < 1e-12);
        assert!((effective_alleles(&totals) - effective_alleles(&fresh)).abs() < 1e-12);
    }

    #[test]
    fn test_flat_total_snaps_to_zero_after_full_removal() {
        let table = reference_table();
        let mut totals = vec![0.0; table.get(0).num_alleles()];
        let mut total = 0.0;
        apply_flat_delta(&mut totals, &mut total, &diff_for(&[0, 1]), &table);
        let mut step = SubsetDiff::default();
        step.removed = vec![0, 1];
        apply_flat_delta(&mut totals, &mut total, &step, &table);
        assert_eq!(total, 0.0);
        assert!(totals.iter().all(|&t| t == 0.0));
        assert_eq!(shannon_index(&totals, total), 0.0);
    }

    #[test]
    fn test_effective_alleles_uniform_marker() {
        // one marker with two equally frequent alleles: 2 effective alleles
        let totals = vec![vec![0.5, 0.5]];
        assert!((effective_alleles(&totals) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_informative_counts() {
        assert_eq!(non_informative(&[1, 0, 2, 0]), 0.5);
        assert_eq!(non_informative(&[]), 0.0);
    }
}
