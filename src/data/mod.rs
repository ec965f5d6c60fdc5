//! Accession storage and subset bookkeeping.
//!
//! The [`AccessionTable`] owns every [`Accession`] of a run and assigns
//! consecutive, run-scoped ids at load time. Search strategies never hold
//! accessions themselves; they manipulate a [`Partition`] of table indices,
//! which keeps subset moves cheap and reversible.
//!
//! Dataset file parsing lives outside this crate; the table is built from
//! already parsed allele-frequency rows via [`TraitSource`].

mod accession;
mod partition;

pub use accession::{Accession, AccessionTable, TraitSource};
pub use partition::Partition;

/// Reference SSR dataset shared by measure and search tests: four
/// accessions, two markers with three and two alleles, accession A3
/// missing both frequencies of the second marker.
#[cfg(test)]
pub(crate) fn reference_table() -> AccessionTable {
    fn row(freqs: [&[Option<f64>]; 2]) -> TraitSource {
        TraitSource::Ssr(freqs.iter().map(|m| m.to_vec()).collect())
    }

    let mut table = AccessionTable::new();
    table
        .add(
            "A1",
            row([
                &[Some(0.3), Some(0.2), Some(0.5)],
                &[Some(0.8), Some(0.2)],
            ]),
        )
        .unwrap();
    table
        .add(
            "A2",
            row([
                &[Some(0.1), Some(0.0), Some(0.9)],
                &[Some(0.4), Some(0.6)],
            ]),
        )
        .unwrap();
    table
        .add(
            "A3",
            row([&[Some(0.3), Some(0.3), Some(0.4)], &[None, None]]),
        )
        .unwrap();
    table
        .add(
            "A4",
            row([
                &[Some(0.8), Some(0.0), Some(0.2)],
                &[Some(0.5), Some(0.5)],
            ]),
        )
        .unwrap();
    table
}
