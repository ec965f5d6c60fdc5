//! Accessions and the run-scoped table that owns them.

use std::collections::HashMap;

use crate::error::CoreHunterError;

/// Trait data of one accession as supplied by the dataset loader.
///
/// Both variants are resolved into the same bound representation at load
/// time: an ordered list of markers, each an ordered list of allele
/// frequencies in `[0, 1]` (or `None` when missing).
#[derive(Debug, Clone)]
pub enum TraitSource {
    /// SSR data: one frequency row per marker, one entry per allele.
    Ssr(Vec<Vec<Option<f64>>>),
    /// DArT data: a single presence frequency per marker, bound as a
    /// one-allele pseudo-marker so all measures share one representation.
    Dart(Vec<Option<f64>>),
}

impl TraitSource {
    fn into_markers(self) -> Vec<Vec<Option<f64>>> {
        match self {
            TraitSource::Ssr(markers) => markers,
            TraitSource::Dart(values) => values.into_iter().map(|v| vec![v]).collect(),
        }
    }
}

/// One entry of a genetic-resource collection with its bound trait profile.
///
/// Immutable after binding; identified by a run-scoped integer id equal to
/// its position in the owning [`AccessionTable`].
#[derive(Debug, Clone)]
pub struct Accession {
    id: usize,
    name: String,
    markers: Vec<Vec<Option<f64>>>,
    external_distance: Option<f64>,
}

impl Accession {
    /// Run-scoped id, equal to the table index.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound allele-frequency profile: markers × alleles.
    pub fn markers(&self) -> &[Vec<Option<f64>>] {
        &self.markers
    }

    /// Optional precomputed distance supplied by an external tool.
    pub fn external_distance(&self) -> Option<f64> {
        self.external_distance
    }

    pub fn num_markers(&self) -> usize {
        self.markers.len()
    }

    /// Total number of alleles across all markers.
    pub fn num_alleles(&self) -> usize {
        self.markers.iter().map(Vec::len).sum()
    }
}

/// Ordered, name-unique collection of accessions for one run.
///
/// Ids are assigned consecutively on insertion, so they can index directly
/// into distance matrices and subset partitions.
#[derive(Debug, Default)]
pub struct AccessionTable {
    accessions: Vec<Accession>,
    name_index: HashMap<String, usize>,
}

impl AccessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds trait data under the next free id.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        source: TraitSource,
    ) -> Result<usize, CoreHunterError> {
        self.insert(name.into(), source, None)
    }

    /// Binds trait data together with an externally computed distance.
    pub fn add_with_external(
        &mut self,
        name: impl Into<String>,
        source: TraitSource,
        external_distance: f64,
    ) -> Result<usize, CoreHunterError> {
        self.insert(name.into(), source, Some(external_distance))
    }

    fn insert(
        &mut self,
        name: String,
        source: TraitSource,
        external_distance: Option<f64>,
    ) -> Result<usize, CoreHunterError> {
        if self.name_index.contains_key(&name) {
            return Err(CoreHunterError::DuplicateAccession(name));
        }
        let id = self.accessions.len();
        self.name_index.insert(name.clone(), id);
        self.accessions.push(Accession {
            id,
            name,
            markers: source.into_markers(),
            external_distance,
        });
        Ok(id)
    }

    pub fn get(&self, id: usize) -> &Accession {
        &self.accessions[id]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    pub fn accessions(&self) -> &[Accession] {
        &self.accessions
    }

    pub fn len(&self) -> usize {
        self.accessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessions.is_empty()
    }

    /// Resolves a list of ids to accession names.
    pub fn names_of(&self, ids: &[usize]) -> Vec<String> {
        ids.iter()
            .map(|&id| self.accessions[id].name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_assigns_consecutive_ids() {
        let mut table = AccessionTable::new();
        let a = table.add("a", TraitSource::Dart(vec![Some(1.0)])).unwrap();
        let b = table.add("b", TraitSource::Dart(vec![Some(0.0)])).unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).name(), "b");
        assert_eq!(table.index_of("a"), Some(0));
        assert_eq!(table.index_of("c"), None);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut table = AccessionTable::new();
        table.add("a", TraitSource::Dart(vec![Some(1.0)])).unwrap();
        let err = table.add("a", TraitSource::Dart(vec![Some(0.5)]));
        assert!(matches!(err, Err(CoreHunterError::DuplicateAccession(_))));
    }

    #[test]
    fn test_dart_binds_as_single_allele_markers() {
        let mut table = AccessionTable::new();
        table
            .add("a", TraitSource::Dart(vec![Some(1.0), None, Some(0.0)]))
            .unwrap();
        let a = table.get(0);
        assert_eq!(a.num_markers(), 3);
        assert_eq!(a.num_alleles(), 3);
        assert_eq!(a.markers()[1], vec![None]);
    }

    #[test]
    fn test_external_distance_binding() {
        let mut table = AccessionTable::new();
        table
            .add_with_external("a", TraitSource::Dart(vec![Some(1.0)]), 0.25)
            .unwrap();
        table.add("b", TraitSource::Dart(vec![Some(0.0)])).unwrap();
        assert_eq!(table.get(0).external_distance(), Some(0.25));
        assert_eq!(table.get(1).external_distance(), None);
    }
}
