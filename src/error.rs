//! Crate-wide error type.
//!
//! All configuration problems are detected up front, before any search
//! starts; a failed validation never leaves a partially executed run behind.

use thiserror::Error;

/// Errors reported by dataset binding, measure registration and search
/// configuration validation.
#[derive(Debug, Error)]
pub enum CoreHunterError {
    /// A measure with the same registry name was added twice.
    #[error("duplicate measure `{0}`")]
    DuplicateMeasure(String),

    /// A measure name that is not part of the registry.
    #[error("unknown measure `{0}`")]
    UnknownMeasure(String),

    /// An accession with the same name was added twice.
    #[error("duplicate accession `{0}`")]
    DuplicateAccession(String),

    /// Subset size bounds are inconsistent with each other or with the
    /// collection size.
    #[error("invalid core size range [{min}, {max}] for a collection of {collection} accessions")]
    InvalidSizeRange {
        min: usize,
        max: usize,
        collection: usize,
    },

    /// The external distance measure is registered but an accession carries
    /// no external distance value.
    #[error("accession `{0}` has no external distance value")]
    MissingExternalDistance(String),

    /// A strategy parameter is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
