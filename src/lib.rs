//! Core subset selection for genetic accession collections.
//!
//! Given a collection of accessions described by marker allele frequencies
//! and quantitative traits, this crate selects a core subset that maximizes
//! a weighted combination of genetic diversity measures:
//!
//! - **Distance measures**: mean or minimum pairwise Modified Rogers or
//!   Cavalli-Sforza & Edwards distance (MR, MRmin, CE, CEmin).
//! - **Allelic diversity**: Shannon index (SH), expected heterozygosity
//!   (HE), effective number of alleles (NE).
//! - **Allele coverage**: proportion of non-informative alleles (PN) and
//!   its complement (CV).
//! - **External distances** (EX) precomputed outside the crate.
//!
//! Measures are combined into a single weighted [`PseudoMeasure`] and
//! evaluated incrementally: moving one accession in or out of the core
//! updates the score in time proportional to the core size rather than
//! its square.
//!
//! # Searches
//!
//! [`search`] runs one of the [`SearchStrategy`] variants, from exact
//! (exhaustive enumeration, deterministic (l,r) selection) through
//! classic single-trajectory heuristics (local search, steepest descent,
//! tabu search) to multi-replica engines (replica exchange Monte Carlo,
//! merge replica search, genetic search, and the mixed replica default).
//! The parallel engines fan their replicas out over [`rayon`]'s thread
//! pool.
//!
//! ```no_run
//! use std::sync::Arc;
//! use corehunter::{search, AccessionTable, PseudoMeasure, SearchConfig, SearchStrategy};
//!
//! # fn build_table() -> AccessionTable { unimplemented!() }
//! let table = Arc::new(build_table());
//! let pm = Arc::new(PseudoMeasure::from_names(&[("MR", 0.7), ("SH", 0.3)], table.len())?);
//! let config = SearchConfig::new(20, 30).with_seed(42);
//! let result = search(&table, &pm, &SearchStrategy::forward(), &config, None)?;
//! println!("core of {} accessions, score {:.6}", result.core.len(), result.score);
//! # Ok::<(), corehunter::CoreHunterError>(())
//! ```

pub mod cluster;
pub mod data;
pub mod error;
pub mod genetic;
pub mod measures;
pub mod neighborhood;
pub mod progress;
pub mod replica;
pub mod search;

pub use data::{Accession, AccessionTable, Partition, TraitSource};
pub use error::CoreHunterError;
pub use measures::{DistanceAggregate, DistanceKind, Measure, PseudoMeasure};
pub use progress::ProgressSink;
pub use search::{search, MixedReplicaParams, SearchConfig, SearchResult, SearchStrategy};
