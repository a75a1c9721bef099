//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `error`: error taxonomy shared by every computation.
//! - `bitset`: compact bitset representation of clusters.
//! - `taxa`: shared, sorted taxon set and input validation.
//! - `snapshot`: per-tree cluster cache.
//! - `partition`: partition product of the input roots (Adams).
//! - `restrict`: restriction of a tree to a leaf subset (Adams).
//! - `adams`: Adams consensus.
//! - `bipartitions`: exact cluster counting (majority rule).
//! - `fingerprint`: double-hash cluster counting (majority rule).
//! - `majority`: majority-rule consensus and tree reconstruction.
//! - `config`: threshold, parent rule and run configuration.
//! - `io`: reading Newick and BEAST/NEXUS files, writing Newick.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod error;
pub mod bitset;
pub mod taxa;
pub mod snapshot;
pub mod partition;
pub mod restrict;
pub mod adams;
pub mod bipartitions;
pub mod fingerprint;
pub mod majority;
pub mod config;
pub mod io;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use adams::adams_consensus;
pub use bitset::Bitset;
pub use config::{Algorithm, ConsensusConfig, ParentRule, Threshold};
pub use error::{ConsensusError, Result};
pub use majority::{MajorityOptions, majority_consensus, majority_consensus_with};
pub use snapshot::CladeSnapshot;
pub use taxa::TaxonSet;
