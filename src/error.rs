//! Error taxonomy shared by every consensus computation.
//!
//! All failures are local and synchronous: they are raised where they are
//! detected and propagated with `?`. Nothing is retried and no partial tree
//! is ever returned.

use phylotree::tree::TreeError;
use thiserror::Error;

/// Errors produced while validating input or building a consensus tree.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// No input trees were supplied.
    #[error("at least one input tree is required")]
    EmptyInput,

    /// An input tree does not have the same leaf-name set as tree 0.
    #[error("tree {tree} does not have the same taxa as tree 0; all input trees must share their leaves")]
    TaxaMismatch {
        /// Index of the offending tree.
        tree: usize,
    },

    /// An input tree has a leaf without a name.
    #[error("tree {tree} has an unnamed leaf")]
    UnnamedLeaf {
        /// Index of the offending tree.
        tree: usize,
    },

    /// An input tree carries the same leaf name twice.
    #[error("tree {tree} has duplicate leaf name '{name}'")]
    DuplicateLeaf {
        /// Index of the offending tree.
        tree: usize,
        /// Repeated leaf name.
        name: String,
    },

    /// Majority threshold outside `[0.5, 1.0]`.
    #[error("threshold {0} is not in range [0.5, 1.0]")]
    InvalidThreshold(f64),

    /// A restriction was requested on an empty leaf set.
    #[error("cannot restrict a tree to an empty leaf set")]
    EmptyRestriction,

    /// A restriction set names leaves the tree does not have.
    #[error("restriction set contains leaves that are not in the tree")]
    ForeignLeaves,

    /// The majority parent map does not describe a single rooted tree.
    #[error("majority reconstruction is ambiguous: {0}")]
    ReconstructionAmbiguity(String),

    /// Failure reported by the underlying tree container.
    #[error("tree operation failed: {0}")]
    Tree(#[from] TreeError),

    /// Failure while reading or writing tree files.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A Newick string could not be parsed.
    #[error("failed to parse tree {index}: {message}")]
    Newick {
        /// Zero-based position of the tree in its input.
        index: usize,
        /// Parser message.
        message: String,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ConsensusError>;
