//! Shared taxon index for a collection of trees.
//!
//! Leaf names are sorted alphabetically and numbered `0..n`, so a taxon has
//! the same bit position in every tree of the collection regardless of the
//! node ids the parser assigned. Building a [`TaxonSet`] is also where the
//! "same taxa in every tree" precondition is checked, once, before any
//! consensus work starts.

use std::collections::{BTreeSet, HashMap};

use phylotree::tree::Tree as PhyloTree;

use crate::bitset::Bitset;
use crate::error::{ConsensusError, Result};

/// Sorted taxon names with a reverse lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonSet {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl TaxonSet {
    /// Validate `trees` and build the taxon index from them.
    ///
    /// # Errors
    /// - [`ConsensusError::EmptyInput`] if `trees` is empty
    /// - [`ConsensusError::UnnamedLeaf`] / [`ConsensusError::DuplicateLeaf`] if a
    ///   tree breaks the unique-named-leaf invariant
    /// - [`ConsensusError::TaxaMismatch`] if a tree's leaf set differs from tree 0
    pub fn from_trees(trees: &[PhyloTree]) -> Result<Self> {
        let first = trees.first().ok_or(ConsensusError::EmptyInput)?;
        let names = sorted_leaf_names(first, 0)?;

        for (idx, tree) in trees.iter().enumerate().skip(1) {
            if sorted_leaf_names(tree, idx)? != names {
                return Err(ConsensusError::TaxaMismatch { tree: idx });
            }
        }

        Ok(Self::from_sorted(names))
    }

    /// Build the index from names that are already sorted and unique.
    fn from_sorted(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        TaxonSet { names, index }
    }

    /// Number of taxa.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of u64 words in a [`Bitset`] over these taxa.
    pub fn words(&self) -> usize {
        self.names.len().div_ceil(64)
    }

    /// Bit position of a taxon.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Name of the taxon at bit position `idx`.
    pub fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    /// All taxon names, sorted.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The cluster holding every taxon.
    pub fn full(&self) -> Bitset {
        Bitset::full(self.names.len())
    }

    /// Cluster for a set of taxon names.
    ///
    /// # Errors
    /// Returns [`ConsensusError::ForeignLeaves`] if a name is not a known taxon.
    pub fn cluster<'a, I>(&self, names: I) -> Result<Bitset>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut bs = Bitset::zeros(self.words());
        for name in names {
            bs.set(self.index_of(name).ok_or(ConsensusError::ForeignLeaves)?);
        }
        Ok(bs)
    }

    /// Taxon names of a cluster.
    pub fn cluster_names(&self, cluster: &Bitset) -> BTreeSet<String> {
        cluster.ones().map(|idx| self.names[idx].clone()).collect()
    }
}

/// Leaf names of one tree, sorted; rejects unnamed and repeated leaves.
fn sorted_leaf_names(tree: &PhyloTree, tree_idx: usize) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for leaf_id in tree.get_leaves() {
        match tree.get(&leaf_id)?.name.as_deref() {
            Some(name) if !name.is_empty() => names.push(name.to_string()),
            _ => return Err(ConsensusError::UnnamedLeaf { tree: tree_idx }),
        }
    }
    names.sort_unstable();

    if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
        return Err(ConsensusError::DuplicateLeaf {
            tree: tree_idx,
            name: pair[0].clone(),
        });
    }

    Ok(names)
}
