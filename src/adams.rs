//! Adams consensus.
//!
//! The Adams tree keeps every nesting relationship that all input trees agree
//! on, without requiring the trees to share identical clades. It is built
//! top-down:
//!
//! 1. compute the partition product of the input roots,
//! 2. restrict every tree to each partition class,
//! 3. recurse on the restricted trees,
//! 4. hang the resulting subtrees from a new root, in class order.
//!
//! ```text
//! ((1,(2,(3,4))),5)
//! (((1,2),(3,4)),5)     ──adams──▶   ((1,2,3,4),5)
//! ((((1,2),3),4),5)
//! ```

use phylotree::tree::{Node, Tree as PhyloTree};
use tracing::{debug, trace};

use crate::bitset::Bitset;
use crate::error::Result;
use crate::partition::compute_partitions;
use crate::restrict::{graft, restrict, single_leaf_tree};
use crate::snapshot::CladeSnapshot;
use crate::taxa::TaxonSet;

/// Compute the Adams consensus of `trees`.
///
/// The shared-taxa precondition is checked here, once; the recursion never
/// re-validates.
///
/// # Errors
/// [`crate::ConsensusError::EmptyInput`] and the taxa validation errors of
/// [`TaxonSet::from_trees`].
pub fn adams_consensus(trees: &[PhyloTree]) -> Result<PhyloTree> {
    let taxa = TaxonSet::from_trees(trees)?;
    debug!(trees = trees.len(), taxa = taxa.len(), "computing Adams consensus");
    recursive_adams(trees, &taxa, 0)
}

fn recursive_adams(trees: &[PhyloTree], taxa: &TaxonSet, depth: usize) -> Result<PhyloTree> {
    let snapshots = CladeSnapshot::from_trees(trees, taxa)?;

    // Base case: the trees only have one leaf.
    if let [leaf] = snapshots[0].leaf_order() {
        return Ok(single_leaf_tree(taxa.name(*leaf)));
    }

    let classes = compute_partitions(&snapshots, taxa);
    trace!(depth, classes = classes.len(), "adams level");

    let restricted_adams = |class: &Bitset| -> Result<PhyloTree> {
        let restricted = trees
            .iter()
            .zip(&snapshots)
            .map(|(tree, snap)| restrict(tree, snap, class))
            .collect::<Result<Vec<_>>>()?;
        recursive_adams(&restricted, taxa, depth + 1)
    };

    // Snapshots look through unary roots, so a branching tree always yields
    // two classes or more. Restriction also removes unary roots, so this
    // never loops.
    if let [class] = classes.as_slice() {
        return restricted_adams(class);
    }

    let mut consensus = PhyloTree::new();
    let root = consensus.add(Node::new());
    for class in &classes {
        let subtree = restricted_adams(class)?;
        graft(&mut consensus, Some(root), &subtree, subtree.get_root()?)?;
    }

    Ok(consensus)
}
