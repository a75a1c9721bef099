//! Partition product of the root splits of several trees.
//!
//! Each tree's root divides the leaves into one class per root child. The
//! partition product is the coarsest common refinement of those divisions:
//! two leaves stay together only if they sit under the same root child in
//! every tree.
//!
//! ```text
//! tree 1: ((A,B),(C,D))   root classes {A,B} {C,D}
//! tree 2: ((A,B,C),D)     root classes {A,B,C} {D}
//!
//! leaf  vector   class
//! A     (0, 0)   {A,B}
//! B     (0, 0)   {A,B}
//! C     (1, 0)   {C}
//! D     (1, 1)   {D}
//! ```

use std::collections::{BTreeSet, HashMap};

use phylotree::tree::Tree as PhyloTree;
use tracing::debug;

use crate::bitset::Bitset;
use crate::error::Result;
use crate::snapshot::CladeSnapshot;
use crate::taxa::TaxonSet;

/// Compute the partition product of the trees behind `snapshots`.
///
/// # Algorithm
/// 1. For each tree, one pass over its root children's cached clusters builds
///    an owner table `taxon index → root child index` (`None` when the root
///    is itself a leaf).
/// 2. Each leaf, visited in the pre-order of the first tree, gets its
///    partition vector: its owner in every tree.
/// 3. Leaves with equal vectors form one class.
///
/// Classes are returned in discovery order and together cover every leaf of
/// the trees exactly once. Cost is O(t·n).
pub fn compute_partitions(snapshots: &[CladeSnapshot], taxa: &TaxonSet) -> Vec<Bitset> {
    let Some(first) = snapshots.first() else {
        return Vec::new();
    };

    let owners: Vec<Vec<Option<usize>>> = snapshots
        .iter()
        .map(|snap| {
            let mut owner = vec![None; taxa.len()];
            for (child_idx, cluster) in snap.root_children().iter().enumerate() {
                for leaf in cluster.ones() {
                    owner[leaf] = Some(child_idx);
                }
            }
            owner
        })
        .collect();

    let mut class_of: HashMap<Vec<Option<usize>>, usize> = HashMap::new();
    let mut classes: Vec<Bitset> = Vec::new();

    for &leaf in first.leaf_order() {
        let vector: Vec<Option<usize>> = owners.iter().map(|owner| owner[leaf]).collect();
        let class_idx = *class_of.entry(vector).or_insert_with(|| {
            classes.push(Bitset::zeros(taxa.words()));
            classes.len() - 1
        });
        classes[class_idx].set(leaf);
    }

    debug!(
        trees = snapshots.len(),
        leaves = first.num_leaves(),
        classes = classes.len(),
        "partition product computed"
    );

    classes
}

/// Partition product of `trees` as sets of taxon names.
///
/// Validates the taxa first, so this is safe to call on raw input.
pub fn partition_names(trees: &[PhyloTree]) -> Result<Vec<BTreeSet<String>>> {
    let taxa = TaxonSet::from_trees(trees)?;
    let snapshots = CladeSnapshot::from_trees(trees, &taxa)?;
    Ok(compute_partitions(&snapshots, &taxa)
        .iter()
        .map(|class| taxa.cluster_names(class))
        .collect())
}
