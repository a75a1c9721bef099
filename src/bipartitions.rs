//! Exact bipartition counting.
//!
//! Every input tree contributes each of its clusters once, however many
//! nodes carry it (a unary node restates its child's cluster). Clusters are
//! keyed by their [`Bitset`], so two clades from different trees are counted
//! together exactly when they cover the same taxa. Counts are kept as
//! integers and turned into frequencies on lookup, so a cluster present in
//! every tree has frequency exactly `1.0`.
//!
//! ```text
//! ((A,B),C)   {A} {B} {C} {A,B} {A,B,C}
//! ((A,B),C)   {A} {B} {C} {A,B} {A,B,C}
//! ((A,C),B)   {A} {B} {C} {A,C} {A,B,C}
//!
//! {A,B}: 2/3   {A,C}: 1/3   {A,B,C}, {A}, {B}, {C}: 3/3
//! ```

use std::collections::{HashMap, HashSet};

use phylotree::tree::Tree as PhyloTree;
use tracing::debug;

use crate::bitset::Bitset;
use crate::error::Result;
use crate::majority::CladeTally;
use crate::snapshot::{CladeSnapshot, NodeId};
use crate::taxa::TaxonSet;

/// Occurrence counts of every cluster across a set of trees.
///
/// Holds on to the per-tree snapshots: the cluster cached for each node
/// during counting is the key the majority pass looks up again.
#[derive(Debug, Clone)]
pub struct BipartitionCounts {
    counts: HashMap<Bitset, usize>,
    snapshots: Vec<CladeSnapshot>,
    taxa: TaxonSet,
}

impl BipartitionCounts {
    /// Validate `trees` and count their clusters.
    pub fn count(trees: &[PhyloTree]) -> Result<Self> {
        let taxa = TaxonSet::from_trees(trees)?;
        Self::with_taxa(trees, taxa)
    }

    /// Count the clusters of `trees`, already validated against `taxa`.
    pub fn with_taxa(trees: &[PhyloTree], taxa: TaxonSet) -> Result<Self> {
        let snapshots = CladeSnapshot::from_trees(trees, &taxa)?;
        Ok(Self::from_snapshots(taxa, snapshots))
    }

    /// Count the clusters of already built snapshots.
    pub fn from_snapshots(taxa: TaxonSet, snapshots: Vec<CladeSnapshot>) -> Self {
        let mut counts: HashMap<Bitset, usize> = HashMap::new();
        for snap in &snapshots {
            let distinct: HashSet<&Bitset> = snap.clusters().map(|(_, cluster)| cluster).collect();
            for cluster in distinct {
                *counts.entry(cluster.clone()).or_insert(0) += 1;
            }
        }

        debug!(
            trees = snapshots.len(),
            distinct = counts.len(),
            "bipartitions counted"
        );

        BipartitionCounts {
            counts,
            snapshots,
            taxa,
        }
    }

    /// Number of clades, over all trees, whose cluster is `cluster`.
    pub fn occurrences(&self, cluster: &Bitset) -> usize {
        self.counts.get(cluster).copied().unwrap_or(0)
    }

    /// Number of distinct clusters seen.
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub fn taxa(&self) -> &TaxonSet {
        &self.taxa
    }

    /// Iterate `(cluster, frequency)` pairs.
    pub fn frequencies(&self) -> impl Iterator<Item = (&Bitset, f64)> + '_ {
        let trees = self.snapshots.len() as f64;
        self.counts
            .iter()
            .map(move |(cluster, &count)| (cluster, count as f64 / trees))
    }
}

impl CladeTally for BipartitionCounts {
    type Key = Bitset;

    fn num_trees(&self) -> usize {
        self.snapshots.len()
    }

    fn key(&self, tree: usize, node: &NodeId) -> Option<&Bitset> {
        self.snapshots.get(tree)?.cluster(node)
    }

    fn count(&self, key: &Bitset) -> usize {
        self.occurrences(key)
    }

    fn size(&self, key: &Bitset) -> usize {
        key.count_ones()
    }

    fn leaf_name(&self, key: &Bitset) -> Option<&str> {
        let mut ones = key.ones();
        match (ones.next(), ones.next()) {
            (Some(idx), None) => Some(self.taxa.name(idx)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(newicks: &[&str]) -> BipartitionCounts {
        let trees: Vec<PhyloTree> = newicks
            .iter()
            .map(|nwk| PhyloTree::from_newick(nwk).unwrap())
            .collect();
        BipartitionCounts::count(&trees).unwrap()
    }

    #[test]
    fn test_counts_and_frequencies() {
        let counts = count(&["((A,B),C);", "((A,B),C);", "((A,C),B);"]);
        let taxa = counts.taxa().clone();

        let ab = taxa.cluster(["A", "B"]).unwrap();
        let ac = taxa.cluster(["A", "C"]).unwrap();
        let bc = taxa.cluster(["B", "C"]).unwrap();

        assert_eq!(counts.occurrences(&ab), 2);
        assert_eq!(counts.occurrences(&ac), 1);
        assert_eq!(counts.occurrences(&bc), 0);
        assert_eq!(counts.occurrences(&taxa.full()), 3);
        // 3 leaves + root + {A,B} + {A,C}
        assert_eq!(counts.distinct(), 6);

        assert!((counts.frequency(&ab) - 2.0 / 3.0).abs() < f64::EPSILON);
        assert_eq!(counts.frequency(&bc), 0.0);
    }

    #[test]
    fn test_shared_cluster_reaches_exactly_one() {
        // Ten trees: summing 1/10 ten times would miss 1.0.
        let newicks = ["((A,B),(C,D));"; 10];
        let counts = count(&newicks);
        let ab = counts.taxa().cluster(["A", "B"]).unwrap();
        assert_eq!(counts.frequency(&ab), 1.0);
        assert!(counts.frequencies().all(|(_, f)| f == 1.0));
    }

    #[test]
    fn test_unary_chain_counts_once_per_tree() {
        let counts = count(&["((((A,B)),C),D);", "((A,C),(B,D));", "((A,C),(B,D));"]);
        let taxa = counts.taxa().clone();

        assert_eq!(counts.occurrences(&taxa.cluster(["A", "B"]).unwrap()), 1);
        assert_eq!(counts.occurrences(&taxa.cluster(["A", "C"]).unwrap()), 2);
        assert!(counts.frequencies().all(|(_, f)| f <= 1.0));
    }

    #[test]
    fn test_cached_cluster_per_node() {
        let counts = count(&["((A,B),C);"]);
        let tree = PhyloTree::from_newick("((A,B),C);").unwrap();
        let root = tree.get_root().unwrap();
        assert_eq!(counts.key(0, &root), Some(&counts.taxa().full()));
        assert_eq!(counts.key(1, &root), None);

        let a = counts.taxa().cluster(["A"]).unwrap();
        assert_eq!(counts.leaf_name(&a), Some("A"));
        assert_eq!(counts.leaf_name(&counts.taxa().full()), None);
        assert_eq!(counts.size(&counts.taxa().full()), 3);
    }
}
