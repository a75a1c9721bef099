//! Cached clusters of a phylogenetic tree.
//!
//! # Overview
//! A [`CladeSnapshot`] records, for every node of a tree, the cluster of leaves
//! below it as a [`Bitset`] over a shared [`TaxonSet`]. It is computed once per
//! tree with a single post-order pass and then reused by every engine:
//!
//! - the partition engine reads the clusters of the root's children,
//! - the restriction engine tests subtrees for overlap with the kept leaves,
//! - the bipartition counter reads every node's cluster,
//! - majority reconstruction looks clusters up again in pre-order.
//!
//! ```text
//!      root            {A,B,C,D}
//!     /    \
//!   n1      n2         n1: {A,B}   n2: {C,D}
//!  /  \    /  \
//! A    B  C    D
//! ```
//!
//! # Why taxon NAMES and not node ids
//! Node ids are assigned during parsing and differ across trees. Taxon names
//! are consistent, so leaves are mapped to bits through the sorted
//! [`TaxonSet`] and identical taxa always land on the same bit.

use std::collections::{BTreeSet, HashMap};

use phylotree::tree::Tree as PhyloTree;

use crate::bitset::Bitset;
use crate::error::{ConsensusError, Result};
use crate::taxa::TaxonSet;

/// Node id type of the underlying tree container.
pub type NodeId = usize;

/// Clusters of every node of one tree.
///
/// # Fields
/// - `clusters`: leaf set below each node, keyed by node id
/// - `root`: id of the root node
/// - `root_children`: clusters of the root's children, in child order; a
///   unary chain below the root is skipped
/// - `leaf_order`: taxon indices of the leaves in pre-order
#[derive(Debug, Clone)]
pub struct CladeSnapshot {
    clusters: HashMap<NodeId, Bitset>,
    root: NodeId,
    root_children: Vec<Bitset>,
    leaf_order: Vec<usize>,
}

impl CladeSnapshot {
    /// Extract a snapshot from a tree whose leaves all belong to `taxa`.
    ///
    /// # Algorithm
    /// 1. Post-order traversal from the root
    /// 2. Leaf: singleton cluster at the taxon's bit
    /// 3. Internal node: OR of its children's clusters (already cached)
    ///
    /// # Errors
    /// Returns [`ConsensusError::ForeignLeaves`] if a leaf is unnamed or not a
    /// member of `taxa`, and [`ConsensusError::Tree`] if the tree is malformed.
    pub fn from_tree(tree: &PhyloTree, taxa: &TaxonSet) -> Result<Self> {
        let root = tree.get_root()?;
        let words = taxa.words();

        let mut clusters: HashMap<NodeId, Bitset> = HashMap::with_capacity(tree.size());
        for node_id in tree.postorder(&root)? {
            let node = tree.get(&node_id)?;
            let cluster = if node.children.is_empty() {
                let idx = node
                    .name
                    .as_deref()
                    .and_then(|name| taxa.index_of(name))
                    .ok_or(ConsensusError::ForeignLeaves)?;
                Bitset::singleton(words, idx)
            } else {
                let mut bs = Bitset::zeros(words);
                for child in &node.children {
                    bs.or_assign(&clusters[child]);
                }
                bs
            };
            clusters.insert(node_id, cluster);
        }

        // A unary root restates its child's leaf set, so the top split is
        // read below the unary chain.
        let mut top = tree.get(&root)?;
        while let [only] = top.children.as_slice() {
            top = tree.get(only)?;
        }
        let root_children = top
            .children
            .iter()
            .map(|child| clusters[child].clone())
            .collect();

        let mut leaf_order = Vec::with_capacity(taxa.len());
        for node_id in tree.preorder(&root)? {
            let node = tree.get(&node_id)?;
            if node.children.is_empty() {
                // Every leaf was resolved during the post-order pass above.
                if let Some(idx) = node.name.as_deref().and_then(|name| taxa.index_of(name)) {
                    leaf_order.push(idx);
                }
            }
        }

        Ok(CladeSnapshot {
            clusters,
            root,
            root_children,
            leaf_order,
        })
    }

    /// Build snapshots for a whole collection of trees.
    pub fn from_trees(trees: &[PhyloTree], taxa: &TaxonSet) -> Result<Vec<Self>> {
        trees
            .iter()
            .map(|tree| CladeSnapshot::from_tree(tree, taxa))
            .collect()
    }

    /// Cluster below `node`.
    pub fn cluster(&self, node: &NodeId) -> Option<&Bitset> {
        self.clusters.get(node)
    }

    /// Every `(node, cluster)` pair of the tree, in no particular order.
    pub fn clusters(&self) -> impl Iterator<Item = (&NodeId, &Bitset)> {
        self.clusters.iter()
    }

    /// Id of the tree's root.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Cluster of the root, i.e. every leaf of the tree.
    pub fn root_cluster(&self) -> &Bitset {
        &self.clusters[&self.root]
    }

    /// Clusters of the root's children, in child order. Unary nodes below the
    /// root are looked through.
    pub fn root_children(&self) -> &[Bitset] {
        &self.root_children
    }

    /// Taxon indices of the leaves, in pre-order.
    pub fn leaf_order(&self) -> &[usize] {
        &self.leaf_order
    }

    /// Number of leaves in the tree.
    pub fn num_leaves(&self) -> usize {
        self.leaf_order.len()
    }

    /// Every cluster with at least two leaves, as taxon names.
    ///
    /// This is the topology of a rooted tree with branch lengths, labels and
    /// child order forgotten, which makes it convenient for comparing trees.
    pub fn named_clusters(&self, taxa: &TaxonSet) -> BTreeSet<BTreeSet<String>> {
        self.clusters
            .values()
            .filter(|cluster| cluster.count_ones() > 1)
            .map(|cluster| taxa.cluster_names(cluster))
            .collect()
    }
}

/// Non-trivial clusters of a single tree, keyed by taxon names.
///
/// Builds a throwaway [`TaxonSet`] from the tree itself.
pub fn tree_clusters(tree: &PhyloTree) -> Result<BTreeSet<BTreeSet<String>>> {
    let taxa = TaxonSet::from_trees(std::slice::from_ref(tree))?;
    Ok(CladeSnapshot::from_tree(tree, &taxa)?.named_clusters(&taxa))
}
