//! Majority-rule (threshold) consensus.
//!
//! # Overview
//! A clade is kept when its cluster occurs in more than a fraction `l` of
//! the input trees (`0.5 ≤ l ≤ 1`), or in all of them when `l = 1`. For
//! `l ≥ 0.5` the kept clusters are pairwise compatible, so they nest into a
//! single tree.
//!
//! # Reconstruction
//! Each input tree is walked in pre-order while carrying `c`, the cluster of
//! the nearest kept ancestor (initially the root cluster, i.e. all taxa).
//! Every kept clade records `c` as its parent in a shared parent map; when a
//! clade is met again under a different `c`, a [`ParentRule`] decides which
//! parent wins. The map is then inverted into child lists and the unique
//! cluster that is a parent but never a child becomes the root.
//!
//! ```text
//! clade        kept   parent
//! {1,2,3,4}    1.00   {1,2,3,4,5}
//! {1,2}        0.67   {1,2,3,4}        ──▶   (((3,4),(1,2)),5)
//! {3,4}        0.67   {1,2,3,4}
//! {2,3,4}      0.33   -
//! ```
//!
//! The tally of clusters is abstracted by [`CladeTally`] so the same pass runs
//! over exact [`BipartitionCounts`] or hashed [`FingerprintTable`]s.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use phylotree::tree::{Node, Tree as PhyloTree};
use tracing::{debug, trace};

use crate::bipartitions::BipartitionCounts;
use crate::config::{ParentRule, Threshold};
use crate::error::{ConsensusError, Result};
use crate::fingerprint::FingerprintTable;
use crate::restrict::single_leaf_tree;
use crate::snapshot::NodeId;
use crate::taxa::TaxonSet;

/// Per-node cluster keys and their occurrence counts over a set of trees.
pub trait CladeTally {
    /// Identity of a cluster.
    type Key: Clone + Eq + Hash + Debug;

    /// Number of trees tallied.
    fn num_trees(&self) -> usize;

    /// Key of `node` in tree number `tree`.
    fn key(&self, tree: usize, node: &NodeId) -> Option<&Self::Key>;

    /// Occurrences of `key` over all trees.
    fn count(&self, key: &Self::Key) -> usize;

    /// Number of leaves in the cluster behind `key`.
    fn size(&self, key: &Self::Key) -> usize;

    /// Taxon name when `key` is a single-leaf cluster.
    fn leaf_name(&self, key: &Self::Key) -> Option<&str>;

    /// Fraction of trees containing `key`.
    fn frequency(&self, key: &Self::Key) -> f64 {
        self.count(key) as f64 / self.num_trees() as f64
    }
}

/// Options of a majority consensus run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MajorityOptions {
    pub threshold: Threshold,
    pub rule: ParentRule,
    /// Tally clusters with the double-hash fingerprints instead of exact sets.
    pub hashed: bool,
    /// Seed of the fingerprint coefficients (hashed mode only).
    pub seed: Option<u64>,
}

impl Default for MajorityOptions {
    fn default() -> Self {
        MajorityOptions {
            threshold: Threshold::default(),
            rule: ParentRule::default(),
            hashed: false,
            seed: None,
        }
    }
}

/// Majority consensus at threshold `l` with exact counting.
///
/// # Errors
/// [`ConsensusError::InvalidThreshold`] if `l` is outside `[0.5, 1.0]`, the
/// taxa validation errors, and [`ConsensusError::ReconstructionAmbiguity`].
pub fn majority_consensus(trees: &[PhyloTree], l: f64) -> Result<PhyloTree> {
    let options = MajorityOptions {
        threshold: Threshold::new(l)?,
        ..MajorityOptions::default()
    };
    majority_consensus_with(trees, &options)
}

/// Majority consensus with explicit options.
pub fn majority_consensus_with(trees: &[PhyloTree], options: &MajorityOptions) -> Result<PhyloTree> {
    let taxa = TaxonSet::from_trees(trees)?;
    debug!(
        trees = trees.len(),
        taxa = taxa.len(),
        threshold = options.threshold.value(),
        rule = ?options.rule,
        hashed = options.hashed,
        "computing majority consensus"
    );

    if taxa.len() == 1 {
        return Ok(single_leaf_tree(taxa.name(0)));
    }

    if options.hashed {
        let table = FingerprintTable::build_with_taxa(trees, taxa, options.seed)?;
        reconstruct(trees, &table, options.threshold, options.rule)
    } else {
        let counts = BipartitionCounts::with_taxa(trees, taxa)?;
        reconstruct(trees, &counts, options.threshold, options.rule)
    }
}

/// Parent map that remembers first-insertion order.
struct ParentMap<K> {
    parents: HashMap<K, K>,
    order: Vec<K>,
}

impl<K: Clone + Eq + Hash> ParentMap<K> {
    fn new() -> Self {
        ParentMap {
            parents: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Child lists in first-insertion order of the children.
    fn children(&self) -> HashMap<K, Vec<K>> {
        let mut children: HashMap<K, Vec<K>> = HashMap::new();
        for child in &self.order {
            let parent = &self.parents[child];
            children.entry(parent.clone()).or_default().push(child.clone());
        }
        children
    }

    /// Distinct parents that are never children themselves.
    fn roots(&self) -> Vec<K> {
        let mut seen = HashSet::new();
        self.order
            .iter()
            .map(|child| &self.parents[child])
            .filter(|parent| !self.parents.contains_key(*parent))
            .filter(|parent| seen.insert((*parent).clone()))
            .cloned()
            .collect()
    }
}

struct Reconstruction<'a, T: CladeTally> {
    tally: &'a T,
    threshold: Threshold,
    rule: ParentRule,
    map: ParentMap<T::Key>,
}

impl<T: CladeTally> Reconstruction<'_, T> {
    /// Pre-order visit of `node`, with `c` the nearest kept ancestor.
    fn visit(&mut self, tree: &PhyloTree, tree_idx: usize, node: NodeId, c: &T::Key) -> Result<()> {
        let tally = self.tally;
        let key = tally
            .key(tree_idx, &node)
            .ok_or(ConsensusError::ForeignLeaves)?;

        let kept = self.threshold.admits(tally.frequency(key)) && key != c;
        if kept {
            self.record(key, c);
        }
        let next = if kept { key } else { c };

        for child in &tree.get(&node)?.children {
            self.visit(tree, tree_idx, *child, next)?;
        }
        Ok(())
    }

    fn record(&mut self, key: &T::Key, c: &T::Key) {
        match self.map.parents.get(key) {
            None => {
                trace!(?key, parent = ?c, "clade kept");
                self.map.parents.insert(key.clone(), c.clone());
                self.map.order.push(key.clone());
            }
            Some(current) if current != c => {
                if self.rule.prefers(self.tally, key, current, c) {
                    trace!(?key, from = ?current, to = ?c, "parent reassigned");
                    self.map.parents.insert(key.clone(), c.clone());
                }
            }
            Some(_) => {}
        }
    }
}

impl ParentRule {
    /// Whether `candidate` should replace `current` as the parent of `key`.
    fn prefers<T: CladeTally>(self, tally: &T, key: &T::Key, current: &T::Key, candidate: &T::Key) -> bool {
        match self {
            ParentRule::Frequency => tally.frequency(current) > tally.frequency(candidate),
            ParentRule::Literal => tally.frequency(key) > tally.frequency(candidate),
            ParentRule::Smallest => tally.size(candidate) < tally.size(current),
        }
    }
}

/// Rebuild the consensus tree from a tally of the clusters of `trees`.
///
/// `tally` must have been built from `trees`, in the same order.
///
/// # Errors
/// [`ConsensusError::ReconstructionAmbiguity`] when the parent map has zero or
/// several roots, leaves clusters unreachable from the root, or leaves a
/// multi-taxon cluster without children.
pub fn reconstruct<T: CladeTally>(
    trees: &[PhyloTree],
    tally: &T,
    threshold: Threshold,
    rule: ParentRule,
) -> Result<PhyloTree> {
    let mut pass = Reconstruction {
        tally,
        threshold,
        rule,
        map: ParentMap::new(),
    };

    for (tree_idx, tree) in trees.iter().enumerate() {
        let root = tree.get_root()?;
        let c = tally
            .key(tree_idx, &root)
            .ok_or(ConsensusError::ForeignLeaves)?
            .clone();
        for child in &tree.get(&root)?.children {
            pass.visit(tree, tree_idx, *child, &c)?;
        }
    }

    let map = pass.map;
    let roots = map.roots();
    let [root] = roots.as_slice() else {
        return Err(ConsensusError::ReconstructionAmbiguity(format!(
            "expected exactly one root cluster, found {}",
            roots.len()
        )));
    };

    let children = map.children();
    let mut consensus = PhyloTree::new();
    let emitted = build(&mut consensus, None, root, &children, tally)?;

    // Every recorded clade plus the root must hang from the root.
    if emitted != map.order.len() + 1 {
        return Err(ConsensusError::ReconstructionAmbiguity(format!(
            "{} of {} kept clusters are not connected to the root",
            map.order.len() + 1 - emitted,
            map.order.len()
        )));
    }

    debug!(
        kept = map.order.len(),
        nodes = consensus.size(),
        "majority tree reconstructed"
    );

    Ok(consensus)
}

/// Materialise `key` and its descendants under `parent`; returns the number
/// of nodes created.
fn build<T: CladeTally>(
    out: &mut PhyloTree,
    parent: Option<NodeId>,
    key: &T::Key,
    children: &HashMap<T::Key, Vec<T::Key>>,
    tally: &T,
) -> Result<usize> {
    let node = match children.get(key) {
        Some(_) => Node::new(),
        None => {
            let name = tally.leaf_name(key).ok_or_else(|| {
                ConsensusError::ReconstructionAmbiguity(format!(
                    "cluster of {} taxa was kept but no clade was placed below it",
                    tally.size(key)
                ))
            })?;
            Node::new_named(name)
        }
    };
    let id = match parent {
        Some(parent) => out.add_child(node, parent, None)?,
        None => out.add(node),
    };

    let mut emitted = 1;
    for child in children.get(key).into_iter().flatten() {
        emitted += build(out, Some(id), child, children, tally)?;
    }
    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tree_clusters;
    use itertools::Itertools;
    use std::collections::BTreeSet;

    fn parse(newicks: &[&str]) -> Vec<PhyloTree> {
        newicks
            .iter()
            .map(|nwk| PhyloTree::from_newick(nwk).unwrap())
            .collect()
    }

    fn clusters(expected: &[&[&str]]) -> BTreeSet<BTreeSet<String>> {
        expected
            .iter()
            .map(|cluster| cluster.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    fn options(l: f64, rule: ParentRule, hashed: bool) -> MajorityOptions {
        MajorityOptions {
            threshold: Threshold::new(l).unwrap(),
            rule,
            hashed,
            seed: Some(42),
        }
    }

    const FIVE_TAXA_TREES: [&str; 3] = [
        "((1,(2,(3,4))),5);",
        "(((1,2),(3,4)),5);",
        "((((1,2),3),4),5);",
    ];

    /// {A,B} ⊂ {A,B,C} ⊂ {A,B,C,D}, with {A,B,C} (0.8) more frequent than
    /// {A,B,C,D} (0.6). The first tree places {A,B} directly below
    /// {A,B,C,D}; comparing parent frequencies never moves it below {A,B,C}.
    const NESTED_TREES: [&str; 5] = [
        "((((A,B),D),C),E);",
        "((((A,B),C),D),E);",
        "((((A,B),C),D),E);",
        "(((A,B),C),(D,E));",
        "(((A,B),C),(D,E));",
    ];

    #[test]
    fn test_majority_keeps_compatible_clusters() {
        let consensus = majority_consensus(&parse(&FIVE_TAXA_TREES), 0.5).unwrap();

        assert_eq!(
            tree_clusters(&consensus).unwrap(),
            clusters(&[
                &["1", "2"],
                &["3", "4"],
                &["1", "2", "3", "4"],
                &["1", "2", "3", "4", "5"],
            ])
        );
        assert_eq!(consensus.to_newick().unwrap(), "(((3,4),(1,2)),5);");
    }

    #[test]
    fn test_strict_threshold() {
        let consensus = majority_consensus(&parse(&FIVE_TAXA_TREES), 1.0).unwrap();
        assert_eq!(consensus.to_newick().unwrap(), "((1,2,3,4),5);");

        // 2/3 is not above 0.7
        let consensus = majority_consensus(&parse(&FIVE_TAXA_TREES), 0.7).unwrap();
        assert_eq!(consensus.to_newick().unwrap(), "((1,2,3,4),5);");
    }

    #[test]
    fn test_half_is_not_a_majority() {
        // {A,B} and {A,C} each appear in exactly half of the trees.
        let consensus = majority_consensus(&parse(&["((A,B),C);", "((A,C),B);"]), 0.5).unwrap();
        assert_eq!(consensus.to_newick().unwrap(), "(A,B,C);");
    }

    #[test]
    fn test_star_tree_when_nothing_is_shared() {
        let trees = parse(&["((A,B),(C,D));", "((A,C),(B,D));", "((A,D),(B,C));"]);
        let consensus = majority_consensus(&trees, 0.5).unwrap();
        assert_eq!(consensus.to_newick().unwrap(), "(A,B,C,D);");
    }

    #[test]
    fn test_unanimous_input_returns_topology() {
        let newick = "((A,(B,C)),((D,E),F));";
        let trees = parse(&[newick; 4]);
        for l in [0.5, 0.75, 1.0] {
            let consensus = majority_consensus(&trees, l).unwrap();
            assert_eq!(
                tree_clusters(&consensus).unwrap(),
                tree_clusters(&trees[0]).unwrap()
            );
        }
    }

    #[test]
    fn test_idempotent_on_own_output() {
        let first = majority_consensus(&parse(&FIVE_TAXA_TREES), 0.5).unwrap();
        let second = majority_consensus(std::slice::from_ref(&first), 0.5).unwrap();
        assert_eq!(second.to_newick().unwrap(), first.to_newick().unwrap());
    }

    #[test]
    fn test_input_order_does_not_change_clusters() {
        let trees = parse(&FIVE_TAXA_TREES);
        let reference = tree_clusters(&majority_consensus(&trees, 0.5).unwrap()).unwrap();

        for order in (0..trees.len()).permutations(trees.len()) {
            let permuted: Vec<PhyloTree> = order.iter().map(|&i| trees[i].clone()).collect();
            let consensus = majority_consensus(&permuted, 0.5).unwrap();
            assert_eq!(tree_clusters(&consensus).unwrap(), reference);
        }
    }

    #[test]
    fn test_threshold_monotonicity() {
        let trees = parse(&NESTED_TREES);
        let mut previous: Option<BTreeSet<BTreeSet<String>>> = None;
        for l in [0.5, 0.6, 0.7, 0.8, 0.9, 1.0] {
            let consensus =
                majority_consensus_with(&trees, &options(l, ParentRule::Smallest, false)).unwrap();
            let current = tree_clusters(&consensus).unwrap();
            if let Some(previous) = &previous {
                assert!(current.is_subset(previous), "threshold {l} added clusters");
            }
            previous = Some(current);
        }
    }

    #[test]
    fn test_literal_rule_matches_on_agreeing_frequencies() {
        let trees = parse(&FIVE_TAXA_TREES);
        let frequency = majority_consensus_with(&trees, &options(0.5, ParentRule::Frequency, false)).unwrap();
        let literal = majority_consensus_with(&trees, &options(0.5, ParentRule::Literal, false)).unwrap();
        assert_eq!(literal.to_newick().unwrap(), frequency.to_newick().unwrap());
    }

    #[test]
    fn test_frequency_rule_can_orphan_a_cluster() {
        let trees = parse(&NESTED_TREES);

        let result = majority_consensus_with(&trees, &options(0.5, ParentRule::Frequency, false));
        assert!(matches!(result, Err(ConsensusError::ReconstructionAmbiguity(_))));

        let consensus =
            majority_consensus_with(&trees, &options(0.5, ParentRule::Smallest, false)).unwrap();
        assert_eq!(
            tree_clusters(&consensus).unwrap(),
            clusters(&[
                &["A", "B"],
                &["A", "B", "C"],
                &["A", "B", "C", "D"],
                &["A", "B", "C", "D", "E"],
            ])
        );
        assert_eq!(consensus.to_newick().unwrap(), "((D,((A,B),C)),E);");
    }

    #[test]
    fn test_hashed_matches_exact() {
        for newicks in [&FIVE_TAXA_TREES[..], &NESTED_TREES[..]] {
            let trees = parse(newicks);
            for l in [0.5, 0.7, 1.0] {
                let exact =
                    majority_consensus_with(&trees, &options(l, ParentRule::Smallest, false)).unwrap();
                let hashed =
                    majority_consensus_with(&trees, &options(l, ParentRule::Smallest, true)).unwrap();
                assert_eq!(hashed.to_newick().unwrap(), exact.to_newick().unwrap());
            }
        }
    }

    #[test]
    fn test_unary_chain_does_not_inflate_support() {
        let trees = parse(&["((((A,B)),C),D);", "((A,C),(B,D));", "((A,C),(B,D));"]);
        for rule in [ParentRule::Frequency, ParentRule::Literal, ParentRule::Smallest] {
            for hashed in [false, true] {
                let consensus = majority_consensus_with(&trees, &options(0.5, rule, hashed)).unwrap();
                assert_eq!(
                    tree_clusters(&consensus).unwrap(),
                    clusters(&[&["A", "C"], &["B", "D"], &["A", "B", "C", "D"]])
                );
                assert_eq!(consensus.to_newick().unwrap(), "((A,C),(B,D));");
            }
        }
    }

    #[test]
    fn test_single_taxon() {
        let trees = vec![single_leaf_tree("A"), single_leaf_tree("A")];
        let consensus = majority_consensus(&trees, 0.5).unwrap();
        assert_eq!(consensus.to_newick().unwrap(), "A;");
    }

    #[test]
    fn test_unary_root_is_not_a_cycle() {
        let consensus = majority_consensus(&parse(&["((A,B,C));", "((A,(B,C)));"]), 0.5).unwrap();
        assert_eq!(consensus.to_newick().unwrap(), "(A,B,C);");
    }

    #[test]
    fn test_invalid_input() {
        let trees = parse(&FIVE_TAXA_TREES);
        for l in [0.49, 1.01, f64::NAN] {
            assert!(matches!(
                majority_consensus(&trees, l),
                Err(ConsensusError::InvalidThreshold(_))
            ));
        }
        assert!(matches!(majority_consensus(&[], 0.5), Err(ConsensusError::EmptyInput)));
        assert!(matches!(
            majority_consensus(&parse(&["((A,B),C);", "((A,B),D);"]), 0.5),
            Err(ConsensusError::TaxaMismatch { tree: 1 })
        ));
    }
}
