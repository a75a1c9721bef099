//! Double modular hashing of clusters.
//!
//! Instead of materialising the leaf set of every clade, each clade gets a
//! fingerprint `(h1, h2)`:
//!
//! - leaf `i`: `(a1[i], a2[i])`, two coefficients sampled for taxon `i`,
//! - internal node: the sum of its children's fingerprints, `h1` mod `m1` and
//!   `h2` mod `m2`.
//!
//! Because the hash is additive, a node's fingerprint is the sum of the
//! coefficients of the leaves below it, whatever the shape of the subtree,
//! so equal clusters in different trees get equal fingerprints.
//!
//! Occurrences are tallied in a table of `m1` buckets indexed by `h1`; each
//! bucket holds `(h2, count)` entries. A tree adds one to each distinct
//! fingerprint it carries, so a unary chain is counted once.
//!
//! # Limitation
//! Distinct clusters may collide on both components. Collisions are neither
//! detected nor reported: the table trades exactness for speed, with a
//! collision probability of roughly `1/m2` per pair of clusters. Use
//! [`crate::bipartitions::BipartitionCounts`] when exactness matters.

use std::collections::{HashMap, HashSet};

use phylotree::tree::Tree as PhyloTree;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use tracing::debug;

use crate::error::{ConsensusError, Result};
use crate::majority::CladeTally;
use crate::snapshot::NodeId;
use crate::taxa::TaxonSet;

/// Modulus of the second hash: the Mersenne prime 2^61 - 1.
pub const M2: u64 = (1 << 61) - 1;

/// The pair of modular hashes identifying a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    pub h1: u64,
    pub h2: u64,
}

/// Bucket table of fingerprint occurrences, plus the fingerprint of every
/// node of every tree.
#[derive(Debug, Clone)]
pub struct FingerprintTable {
    m1: u64,
    buckets: Vec<Vec<(u64, usize)>>,
    node_keys: Vec<HashMap<NodeId, Fingerprint>>,
    leaves: HashMap<Fingerprint, usize>,
    sizes: HashMap<Fingerprint, usize>,
    taxa: TaxonSet,
}

impl FingerprintTable {
    /// Validate `trees`, sample the coefficients and tally every clade.
    ///
    /// A `seed` makes the coefficients, and therefore the fingerprints,
    /// reproducible. Without one the generator is seeded from entropy.
    pub fn build(trees: &[PhyloTree], seed: Option<u64>) -> Result<Self> {
        let taxa = TaxonSet::from_trees(trees)?;
        Self::build_with_taxa(trees, taxa, seed)
    }

    /// Same as [`FingerprintTable::build`] for trees already validated
    /// against `taxa`.
    pub fn build_with_taxa(trees: &[PhyloTree], taxa: TaxonSet, seed: Option<u64>) -> Result<Self> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let n = taxa.len();
        let m1 = smallest_prime_greater_than((trees.len() * n) as u64);
        let a1: Vec<u64> = index::sample(&mut rng, m1 as usize, n)
            .into_iter()
            .map(|a| a as u64)
            .collect();
        let a2: Vec<u64> = index::sample(&mut rng, M2 as usize, n)
            .into_iter()
            .map(|a| a as u64)
            .collect();

        debug!(trees = trees.len(), taxa = n, m1, m2 = M2, "fingerprint table parameters");

        let mut table = FingerprintTable {
            m1,
            buckets: vec![Vec::new(); m1 as usize],
            node_keys: Vec::with_capacity(trees.len()),
            leaves: HashMap::with_capacity(n),
            sizes: HashMap::new(),
            taxa,
        };

        for tree in trees {
            let keys = table.tally_tree(tree, &a1, &a2)?;
            table.node_keys.push(keys);
        }

        debug!(
            fingerprints = table.sizes.len(),
            max_bucket = table.buckets.iter().map(Vec::len).max().unwrap_or(0),
            "fingerprints tallied"
        );

        Ok(table)
    }

    /// Post-order pass over one tree: fingerprint every node and count it.
    fn tally_tree(
        &mut self,
        tree: &PhyloTree,
        a1: &[u64],
        a2: &[u64],
    ) -> Result<HashMap<NodeId, Fingerprint>> {
        let root = tree.get_root()?;
        let mut keys: HashMap<NodeId, Fingerprint> = HashMap::with_capacity(tree.size());
        let mut sizes: HashMap<NodeId, usize> = HashMap::with_capacity(tree.size());
        let mut seen: HashSet<Fingerprint> = HashSet::with_capacity(tree.size());

        for node_id in tree.postorder(&root)? {
            let node = tree.get(&node_id)?;
            let (fingerprint, size) = if node.children.is_empty() {
                let idx = node
                    .name
                    .as_deref()
                    .and_then(|name| self.taxa.index_of(name))
                    .ok_or(ConsensusError::ForeignLeaves)?;
                let fingerprint = Fingerprint { h1: a1[idx], h2: a2[idx] };
                self.leaves.insert(fingerprint, idx);
                (fingerprint, 1)
            } else {
                let mut fingerprint = Fingerprint { h1: 0, h2: 0 };
                let mut size = 0;
                for child in &node.children {
                    let hashes = keys[child];
                    fingerprint.h1 = (fingerprint.h1 + hashes.h1) % self.m1;
                    fingerprint.h2 = (fingerprint.h2 + hashes.h2) % M2;
                    size += sizes[child];
                }
                (fingerprint, size)
            };

            if seen.insert(fingerprint) {
                self.record(fingerprint);
            }
            self.sizes.entry(fingerprint).or_insert(size);
            keys.insert(node_id, fingerprint);
            sizes.insert(node_id, size);
        }

        Ok(keys)
    }

    /// Increment the entry of `fingerprint`, inserting it if absent.
    fn record(&mut self, fingerprint: Fingerprint) {
        let bucket = &mut self.buckets[fingerprint.h1 as usize];
        match bucket.iter_mut().find(|(h2, _)| *h2 == fingerprint.h2) {
            Some(entry) => entry.1 += 1,
            None => bucket.push((fingerprint.h2, 1)),
        }
    }

    /// Modulus of the first hash, which is also the number of buckets.
    pub fn m1(&self) -> u64 {
        self.m1
    }

    /// Fingerprint of `node` in tree `tree`.
    pub fn fingerprint(&self, tree: usize, node: &NodeId) -> Option<Fingerprint> {
        self.node_keys.get(tree)?.get(node).copied()
    }

    /// Occurrences of `fingerprint`, found by scanning its bucket.
    pub fn occurrences(&self, fingerprint: &Fingerprint) -> usize {
        self.buckets
            .get(fingerprint.h1 as usize)
            .and_then(|bucket| bucket.iter().find(|(h2, _)| *h2 == fingerprint.h2))
            .map_or(0, |&(_, count)| count)
    }

    pub fn taxa(&self) -> &TaxonSet {
        &self.taxa
    }
}

impl CladeTally for FingerprintTable {
    type Key = Fingerprint;

    fn num_trees(&self) -> usize {
        self.node_keys.len()
    }

    fn key(&self, tree: usize, node: &NodeId) -> Option<&Fingerprint> {
        self.node_keys.get(tree)?.get(node)
    }

    fn count(&self, key: &Fingerprint) -> usize {
        self.occurrences(key)
    }

    fn size(&self, key: &Fingerprint) -> usize {
        self.sizes.get(key).copied().unwrap_or(0)
    }

    fn leaf_name(&self, key: &Fingerprint) -> Option<&str> {
        self.leaves.get(key).map(|&idx| self.taxa.name(idx))
    }
}

/// Smallest prime strictly greater than `x`.
pub fn smallest_prime_greater_than(x: u64) -> u64 {
    (x + 1..).find(|&candidate| is_prime(candidate)).unwrap_or(u64::MAX)
}

fn is_prime(x: u64) -> bool {
    if x < 2 {
        return false;
    }
    if x % 2 == 0 {
        return x == 2;
    }
    let mut d = 3;
    while d * d <= x {
        if x % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}
