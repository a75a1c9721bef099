//! Compact bitset representation for clusters (leaf sets) of phylogenetic trees.
//!
//! # Overview
//! Every taxon gets a fixed bit position (see [`crate::taxa::TaxonSet`]), so the
//! set of leaves below a clade is a bitset. Two clades from different trees
//! describe the same cluster exactly when their bitsets are equal, which makes
//! `Bitset` the exact, collision-free identity of a bipartition.
//!
//! # Example
//! For taxa [A, B, C, D] mapped to indices [0, 1, 2, 3]:
//! - Cluster {A, C} → bitset `0b0101` (bits 0 and 2 set)
//! - Cluster {B, C, D} → bitset `0b1110` (bits 1, 2, 3 set)

/// A compact bitset for representing which leaves belong to a cluster.
///
/// Internally stores bits in `Vec<u64>` words to support arbitrarily large trees.
/// Each u64 word holds 64 leaf indices.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Creates a new bitset with all bits set to 0.
    ///
    /// # Parameters
    /// - `words`: Number of u64 words needed. Calculate as `num_leaves.div_ceil(64)`
    ///
    /// # Example
    /// ```
    /// # use consensus_trees::bitset::Bitset;
    /// // For a tree with 100 leaves, need 2 words (128 bits)
    /// let bs = Bitset::zeros(2);
    /// assert_eq!(bs.0.len(), 2);
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Creates the cluster holding every one of `num_leaves` leaves.
    ///
    /// # Example
    /// ```
    /// # use consensus_trees::bitset::Bitset;
    /// let all = Bitset::full(70);
    /// assert_eq!(all.count_ones(), 70);
    /// assert_eq!(all.0.len(), 2);
    /// ```
    pub fn full(num_leaves: usize) -> Self {
        let mut bs = Bitset::zeros(num_leaves.div_ceil(64));
        for idx in 0..num_leaves {
            bs.set(idx);
        }
        bs
    }

    /// Creates the singleton cluster `{idx}`.
    pub fn singleton(words: usize, idx: usize) -> Self {
        let mut bs = Bitset::zeros(words);
        bs.set(idx);
        bs
    }

    /// Sets the bit at the given index to 1.
    ///
    /// # Example
    /// ```
    /// # use consensus_trees::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);  // Mark leaf 0 as present
    /// bs.set(5);  // Mark leaf 5 as present
    /// assert_eq!(bs.0[0], 0b00100001);
    /// ```
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6;     // Equivalent to idx / 64
        let bit = idx & 63;      // Equivalent to idx % 64
        self.0[word] |= 1u64 << bit;
    }

    /// Returns true if leaf `idx` belongs to this cluster.
    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        let word = idx >> 6;
        let bit = idx & 63;
        self.0.get(word).is_some_and(|w| (w >> bit) & 1 == 1)
    }

    /// Performs bitwise OR with another bitset (union operation).
    ///
    /// Merges two leaf sets: `self` becomes `self ∪ other`
    ///
    /// # Example
    /// ```
    /// # use consensus_trees::bitset::Bitset;
    /// let mut left = Bitset::zeros(1);
    /// left.set(0);   // {0}
    ///
    /// let mut right = Bitset::zeros(1);
    /// right.set(1);  // {1}
    ///
    /// left.or_assign(&right);  // {0} ∪ {1} = {0, 1}
    /// assert_eq!(left.0[0], 0b11);
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Returns true if the two clusters share at least one leaf.
    #[inline]
    pub fn intersects(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).any(|(a, b)| a & b != 0)
    }

    /// Returns true if every leaf of `self` is also in `other`.
    ///
    /// # Example
    /// ```
    /// # use consensus_trees::bitset::Bitset;
    /// let mut small = Bitset::zeros(1);
    /// small.set(1);
    /// let mut big = small.clone();
    /// big.set(3);
    /// assert!(small.is_subset(&big));
    /// assert!(!big.is_subset(&small));
    /// ```
    #[inline]
    pub fn is_subset(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a & !b == 0)
    }

    /// Counts the number of set bits (population count).
    ///
    /// Returns how many leaves are in this cluster.
    ///
    /// # Example
    /// ```
    /// # use consensus_trees::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);
    /// bs.set(2);
    /// bs.set(5);
    /// assert_eq!(bs.count_ones(), 3);
    /// ```
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterates the indices of set bits in increasing order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(w, &word)| {
            (0..64).filter(move |bit| (word >> bit) & 1 == 1).map(move |bit| (w << 6) + bit)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_basic() {
        let mut bs = Bitset::zeros(1);
        bs.set(0);
        bs.set(2);
        assert_eq!(bs.0[0], 0b0101);
        assert!(bs.contains(2));
        assert!(!bs.contains(1));
        assert!(!bs.contains(500));
    }

    #[test]
    fn test_bitset_or() {
        let mut bs1 = Bitset::zeros(1);
        bs1.set(0);
        bs1.set(1);

        let mut bs2 = Bitset::zeros(1);
        bs2.set(2);
        bs2.set(3);

        assert!(!bs1.intersects(&bs2));
        bs1.or_assign(&bs2);
        assert_eq!(bs1.0[0], 0b1111);
        assert!(bs1.intersects(&bs2));
        assert!(bs2.is_subset(&bs1));
    }

    /// ```text
    ///           root
    ///          /    \
    ///        node1   D
    ///        /   \
    ///       A    node2
    ///            /   \
    ///           B     C
    /// ```
    ///
    /// Leaf mapping: A=0, B=1, C=2, D=3
    #[test]
    fn test_mini_tree_clusters() {
        let mut node2 = Bitset::singleton(1, 1);
        node2.set(2);
        assert_eq!(node2.0[0], 0b0110);

        let mut node1 = Bitset::singleton(1, 0);
        node1.or_assign(&node2);
        assert_eq!(node1.0[0], 0b0111);
        assert_eq!(node1.count_ones(), 3);

        let mut root = node1.clone();
        root.set(3);
        assert_eq!(root, Bitset::full(4));
        assert!(node2.is_subset(&node1) && node1.is_subset(&root));
    }

    #[test]
    fn test_large_tree() {
        // More than 64 leaves (multiple words)
        let mut bs = Bitset::zeros(2);
        bs.set(0);
        bs.set(63);
        bs.set(64);
        bs.set(127);

        assert_eq!(bs.count_ones(), 4);
        assert_eq!(bs.0[0], 1u64 | (1u64 << 63));
        assert_eq!(bs.0[1], 1u64 | (1u64 << 63));
        assert_eq!(bs.ones().collect::<Vec<_>>(), vec![0, 63, 64, 127]);
    }
}
