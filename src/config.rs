//! Run configuration shared by the CLI and the Python bindings.

use std::fmt;
use std::str::FromStr;

use phylotree::tree::Tree as PhyloTree;
use tracing::info;

use crate::adams::adams_consensus;
use crate::error::{ConsensusError, Result};
use crate::majority::{MajorityOptions, majority_consensus_with};

/// Majority threshold `l`, validated to lie in `[0.5, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f64);

impl Threshold {
    /// The plain majority rule.
    pub const MAJORITY: Threshold = Threshold(0.5);

    pub fn new(l: f64) -> Result<Self> {
        if (0.5..=1.0).contains(&l) {
            Ok(Threshold(l))
        } else {
            Err(ConsensusError::InvalidThreshold(l))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether a clade seen with frequency `f` is kept.
    ///
    /// The comparison is strict, except that `l = 1` keeps clades present in
    /// every tree.
    pub fn admits(self, f: f64) -> bool {
        f > self.0 || (f == self.0 && self.0 == 1.0)
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold::MAJORITY
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Threshold {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let l: f64 = s
            .trim()
            .parse()
            .map_err(|e| format!("invalid threshold '{s}': {e}"))?;
        Threshold::new(l).map_err(|e| e.to_string())
    }
}

/// How a clade met under two different kept ancestors picks its parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParentRule {
    /// Move to the new ancestor when the current parent is the more frequent
    /// of the two.
    #[default]
    Frequency,
    /// Move when the clade itself is more frequent than the new ancestor.
    Literal,
    /// Keep the ancestor with the fewest taxa. Always yields the nearest
    /// kept ancestor.
    Smallest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Algorithm {
    #[default]
    Adams,
    Majority,
}

/// Everything a consensus run needs besides the trees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConsensusConfig {
    pub algorithm: Algorithm,
    pub threshold: Threshold,
    pub parent_rule: ParentRule,
    pub hashed: bool,
    pub seed: Option<u64>,
}

impl ConsensusConfig {
    pub fn majority_options(&self) -> MajorityOptions {
        MajorityOptions {
            threshold: self.threshold,
            rule: self.parent_rule,
            hashed: self.hashed,
            seed: self.seed,
        }
    }
}

/// Run the configured consensus method on `trees`.
pub fn run(trees: &[PhyloTree], config: &ConsensusConfig) -> Result<PhyloTree> {
    info!(
        algorithm = ?config.algorithm,
        trees = trees.len(),
        "running consensus"
    );
    match config.algorithm {
        Algorithm::Adams => adams_consensus(trees),
        Algorithm::Majority => majority_consensus_with(trees, &config.majority_options()),
    }
}
