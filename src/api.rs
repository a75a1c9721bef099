//! Python binding layer for consensus trees.
//!
//! Trees go in and come out as Newick strings.

use phylotree::tree::Tree as PhyloTree;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::{ParentRule, Threshold};
use crate::error::ConsensusError;
use crate::io::parse_newick;
use crate::majority::{MajorityOptions, majority_consensus_with};

fn to_py_err(e: ConsensusError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn parse_all(newicks: &[String]) -> PyResult<Vec<PhyloTree>> {
    newicks
        .iter()
        .enumerate()
        .map(|(index, newick)| parse_newick(index, newick))
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_py_err)
}

fn parse_rule(rule: &str) -> PyResult<ParentRule> {
    match rule.to_ascii_lowercase().as_str() {
        "frequency" => Ok(ParentRule::Frequency),
        "literal" => Ok(ParentRule::Literal),
        "smallest" => Ok(ParentRule::Smallest),
        other => Err(PyValueError::new_err(format!(
            "unknown parent rule '{other}', expected frequency, literal or smallest"
        ))),
    }
}

/// Compute the Adams consensus of a list of Newick trees.
///
/// Args:
///     newicks: Newick strings, all over the same taxa
///
/// Returns:
///     The consensus tree as a Newick string
///
/// Raises:
///     ValueError: If the list is empty, a tree cannot be parsed, or the
///     trees do not share their taxa
#[pyfunction]
fn adams_consensus(newicks: Vec<String>) -> PyResult<String> {
    let trees = parse_all(&newicks)?;
    let consensus = crate::adams::adams_consensus(&trees).map_err(to_py_err)?;
    consensus.to_newick().map_err(|e| to_py_err(e.into()))
}

/// Compute the majority-rule consensus of a list of Newick trees.
///
/// Args:
///     newicks: Newick strings, all over the same taxa
///     threshold: Minimum fraction of trees a clade must exceed, in [0.5, 1] (default: 0.5)
///     hashed: Tally clades with randomized fingerprints instead of exact sets (default: False)
///     seed: Seed for the fingerprint coefficients (default: None)
///     parent_rule: "frequency", "literal" or "smallest" (default: "frequency")
///
/// Returns:
///     The consensus tree as a Newick string
///
/// Raises:
///     ValueError: On invalid input, an out-of-range threshold, or an
///     ambiguous reconstruction
#[pyfunction]
#[pyo3(signature = (newicks, threshold=0.5, hashed=false, seed=None, parent_rule="frequency"))]
fn majority_consensus(
    newicks: Vec<String>,
    threshold: f64,
    hashed: bool,
    seed: Option<u64>,
    parent_rule: &str,
) -> PyResult<String> {
    let options = MajorityOptions {
        threshold: Threshold::new(threshold).map_err(to_py_err)?,
        rule: parse_rule(parent_rule)?,
        hashed,
        seed,
    };
    let trees = parse_all(&newicks)?;
    let consensus = majority_consensus_with(&trees, &options).map_err(to_py_err)?;
    consensus.to_newick().map_err(|e| to_py_err(e.into()))
}

/// Python module definition
#[pymodule]
fn consensus_trees(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(adams_consensus, m)?)?;
    m.add_function(wrap_pyfunction!(majority_consensus, m)?)?;
    Ok(())
}
