//! Restriction of a tree to a subset of its leaves, and subtree grafting.
//!
//! Restricting keeps only the paths from the root to the kept leaves:
//!
//! ```text
//!        root                       root
//!       /    \      keep {A,C,D}    / | \
//!     n1      n2    ──────────▶    A  C  D
//!    /  \    /  \
//!   A    B  C    D
//! ```
//!
//! `n1` lost `B` and is left with a single child, so it is spliced out and
//! `A` hangs from the root directly. Unary chains never survive a
//! restriction, and a root left with one child is replaced by its first
//! descendant that still branches.
//!
//! The result is always a freshly built tree: the input is never mutated and
//! the output never shares nodes with it. Branch lengths and internal labels
//! are not carried over.

use phylotree::tree::{Node, Tree as PhyloTree};
use tracing::trace;

use crate::bitset::Bitset;
use crate::error::{ConsensusError, Result};
use crate::snapshot::{CladeSnapshot, NodeId};

/// Restrict `tree` to the leaves in `keep`.
///
/// `snapshot` must have been computed from `tree`; its cached clusters are
/// used for every overlap test, so no leaf set is recomputed.
///
/// # Errors
/// - [`ConsensusError::EmptyRestriction`] if `keep` is empty
/// - [`ConsensusError::ForeignLeaves`] if `keep` is not a subset of the tree's leaves
pub fn restrict(tree: &PhyloTree, snapshot: &CladeSnapshot, keep: &Bitset) -> Result<PhyloTree> {
    if keep.count_ones() == 0 {
        return Err(ConsensusError::EmptyRestriction);
    }
    if !keep.is_subset(snapshot.root_cluster()) {
        return Err(ConsensusError::ForeignLeaves);
    }

    let top = first_branching(tree, snapshot, keep, snapshot.root())?;
    let top_node = tree.get(&top)?;

    let mut restricted = PhyloTree::new();
    if top_node.children.is_empty() {
        restricted.add(leaf_node(top_node)?);
    } else {
        let root = restricted.add(Node::new());
        copy_kept_children(tree, snapshot, keep, top, &mut restricted, root)?;
    }

    trace!(
        kept = keep.count_ones(),
        from = snapshot.num_leaves(),
        nodes = restricted.size(),
        "tree restricted"
    );

    Ok(restricted)
}

/// Follow single-overlap links down from `node` and return the first node
/// that has either zero or several children overlapping `keep`.
fn first_branching(
    tree: &PhyloTree,
    snapshot: &CladeSnapshot,
    keep: &Bitset,
    node: NodeId,
) -> Result<NodeId> {
    let mut current = node;
    loop {
        let mut overlapping = tree
            .get(&current)?
            .children
            .iter()
            .filter(|child| overlaps(snapshot, keep, child));
        match (overlapping.next(), overlapping.next()) {
            (Some(&only), None) => current = only,
            _ => return Ok(current),
        }
    }
}

/// Copy the children of `src` that overlap `keep` under `dst` in `out`,
/// splicing out every node that would be left with a single child.
fn copy_kept_children(
    tree: &PhyloTree,
    snapshot: &CladeSnapshot,
    keep: &Bitset,
    src: NodeId,
    out: &mut PhyloTree,
    dst: NodeId,
) -> Result<()> {
    for child in &tree.get(&src)?.children {
        if !overlaps(snapshot, keep, child) {
            continue;
        }
        let child = first_branching(tree, snapshot, keep, *child)?;
        let node = tree.get(&child)?;
        if node.children.is_empty() {
            out.add_child(leaf_node(node)?, dst, None)?;
        } else {
            let copy = out.add_child(Node::new(), dst, None)?;
            copy_kept_children(tree, snapshot, keep, child, out, copy)?;
        }
    }
    Ok(())
}

fn overlaps(snapshot: &CladeSnapshot, keep: &Bitset, node: &NodeId) -> bool {
    snapshot.cluster(node).is_some_and(|cluster| cluster.intersects(keep))
}

/// Fresh node carrying only the name of a leaf.
fn leaf_node(leaf: &Node) -> Result<Node> {
    let name = leaf.name.as_deref().ok_or(ConsensusError::ForeignLeaves)?;
    Ok(Node::new_named(name))
}

/// A tree made of a single named leaf.
pub fn single_leaf_tree(name: &str) -> PhyloTree {
    let mut tree = PhyloTree::new();
    tree.add(Node::new_named(name));
    tree
}

/// Copy the subtree of `src` rooted at `src_node` into `out`, under `parent`
/// (or as the root when `parent` is `None`). Only the topology and leaf
/// names are copied.
///
/// Returns the id of the copied subtree root in `out`.
pub fn graft(
    out: &mut PhyloTree,
    parent: Option<NodeId>,
    src: &PhyloTree,
    src_node: NodeId,
) -> Result<NodeId> {
    let node = src.get(&src_node)?;
    let copy = if node.children.is_empty() {
        leaf_node(node)?
    } else {
        Node::new()
    };
    let id = match parent {
        Some(parent) => out.add_child(copy, parent, None)?,
        None => out.add(copy),
    };
    for child in &node.children {
        graft(out, Some(id), src, *child)?;
    }
    Ok(id)
}
