use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use phylotree::tree::Tree as PhyloTree;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{ConsensusError, Result};
use crate::restrict::single_leaf_tree;

/// Options for reading tree files. Burn-in and translation only apply to
/// NEXUS input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Drop the first N trees.
    pub burnin_trees: usize,
    /// Keep trees with `STATE_` above this value.
    pub burnin_states: usize,
    /// Map leaf ids through the TRANSLATE block.
    pub use_real_taxa: bool,
}

/// Read every tree of a Newick or NEXUS file, gzip-compressed if the path
/// ends in `.gz`.
///
/// Newick files hold one tree per line; empty lines and lines starting with
/// `#` are skipped. A file starting with `#NEXUS` is read as a BEAST trees
/// file instead.
pub fn read_trees<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<Vec<PhyloTree>> {
    let path = path.as_ref();
    let content = read_to_string(path)?;

    let trees = if content.trim_start().to_ascii_uppercase().starts_with("#NEXUS") {
        parse_nexus(&content, options)?
    } else {
        parse_newick_lines(&content)?
    };

    debug!(path = %path.display(), trees = trees.len(), "trees read");
    Ok(trees)
}

fn read_to_string(path: &Path) -> Result<String> {
    let mut content = String::new();
    if path.to_string_lossy().ends_with(".gz") {
        GzDecoder::new(File::open(path)?).read_to_string(&mut content)?;
    } else {
        File::open(path)?.read_to_string(&mut content)?;
    }
    Ok(content)
}

/// Parse one Newick tree per non-comment line, in parallel.
pub fn parse_newick_lines(content: &str) -> Result<Vec<PhyloTree>> {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();

    lines
        .par_iter()
        .enumerate()
        .map(|(index, line)| parse_newick(index, line))
        .collect()
}

/// Parse a single Newick string.
///
/// Whitespace outside quoted labels is removed and a missing `;` is added.
/// A tree that is just one leaf is built directly.
pub fn parse_newick(index: usize, newick: &str) -> Result<PhyloTree> {
    let mut normalized = strip_whitespace(newick);
    if !normalized.ends_with(';') {
        normalized.push(';');
    }

    if !normalized.contains('(') {
        let name = normalized
            .trim_end_matches(';')
            .split(':')
            .next()
            .unwrap_or_default()
            .trim_matches('\'');
        if name.is_empty() {
            return Err(ConsensusError::Newick {
                index,
                message: "empty tree".to_string(),
            });
        }
        return Ok(single_leaf_tree(name));
    }

    PhyloTree::from_newick(&normalized).map_err(|e| ConsensusError::Newick {
        index,
        message: e.to_string(),
    })
}

fn strip_whitespace(newick: &str) -> String {
    let mut quoted = false;
    newick
        .chars()
        .filter(|&ch| {
            if ch == '\'' {
                quoted = !quoted;
            }
            quoted || !ch.is_whitespace()
        })
        .collect()
}

/// Strip BEAST annotations such as `[&rate=0.123]` from a Newick string,
/// keeping the branch lengths around them.
fn strip_beast_annotations(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut in_annotation = false;
    let mut chars = newick.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '[' && chars.peek() == Some(&'&') {
            in_annotation = true;
        } else if ch == ']' && in_annotation {
            in_annotation = false;
        } else if !in_annotation {
            result.push(ch);
        }
    }

    result
}

/// Parse the trees block of a NEXUS/BEAST file.
pub fn parse_nexus(content: &str, options: &ReadOptions) -> Result<Vec<PhyloTree>> {
    let translate = parse_taxon_block(content);
    let blocks = collect_tree_blocks(content);
    let total = blocks.len();

    let kept: Vec<(usize, String)> = blocks
        .into_iter()
        .enumerate()
        .filter(|(idx, block)| {
            let state = extract_state(block.header);
            (options.burnin_trees == 0 && options.burnin_states == 0)
                || (options.burnin_trees > 0 && *idx >= options.burnin_trees)
                || (options.burnin_states > 0 && state > options.burnin_states)
        })
        .map(|(idx, block)| (idx, strip_beast_annotations(&block.body)))
        .collect();

    debug!(
        trees = total,
        kept = kept.len(),
        translated = translate.len(),
        "nexus trees block"
    );
    if options.use_real_taxa && translate.is_empty() {
        warn!("no TRANSLATE block found, keeping leaf names as they are");
    }

    kept.par_iter()
        .map(|(idx, newick)| {
            let mut tree = parse_newick(*idx, newick)?;
            if options.use_real_taxa {
                rename_leaf_nodes(&mut tree, &translate);
            }
            Ok(tree)
        })
        .collect()
}

fn extract_state(header: &str) -> usize {
    header
        .to_ascii_uppercase()
        .find("STATE_")
        .and_then(|start| {
            header[start + "STATE_".len()..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse()
                .ok()
        })
        .unwrap_or(0)
}

struct TreeBlock<'a> {
    header: &'a str,
    body: String,
}

fn collect_tree_blocks(content: &str) -> Vec<TreeBlock<'_>> {
    content
        .lines()
        .map(str::trim)
        .skip_while(|line| !line.to_ascii_uppercase().starts_with("TREE "))
        .take_while(|line| !line.to_ascii_uppercase().starts_with("END;"))
        .filter_map(|line| {
            let (header, body) = line.split_once(" = ")?;
            Some(TreeBlock {
                header: header.trim(),
                body: body.trim().to_string(),
            })
        })
        .collect()
}

/// Read the `TRANSLATE` block into an id -> label map.
///
/// ```text
/// Translate
///     1 '1959.M.CD.59.ZR59',
///     2 '1960.DRC60A'
/// ;
/// ```
fn parse_taxon_block(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .skip_while(|line| !line.trim().to_ascii_uppercase().starts_with("TRANSLATE"))
        .skip(1)
        .take_while(|line| !line.trim().starts_with(';'))
        .filter_map(|line| {
            let line = line.trim().trim_end_matches([',', ';']);
            let mut parts = line.split_whitespace();
            let id = parts.next()?.to_string();
            let label = parts.next()?.trim_matches('\'').to_string();
            Some((id, label))
        })
        .collect()
}

/// Rename leaves through `translate`; unknown ids keep their name.
pub fn rename_leaf_nodes(tree: &mut PhyloTree, translate: &HashMap<String, String>) {
    for leaf_id in tree.get_leaves() {
        if let Ok(node) = tree.get_mut(&leaf_id) {
            if let Some(label) = node.name.as_ref().and_then(|name| translate.get(name)) {
                node.name = Some(label.clone());
            }
        }
    }
}

/// Write `tree` as a single Newick line to a file or stdout.
/// If `path` ends with `.gz`, the output is gzip-compressed.
/// If `path` equals `-`, the tree is written to stdout (uncompressed).
pub fn write_newick<P: AsRef<Path>>(path: P, tree: &PhyloTree) -> Result<()> {
    let p = path.as_ref();
    let newick = tree.to_newick()?;

    let mut out: Box<dyn Write> = if p.as_os_str() == "-" {
        Box::new(BufWriter::new(io::stdout().lock()))
    } else if p.to_string_lossy().ends_with(".gz") {
        let enc = GzEncoder::new(File::create(p)?, Compression::default());
        Box::new(BufWriter::new(enc))
    } else {
        Box::new(BufWriter::new(File::create(p)?))
    };

    writeln!(&mut out, "{newick}")?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tree_clusters;
    use std::collections::BTreeSet;

    const NEXUS: &str = "#NEXUS

Begin taxa;
    Dimensions ntax=3;
End;

Begin trees;
    Translate
        1 'Homo_sapiens',
        2 'Pan_troglodytes',
        3 'Gorilla_gorilla'
        ;
tree STATE_0 [&lnP=-10.5] = [&R] ((1:[&rate=1.0]0.1,2:0.2):0.3,3:0.4);
tree STATE_1000 [&lnP=-9.5] = [&R] ((1:0.1,3:0.2):0.3,2:0.4);
tree STATE_2000 [&lnP=-9.0] = [&R] ((2:0.1,3:0.2):0.3,1:0.4);
End;
";

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("consensus-trees-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_newick_lines_skip_comments_and_blanks() {
        let content = "# input trees\n((A,B),C);\n\n  ( (A , C) , B )\n";
        let trees = parse_newick_lines(content).unwrap();
        assert_eq!(trees.len(), 2);
        assert_eq!(trees[1].to_newick().unwrap(), "((A,C),B);");
    }

    #[test]
    fn test_single_leaf_and_bad_newick() {
        let leaf = parse_newick(0, "A:0.5;").unwrap();
        assert_eq!(leaf.to_newick().unwrap(), "A;");

        assert!(matches!(
            parse_newick(3, "  ;"),
            Err(ConsensusError::Newick { index: 3, .. })
        ));
    }

    #[test]
    fn test_strip_beast_annotations() {
        assert_eq!(
            strip_beast_annotations("(A:[&rate=0.5]1.0,B:2.0)[&R];"),
            "(A:1.0,B:2.0);"
        );
    }

    #[test]
    fn test_extract_state() {
        assert_eq!(extract_state("tree STATE_1000 [&lnP=-9.5]"), 1000);
        assert_eq!(extract_state("tree state_42"), 42);
        assert_eq!(extract_state("tree TREE1"), 0);
    }

    #[test]
    fn test_nexus_translate_and_burnin() {
        let options = ReadOptions {
            use_real_taxa: true,
            ..ReadOptions::default()
        };
        let trees = parse_nexus(NEXUS, &options).unwrap();
        assert_eq!(trees.len(), 3);

        let clusters = tree_clusters(&trees[0]).unwrap();
        let pair: BTreeSet<String> = ["Homo_sapiens", "Pan_troglodytes"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(clusters.len(), 2);
        assert!(clusters.contains(&pair));

        let by_count = ReadOptions {
            burnin_trees: 1,
            ..ReadOptions::default()
        };
        assert_eq!(parse_nexus(NEXUS, &by_count).unwrap().len(), 2);

        let by_state = ReadOptions {
            burnin_states: 1000,
            ..ReadOptions::default()
        };
        assert_eq!(parse_nexus(NEXUS, &by_state).unwrap().len(), 1);
    }

    #[test]
    fn test_untranslated_ids_are_kept() {
        let trees = parse_nexus(NEXUS, &ReadOptions::default()).unwrap();
        let names: Vec<String> = trees[0]
            .get_leaves()
            .iter()
            .filter_map(|id| trees[0].get(id).ok()?.name.clone())
            .collect();
        assert!(names.iter().all(|name| ["1", "2", "3"].contains(&name.as_str())));
    }

    #[test]
    fn test_gzip_round_trip() {
        let path = temp_path("round-trip.nwk.gz");
        let tree = parse_newick(0, "((A,B),(C,D));").unwrap();
        write_newick(&path, &tree).unwrap();

        let trees = read_trees(&path, &ReadOptions::default()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].to_newick().unwrap(), "((A,B),(C,D));");
    }

    #[test]
    fn test_read_nexus_file() {
        let path = temp_path("input.trees");
        std::fs::write(&path, NEXUS).unwrap();
        let trees = read_trees(&path, &ReadOptions::default()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(trees.len(), 3);
    }

    #[test]
    fn test_missing_file() {
        let result = read_trees(temp_path("does-not-exist.nwk"), &ReadOptions::default());
        assert!(matches!(result, Err(ConsensusError::Io(_))));
    }
}
