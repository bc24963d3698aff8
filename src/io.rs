use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use phylotree::tree::Tree as PhyloTree;

use crate::error::{Result, SplitsError};
use crate::split::SplitSystem;
use crate::tree::{TaxonIndex, Tree};

/// Trees read from one BEAST/NEXUS file.
#[derive(Debug, Default)]
pub struct TreeFile {
    /// TRANSLATE block: token used in the Newick strings → taxon label.
    pub translate: HashMap<String, String>,
    /// `(name, tree)` pairs in file order, burn-in removed.
    pub trees: Vec<(String, PhyloTree)>,
}

/// Strip BEAST annotations from Newick strings.
///
/// BEAST writes annotations like `:[&rate=0.123]2.45` where 2.45 is the
/// branch length. The `[&...]` blocks are removed, lengths are kept.
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

/// Reads the trees of a BEAST/NEXUS `.trees` file.
///
/// Burn-in: with both values 0 every tree is kept; otherwise a tree is kept
/// when its index is at least `burnin_trees` (if non-zero) or its `STATE_`
/// number exceeds `burnin_states` (if non-zero). Trees that fail to parse are
/// skipped with a warning.
///
/// With `use_real_taxa`, leaf names are mapped through the TRANSLATE block.
pub fn read_beast_trees<P: AsRef<Path>>(
    path: P,
    burnin_trees: usize,
    burnin_states: usize,
    use_real_taxa: bool,
) -> Result<TreeFile> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;

    let base_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.trim_end_matches(".trees"))
        .unwrap_or("unknown");

    let translate = parse_translate_block(&content);

    let trees = collect_tree_blocks(&content)
        .into_iter()
        .enumerate()
        .map(|(idx, block)| {
            let state = extract_state(block.header);
            (idx, block, state)
        })
        .filter(|(idx, _, state)| {
            (burnin_trees == 0 && burnin_states == 0)
                || (burnin_trees > 0 && *idx >= burnin_trees)
                || (burnin_states > 0 && *state > burnin_states)
        })
        .filter_map(|(idx, block, state)| {
            let newick = strip_beast_annotations(&block.body);
            let mut tree = match PhyloTree::from_newick(newick.trim()) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(file = %path.display(), idx, "skipping unparseable tree: {e}");
                    return None;
                }
            };
            if use_real_taxa {
                rename_leaf_nodes(&mut tree, &translate);
            }
            Some((format!("{base_name}_tree_STATE{state}"), tree))
        })
        .collect::<Vec<_>>();

    tracing::debug!(file = %path.display(), trees = trees.len(), "read tree file");
    Ok(TreeFile { translate, trees })
}

fn extract_state(header: &str) -> usize {
    let upper = header.to_ascii_uppercase();
    let Some(start) = upper.find("STATE_") else {
        return 0;
    };
    header[start + 6..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
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
            // headers may carry `[&lnP=...]` annotations, so split on the spaced sign
            let (header, body) = line.split_once(" = ")?;
            Some(TreeBlock {
                header: header.trim(),
                body: body.trim().to_string(),
            })
        })
        .collect()
}

/// Parses lines like `1 '1959.M.CD.59.ZR59',` up to the closing `;`.
fn parse_translate_block(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .skip_while(|line| !line.trim().to_ascii_uppercase().starts_with("TRANSLATE"))
        .skip(1)
        .take_while(|line| !line.trim().starts_with(';'))
        .filter_map(|line| {
            let line = line.trim().trim_end_matches(',');
            let mut parts = line.split_whitespace();
            let id = parts.next()?.to_string();
            let label = parts.next()?.trim_matches('\'').to_string();
            Some((id, label))
        })
        .collect()
}

/// Replaces leaf names by their TRANSLATE labels; unknown names are kept.
pub fn rename_leaf_nodes(tree: &mut PhyloTree, translate: &HashMap<String, String>) {
    for leaf_id in tree.get_leaves() {
        if let Ok(node) = tree.get_mut(&leaf_id) {
            if let Some(label) = node.name.as_ref().and_then(|n| translate.get(n)) {
                node.name = Some(label.clone());
            }
        }
    }
}

/// Assigns taxon ids over the union of all leaf labels and converts every
/// tree to the split model.
///
/// # Errors
/// `InvalidInput` if `trees` is empty or a leaf is unnamed.
pub fn index_trees(trees: &[PhyloTree]) -> Result<(TaxonIndex, Vec<Tree>)> {
    if trees.is_empty() {
        return Err(SplitsError::InvalidInput("no trees to index".to_string()));
    }
    let taxa = TaxonIndex::from_trees(trees);
    let converted = trees
        .iter()
        .map(|tree| Tree::from_phylotree(tree, &taxa))
        .collect::<Result<Vec<_>>>()?;
    Ok((taxa, converted))
}

/// Writes a split system as TSV, one split per row:
/// `weight  confidence  size  side_a  side_b`, sides as comma-separated labels.
///
/// If `path` ends with `.gz` the output is gzip-compressed; `-` writes to stdout.
pub fn write_splits_tsv<P: AsRef<Path>>(path: P, system: &SplitSystem, taxa: &TaxonIndex) -> Result<()> {
    let p = path.as_ref();
    let mut out: Box<dyn Write> = if p.as_os_str() == "-" {
        Box::new(BufWriter::new(io::stdout().lock()))
    } else if p.to_string_lossy().ends_with(".gz") {
        let enc = GzEncoder::new(File::create(p)?, Compression::default());
        Box::new(BufWriter::new(enc))
    } else {
        Box::new(BufWriter::new(File::create(p)?))
    };

    writeln!(out, "weight\tconfidence\tsize\tside_a\tside_b")?;
    for split in system {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            split.weight,
            split.confidence,
            split.size(),
            taxa.render(split.a()),
            taxa.render(split.b()),
        )?;
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::Split;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::path::PathBuf;

    const BEAST: &str = "#NEXUS\n\
Begin trees;\n\
\tTranslate\n\
\t\t1 'A',\n\
\t\t2 'B',\n\
\t\t3 'C',\n\
\t\t4 'D'\n\
\t\t;\n\
tree STATE_0 = ((1:1.0,2:1.0):0.5,(3:1.0,4:1.0):0.5);\n\
tree STATE_1000 [&lnP=-12.5] = [&R] ((1[&rate=0.1]:1.0,3:1.0):0.5,(2:1.0,4:1.0):0.5);\n\
tree STATE_2000 = ((1:1.0,2:1.0):0.5,(3:1.0,4:1.0):0.5);\n\
End;\n";

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("split-networks-{}-{name}", std::process::id()))
    }

    #[test]
    fn strips_annotations_but_keeps_lengths() {
        assert_eq!(
            strip_beast_annotations("(1[&rate=0.1]:2.5,2:[&r=1]1.0);"),
            "(1:2.5,2:1.0);"
        );
        assert_eq!(extract_state("tree STATE_1500"), 1500);
        assert_eq!(extract_state("tree TREE1"), 0);
    }

    #[test]
    fn reads_trees_with_burnin_and_translation() {
        let path = scratch("burnin.trees");
        fs::write(&path, BEAST).unwrap();

        let all = read_beast_trees(&path, 0, 0, true).unwrap();
        assert_eq!(all.trees.len(), 3);
        assert_eq!(all.translate.get("3").map(String::as_str), Some("C"));
        assert!(all.trees[0].0.ends_with("_tree_STATE0"));

        let by_count = read_beast_trees(&path, 1, 0, false).unwrap();
        assert_eq!(by_count.trees.len(), 2);
        let by_state = read_beast_trees(&path, 0, 1000, false).unwrap();
        assert_eq!(by_state.trees.len(), 1);

        let phylo: Vec<PhyloTree> = all.trees.into_iter().map(|(_, t)| t).collect();
        let (taxa, trees) = index_trees(&phylo).unwrap();
        assert_eq!(taxa.labels(), ["A", "B", "C", "D"]);
        assert_eq!(trees.len(), 3);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            read_beast_trees(scratch("missing.trees"), 0, 0, false),
            Err(SplitsError::Io(_))
        ));
    }

    #[test]
    fn writes_gzipped_tsv() {
        let taxa = TaxonIndex::from_labels(["A", "B", "C", "D"]);
        let system = SplitSystem::from_splits(
            4,
            [Split::from_taxa(4, [3, 4], 1.5).unwrap().with_confidence(75.0)],
        )
        .unwrap();
        let path = scratch("splits.tsv.gz");
        write_splits_tsv(&path, &system, &taxa).unwrap();

        let mut text = String::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, ["weight\tconfidence\tsize\tside_a\tside_b", "1.5\t75\t2\tC,D\tA,B"]);
        fs::remove_file(&path).unwrap();
    }
}
