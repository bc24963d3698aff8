//! Extract the split system of a single tree.
//!
//! # Overview
//! Every tree edge `u -> v` separates the taxa below `v` (the cluster of `v`)
//! from all the others. Clusters are built bottom-up:
//! ```text
//!           root
//!          /    \
//!       node1    4            node2: {2, 3}       → split {2, 3} | {1, 4}
//!       /   \                 node1: {1, 2, 3}    → split {4} | {1, 2, 3}
//!      1    node2             leaf 4: {4}         → same split as node1
//!           /   \
//!          2     3
//! ```
//! Both edges below the root yield `{4} | {1, 2, 3}`. That happens whenever
//! the root has degree two; the weights of such duplicates are summed.
//!
//! # Partial trees
//! A tree may cover only some of the taxa. Its clusters are still completed
//! against the full universe `{1..=n}`, and the set of observed taxa is
//! returned alongside so callers can tell which taxa the tree actually saw.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::bitset::Bitset;
use crate::error::{Result, SplitsError};
use crate::split::{Split, SplitSystem};
use crate::tree::{NodeId, Tree};
use crate::zclosure::PartialSplit;

/// Splits of one tree plus the taxa it covers.
#[derive(Debug, Clone)]
pub struct TreeSplits {
    pub splits: SplitSystem,
    /// Taxa present anywhere in the tree.
    pub taxa: Bitset,
}

/// Extracts all splits (trivial ones included) of `tree` over `{1..=ntax}`.
///
/// # Algorithm
/// 1. Collect the nodes reachable from the root through tree edges
///    (reticulate edges, whose target has several parents, are not crossed)
/// 2. Visit them in reverse preorder, OR-ing each node's taxa with the
///    clusters of its tree-edge children
/// 3. For each non-root node whose cluster is non-empty and not all observed
///    taxa, emit `cluster | complement` weighted by the incoming edge
///
/// Confidences are copied from the edges when the tree carries any;
/// otherwise every split gets confidence 1.
///
/// # Errors
/// - `NoRoot` if the tree has no nodes
/// - `TaxonOutOfRange` if a node carries a taxon outside `1..=ntax`
pub fn extract_splits(tree: &Tree, ntax: usize) -> Result<TreeSplits> {
    let root = tree.root().ok_or(SplitsError::NoRoot)?;

    let mut taxa = Bitset::empty(ntax);
    for node in tree.nodes() {
        for &t in &node.taxa {
            if t == 0 || t > ntax {
                return Err(SplitsError::TaxonOutOfRange {
                    taxon: t,
                    ntax,
                    split: format!("taxa of node carrying {:?}", node.taxa),
                });
            }
            taxa.set(t);
        }
    }

    // preorder over tree edges; `via` is the edge we came in through
    let mut visited = vec![false; tree.node_count()];
    let mut preorder: Vec<(NodeId, Option<usize>)> = Vec::with_capacity(tree.node_count());
    let mut stack = vec![(root, None)];
    while let Some((v, via)) = stack.pop() {
        if visited[v] {
            continue;
        }
        visited[v] = true;
        preorder.push((v, via));
        for &e in tree.node(v).out_edges() {
            if tree.is_tree_edge(e) {
                stack.push((tree.edge(e).target, Some(e)));
            }
        }
    }

    let mut clusters: Vec<Option<Bitset>> = vec![None; tree.node_count()];
    for &(v, _) in preorder.iter().rev() {
        let mut cluster = Bitset::from_taxa(ntax, tree.node(v).taxa.iter().copied());
        for &e in tree.node(v).out_edges() {
            if !tree.is_tree_edge(e) {
                continue;
            }
            if let Some(child) = &clusters[tree.edge(e).target] {
                cluster.or_assign(child);
            }
        }
        clusters[v] = Some(cluster);
    }

    let observed = taxa.count_ones();
    let with_confidences = tree.has_confidences();
    let mut splits = SplitSystem::new(ntax);
    for &(v, via) in &preorder {
        let (Some(e), Some(cluster)) = (via, clusters[v].as_ref()) else {
            continue;
        };
        let size = cluster.count_ones();
        if size == 0 || size >= observed {
            continue;
        }
        let edge = tree.edge(e);
        let mut split = Split::new(cluster.clone(), ntax, edge.weight)?;
        if with_confidences {
            split.confidence = edge.confidence.unwrap_or(1.0);
        }
        splits.accumulate(split)?;
    }

    tracing::debug!(splits = splits.len(), taxa = observed, "extracted tree splits");
    Ok(TreeSplits { splits, taxa })
}

/// Extracts the splits of a possibly partial tree as partial splits.
///
/// Each split `C | X \ C` is taken relative to the observed taxa `X` of the
/// tree rather than the full universe; this is the input of Z-closure.
pub fn extract_partial_splits(tree: &Tree, ntax: usize) -> Result<Vec<PartialSplit>> {
    let TreeSplits { splits, taxa } = extract_splits(tree, ntax)?;
    let mut out: Vec<PartialSplit> = Vec::with_capacity(splits.len());
    let mut index: HashMap<(Bitset, Bitset), usize> = HashMap::new();
    for split in splits.iter() {
        let (a, b) = split.restrict(&taxa);
        let partial = PartialSplit::new(a, b, split.weight)?;
        // distinct full splits may collapse once missing taxa are dropped
        match index.entry(partial.key()) {
            Entry::Occupied(slot) => out[*slot.get()].weight += partial.weight,
            Entry::Vacant(slot) => {
                slot.insert(out.len());
                out.push(partial);
            }
        }
    }
    Ok(out)
}
