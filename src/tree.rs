//! Read-only tree (or network) input model.
//!
//! Trees are stored with the arena pattern: nodes and edges live in vectors
//! and refer to each other by index. Any node may carry taxa, not only leaves,
//! and a node may have more than one incoming edge. Such nodes are
//! reticulations; the split extractor never descends through their incoming
//! edges.
//!
//! # Taxon ids
//! Taxa are numbered `1..=n`. [`TaxonIndex`] assigns those ids to `phylotree`
//! leaf names by sorting the names alphabetically, so identical labels map to
//! identical ids no matter which file a tree came from.

use std::collections::{BTreeSet, HashMap};

use phylotree::tree::Tree as PhyloTree;

use crate::bitset::Bitset;
use crate::compatibility::compatible;
use crate::error::{Result, SplitsError};
use crate::split::SplitSystem;

pub type NodeId = usize;
pub type EdgeId = usize;

#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Taxa attached to this node (usually one taxon on a leaf, none elsewhere).
    pub taxa: Vec<usize>,
    in_edges: Vec<EdgeId>,
    out_edges: Vec<EdgeId>,
}

impl Node {
    pub fn in_edges(&self) -> &[EdgeId] {
        &self.in_edges
    }

    pub fn out_edges(&self) -> &[EdgeId] {
        &self.out_edges
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub weight: f64,
    pub confidence: Option<f64>,
}

/// A rooted phylogenetic tree or network.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    root: Option<NodeId>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node carrying `taxa`. The first node added becomes the root.
    pub fn add_node<I: IntoIterator<Item = usize>>(&mut self, taxa: I) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            taxa: taxa.into_iter().collect(),
            ..Default::default()
        });
        if self.root.is_none() {
            self.root = Some(id);
        }
        id
    }

    /// Adds an edge `source -> target`.
    ///
    /// # Panics
    /// Panics if either node id was not returned by [`Tree::add_node`].
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, weight: f64) -> EdgeId {
        self.add_edge_with_confidence(source, target, weight, None)
    }

    pub fn add_edge_with_confidence(
        &mut self,
        source: NodeId,
        target: NodeId,
        weight: f64,
        confidence: Option<f64>,
    ) -> EdgeId {
        let id = self.edges.len();
        self.edges.push(Edge {
            source,
            target,
            weight,
            confidence,
        });
        self.nodes[source].out_edges.push(id);
        self.nodes[target].in_edges.push(id);
        id
    }

    /// Convenience: adds a child node carrying `taxa` below `parent`.
    pub fn add_child<I: IntoIterator<Item = usize>>(
        &mut self,
        parent: NodeId,
        taxa: I,
        weight: f64,
    ) -> NodeId {
        let child = self.add_node(taxa);
        self.add_edge(parent, child, weight);
        child
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// An edge is a tree edge when its target has exactly one incoming edge.
    pub fn is_tree_edge(&self, edge: EdgeId) -> bool {
        self.nodes[self.edges[edge].target].in_edges.len() == 1
    }

    /// Sum of all edge weights.
    pub fn total_weight(&self) -> f64 {
        self.edges.iter().map(|e| e.weight).sum()
    }

    /// True if any edge carries a confidence value.
    pub fn has_confidences(&self) -> bool {
        self.edges.iter().any(|e| e.confidence.is_some())
    }

    /// Builds a tree from a `phylotree` tree, mapping leaf names through `taxa`.
    ///
    /// Branch lengths become edge weights (missing lengths count as 0.0).
    /// Numeric internal node names are read as confidences of the edge above.
    ///
    /// # Errors
    /// - `NoRoot` if the tree is empty
    /// - `InvalidInput` if a leaf is unnamed or its name is not in `taxa`
    pub fn from_phylotree(tree: &PhyloTree, taxa: &TaxonIndex) -> Result<Self> {
        Self::from_phylotree_with(tree, |name| taxa.id(name))
    }

    /// Like [`Tree::from_phylotree`] with a caller-supplied label lookup.
    pub fn from_phylotree_with<F>(tree: &PhyloTree, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<usize>,
    {
        let phylo_root = tree.get_root().map_err(|_| SplitsError::NoRoot)?;
        let mut out = Tree::new();
        let root = out.add_node([]);

        // (phylotree node, our node)
        let mut stack = vec![(phylo_root, root)];
        while let Some((phylo_id, node_id)) = stack.pop() {
            let phylo_node = tree.get(&phylo_id)?;
            if phylo_node.children.is_empty() {
                let name = phylo_node.name.as_deref().ok_or_else(|| {
                    SplitsError::InvalidInput(format!("leaf {phylo_id} has no name"))
                })?;
                let taxon = lookup(name).ok_or_else(|| {
                    SplitsError::InvalidInput(format!("unknown taxon label '{name}'"))
                })?;
                out.nodes[node_id].taxa.push(taxon);
                continue;
            }
            for &child_id in &phylo_node.children {
                let child = tree.get(&child_id)?;
                let confidence = if child.children.is_empty() {
                    None
                } else {
                    child.name.as_deref().and_then(|n| n.trim().parse::<f64>().ok())
                };
                let weight = child.parent_edge.unwrap_or(0.0);
                let target = out.add_node([]);
                out.add_edge_with_confidence(node_id, target, weight, confidence);
                stack.push((child_id, target));
            }
        }
        Ok(out)
    }

    /// Reconstructs a tree from a pairwise compatible split system.
    ///
    /// Every canonical side becomes a cluster node hanging below the smallest
    /// cluster containing it. Taxon 1, and any taxon not covered by a cluster,
    /// sits on the root; every other taxon sits on the smallest cluster that
    /// contains it. Extracting splits from the result gives back the input.
    ///
    /// # Errors
    /// `InvalidInput` if two splits are incompatible.
    pub fn from_compatible_splits(system: &SplitSystem) -> Result<Self> {
        let splits = system.splits();
        for (i, s1) in splits.iter().enumerate() {
            if let Some(s2) = splits[i + 1..].iter().find(|s2| !compatible(s1, s2)) {
                return Err(SplitsError::InvalidInput(format!(
                    "splits {s1} and {s2} are incompatible"
                )));
            }
        }

        // largest clusters first, so parents are placed before children
        let mut order: Vec<usize> = (0..splits.len()).collect();
        order.sort_by(|&i, &j| {
            splits[j]
                .a()
                .count_ones()
                .cmp(&splits[i].a().count_ones())
                .then_with(|| splits[i].a().cmp(splits[j].a()))
        });

        let mut tree = Tree::new();
        let root = tree.add_node([]);
        let mut placed: Vec<(usize, NodeId)> = Vec::with_capacity(order.len());
        for &i in &order {
            let side = splits[i].a();
            // clusters form a chain under inclusion; the last placed superset is the smallest
            let parent = placed
                .iter()
                .rev()
                .find(|(j, _)| side.is_subset(splits[*j].a()))
                .map_or(root, |&(_, node)| node);
            let node = tree.add_node([]);
            tree.add_edge_with_confidence(
                parent,
                node,
                splits[i].weight,
                Some(splits[i].confidence),
            );
            placed.push((i, node));
        }

        for taxon in 1..=system.ntax() {
            let holder = placed
                .iter()
                .rev()
                .find(|(j, _)| splits[*j].a().contains(taxon))
                .map_or(root, |&(_, node)| node);
            tree.nodes[holder].taxa.push(taxon);
        }
        Ok(tree)
    }
}

/// Bidirectional mapping between taxon labels and ids `1..=n`.
#[derive(Debug, Clone, Default)]
pub struct TaxonIndex {
    labels: Vec<String>,
    ids: HashMap<String, usize>,
}

impl TaxonIndex {
    /// Assigns ids to `labels` in alphabetical order (duplicates collapse).
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sorted: BTreeSet<String> = labels.into_iter().map(Into::into).collect();
        let labels: Vec<String> = sorted.into_iter().collect();
        let ids = labels
            .iter()
            .enumerate()
            .map(|(idx, label)| (label.clone(), idx + 1))
            .collect();
        TaxonIndex { labels, ids }
    }

    /// Collects the leaf names of all trees.
    ///
    /// Trees may cover different subsets of taxa (partial trees).
    pub fn from_trees(trees: &[PhyloTree]) -> Self {
        Self::from_labels(trees.iter().flat_map(|tree| {
            tree.get_leaves()
                .into_iter()
                .filter_map(|leaf_id| tree.get(&leaf_id).ok()?.name.clone())
                .collect::<Vec<_>>()
        }))
    }

    pub fn id(&self, label: &str) -> Option<usize> {
        self.ids.get(label).copied()
    }

    pub fn label(&self, id: usize) -> Option<&str> {
        id.checked_sub(1)
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
    }

    /// Labels in id order (`labels()[0]` is taxon 1).
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of taxa `n`.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Renders a taxon set with labels, e.g. `A,C,D`.
    pub fn render(&self, side: &Bitset) -> String {
        side.iter()
            .map(|t| self.label(t).unwrap_or("?"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Test fixture: parses Newick whose leaf names are taxon ids.
#[cfg(test)]
pub(crate) fn numeric_tree(newick: &str) -> Tree {
    let phylo = PhyloTree::from_newick(newick).unwrap();
    Tree::from_phylotree_with(&phylo, |name| name.parse().ok()).unwrap()
}
