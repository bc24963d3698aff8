//! Z-closure: completing partial splits into full splits.
//!
//! # Partial splits
//! A tree that covers only some taxa `X ⊂ {1..=n}` still tells us how it
//! divides `X`. Such a split `A | B` with `A ∪ B = X` is a partial split; `X`
//! is its support.
//!
//! # Zig-zag rule
//! Two partial splits `A1 | B1` and `A2 | B2` whose sides overlap as
//! ```text
//!   A1 ∩ A2 ≠ ∅    A2 ∩ B1 ≠ ∅    B1 ∩ B2 ≠ ∅    A1 ∩ B2 = ∅
//! ```
//! imply the more refined partial splits `A1 | B1 ∪ B2` and `A1 ∪ A2 | B2`.
//! Applying the rule until nothing new appears and keeping the splits whose
//! support is the whole universe gives the super-network splits.
//!
//! The fixed point depends on the order in which pairs are tried, so the
//! closure can be rerun on shuffled inputs and the results united.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use rand::Rng;
use rand::seq::SliceRandom;

use crate::bitset::Bitset;
use crate::cancel::CancelToken;
use crate::error::{Result, SplitsError};
use crate::extract::extract_partial_splits;
use crate::split::{Split, SplitSystem};
use crate::tree::Tree;

/// A bipartition of a subset of the taxa.
///
/// Canonical side `a` is the side not containing the smallest taxon of the
/// support. Sides are stored without trailing zero words, so equal sets
/// compare equal regardless of the universe they were built for.
#[derive(Debug, Clone)]
pub struct PartialSplit {
    a: Bitset,
    b: Bitset,
    pub weight: f64,
}

impl PartialSplit {
    /// # Errors
    /// `ImproperSplit` if a side is empty or the sides overlap.
    pub fn new(a: Bitset, b: Bitset, weight: f64) -> Result<Self> {
        if a.is_empty() || b.is_empty() || a.intersects(&b) {
            return Err(SplitsError::ImproperSplit(format!("{a} | {b}")));
        }
        Ok(Self::canonical(a, b, weight))
    }

    /// A full split seen as a partial split over the whole universe.
    pub fn from_split(split: &Split) -> Self {
        Self::canonical(split.a().clone(), split.b().clone(), split.weight)
    }

    fn canonical(a: Bitset, b: Bitset, weight: f64) -> Self {
        let (a, b) = (trimmed(a), trimmed(b));
        let (a, b) = if a.first() < b.first() { (b, a) } else { (a, b) };
        PartialSplit { a, b, weight }
    }

    #[inline]
    pub fn a(&self) -> &Bitset {
        &self.a
    }

    #[inline]
    pub fn b(&self) -> &Bitset {
        &self.b
    }

    /// Taxa covered by the split.
    pub fn support(&self) -> Bitset {
        self.a.union(&self.b)
    }

    /// Both sides, usable as a hash key.
    pub fn key(&self) -> (Bitset, Bitset) {
        (self.a.clone(), self.b.clone())
    }

    /// True if `split` keeps both sides of `self` apart.
    pub fn is_refined_by(&self, split: &Split) -> bool {
        (self.a.is_subset(split.a()) && self.b.is_subset(split.b()))
            || (self.a.is_subset(split.b()) && self.b.is_subset(split.a()))
    }

    /// Converts to a full split; the support must be `{1..=ntax}`.
    pub fn into_split(self, ntax: usize) -> Result<Split> {
        Split::from_sides(self.a, self.b, ntax, self.weight)
    }
}

fn trimmed(mut side: Bitset) -> Bitset {
    while side.0.len() > 1 && side.0.last() == Some(&0) {
        side.0.pop();
    }
    side
}

impl PartialEq for PartialSplit {
    fn eq(&self, other: &Self) -> bool {
        self.a == other.a && self.b == other.b
    }
}

impl Eq for PartialSplit {}

impl Hash for PartialSplit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.a.hash(state);
        self.b.hash(state);
    }
}

impl fmt::Display for PartialSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.a, self.b)
    }
}

/// Applies the zig-zag rule to `p` and `q` in every orientation it fits.
///
/// Each returned pair holds the refinement of `p` first and of `q` second.
/// Refinements carry weight 0; weights are assigned to the final full splits.
pub fn zig_zag(p: &PartialSplit, q: &PartialSplit) -> Vec<(PartialSplit, PartialSplit)> {
    let mut out = Vec::new();
    for (a1, b1) in [(&p.a, &p.b), (&p.b, &p.a)] {
        for (a2, b2) in [(&q.a, &q.b), (&q.b, &q.a)] {
            if a1.intersects(a2) && a2.intersects(b1) && b1.intersects(b2) && !a1.intersects(b2) {
                out.push((
                    PartialSplit::canonical(a1.clone(), b1.union(b2), 0.0),
                    PartialSplit::canonical(a1.union(a2), b2.clone(), 0.0),
                ));
            }
        }
    }
    out
}

/// How full splits produced by the closure are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosureWeights {
    /// Every split gets weight 1.
    Uniform,
    /// Mean weight of the input partial splits the split refines, 0 if none.
    #[default]
    Mean,
}

#[derive(Debug, Clone)]
pub struct ZClosureOptions {
    /// Number of closure runs; every run after the first shuffles the inputs.
    pub runs: usize,
    /// Reject full splits whose restriction to some input tree's taxa is not
    /// among that tree's own splits.
    pub strong_induction: bool,
    pub weights: ClosureWeights,
}

impl Default for ZClosureOptions {
    fn default() -> Self {
        ZClosureOptions {
            runs: 1,
            strong_induction: false,
            weights: ClosureWeights::Mean,
        }
    }
}

/// Saturates one ordering of the inputs and returns every distinct partial
/// split seen, inputs included.
///
/// Each round tries all senior × active and active × active pairs. Splits
/// that got strictly refined are retired for the rest of the run. Only
/// splits never seen before enter the next round, so the loop ends.
fn saturate(inputs: &[PartialSplit], cancel: &CancelToken) -> Result<Vec<PartialSplit>> {
    let mut seen: HashSet<(Bitset, Bitset)> = HashSet::with_capacity(inputs.len());
    let mut produced: Vec<PartialSplit> = Vec::with_capacity(inputs.len());
    let mut active: Vec<PartialSplit> = Vec::with_capacity(inputs.len());
    for p in inputs {
        if seen.insert(p.key()) {
            produced.push(p.clone());
            active.push(p.clone());
        }
    }

    let mut senior: Vec<PartialSplit> = Vec::new();
    let mut rounds = 0usize;
    while !active.is_empty() {
        rounds += 1;

        let mut senior_retired = vec![false; senior.len()];
        let mut active_retired = vec![false; active.len()];
        let mut next: Vec<PartialSplit> = Vec::new();
        for j in 0..active.len() {
            cancel.check()?;
            for i in 0..senior.len() {
                if senior_retired[i] || active_retired[j] {
                    continue;
                }
                let (ri, rj) = combine(&senior[i], &active[j], &mut seen, &mut next);
                senior_retired[i] |= ri;
                active_retired[j] |= rj;
            }
            for i in 0..j {
                if active_retired[i] || active_retired[j] {
                    continue;
                }
                let (ri, rj) = combine(&active[i], &active[j], &mut seen, &mut next);
                active_retired[i] |= ri;
                active_retired[j] |= rj;
            }
        }

        produced.extend(next.iter().cloned());
        senior = senior
            .into_iter()
            .zip(senior_retired)
            .chain(active.into_iter().zip(active_retired))
            .filter(|(_, retired)| !retired)
            .map(|(p, _)| p)
            .collect();
        active = next;
    }

    tracing::debug!(rounds, splits = produced.len(), "z-closure run saturated");
    Ok(produced)
}

/// Zig-zags `p` with `q`, queueing unseen refinements. Returns whether `p`
/// and `q` were strictly refined.
fn combine(
    p: &PartialSplit,
    q: &PartialSplit,
    seen: &mut HashSet<(Bitset, Bitset)>,
    next: &mut Vec<PartialSplit>,
) -> (bool, bool) {
    let mut refined = (false, false);
    for (rp, rq) in zig_zag(p, q) {
        // supports only grow, so a larger support is a strict refinement
        refined.0 |= rp.support().count_ones() > p.support().count_ones();
        refined.1 |= rq.support().count_ones() > q.support().count_ones();
        for r in [rp, rq] {
            if seen.insert(r.key()) {
                next.push(r);
            }
        }
    }
    refined
}

/// Completes the partial splits of several trees into a full split system
/// over `{1..=ntax}`. `trees` holds one group of partial splits per input
/// tree.
///
/// # Algorithm
/// 1. Saturate the inputs under the zig-zag rule, once per run; run 0 keeps
///    the input order, later runs shuffle it with `rng`
/// 2. Unite the splits of all runs and keep those covering every taxon
/// 3. With `strong_induction`, drop splits whose non-trivial restriction to
///    the taxa of an input tree is not one of that tree's splits
/// 4. Add the trivial splits still missing and assign weights
///
/// Splits come back ordered by canonical side.
///
/// # Errors
/// - `InvalidInput` if `options.runs` is 0
/// - `TaxonOutOfRange` if a partial split mentions a taxon outside `1..=ntax`
/// - `Cancelled` if `cancel` fires during saturation
pub fn z_closure<R: Rng + ?Sized>(
    trees: &[Vec<PartialSplit>],
    ntax: usize,
    options: &ZClosureOptions,
    rng: &mut R,
    cancel: &CancelToken,
) -> Result<SplitSystem> {
    if options.runs == 0 {
        return Err(SplitsError::InvalidInput("z-closure needs at least one run".to_string()));
    }
    let partials: Vec<PartialSplit> = trees.iter().flatten().cloned().collect();
    for p in &partials {
        let support = p.support();
        if let Some(taxon) = support.iter().find(|&t| t == 0 || t > ntax) {
            return Err(SplitsError::TaxonOutOfRange {
                taxon,
                ntax,
                split: p.to_string(),
            });
        }
    }

    let mut full: BTreeMap<Bitset, Split> = BTreeMap::new();
    let mut order = partials.to_vec();
    for run in 0..options.runs {
        if run > 0 {
            order.shuffle(rng);
        }
        for p in saturate(&order, cancel)? {
            if p.support().count_ones() == ntax {
                let split = p.into_split(ntax)?;
                full.entry(split.a().clone()).or_insert(split);
            }
        }
    }

    if options.strong_induction {
        let own_splits: Vec<TreeSplitSet> = trees
            .iter()
            .filter(|group| !group.is_empty())
            .map(|group| TreeSplitSet::new(group))
            .collect();
        let before = full.len();
        full.retain(|_, split| own_splits.iter().all(|tree| tree.induces(split)));
        tracing::debug!(rejected = before - full.len(), "strong induction");
    }

    for t in 1..=ntax {
        let split = Split::from_taxa(ntax, [t], 0.0)?;
        full.entry(split.a().clone()).or_insert(split);
    }

    let mut system = SplitSystem::new(ntax);
    for (_, mut split) in full {
        split.weight = closure_weight(&split, &partials, options.weights);
        system.push(split)?;
    }
    Ok(system)
}

/// The taxa of one input tree and the splits it displays on them.
struct TreeSplitSet {
    taxa: Bitset,
    keys: HashSet<(Bitset, Bitset)>,
}

impl TreeSplitSet {
    fn new(group: &[PartialSplit]) -> Self {
        let mut taxa = Bitset::zeros(1);
        let mut keys = HashSet::with_capacity(group.len());
        for p in group {
            taxa.or_assign(&p.support());
            keys.insert(p.key());
        }
        TreeSplitSet { taxa, keys }
    }

    /// Restrictions with a side of fewer than two taxa say nothing about the
    /// tree and are accepted.
    fn induces(&self, split: &Split) -> bool {
        let (a, b) = split.restrict(&self.taxa);
        if a.count_ones() < 2 || b.count_ones() < 2 {
            return true;
        }
        self.keys.contains(&PartialSplit::canonical(a, b, 0.0).key())
    }
}

fn closure_weight(split: &Split, partials: &[PartialSplit], weights: ClosureWeights) -> f64 {
    match weights {
        ClosureWeights::Uniform => 1.0,
        ClosureWeights::Mean => {
            let (sum, count) = partials
                .iter()
                .filter(|p| p.is_refined_by(split))
                .fold((0.0, 0usize), |(sum, count), p| (sum + p.weight, count + 1));
            if count == 0 { 0.0 } else { sum / count as f64 }
        }
    }
}

/// Super-network of possibly partial trees: extracts the partial splits of
/// every tree and completes them with [`z_closure`].
pub fn super_network<R: Rng + ?Sized>(
    trees: &[Tree],
    ntax: usize,
    options: &ZClosureOptions,
    rng: &mut R,
    cancel: &CancelToken,
) -> Result<SplitSystem> {
    if trees.is_empty() {
        return Err(SplitsError::InvalidInput("no input trees".to_string()));
    }
    let mut groups = Vec::with_capacity(trees.len());
    for tree in trees {
        cancel.check()?;
        groups.push(extract_partial_splits(tree, ntax)?);
    }
    tracing::debug!(
        trees = trees.len(),
        partials = groups.iter().map(Vec::len).sum::<usize>(),
        "super network input"
    );
    z_closure(&groups, ntax, options, rng, cancel)
}
