//! Splits and split systems.
//!
//! # What is a split?
//! A split is a bipartition `A | B` of the taxon universe `{1..=n}`. Every edge
//! of a tree induces one: removing the edge separates the taxa into two groups.
//! ```text
//!    1         3
//!     \       /
//!      *-----*        the middle edge induces {3, 4} | {1, 2}
//!     /       \
//!    2         4
//! ```
//!
//! # Canonicalization
//! `A | B` and `B | A` are the same split. We always store the side that does
//! NOT contain taxon 1 as the canonical side `a`, and the side containing
//! taxon 1 as `b`. Two splits are equal iff their canonical sides are equal.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::bitset::Bitset;
use crate::error::{Result, SplitsError};

/// A weighted bipartition of `{1..=ntax}`.
#[derive(Debug, Clone)]
pub struct Split {
    /// Side without taxon 1.
    a: Bitset,
    /// Side with taxon 1.
    b: Bitset,
    ntax: usize,
    /// Edge length proxy.
    pub weight: f64,
    /// Support value, 0–100 for consensus splits.
    pub confidence: f64,
}

impl Split {
    /// Creates the split `side | complement(side)` over `{1..=ntax}`.
    ///
    /// Either side may be passed; the result is canonicalized.
    ///
    /// # Errors
    /// - `TaxonOutOfRange` if `side` contains 0 or a taxon above `ntax`
    /// - `ImproperSplit` if `side` is empty or the whole universe
    pub fn new(side: Bitset, ntax: usize, weight: f64) -> Result<Self> {
        check_range(&side, ntax, || format!("{side} | ?"))?;
        let other = side.complement(ntax);
        if side.is_empty() || other.is_empty() {
            return Err(SplitsError::ImproperSplit(format!("{side} | {other}")));
        }
        Ok(Self::canonical(side, other, ntax, weight))
    }

    /// Creates a split from both sides, checking that they partition the universe.
    pub fn from_sides(a: Bitset, b: Bitset, ntax: usize, weight: f64) -> Result<Self> {
        check_range(&a, ntax, || format!("{a} | {b}"))?;
        check_range(&b, ntax, || format!("{a} | {b}"))?;
        if a.is_empty()
            || b.is_empty()
            || a.intersects(&b)
            || a.count_ones() + b.count_ones() != ntax
        {
            return Err(SplitsError::ImproperSplit(format!("{a} | {b}")));
        }
        Ok(Self::canonical(a, b, ntax, weight))
    }

    /// Convenience constructor from taxon ids of one side.
    pub fn from_taxa<I: IntoIterator<Item = usize>>(ntax: usize, taxa: I, weight: f64) -> Result<Self> {
        Self::new(Bitset::from_taxa(ntax, taxa), ntax, weight)
    }

    fn canonical(mut a: Bitset, mut b: Bitset, ntax: usize, weight: f64) -> Self {
        // equal sets must have equal word counts for Eq and Hash
        let words = Bitset::words_for(ntax);
        a.0.resize(words, 0);
        b.0.resize(words, 0);
        let (a, b) = if a.contains(1) { (b, a) } else { (a, b) };
        Split {
            a,
            b,
            ntax,
            weight,
            confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Canonical side (does not contain taxon 1). This is the split's identity.
    #[inline]
    pub fn a(&self) -> &Bitset {
        &self.a
    }

    /// Side containing taxon 1.
    #[inline]
    pub fn b(&self) -> &Bitset {
        &self.b
    }

    #[inline]
    pub fn ntax(&self) -> usize {
        self.ntax
    }

    /// Side containing `taxon`.
    pub fn side_of(&self, taxon: usize) -> &Bitset {
        if self.a.contains(taxon) { &self.a } else { &self.b }
    }

    /// Side not containing `taxon`.
    pub fn side_without(&self, taxon: usize) -> &Bitset {
        if self.a.contains(taxon) { &self.b } else { &self.a }
    }

    /// Cardinality of the smaller side.
    pub fn size(&self) -> usize {
        self.a.count_ones().min(self.b.count_ones())
    }

    /// A split is trivial when one side holds a single taxon.
    pub fn is_trivial(&self) -> bool {
        self.size() == 1
    }

    /// True if taxa `i` and `j` lie on different sides.
    #[inline]
    pub fn separates(&self, i: usize, j: usize) -> bool {
        self.a.contains(i) != self.a.contains(j)
    }

    /// Restriction of this split to `support`: `(A ∩ support, B ∩ support)`.
    pub fn restrict(&self, support: &Bitset) -> (Bitset, Bitset) {
        (self.a.intersection(support), self.b.intersection(support))
    }
}

fn check_range(side: &Bitset, ntax: usize, render: impl Fn() -> String) -> Result<()> {
    match side.iter().find(|&t| t == 0 || t > ntax) {
        Some(taxon) => Err(SplitsError::TaxonOutOfRange {
            taxon,
            ntax,
            split: render(),
        }),
        None => Ok(()),
    }
}

impl PartialEq for Split {
    fn eq(&self, other: &Self) -> bool {
        self.ntax == other.ntax && self.a == other.a
    }
}

impl Eq for Split {}

impl Hash for Split {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.a.hash(state);
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.a, self.b)
    }
}

/// Structural classification of a split system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compatibility {
    /// Not yet classified.
    #[default]
    Unknown,
    /// All pairs compatible (the system is a tree).
    Compatible,
    /// All splits circular with respect to the system's cycle.
    Circular,
    /// All triples weakly compatible.
    WeaklyCompatible,
    Incompatible,
}

/// An ordered collection of splits over one taxon universe, unique by canonical side.
#[derive(Debug, Clone, Default)]
pub struct SplitSystem {
    ntax: usize,
    splits: Vec<Split>,
    index: HashMap<Bitset, usize>,
    cycle: Option<Vec<usize>>,
    compatibility: Compatibility,
}

impl SplitSystem {
    pub fn new(ntax: usize) -> Self {
        SplitSystem {
            ntax,
            ..Default::default()
        }
    }

    /// Builds a system, rejecting duplicates and splits over another universe.
    pub fn from_splits<I: IntoIterator<Item = Split>>(ntax: usize, splits: I) -> Result<Self> {
        let mut system = SplitSystem::new(ntax);
        for split in splits {
            system.push(split)?;
        }
        Ok(system)
    }

    /// Appends a split.
    ///
    /// # Errors
    /// - `DuplicateSplit` if a split with the same canonical side is present
    /// - `InvalidInput` if the split was built for a different taxon count
    pub fn push(&mut self, split: Split) -> Result<()> {
        if split.ntax != self.ntax {
            return Err(SplitsError::InvalidInput(format!(
                "split {split} is over {} taxa, system over {}",
                split.ntax, self.ntax
            )));
        }
        if self.index.contains_key(&split.a) {
            return Err(SplitsError::DuplicateSplit(split.to_string()));
        }
        self.index.insert(split.a.clone(), self.splits.len());
        self.splits.push(split);
        Ok(())
    }

    /// Adds a split, summing its weight into an existing split with the same side.
    /// The larger of the two confidences is kept.
    ///
    /// Returns true if the split was new.
    pub(crate) fn accumulate(&mut self, split: Split) -> Result<bool> {
        match self.index.get(&split.a) {
            Some(&i) => {
                let existing = &mut self.splits[i];
                existing.weight += split.weight;
                existing.confidence = existing.confidence.max(split.confidence);
                Ok(false)
            }
            None => self.push(split).map(|_| true),
        }
    }

    #[inline]
    pub fn ntax(&self) -> usize {
        self.ntax
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.splits.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    pub fn splits(&self) -> &[Split] {
        &self.splits
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Split> {
        self.splits.iter()
    }

    pub fn into_splits(self) -> Vec<Split> {
        self.splits
    }

    /// Looks up a split by its canonical side.
    pub fn get(&self, side: &Bitset) -> Option<&Split> {
        self.index.get(side).map(|&i| &self.splits[i])
    }

    pub fn contains(&self, split: &Split) -> bool {
        split.ntax == self.ntax && self.index.contains_key(&split.a)
    }

    pub fn total_weight(&self) -> f64 {
        self.splits.iter().map(|s| s.weight).sum()
    }

    pub fn cycle(&self) -> Option<&[usize]> {
        self.cycle.as_deref()
    }

    /// Attaches a cycle after checking it is a permutation of `1..=ntax`.
    pub fn set_cycle(&mut self, cycle: Vec<usize>) -> Result<()> {
        let mut seen = Bitset::empty(self.ntax);
        for &t in &cycle {
            if t == 0 || t > self.ntax || seen.contains(t) {
                return Err(SplitsError::InvalidInput(format!(
                    "cycle {cycle:?} is not a permutation of 1..={}",
                    self.ntax
                )));
            }
            seen.set(t);
        }
        if cycle.len() != self.ntax {
            return Err(SplitsError::InvalidInput(format!(
                "cycle has {} taxa, expected {}",
                cycle.len(),
                self.ntax
            )));
        }
        self.cycle = Some(cycle);
        Ok(())
    }

    pub fn with_cycle(mut self, cycle: Vec<usize>) -> Result<Self> {
        self.set_cycle(cycle)?;
        Ok(self)
    }

    pub fn compatibility(&self) -> Compatibility {
        self.compatibility
    }

    pub fn set_compatibility(&mut self, compatibility: Compatibility) {
        self.compatibility = compatibility;
    }

    /// Same universe and cycle, no splits. Filters fill this with their selection.
    pub(crate) fn empty_like(&self) -> SplitSystem {
        SplitSystem {
            ntax: self.ntax,
            cycle: self.cycle.clone(),
            ..Default::default()
        }
    }

    /// Canonical sides of all splits, sorted. Handy for comparing systems.
    pub fn sides(&self) -> Vec<Bitset> {
        let mut sides: Vec<Bitset> = self.splits.iter().map(|s| s.a.clone()).collect();
        sides.sort_unstable();
        sides
    }
}

impl<'a> IntoIterator for &'a SplitSystem {
    type Item = &'a Split;
    type IntoIter = std::slice::Iter<'a, Split>;

    fn into_iter(self) -> Self::IntoIter {
        self.splits.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_side_excludes_taxon_one() {
        let s = Split::from_taxa(5, [1, 2], 1.0).unwrap();
        assert_eq!(s.a(), &Bitset::from_taxa(5, [3, 4, 5]));
        assert_eq!(s.b(), &Bitset::from_taxa(5, [1, 2]));

        let t = Split::from_taxa(5, [3, 4, 5], 2.0).unwrap();
        assert_eq!(s, t);
        assert_eq!(s.size(), 2);
        assert!(s.separates(1, 3));
        assert!(!s.separates(3, 5));
    }

    #[test]
    fn improper_splits_are_rejected() {
        assert!(matches!(
            Split::new(Bitset::empty(4), 4, 1.0),
            Err(SplitsError::ImproperSplit(_))
        ));
        assert!(matches!(
            Split::new(Bitset::full(4), 4, 1.0),
            Err(SplitsError::ImproperSplit(_))
        ));
        assert!(matches!(
            Split::from_taxa(4, [2, 7], 1.0),
            Err(SplitsError::TaxonOutOfRange { taxon: 7, ntax: 4, .. })
        ));
        let a = Bitset::from_taxa(4, [1, 2]);
        let b = Bitset::from_taxa(4, [2, 3, 4]);
        assert!(matches!(
            Split::from_sides(a, b, 4, 1.0),
            Err(SplitsError::ImproperSplit(_))
        ));
    }

    #[test]
    fn system_rejects_duplicates() {
        let mut system = SplitSystem::new(4);
        system.push(Split::from_taxa(4, [1, 2], 1.0).unwrap()).unwrap();
        let err = system
            .push(Split::from_taxa(4, [3, 4], 1.0).unwrap())
            .unwrap_err();
        assert!(matches!(err, SplitsError::DuplicateSplit(ref s) if s == "{3, 4} | {1, 2}"));
        assert_eq!(system.len(), 1);
    }

    #[test]
    fn accumulate_sums_weights() {
        let mut system = SplitSystem::new(4);
        assert!(system.accumulate(Split::from_taxa(4, [1, 2], 1.5).unwrap()).unwrap());
        assert!(!system.accumulate(Split::from_taxa(4, [3, 4], 0.5).unwrap()).unwrap());
        assert_eq!(system.len(), 1);
        assert!((system.total_weight() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn cycle_must_be_permutation() {
        let mut system = SplitSystem::new(4);
        assert!(system.set_cycle(vec![1, 3, 2, 4]).is_ok());
        assert!(system.set_cycle(vec![1, 3, 3, 4]).is_err());
        assert!(system.set_cycle(vec![1, 2, 3]).is_err());
        assert!(system.set_cycle(vec![0, 1, 2, 3]).is_err());
    }
}
