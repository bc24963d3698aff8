//! Compact bitset representation for taxon sets.
//!
//! # Overview
//! A bitset records which taxa belong to one side of a split. Taxa are
//! numbered `1..=n`, and taxon `t` lives at bit position `t`; bit 0 is never
//! set. Keeping the numbering 1-based means a taxon id can be used as a bit
//! index without any translation.
//!
//! # Example
//! For the taxon universe {1, 2, 3, 4}:
//! - Side {1, 3} → bitset `0b01010` (bits 1 and 3 set)
//! - Side {2, 3, 4} → bitset `0b11100` (bits 2, 3, 4 set)

use std::fmt;

/// A compact bitset for representing a set of taxon ids.
///
/// Internally stores bits in `Vec<u64>` words to support arbitrarily large
/// taxon sets. Each u64 word holds 64 taxon ids.
///
/// The derived ordering compares words lexicographically. It is an arbitrary
/// but fixed total order and is used wherever a reproducible tie break
/// between splits is needed.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Creates a new bitset with all bits set to 0.
    ///
    /// # Parameters
    /// - `words`: Number of u64 words needed. See [`Bitset::words_for`].
    ///
    /// # Example
    /// ```
    /// # use rust_python_split_networks::bitset::Bitset;
    /// let bs = Bitset::zeros(2);
    /// assert_eq!(bs.0.len(), 2);
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Number of words needed to hold taxa `1..=ntax`.
    #[inline]
    pub fn words_for(ntax: usize) -> usize {
        (ntax + 1).div_ceil(64)
    }

    /// Empty set sized for a universe of `ntax` taxa.
    pub fn empty(ntax: usize) -> Self {
        Self::zeros(Self::words_for(ntax))
    }

    /// The full taxon universe `{1..=ntax}`.
    ///
    /// # Example
    /// ```
    /// # use rust_python_split_networks::bitset::Bitset;
    /// let all = Bitset::full(4);
    /// assert_eq!(all.0[0], 0b11110);
    /// assert_eq!(all.count_ones(), 4);
    /// ```
    pub fn full(ntax: usize) -> Self {
        let mut bs = Self::empty(ntax);
        for t in 1..=ntax {
            bs.set(t);
        }
        bs
    }

    /// Builds a set sized for `ntax` taxa from taxon ids.
    ///
    /// # Example
    /// ```
    /// # use rust_python_split_networks::bitset::Bitset;
    /// let bs = Bitset::from_taxa(5, [2, 4]);
    /// assert!(bs.contains(2) && bs.contains(4));
    /// assert_eq!(bs.count_ones(), 2);
    /// ```
    pub fn from_taxa<I: IntoIterator<Item = usize>>(ntax: usize, taxa: I) -> Self {
        let mut bs = Self::empty(ntax);
        for t in taxa {
            bs.set(t);
        }
        bs
    }

    /// Sets the bit at the given index to 1, growing the word vector if needed.
    ///
    /// # Example
    /// ```
    /// # use rust_python_split_networks::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(1);
    /// bs.set(5);
    /// assert_eq!(bs.0[0], 0b00100010);
    /// ```
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6; // Equivalent to idx / 64
        let bit = idx & 63; // Equivalent to idx % 64
        if word >= self.0.len() {
            self.0.resize(word + 1, 0);
        }
        self.0[word] |= 1u64 << bit;
    }

    /// Clears the bit at the given index.
    #[inline]
    pub fn clear(&mut self, idx: usize) {
        let word = idx >> 6;
        if let Some(w) = self.0.get_mut(word) {
            *w &= !(1u64 << (idx & 63));
        }
    }

    /// Tests whether the bit at `idx` is set.
    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        self.0
            .get(idx >> 6)
            .is_some_and(|w| w & (1u64 << (idx & 63)) != 0)
    }

    /// Performs bitwise OR with another bitset (union operation).
    ///
    /// # Example
    /// ```
    /// # use rust_python_split_networks::bitset::Bitset;
    /// let mut left = Bitset::zeros(1);
    /// left.set(1);   // {1}
    ///
    /// let mut right = Bitset::zeros(1);
    /// right.set(2);  // {2}
    ///
    /// left.or_assign(&right);  // {1} ∪ {2} = {1, 2}
    /// assert_eq!(left.0[0], 0b110);
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        if other.0.len() > self.0.len() {
            self.0.resize(other.0.len(), 0);
        }
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Union as a new set.
    pub fn union(&self, other: &Bitset) -> Bitset {
        let mut out = self.clone();
        out.or_assign(other);
        out
    }

    /// Intersection as a new set.
    pub fn intersection(&self, other: &Bitset) -> Bitset {
        Bitset(
            self.0
                .iter()
                .zip(other.0.iter().chain(std::iter::repeat(&0)))
                .map(|(a, b)| a & b)
                .collect(),
        )
    }

    /// Set difference `self \ other` as a new set.
    pub fn difference(&self, other: &Bitset) -> Bitset {
        Bitset(
            self.0
                .iter()
                .zip(other.0.iter().chain(std::iter::repeat(&0)))
                .map(|(a, b)| a & !b)
                .collect(),
        )
    }

    /// True when the two sets share at least one taxon.
    #[inline]
    pub fn intersects(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).any(|(a, b)| a & b != 0)
    }

    /// True when every taxon of `self` is also in `other`.
    #[inline]
    pub fn is_subset(&self, other: &Bitset) -> bool {
        self.0
            .iter()
            .zip(other.0.iter().chain(std::iter::repeat(&0)))
            .all(|(a, b)| a & !b == 0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    /// Counts the number of set bits (population count).
    ///
    /// # Example
    /// ```
    /// # use rust_python_split_networks::bitset::Bitset;
    /// let bs = Bitset::from_taxa(6, [1, 3, 6]);
    /// assert_eq!(bs.count_ones(), 3);
    /// ```
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Complement relative to the universe `{1..=ntax}`.
    ///
    /// # Example
    /// Input: {1, 2} (4 taxa) → Output: {3, 4}
    pub fn complement(&self, ntax: usize) -> Bitset {
        let mut out = Bitset::empty(ntax);
        for t in 1..=ntax {
            if !self.contains(t) {
                out.set(t);
            }
        }
        out
    }

    /// Smallest taxon in the set.
    pub fn first(&self) -> Option<usize> {
        self.0
            .iter()
            .enumerate()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| (i << 6) + w.trailing_zeros() as usize)
    }

    /// Largest taxon in the set.
    pub fn last(&self) -> Option<usize> {
        self.0
            .iter()
            .enumerate()
            .rev()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| (i << 6) + 63 - w.leading_zeros() as usize)
    }

    /// Iterates over the taxa in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(i, &w)| {
            let mut word = w;
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let bit = word.trailing_zeros() as usize;
                word &= word - 1;
                Some((i << 6) + bit)
            })
        })
    }
}

impl fmt::Display for Bitset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (k, t) in self.iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{t}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_basic() {
        let mut bs = Bitset::zeros(1);
        bs.set(1);
        bs.set(3);
        assert_eq!(bs.0[0], 0b1010);
        assert!(bs.contains(3));
        assert!(!bs.contains(2));
        assert!(!bs.contains(500));
        bs.clear(3);
        assert_eq!(bs.0[0], 0b10);
    }

    #[test]
    fn test_bitset_or() {
        let mut bs1 = Bitset::from_taxa(4, [1, 2]);
        let bs2 = Bitset::from_taxa(4, [3, 4]);
        bs1.or_assign(&bs2);
        assert_eq!(bs1, Bitset::full(4));
    }

    #[test]
    fn test_set_algebra() {
        let a = Bitset::from_taxa(6, [1, 2, 3]);
        let b = Bitset::from_taxa(6, [3, 4]);
        assert_eq!(a.intersection(&b), Bitset::from_taxa(6, [3]));
        assert_eq!(a.difference(&b), Bitset::from_taxa(6, [1, 2]));
        assert_eq!(a.union(&b), Bitset::from_taxa(6, [1, 2, 3, 4]));
        assert!(a.intersects(&b));
        assert!(!a.is_subset(&b));
        assert!(Bitset::from_taxa(6, [3]).is_subset(&a));
        assert_eq!(a.complement(6), Bitset::from_taxa(6, [4, 5, 6]));
    }

    /// Visual example: How bitsets represent a small tree
    ///
    /// ```text
    ///           root
    ///          /    \
    ///        node1   4
    ///        /   \
    ///       1    node2
    ///            /   \
    ///           2     3
    /// ```
    ///
    /// - node2: {2, 3} → `0b01100`
    /// - node1: {1, 2, 3} → `0b01110`
    #[test]
    fn test_mini_tree_example() {
        let node2 = Bitset::from_taxa(4, [2, 3]);
        assert_eq!(node2.0[0], 0b01100);

        let mut node1 = Bitset::from_taxa(4, [1]);
        node1.or_assign(&node2);
        assert_eq!(node1.0[0], 0b01110);
        assert_eq!(node1.count_ones(), 3);
        assert_eq!(node1.complement(4), Bitset::from_taxa(4, [4]));
    }

    #[test]
    fn test_large_universe() {
        // 130 taxa need three words because bit 0 is unused
        assert_eq!(Bitset::words_for(130), 3);
        let bs = Bitset::from_taxa(130, [1, 63, 64, 127, 130]);
        assert_eq!(bs.count_ones(), 5);
        assert_eq!(bs.iter().collect::<Vec<_>>(), vec![1, 63, 64, 127, 130]);
        assert_eq!(bs.first(), Some(1));
        assert_eq!(bs.last(), Some(130));
        assert_eq!(bs.complement(130).count_ones(), 125);
    }

    #[test]
    fn test_display() {
        assert_eq!(Bitset::from_taxa(5, [2, 5]).to_string(), "{2, 5}");
        assert_eq!(Bitset::empty(5).to_string(), "{}");
    }
}
