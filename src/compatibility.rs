//! Compatibility predicates, circular orderings and structural checks.
//!
//! # Compatibility
//! Two splits `A1 | B1` and `A2 | B2` are compatible when at least one of
//! `A1 ∩ A2`, `A1 ∩ B2`, `B1 ∩ A2`, `B1 ∩ B2` is empty. A set of pairwise
//! compatible splits is exactly the split set of a tree.
//!
//! # Circularity
//! Given a cyclic order of the taxa, a split is circular when each side forms
//! a contiguous arc of the cycle:
//! ```text
//!        1
//!     5     2        {2, 3} | {1, 4, 5}  circular
//!      4   3         {2, 4} | {1, 3, 5}  not circular
//! ```

use std::collections::HashSet;

use itertools::Itertools;

use crate::bitset::Bitset;
use crate::error::{Result, SplitsError};
use crate::split::{Compatibility, Split, SplitSystem};

/// True iff one of the four side intersections is empty.
pub fn compatible(s1: &Split, s2: &Split) -> bool {
    !s1.a().intersects(s2.a())
        || !s1.a().intersects(s2.b())
        || !s1.b().intersects(s2.a())
        || !s1.b().intersects(s2.b())
}

/// True iff the side of `split` not containing `cycle[0]` is a contiguous arc.
///
/// `cycle` must list every taxon of the split's universe exactly once.
pub fn is_circular(split: &Split, cycle: &[usize]) -> bool {
    let Some(&first) = cycle.first() else {
        return false;
    };
    let side = split.side_without(first);
    // walking the cycle, a contiguous arc is entered once and left once
    let changes = (0..cycle.len())
        .filter(|&i| side.contains(cycle[i]) != side.contains(cycle[(i + 1) % cycle.len()]))
        .count();
    changes == 2
}

/// Three-way weak compatibility test.
///
/// Supplied by the caller; [`StandardWeakCompatibility`] is the usual definition.
pub trait WeakCompatibility: Sync {
    fn weakly_compatible(&self, s1: &Split, s2: &Split, s3: &Split) -> bool;
}

/// Bandelt–Dress weak compatibility.
///
/// Three splits are weakly incompatible if there are four taxa realising one
/// of the two patterns
/// `A1∩A2∩A3, A1∩B2∩B3, B1∩A2∩B3, B1∩B2∩A3` or
/// `B1∩B2∩B3, B1∩A2∩A3, A1∩B2∩A3, A1∩A2∩B3` (all non-empty).
/// Flipping the orientation of any single split maps one pattern onto the
/// other, so these two cover every choice of sides.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardWeakCompatibility;

impl WeakCompatibility for StandardWeakCompatibility {
    fn weakly_compatible(&self, s1: &Split, s2: &Split, s3: &Split) -> bool {
        let (a1, b1) = (s1.a(), s1.b());
        let (a2, b2) = (s2.a(), s2.b());
        let (a3, b3) = (s3.a(), s3.b());
        let meets = |x: &Bitset, y: &Bitset, z: &Bitset| x.intersection(y).intersects(z);

        let first = meets(a1, a2, a3) && meets(a1, b2, b3) && meets(b1, a2, b3) && meets(b1, b2, a3);
        let second = meets(b1, b2, b3) && meets(b1, a2, a3) && meets(a1, b2, a3) && meets(a1, a2, b3);
        !(first || second)
    }
}

/// Circular ordering heuristic.
///
/// `dist` is an `ntax × ntax` matrix, 0-based (`dist[i - 1][j - 1]` for taxa
/// `i`, `j`). Implementations return a permutation of `1..=ntax`.
pub trait CircularOrdering: Sync {
    fn order(&self, ntax: usize, dist: &[Vec<f64>]) -> Result<Vec<usize>>;
}

/// Cheapest-insertion tour over the distance matrix.
///
/// Starts from the cycle `1, 2, 3` and inserts every further taxon between
/// the neighbours `u, v` minimising `d(u, k) + d(k, v) - d(u, v)` (first
/// position wins ties). On a tree metric every insertion keeps the tour at
/// twice the tree length, so the result is a circular ordering of the tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheapestInsertion;

impl CircularOrdering for CheapestInsertion {
    fn order(&self, ntax: usize, dist: &[Vec<f64>]) -> Result<Vec<usize>> {
        if dist.len() != ntax || dist.iter().any(|row| row.len() != ntax) {
            return Err(SplitsError::InvalidInput(format!(
                "distance matrix must be {ntax}x{ntax}"
            )));
        }
        if ntax <= 3 {
            return Ok((1..=ntax).collect());
        }

        let mut tour: Vec<usize> = vec![0, 1, 2];
        for k in 3..ntax {
            let mut best_pos = 0;
            let mut best_cost = f64::INFINITY;
            for p in 0..tour.len() {
                let u = tour[p];
                let v = tour[(p + 1) % tour.len()];
                let cost = dist[u][k] + dist[k][v] - dist[u][v];
                if cost < best_cost - 1e-12 {
                    best_cost = cost;
                    best_pos = p;
                }
            }
            tour.insert(best_pos + 1, k);
        }
        Ok(tour.into_iter().map(|i| i + 1).collect())
    }
}

/// Matrix of summed weights of the splits separating each pair of taxa.
///
/// 0-based: entry `[i - 1][j - 1]` belongs to taxa `i` and `j`.
pub fn split_distance_matrix(system: &SplitSystem) -> Vec<Vec<f64>> {
    let n = system.ntax();
    let mut dist = vec![vec![0.0f64; n]; n];
    for split in system.iter() {
        for i in split.a().iter() {
            for j in split.b().iter() {
                dist[i - 1][j - 1] += split.weight;
                dist[j - 1][i - 1] += split.weight;
            }
        }
    }
    dist
}

/// Computes a cyclic ordering of the taxa for `system`.
///
/// For three taxa or fewer every order is circular and the identity is
/// returned without consulting `ordering`.
pub fn compute_cycle(system: &SplitSystem, ordering: &dyn CircularOrdering) -> Result<Vec<usize>> {
    let n = system.ntax();
    if n <= 3 {
        return Ok((1..=n).collect());
    }
    let dist = split_distance_matrix(system);
    let cycle = ordering.order(n, &dist)?;
    tracing::debug!(ntax = n, ?cycle, "computed circular ordering");
    Ok(cycle)
}

/// Checks that `splits` form a well-formed split system over `{1..=ntax}`.
///
/// # Errors
/// - `TaxonOutOfRange` if a side holds a taxon outside `1..=ntax`
/// - `ImproperSplit` if the sides overlap, leave taxa out, or one is empty
/// - `DuplicateSplit` if two splits share a canonical side
pub fn verify(splits: &[Split], ntax: usize) -> Result<()> {
    let mut seen: HashSet<&Bitset> = HashSet::with_capacity(splits.len());
    for split in splits {
        if let Some(taxon) = split
            .a()
            .iter()
            .chain(split.b().iter())
            .find(|&t| t == 0 || t > ntax)
        {
            return Err(SplitsError::TaxonOutOfRange {
                taxon,
                ntax,
                split: split.to_string(),
            });
        }
        if split.a().is_empty()
            || split.b().is_empty()
            || split.a().intersects(split.b())
            || split.a().count_ones() + split.b().count_ones() != ntax
        {
            return Err(SplitsError::ImproperSplit(split.to_string()));
        }
        if !seen.insert(split.a()) {
            return Err(SplitsError::DuplicateSplit(split.to_string()));
        }
    }
    Ok(())
}

pub fn all_compatible(splits: &[Split]) -> bool {
    splits
        .iter()
        .tuple_combinations()
        .all(|(s1, s2)| compatible(s1, s2))
}

pub fn all_circular(splits: &[Split], cycle: &[usize]) -> bool {
    splits.iter().all(|s| is_circular(s, cycle))
}

pub fn all_weakly_compatible(splits: &[Split], weak: &dyn WeakCompatibility) -> bool {
    splits
        .iter()
        .tuple_combinations()
        .all(|(s1, s2, s3)| weak.weakly_compatible(s1, s2, s3))
}

/// Classifies `system` by the strongest property it has and records the tag.
///
/// A missing cycle is computed with `ordering` and attached to the system.
pub fn classify(
    system: &mut SplitSystem,
    ordering: &dyn CircularOrdering,
    weak: &dyn WeakCompatibility,
) -> Result<Compatibility> {
    verify(system.splits(), system.ntax())?;
    if system.cycle().is_none() {
        let cycle = compute_cycle(system, ordering)?;
        system.set_cycle(cycle)?;
    }
    let splits = system.splits();
    let tag = if all_compatible(splits) {
        Compatibility::Compatible
    } else if system.cycle().is_some_and(|c| all_circular(splits, c)) {
        Compatibility::Circular
    } else if all_weakly_compatible(splits, weak) {
        Compatibility::WeaklyCompatible
    } else {
        Compatibility::Incompatible
    };
    system.set_compatibility(tag);
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_splits;
    use crate::tree::numeric_tree;

    fn split(ntax: usize, taxa: &[usize]) -> Split {
        Split::from_taxa(ntax, taxa.iter().copied(), 1.0).unwrap()
    }

    #[test]
    fn pairwise_compatibility() {
        assert!(compatible(&split(4, &[1, 2]), &split(4, &[1, 2, 3])));
        assert!(compatible(&split(5, &[2, 3]), &split(5, &[4, 5])));
        assert!(!compatible(&split(4, &[1, 2]), &split(4, &[1, 3])));
    }

    #[test]
    fn circularity_against_cycle() {
        let cycle = [1, 2, 3, 4, 5];
        assert!(is_circular(&split(5, &[2, 3]), &cycle));
        assert!(is_circular(&split(5, &[5, 1]), &cycle));
        assert!(!is_circular(&split(5, &[2, 4]), &cycle));
        // the same split is circular for a different cycle
        assert!(is_circular(&split(5, &[2, 4]), &[1, 2, 4, 3, 5]));
    }

    #[test]
    fn weak_compatibility_triples() {
        let weak = StandardWeakCompatibility;
        // the three quartet splits of four taxa are the smallest forbidden configuration
        let s1 = split(4, &[1, 2]);
        let s2 = split(4, &[1, 3]);
        let s3 = split(4, &[1, 4]);
        assert!(!weak.weakly_compatible(&s1, &s2, &s3));

        // two of them plus a trivial split are fine
        assert!(weak.weakly_compatible(&s1, &s2, &split(4, &[4])));

        // witnesses for every cell of the first pattern:
        // X1∩X2∩X3={1}, X1∩Y2∩Y3={2}, Y1∩X2∩Y3={3}, Y1∩Y2∩X3={4}
        let u1 = split(7, &[1, 2, 5, 6]);
        let u2 = split(7, &[1, 3, 5, 7]);
        let u3 = split(7, &[1, 4, 6, 7]);
        assert!(!weak.weakly_compatible(&u1, &u2, &u3));

        // compatible splits are always weakly compatible
        let c1 = split(6, &[2, 3]);
        let c2 = split(6, &[2, 3, 4]);
        let c3 = split(6, &[5, 6]);
        assert!(weak.weakly_compatible(&c1, &c2, &c3));
    }

    #[test]
    fn verify_reports_offending_split() {
        let ok = [split(4, &[2]), split(4, &[3, 4])];
        assert!(verify(&ok, 4).is_ok());

        let dup = [split(4, &[1, 2]), split(4, &[3, 4])];
        assert!(matches!(verify(&dup, 4), Err(SplitsError::DuplicateSplit(_))));

        let wide = [split(6, &[5, 6])];
        assert!(matches!(
            verify(&wide, 4),
            Err(SplitsError::TaxonOutOfRange { taxon: 5, .. })
        ));

        let narrow = [split(3, &[2])];
        assert!(matches!(verify(&narrow, 4), Err(SplitsError::ImproperSplit(_))));
    }

    #[test]
    fn small_universes_use_identity_cycle() {
        let system = SplitSystem::from_splits(3, [split(3, &[2])]).unwrap();
        assert_eq!(compute_cycle(&system, &CheapestInsertion).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn tree_splits_are_circular_for_computed_cycle() {
        let tree = numeric_tree("(((1:1,4:2):1,(2:1,6:1):2):1,(3:1,5:3):1);");
        let mut system = extract_splits(&tree, 6).unwrap().splits;
        let tag = classify(&mut system, &CheapestInsertion, &StandardWeakCompatibility).unwrap();
        assert_eq!(tag, Compatibility::Compatible);
        let cycle = system.cycle().unwrap();
        assert!(all_circular(system.splits(), cycle));
    }

    #[test]
    fn classification_levels() {
        let cycle = vec![1, 2, 3, 4, 5];
        // crossing arcs {2,3} and {3,4}: circular, not compatible
        let mut circular = SplitSystem::from_splits(5, [split(5, &[2, 3]), split(5, &[3, 4])])
            .unwrap()
            .with_cycle(cycle.clone())
            .unwrap();
        let tag = classify(&mut circular, &CheapestInsertion, &StandardWeakCompatibility).unwrap();
        assert_eq!(tag, Compatibility::Circular);

        // {2,4} is not an arc of the cycle and crosses {2,3}; no triples exist
        let mut weak = SplitSystem::from_splits(5, [split(5, &[2, 3]), split(5, &[2, 4])])
            .unwrap()
            .with_cycle(cycle)
            .unwrap();
        let tag = classify(&mut weak, &CheapestInsertion, &StandardWeakCompatibility).unwrap();
        assert_eq!(tag, Compatibility::WeaklyCompatible);
        assert_eq!(weak.compatibility(), Compatibility::WeaklyCompatible);
    }

    #[test]
    fn distance_matrix_counts_separating_weight() {
        let system = SplitSystem::from_splits(
            4,
            [
                Split::from_taxa(4, [2], 1.0).unwrap(),
                Split::from_taxa(4, [3, 4], 2.0).unwrap(),
            ],
        )
        .unwrap();
        let d = split_distance_matrix(&system);
        assert_eq!(d[0][1], 1.0);
        assert_eq!(d[0][2], 2.0);
        assert_eq!(d[1][2], 3.0);
        assert_eq!(d[2][3], 0.0);
        assert_eq!(d[3][1], 3.0);
    }
}
