//! Maximum-weight compatible subsets.
//!
//! Splits are vertices of a graph with an edge between every compatible
//! pair; a clique is a compatible subset, i.e. a tree. Two solvers:
//!
//! - [`max_weight_compatible`]: exact branch-and-bound search over cliques,
//!   exponential in the worst case. Callers bound the input size.
//! - [`max_weight_circular`]: when all interesting splits are circular for a
//!   fixed cycle, the problem becomes an interval DP in `O(n³)`.

use std::collections::HashMap;

use crate::cancel::CancelToken;
use crate::compatibility::{compatible, is_circular};
use crate::error::{Result, SplitsError};
use crate::greedy::{Score, greedy_order};
use crate::split::{Compatibility, SplitSystem};

/// A compatible subset and its total weight.
#[derive(Debug, Clone)]
pub struct CliqueSelection {
    pub splits: SplitSystem,
    pub weight: f64,
}

/// Partial clique on the explicit search stack.
struct Frame {
    /// Vertices in the clique, increasing.
    clique: Vec<usize>,
    /// Vertices after the last clique member that are adjacent to all members.
    candidates: Vec<usize>,
    weight: f64,
}

/// Finds a maximum-weight pairwise compatible subset of `system`.
///
/// # Algorithm
/// Vertices are numbered in greedy order (weight descending, then size, then
/// canonical side). A frame is extended by each of its candidates in turn;
/// frames without candidates are terminal and compete for the best weight.
/// Only a strictly heavier clique replaces the current best, so among equal
/// cliques the first one in search order wins.
///
/// A frame is dropped when its weight plus the positive weights of all its
/// candidates cannot beat the best found. The bound assumes non-negative
/// weights; negative weights still give a valid clique but not necessarily
/// the heaviest one.
///
/// # Errors
/// `Cancelled` if `cancel` fires; polled on every expansion.
pub fn max_weight_compatible(system: &SplitSystem, cancel: &CancelToken) -> Result<CliqueSelection> {
    let splits = system.splits();
    let order = greedy_order(splits, Score::Weight);
    let n = order.len();
    let weight: Vec<f64> = order.iter().map(|&i| splits[i].weight).collect();
    let adjacent: Vec<Vec<bool>> = (0..n)
        .map(|u| {
            (0..n)
                .map(|v| u != v && compatible(&splits[order[u]], &splits[order[v]]))
                .collect()
        })
        .collect();

    let mut best: Option<(Vec<usize>, f64)> = None;
    let mut stack = vec![Frame {
        clique: Vec::new(),
        candidates: (0..n).collect(),
        weight: 0.0,
    }];
    let mut expansions = 0usize;
    while let Some(frame) = stack.pop() {
        cancel.check()?;
        expansions += 1;

        if frame.candidates.is_empty() {
            if best.as_ref().is_none_or(|(_, w)| frame.weight > *w) {
                best = Some((frame.clique, frame.weight));
            }
            continue;
        }
        if let Some((_, best_weight)) = &best {
            let bound = frame.weight + frame.candidates.iter().map(|&c| weight[c].max(0.0)).sum::<f64>();
            if bound <= *best_weight {
                continue;
            }
        }

        // reversed, so the lowest candidate is expanded first
        for (k, &c) in frame.candidates.iter().enumerate().rev() {
            let candidates = frame.candidates[k + 1..]
                .iter()
                .copied()
                .filter(|&u| adjacent[c][u])
                .collect();
            let mut clique = frame.clique.clone();
            clique.push(c);
            stack.push(Frame {
                clique,
                candidates,
                weight: frame.weight + weight[c],
            });
        }
    }

    let (clique, total) = best.unwrap_or_default();
    tracing::debug!(vertices = n, expansions, weight = total, "max-weight clique");

    let mut selected = system.empty_like();
    for v in clique {
        selected.push(splits[order[v]].clone())?;
    }
    selected.set_compatibility(Compatibility::Compatible);
    Ok(CliqueSelection {
        splits: selected,
        weight: total,
    })
}

/// Maximum-weight compatible subset of the circular splits of `system`.
///
/// # Algorithm
/// Rotate the cycle so taxon 1 sits at position 0. The canonical side of a
/// circular split then covers positions `i+1..=k` for some
/// `0 <= i < k <= n-1`; call that the arc `(i, k]`. Compatible circular
/// splits are exactly nested or disjoint arcs, so
/// ```text
///   best[i][k] = w(i, k) + max_{i<j<k} best[i][j] + best[j][k]
///   best[i][i+1] = w(i, i+1)          (trivial split of one taxon)
/// ```
/// where `w` is the arc's split weight, or 0 if the split is absent or has
/// negative weight. The selection is rebuilt from the recorded cut points.
/// Splits that are not circular for the cycle are ignored.
///
/// # Errors
/// - `InvalidInput` if the system carries no cycle
/// - `Cancelled` if `cancel` fires; polled once per arc length
pub fn max_weight_circular(system: &SplitSystem, cancel: &CancelToken) -> Result<CliqueSelection> {
    let cycle = system.cycle().ok_or_else(|| {
        SplitsError::InvalidInput("circular clique search needs a cycle".to_string())
    })?;
    let n = system.ntax();
    let mut selected = system.empty_like();
    selected.set_compatibility(Compatibility::Compatible);
    if n < 2 {
        return Ok(CliqueSelection {
            splits: selected,
            weight: 0.0,
        });
    }

    let start = cycle.iter().position(|&t| t == 1).unwrap_or(0);
    let rotated: Vec<usize> = cycle[start..].iter().chain(&cycle[..start]).copied().collect();
    let mut position = vec![0usize; n + 1];
    for (p, &t) in rotated.iter().enumerate() {
        position[t] = p;
    }

    let splits = system.splits();
    let mut arcs: HashMap<(usize, usize), usize> = HashMap::new();
    for (idx, split) in splits.iter().enumerate() {
        if !is_circular(split, &rotated) {
            tracing::debug!(%split, "skipping non-circular split");
            continue;
        }
        let (lo, hi) = split
            .a()
            .iter()
            .map(|t| position[t])
            .fold((usize::MAX, 0), |(lo, hi), p| (lo.min(p), hi.max(p)));
        // taxon 1 is at position 0 and never on the canonical side
        arcs.insert((lo - 1, hi), idx);
    }
    let arc_weight = |i: usize, k: usize| {
        arcs.get(&(i, k))
            .map(|&idx| splits[idx].weight)
            .filter(|w| *w >= 0.0)
            .unwrap_or(0.0)
    };

    let mut best = vec![vec![0.0f64; n]; n];
    let mut cut = vec![vec![0usize; n]; n];
    for len in 1..n {
        cancel.check()?;
        for i in 0..n - len {
            let k = i + len;
            let mut inner = 0.0;
            if len > 1 {
                inner = f64::NEG_INFINITY;
                for j in i + 1..k {
                    let value = best[i][j] + best[j][k];
                    if value > inner {
                        inner = value;
                        cut[i][k] = j;
                    }
                }
            }
            best[i][k] = inner + arc_weight(i, k);
        }
    }

    let mut chosen = Vec::new();
    let mut pending = vec![(0, n - 1)];
    while let Some((i, k)) = pending.pop() {
        if let Some(&idx) = arcs.get(&(i, k)) {
            if splits[idx].weight >= 0.0 {
                chosen.push(idx);
            }
        }
        if k - i > 1 {
            let j = cut[i][k];
            pending.push((j, k));
            pending.push((i, j));
        }
    }
    chosen.sort_unstable();
    for idx in chosen {
        selected.push(splits[idx].clone())?;
    }

    let weight = best[0][n - 1];
    tracing::debug!(ntax = n, arcs = arcs.len(), weight, "circular max-weight selection");
    Ok(CliqueSelection {
        splits: selected,
        weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitset::Bitset;
    use crate::compatibility::all_compatible;
    use crate::greedy::greedy_compatible;
    use crate::split::Split;
    use proptest::prelude::*;

    fn split(ntax: usize, taxa: &[usize], weight: f64) -> Split {
        Split::from_taxa(ntax, taxa.iter().copied(), weight).unwrap()
    }

    fn side(ntax: usize, taxa: &[usize]) -> Bitset {
        Bitset::from_taxa(ntax, taxa.iter().copied())
    }

    /// Heaviest compatible subset by trying them all.
    fn exhaustive(splits: &[Split]) -> f64 {
        (0u32..1 << splits.len())
            .filter_map(|mask| {
                let chosen: Vec<Split> = (0..splits.len())
                    .filter(|b| mask >> b & 1 == 1)
                    .map(|b| splits[b].clone())
                    .collect();
                all_compatible(&chosen).then(|| chosen.iter().map(|s| s.weight).sum::<f64>())
            })
            .fold(0.0, f64::max)
    }

    /// The heaviest split {3,4,5} crosses the unique best clique.
    fn five_splits() -> SplitSystem {
        SplitSystem::from_splits(
            6,
            [
                split(6, &[2, 3], 3.0),
                split(6, &[2, 3, 4], 3.0),
                split(6, &[5, 6], 2.0),
                split(6, &[3, 4, 5], 5.0),
                split(6, &[4, 5], 1.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn finds_unique_maximum_clique() {
        let system = five_splits();
        let out = max_weight_compatible(&system, &CancelToken::new()).unwrap();
        assert_eq!(out.weight, 8.0);
        assert_eq!(out.splits.len(), 3);
        assert_eq!(
            out.splits.sides(),
            vec![side(6, &[2, 3]), side(6, &[2, 3, 4]), side(6, &[5, 6])]
        );
        assert!(all_compatible(out.splits.splits()));
        assert_eq!(out.weight, exhaustive(system.splits()));

        // greedy takes {3,4,5} first and ends lighter
        let greedy = greedy_compatible(&system, Score::Weight, &CancelToken::new()).unwrap();
        assert_eq!(greedy.total_weight(), 6.0);
    }

    #[test]
    fn empty_system_selects_nothing() {
        let out = max_weight_compatible(&SplitSystem::new(4), &CancelToken::new()).unwrap();
        assert!(out.splits.is_empty());
        assert_eq!(out.weight, 0.0);
    }

    #[test]
    fn general_search_polls_cancellation() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            max_weight_compatible(&five_splits(), &cancel),
            Err(SplitsError::Cancelled)
        ));
    }

    #[test]
    fn circular_ignores_non_circular_splits() {
        let system = SplitSystem::from_splits(
            5,
            [
                split(5, &[2, 3], 2.0),
                split(5, &[3, 4], 3.0),
                split(5, &[2, 4], 10.0),
                split(5, &[5], 1.0),
            ],
        )
        .unwrap()
        // taxon 1 is not first; the solver rotates
        .with_cycle(vec![3, 4, 5, 1, 2])
        .unwrap();
        let out = max_weight_circular(&system, &CancelToken::new()).unwrap();
        assert_eq!(out.weight, 4.0);
        assert_eq!(out.splits.sides(), vec![side(5, &[3, 4]), side(5, &[5])]);
        assert_eq!(out.splits.cycle(), Some(&[3, 4, 5, 1, 2][..]));
    }

    #[test]
    fn circular_needs_cycle() {
        let system = SplitSystem::from_splits(4, [split(4, &[2], 1.0)]).unwrap();
        assert!(matches!(
            max_weight_circular(&system, &CancelToken::new()),
            Err(SplitsError::InvalidInput(_))
        ));
    }

    /// All ten circular splits of the cycle 1..5, one per arc.
    fn arc_splits(weights: &[f64]) -> Vec<Split> {
        let mut out = Vec::new();
        for i in 0..4 {
            for k in i + 1..=4 {
                let taxa: Vec<usize> = (i + 2..=k + 1).collect();
                out.push(split(5, &taxa, weights[out.len()]));
            }
        }
        out
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn circular_dp_matches_exhaustive(weights in proptest::collection::vec(0.0f64..10.0, 10)) {
            let splits = arc_splits(&weights);
            let expected = exhaustive(&splits);
            let system = SplitSystem::from_splits(5, splits)
                .unwrap()
                .with_cycle(vec![1, 2, 3, 4, 5])
                .unwrap();
            let cancel = CancelToken::new();

            let dp = max_weight_circular(&system, &cancel).unwrap();
            prop_assert!((dp.weight - expected).abs() < 1e-9);
            prop_assert!((dp.splits.total_weight() - dp.weight).abs() < 1e-9);
            prop_assert!(all_compatible(dp.splits.splits()));

            let general = max_weight_compatible(&system, &cancel).unwrap();
            prop_assert!((general.weight - expected).abs() < 1e-9);
        }
    }
}
