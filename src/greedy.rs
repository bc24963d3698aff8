//! Greedy selection of structured subsets of a split system.
//!
//! All filters share one template:
//! 1. Order splits by descending score (weight or confidence), then by
//!    smaller split size, then by canonical side (an arbitrary but fixed
//!    order, so runs are reproducible)
//! 2. Scan in that order and keep a split iff it fits with everything kept so far
//!
//! The input system is never modified; the selection comes back as a new system.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::cancel::CancelToken;
use crate::compatibility::{CircularOrdering, WeakCompatibility, compatible, compute_cycle, is_circular};
use crate::error::{Result, SplitsError};
use crate::split::{Compatibility, Split, SplitSystem};

/// Which split attribute ranks candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Score {
    #[default]
    Weight,
    Confidence,
}

impl FromStr for Score {
    type Err = SplitsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "weight" => Ok(Score::Weight),
            "confidence" => Ok(Score::Confidence),
            other => Err(SplitsError::InvalidInput(format!("unknown score '{other}'"))),
        }
    }
}

impl Score {
    fn of(self, split: &Split) -> f64 {
        match self {
            Score::Weight => split.weight,
            Score::Confidence => split.confidence,
        }
    }
}

/// Indices of `splits` in greedy order.
pub(crate) fn greedy_order(splits: &[Split], score: Score) -> Vec<usize> {
    let mut order: Vec<usize> = (0..splits.len()).collect();
    order.sort_by(|&i, &j| compare(&splits[i], &splits[j], score));
    order
}

fn compare(s1: &Split, s2: &Split, score: Score) -> Ordering {
    score
        .of(s2)
        .total_cmp(&score.of(s1))
        .then_with(|| s1.size().cmp(&s2.size()))
        .then_with(|| s1.a().cmp(s2.a()))
}

/// Shared scan: `accepts(candidate, accepted)` decides each candidate.
fn greedy_filter<F>(
    system: &SplitSystem,
    score: Score,
    cancel: &CancelToken,
    mut accepts: F,
) -> Result<SplitSystem>
where
    F: FnMut(&Split, &[&Split]) -> bool,
{
    let splits = system.splits();
    let mut accepted: Vec<&Split> = Vec::new();
    for i in greedy_order(splits, score) {
        cancel.check()?;
        if accepts(&splits[i], &accepted) {
            accepted.push(&splits[i]);
        }
    }

    let mut out = system.empty_like();
    for split in accepted {
        out.push(split.clone())?;
    }
    tracing::debug!(kept = out.len(), of = system.len(), "greedy filter");
    Ok(out)
}

/// Keeps a maximal pairwise compatible subset, i.e. a tree.
pub fn greedy_compatible(system: &SplitSystem, score: Score, cancel: &CancelToken) -> Result<SplitSystem> {
    let mut out = greedy_filter(system, score, cancel, |candidate, accepted| {
        accepted.iter().all(|s| compatible(candidate, s))
    })?;
    out.set_compatibility(Compatibility::Compatible);
    Ok(out)
}

/// Keeps the splits that are circular for the system's cycle.
///
/// If the system has no cycle one is computed with `ordering`; the result
/// carries the cycle used.
pub fn greedy_circular(
    system: &SplitSystem,
    score: Score,
    ordering: &dyn CircularOrdering,
    cancel: &CancelToken,
) -> Result<SplitSystem> {
    let cycle = match system.cycle() {
        Some(cycle) => cycle.to_vec(),
        None => compute_cycle(system, ordering)?,
    };
    let mut out = greedy_filter(system, score, cancel, |candidate, _| is_circular(candidate, &cycle))?;
    out.set_cycle(cycle)?;
    out.set_compatibility(Compatibility::Circular);
    Ok(out)
}

/// Keeps a maximal weakly compatible subset.
///
/// A candidate must be weakly compatible with every unordered pair of
/// accepted splits, not only with neighbours in the scan order.
pub fn greedy_weakly_compatible(
    system: &SplitSystem,
    score: Score,
    weak: &dyn WeakCompatibility,
    cancel: &CancelToken,
) -> Result<SplitSystem> {
    let mut out = greedy_filter(system, score, cancel, |candidate, accepted| {
        accepted.iter().enumerate().all(|(i, s1)| {
            accepted[i + 1..]
                .iter()
                .all(|s2| weak.weakly_compatible(candidate, s1, s2))
        })
    })?;
    out.set_compatibility(Compatibility::WeaklyCompatible);
    Ok(out)
}
