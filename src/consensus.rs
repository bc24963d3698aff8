//! Consensus networks: aggregate the splits of many trees.
//!
//! # Phases
//! 1. **Accumulation** (parallel). Workers take interleaved strides of the
//!    tree list (worker `w` of `k` handles trees `w, w + k, w + 2k, ...`),
//!    extract each tree's splits and fold them into a worker-local table.
//!    Local tables are merged pairwise in a reduce step.
//! 2. **Selection** (parallel). A split survives when it occurs in more than
//!    `threshold` percent of the trees; its weight is derived from the
//!    collected occurrences by the [`EdgeWeights`] policy.
//!
//! ```text
//!   trees ──stride──▶ worker 0 ─┐
//!         ──stride──▶ worker 1 ─┼─ reduce ─▶ table ─▶ filter + weigh ─▶ SplitSystem
//!         ──stride──▶ worker 2 ─┘
//! ```

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::bitset::Bitset;
use crate::cancel::CancelToken;
use crate::error::{Result, SplitsError};
use crate::extract::{TreeSplits, extract_splits};
use crate::split::{Split, SplitSystem};
use crate::tree::Tree;

/// How the weight of a consensus split is derived from its occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeWeights {
    /// Mean edge weight over the trees containing the split.
    #[default]
    Mean,
    /// Like `Mean`, with every tree's weights first divided by its total edge weight.
    TreeSizeWeightedMean,
    Median,
    /// Number of trees containing the split.
    Count,
    /// Sum of edge weights over all trees.
    Sum,
    Uniform,
}

impl FromStr for EdgeWeights {
    type Err = SplitsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(EdgeWeights::Mean),
            "tree-size-weighted-mean" | "weighted" => Ok(EdgeWeights::TreeSizeWeightedMean),
            "median" => Ok(EdgeWeights::Median),
            "count" => Ok(EdgeWeights::Count),
            "sum" => Ok(EdgeWeights::Sum),
            "uniform" | "none" => Ok(EdgeWeights::Uniform),
            other => Err(SplitsError::InvalidInput(format!("unknown edge weights '{other}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsensusOptions {
    /// Percentage of trees (0–100) a split must exceed to be kept.
    pub threshold: f64,
    pub edge_weights: EdgeWeights,
    /// Upper bound on worker threads; `None` uses the available parallelism.
    pub threads: Option<usize>,
}

impl Default for ConsensusOptions {
    fn default() -> Self {
        ConsensusOptions {
            threshold: 30.0,
            edge_weights: EdgeWeights::Mean,
            threads: None,
        }
    }
}

/// Occurrences of one split across trees.
#[derive(Debug, Default)]
struct SplitStats {
    count: usize,
    sum: f64,
    weights: Vec<f64>,
}

impl SplitStats {
    fn add(&mut self, weight: f64) {
        self.count += 1;
        self.sum += weight;
        self.weights.push(weight);
    }

    fn merge(&mut self, other: SplitStats) {
        self.count += other.count;
        self.sum += other.sum;
        self.weights.extend(other.weights);
    }
}

type Table = HashMap<Bitset, SplitStats>;

/// Computes the consensus split system of `trees` over `{1..=ntax}`.
///
/// Confidence of each kept split is the percentage of trees containing it.
/// Splits are returned ordered by canonical side.
///
/// # Errors
/// - `InvalidInput` if `trees` is empty or the threshold is outside `[0, 100]`
/// - `Cancelled` if `cancel` fires; no partial system is returned
/// - any extraction error of an individual tree
pub fn consensus(
    trees: &[Tree],
    ntax: usize,
    options: &ConsensusOptions,
    cancel: &CancelToken,
) -> Result<SplitSystem> {
    if trees.is_empty() {
        return Err(SplitsError::InvalidInput("no input trees".to_string()));
    }
    if !(0.0..=100.0).contains(&options.threshold) {
        return Err(SplitsError::InvalidInput(format!(
            "threshold {} is outside [0, 100]",
            options.threshold
        )));
    }

    let available = std::thread::available_parallelism().map_or(1, |n| n.get());
    let workers = options
        .threads
        .map_or(available, |cap| cap.min(available))
        .min(trees.len())
        .max(1);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;

    let warned = AtomicBool::new(false);
    let table = pool.install(|| {
        (0..workers)
            .into_par_iter()
            .map(|w| accumulate_stride(trees, w, workers, ntax, options.edge_weights, cancel, &warned))
            .try_reduce(Table::new, |mut left, right| {
                for (side, stats) in right {
                    left.entry(side).or_default().merge(stats);
                }
                Ok(left)
            })
    })?;
    tracing::debug!(
        trees = trees.len(),
        workers,
        distinct = table.len(),
        "accumulated tree splits"
    );

    let total = trees.len();
    let mut splits: Vec<Split> = pool.install(|| {
        table
            .into_par_iter()
            .filter(|(_, stats)| survives(stats.count, total, options.threshold))
            .map(|(side, stats)| {
                let confidence = 100.0 * stats.count as f64 / total as f64;
                let weight = consensus_weight(stats, options.edge_weights);
                Split::new(side, ntax, weight).map(|s| s.with_confidence(confidence))
            })
            .collect::<Result<Vec<_>>>()
    })?;
    splits.sort_by(|s1, s2| s1.a().cmp(s2.a()));

    let system = SplitSystem::from_splits(ntax, splits)?;
    tracing::debug!(kept = system.len(), threshold = options.threshold, "consensus selection");
    Ok(system)
}

/// Folds the splits of trees `first, first + step, ...` into a local table.
fn accumulate_stride(
    trees: &[Tree],
    first: usize,
    step: usize,
    ntax: usize,
    policy: EdgeWeights,
    cancel: &CancelToken,
    warned: &AtomicBool,
) -> Result<Table> {
    let mut table = Table::new();
    for tree in trees.iter().skip(first).step_by(step) {
        cancel.check()?;
        let TreeSplits { splits, .. } = extract_splits(tree, ntax)?;
        let scale = match policy {
            EdgeWeights::TreeSizeWeightedMean => tree_scale(tree, warned),
            _ => 1.0,
        };
        for split in splits.into_splits() {
            cancel.check()?;
            let weight = split.weight * scale;
            table.entry(split.a().clone()).or_default().add(weight);
        }
    }
    Ok(table)
}

/// Reciprocal of the tree's total edge weight, 1 for weightless trees.
fn tree_scale(tree: &Tree, warned: &AtomicBool) -> f64 {
    let total = tree.total_weight();
    if total > 0.0 {
        return 1.0 / total;
    }
    if !warned.swap(true, Ordering::Relaxed) {
        tracing::warn!("tree with zero total edge weight; using its weights unscaled");
    }
    1.0
}

/// `count / total > threshold%`; a threshold of 100 requires every tree.
fn survives(count: usize, total: usize, threshold: f64) -> bool {
    if threshold >= 100.0 {
        return count == total;
    }
    count as f64 / total as f64 > threshold / 100.0
}

fn consensus_weight(stats: SplitStats, policy: EdgeWeights) -> f64 {
    match policy {
        EdgeWeights::Mean | EdgeWeights::TreeSizeWeightedMean => stats.sum / stats.count as f64,
        EdgeWeights::Median => median(stats.weights),
        EdgeWeights::Count => stats.count as f64,
        EdgeWeights::Sum => stats.sum,
        EdgeWeights::Uniform => 1.0,
    }
}

fn median(mut weights: Vec<f64>) -> f64 {
    weights.sort_by(f64::total_cmp);
    let n = weights.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => weights[n / 2],
        _ => (weights[n / 2 - 1] + weights[n / 2]) / 2.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::numeric_tree;

    fn trees() -> Vec<Tree> {
        [
            "((1:1,2:1):1,(3:1,(4:1,5:1):2):1);",
            "((1:2,3:2):1,(2:1,(4:1,5:1):1):1);",
            "((1:1,2:1):3,(4:1,(3:1,5:1):1):3);",
        ]
        .into_iter()
        .map(numeric_tree)
        .collect()
    }

    fn side(taxa: &[usize]) -> Bitset {
        Bitset::from_taxa(5, taxa.iter().copied())
    }

    fn run(threshold: f64, edge_weights: EdgeWeights) -> SplitSystem {
        let options = ConsensusOptions {
            threshold,
            edge_weights,
            threads: None,
        };
        consensus(&trees(), 5, &options, &CancelToken::new()).unwrap()
    }

    #[test]
    fn tree_size_weighted_mean_golden() {
        // tree totals are 9, 10 and 12
        let out = run(50.0, EdgeWeights::TreeSizeWeightedMean);
        let expected: [(&[usize], f64, f64); 7] = [
            (&[2], 53.0 / 540.0, 100.0),
            (&[3], 71.0 / 540.0, 100.0),
            (&[4], 53.0 / 540.0, 100.0),
            (&[5], 53.0 / 540.0, 100.0),
            (&[4, 5], 29.0 / 180.0, 200.0 / 3.0),
            (&[3, 4, 5], 13.0 / 36.0, 200.0 / 3.0),
            (&[2, 3, 4, 5], 71.0 / 540.0, 100.0),
        ];
        assert_eq!(out.len(), expected.len());
        for (split, (taxa, weight, confidence)) in out.iter().zip(expected) {
            assert_eq!(split.a(), &side(taxa));
            assert!((split.weight - weight).abs() < 1e-12, "{split}: {}", split.weight);
            assert!((split.confidence - confidence).abs() < 1e-9, "{split}: {}", split.confidence);
        }
        // {2,4,5} and {3,5} occur in one tree only
        assert!(out.get(&side(&[2, 4, 5])).is_none());
        assert!(out.get(&side(&[3, 5])).is_none());
    }

    #[test]
    fn weight_policies() {
        let median = run(50.0, EdgeWeights::Median);
        // unscaled occurrences: {3,4,5} -> [2, 6], {2,3,4,5} -> [1, 2, 1]
        assert_eq!(median.get(&side(&[3, 4, 5])).unwrap().weight, 4.0);
        assert_eq!(median.get(&side(&[2, 3, 4, 5])).unwrap().weight, 1.0);

        let mean = run(50.0, EdgeWeights::Mean);
        assert_eq!(mean.get(&side(&[3, 4, 5])).unwrap().weight, 4.0);
        assert!((mean.get(&side(&[2, 3, 4, 5])).unwrap().weight - 4.0 / 3.0).abs() < 1e-12);

        let count = run(50.0, EdgeWeights::Count);
        assert_eq!(count.get(&side(&[3, 4, 5])).unwrap().weight, 2.0);
        assert_eq!(count.get(&side(&[2])).unwrap().weight, 3.0);

        let sum = run(50.0, EdgeWeights::Sum);
        assert_eq!(sum.get(&side(&[2, 3, 4, 5])).unwrap().weight, 4.0);

        let uniform = run(50.0, EdgeWeights::Uniform);
        assert!(uniform.iter().all(|s| s.weight == 1.0));
    }

    #[test]
    fn threshold_bounds() {
        // every distinct split of the three trees
        assert_eq!(run(0.0, EdgeWeights::Mean).len(), 9);
        // only the splits shared by all trees
        let all = run(100.0, EdgeWeights::Mean);
        assert_eq!(all.sides(), vec![side(&[2]), side(&[3]), side(&[4]), side(&[5]), side(&[2, 3, 4, 5])]);
    }

    #[test]
    fn thread_count_does_not_change_the_result() {
        let trees = trees();
        let cancel = CancelToken::new();
        let single = ConsensusOptions {
            threads: Some(1),
            ..Default::default()
        };
        let a = consensus(&trees, 5, &single, &cancel).unwrap();
        let b = consensus(&trees, 5, &ConsensusOptions::default(), &cancel).unwrap();
        assert_eq!(a.sides(), b.sides());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x.weight - y.weight).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_weight_tree_falls_back_to_unscaled() {
        let trees = vec![numeric_tree("((1:0,2:0):0,(3:0,4:0):0);")];
        let options = ConsensusOptions {
            edge_weights: EdgeWeights::TreeSizeWeightedMean,
            ..Default::default()
        };
        let out = consensus(&trees, 4, &options, &CancelToken::new()).unwrap();
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|s| s.weight == 0.0));
    }

    #[test]
    fn invalid_arguments() {
        let cancel = CancelToken::new();
        assert!(matches!(
            consensus(&[], 5, &ConsensusOptions::default(), &cancel),
            Err(SplitsError::InvalidInput(_))
        ));
        let options = ConsensusOptions {
            threshold: 120.0,
            ..Default::default()
        };
        assert!(matches!(
            consensus(&trees(), 5, &options, &cancel),
            Err(SplitsError::InvalidInput(_))
        ));
    }

    #[test]
    fn cancelled_aggregation_returns_no_system() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = consensus(&trees(), 5, &ConsensusOptions::default(), &cancel).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn edge_weight_names() {
        assert_eq!("Median".parse::<EdgeWeights>().unwrap(), EdgeWeights::Median);
        assert_eq!("weighted".parse::<EdgeWeights>().unwrap(), EdgeWeights::TreeSizeWeightedMean);
        assert!("max".parse::<EdgeWeights>().is_err());
    }

    #[test]
    fn median_of_even_count() {
        assert_eq!(median(vec![3.0, 1.0, 4.0, 2.0]), 2.5);
        assert_eq!(median(vec![5.0]), 5.0);
    }
}
