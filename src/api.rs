//! Python binding layer for split network construction.
//!
//! Provides Python functions building consensus and super networks from
//! BEAST/NEXUS tree files.

use phylotree::tree::Tree as PhyloTree;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::cancel::CancelToken;
use crate::consensus::{ConsensusOptions, EdgeWeights, consensus};
use crate::error::SplitsError;
use crate::filter::{Filter, apply_filter};
use crate::greedy::Score;
use crate::io::{index_trees, read_beast_trees};
use crate::split::SplitSystem;
use crate::tree::TaxonIndex;
use crate::zclosure::{ZClosureOptions, super_network as z_super_network};

/// One split as returned to Python: (side_a, side_b, weight, confidence).
type SplitRow = (Vec<String>, Vec<String>, f64, f64);

fn to_py(e: SplitsError) -> PyErr {
    match e {
        SplitsError::Cancelled | SplitsError::ThreadPool(_) | SplitsError::Io(_) => {
            PyRuntimeError::new_err(e.to_string())
        }
        _ => PyValueError::new_err(e.to_string()),
    }
}

/// Build a consensus network from multiple tree files.
///
/// Args:
///     paths: List of file paths to BEAST/NEXUS tree files
///     threshold: Keep splits found in more than this percentage of trees (default: 30)
///     edge_weights: mean | tree-size-weighted-mean | median | count | sum | uniform (default: mean)
///     filter: none | compatible | circular | weak | clique | circular-clique (default: none)
///     score: weight | confidence, ranks candidates of greedy filters (default: weight)
///     burnin_trees: Number of trees to skip at the beginning of each file (default: 0)
///     burnin_states: Minimum STATE value to keep trees (default: 0)
///     use_real_taxa: Use TRANSLATE block for taxon names when available (default: True)
///     threads: Maximum number of worker threads (default: all cores)
///
/// Returns:
///     A tuple of (taxa, splits) where:
///     - taxa is the list of taxon labels, in id order
///     - splits is a list of (side_a, side_b, weight, confidence) tuples
///
/// Raises:
///     ValueError: If no trees are found, an option is unknown, or a tree is malformed
#[pyfunction]
#[pyo3(signature = (
    paths,
    threshold=30.0,
    edge_weights="mean",
    filter="none",
    score="weight",
    burnin_trees=0,
    burnin_states=0,
    use_real_taxa=true,
    threads=None
))]
#[allow(clippy::too_many_arguments)]
fn consensus_network(
    paths: Vec<String>,
    threshold: f64,
    edge_weights: &str,
    filter: &str,
    score: &str,
    burnin_trees: usize,
    burnin_states: usize,
    use_real_taxa: bool,
    threads: Option<usize>,
) -> PyResult<(Vec<String>, Vec<SplitRow>)> {
    let options = ConsensusOptions {
        threshold,
        edge_weights: edge_weights.parse::<EdgeWeights>().map_err(to_py)?,
        threads,
    };
    let filter = filter.parse::<Filter>().map_err(to_py)?;
    let score = score.parse::<Score>().map_err(to_py)?;

    let trees = read_all_trees(&paths, burnin_trees, burnin_states, use_real_taxa)?;
    let (taxa, trees) = index_trees(&trees).map_err(to_py)?;

    let cancel = CancelToken::new();
    let system = consensus(&trees, taxa.len(), &options, &cancel)
        .and_then(|system| apply_filter(&system, filter, score, &cancel))
        .map_err(to_py)?;

    Ok(rows(&taxa, &system))
}

/// Build a super network of possibly partial trees by Z-closure.
///
/// Args:
///     paths: List of file paths to BEAST/NEXUS tree files
///     runs: Number of closure runs on shuffled inputs (default: 1)
///     strong_induction: Drop splits not supported by every input tree (default: False)
///     seed: Seed of the shuffles (default: 0)
///     filter: none | compatible | circular | weak | clique | circular-clique (default: none)
///     score: weight | confidence (default: weight)
///     burnin_trees: Number of trees to skip at the beginning of each file (default: 0)
///     burnin_states: Minimum STATE value to keep trees (default: 0)
///     use_real_taxa: Use TRANSLATE block for taxon names when available (default: True)
///
/// Returns:
///     A tuple of (taxa, splits) as for `consensus_network`
#[pyfunction]
#[pyo3(signature = (
    paths,
    runs=1,
    strong_induction=false,
    seed=0,
    filter="none",
    score="weight",
    burnin_trees=0,
    burnin_states=0,
    use_real_taxa=true
))]
#[allow(clippy::too_many_arguments)]
fn super_network(
    paths: Vec<String>,
    runs: usize,
    strong_induction: bool,
    seed: u64,
    filter: &str,
    score: &str,
    burnin_trees: usize,
    burnin_states: usize,
    use_real_taxa: bool,
) -> PyResult<(Vec<String>, Vec<SplitRow>)> {
    let options = ZClosureOptions {
        runs,
        strong_induction,
        ..Default::default()
    };
    let filter = filter.parse::<Filter>().map_err(to_py)?;
    let score = score.parse::<Score>().map_err(to_py)?;

    let trees = read_all_trees(&paths, burnin_trees, burnin_states, use_real_taxa)?;
    let (taxa, trees) = index_trees(&trees).map_err(to_py)?;

    let cancel = CancelToken::new();
    let mut rng = StdRng::seed_from_u64(seed);
    let system = z_super_network(&trees, taxa.len(), &options, &mut rng, &cancel)
        .and_then(|system| apply_filter(&system, filter, score, &cancel))
        .map_err(to_py)?;

    Ok(rows(&taxa, &system))
}

fn rows(taxa: &TaxonIndex, system: &SplitSystem) -> Vec<SplitRow> {
    let labels = |side: &crate::bitset::Bitset| -> Vec<String> {
        side.iter()
            .filter_map(|t| taxa.label(t).map(str::to_string))
            .collect()
    };
    system
        .iter()
        .map(|s| (labels(s.a()), labels(s.b()), s.weight, s.confidence))
        .collect()
}

/// Helper function to read trees from multiple files
fn read_all_trees(
    paths: &[String],
    burnin_trees: usize,
    burnin_states: usize,
    use_real_taxa: bool,
) -> PyResult<Vec<PhyloTree>> {
    let mut all_trees = Vec::new();

    for path in paths {
        let file = read_beast_trees(path, burnin_trees, burnin_states, use_real_taxa).map_err(to_py)?;
        if file.trees.is_empty() {
            return Err(PyValueError::new_err(format!(
                "No trees found in file '{}' after burnin removal",
                path
            )));
        }
        all_trees.extend(file.trees.into_iter().map(|(_, tree)| tree));
    }

    if all_trees.is_empty() {
        return Err(PyValueError::new_err(
            "No trees found in any of the provided files",
        ));
    }

    Ok(all_trees)
}

/// Python module definition
#[pymodule]
fn rust_python_split_networks(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(consensus_network, m)?)?;
    m.add_function(wrap_pyfunction!(super_network, m)?)?;
    Ok(())
}
