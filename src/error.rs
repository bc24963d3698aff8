//! Error type shared by every computation in the crate.

use phylotree::tree::TreeError;
use thiserror::Error;

/// Unified error type for split computations.
///
/// Structural variants carry the offending split rendered as
/// `{side} | {side}` so callers can report it without access to the system.
#[derive(Debug, Error)]
pub enum SplitsError {
    /// The input tree has no nodes, so there is nothing to root a traversal at.
    #[error("tree has no root")]
    NoRoot,

    /// A split with an empty side or overlapping sides.
    #[error("improper split: {0}")]
    ImproperSplit(String),

    /// Two splits of one system share a canonical side.
    #[error("duplicate split: {0}")]
    DuplicateSplit(String),

    /// A taxon id outside `1..=ntax`.
    #[error("taxon {taxon} out of range 1..={ntax} in split {split}")]
    TaxonOutOfRange {
        taxon: usize,
        ntax: usize,
        split: String,
    },

    /// Cooperative cancellation was observed; partial results were discarded.
    #[error("computation cancelled")]
    Cancelled,

    /// Invalid input (bad arguments, out-of-range options, empty tree lists).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Failure reported by `phylotree` while reading a tree.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// The worker pool for aggregation could not be started.
    #[error("thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SplitsError {
    /// True for the cancellation signal, as opposed to computational failures.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SplitsError::Cancelled)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SplitsError>;
