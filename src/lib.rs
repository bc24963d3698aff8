//! Crate root: lightweight module orchestration and public re-exports.
//!
//! Modules:
//! - `bitset`: compact taxon sets (bit `t` is taxon `t`).
//! - `split`: splits, split systems and their compatibility tag.
//! - `error`: crate error type.
//! - `cancel`: cooperative cancellation handle.
//! - `tree`: arena tree/network model, conversion from `phylotree`.
//! - `extract`: split extraction from a single tree.
//! - `consensus`: parallel aggregation of many trees into a consensus network.
//! - `compatibility`: compatibility, circularity, weak compatibility, cycles.
//! - `greedy`: greedy compatible / circular / weakly compatible filters.
//! - `clique`: maximum-weight compatible subsets (general and circular).
//! - `zclosure`: partial split completion for super networks.
//! - `filter`: filter selection shared by the CLI and the bindings.
//! - `io`: reading BEAST/NEXUS tree files, writing split TSVs.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod bitset;
pub mod cancel;
pub mod clique;
pub mod compatibility;
pub mod consensus;
pub mod error;
pub mod extract;
pub mod filter;
pub mod greedy;
pub mod io;
pub mod split;
pub mod tree;
pub mod zclosure;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use bitset::Bitset;
pub use cancel::CancelToken;
pub use clique::{CliqueSelection, max_weight_circular, max_weight_compatible};
pub use compatibility::{
    CheapestInsertion, CircularOrdering, StandardWeakCompatibility, WeakCompatibility, classify,
    compatible, compute_cycle, is_circular, verify,
};
pub use consensus::{ConsensusOptions, EdgeWeights, consensus};
pub use error::{Result, SplitsError};
pub use extract::{TreeSplits, extract_partial_splits, extract_splits};
pub use greedy::{Score, greedy_circular, greedy_compatible, greedy_weakly_compatible};
pub use io::{read_beast_trees, write_splits_tsv};
pub use split::{Compatibility, Split, SplitSystem};
pub use tree::{TaxonIndex, Tree};
pub use zclosure::{ClosureWeights, PartialSplit, ZClosureOptions, super_network, z_closure};
