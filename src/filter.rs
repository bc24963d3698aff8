//! Post-aggregation filter selection, shared by the CLI and the bindings.

use std::str::FromStr;

use crate::cancel::CancelToken;
use crate::clique::{max_weight_circular, max_weight_compatible};
use crate::compatibility::{CheapestInsertion, StandardWeakCompatibility, compute_cycle};
use crate::error::{Result, SplitsError};
use crate::greedy::{Score, greedy_circular, greedy_compatible, greedy_weakly_compatible};
use crate::split::SplitSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    /// Keep the system as is.
    #[default]
    None,
    Compatible,
    Circular,
    WeaklyCompatible,
    /// Exact maximum-weight compatible subset; exponential, small inputs only.
    Clique,
    /// Maximum-weight compatible subset of the circular splits.
    CircularClique,
}

impl FromStr for Filter {
    type Err = SplitsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Filter::None),
            "compatible" | "tree" => Ok(Filter::Compatible),
            "circular" => Ok(Filter::Circular),
            "weak" | "weakly-compatible" => Ok(Filter::WeaklyCompatible),
            "clique" => Ok(Filter::Clique),
            "circular-clique" => Ok(Filter::CircularClique),
            other => Err(SplitsError::InvalidInput(format!("unknown filter '{other}'"))),
        }
    }
}

/// Applies `filter` with the crate's default ordering heuristic and
/// weak-compatibility predicate. `score` ranks candidates of the greedy filters.
pub fn apply_filter(
    system: &SplitSystem,
    filter: Filter,
    score: Score,
    cancel: &CancelToken,
) -> Result<SplitSystem> {
    let filtered = match filter {
        Filter::None => system.clone(),
        Filter::Compatible => greedy_compatible(system, score, cancel)?,
        Filter::Circular => greedy_circular(system, score, &CheapestInsertion, cancel)?,
        Filter::WeaklyCompatible => {
            greedy_weakly_compatible(system, score, &StandardWeakCompatibility, cancel)?
        }
        Filter::Clique => max_weight_compatible(system, cancel)?.splits,
        Filter::CircularClique => {
            let with_cycle = match system.cycle() {
                Some(_) => system.clone(),
                None => system.clone().with_cycle(compute_cycle(system, &CheapestInsertion)?)?,
            };
            max_weight_circular(&with_cycle, cancel)?.splits
        }
    };
    tracing::info!(?filter, before = system.len(), after = filtered.len(), "filtered splits");
    Ok(filtered)
}
