use clap::{Parser, ValueEnum};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_python_split_networks::cancel::CancelToken;
use rust_python_split_networks::consensus::{ConsensusOptions, EdgeWeights, consensus};
use rust_python_split_networks::filter::{Filter, apply_filter};
use rust_python_split_networks::greedy::Score;
use rust_python_split_networks::io::{index_trees, read_beast_trees, write_splits_tsv};
use rust_python_split_networks::zclosure::{ZClosureOptions, super_network};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Build a consensus network (or a super network of partial trees) from
/// BEAST/NEXUS tree files and write its splits as a labeled TSV.
#[derive(Parser, Debug)]
#[command(name = "split-networks", version, about = "Consensus and super networks from BEAST trees")]
struct Args {
    /// Path(s) to BEAST .trees (NEXUS) files
    #[arg(short = 'i', long = "input", num_args = 1.., required = true)]
    input: Vec<PathBuf>,

    /// Burn-in by number of trees (drop first N trees of every file)
    #[arg(short = 't', long = "burnin-trees", default_value_t = 0)]
    burnin_trees: usize,

    /// Burn-in by state (keep trees with STATE_ > value)
    #[arg(short = 's', long = "burnin-states", default_value_t = 0)]
    burnin_states: usize,

    /// Output path for the split TSV (`.gz` compresses, `-` is stdout)
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Use TRANSLATE block to map taxon IDs to labels when available
    #[arg(long = "use-real-taxa", default_value_t = false)]
    use_real_taxa: bool,

    /// How splits are combined: consensus | super-network
    #[arg(long = "method", value_enum, default_value_t = MethodArg::Consensus)]
    method: MethodArg,

    /// Consensus: keep splits found in more than this percentage of trees
    #[arg(long = "threshold", default_value_t = 30.0)]
    threshold: f64,

    /// Consensus: weight of a kept split
    #[arg(long = "edge-weights", value_enum, default_value_t = EdgeWeightsArg::Mean)]
    edge_weights: EdgeWeightsArg,

    /// Super network: number of Z-closure runs on shuffled inputs
    #[arg(long = "runs", default_value_t = 1)]
    runs: usize,

    /// Super network: drop splits not supported by every input tree
    #[arg(long = "strong-induction", default_value_t = false)]
    strong_induction: bool,

    /// Super network: seed of the shuffles
    #[arg(long = "seed", default_value_t = 0)]
    seed: u64,

    /// Filter applied to the resulting splits
    #[arg(long = "filter", value_enum, default_value_t = FilterArg::None)]
    filter: FilterArg,

    /// Split attribute ranking candidates of the greedy filters
    #[arg(long = "score", value_enum, default_value_t = ScoreArg::Weight)]
    score: ScoreArg,

    /// Maximum number of worker threads (default: available parallelism)
    #[arg(long = "threads")]
    threads: Option<usize>,

    /// Quiet mode: only warnings and errors are logged
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MethodArg { Consensus, SuperNetwork }

#[derive(Copy, Clone, Debug, ValueEnum)]
enum EdgeWeightsArg { Mean, TreeSizeWeightedMean, Median, Count, Sum, Uniform }

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FilterArg { None, Compatible, Circular, Weak, Clique, CircularClique }

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ScoreArg { Weight, Confidence }

impl From<EdgeWeightsArg> for EdgeWeights {
    fn from(arg: EdgeWeightsArg) -> Self {
        match arg {
            EdgeWeightsArg::Mean => EdgeWeights::Mean,
            EdgeWeightsArg::TreeSizeWeightedMean => EdgeWeights::TreeSizeWeightedMean,
            EdgeWeightsArg::Median => EdgeWeights::Median,
            EdgeWeightsArg::Count => EdgeWeights::Count,
            EdgeWeightsArg::Sum => EdgeWeights::Sum,
            EdgeWeightsArg::Uniform => EdgeWeights::Uniform,
        }
    }
}

impl From<FilterArg> for Filter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::None => Filter::None,
            FilterArg::Compatible => Filter::Compatible,
            FilterArg::Circular => Filter::Circular,
            FilterArg::Weak => Filter::WeaklyCompatible,
            FilterArg::Clique => Filter::Clique,
            FilterArg::CircularClique => Filter::CircularClique,
        }
    }
}

impl From<ScoreArg> for Score {
    fn from(arg: ScoreArg) -> Self {
        match arg {
            ScoreArg::Weight => Score::Weight,
            ScoreArg::Confidence => Score::Confidence,
        }
    }
}

fn main() {
    let args = Args::parse();

    let level = if args.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    // Read trees of every input file
    let t0 = Instant::now();
    let mut phylo_trees = Vec::new();
    for path in &args.input {
        match read_beast_trees(path, args.burnin_trees, args.burnin_states, args.use_real_taxa) {
            Ok(file) => phylo_trees.extend(file.trees.into_iter().map(|(_, tree)| tree)),
            Err(e) => {
                tracing::error!("Failed to read {}: {e}", path.display());
                std::process::exit(2);
            }
        }
    }
    if phylo_trees.is_empty() {
        tracing::error!("No trees parsed from {:?}.", args.input);
        std::process::exit(2);
    }
    let (taxa, trees) = match index_trees(&phylo_trees) {
        Ok(indexed) => indexed,
        Err(e) => {
            tracing::error!("Failed to index taxa: {e}");
            std::process::exit(2);
        }
    };
    tracing::info!(
        taxa = taxa.len(),
        trees = trees.len(),
        "Reading in trees {:.3}s",
        t0.elapsed().as_secs_f64()
    );

    let t1 = Instant::now();
    let cancel = CancelToken::new();
    let computed = match args.method {
        MethodArg::Consensus => {
            let options = ConsensusOptions {
                threshold: args.threshold,
                edge_weights: args.edge_weights.into(),
                threads: args.threads,
            };
            consensus(&trees, taxa.len(), &options, &cancel)
        }
        MethodArg::SuperNetwork => {
            let options = ZClosureOptions {
                runs: args.runs,
                strong_induction: args.strong_induction,
                ..Default::default()
            };
            let mut rng = StdRng::seed_from_u64(args.seed);
            super_network(&trees, taxa.len(), &options, &mut rng, &cancel)
        }
    }
    .and_then(|system| apply_filter(&system, args.filter.into(), args.score.into(), &cancel));
    let system = match computed {
        Ok(system) => system,
        Err(e) => {
            tracing::error!("Failed to compute splits: {e}");
            std::process::exit(3);
        }
    };
    tracing::info!(
        splits = system.len(),
        "Computing {:?} {:.3}s",
        args.method,
        t1.elapsed().as_secs_f64()
    );

    let t2 = Instant::now();
    if let Err(e) = write_splits_tsv(&args.output, &system, &taxa) {
        tracing::error!("Failed to write output {:?}: {e}", args.output);
        std::process::exit(4);
    }
    tracing::info!("Writing to output {:.3}s", t2.elapsed().as_secs_f64());
}
