use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use consensus_trees::config::{self, Algorithm, ConsensusConfig, ParentRule, Threshold};
use consensus_trees::io::{ReadOptions, read_trees, write_newick};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Build an Adams or majority-rule consensus tree from a file of Newick or
/// BEAST/NEXUS trees and write it as Newick.
#[derive(Parser, Debug)]
#[command(name = "consensus-trees", version, about = "Adams and majority-rule consensus trees")]
struct Args {
    /// Consensus algorithm to run
    #[arg(value_enum)]
    algorithm: AlgorithmArg,

    /// Input trees: one Newick tree per line, or a BEAST .trees (NEXUS) file; .gz accepted
    input: PathBuf,

    /// Output path for the consensus tree ("-" for stdout, .gz to compress)
    output: PathBuf,

    /// Draw the consensus tree on stdout with ascii characters
    #[arg(short = 'd', long = "draw-tree", default_value_t = false)]
    draw_tree: bool,

    /// Majority threshold: fraction of trees a clade must exceed, in [0.5, 1.0]
    #[arg(short = 'l', long = "threshold", default_value_t = Threshold::MAJORITY)]
    threshold: Threshold,

    /// Tally clades with randomized double hashing instead of exact leaf sets
    #[arg(long = "hashed", default_value_t = false)]
    hashed: bool,

    /// Seed for the hashing coefficients
    #[arg(long = "seed")]
    seed: Option<u64>,

    /// How a clade seen under several kept ancestors picks its parent
    #[arg(long = "parent-rule", value_enum, default_value_t = ParentRuleArg::Frequency)]
    parent_rule: ParentRuleArg,

    /// Burn-in by number of trees (drop first N trees, NEXUS only)
    #[arg(short = 't', long = "burnin-trees", default_value_t = 0)]
    burnin_trees: usize,

    /// Burn-in by state (keep trees with STATE_ > value, NEXUS only)
    #[arg(short = 's', long = "burnin-states", default_value_t = 0)]
    burnin_states: usize,

    /// Use TRANSLATE block to map taxon IDs to labels when available
    #[arg(long = "use-real-taxa", default_value_t = false)]
    use_real_taxa: bool,

    /// More logging (-v info, -vv debug, -vvv trace); RUST_LOG takes precedence
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Quiet mode: only warnings and errors
    #[arg(short = 'q', long = "quiet", default_value_t = false, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AlgorithmArg {
    Adams,
    #[value(aliases = ["Ml", "majority"])]
    Ml,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ParentRuleArg {
    Frequency,
    Literal,
    Smallest,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Adams => Algorithm::Adams,
            AlgorithmArg::Ml => Algorithm::Majority,
        }
    }
}

impl From<ParentRuleArg> for ParentRule {
    fn from(arg: ParentRuleArg) -> Self {
        match arg {
            ParentRuleArg::Frequency => ParentRule::Frequency,
            ParentRuleArg::Literal => ParentRule::Literal,
            ParentRuleArg::Smallest => ParentRule::Smallest,
        }
    }
}

/// Failure of one stage, with the exit code it maps to.
struct Failure {
    code: u8,
    error: anyhow::Error,
}

trait Stage<T> {
    fn stage(self, code: u8) -> std::result::Result<T, Failure>;
}

impl<T> Stage<T> for Result<T> {
    fn stage(self, code: u8) -> std::result::Result<T, Failure> {
        self.map_err(|error| Failure { code, error })
    }
}

fn init_logging(args: &Args) {
    let default = match (args.quiet, args.verbose) {
        (true, _) => "warn",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: &Args) -> std::result::Result<(), Failure> {
    let t0 = Instant::now();
    let options = ReadOptions {
        burnin_trees: args.burnin_trees,
        burnin_states: args.burnin_states,
        use_real_taxa: args.use_real_taxa,
    };
    let trees = read_trees(&args.input, &options)
        .with_context(|| format!("failed to read trees from {:?}", args.input))
        .stage(2)?;
    if trees.is_empty() {
        return Err(anyhow::anyhow!("no trees parsed from {:?}", args.input)).stage(2);
    }
    info!(trees = trees.len(), secs = t0.elapsed().as_secs_f64(), "reading trees");

    let config = ConsensusConfig {
        algorithm: args.algorithm.into(),
        threshold: args.threshold,
        parent_rule: args.parent_rule.into(),
        hashed: args.hashed,
        seed: args.seed,
    };

    let t1 = Instant::now();
    let consensus = config::run(&trees, &config)
        .with_context(|| format!("{:?} consensus failed", config.algorithm))
        .stage(3)?;
    info!(
        nodes = consensus.size(),
        leaves = consensus.n_leaves(),
        secs = t1.elapsed().as_secs_f64(),
        "consensus"
    );

    let t2 = Instant::now();
    write_newick(&args.output, &consensus)
        .with_context(|| format!("failed to write output {:?}", args.output))
        .stage(4)?;
    info!(
        to_stdout = args.output.as_os_str() == "-",
        secs = t2.elapsed().as_secs_f64(),
        "writing"
    );

    if args.draw_tree {
        if let Err(e) = consensus.print() {
            warn!("could not draw tree: {e}");
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure { code, error }) => {
            error!("{error:#}");
            ExitCode::from(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_spellings() {
        for name in ["ml", "Ml", "majority"] {
            let args = Args::try_parse_from(["consensus-trees", name, "in.nwk", "out.nwk"]).unwrap();
            assert!(matches!(args.algorithm, AlgorithmArg::Ml));
        }
        let args = Args::try_parse_from(["consensus-trees", "adams", "in.nwk", "-"]).unwrap();
        assert!(matches!(args.algorithm, AlgorithmArg::Adams));
        assert!(Args::try_parse_from(["consensus-trees", "nj", "in.nwk", "out.nwk"]).is_err());
    }

    #[test]
    fn test_threshold_is_validated_at_parse_time() {
        let args =
            Args::try_parse_from(["consensus-trees", "ml", "in.nwk", "out.nwk", "-l", "0.75"]).unwrap();
        assert_eq!(args.threshold.value(), 0.75);
        assert!(Args::try_parse_from(["consensus-trees", "ml", "in.nwk", "out.nwk", "-l", "0.4"]).is_err());
    }
}
