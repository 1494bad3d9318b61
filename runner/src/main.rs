use clap::{Args, Parser, Subcommand};
use multifold_runner::{
    completion,
    config::{ConfigErrors, RunArgs, RunnerConfig},
    executors::OutputLayout,
    logging,
    rank::RankIdentity,
    run_worker,
    unit::{fasta::Fasta, RecordFormat},
};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info, info_span, warn};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// More output, repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Less output, repeat for even less
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    quiet: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fold this worker's share of the sequences
    Run(RunArgs),
    /// Remove output directories that hold no folding results
    Prune(PruneArgs),
}

#[derive(Args, Debug)]
struct PruneArgs {
    /// Output directory to clean up
    #[arg(short, long = "input-dir", alias = "input_dir")]
    input_dir: PathBuf,
    /// Only list the directories that would be removed
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(logging::level(cli.verbose, cli.quiet)) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match cli.command {
        Commands::Run(args) => match run(args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{e}");
                ExitCode::FAILURE
            }
        },
        Commands::Prune(args) => match completion::prune(&args.input_dir, args.dry_run) {
            Ok(removed) => {
                info!("Pruned {} directories", removed.len());
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to prune {}: {e}", args.input_dir.to_string_lossy());
                ExitCode::FAILURE
            }
        },
    }
}

/// failed units are only logged, the run itself still succeeds
fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = RunnerConfig::load(args)?;

    if config.preflight_checks() {
        return Err(ConfigErrors::PreflightFailed.into());
    }

    let rank = RankIdentity::from_env(&config.topology).map_err(ConfigErrors::from)?;
    let _span = info_span!("worker", node = rank.node_index, gpu = rank.local_index).entered();

    match nix::unistd::gethostname() {
        Ok(hostname) => info!(host = ?hostname, "Starting {rank}"),
        Err(e) => {
            warn!("Failed to retrieve hostname: {e}");
            info!("Starting {rank}");
        }
    }

    let format = Fasta;
    let layout = OutputLayout::new(&config.out_dir, format.extension());
    let collector = config.collector()?;

    let summary = run_worker(
        &rank,
        &collector,
        &layout,
        &format,
        config.launcher(),
        config.launch_options(),
    )?;

    info!(
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        "Finished folding on gpu {} of rank {}",
        rank.local_index,
        rank.node_index
    );

    Ok(())
}
