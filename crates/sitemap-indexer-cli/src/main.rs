use clap::{Parser, Subcommand};
use sitemap_indexer_cli::cli::output;
use sitemap_indexer_cli::cli::run_cmd::RunArgs;
use sitemap_indexer_cli::cli::{
    indexer_home, reset_cmd, run_cmd, status, CHECKPOINT_DB, REGISTERED_FILE,
};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sitemap-indexer",
    author,
    version,
    about = "Resumable sitemap re-indexer",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Checkpoint database (default: ~/.sitemap-indexer/checkpoints.db)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Machine-readable JSON output
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug logging and extra detail
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit log events as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one budgeted indexing invocation
    Run(RunArgs),
    /// Show the index indicator and pending checkpoints
    Status,
    /// Forget all progress so the next run starts from scratch
    Reset {
        /// Also delete the registered URL log
        #[arg(long)]
        purge_output: bool,
        /// Registered URL log to delete (default: ~/.sitemap-indexer/registered.jsonl)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool, log_json: bool) {
    let directive = if verbose {
        "sitemap_indexer=debug"
    } else {
        "sitemap_indexer=info"
    };
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = directive.parse() {
        filter = filter.add_directive(directive);
    }

    if log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() {
    let cli = Cli::parse();

    if cli.json {
        std::env::set_var(output::ENV_JSON, "1");
    }
    if cli.quiet {
        std::env::set_var(output::ENV_QUIET, "1");
    }
    if cli.verbose {
        std::env::set_var(output::ENV_VERBOSE, "1");
    }
    init_tracing(cli.verbose, cli.log_json);

    let store = cli
        .store
        .clone()
        .unwrap_or_else(|| indexer_home().join(CHECKPOINT_DB));

    let result = match &cli.command {
        Commands::Run(args) => run_cmd::run(&store, args),
        Commands::Status => status::run(&store),
        Commands::Reset {
            purge_output,
            output,
        } => {
            let output = output
                .clone()
                .unwrap_or_else(|| indexer_home().join(REGISTERED_FILE));
            reset_cmd::run(&store, purge_output.then_some(output.as_path()))
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
