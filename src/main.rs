use clap::{Args, Parser, Subcommand, builder::styling};
use eyre::{Context, Result};
use lane_etl::cli;
use lane_etl::config::{EtlConfig, Overrides};
use owo_colors::OwoColorize;
use std::path::PathBuf;

// CLI Styling
const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::BrightWhite.on_default())
    .usage(styling::AnsiColor::BrightWhite.on_default())
    .literal(styling::AnsiColor::Green.on_default())
    .placeholder(styling::AnsiColor::Cyan.on_default());

/// Lane ETL: ships device CPU metrics to an ingestion endpoint, keeping failed batches for the next run
#[derive(Parser)]
#[command(name = "laneetl", version, styles = STYLES)]
struct Cli {
    /// The dotenv file to source configuration from
    #[arg(short, long, global = true, default_value = ".env")]
    env: String,

    /// More verbose logging
    #[arg(long, global = true)]
    debug: bool,

    /// Append log output to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Command to execute (defaults to `run`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay failed batches, extract every source and load the results
    Run(RunArgs),

    /// Check the ingestion endpoint's health operation
    Health {
        /// Ingestion endpoint load URL; health is checked next to it
        #[arg(long)]
        url: Option<String>,
    },

    /// List failed batches waiting to be replayed
    Pending {
        /// Directory holding failed batch files
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// CSV file of address,name rows
    sources: Option<PathBuf>,

    /// Maximum extractions in flight
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Number of load lanes
    #[arg(short, long)]
    lanes: Option<usize>,

    /// Capacity of each lane queue
    #[arg(long)]
    queue_depth: Option<usize>,

    /// Buffered records that trigger a flush
    #[arg(short, long)]
    flush_threshold: Option<usize>,

    /// Per-source extraction timeout in milliseconds
    #[arg(long)]
    extract_timeout_ms: Option<u64>,

    /// Simulated collector latency in milliseconds
    #[arg(long)]
    collector_latency_ms: Option<u64>,

    /// Ingestion endpoint load URL
    #[arg(long)]
    url: Option<String>,

    /// Directory holding failed batch files
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

impl From<RunArgs> for Overrides {
    fn from(args: RunArgs) -> Self {
        Self {
            concurrency: args.concurrency,
            lanes: args.lanes,
            queue_depth: args.queue_depth,
            flush_threshold: args.flush_threshold,
            extract_timeout_ms: args.extract_timeout_ms,
            collector_latency_ms: args.collector_latency_ms,
            url: args.url,
            sources: args.sources,
            state_dir: args.state_dir,
        }
    }
}

fn init_logging(debug: bool, log_file: Option<&PathBuf>) -> Result<()> {
    let log_level = match debug {
        true => "debug",
        false => "info",
    };
    let env = env_logger::Env::default().filter_or("LOG_LEVEL", log_level);
    let mut builder = env_logger::Builder::from_env(env);
    builder.format_timestamp_millis();

    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Cannot open log file: {}", path.display()))?;
        builder
            .write_style(env_logger::WriteStyle::Never)
            .target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let dotenv = dotenvy::from_filename(&cli.env);
    init_logging(cli.debug, cli.log_file.as_ref())?;

    match dotenv {
        Ok(path) => log::debug!("Sourced configuration from {}", path.display()),
        Err(e) if e.not_found() => log::debug!("No dotenv file at {}", cli.env),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", cli.env)),
    }

    let config = EtlConfig::from_env()?;

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            let config = config.apply(args.into())?;
            let summary = cli::run_pipeline(&config).await?;
            if summary.failed_batches() > 0 {
                log::warn!(
                    "{} batch(es) failed to load and will be replayed on the next run",
                    summary.failed_batches().yellow()
                );
            }
        }
        Commands::Health { url } => {
            let config = config.apply(Overrides {
                url,
                ..Overrides::default()
            })?;
            let health = cli::check_health(&config).await?;
            log::info!("Ingestion endpoint status: {}", health.status.green());
        }
        Commands::Pending { state_dir } => {
            let config = config.apply(Overrides {
                state_dir,
                ..Overrides::default()
            })?;
            let pending = cli::list_pending(&config)?;
            if pending.is_empty() {
                log::info!("No failed batches pending");
            }
            for batch in pending {
                match batch.records {
                    Some(count) => log::info!(
                        "{} lane {} sequence {}: {} records",
                        batch.file.file_name().bright_black(),
                        batch.file.lane,
                        batch.file.sequence,
                        count.cyan()
                    ),
                    None => log::warn!(
                        "{} lane {}: unreadable",
                        batch.file.file_name().bright_black(),
                        batch.file.lane
                    ),
                }
            }
        }
    }

    Ok(())
}
