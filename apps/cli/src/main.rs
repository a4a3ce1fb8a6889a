//! mlforge CLI - Command-line access to mlforge artifact storage
//!
//! This CLI provides an `mlforge` command for uploading and downloading the
//! artifacts of experiment runs and registered model versions.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::artifact;
use config::ConfigOverrides;

/// mlforge CLI - Artifact transfer for the mlforge platform
#[derive(Parser, Debug)]
#[command(name = "mlforge", author, version, about = "mlforge - artifact transfer for experiment runs and model versions")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Config file to use instead of ~/.mlforge/config.toml and ./.mlforgerc
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Service host (overrides config and MLFORGE_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Account email (overrides config and MLFORGE_EMAIL)
    #[arg(long, global = true)]
    email: Option<String>,

    /// Developer key (overrides config and MLFORGE_DEV_KEY)
    #[arg(long, global = true)]
    dev_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transfer artifacts
    #[command(subcommand)]
    Artifact(ArtifactCommand),
}

/// Entity that owns the artifact.
#[derive(clap::Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct EntityArgs {
    /// Experiment run id
    #[arg(long)]
    pub run: Option<String>,

    /// Model version id
    #[arg(long)]
    pub model_version: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum ArtifactCommand {
    /// Upload a file as an artifact
    ///
    /// Uses a multipart upload when the backend supports it for this
    /// artifact, and a single request otherwise.
    Upload {
        #[command(flatten)]
        target: EntityArgs,

        /// Artifact key
        #[arg(long)]
        key: String,

        /// Multipart part size in bytes (overrides config)
        #[arg(long)]
        part_size: Option<u64>,

        /// Number of parts uploaded concurrently (overrides config)
        #[arg(long)]
        concurrency: Option<usize>,

        /// File to upload
        file: PathBuf,
    },

    /// Download an artifact
    Download {
        #[command(flatten)]
        target: EntityArgs,

        /// Artifact key
        #[arg(long)]
        key: String,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    // stdout may carry artifact bytes
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let overrides = ConfigOverrides { host: args.host, email: args.email, dev_key: args.dev_key };
    let client_config = config::load_config(args.config.as_deref(), &overrides)?;

    match args.command {
        Command::Artifact(command) => artifact::execute(command, client_config).await?,
    }

    Ok(())
}
