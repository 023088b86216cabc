mod cache;
mod commands;
mod config;
mod error;
mod net;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "zerodex")]
#[command(about = "Offline response cache for the zerodex game catalog")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/zerodex/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Cache generation to use instead of the configured one
  #[arg(short, long, global = true)]
  generation: Option<String>,

  /// Write logs to this file instead of stderr
  #[arg(long, global = true)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch the manifest and install the cache generation
  Activate,
  /// Resolve requests through the cache
  Fetch(commands::FetchArgs),
  /// Show the cache generation and its stored entries
  Status,
  /// Delete every generation except the active one
  Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(args.log_file.as_deref())?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override generation if specified on command line
  let config = if let Some(generation) = args.generation {
    config::Config {
      generation,
      ..config
    }
  } else {
    config
  };

  let ctx = commands::Context::new(config)?;

  match args.command {
    Command::Activate => commands::activate(&ctx).await,
    Command::Fetch(fetch_args) => commands::fetch(&ctx, fetch_args).await,
    Command::Status => commands::status(&ctx),
    Command::Prune => commands::prune(&ctx),
  }
}

/// Route tracing output to stderr, or to `log_file` when given.
///
/// Filtering comes from `ZERODEX_LOG` (defaults to `zerodex=info`).
fn init_logging(log_file: Option<&Path>) -> Result<WorkerGuard> {
  let filter =
    EnvFilter::try_from_env("ZERODEX_LOG").unwrap_or_else(|_| EnvFilter::new("zerodex=info"));

  let (writer, guard) = match log_file {
    Some(path) => {
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
      tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
    }
    None => tracing_appender::non_blocking(std::io::stderr()),
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(log_file.is_none())
    .init();

  Ok(guard)
}
