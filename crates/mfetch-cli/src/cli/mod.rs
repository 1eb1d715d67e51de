//! CLI for the mfetch multi-source fetcher.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mfetch_core::config::{self, FetchConfig};
use std::path::{Path, PathBuf};

use commands::{run_fetch, run_probe, run_sources};

/// Top-level CLI for mfetch.
#[derive(Debug, Parser)]
#[command(name = "mfetch")]
#[command(about = "mfetch: adaptive multi-source chunked fetcher", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/mfetch/config.toml.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch a file from all configured sources, chunk by chunk.
    Fetch {
        /// Path of the file on every source (appended to each source host).
        path: String,
        /// File size in bytes; discovered with HEAD when omitted.
        #[arg(long, value_name = "BYTES")]
        size: Option<u64>,
        /// Override the configured chunk size for this run.
        #[arg(long, value_name = "BYTES")]
        chunk_size: Option<u64>,
        /// Override the configured worker count for this run.
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },

    /// List configured sources.
    Sources,

    /// HEAD the path on every source and report size and range support.
    Probe {
        /// Path of the file on every source.
        path: String,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = load_config(cli.config.as_deref())?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Fetch {
                path,
                size,
                chunk_size,
                workers,
            } => {
                let cfg = apply_overrides(cfg, chunk_size, workers);
                run_fetch(cfg, &path, size).await?;
            }
            CliCommand::Sources => run_sources(&cfg),
            CliCommand::Probe { path } => run_probe(&cfg, &path).await?,
        }

        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<FetchConfig> {
    match path {
        Some(p) => config::load_from_path(p),
        None => config::load_or_init(),
    }
}

/// One-run overrides from the command line; validation happens in the manager.
pub(crate) fn apply_overrides(
    mut cfg: FetchConfig,
    chunk_size: Option<u64>,
    workers: Option<usize>,
) -> FetchConfig {
    if let Some(n) = chunk_size {
        cfg.chunk_size = n;
    }
    if let Some(n) = workers {
        cfg.worker_count = n;
    }
    cfg
}
