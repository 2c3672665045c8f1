//! colltrace-relabel: replace rank labels in a topology graph with device ids
//!
//! Takes a `rank_map_<i>.json` written by colltrace and a graph description
//! whose node lines carry a `fontsize` attribute.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use colltrace::relabel::{load_mapping, relabel_file};

#[derive(Parser)]
#[command(name = "colltrace-relabel")]
#[command(about = "Rewrite rank labels in a topology graph")]
#[command(version)]
struct Cli {
    /// JSON object mapping rank labels to device ids
    #[arg(short, long)]
    mapping: PathBuf,

    /// Graph description to rewrite
    #[arg(short, long)]
    input: PathBuf,

    /// Destination of the rewritten description
    #[arg(short, long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if !cli.input.exists() {
        bail!("Input not found: {}", cli.input.display());
    }
    let mapping = load_mapping(&cli.mapping)?;
    relabel_file(&cli.input, &cli.output, &mapping)
}
