//! colltrace: per-collective timing and bandwidth from RCCL/NCCL debug traces
//!
//! Reads a log captured with `NCCL_DEBUG=INFO` and
//! `RCCL_KERNEL_COLL_TRACE_ENABLE=1` and writes one time table and one
//! bandwidth table per device group.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use colltrace::{format_summary, process_trace, Config, OutputFormat, ReportWriter};

#[derive(Parser, Debug)]
#[command(name = "colltrace")]
#[command(about = "Reconstruct collective timing and bandwidth from RCCL/NCCL traces")]
#[command(version)]
struct Cli {
    /// Path to the trace log
    #[arg(short, long)]
    trace: PathBuf,

    /// Trace from a library without topology logging
    #[arg(long, requires = "num_devices")]
    legacy: bool,

    /// Number of devices in a legacy trace
    #[arg(short = 'n', long)]
    num_devices: Option<usize>,

    /// Directory for the generated tables
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Format of the generated tables
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Worker threads for group aggregation
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = Config {
        trace_path: cli.trace,
        legacy: cli.legacy,
        device_count: cli.num_devices,
        output_dir: cli.output_dir,
        format: cli.format,
        jobs: cli.jobs,
    };

    let analysis = process_trace(&config)?;
    let mut writer = ReportWriter::new(&config.output_dir, config.format)?;
    writer.write_analysis(&analysis)?;
    tracing::info!(
        groups = analysis.groups.len(),
        files = writer.written().len(),
        dir = %config.output_dir.display(),
        "reports written"
    );

    print!("{}", format_summary(&analysis));
    Ok(())
}
