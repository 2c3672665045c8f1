//! colltrace library - shared modules for the colltrace and colltrace-relabel binaries.
//!
//! Reconstructs per-collective timing and bandwidth from the debug log of an
//! RCCL/NCCL run with kernel tracing enabled. A run classifies every line,
//! builds the collective table, recovers device groups from the logged
//! topology, and correlates kernel launch and end events per device.
//!
//! # Modules
//!
//! - [`classify`] - Sorting trace lines into buckets
//! - [`collective`] - Collective op table and size scaling
//! - [`topology`] - Connection, communicator, ring and tree lines
//! - [`grouping`] - Device groups from the connection graph
//! - [`correlate`] - Kernel event folding and per-group aggregation
//! - [`pipeline`] - End-to-end processing of a trace file
//! - [`output`] - Report files and terminal summary
//! - [`relabel`] - Rank label rewriting for topology graphs
//!
//! # Example
//!
//! ```no_run
//! use colltrace::{process_trace, Config, OutputFormat, ReportWriter};
//! use std::path::{Path, PathBuf};
//!
//! let config = Config {
//!     trace_path: PathBuf::from("./rccl.log"),
//!     ..Config::default()
//! };
//! let analysis = process_trace(&config).expect("Failed to process trace");
//!
//! let mut writer = ReportWriter::new(Path::new("./out"), OutputFormat::Csv)
//!     .expect("Failed to create output directory");
//! writer.write_analysis(&analysis).expect("Failed to write reports");
//! ```

pub mod classify;
pub mod collective;
pub mod config;
pub mod correlate;
pub mod error;
pub mod grouping;
pub mod output;
pub mod pipeline;
pub mod relabel;
pub mod topology;
pub mod trace;

// Re-export for convenience
pub use config::{Config, OutputFormat};
pub use error::TraceError;
pub use grouping::DeviceGroup;
pub use output::{format_summary, ReportWriter};
pub use pipeline::{analyze_text, process_trace, Analysis};
