//! Resolved run configuration.

use std::path::PathBuf;

use crate::error::{Result, TraceError};

/// Format of the per-group tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

/// Everything a run needs, already parsed from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub trace_path: PathBuf,
    /// Trace from a library without topology logging. Grouping is skipped
    /// and a single group of `device_count` devices is assumed.
    pub legacy: bool,
    pub device_count: Option<usize>,
    pub output_dir: PathBuf,
    pub format: OutputFormat,
    /// Worker threads for group aggregation.
    pub jobs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trace_path: PathBuf::new(),
            legacy: false,
            device_count: None,
            output_dir: PathBuf::from("."),
            format: OutputFormat::Csv,
            jobs: 1,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.trace_path.as_os_str().is_empty() {
            return Err(TraceError::Configuration(
                "a trace path is required".to_string(),
            ));
        }
        if self.legacy {
            match self.device_count {
                None => {
                    return Err(TraceError::Configuration(
                        "legacy mode requires a device count".to_string(),
                    ))
                }
                Some(0) => {
                    return Err(TraceError::Configuration(
                        "device count must be at least 1".to_string(),
                    ))
                }
                Some(_) => {}
            }
        }
        if self.jobs == 0 {
            return Err(TraceError::Configuration(
                "jobs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
