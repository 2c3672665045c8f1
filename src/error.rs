//! Error types for trace processing.
//!
//! Every error here is fatal: the pipeline makes a single pass over a closed
//! file, so there is nothing to retry. Correlations that simply cannot be
//! resolved are not errors and never show up here.

use std::path::PathBuf;

use thiserror::Error;

use crate::classify::Bucket;

#[derive(Debug, Error)]
pub enum TraceError {
    /// Required instrumentation or configuration is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A line classified into a bucket does not match that bucket's grammar.
    #[error("parse error in {bucket} line {line_number}: {reason}\n  {line}")]
    Parse {
        bucket: Bucket,
        line_number: usize,
        line: String,
        reason: String,
    },

    /// The library reported an abort in the kernel trace.
    #[error("collective aborted (line {line_number}): {line}")]
    Aborted { line_number: usize, line: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = TraceError> = std::result::Result<T, E>;
