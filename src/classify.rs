//! Line classifier.
//!
//! A single scan over the raw log that sorts each line into at most one of six
//! buckets by substring markers. Rules are checked in a fixed priority order,
//! so a line matching several rules lands in the first one. Order within a
//! bucket is the order of the input.

use std::fmt;

use crate::error::TraceError;
use crate::trace::constants::{
    ABORT_TAG, COLLECTIVE_MARKERS, COMMUNICATOR_MARKERS, CONNECTION_MARKERS, COPY_END_TAG,
    KERNEL_END_TAG, KERNEL_LAUNCH_TAG, KERNEL_TRACE_MARKER, RING_MARKER, TREE_MARKER,
};

/// The bucket a classified line was placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Collective,
    Connection,
    Communicator,
    Ring,
    Tree,
    KernelTrace,
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Bucket::Collective => "collective",
            Bucket::Connection => "connection",
            Bucket::Communicator => "communicator",
            Bucket::Ring => "ring",
            Bucket::Tree => "tree",
            Bucket::KernelTrace => "kernel-trace",
        };
        f.write_str(name)
    }
}

/// A retained log line with its 1-based position in the input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLine {
    pub number: usize,
    pub text: String,
}

impl TraceLine {
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }

    pub fn parse_error(&self, bucket: Bucket, reason: impl Into<String>) -> TraceError {
        TraceError::Parse {
            bucket,
            line_number: self.number,
            line: self.text.clone(),
            reason: reason.into(),
        }
    }
}

/// The six line buckets of one trace.
#[derive(Debug, Default, Clone)]
pub struct TraceBuckets {
    pub collective: Vec<TraceLine>,
    pub connection: Vec<TraceLine>,
    pub communicator: Vec<TraceLine>,
    pub ring: Vec<TraceLine>,
    pub tree: Vec<TraceLine>,
    pub kernel_trace: Vec<TraceLine>,
}

impl TraceBuckets {
    pub fn bucket(&self, bucket: Bucket) -> &[TraceLine] {
        match bucket {
            Bucket::Collective => &self.collective,
            Bucket::Connection => &self.connection,
            Bucket::Communicator => &self.communicator,
            Bucket::Ring => &self.ring,
            Bucket::Tree => &self.tree,
            Bucket::KernelTrace => &self.kernel_trace,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<TraceLine> {
        match bucket {
            Bucket::Collective => &mut self.collective,
            Bucket::Connection => &mut self.connection,
            Bucket::Communicator => &mut self.communicator,
            Bucket::Ring => &mut self.ring,
            Bucket::Tree => &mut self.tree,
            Bucket::KernelTrace => &mut self.kernel_trace,
        }
    }
}

fn contains_all(line: &str, markers: &[&str]) -> bool {
    markers.iter().all(|m| line.contains(m))
}

fn is_kernel_trace(line: &str) -> bool {
    line.contains(KERNEL_TRACE_MARKER)
        && [KERNEL_LAUNCH_TAG, KERNEL_END_TAG, COPY_END_TAG, ABORT_TAG]
            .iter()
            .any(|tag| line.contains(tag))
}

/// Decide which bucket a line belongs to, if any.
pub fn classify_line(line: &str) -> Option<Bucket> {
    if contains_all(line, &COLLECTIVE_MARKERS) {
        Some(Bucket::Collective)
    } else if contains_all(line, &CONNECTION_MARKERS) {
        Some(Bucket::Connection)
    } else if contains_all(line, &COMMUNICATOR_MARKERS) {
        Some(Bucket::Communicator)
    } else if line.contains(RING_MARKER) {
        Some(Bucket::Ring)
    } else if line.contains(TREE_MARKER) {
        Some(Bucket::Tree)
    } else if is_kernel_trace(line) {
        Some(Bucket::KernelTrace)
    } else {
        None
    }
}

/// Some library versions print `[ 6628.064978]`; the space breaks
/// positional token lookup, so drop it.
fn normalize_kernel_trace(line: &str) -> String {
    line.replace("[ ", "[")
}

/// Sort lines into buckets.
pub fn classify_lines<'a, I>(lines: I) -> TraceBuckets
where
    I: IntoIterator<Item = &'a str>,
{
    let mut buckets = TraceBuckets::default();
    for (idx, raw) in lines.into_iter().enumerate() {
        let line = raw.trim_end();
        let Some(bucket) = classify_line(line) else {
            continue;
        };
        let text = if bucket == Bucket::KernelTrace {
            normalize_kernel_trace(line)
        } else {
            line.to_string()
        };
        buckets.bucket_mut(bucket).push(TraceLine::new(idx + 1, text));
    }

    tracing::debug!(
        collective = buckets.collective.len(),
        connection = buckets.connection.len(),
        communicator = buckets.communicator.len(),
        ring = buckets.ring.len(),
        tree = buckets.tree.len(),
        kernel_trace = buckets.kernel_trace.len(),
        "classified trace lines"
    );
    buckets
}

/// Classify a whole file that has already been read into memory.
pub fn classify_text(text: &str) -> TraceBuckets {
    classify_lines(text.lines())
}
