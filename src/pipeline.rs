//! End-to-end processing of one trace file.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::classify::classify_text;
use crate::collective::CollectiveTable;
use crate::config::Config;
use crate::correlate::{correlate, CorrelateOptions, GroupReport, TraceMode};
use crate::error::{Result, TraceError};
use crate::grouping::{group_devices, DeviceGroup};
use crate::topology::TopologyTables;

/// Everything derived from one trace.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub mode: TraceMode,
    pub collectives: Arc<CollectiveTable>,
    /// `None` in legacy runs, where topology is not parsed.
    pub topology: Option<TopologyTables>,
    pub groups: Vec<DeviceGroup>,
    pub reports: Vec<GroupReport>,
}

pub fn read_trace(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| TraceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Run the whole pipeline over an in-memory trace.
pub fn analyze_text(text: &str, config: &Config) -> Result<Analysis> {
    config.validate()?;
    let buckets = classify_text(text);

    if !config.legacy && buckets.kernel_trace.is_empty() {
        return Err(TraceError::Configuration(
            "no kernel-trace lines found; trace instrumentation was not enabled \
             (run with RCCL_KERNEL_COLL_TRACE_ENABLE=1)"
                .to_string(),
        ));
    }

    let collectives = Arc::new(CollectiveTable::build(&buckets.collective)?);

    let (topology, groups, forced_mode) = if config.legacy {
        let count = config.device_count.unwrap_or(1);
        tracing::info!(devices = count, "legacy trace, skipping topology");
        (None, vec![DeviceGroup::indexed(count)], Some(TraceMode::Legacy))
    } else {
        let topology = TopologyTables::build(&buckets)?;
        let groups = group_devices(&topology);
        (Some(topology), groups, None)
    };

    let options = CorrelateOptions {
        forced_mode,
        jobs: config.jobs,
    };
    let correlation = correlate(
        &buckets.kernel_trace,
        collectives.clone(),
        &groups,
        &options,
    )?;

    Ok(Analysis {
        mode: correlation.mode,
        collectives,
        topology,
        groups,
        reports: correlation.reports,
    })
}

/// Read `config.trace_path` and run the pipeline over it.
pub fn process_trace(config: &Config) -> Result<Analysis> {
    config.validate()?;
    let text = read_trace(&config.trace_path)?;
    tracing::info!(path = %config.trace_path.display(), bytes = text.len(), "read trace");
    analyze_text(&text, config)
}
