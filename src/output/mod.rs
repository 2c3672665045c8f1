//! Report emitter.
//!
//! Writes the artifacts of one run into an output directory:
//!
//! - `time_<i>.{csv,json}` and `bw_<i>.{csv,json}` per device group
//! - `device_groups.txt`, one group per line
//! - `topo_<i>.txt` and `rank_map_<i>.json` per group, when topology was parsed
//!
//! The rank maps are the input of the label-rewrite tool.

mod table;

pub use table::{bandwidth_table, format_table, time_table, RenderedTable};

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::OutputFormat;
use crate::correlate::{BandwidthRow, GroupReport, TimeRow};
use crate::grouping::DeviceGroup;
use crate::pipeline::Analysis;

pub const DEVICE_GROUPS_FILE: &str = "device_groups.txt";

#[derive(Serialize)]
struct JsonTable<'a, R> {
    devices: &'a DeviceGroup,
    rows: &'a [R],
}

fn json_table<R: Serialize>(devices: &DeviceGroup, rows: &[R]) -> Result<String> {
    Ok(serde_json::to_string_pretty(&JsonTable { devices, rows })?)
}

/// Writes run artifacts into a directory.
pub struct ReportWriter {
    dir: PathBuf,
    format: OutputFormat,
    written: Vec<PathBuf>,
}

impl ReportWriter {
    pub fn new(dir: &Path, format: OutputFormat) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            format,
            written: Vec::new(),
        })
    }

    fn write_file(&mut self, name: &str, contents: &str) -> Result<()> {
        let path = self.dir.join(name);
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!(path = %path.display(), "wrote artifact");
        self.written.push(path);
        Ok(())
    }

    /// Time and bandwidth tables of group `index`.
    pub fn write_report(&mut self, index: usize, report: &GroupReport) -> Result<()> {
        let ext = self.format.extension();
        let (time, bw) = match self.format {
            OutputFormat::Csv => (
                time_table(report).to_csv(),
                bandwidth_table(report).to_csv(),
            ),
            OutputFormat::Json => (
                json_table::<TimeRow>(&report.group, &report.time_rows)?,
                json_table::<BandwidthRow>(&report.group, &report.bandwidth_rows)?,
            ),
        };
        self.write_file(&format!("time_{index}.{ext}"), &time)?;
        self.write_file(&format!("bw_{index}.{ext}"), &bw)
    }

    pub fn write_groups(&mut self, groups: &[DeviceGroup]) -> Result<()> {
        let listing: String = groups.iter().map(|g| format!("{g}\n")).collect();
        self.write_file(DEVICE_GROUPS_FILE, &listing)
    }

    /// Everything derived from `analysis`.
    pub fn write_analysis(&mut self, analysis: &Analysis) -> Result<()> {
        self.write_groups(&analysis.groups)?;
        for (i, report) in analysis.reports.iter().enumerate() {
            self.write_report(i, report)?;
        }

        if let Some(topology) = &analysis.topology {
            for (i, group) in analysis.groups.iter().enumerate() {
                let mut text = topology.topology_lines(group).join("\n");
                if !text.is_empty() {
                    text.push('\n');
                }
                self.write_file(&format!("topo_{i}.txt"), &text)?;
                let map = serde_json::to_string_pretty(&topology.rank_map(group))?;
                self.write_file(&format!("rank_map_{i}.json"), &map)?;
            }
        }
        Ok(())
    }

    /// Paths written so far, in order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

/// Terminal summary of every group's bandwidth table.
pub fn format_summary(analysis: &Analysis) -> String {
    let mut out = String::new();
    for (i, report) in analysis.reports.iter().enumerate() {
        out.push_str(&format!("Group {i}: {}\n", report.group));
        out.push_str(&format_table(&bandwidth_table(report)));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::collective::CollectiveTable;
    use crate::correlate::TraceMode;

    fn analysis() -> Analysis {
        let group = DeviceGroup::from_members(["3000", "43000"]);
        Analysis {
            mode: TraceMode::Modern,
            collectives: Arc::new(CollectiveTable::default()),
            topology: None,
            groups: vec![group.clone()],
            reports: vec![GroupReport {
                group,
                time_rows: vec![TimeRow {
                    op_id: 1,
                    kernel_name: "k".to_string(),
                    durations: vec![Some(1.0), None],
                    byte_size: 8,
                }],
                bandwidth_rows: vec![BandwidthRow {
                    op_id: 1,
                    kernel_name: "k".to_string(),
                    bandwidths: vec![Some(8e-9), None],
                    byte_size: 8,
                    alg_bw: Some(8e-9),
                }],
            }],
        }
    }

    #[test]
    fn test_write_csv() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut writer = ReportWriter::new(dir.path(), OutputFormat::Csv).unwrap();
        writer.write_analysis(&analysis()).unwrap();
        assert_eq!(writer.written().len(), 3);

        let groups = fs::read_to_string(dir.path().join(DEVICE_GROUPS_FILE)).unwrap();
        assert_eq!(groups, "{3000, 43000}\n");
        let time = fs::read_to_string(dir.path().join("time_0.csv")).unwrap();
        assert!(time.starts_with("op_id,kernel_name,3000,43000,byte_size\n"));
        assert!(dir.path().join("bw_0.csv").exists());
    }

    #[test]
    fn test_write_json() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut writer = ReportWriter::new(dir.path(), OutputFormat::Json).unwrap();
        writer.write_analysis(&analysis()).unwrap();

        let bw = fs::read_to_string(dir.path().join("bw_0.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&bw).unwrap();
        assert_eq!(value["devices"], serde_json::json!(["3000", "43000"]));
        assert_eq!(value["rows"][0]["op_id"], 1);
        assert!(value["rows"][0]["bandwidths"][1].is_null());
    }

    #[test]
    fn test_creates_nested_dir() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let nested = dir.path().join("a/b");
        let mut writer = ReportWriter::new(&nested, OutputFormat::Csv).unwrap();
        writer.write_groups(&[]).unwrap();
        assert!(nested.join(DEVICE_GROUPS_FILE).exists());
    }

    #[test]
    fn test_summary_lists_groups() {
        let summary = format_summary(&analysis());
        assert!(summary.starts_with("Group 0: {3000, 43000}\n"));
        assert!(summary.contains("alg_bw"));
    }
}
