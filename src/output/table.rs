//! Column layout of the per-group time and bandwidth tables.
//!
//! Rows are rendered to plain strings so the same layout feeds CSV files and
//! the terminal summary. An absent device cell renders as an empty string.

use crate::correlate::GroupReport;

/// Header plus string cells of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn headers(report: &GroupReport, trailing: &[&str]) -> Vec<String> {
    let mut headers = vec!["op_id".to_string(), "kernel_name".to_string()];
    headers.extend(report.group.members().iter().cloned());
    headers.extend(trailing.iter().map(|s| s.to_string()));
    headers
}

pub fn time_table(report: &GroupReport) -> RenderedTable {
    let rows = report
        .time_rows
        .iter()
        .map(|row| {
            let mut cells = vec![row.op_id.to_string(), row.kernel_name.clone()];
            cells.extend(row.durations.iter().copied().map(cell));
            cells.push(row.byte_size.to_string());
            cells
        })
        .collect();
    RenderedTable {
        headers: headers(report, &["byte_size"]),
        rows,
    }
}

pub fn bandwidth_table(report: &GroupReport) -> RenderedTable {
    let rows = report
        .bandwidth_rows
        .iter()
        .map(|row| {
            let mut cells = vec![row.op_id.to_string(), row.kernel_name.clone()];
            cells.extend(row.bandwidths.iter().copied().map(cell));
            cells.push(row.byte_size.to_string());
            cells.push(cell(row.alg_bw));
            cells
        })
        .collect();
    RenderedTable {
        headers: headers(report, &["byte_size", "alg_bw"]),
        rows,
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl RenderedTable {
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for line in std::iter::once(&self.headers).chain(self.rows.iter()) {
            let fields: Vec<String> = line.iter().map(|v| csv_field(v)).collect();
            out.push_str(&fields.join(","));
            out.push('\n');
        }
        out
    }
}

const MAX_COLUMN_WIDTH: usize = 40;

/// Aligned, human-readable rendering for the terminal.
pub fn format_table(table: &RenderedTable) -> String {
    if table.rows.is_empty() {
        return "(no results)\n".to_string();
    }

    let mut widths: Vec<usize> = table.headers.iter().map(String::len).collect();
    for row in &table.rows {
        for (i, val) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(val.len());
            }
        }
    }
    for w in &mut widths {
        *w = (*w).min(MAX_COLUMN_WIDTH);
    }

    let render = |cells: &[String]| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let width = widths.get(i).copied().unwrap_or(10);
                let truncated = if v.len() > width && width > 3 {
                    format!("{}...", &v[..width.saturating_sub(3)])
                } else {
                    v.clone()
                };
                format!("{truncated:width$}")
            })
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let mut out = render(&table.headers);
    out.push('\n');
    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&sep.join("-+-"));
    out.push('\n');
    for row in &table.rows {
        out.push_str(&render(row));
        out.push('\n');
    }
    out
}
