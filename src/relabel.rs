//! Rewrite rank labels in a topology visualization description.
//!
//! Graph descriptions produced from the topology lines label nodes with rank
//! numbers. Every line carrying a `fontsize` attribute has its first quoted
//! label replaced by the mapped device identity, usually a bus id taken from
//! a `rank_map_<i>.json` file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::trace::constants::QUOTED_LABEL_RE;

const LABEL_LINE_MARKER: &str = "fontsize";

/// Relabel one line. Lines without a marker, without a quoted label, or
/// whose label has no mapping are returned unchanged.
pub fn relabel_line(line: &str, mapping: &HashMap<String, String>) -> String {
    if !line.contains(LABEL_LINE_MARKER) {
        return line.to_string();
    }
    let Some(caps) = QUOTED_LABEL_RE.captures(line) else {
        return line.to_string();
    };
    let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
        return line.to_string();
    };
    match mapping.get(label.as_str()) {
        Some(device) => format!(
            "{}\"{}\"{}",
            &line[..whole.start()],
            device,
            &line[whole.end()..]
        ),
        None => {
            tracing::warn!(label = label.as_str(), "no device mapping for label");
            line.to_string()
        }
    }
}

/// Relabel a whole description, keeping line endings.
pub fn relabel_text(text: &str, mapping: &HashMap<String, String>) -> String {
    text.split_inclusive('\n')
        .map(|chunk| {
            let (body, ending) = match chunk.strip_suffix('\n') {
                Some(body) => (body, "\n"),
                None => (chunk, ""),
            };
            relabel_line(body, mapping) + ending
        })
        .collect()
}

/// Load a rank map written by the report emitter.
pub fn load_mapping(path: &Path) -> Result<HashMap<String, String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read mapping {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse mapping {}", path.display()))
}

pub fn relabel_file(input: &Path, output: &Path, mapping: &HashMap<String, String>) -> Result<()> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    fs::write(output, relabel_text(&text, mapping))
        .with_context(|| format!("Failed to write {}", output.display()))
}
