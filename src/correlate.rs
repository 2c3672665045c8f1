//! Kernel trace correlator.
//!
//! Kernel-trace lines look like
//!
//! ```text
//! host:1:9 [0] NCCL INFO ## [488201.944851] [03:00] 000001 KL HWID 433025b0 BroadcastRingSimpleSum_i8 nt 256 bi 0 nc 4 busId 3000 nRanks 4
//! host:1:9 [0] NCCL INFO ## [488201.974056] [03:02] 000001 KE busId 3000 nRanks 4
//! ```
//!
//! Older library versions omit `busId`/`nRanks`; those traces are keyed by
//! rank instead. The format is picked once, from the first retained event,
//! and every later line is keyed the same way.
//!
//! Pass 1 ([`EventFold::build`]) folds events into an immutable map of
//! earliest launch and latest end per key. Pass 2 ([`aggregate_group`]) joins
//! that map with each device group and the collective table.

use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::channel;
use std::sync::Arc;

use serde::Serialize;
use workerpool::thunk::{Thunk, ThunkWorker};
use workerpool::Pool;

use crate::classify::{Bucket, TraceLine};
use crate::collective::CollectiveTable;
use crate::error::{Result, TraceError};
use crate::grouping::DeviceGroup;
use crate::trace::constants::{
    ABORT_TAG, COPY_END_TOKEN, KERNEL_END_TOKEN, KW_BUS_ID, KW_NRANKS_CAMEL, LAUNCH_TOKEN,
    RANK_BLOCK_RE, TIMESTAMP_RE,
};
use crate::trace::tokens::{parse_dec, parse_hex};
use crate::trace::{EventKind, LineTokens, TraceEvent};

/// Bandwidths are reported in GB/s.
const BYTES_PER_GB: f64 = 1e9;

/// Which device identity kernel events carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TraceMode {
    /// Events carry `busId` and `nRanks`.
    Modern,
    /// Events only carry the rank (RCCL 2.8 and older).
    Legacy,
}

impl TraceMode {
    pub fn of_event(event: &TraceEvent) -> Self {
        if event.bus_id.is_some() {
            TraceMode::Modern
        } else {
            TraceMode::Legacy
        }
    }
}

/// Identity of one device's participation in one operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    Modern {
        op_id: u64,
        bus_id: String,
        group_size: u32,
    },
    Legacy {
        op_id: u64,
        device: u32,
    },
}

impl CorrelationKey {
    /// Key of an event under `mode`. A modern-mode event without a bus id has
    /// no key.
    pub fn for_event(mode: TraceMode, event: &TraceEvent) -> Option<Self> {
        match mode {
            TraceMode::Modern => Some(CorrelationKey::Modern {
                op_id: event.op_id,
                bus_id: event.bus_id.clone()?,
                group_size: event.group_size?,
            }),
            TraceMode::Legacy => Some(CorrelationKey::Legacy {
                op_id: event.op_id,
                device: event.rank,
            }),
        }
    }

    /// Key of the `index`th member of `group`. Legacy traces have no bus id,
    /// so the position in the group stands in for the rank.
    pub fn for_member(mode: TraceMode, op_id: u64, group: &DeviceGroup, index: usize) -> Self {
        match mode {
            TraceMode::Modern => CorrelationKey::Modern {
                op_id,
                bus_id: group.members()[index].clone(),
                group_size: group.len() as u32,
            },
            TraceMode::Legacy => CorrelationKey::Legacy {
                op_id,
                device: index as u32,
            },
        }
    }
}

/// Earliest launch and latest end observed for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Span {
    pub launch: Option<f64>,
    pub end: Option<f64>,
}

impl Span {
    fn observe(&mut self, kind: EventKind, ts: f64) {
        match kind {
            EventKind::Launch => {
                self.launch = Some(self.launch.map_or(ts, |t| t.min(ts)));
            }
            // Compute end and copy end both close the window.
            EventKind::ComputeEnd | EventKind::CopyEnd => {
                self.end = Some(self.end.map_or(ts, |t| t.max(ts)));
            }
        }
    }

    /// `(launch, end)` if both sides were seen.
    pub fn complete(&self) -> Option<(f64, f64)> {
        Some((self.launch?, self.end?))
    }
}

fn event_tag(tokens: &LineTokens<'_>) -> Option<(usize, EventKind)> {
    (0..tokens.len()).find_map(|i| match tokens.get(i)? {
        LAUNCH_TOKEN if tokens.get(i + 1) == Some("HWID") => Some((i, EventKind::Launch)),
        KERNEL_END_TOKEN => Some((i, EventKind::ComputeEnd)),
        COPY_END_TOKEN => Some((i, EventKind::CopyEnd)),
        _ => None,
    })
}

fn before(tokens: &LineTokens<'_>, tag: usize, back: usize, what: &str) -> Result<String, String> {
    tag.checked_sub(back)
        .and_then(|i| tokens.get(i))
        .map(str::to_string)
        .ok_or_else(|| format!("missing {what} before event tag"))
}

/// Event kind and operation id of a kernel-trace line.
fn parse_head(tokens: &LineTokens<'_>) -> Result<(usize, EventKind, u64), String> {
    let (tag, kind) = event_tag(tokens).ok_or("no KL/KE/CE event tag")?;
    let op_id = parse_hex("opCount", &before(tokens, tag, 1, "opCount")?)?;
    Ok((tag, kind, op_id))
}

fn parse_body(
    tokens: &LineTokens<'_>,
    tag: usize,
    kind: EventKind,
    op_id: u64,
) -> Result<TraceEvent, String> {
    let ts_token = before(tokens, tag, 3, "timestamp")?;
    let timestamp = TIMESTAMP_RE
        .captures(&ts_token)
        .and_then(|c| c[1].parse::<f64>().ok())
        .ok_or_else(|| format!("malformed timestamp `{ts_token}`"))?;

    let rb_token = before(tokens, tag, 2, "rank:block")?;
    let caps = RANK_BLOCK_RE
        .captures(&rb_token)
        .ok_or_else(|| format!("malformed rank:block `{rb_token}`"))?;
    let rank = parse_dec("rank", &caps[1])?;
    let block_id = parse_dec("block", &caps[2])?;

    let bus_id = tokens.after(KW_BUS_ID).map(str::to_string);
    let group_size = match bus_id {
        Some(_) => Some(parse_dec(
            KW_NRANKS_CAMEL,
            tokens.require(KW_NRANKS_CAMEL)?,
        )?),
        None => None,
    };

    // KL HWID <hwid> <kernel name>
    let kernel_name = match kind {
        EventKind::Launch => Some(
            tokens
                .get(tag + 3)
                .ok_or("missing kernel name after HWID")?
                .to_string(),
        ),
        _ => None,
    };

    Ok(TraceEvent {
        kind,
        timestamp,
        rank,
        block_id,
        op_id,
        bus_id,
        group_size,
        kernel_name,
    })
}

/// Parse a kernel-trace line into an event.
pub fn parse_trace_event(line: &TraceLine) -> Result<TraceEvent> {
    let tokens = LineTokens::new(&line.text);
    parse_head(&tokens)
        .and_then(|(tag, kind, op_id)| parse_body(&tokens, tag, kind, op_id))
        .map_err(|r| line.parse_error(Bucket::KernelTrace, r))
}

/// Result of pass 1: a finalized, read-only view of the kernel trace.
#[derive(Debug, Clone)]
pub struct EventFold {
    mode: TraceMode,
    spans: HashMap<CorrelationKey, Span>,
    kernel_names: BTreeMap<u64, String>,
    devices: Vec<String>,
    unkeyed: usize,
    discarded: usize,
}

impl EventFold {
    /// Fold every retained event of the kernel-trace bucket.
    ///
    /// Lines whose operation is not in `table` are discarded. An abort line
    /// anywhere in the bucket fails the whole run. `forced_mode` overrides
    /// format detection.
    pub fn build(
        lines: &[TraceLine],
        table: &CollectiveTable,
        forced_mode: Option<TraceMode>,
    ) -> Result<Self> {
        let mut mode = forced_mode;
        let mut spans: HashMap<CorrelationKey, Span> = HashMap::new();
        let mut kernel_names = BTreeMap::new();
        let mut devices: Vec<String> = Vec::new();
        let mut unkeyed = 0;
        let mut discarded = 0;

        if let Some(line) = lines.iter().find(|l| l.text.contains(ABORT_TAG)) {
            return Err(TraceError::Aborted {
                line_number: line.number,
                line: line.text.clone(),
            });
        }

        for line in lines {
            let tokens = LineTokens::new(&line.text);
            let (tag, kind, op_id) =
                parse_head(&tokens).map_err(|r| line.parse_error(Bucket::KernelTrace, r))?;
            if !table.contains_op(op_id) {
                discarded += 1;
                continue;
            }
            let event = parse_body(&tokens, tag, kind, op_id)
                .map_err(|r| line.parse_error(Bucket::KernelTrace, r))?;

            let current = *mode.get_or_insert_with(|| {
                let detected = TraceMode::of_event(&event);
                tracing::info!(mode = ?detected, line = line.number, "detected kernel trace format");
                detected
            });

            let Some(key) = CorrelationKey::for_event(current, &event) else {
                tracing::debug!(line = line.number, "event has no bus id in modern trace");
                unkeyed += 1;
                continue;
            };

            spans
                .entry(key)
                .or_default()
                .observe(event.kind, event.timestamp);

            let device = match current {
                TraceMode::Modern => event.bus_id.clone().unwrap_or_default(),
                TraceMode::Legacy => event.rank.to_string(),
            };
            if !devices.contains(&device) {
                devices.push(device);
            }

            if let Some(name) = event.kernel_name {
                kernel_names.entry(op_id).or_insert(name);
            }
        }

        if unkeyed > 0 {
            tracing::warn!(unkeyed, "kernel events without a bus id could not be keyed");
        }
        tracing::info!(
            keys = spans.len(),
            ops = kernel_names.len(),
            devices = devices.len(),
            discarded,
            "folded kernel trace"
        );

        Ok(Self {
            mode: mode.unwrap_or(TraceMode::Modern),
            spans,
            kernel_names,
            devices,
            unkeyed,
            discarded,
        })
    }

    pub fn mode(&self) -> TraceMode {
        self.mode
    }

    pub fn span(&self, key: &CorrelationKey) -> Option<&Span> {
        self.spans.get(key)
    }

    /// Kernel name of every launched operation, ascending by op id.
    pub fn kernel_names(&self) -> &BTreeMap<u64, String> {
        &self.kernel_names
    }

    /// Device identities in order of first appearance.
    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    /// Events dropped because they could not be keyed under the trace mode.
    pub fn unkeyed(&self) -> usize {
        self.unkeyed
    }

    /// Lines dropped because their operation is not in the collective table.
    pub fn discarded(&self) -> usize {
        self.discarded
    }
}

/// One row of a group's time table. `durations` has one cell per group
/// member; `None` means the member never produced both a launch and an end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRow {
    pub op_id: u64,
    pub kernel_name: String,
    pub durations: Vec<Option<f64>>,
    pub byte_size: u64,
}

/// One row of a group's bandwidth table, in GB/s.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandwidthRow {
    pub op_id: u64,
    pub kernel_name: String,
    pub bandwidths: Vec<Option<f64>>,
    pub byte_size: u64,
    pub alg_bw: Option<f64>,
}

/// Time and bandwidth tables of one device group, ascending by op id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReport {
    pub group: DeviceGroup,
    pub time_rows: Vec<TimeRow>,
    pub bandwidth_rows: Vec<BandwidthRow>,
}

fn bandwidth(scaled_units: f64, seconds: f64) -> Option<f64> {
    (seconds > 0.0).then(|| scaled_units / seconds / BYTES_PER_GB)
}

/// Pass 2 for a single group.
pub fn aggregate_group(
    fold: &EventFold,
    table: &CollectiveTable,
    group: &DeviceGroup,
) -> GroupReport {
    let mut time_rows = Vec::new();
    let mut bandwidth_rows = Vec::new();
    let group_size = group.len() as u32;

    for (&op_id, kernel_name) in fold.kernel_names() {
        let spans: Vec<Option<(f64, f64)>> = (0..group.len())
            .map(|i| {
                fold.span(&CorrelationKey::for_member(fold.mode(), op_id, group, i))
                    .and_then(Span::complete)
            })
            .collect();

        let present: Vec<(f64, f64)> = spans.iter().flatten().copied().collect();
        if present.is_empty() {
            continue;
        }

        let Some(size) = table.max_size(op_id, group_size) else {
            tracing::warn!(
                op_id,
                group_size,
                "operation traced but not logged for this group size"
            );
            continue;
        };

        let start = present.iter().map(|s| s.0).fold(f64::INFINITY, f64::min);
        let end = present.iter().map(|s| s.1).fold(f64::NEG_INFINITY, f64::max);

        let durations: Vec<Option<f64>> = spans
            .iter()
            .map(|s| s.map(|(launch, end)| end - launch))
            .collect();
        let bandwidths = durations
            .iter()
            .map(|d| d.and_then(|d| bandwidth(size.scaled_units, d)))
            .collect();

        time_rows.push(TimeRow {
            op_id,
            kernel_name: kernel_name.clone(),
            durations,
            byte_size: size.byte_size,
        });
        bandwidth_rows.push(BandwidthRow {
            op_id,
            kernel_name: kernel_name.clone(),
            bandwidths,
            byte_size: size.byte_size,
            alg_bw: bandwidth(size.scaled_units, end - start),
        });
    }

    tracing::debug!(group = %group, rows = time_rows.len(), "aggregated group");
    GroupReport {
        group: group.clone(),
        time_rows,
        bandwidth_rows,
    }
}

/// Pass 2 over all groups, in group order.
pub fn aggregate(
    fold: &EventFold,
    table: &CollectiveTable,
    groups: &[DeviceGroup],
) -> Vec<GroupReport> {
    groups
        .iter()
        .map(|g| aggregate_group(fold, table, g))
        .collect()
}

/// Pass 2 with groups spread over `jobs` worker threads. The result is the
/// same as [`aggregate`].
pub fn aggregate_parallel(
    fold: Arc<EventFold>,
    table: Arc<CollectiveTable>,
    groups: &[DeviceGroup],
    jobs: usize,
) -> Vec<GroupReport> {
    if jobs <= 1 || groups.len() <= 1 {
        return aggregate(&fold, &table, groups);
    }

    let pool = Pool::<ThunkWorker<(usize, GroupReport)>>::new(jobs.min(groups.len()));
    let (tx, rx) = channel();
    for (i, group) in groups.iter().enumerate() {
        let fold = fold.clone();
        let table = table.clone();
        let group = group.clone();
        pool.execute_to(
            tx.clone(),
            Thunk::of(move || (i, aggregate_group(&fold, &table, &group))),
        );
    }

    let mut reports: Vec<(usize, GroupReport)> = rx.iter().take(groups.len()).collect();
    reports.sort_by_key(|(i, _)| *i);
    reports.into_iter().map(|(_, r)| r).collect()
}

/// Options for [`correlate`].
#[derive(Debug, Clone, Default)]
pub struct CorrelateOptions {
    /// Skip format detection and key events this way.
    pub forced_mode: Option<TraceMode>,
    /// Worker threads for pass 2; 0 or 1 runs inline.
    pub jobs: usize,
}

/// Output of [`correlate`].
#[derive(Debug, Clone)]
pub struct Correlation {
    pub mode: TraceMode,
    /// Device identities seen in the kernel trace, in order of appearance.
    pub devices: Vec<String>,
    pub reports: Vec<GroupReport>,
}

/// Both passes over the kernel-trace bucket.
pub fn correlate(
    lines: &[TraceLine],
    table: Arc<CollectiveTable>,
    groups: &[DeviceGroup],
    options: &CorrelateOptions,
) -> Result<Correlation> {
    let fold = Arc::new(EventFold::build(lines, &table, options.forced_mode)?);
    let mode = fold.mode();
    let devices = fold.devices().to_vec();
    let reports = aggregate_parallel(fold, table, groups, options.jobs);
    Ok(Correlation {
        mode,
        devices,
        reports,
    })
}
