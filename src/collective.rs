//! Collective table builder.
//!
//! Parses collective-argument lines such as
//!
//! ```text
//! host:116274:116274 [1] NCCL INFO Broadcast: opCount 49cd sendbuff 0x7f10ce1c0000 recvbuff 0x7f10ce1c0000 count 12582912 datatype 0 op 0 root 0 comm 0x7f1640000eb0 [nranks=4] stream 0x55e2df89c270
//! ```
//!
//! into [`CollectiveOpRecord`]s and deduplicates them on `(op_id, byte_size)`.

use std::collections::HashSet;

use crate::classify::{Bucket, TraceLine};
use crate::error::Result;
use crate::trace::constants::{
    KW_COMM, KW_COUNT, KW_DATATYPE, KW_NRANKS_BRACKETED, KW_OP, KW_OP_COUNT, KW_ROOT,
};
use crate::trace::tokens::{parse_dec, parse_hex};
use crate::trace::{CollectiveOpRecord, CollectiveType, DataType, LineTokens, ReductionOp};

/// Per-participant data volume of a collective relative to its buffer size,
/// using the ring lower bound.
pub fn collective_factor(collective: CollectiveType, group_size: u32) -> f64 {
    let n = f64::from(group_size);
    match collective {
        CollectiveType::AllGather | CollectiveType::ReduceScatter => (n - 1.0) / n,
        CollectiveType::AllReduce | CollectiveType::AllToAll => 2.0 * (n - 1.0) / n,
        _ => 1.0,
    }
}

fn parse_fields(tokens: &LineTokens<'_>) -> std::result::Result<CollectiveOpRecord, String> {
    let op_pos = tokens
        .position(KW_OP_COUNT)
        .ok_or_else(|| format!("missing keyword `{KW_OP_COUNT}`"))?;
    let type_token = op_pos
        .checked_sub(1)
        .and_then(|i| tokens.get(i))
        .ok_or("missing collective name before `opCount`")?;
    let collective: CollectiveType = type_token.trim_end_matches(':').parse()?;

    let op_id = parse_hex(KW_OP_COUNT, tokens.require(KW_OP_COUNT)?)?;
    let element_count: u64 = parse_dec(KW_COUNT, tokens.require(KW_COUNT)?)?;
    let dt_code: u32 = parse_dec(KW_DATATYPE, tokens.require(KW_DATATYPE)?)?;
    let data_type =
        DataType::from_code(dt_code).ok_or_else(|| format!("unsupported datatype {dt_code}"))?;
    let reduction_op = ReductionOp::from_code(parse_dec(KW_OP, tokens.require(KW_OP)?)?);
    let root: u32 = parse_dec(KW_ROOT, tokens.require(KW_ROOT)?)?;
    let comm = tokens.require(KW_COMM)?.to_string();

    let nranks_token = tokens
        .starting_with(KW_NRANKS_BRACKETED)
        .ok_or_else(|| format!("missing `{KW_NRANKS_BRACKETED}N]` token"))?;
    let group_size: u32 = parse_dec(
        "nranks",
        nranks_token
            .trim_start_matches(KW_NRANKS_BRACKETED)
            .trim_end_matches(']'),
    )?;
    if group_size == 0 {
        return Err("nranks must be positive".to_string());
    }

    let byte_size = element_count * data_type.byte_width();
    let scaled_units = collective_factor(collective, group_size) * byte_size as f64;

    Ok(CollectiveOpRecord {
        op_id,
        collective,
        element_count,
        data_type,
        reduction_op,
        root,
        comm,
        group_size,
        byte_size,
        scaled_units,
    })
}

/// Parse one collective-argument line.
pub fn parse_collective_line(line: &TraceLine) -> Result<CollectiveOpRecord> {
    parse_fields(&LineTokens::new(&line.text)).map_err(|r| line.parse_error(Bucket::Collective, r))
}

/// Largest size logged for an operation within a group size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpSize {
    pub byte_size: u64,
    pub scaled_units: f64,
}

/// Deduplicated collective records, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct CollectiveTable {
    records: Vec<CollectiveOpRecord>,
    op_ids: HashSet<u64>,
}

impl CollectiveTable {
    /// Parse every collective line. Any malformed line fails the whole table.
    pub fn build(lines: &[TraceLine]) -> Result<Self> {
        let records = lines
            .iter()
            .map(parse_collective_line)
            .collect::<Result<Vec<_>>>()?;
        let table = Self::from_records(records);
        tracing::info!(
            lines = lines.len(),
            records = table.len(),
            "built collective table"
        );
        Ok(table)
    }

    /// Keep the first record of each `(op_id, byte_size)` pair.
    pub fn from_records(records: Vec<CollectiveOpRecord>) -> Self {
        let mut seen = HashSet::new();
        let records: Vec<_> = records
            .into_iter()
            .filter(|r| seen.insert((r.op_id, r.byte_size)))
            .collect();
        let op_ids = records.iter().map(|r| r.op_id).collect();
        Self { records, op_ids }
    }

    pub fn records(&self) -> &[CollectiveOpRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains_op(&self, op_id: u64) -> bool {
        self.op_ids.contains(&op_id)
    }

    /// Maximum byte size and scaled units over the duplicates of `op_id`
    /// logged with `group_size` ranks.
    pub fn max_size(&self, op_id: u64, group_size: u32) -> Option<OpSize> {
        self.records
            .iter()
            .filter(|r| r.op_id == op_id && r.group_size == group_size)
            .fold(None, |acc: Option<OpSize>, r| {
                Some(match acc {
                    None => OpSize {
                        byte_size: r.byte_size,
                        scaled_units: r.scaled_units,
                    },
                    Some(a) => OpSize {
                        byte_size: a.byte_size.max(r.byte_size),
                        scaled_units: a.scaled_units.max(r.scaled_units),
                    },
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TraceError;

    fn coll_line(kind: &str, op: &str, count: u64, datatype: u32, nranks: u32) -> TraceLine {
        TraceLine::new(
            1,
            format!(
                "host:1:1 [0] NCCL INFO {kind}: opCount {op} sendbuff 0x7f3e5b000000 recvbuff 0x7f3e5b000000 count {count} datatype {datatype} op 0 root 0 comm 0x7f3d34000eb0 [nranks={nranks}] stream 0x55e2df89c270"
            ),
        )
    }

    #[test]
    fn test_factor_allreduce() {
        for n in 2..64 {
            let expected = 2.0 * f64::from(n - 1) / f64::from(n);
            assert_eq!(collective_factor(CollectiveType::AllReduce, n), expected);
            assert_eq!(collective_factor(CollectiveType::Broadcast, n), 1.0);
        }
    }

    #[test]
    fn test_factor_table() {
        assert_eq!(collective_factor(CollectiveType::AllGather, 4), 0.75);
        assert_eq!(collective_factor(CollectiveType::ReduceScatter, 4), 0.75);
        assert_eq!(collective_factor(CollectiveType::AllToAll, 4), 1.5);
        for c in [
            CollectiveType::Reduce,
            CollectiveType::Gather,
            CollectiveType::Scatter,
            CollectiveType::Send,
            CollectiveType::Recv,
        ] {
            assert_eq!(collective_factor(c, 8), 1.0);
        }
    }

    #[test]
    fn test_parse_broadcast() {
        let rec = parse_collective_line(&coll_line("Broadcast", "49cd", 12582912, 0, 4)).unwrap();
        assert_eq!(rec.op_id, 0x49cd);
        assert_eq!(rec.collective, CollectiveType::Broadcast);
        assert_eq!(rec.data_type, DataType::Int8);
        assert_eq!(rec.reduction_op, ReductionOp::Sum);
        assert_eq!(rec.comm, "0x7f3d34000eb0");
        assert_eq!(rec.group_size, 4);
        assert_eq!(rec.byte_size, 12582912);
        assert_eq!(rec.scaled_units, 12582912.0);
    }

    #[test]
    fn test_parse_allreduce_scaling() {
        // 262144 floats = 1 MiB
        let rec = parse_collective_line(&coll_line("AllReduce", "4d2", 262144, 7, 4)).unwrap();
        assert_eq!(rec.op_id, 1234);
        assert_eq!(rec.byte_size, 1048576);
        assert_eq!(rec.scaled_units, 1.5 * 1048576.0);
    }

    #[test]
    fn test_missing_keyword_is_parse_error() {
        let line = TraceLine::new(
            7,
            "h [0] NCCL INFO AllReduce: opCount 1 sendbuff 0x0 recvbuff 0x0 datatype 7 op 0 root 0 comm 0x1 [nranks=2]",
        );
        match parse_collective_line(&line) {
            Err(TraceError::Parse {
                bucket,
                line_number,
                reason,
                ..
            }) => {
                assert_eq!(bucket, Bucket::Collective);
                assert_eq!(line_number, 7);
                assert!(reason.contains("count"), "{reason}");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_collective_is_parse_error() {
        let err = CollectiveTable::build(&[coll_line("AllToAllv", "1", 4, 7, 2)]).unwrap_err();
        assert!(matches!(err, TraceError::Parse { .. }));
    }

    #[test]
    fn test_missing_nranks_is_parse_error() {
        let line = TraceLine::new(
            1,
            "h [0] NCCL INFO AllReduce: opCount 1 sendbuff 0x0 recvbuff 0x0 count 4 datatype 7 op 0 root 0 comm 0x1",
        );
        assert!(parse_collective_line(&line).is_err());
    }

    #[test]
    fn test_dedup_keeps_distinct_sizes() {
        let lines = vec![
            coll_line("AllReduce", "7", 1, 7, 4),
            coll_line("AllReduce", "7", 1, 7, 4),
            coll_line("AllReduce", "7", 1024, 7, 4),
        ];
        let table = CollectiveTable::build(&lines).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.contains_op(7));
        assert!(!table.contains_op(8));
    }

    #[test]
    fn test_dedup_idempotent() {
        let lines = vec![
            coll_line("AllGather", "1", 16, 2, 2),
            coll_line("AllGather", "1", 16, 2, 2),
            coll_line("Broadcast", "2", 16, 2, 2),
            coll_line("Broadcast", "2", 32, 2, 2),
        ];
        let once = CollectiveTable::build(&lines).unwrap();
        let twice = CollectiveTable::from_records(once.records().to_vec());
        assert_eq!(once.records(), twice.records());
    }

    #[test]
    fn test_duplicate_size_takes_max() {
        let lines = vec![
            coll_line("AllReduce", "7", 1, 7, 4),
            coll_line("AllReduce", "7", 1024, 7, 4),
        ];
        let table = CollectiveTable::build(&lines).unwrap();
        let size = table.max_size(7, 4).unwrap();
        assert_eq!(size.byte_size, 4096);
        assert_eq!(size.scaled_units, 1.5 * 4096.0);
        assert!(table.max_size(7, 8).is_none());
    }
}
