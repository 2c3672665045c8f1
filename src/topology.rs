//! Topology and connection table builder.
//!
//! Connection lines look like
//!
//! ```text
//! host:1:1 [4] NCCL INFO Channel 00 : 0[e3000] -> 1[c3000] via P2P/IPC comm 0x7f53bc000e50 nRanks 04
//! ```
//!
//! and communicator-init lines like
//!
//! ```text
//! host:1:2 [1] NCCL INFO comm 0x7f1640000eb0 rank 1 nranks 4 cudaDev 1 busId 43000 used 35728 bytes - Init COMPLETE
//! ```
//!
//! Ring and tree lines are not interpreted; they are only keyed by
//! communicator and size so they can be exported next to a device group.

use std::collections::BTreeMap;

use crate::classify::{Bucket, TraceBuckets, TraceLine};
use crate::error::Result;
use crate::grouping::DeviceGroup;
use crate::trace::constants::{
    CONNECTION_ENDPOINT_RE, KW_BUS_ID, KW_COMM, KW_CONNECTION_ARROW, KW_CONNECTION_SOURCE,
    KW_CUDA_DEV, KW_NRANKS, KW_NRANKS_CAMEL, KW_RANK, KW_VIA,
};
use crate::trace::tokens::parse_dec;
use crate::trace::{CommunicatorRecord, ConnectionEdge, LineTokens, TopologyLine, TransportKind};

fn parse_endpoint(token: &str) -> std::result::Result<(u32, String), String> {
    let caps = CONNECTION_ENDPOINT_RE
        .captures(token)
        .ok_or_else(|| format!("malformed endpoint `{token}`"))?;
    let rank = parse_dec("rank", &caps[1])?;
    Ok((rank, caps[2].to_string()))
}

fn parse_connection_fields(text: &str) -> std::result::Result<ConnectionEdge, String> {
    let tokens = LineTokens::new(text);
    let (source_rank, source_bus_id) = parse_endpoint(tokens.require(KW_CONNECTION_SOURCE)?)?;
    let (target_rank, target_bus_id) = parse_endpoint(tokens.require(KW_CONNECTION_ARROW)?)?;
    let transport_token = tokens.require(KW_VIA)?;
    let comm = tokens.require(KW_COMM)?.to_string();
    let group_size = parse_dec(KW_NRANKS_CAMEL, tokens.require(KW_NRANKS_CAMEL)?)?;

    Ok(ConnectionEdge {
        comm,
        group_size,
        source_rank,
        source_bus_id,
        target_rank,
        target_bus_id,
        transport: TransportKind::from_token(transport_token),
        transport_token: transport_token.to_string(),
        raw: text.to_string(),
    })
}

pub fn parse_connection_line(line: &TraceLine) -> Result<ConnectionEdge> {
    parse_connection_fields(&line.text).map_err(|r| line.parse_error(Bucket::Connection, r))
}

fn parse_communicator_fields(text: &str) -> std::result::Result<CommunicatorRecord, String> {
    let tokens = LineTokens::new(text);
    Ok(CommunicatorRecord {
        comm: tokens.require(KW_COMM)?.to_string(),
        rank: parse_dec(KW_RANK, tokens.require(KW_RANK)?)?,
        group_size: parse_dec(KW_NRANKS, tokens.require(KW_NRANKS)?)?,
        device_index: parse_dec(KW_CUDA_DEV, tokens.require(KW_CUDA_DEV)?)?,
        bus_id: tokens.require(KW_BUS_ID)?.to_string(),
    })
}

pub fn parse_communicator_line(line: &TraceLine) -> Result<CommunicatorRecord> {
    parse_communicator_fields(&line.text).map_err(|r| line.parse_error(Bucket::Communicator, r))
}

fn parse_topology_fields(text: &str) -> std::result::Result<TopologyLine, String> {
    let tokens = LineTokens::new(text);
    Ok(TopologyLine {
        comm: tokens.require(KW_COMM)?.to_string(),
        group_size: parse_dec(KW_NRANKS_CAMEL, tokens.require(KW_NRANKS_CAMEL)?)?,
        bus_id: tokens.after(KW_BUS_ID).map(str::to_string),
        raw: text.to_string(),
    })
}

/// Parse a ring or tree line; `bucket` says which, for error reporting.
pub fn parse_topology_line(line: &TraceLine, bucket: Bucket) -> Result<TopologyLine> {
    parse_topology_fields(&line.text).map_err(|r| line.parse_error(bucket, r))
}

/// Connection, communicator and topology records of one trace.
#[derive(Debug, Clone, Default)]
pub struct TopologyTables {
    pub edges: Vec<ConnectionEdge>,
    pub communicators: Vec<CommunicatorRecord>,
    pub rings: Vec<TopologyLine>,
    pub trees: Vec<TopologyLine>,
}

impl TopologyTables {
    pub fn build(buckets: &TraceBuckets) -> Result<Self> {
        let edges = buckets
            .connection
            .iter()
            .map(parse_connection_line)
            .collect::<Result<Vec<_>>>()?;
        let communicators = buckets
            .communicator
            .iter()
            .map(parse_communicator_line)
            .collect::<Result<Vec<_>>>()?;
        let rings = buckets
            .ring
            .iter()
            .map(|l| parse_topology_line(l, Bucket::Ring))
            .collect::<Result<Vec<_>>>()?;
        let trees = buckets
            .tree
            .iter()
            .map(|l| parse_topology_line(l, Bucket::Tree))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            edges = edges.len(),
            communicators = communicators.len(),
            rings = rings.len(),
            trees = trees.len(),
            "built topology tables"
        );
        Ok(Self {
            edges,
            communicators,
            rings,
            trees,
        })
    }

    /// Edges leaving `bus_id` within communicator `comm`.
    pub fn edges_from<'a>(
        &'a self,
        comm: &'a str,
        bus_id: &'a str,
    ) -> impl Iterator<Item = &'a ConnectionEdge> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.comm == comm && e.source_bus_id == bus_id)
    }

    /// Communicator records whose device is in `group` and whose size matches it.
    fn group_communicators<'a>(
        &'a self,
        group: &'a DeviceGroup,
    ) -> impl Iterator<Item = &'a CommunicatorRecord> + 'a {
        let size = group.len();
        self.communicators
            .iter()
            .filter(move |c| c.group_size as usize == size && group.contains(&c.bus_id))
    }

    /// Raw ring, tree and connection lines of the communicators behind `group`.
    pub fn topology_lines(&self, group: &DeviceGroup) -> Vec<&str> {
        let mut comms: Vec<(&str, u32)> = Vec::new();
        for c in self.group_communicators(group) {
            if !comms.contains(&(c.comm.as_str(), c.group_size)) {
                comms.push((c.comm.as_str(), c.group_size));
            }
        }

        let mut lines = Vec::new();
        for (comm, size) in comms {
            let matches = |l: &&TopologyLine| l.comm == comm && l.group_size == size;
            lines.extend(self.rings.iter().filter(matches).map(|l| l.raw.as_str()));
            lines.extend(self.trees.iter().filter(matches).map(|l| l.raw.as_str()));
            lines.extend(
                self.edges
                    .iter()
                    .filter(|e| e.comm == comm && e.group_size == size)
                    .map(|e| e.raw.as_str()),
            );
        }
        lines
    }

    /// Rank to bus-id mapping for `group`. The first communicator to claim a
    /// rank wins.
    pub fn rank_map(&self, group: &DeviceGroup) -> BTreeMap<u32, String> {
        let mut map = BTreeMap::new();
        for c in self.group_communicators(group) {
            map.entry(c.rank).or_insert_with(|| c.bus_id.clone());
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify_text;
    use crate::error::TraceError;

    const TRACE: &str = "\
h:1:1 [0] NCCL INFO Ring 00 : 0 1 comm 0xaa nRanks 2 busId 3000
h:1:1 [0] NCCL INFO Trees [0] 1/-1/-1->0->-1 comm 0xaa nRanks 2 busId 3000
h:1:1 [0] NCCL INFO Channel 00 : 0[3000] -> 1[43000] via P2P/IPC comm 0xaa nRanks 02
h:1:2 [1] NCCL INFO Channel 00 : 1[43000] -> 0[3000] via P2P/direct pointer comm 0xaa nRanks 02
h:1:1 [0] NCCL INFO comm 0xaa rank 0 nranks 2 cudaDev 0 busId 3000 used 1 bytes - Init COMPLETE
h:1:2 [1] NCCL INFO comm 0xaa rank 1 nranks 2 cudaDev 1 busId 43000 used 1 bytes - Init COMPLETE
h:1:3 [2] NCCL INFO Channel 00 : 0[63000] -> 1[83000] via NET/IB/0 comm 0xbb nRanks 04
";

    #[test]
    fn test_parse_connection() {
        let edge = parse_connection_line(&TraceLine::new(
            1,
            "h [4] NCCL INFO Channel 00 : 0[e3000] -> 1[c3000] via P2P/IPC comm 0x7f53bc000e50 nRanks 04",
        ))
        .unwrap();
        assert_eq!(edge.source_rank, 0);
        assert_eq!(edge.source_bus_id, "e3000");
        assert_eq!(edge.target_rank, 1);
        assert_eq!(edge.target_bus_id, "c3000");
        assert_eq!(edge.transport, TransportKind::PeerIpc);
        assert_eq!(edge.comm, "0x7f53bc000e50");
        assert_eq!(edge.group_size, 4);
    }

    #[test]
    fn test_malformed_endpoint() {
        let err = parse_connection_line(&TraceLine::new(
            3,
            "h NCCL INFO Channel 00 : e3000 -> 1[c3000] via P2P/IPC comm 0x1 nRanks 4",
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            TraceError::Parse {
                bucket: Bucket::Connection,
                line_number: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_communicator() {
        let rec = parse_communicator_line(&TraceLine::new(
            1,
            "h:1:2 [1] NCCL INFO comm 0x7f1640000eb0 rank 1 nranks 4 cudaDev 1 busId 43000 used 35728 bytes - Init COMPLETE",
        ))
        .unwrap();
        assert_eq!(
            rec,
            CommunicatorRecord {
                comm: "0x7f1640000eb0".to_string(),
                rank: 1,
                group_size: 4,
                device_index: 1,
                bus_id: "43000".to_string(),
            }
        );
    }

    #[test]
    fn test_communicator_missing_cuda_dev() {
        let line = TraceLine::new(1, "comm 0x1 rank 1 nranks 4 busId 43000 - Init COMPLETE");
        assert!(parse_communicator_line(&line).is_err());
    }

    #[test]
    fn test_build_tables() {
        let tables = TopologyTables::build(&classify_text(TRACE)).unwrap();
        assert_eq!(tables.edges.len(), 3);
        assert_eq!(tables.communicators.len(), 2);
        assert_eq!(tables.rings.len(), 1);
        assert_eq!(tables.trees.len(), 1);
        assert_eq!(tables.rings[0].bus_id.as_deref(), Some("3000"));
        assert_eq!(tables.edges_from("0xaa", "3000").count(), 1);
        assert_eq!(tables.edges_from("0xbb", "3000").count(), 0);
    }

    #[test]
    fn test_topology_lines_and_rank_map() {
        let tables = TopologyTables::build(&classify_text(TRACE)).unwrap();
        let group = DeviceGroup::from_members(["3000", "43000"]);
        let lines = tables.topology_lines(&group);
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("Ring"));
        assert!(lines[1].contains("Trees"));
        assert!(lines[2].contains("Channel"));

        let map = tables.rank_map(&group);
        assert_eq!(map.get(&0).map(String::as_str), Some("3000"));
        assert_eq!(map.get(&1).map(String::as_str), Some("43000"));
    }
}
