//! Record types extracted from a collective-communication debug log.
//!
//! All records are read-only views over the input file. They are built once
//! by the table builders and never mutated afterwards.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Collective kinds the library logs arguments for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CollectiveType {
    Broadcast,
    Reduce,
    AllGather,
    ReduceScatter,
    AllReduce,
    Gather,
    Scatter,
    AllToAll,
    Send,
    Recv,
}

impl CollectiveType {
    pub const ALL: [CollectiveType; 10] = [
        CollectiveType::Broadcast,
        CollectiveType::Reduce,
        CollectiveType::AllGather,
        CollectiveType::ReduceScatter,
        CollectiveType::AllReduce,
        CollectiveType::Gather,
        CollectiveType::Scatter,
        CollectiveType::AllToAll,
        CollectiveType::Send,
        CollectiveType::Recv,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CollectiveType::Broadcast => "Broadcast",
            CollectiveType::Reduce => "Reduce",
            CollectiveType::AllGather => "AllGather",
            CollectiveType::ReduceScatter => "ReduceScatter",
            CollectiveType::AllReduce => "AllReduce",
            CollectiveType::Gather => "Gather",
            CollectiveType::Scatter => "Scatter",
            CollectiveType::AllToAll => "AllToAll",
            CollectiveType::Send => "Send",
            CollectiveType::Recv => "Recv",
        }
    }
}

impl FromStr for CollectiveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CollectiveType::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unsupported collective type `{s}`"))
    }
}

impl fmt::Display for CollectiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Element type of a collective buffer, keyed by the library's numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DataType {
    Int8,
    Uint8,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float16,
    Float32,
    Float64,
    Bfloat16,
}

impl DataType {
    pub fn from_code(code: u32) -> Option<Self> {
        let dt = match code {
            0 => DataType::Int8,
            1 => DataType::Uint8,
            2 => DataType::Int32,
            3 => DataType::Uint32,
            4 => DataType::Int64,
            5 => DataType::Uint64,
            6 => DataType::Float16,
            7 => DataType::Float32,
            8 => DataType::Float64,
            9 => DataType::Bfloat16,
            _ => return None,
        };
        Some(dt)
    }

    /// Size of one element in bytes.
    pub fn byte_width(&self) -> u64 {
        match self {
            DataType::Int8 | DataType::Uint8 => 1,
            DataType::Float16 | DataType::Bfloat16 => 2,
            DataType::Int32 | DataType::Uint32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::Uint64 | DataType::Float64 => 8,
        }
    }
}

/// Reduction operator code. Codes outside the builtin set are user-defined
/// reductions and are kept numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReductionOp {
    Sum,
    Prod,
    Max,
    Min,
    Avg,
    Custom(u32),
}

impl ReductionOp {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => ReductionOp::Sum,
            1 => ReductionOp::Prod,
            2 => ReductionOp::Max,
            3 => ReductionOp::Min,
            4 => ReductionOp::Avg,
            other => ReductionOp::Custom(other),
        }
    }
}

/// One logged collective call.
///
/// `op_id` alone is not unique: a synchronization call can log the same
/// counter twice with different sizes, so identity is `(op_id, byte_size)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectiveOpRecord {
    pub op_id: u64,
    pub collective: CollectiveType,
    pub element_count: u64,
    pub data_type: DataType,
    pub reduction_op: ReductionOp,
    pub root: u32,
    pub comm: String,
    pub group_size: u32,
    pub byte_size: u64,
    /// Collective factor times `byte_size`.
    pub scaled_units: f64,
}

/// How two ranks of a channel talk to each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum TransportKind {
    PeerDirect,
    PeerIpc,
    PeerIndirect,
    SharedMemory,
    Network,
    Other(String),
}

impl TransportKind {
    pub fn from_token(token: &str) -> Self {
        if token.starts_with("P2P/direct") {
            TransportKind::PeerDirect
        } else if token.starts_with("P2P/IPC") {
            TransportKind::PeerIpc
        } else if token.starts_with("P2P/indirect") {
            TransportKind::PeerIndirect
        } else if token == "direct" || token.starts_with("SHM") {
            TransportKind::SharedMemory
        } else if token.starts_with("NET") {
            TransportKind::Network
        } else {
            TransportKind::Other(token.to_string())
        }
    }
}

/// A directed point-to-point link logged while a channel was set up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionEdge {
    pub comm: String,
    pub group_size: u32,
    pub source_rank: u32,
    pub source_bus_id: String,
    pub target_rank: u32,
    pub target_bus_id: String,
    pub transport: TransportKind,
    pub transport_token: String,
    pub raw: String,
}

/// One device that finished communicator initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommunicatorRecord {
    pub comm: String,
    pub rank: u32,
    pub group_size: u32,
    pub device_index: u32,
    pub bus_id: String,
}

/// A ring or tree topology line, kept verbatim for export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyLine {
    pub comm: String,
    pub group_size: u32,
    pub bus_id: Option<String>,
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Launch,
    ComputeEnd,
    CopyEnd,
}

/// One kernel lifecycle event from the kernel trace.
///
/// `bus_id` and `group_size` are only logged by newer library versions.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    pub kind: EventKind,
    pub timestamp: f64,
    pub rank: u32,
    pub block_id: u32,
    pub op_id: u64,
    pub bus_id: Option<String>,
    pub group_size: Option<u32>,
    pub kernel_name: Option<String>,
}
