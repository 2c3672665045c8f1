//! Markers and token patterns of the supported RCCL/NCCL debug-log formats.
//!
//! Classification only uses substring markers. Extraction then reads the
//! whitespace-separated token that follows a fixed keyword.

use std::sync::LazyLock;

use regex::Regex;

/// Collective-argument lines carry both of these.
pub const COLLECTIVE_MARKERS: [&str; 2] = ["opCount", "sendbuff"];

/// Connection lines, e.g. `Channel 00 : 0[e3000] -> 1[c3000] via P2P/IPC comm 0x.. nRanks 04`.
pub const CONNECTION_MARKERS: [&str; 2] = ["Channel", "via"];

/// Communicator-init lines, e.g. `comm 0x.. rank 1 nranks 4 cudaDev 1 busId 43000 ... Init COMPLETE`.
pub const COMMUNICATOR_MARKERS: [&str; 2] = ["Init COMPLETE", "busId"];

pub const RING_MARKER: &str = "NCCL INFO Ring";
pub const TREE_MARKER: &str = "NCCL INFO Trees";

/// Every kernel-trace line is prefixed by this marker.
pub const KERNEL_TRACE_MARKER: &str = " ## ";

/// Substrings that qualify a kernel-trace line: launch, kernel end, copy end, abort.
pub const KERNEL_LAUNCH_TAG: &str = "KL HWID";
pub const KERNEL_END_TAG: &str = "KE";
pub const COPY_END_TAG: &str = "CE";
pub const ABORT_TAG: &str = "Abort";

/// Tokens that delimit the event kind inside a kernel-trace line.
pub const LAUNCH_TOKEN: &str = "KL";
pub const KERNEL_END_TOKEN: &str = "KE";
pub const COPY_END_TOKEN: &str = "CE";

/// Keywords of a collective-argument line.
pub const KW_OP_COUNT: &str = "opCount";
pub const KW_COUNT: &str = "count";
pub const KW_DATATYPE: &str = "datatype";
pub const KW_OP: &str = "op";
pub const KW_ROOT: &str = "root";
pub const KW_COMM: &str = "comm";
pub const KW_NRANKS_BRACKETED: &str = "[nranks=";

/// Keywords of connection, communicator and topology lines.
pub const KW_CONNECTION_SOURCE: &str = ":";
pub const KW_CONNECTION_ARROW: &str = "->";
pub const KW_VIA: &str = "via";
pub const KW_NRANKS_CAMEL: &str = "nRanks";
pub const KW_NRANKS: &str = "nranks";
pub const KW_RANK: &str = "rank";
pub const KW_CUDA_DEV: &str = "cudaDev";
pub const KW_BUS_ID: &str = "busId";

/// Endpoint of a connection: `<rank>[<busId>]`.
pub static CONNECTION_ENDPOINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\[([0-9A-Za-z:.]+)\]$").expect("Invalid connection endpoint regex pattern")
});

/// A bracketed timestamp such as `[488201.944851]`.
pub static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\d+(?:\.\d+)?)\]$").expect("Invalid timestamp regex pattern")
});

/// A bracketed `rank:block` pair such as `[03:02]`.
pub static RANK_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\d+):(\d+)\]$").expect("Invalid rank/block regex pattern")
});

/// A quoted label in a visualization description.
pub static QUOTED_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]*)""#).expect("Invalid quoted label regex pattern"));
