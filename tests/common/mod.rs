//! Common test utilities for colltrace integration tests.
//!
//! Builds synthetic RCCL debug logs shaped like the output of a real run with
//! `NCCL_DEBUG=INFO` and `RCCL_KERNEL_COLL_TRACE_ENABLE=1`.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// Bus ids of the four devices in the synthetic node, in rank order.
pub const BUSES: [&str; 4] = ["3000", "43000", "63000", "83000"];

pub const COMM: &str = "0x7f1640000eb0";

/// AllReduce of 262144 floats: 1 MiB payload.
pub const ALLREDUCE_OP: u64 = 0x4d2;
pub const ALLREDUCE_BYTES: u64 = 1_048_576;

/// Broadcast of 4096 int8 elements.
pub const BROADCAST_OP: u64 = 0x4d3;
pub const BROADCAST_BYTES: u64 = 4096;

fn host(rank: usize) -> String {
    format!("node01:2041:{} [{rank}]", 2041 + rank)
}

pub fn collective_line(rank: usize, kind: &str, op: u64, count: u64, datatype: u32) -> String {
    format!(
        "{} NCCL INFO {kind}: opCount {op:x} sendbuff 0x7f10ce1c0000 recvbuff 0x7f10ce1c0000 count {count} datatype {datatype} op 0 root 0 comm {COMM} [nranks={}] stream 0x55e2df89c270",
        host(rank),
        BUSES.len()
    )
}

pub fn launch_line(rank: usize, op: u64, ts: f64, kernel: &str) -> String {
    format!(
        "{} NCCL INFO ## [{ts:.6}] [{rank:02}:00] {op:06x} KL HWID 433025b0 {kernel} nt 256 bi 0 nc 4 busId {} nRanks {}",
        host(rank),
        BUSES[rank],
        BUSES.len()
    )
}

pub fn end_line(rank: usize, op: u64, ts: f64) -> String {
    format!(
        "{} NCCL INFO ## [{ts:.6}] [{rank:02}:00] {op:06x} KE busId {} nRanks {}",
        host(rank),
        BUSES[rank],
        BUSES.len()
    )
}

/// Topology section: rings, trees, a closed ring of P2P connections and
/// one Init COMPLETE line per rank.
pub fn topology_lines() -> Vec<String> {
    let n = BUSES.len();
    let mut lines = Vec::new();
    for rank in 0..n {
        lines.push(format!(
            "{} NCCL INFO Ring 00 : 0 1 2 3 comm {COMM} nRanks {n} busId {}",
            host(rank),
            BUSES[rank]
        ));
        lines.push(format!(
            "{} NCCL INFO Trees [0] {}/-1/-1->{rank}->-1 comm {COMM} nRanks {n} busId {}",
            host(rank),
            (rank + 1) % n,
            BUSES[rank]
        ));
    }
    for rank in 0..n {
        let next = (rank + 1) % n;
        lines.push(format!(
            "{} NCCL INFO Channel 00 : {rank}[{}] -> {next}[{}] via P2P/IPC comm {COMM} nRanks 0{n}",
            host(rank),
            BUSES[rank],
            BUSES[next]
        ));
    }
    for rank in 0..n {
        lines.push(format!(
            "{} NCCL INFO comm {COMM} rank {rank} nranks {n} cudaDev {rank} busId {} used 35728 bytes - Init COMPLETE",
            host(rank),
            BUSES[rank]
        ));
    }
    lines
}

/// Four devices, one AllReduce taking 0.5 s everywhere and one Broadcast
/// that device 2 never finishes.
pub fn modern_trace() -> String {
    let mut lines = vec!["node01:2041:2041 [0] NCCL INFO NCCL version 2.18.3+hip5.7".to_string()];
    lines.extend(topology_lines());
    for rank in 0..BUSES.len() {
        lines.push(collective_line(rank, "AllReduce", ALLREDUCE_OP, 262_144, 7));
        lines.push(collective_line(rank, "Broadcast", BROADCAST_OP, 4096, 0));
    }
    for rank in 0..BUSES.len() {
        lines.push(launch_line(rank, ALLREDUCE_OP, 100.0, "AllReduceRingLLSum_f32"));
        lines.push(end_line(rank, ALLREDUCE_OP, 100.5));
    }
    for rank in 0..BUSES.len() {
        lines.push(launch_line(rank, BROADCAST_OP, 101.0, "BroadcastRingSimpleSum_i8"));
        if rank != 2 {
            lines.push(end_line(rank, BROADCAST_OP, 101.25));
        }
    }
    lines.join("\n") + "\n"
}

/// Trace from a library that logs neither topology nor device identity.
/// Device `r` runs for `0.25 * (r + 1)` seconds.
pub fn legacy_trace() -> String {
    let devices = BUSES.len();
    let mut lines = Vec::new();
    for rank in 0..devices {
        lines.push(collective_line(rank, "AllReduce", ALLREDUCE_OP, 262_144, 7));
    }
    for rank in 0..devices {
        lines.push(format!(
            "{} NCCL INFO ## [{:.6}] [{rank:02}:00] {ALLREDUCE_OP:06x} KL HWID 433025b0 AllReduceRingLLSum_f32 nt 256 bi 0 nc 4",
            host(rank),
            10.0
        ));
        lines.push(format!(
            "{} NCCL INFO ## [{:.6}] [{rank:02}:00] {ALLREDUCE_OP:06x} KE",
            host(rank),
            10.0 + 0.25 * (rank + 1) as f64
        ));
    }
    lines.join("\n") + "\n"
}

/// A modern trace whose kernel section reports an abort.
pub fn aborted_trace() -> String {
    let mut text = modern_trace();
    text.push_str("node01:2041:2043 [2] NCCL INFO ## [102.000000] [02:00] Abort\n");
    text
}

/// Collective and topology logging without any kernel trace.
pub fn uninstrumented_trace() -> String {
    let mut lines = topology_lines();
    lines.push(collective_line(0, "AllReduce", ALLREDUCE_OP, 262_144, 7));
    lines.join("\n") + "\n"
}

pub fn write_trace(dir: &Path, text: &str) -> PathBuf {
    let path = dir.join("rccl.log");
    fs::write(&path, text).expect("Failed to write trace");
    path
}

pub fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9 * b.abs().max(1.0)
}
