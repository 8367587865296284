//! Kernel-side layouts read by the handlers.
//!
//! Tracepoint layouts follow `/sys/kernel/debug/tracing/events/<cat>/<name>/format`.
//! Struct offsets follow x86_64/aarch64 builds with CONFIG_IPV6; the only
//! version-dependent offset is selected by the `socket-wq` build feature of
//! the eBPF crate.

use core::mem::{offset_of, size_of};

/// Command name length (TASK_COMM_LEN)
pub const COMM_LEN: usize = 16;

/// Common header of every tracepoint record
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TraceEntry {
    pub common_type: u16,
    pub common_flags: u8,
    pub common_preempt_count: u8,
    pub common_pid: i32,
}

/// Tracepoint arguments for sched_process_fork
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SchedProcessForkArgs {
    pub common: TraceEntry,
    pub parent_comm: [u8; COMM_LEN],
    pub parent_pid: i32,
    pub child_comm: [u8; COMM_LEN],
    pub child_pid: i32,
}

const _: () = {
    assert!(offset_of!(SchedProcessForkArgs, parent_pid) == 24);
    assert!(offset_of!(SchedProcessForkArgs, child_pid) == 44);
};

// =============================================================================
// User-space socket addresses
// =============================================================================

/// Leading field shared by every `sockaddr`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SockaddrFamily {
    pub sa_family: u16,
}

/// sockaddr_in
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SockaddrIn {
    pub sin_family: u16,
    /// Network byte order
    pub sin_port: u16,
    /// Network byte order
    pub sin_addr: u32,
    pub sin_zero: [u8; 8],
}

/// sockaddr_in6
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SockaddrIn6 {
    pub sin6_family: u16,
    /// Network byte order
    pub sin6_port: u16,
    pub sin6_flowinfo: u32,
    /// Network byte order
    pub sin6_addr: [u32; 4],
    pub sin6_scope_id: u32,
}

const _: () = {
    assert!(size_of::<SockaddrIn>() == 16);
    assert!(size_of::<SockaddrIn6>() == 28);
};

// =============================================================================
// struct socket / struct sock_common
// =============================================================================

/// Offset of `sk` in `struct socket` (state, type, flags, file, sk)
pub const SOCKET_SK_OFFSET: u64 = 24;

/// Offset of `sk` in `struct socket` on kernels that still carry `wq`
pub const SOCKET_WQ_SK_OFFSET: u64 = 32;

/// Head of `struct sock_common`, up to and including `skc_family`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SockCommonHead {
    /// Remote IPv4, network byte order
    pub skc_daddr: u32,
    /// Local IPv4, network byte order
    pub skc_rcv_saddr: u32,
    pub skc_hash: u32,
    /// Remote port, network byte order
    pub skc_dport: u16,
    /// Local port, host byte order
    pub skc_num: u16,
    pub skc_family: u16,
}

/// Offset of `skc_v6_daddr` in `struct sock_common`
pub const SKC_V6_DADDR_OFFSET: u64 = 56;

/// Offset of `skc_v6_rcv_saddr` in `struct sock_common`
pub const SKC_V6_RCV_SADDR_OFFSET: u64 = 72;

const _: () = {
    assert!(offset_of!(SockCommonHead, skc_dport) == 12);
    assert!(offset_of!(SockCommonHead, skc_num) == 14);
    assert!(offset_of!(SockCommonHead, skc_family) == 16);
};
