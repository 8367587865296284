#![no_std]

//! Types and probe logic shared between the pollen eBPF object and its
//! user-space collector.
//!
//! Everything outside [`ringbuf`] is `no_std` and allocation free so the eBPF
//! crate can compile it straight into its programs.

#[cfg(any(test, feature = "user"))]
extern crate std;

pub mod attach;
pub mod env;
pub mod event;
pub mod handler;
pub mod kernel;
#[cfg(any(test, feature = "user"))]
pub mod ringbuf;

#[cfg(test)]
mod testing;

pub use attach::{ATTACH_POINTS, AttachPoint, EventFamily, HookKind};
pub use env::{CaptureError, Environment, Publisher};
pub use event::{NetEvent, NetEventType, ProcessEvent, ProcessEventType, Record, SocketAddress};

/// Name of the ring buffer carrying [`ProcessEvent`] records
pub const PROC_EVENTS_MAP: &str = "PROC_EVENTS";

/// Name of the ring buffer carrying [`NetEvent`] records
pub const NET_EVENTS_MAP: &str = "NET_EVENTS";

/// Capacity of each ring buffer: 16 MiB
pub const RING_BUFFER_BYTES: u32 = 1 << 24;

/// Address families we decode (matches AF_* constants)
pub const AF_INET: u16 = 2;
pub const AF_INET6: u16 = 10;
