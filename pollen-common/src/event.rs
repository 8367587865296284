//! Event records published to the ring buffers.
//!
//! Records cross the kernel/user boundary verbatim, so every field is a
//! fixed-width integer and the in-memory layout is the wire layout. Offsets
//! are frozen: new fields go at the end and readers ignore trailing bytes.

use core::mem::{offset_of, size_of};

use crate::{AF_INET, AF_INET6};

// =============================================================================
// Record encoding
// =============================================================================

/// A fixed-size, padding-free, pointer-free record.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with no padding bytes and no pointers,
/// so that viewing the value as `SIZE` raw bytes is always initialized.
pub unsafe trait Record: Copy + 'static {
    /// Wire size in bytes
    const SIZE: usize = size_of::<Self>();

    /// Raw wire bytes of the record
    #[inline(always)]
    fn encode(&self) -> &[u8] {
        // SAFETY: `Record` guarantees no padding, so every byte is initialized.
        unsafe { core::slice::from_raw_parts(self as *const Self as *const u8, Self::SIZE) }
    }
}

// =============================================================================
// Process Events
// =============================================================================

/// Type tag of a [`ProcessEvent`]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessEventType {
    Fork = 1,
    Exit = 2,
}

impl ProcessEventType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Fork),
            2 => Some(Self::Exit),
            _ => None,
        }
    }
}

/// Process lifecycle event - fork or exit
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessEvent {
    /// [`ProcessEventType`] tag
    pub event_type: u32,
    /// Process ID (the child for fork, the exiting task for exit)
    pub pid: u32,
    /// User ID, zero when the target environment cannot capture it
    pub uid: u32,
    /// Parent process ID, always zero for exit
    pub ppid: u32,
}

impl ProcessEvent {
    #[inline(always)]
    pub const fn fork(pid: u32, ppid: u32, uid: u32) -> Self {
        Self {
            event_type: ProcessEventType::Fork as u32,
            pid,
            uid,
            ppid,
        }
    }

    #[inline(always)]
    pub const fn exit(pid: u32, uid: u32) -> Self {
        Self {
            event_type: ProcessEventType::Exit as u32,
            pid,
            uid,
            ppid: 0,
        }
    }

    pub fn kind(&self) -> Option<ProcessEventType> {
        ProcessEventType::from_u32(self.event_type)
    }
}

const _: () = {
    assert!(size_of::<ProcessEvent>() == 16);
    assert!(offset_of!(ProcessEvent, event_type) == 0);
    assert!(offset_of!(ProcessEvent, pid) == 4);
    assert!(offset_of!(ProcessEvent, uid) == 8);
    assert!(offset_of!(ProcessEvent, ppid) == 12);
};

// SAFETY: four u32 fields, repr(C), no padding.
unsafe impl Record for ProcessEvent {}

#[cfg(feature = "user")]
unsafe impl aya::Pod for ProcessEvent {}

// =============================================================================
// Network Events
// =============================================================================

/// Type tag of a [`NetEvent`]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetEventType {
    Listen = 1,
    Bind = 2,
}

impl NetEventType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Listen),
            2 => Some(Self::Bind),
            _ => None,
        }
    }
}

/// Socket event - bind or listen
///
/// Ports are host byte order. Addresses keep the network byte order they
/// have in `sockaddr`/`sock_common`. Fields of the inactive family are zero.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetEvent {
    /// [`NetEventType`] tag
    pub event_type: u32,
    /// Process ID (tgid)
    pub pid: u32,
    /// Local port
    pub port: u32,
    /// Remote port, zero for bind
    pub remote_port: u32,
    /// Local IPv4 address
    pub ip4_addr: u32,
    /// Local IPv6 address
    pub ip6_addr: [u32; 4],
    /// Remote IPv4 address
    pub remote_ip4: u32,
    /// Remote IPv6 address
    pub remote_ip6: [u32; 4],
    /// User ID, zero when the target environment cannot capture it
    pub uid: u32,
    /// Address family (AF_INET, AF_INET6, ...)
    pub family: u32,
}

impl NetEvent {
    #[inline(always)]
    pub const fn new(event_type: NetEventType, pid: u32, uid: u32) -> Self {
        Self {
            event_type: event_type as u32,
            pid,
            port: 0,
            remote_port: 0,
            ip4_addr: 0,
            ip6_addr: [0; 4],
            remote_ip4: 0,
            remote_ip6: [0; 4],
            uid,
            family: 0,
        }
    }

    /// Fill the local address fields and family from `addr`.
    #[inline(always)]
    pub fn set_local(&mut self, addr: SocketAddress) {
        self.family = addr.family() as u32;
        let (port, ip4, ip6) = addr.split();
        self.port = port as u32;
        self.ip4_addr = ip4;
        self.ip6_addr = ip6;
    }

    /// Fill the remote address fields from `addr`. The family is taken from
    /// the local side.
    #[inline(always)]
    pub fn set_remote(&mut self, addr: SocketAddress) {
        let (port, ip4, ip6) = addr.split();
        self.remote_port = port as u32;
        self.remote_ip4 = ip4;
        self.remote_ip6 = ip6;
    }

    pub fn kind(&self) -> Option<NetEventType> {
        NetEventType::from_u32(self.event_type)
    }
}

const _: () = {
    assert!(size_of::<NetEvent>() == 64);
    assert!(offset_of!(NetEvent, event_type) == 0);
    assert!(offset_of!(NetEvent, pid) == 4);
    assert!(offset_of!(NetEvent, port) == 8);
    assert!(offset_of!(NetEvent, remote_port) == 12);
    assert!(offset_of!(NetEvent, ip4_addr) == 16);
    assert!(offset_of!(NetEvent, ip6_addr) == 20);
    assert!(offset_of!(NetEvent, remote_ip4) == 36);
    assert!(offset_of!(NetEvent, remote_ip6) == 40);
    assert!(offset_of!(NetEvent, uid) == 56);
    assert!(offset_of!(NetEvent, family) == 60);
};

// SAFETY: only u32 fields and u32 arrays, repr(C), no padding.
unsafe impl Record for NetEvent {}

#[cfg(feature = "user")]
unsafe impl aya::Pod for NetEvent {}

// =============================================================================
// Socket addresses
// =============================================================================

/// A socket address, keyed by family.
///
/// Built only after the family is known, so an IPv4 payload can never be
/// interpreted as IPv6 or the other way round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketAddress {
    /// Port in host order, address in network order
    V4 { port: u16, addr: u32 },
    /// Port in host order, address words in network order
    V6 { port: u16, addr: [u32; 4] },
    /// A family we record but do not decode
    Other { family: u16 },
}

impl SocketAddress {
    pub const fn family(&self) -> u16 {
        match self {
            Self::V4 { .. } => AF_INET,
            Self::V6 { .. } => AF_INET6,
            Self::Other { family } => *family,
        }
    }

    /// (port, ipv4, ipv6) with the unused family zeroed.
    #[inline(always)]
    const fn split(self) -> (u16, u32, [u32; 4]) {
        match self {
            Self::V4 { port, addr } => (port, addr, [0; 4]),
            Self::V6 { port, addr } => (port, 0, addr),
            Self::Other { .. } => (0, 0, [0; 4]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fork_record_fields() {
        let event = ProcessEvent::fork(105, 100, 0);
        assert_eq!(event.kind(), Some(ProcessEventType::Fork));
        assert_eq!(event.pid, 105);
        assert_eq!(event.ppid, 100);
        assert_eq!(event.uid, 0);
    }

    #[test]
    fn test_exit_record_zeroes_parent() {
        let event = ProcessEvent::exit(105, 1000);
        assert_eq!(event.kind(), Some(ProcessEventType::Exit));
        assert_eq!(event.ppid, 0);
        assert_eq!(event.uid, 1000);
    }

    #[test]
    fn test_encode_is_native_layout() {
        let event = ProcessEvent::fork(0x0102_0304, 7, 9);
        let bytes = event.encode();
        assert_eq!(bytes.len(), ProcessEvent::SIZE);
        assert_eq!(&bytes[0..4], &1u32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &0x0102_0304u32.to_ne_bytes());
        assert_eq!(&bytes[8..12], &9u32.to_ne_bytes());
        assert_eq!(&bytes[12..16], &7u32.to_ne_bytes());
    }

    #[test]
    fn test_v4_address_zeroes_v6_fields() {
        let mut event = NetEvent::new(NetEventType::Bind, 1, 0);
        event.ip6_addr = [1, 2, 3, 4];
        event.set_local(SocketAddress::V4 {
            port: 8080,
            addr: 0x0100_007f,
        });
        assert_eq!(event.family, AF_INET as u32);
        assert_eq!(event.port, 8080);
        assert_eq!(event.ip4_addr, 0x0100_007f);
        assert_eq!(event.ip6_addr, [0; 4]);
    }

    #[test]
    fn test_v6_address_zeroes_v4_field() {
        let mut event = NetEvent::new(NetEventType::Listen, 1, 0);
        event.ip4_addr = 0xdead_beef;
        event.set_local(SocketAddress::V6 {
            port: 443,
            addr: [0, 0, 0, 1u32.to_be()],
        });
        assert_eq!(event.family, AF_INET6 as u32);
        assert_eq!(event.ip4_addr, 0);
        assert_eq!(event.ip6_addr, [0, 0, 0, 1u32.to_be()]);
    }

    #[test]
    fn test_other_family_keeps_family_only() {
        let mut event = NetEvent::new(NetEventType::Bind, 1, 0);
        event.set_local(SocketAddress::Other { family: 1 });
        assert_eq!(event.family, 1);
        assert_eq!(event.port, 0);
        assert_eq!(event.ip4_addr, 0);
        assert_eq!(event.ip6_addr, [0; 4]);
    }

    #[test]
    fn test_remote_address_leaves_family() {
        let mut event = NetEvent::new(NetEventType::Listen, 1, 0);
        event.set_local(SocketAddress::V4 { port: 80, addr: 1 });
        event.set_remote(SocketAddress::V4 {
            port: 5555,
            addr: 2,
        });
        assert_eq!(event.family, AF_INET as u32);
        assert_eq!(event.remote_port, 5555);
        assert_eq!(event.remote_ip4, 2);
        assert_eq!(event.remote_ip6, [0; 4]);
    }
}
