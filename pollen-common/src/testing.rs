//! In-memory [`Environment`] and byte builders for handler tests.

use std::vec;
use std::vec::Vec;

use crate::env::{CaptureError, Environment};
use crate::event::Record;
use crate::kernel::{SKC_V6_RCV_SADDR_OFFSET, SockaddrIn, SockaddrIn6};
use crate::{AF_INET, AF_INET6};

const USER_BASE: u64 = 0x0000_7f00_0000_0000;
const KERNEL_BASE: u64 = 0xffff_8880_0000_0000;
/// Gap between mapped regions so reads past the end never hit a neighbour
const REGION_STRIDE: u64 = 0x1_0000;

struct Region {
    base: u64,
    bytes: Vec<u8>,
}

/// Current task plus simulated user and kernel memory.
///
/// Reads outside a mapped region fail the way a faulting probe read does.
pub struct FakeEnv {
    pid_tgid: u64,
    uid_gid: u64,
    user: Vec<Region>,
    kernel: Vec<Region>,
}

impl FakeEnv {
    pub fn new(tgid: u32, pid: u32, uid: u32) -> Self {
        Self {
            pid_tgid: ((tgid as u64) << 32) | pid as u64,
            uid_gid: uid as u64,
            user: Vec::new(),
            kernel: Vec::new(),
        }
    }

    pub fn map_user(&mut self, bytes: &[u8]) -> u64 {
        map(&mut self.user, USER_BASE, bytes)
    }

    pub fn map_kernel(&mut self, bytes: &[u8]) -> u64 {
        map(&mut self.kernel, KERNEL_BASE, bytes)
    }
}

fn map(regions: &mut Vec<Region>, base: u64, bytes: &[u8]) -> u64 {
    let base = base + regions.len() as u64 * REGION_STRIDE;
    regions.push(Region {
        base,
        bytes: bytes.to_vec(),
    });
    base
}

fn read<T: Copy>(regions: &[Region], addr: u64) -> Result<T, CaptureError> {
    let len = size_of::<T>() as u64;
    let region = regions
        .iter()
        .find(|r| addr >= r.base && addr + len <= r.base + r.bytes.len() as u64)
        .ok_or(CaptureError::ReadFailed)?;
    let start = (addr - region.base) as usize;
    let src = region.bytes[start..].as_ptr() as *const T;
    // SAFETY: bounds checked above; T is plain data in every caller.
    Ok(unsafe { src.read_unaligned() })
}

impl Environment for FakeEnv {
    fn current_pid_tgid(&self) -> u64 {
        self.pid_tgid
    }

    fn current_uid_gid(&self) -> u64 {
        self.uid_gid
    }

    fn read_user<T: Copy>(&self, addr: u64) -> Result<T, CaptureError> {
        read(&self.user, addr)
    }

    fn read_kernel<T: Copy>(&self, addr: u64) -> Result<T, CaptureError> {
        read(&self.kernel, addr)
    }
}

pub fn read_record<R: Record>(bytes: &[u8]) -> R {
    assert!(bytes.len() >= R::SIZE, "short record: {} bytes", bytes.len());
    // SAFETY: length checked; records are plain data.
    unsafe { (bytes.as_ptr() as *const R).read_unaligned() }
}

fn raw<T: Copy>(value: &T) -> Vec<u8> {
    // SAFETY: sockaddr structs are repr(C) plain data without padding.
    unsafe { core::slice::from_raw_parts(value as *const T as *const u8, size_of::<T>()) }.to_vec()
}

pub fn sockaddr_in(port: u16, addr: u32) -> Vec<u8> {
    raw(&SockaddrIn {
        sin_family: AF_INET,
        sin_port: port.to_be(),
        sin_addr: addr,
        sin_zero: [0; 8],
    })
}

pub fn sockaddr_in6(port: u16, addr: [u32; 4]) -> Vec<u8> {
    raw(&SockaddrIn6 {
        sin6_family: AF_INET6,
        sin6_port: port.to_be(),
        sin6_flowinfo: 0,
        sin6_addr: addr,
        sin6_scope_id: 0,
    })
}

/// A `struct sock_common` image large enough to hold the IPv6 addresses.
fn sock_common(family: u16, num: u16, dport: u16) -> Vec<u8> {
    let mut bytes = vec![0u8; 88];
    bytes[12..14].copy_from_slice(&dport.to_be().to_ne_bytes());
    bytes[14..16].copy_from_slice(&num.to_ne_bytes());
    bytes[16..18].copy_from_slice(&family.to_ne_bytes());
    bytes
}

pub fn sock_common_v4(saddr: u32, num: u16, daddr: u32, dport: u16) -> Vec<u8> {
    let mut bytes = sock_common(AF_INET, num, dport);
    bytes[0..4].copy_from_slice(&daddr.to_ne_bytes());
    bytes[4..8].copy_from_slice(&saddr.to_ne_bytes());
    bytes
}

pub fn sock_common_v6(local: [u32; 4], num: u16) -> Vec<u8> {
    let mut bytes = sock_common(AF_INET6, num, 0);
    let start = SKC_V6_RCV_SADDR_OFFSET as usize;
    for (i, word) in local.iter().enumerate() {
        bytes[start + i * 4..start + i * 4 + 4].copy_from_slice(&word.to_ne_bytes());
    }
    bytes
}

/// A `struct socket` image whose `sk` pointer sits at `sk_offset`.
pub fn socket(sk_offset: u64, sk: u64) -> Vec<u8> {
    let offset = sk_offset as usize;
    let mut bytes = vec![0u8; offset + 8];
    bytes[offset..offset + 8].copy_from_slice(&sk.to_ne_bytes());
    bytes
}
