//! User-space model of the BPF ring buffer.
//!
//! Follows the kernel's record format and reservation protocol so handlers can
//! be driven and checked outside the kernel: every record starts with an
//! 8 byte header whose length word carries a BUSY bit until commit and a
//! DISCARD bit for abandoned slots, and record sizes are rounded up to 8.
//! Producers serialize on a lock only to move the producer position; commits
//! are a single atomic header store. The consumer stops at the first record
//! still marked BUSY, so it never sees a partially written record and each
//! producer's records come out in reservation order.

use std::boxed::Box;
use std::cell::UnsafeCell;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::vec::Vec;

use crate::env::{CaptureError, Publisher};
use crate::event::Record;

/// Size of the per-record header
pub const HEADER_LEN: usize = 8;

const BUSY_BIT: u32 = 1 << 31;
const DISCARD_BIT: u32 = 1 << 30;
const LEN_MASK: u32 = !(BUSY_BIT | DISCARD_BIT);

#[inline]
const fn record_span(len: usize) -> u64 {
    ((len + HEADER_LEN + 7) & !7) as u64
}

pub struct SoftRingBuf {
    data: Box<[UnsafeCell<u8>]>,
    /// One header word per 8 byte granule of `data`
    headers: Box<[AtomicU32]>,
    mask: u64,
    producer_lock: Mutex<()>,
    consumer_lock: Mutex<()>,
    producer_pos: AtomicU64,
    consumer_pos: AtomicU64,
    committed: AtomicU64,
    dropped: AtomicU64,
}

// SAFETY: every byte of `data` is written only by the producer holding the
// reservation covering it, and read by the consumer only after that
// reservation's header was released without BUSY. Positions and headers are
// atomics.
unsafe impl Sync for SoftRingBuf {}

impl SoftRingBuf {
    /// Create a ring buffer of `byte_size` bytes.
    ///
    /// # Panics
    ///
    /// If `byte_size` is not a power of two of at least 16 bytes, as the
    /// kernel rejects such maps at creation.
    pub fn with_byte_size(byte_size: usize) -> Self {
        assert!(
            byte_size.is_power_of_two() && byte_size >= 2 * HEADER_LEN,
            "ring buffer size must be a power of two >= 16, got {byte_size}"
        );
        Self {
            data: (0..byte_size).map(|_| UnsafeCell::new(0)).collect(),
            headers: (0..byte_size / HEADER_LEN).map(|_| AtomicU32::new(0)).collect(),
            mask: byte_size as u64 - 1,
            producer_lock: Mutex::new(()),
            consumer_lock: Mutex::new(()),
            producer_pos: AtomicU64::new(0),
            consumer_pos: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Records committed so far
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    /// Reservations refused for lack of space
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Bytes reserved but not yet consumed, headers included
    pub fn pending_bytes(&self) -> u64 {
        self.producer_pos.load(Ordering::Acquire) - self.consumer_pos.load(Ordering::Acquire)
    }

    fn header(&self, pos: u64) -> &AtomicU32 {
        &self.headers[((pos & self.mask) as usize) / HEADER_LEN]
    }

    /// Reserve `len` bytes. Returns `None` without blocking when the buffer
    /// cannot hold the record right now.
    pub fn reserve(&self, len: usize) -> Option<Slot<'_>> {
        if len == 0 || len > LEN_MASK as usize || record_span(len) > self.data.len() as u64 {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let span = record_span(len);

        let _guard = self.producer_lock.lock().unwrap_or_else(|e| e.into_inner());
        let pos = self.producer_pos.load(Ordering::Relaxed);
        let consumed = self.consumer_pos.load(Ordering::Acquire);
        if pos + span - consumed > self.data.len() as u64 {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        self.header(pos).store(len as u32 | BUSY_BIT, Ordering::Relaxed);
        // Publishes the BUSY header along with the new position.
        self.producer_pos.store(pos + span, Ordering::Release);

        Some(Slot {
            ring: self,
            pos,
            len,
            done: false,
        })
    }

    /// Hand every committed record, in order, to `f`. Stops at the first
    /// record that is still being written. Returns the number of records
    /// delivered; discarded slots are skipped silently.
    pub fn consume<F: FnMut(&[u8])>(&self, mut f: F) -> usize {
        let _guard = self.consumer_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut pos = self.consumer_pos.load(Ordering::Relaxed);
        let mut record = Vec::new();
        let mut delivered = 0;

        while pos < self.producer_pos.load(Ordering::Acquire) {
            let header = self.header(pos).load(Ordering::Acquire);
            if header & BUSY_BIT != 0 {
                break;
            }
            let len = (header & LEN_MASK) as usize;
            if header & DISCARD_BIT == 0 {
                record.clear();
                record.extend((0..len).map(|i| {
                    let idx = ((pos + (HEADER_LEN + i) as u64) & self.mask) as usize;
                    // SAFETY: committed record, no producer writes here until
                    // consumer_pos moves past it below.
                    unsafe { *self.data[idx].get() }
                }));
                f(&record);
                delivered += 1;
            }
            pos += record_span(len);
            self.consumer_pos.store(pos, Ordering::Release);
        }
        delivered
    }
}

impl<R: Record> Publisher<R> for SoftRingBuf {
    fn publish(&self, record: &R) -> Result<(), CaptureError> {
        let mut slot = self.reserve(R::SIZE).ok_or(CaptureError::BufferFull)?;
        slot.copy_from_slice(record.encode());
        slot.commit();
        Ok(())
    }
}

/// Exclusive write access to one reserved record.
///
/// Dropping a slot without committing discards it.
pub struct Slot<'a> {
    ring: &'a SoftRingBuf,
    pos: u64,
    len: usize,
    done: bool,
}

impl Slot<'_> {
    /// Fill the slot.
    ///
    /// # Panics
    ///
    /// If `bytes` is not exactly the reserved length.
    pub fn copy_from_slice(&mut self, bytes: &[u8]) {
        assert_eq!(bytes.len(), self.len, "slot length mismatch");
        for (i, byte) in bytes.iter().enumerate() {
            let idx = ((self.pos + (HEADER_LEN + i) as u64) & self.ring.mask) as usize;
            // SAFETY: this slot exclusively owns the reserved span.
            unsafe { *self.ring.data[idx].get() = *byte };
        }
    }

    /// Make the record visible to the consumer.
    pub fn commit(mut self) {
        self.finish(0);
        self.ring.committed.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&mut self, flags: u32) {
        self.done = true;
        self.ring
            .header(self.pos)
            .store(self.len as u32 | flags, Ordering::Release);
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.finish(DISCARD_BIT);
        }
    }
}
