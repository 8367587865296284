//! Capabilities a handler needs from its execution environment.
//!
//! The eBPF crate provides exactly one implementation per build, chosen by
//! cargo feature, so handlers are monomorphized against it and carry no
//! runtime dispatch. Tests provide an in-memory one.

use crate::event::Record;

/// Reason a single event was not emitted.
///
/// Never surfaced to the traced process: the program wrapper always returns 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureError {
    /// The hook context did not carry the expected argument
    MissingArgument,
    /// A pointer argument was null
    NullPointer,
    /// A bounds-checked memory read faulted
    ReadFailed,
    /// No space left in the ring buffer
    BufferFull,
}

impl CaptureError {
    /// Small numeric code for trace output
    pub const fn code(self) -> u32 {
        match self {
            Self::MissingArgument => 1,
            Self::NullPointer => 2,
            Self::ReadFailed => 3,
            Self::BufferFull => 4,
        }
    }
}

/// Current-task accessors and bounds-checked memory reads.
pub trait Environment {
    /// `tgid << 32 | pid` of the current task
    fn current_pid_tgid(&self) -> u64;

    /// `gid << 32 | uid` of the current task, or 0 where unsupported
    fn current_uid_gid(&self) -> u64;

    /// Copy a `T` from user memory. Fails instead of faulting.
    fn read_user<T: Copy>(&self, addr: u64) -> Result<T, CaptureError>;

    /// Copy a `T` from kernel memory. Fails instead of faulting.
    fn read_kernel<T: Copy>(&self, addr: u64) -> Result<T, CaptureError>;

    #[inline(always)]
    fn current_tgid(&self) -> u32 {
        (self.current_pid_tgid() >> 32) as u32
    }

    #[inline(always)]
    fn current_pid(&self) -> u32 {
        self.current_pid_tgid() as u32
    }

    #[inline(always)]
    fn current_uid(&self) -> u32 {
        self.current_uid_gid() as u32
    }
}

/// Hands a populated record to a ring buffer.
///
/// Implementations reserve `R::SIZE` bytes, copy the record in and commit it
/// in one step. A failed reservation returns [`CaptureError::BufferFull`] and
/// leaves nothing behind; there is no retry.
pub trait Publisher<R: Record> {
    fn publish(&self, record: &R) -> Result<(), CaptureError>;
}
