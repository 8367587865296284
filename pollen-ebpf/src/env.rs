//! Target environment, selected at build time.
//!
//! Each environment supplies the ring buffer maps, the publish primitive, the
//! uid accessor and the probe-read helpers. Exactly one is compiled in.
//!
//! Output maps are pinned by name, so a collector other than the loader can
//! open them from the pin directory.

use aya_ebpf::{EbpfContext, helpers::bpf_get_current_pid_tgid};
use pollen_common::{CaptureError, Environment, NetEvent, ProcessEvent, Publisher};

#[cfg(not(any(feature = "env-full", feature = "env-restricted")))]
compile_error!("no target environment selected: enable `env-full` or `env-restricted`");

#[cfg(all(feature = "env-full", feature = "env-restricted"))]
compile_error!("`env-full` and `env-restricted` are mutually exclusive");

/// Offset of `sk` within `struct socket` on the target kernel
#[cfg(not(feature = "socket-wq"))]
pub const SOCKET_SK_OFFSET: u64 = pollen_common::kernel::SOCKET_SK_OFFSET;
#[cfg(feature = "socket-wq")]
pub const SOCKET_SK_OFFSET: u64 = pollen_common::kernel::SOCKET_WQ_SK_OFFSET;

/// The running kernel, as seen from inside a program
pub struct Kernel;

impl Environment for Kernel {
    #[inline(always)]
    fn current_pid_tgid(&self) -> u64 {
        bpf_get_current_pid_tgid()
    }

    #[inline(always)]
    fn current_uid_gid(&self) -> u64 {
        imp::current_uid_gid()
    }

    #[inline(always)]
    fn read_user<T: Copy>(&self, addr: u64) -> Result<T, CaptureError> {
        unsafe { imp::read_user(addr as *const T) }.map_err(|_| CaptureError::ReadFailed)
    }

    #[inline(always)]
    fn read_kernel<T: Copy>(&self, addr: u64) -> Result<T, CaptureError> {
        unsafe { imp::read_kernel(addr as *const T) }.map_err(|_| CaptureError::ReadFailed)
    }
}

/// Publisher for process records
#[inline(always)]
pub fn proc_events<C: EbpfContext>(ctx: &C) -> impl Publisher<ProcessEvent> {
    imp::Output::new(&imp::PROC_EVENTS, ctx)
}

/// Publisher for socket records
#[inline(always)]
pub fn net_events<C: EbpfContext>(ctx: &C) -> impl Publisher<NetEvent> {
    imp::Output::new(&imp::NET_EVENTS, ctx)
}

// =============================================================================
// Full: BPF ring buffer, split user/kernel reads, uid capture
// =============================================================================

#[cfg(feature = "env-full")]
mod imp {
    use core::marker::PhantomData;

    use aya_ebpf::{
        EbpfContext,
        helpers::{bpf_get_current_uid_gid, bpf_probe_read_kernel, bpf_probe_read_user},
        macros::map,
        maps::RingBuf,
    };
    use pollen_common::{CaptureError, Publisher, RING_BUFFER_BYTES, Record};

    #[map]
    pub static PROC_EVENTS: RingBuf = RingBuf::pinned(RING_BUFFER_BYTES, 0);

    #[map]
    pub static NET_EVENTS: RingBuf = RingBuf::pinned(RING_BUFFER_BYTES, 0);

    #[inline(always)]
    pub fn current_uid_gid() -> u64 {
        bpf_get_current_uid_gid()
    }

    #[inline(always)]
    pub unsafe fn read_user<T>(src: *const T) -> Result<T, i64> {
        unsafe { bpf_probe_read_user(src) }
    }

    #[inline(always)]
    pub unsafe fn read_kernel<T>(src: *const T) -> Result<T, i64> {
        unsafe { bpf_probe_read_kernel(src) }
    }

    pub struct Output<'a, C> {
        map: &'static RingBuf,
        _ctx: PhantomData<&'a C>,
    }

    impl<'a, C: EbpfContext> Output<'a, C> {
        #[inline(always)]
        pub fn new(map: &'static RingBuf, _ctx: &'a C) -> Self {
            Self {
                map,
                _ctx: PhantomData,
            }
        }
    }

    impl<R: Record, C> Publisher<R> for Output<'_, C> {
        #[inline(always)]
        fn publish(&self, record: &R) -> Result<(), CaptureError> {
            let mut entry = self.map.reserve::<R>(0).ok_or(CaptureError::BufferFull)?;
            entry.write(*record);
            entry.submit(0);
            Ok(())
        }
    }
}

// =============================================================================
// Restricted: perf event array, legacy probe read, no uid
// =============================================================================

#[cfg(feature = "env-restricted")]
mod imp {
    use aya_ebpf::{EbpfContext, helpers::bpf_probe_read, macros::map, maps::PerfEventArray};
    use pollen_common::{CaptureError, NetEvent, ProcessEvent, Publisher, Record};

    #[map]
    pub static PROC_EVENTS: PerfEventArray<ProcessEvent> = PerfEventArray::pinned(0);

    #[map]
    pub static NET_EVENTS: PerfEventArray<NetEvent> = PerfEventArray::pinned(0);

    /// Not available here; records carry uid 0
    #[inline(always)]
    pub fn current_uid_gid() -> u64 {
        0
    }

    #[inline(always)]
    pub unsafe fn read_user<T>(src: *const T) -> Result<T, i64> {
        unsafe { bpf_probe_read(src) }
    }

    #[inline(always)]
    pub unsafe fn read_kernel<T>(src: *const T) -> Result<T, i64> {
        unsafe { bpf_probe_read(src) }
    }

    pub struct Output<'a, C, R: 'static> {
        map: &'static PerfEventArray<R>,
        ctx: &'a C,
    }

    impl<'a, C: EbpfContext, R> Output<'a, C, R> {
        #[inline(always)]
        pub fn new(map: &'static PerfEventArray<R>, ctx: &'a C) -> Self {
            Self { map, ctx }
        }
    }

    // Perf output copies the record in one helper call and reports no space
    // errors back to the program, so a full buffer shows up only as lost
    // samples on the reader side.
    impl<R: Record, C: EbpfContext> Publisher<R> for Output<'_, C, R> {
        #[inline(always)]
        fn publish(&self, record: &R) -> Result<(), CaptureError> {
            self.map.output(self.ctx, record, 0);
            Ok(())
        }
    }
}
