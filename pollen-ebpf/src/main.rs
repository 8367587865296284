#![no_std]
#![no_main]

mod env;

use aya_ebpf::{
    macros::{kprobe, tracepoint},
    programs::{ProbeContext, TracePointContext},
};
#[cfg(feature = "trace")]
use aya_log_ebpf::debug;
use pollen_common::{CaptureError, handler, kernel::SchedProcessForkArgs};

use crate::env::Kernel;

// =============================================================================
// Process Tracepoints
// =============================================================================

/// sched_process_fork tracepoint - child and parent pid of every new task
#[tracepoint]
pub fn sched_process_fork(ctx: TracePointContext) -> u32 {
    match try_sched_process_fork(&ctx) {
        Ok(()) => 0,
        Err(_err) => {
            #[cfg(feature = "trace")]
            debug!(&ctx, "sched_process_fork: dropped, reason={}", _err.code());
            0
        }
    }
}

fn try_sched_process_fork(ctx: &TracePointContext) -> Result<(), CaptureError> {
    let args: SchedProcessForkArgs =
        unsafe { ctx.read_at(0).map_err(|_| CaptureError::ReadFailed)? };
    handler::process_fork(&Kernel, &env::proc_events(ctx), &args)
}

/// sched_process_exit tracepoint - the exiting task is the current task
#[tracepoint]
pub fn sched_process_exit(ctx: TracePointContext) -> u32 {
    match handler::process_exit(&Kernel, &env::proc_events(&ctx)) {
        Ok(()) => 0,
        Err(_err) => {
            #[cfg(feature = "trace")]
            debug!(&ctx, "sched_process_exit: dropped, reason={}", _err.code());
            0
        }
    }
}

// =============================================================================
// Socket Kprobes
// =============================================================================

/// kprobe on __sys_bind(int fd, struct sockaddr __user *umyaddr, int addrlen)
#[kprobe]
pub fn sys_bind(ctx: ProbeContext) -> u32 {
    match try_sys_bind(&ctx) {
        Ok(()) => 0,
        Err(_err) => {
            #[cfg(feature = "trace")]
            debug!(&ctx, "__sys_bind: dropped, reason={}", _err.code());
            0
        }
    }
}

fn try_sys_bind(ctx: &ProbeContext) -> Result<(), CaptureError> {
    let uaddr: u64 = ctx.arg(1).ok_or(CaptureError::MissingArgument)?;
    handler::socket_bind(&Kernel, &env::net_events(ctx), uaddr)
}

/// kprobe on inet_listen(struct socket *sock, int backlog)
#[kprobe]
pub fn inet_listen(ctx: ProbeContext) -> u32 {
    match try_inet_listen(&ctx) {
        Ok(()) => 0,
        Err(_err) => {
            #[cfg(feature = "trace")]
            debug!(&ctx, "inet_listen: dropped, reason={}", _err.code());
            0
        }
    }
}

fn try_inet_listen(ctx: &ProbeContext) -> Result<(), CaptureError> {
    let sock: u64 = ctx.arg(0).ok_or(CaptureError::MissingArgument)?;
    handler::socket_listen(&Kernel, &env::net_events(ctx), sock, env::SOCKET_SK_OFFSET)
}

// =============================================================================
// Required for eBPF programs
// =============================================================================

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[unsafe(link_section = "license")]
#[unsafe(no_mangle)]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";
