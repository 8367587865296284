//! One handler per event family, shared by every target environment.
//!
//! Handlers build the record on the stack, then publish it once. Any error
//! means "no record for this event"; nothing is partially emitted.

use crate::env::{CaptureError, Environment, Publisher};
use crate::event::{NetEvent, NetEventType, ProcessEvent, SocketAddress};
use crate::kernel::{
    SKC_V6_DADDR_OFFSET, SKC_V6_RCV_SADDR_OFFSET, SchedProcessForkArgs, SockCommonHead,
    SockaddrFamily, SockaddrIn, SockaddrIn6,
};
use crate::{AF_INET, AF_INET6};

/// sched_process_fork: child and parent pid come straight from the
/// tracepoint record.
#[inline(always)]
pub fn process_fork<E, P>(env: &E, out: &P, args: &SchedProcessForkArgs) -> Result<(), CaptureError>
where
    E: Environment,
    P: Publisher<ProcessEvent>,
{
    let event = ProcessEvent::fork(
        args.child_pid as u32,
        args.parent_pid as u32,
        env.current_uid(),
    );
    out.publish(&event)
}

/// sched_process_exit: the exiting task is the current task.
#[inline(always)]
pub fn process_exit<E, P>(env: &E, out: &P) -> Result<(), CaptureError>
where
    E: Environment,
    P: Publisher<ProcessEvent>,
{
    let event = ProcessEvent::exit(env.current_pid(), env.current_uid());
    out.publish(&event)
}

/// `__sys_bind(fd, struct sockaddr __user *umyaddr, addrlen)`
///
/// `uaddr` is the second argument.
#[inline(always)]
pub fn socket_bind<E, P>(env: &E, out: &P, uaddr: u64) -> Result<(), CaptureError>
where
    E: Environment,
    P: Publisher<NetEvent>,
{
    if uaddr == 0 {
        return Err(CaptureError::NullPointer);
    }
    let local = read_user_sockaddr(env, uaddr)?;

    let mut event = NetEvent::new(NetEventType::Bind, env.current_tgid(), env.current_uid());
    event.set_local(local);
    out.publish(&event)
}

/// `inet_listen(struct socket *sock, int backlog)`
///
/// `sock` is the first argument; `sk_offset` is the offset of `sk` within
/// `struct socket` for the target kernel.
#[inline(always)]
pub fn socket_listen<E, P>(env: &E, out: &P, sock: u64, sk_offset: u64) -> Result<(), CaptureError>
where
    E: Environment,
    P: Publisher<NetEvent>,
{
    if sock == 0 {
        return Err(CaptureError::NullPointer);
    }
    let sk: u64 = env.read_kernel(sock + sk_offset)?;
    if sk == 0 {
        return Err(CaptureError::NullPointer);
    }
    let (local, remote) = read_sock_common(env, sk)?;

    let mut event = NetEvent::new(NetEventType::Listen, env.current_tgid(), env.current_uid());
    event.set_local(local);
    event.set_remote(remote);
    out.publish(&event)
}

/// Read the family, then only the variant that family implies.
#[inline(always)]
pub fn read_user_sockaddr<E: Environment>(env: &E, addr: u64) -> Result<SocketAddress, CaptureError> {
    let family = env.read_user::<SockaddrFamily>(addr)?.sa_family;
    let address = match family {
        AF_INET => {
            let sa: SockaddrIn = env.read_user(addr)?;
            SocketAddress::V4 {
                port: u16::from_be(sa.sin_port),
                addr: sa.sin_addr,
            }
        }
        AF_INET6 => {
            let sa: SockaddrIn6 = env.read_user(addr)?;
            SocketAddress::V6 {
                port: u16::from_be(sa.sin6_port),
                addr: sa.sin6_addr,
            }
        }
        family => SocketAddress::Other { family },
    };
    Ok(address)
}

/// (local, remote) addresses of a `struct sock`.
#[inline(always)]
pub fn read_sock_common<E: Environment>(
    env: &E,
    sk: u64,
) -> Result<(SocketAddress, SocketAddress), CaptureError> {
    let head: SockCommonHead = env.read_kernel(sk)?;
    let remote_port = u16::from_be(head.skc_dport);
    let pair = match head.skc_family {
        AF_INET => (
            SocketAddress::V4 {
                port: head.skc_num,
                addr: head.skc_rcv_saddr,
            },
            SocketAddress::V4 {
                port: remote_port,
                addr: head.skc_daddr,
            },
        ),
        AF_INET6 => {
            let local: [u32; 4] = env.read_kernel(sk + SKC_V6_RCV_SADDR_OFFSET)?;
            let remote: [u32; 4] = env.read_kernel(sk + SKC_V6_DADDR_OFFSET)?;
            (
                SocketAddress::V6 {
                    port: head.skc_num,
                    addr: local,
                },
                SocketAddress::V6 {
                    port: remote_port,
                    addr: remote,
                },
            )
        }
        family => (SocketAddress::Other { family }, SocketAddress::Other { family }),
    };
    Ok(pair)
}
