//! Decoding of raw ring buffer records.
//!
//! Readers accept records longer than the struct they know, so fields
//! appended by newer probes are skipped rather than rejected.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use pollen_common::{
    AF_INET, AF_INET6, EventFamily, NetEvent, NetEventType, ProcessEvent, ProcessEventType,
    Record,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record too short: {got} bytes, need {need}")]
    Short { got: usize, need: usize },
    #[error("unknown {family:?} event type {tag}")]
    UnknownType { family: EventFamily, tag: u32 },
}

/// A decoded record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Fork { pid: u32, ppid: u32, uid: u32 },
    Exit { pid: u32, uid: u32 },
    Bind(SocketEvent),
    Listen(SocketEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEvent {
    pub pid: u32,
    pub uid: u32,
    pub family: u16,
    /// `None` for families other than AF_INET/AF_INET6
    pub local: Option<SocketAddr>,
    /// `None` when the peer is unset
    pub remote: Option<SocketAddr>,
}

/// Decode one record from the ring buffer of `family`.
pub fn decode(family: EventFamily, bytes: &[u8]) -> Result<Event, DecodeError> {
    match family {
        EventFamily::Process => decode_process(bytes),
        EventFamily::Net => decode_net(bytes),
    }
}

fn read<R: Record>(bytes: &[u8]) -> Result<R, DecodeError> {
    if bytes.len() < R::SIZE {
        return Err(DecodeError::Short {
            got: bytes.len(),
            need: R::SIZE,
        });
    }
    // SAFETY: length checked above; records are plain integers.
    Ok(unsafe { (bytes.as_ptr() as *const R).read_unaligned() })
}

pub fn decode_process(bytes: &[u8]) -> Result<Event, DecodeError> {
    let record: ProcessEvent = read(bytes)?;
    match record.kind() {
        Some(ProcessEventType::Fork) => Ok(Event::Fork {
            pid: record.pid,
            ppid: record.ppid,
            uid: record.uid,
        }),
        Some(ProcessEventType::Exit) => Ok(Event::Exit {
            pid: record.pid,
            uid: record.uid,
        }),
        None => Err(DecodeError::UnknownType {
            family: EventFamily::Process,
            tag: record.event_type,
        }),
    }
}

pub fn decode_net(bytes: &[u8]) -> Result<Event, DecodeError> {
    let record: NetEvent = read(bytes)?;
    let kind = record.kind().ok_or(DecodeError::UnknownType {
        family: EventFamily::Net,
        tag: record.event_type,
    })?;

    let family = record.family as u16;
    let local = socket_addr(family, record.port, record.ip4_addr, record.ip6_addr);
    let remote = socket_addr(
        family,
        record.remote_port,
        record.remote_ip4,
        record.remote_ip6,
    )
    .filter(|addr| addr.port() != 0 || !addr.ip().is_unspecified());

    let socket = SocketEvent {
        pid: record.pid,
        uid: record.uid,
        family,
        local,
        remote,
    };
    Ok(match kind {
        NetEventType::Bind => Event::Bind(socket),
        NetEventType::Listen => Event::Listen(socket),
    })
}

/// Addresses arrive in network byte order, read as native words.
fn socket_addr(family: u16, port: u32, ip4: u32, ip6: [u32; 4]) -> Option<SocketAddr> {
    let ip = match family {
        AF_INET => IpAddr::V4(Ipv4Addr::from(ip4.to_ne_bytes())),
        AF_INET6 => {
            let mut octets = [0u8; 16];
            for (chunk, word) in octets.chunks_exact_mut(4).zip(ip6) {
                chunk.copy_from_slice(&word.to_ne_bytes());
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };
    Some(SocketAddr::new(ip, port as u16))
}

fn family_name(family: u16) -> String {
    match family {
        AF_INET => "AF_INET".to_string(),
        AF_INET6 => "AF_INET6".to_string(),
        1 => "AF_UNIX".to_string(),
        other => other.to_string(),
    }
}

impl fmt::Display for SocketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pid={} uid={} family={}",
            self.pid,
            self.uid,
            family_name(self.family)
        )?;
        if let Some(local) = self.local {
            write!(f, " local={local}")?;
        }
        if let Some(remote) = self.remote {
            write!(f, " remote={remote}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Fork { pid, ppid, uid } => write!(f, "[FORK] pid={pid} ppid={ppid} uid={uid}"),
            Event::Exit { pid, uid } => write!(f, "[EXIT] pid={pid} uid={uid}"),
            Event::Bind(socket) => write!(f, "[BIND] {socket}"),
            Event::Listen(socket) => write!(f, "[LISTEN] {socket}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollen_common::SocketAddress;

    #[test]
    fn test_decode_fork() {
        let record = ProcessEvent::fork(105, 100, 0);
        assert_eq!(
            decode_process(record.encode()).unwrap(),
            Event::Fork {
                pid: 105,
                ppid: 100,
                uid: 0
            }
        );
    }

    #[test]
    fn test_decode_exit() {
        let record = ProcessEvent::exit(105, 1000);
        let event = decode_process(record.encode()).unwrap();
        assert_eq!(event, Event::Exit { pid: 105, uid: 1000 });
        assert_eq!(event.to_string(), "[EXIT] pid=105 uid=1000");
    }

    #[test]
    fn test_decode_tolerates_trailing_bytes() {
        let mut bytes = ProcessEvent::fork(1, 2, 3).encode().to_vec();
        bytes.extend_from_slice(&[0xaa; 12]);
        assert_eq!(
            decode_process(&bytes).unwrap(),
            Event::Fork {
                pid: 1,
                ppid: 2,
                uid: 3
            }
        );
    }

    #[test]
    fn test_decode_short_record() {
        let bytes = ProcessEvent::fork(1, 2, 3).encode()[..12].to_vec();
        assert_eq!(
            decode_process(&bytes),
            Err(DecodeError::Short { got: 12, need: 16 })
        );
    }

    #[test]
    fn test_decode_unknown_tag() {
        let mut record = NetEvent::new(NetEventType::Bind, 1, 0);
        record.event_type = 9;
        assert_eq!(
            decode_net(record.encode()),
            Err(DecodeError::UnknownType {
                family: EventFamily::Net,
                tag: 9
            })
        );
    }

    #[test]
    fn test_decode_bind_ipv4() {
        let mut record = NetEvent::new(NetEventType::Bind, 42, 1000);
        record.set_local(SocketAddress::V4 {
            port: 8080,
            addr: u32::from_ne_bytes([127, 0, 0, 1]),
        });
        let event = decode(EventFamily::Net, record.encode()).unwrap();
        let Event::Bind(socket) = &event else {
            panic!("expected bind, got {event:?}");
        };
        assert_eq!(socket.local, Some("127.0.0.1:8080".parse().unwrap()));
        assert_eq!(socket.remote, None);
        assert_eq!(
            event.to_string(),
            "[BIND] pid=42 uid=1000 family=AF_INET local=127.0.0.1:8080"
        );
    }

    #[test]
    fn test_decode_listen_ipv6() {
        let mut record = NetEvent::new(NetEventType::Listen, 7, 0);
        let loopback = [0, 0, 0, u32::from_ne_bytes([0, 0, 0, 1])];
        record.set_local(SocketAddress::V6 {
            port: 443,
            addr: loopback,
        });
        record.set_remote(SocketAddress::V6 {
            port: 0,
            addr: [0; 4],
        });
        let event = decode(EventFamily::Net, record.encode()).unwrap();
        assert_eq!(
            event,
            Event::Listen(SocketEvent {
                pid: 7,
                uid: 0,
                family: AF_INET6,
                local: Some("[::1]:443".parse().unwrap()),
                remote: None,
            })
        );
    }

    #[test]
    fn test_decode_unix_family_has_no_address() {
        let mut record = NetEvent::new(NetEventType::Bind, 7, 0);
        record.set_local(SocketAddress::Other { family: 1 });
        let event = decode_net(record.encode()).unwrap();
        assert_eq!(event.to_string(), "[BIND] pid=7 uid=0 family=AF_UNIX");
    }
}
