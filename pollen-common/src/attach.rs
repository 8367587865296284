//! Declarative table of attach points.
//!
//! The eBPF object exports one program per row under `program`; the loader
//! walks the table instead of naming programs itself.

use crate::{NET_EVENTS_MAP, PROC_EVENTS_MAP};

/// Kind of kernel hook
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookKind {
    /// Static tracepoint, attached by category and name
    TracePoint { category: &'static str },
    /// Dynamic probe on function entry
    KProbe,
}

/// Record family a program emits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventFamily {
    Process,
    Net,
}

impl EventFamily {
    /// Stable name of the ring buffer this family publishes to
    pub const fn map_name(self) -> &'static str {
        match self {
            Self::Process => PROC_EVENTS_MAP,
            Self::Net => NET_EVENTS_MAP,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachPoint {
    /// Program (function) name inside the eBPF object
    pub program: &'static str,
    pub kind: HookKind,
    /// Tracepoint name or kernel function symbol
    pub target: &'static str,
    pub family: EventFamily,
}

pub const ATTACH_POINTS: &[AttachPoint] = &[
    AttachPoint {
        program: "sched_process_fork",
        kind: HookKind::TracePoint { category: "sched" },
        target: "sched_process_fork",
        family: EventFamily::Process,
    },
    AttachPoint {
        program: "sched_process_exit",
        kind: HookKind::TracePoint { category: "sched" },
        target: "sched_process_exit",
        family: EventFamily::Process,
    },
    AttachPoint {
        program: "sys_bind",
        kind: HookKind::KProbe,
        target: "__sys_bind",
        family: EventFamily::Net,
    },
    AttachPoint {
        program: "inet_listen",
        kind: HookKind::KProbe,
        target: "inet_listen",
        family: EventFamily::Net,
    },
];

/// Attach points emitting any of `families`, in table order
pub fn for_families(
    families: &[EventFamily],
) -> impl Iterator<Item = &'static AttachPoint> + '_ {
    ATTACH_POINTS.iter().filter(|p| families.contains(&p.family))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_names_unique() {
        for (i, a) in ATTACH_POINTS.iter().enumerate() {
            for b in &ATTACH_POINTS[i + 1..] {
                assert_ne!(a.program, b.program);
            }
        }
    }

    #[test]
    fn test_every_family_has_points() {
        assert_eq!(for_families(&[EventFamily::Process]).count(), 2);
        assert_eq!(for_families(&[EventFamily::Net]).count(), 2);
    }

    #[test]
    fn test_for_families_keeps_table_order() {
        let net: std::vec::Vec<_> = for_families(&[EventFamily::Net])
            .map(|p| p.program)
            .collect();
        assert_eq!(net, ["sys_bind", "inet_listen"]);

        let all = for_families(&[EventFamily::Net, EventFamily::Process]);
        assert!(all.map(|p| p.program).eq(ATTACH_POINTS.iter().map(|p| p.program)));

        assert_eq!(for_families(&[]).count(), 0);
    }

    #[test]
    fn test_map_names() {
        assert_eq!(EventFamily::Process.map_name(), "PROC_EVENTS");
        assert_eq!(EventFamily::Net.map_name(), "NET_EVENTS");
    }
}
