//! Loading the embedded object and attaching its programs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use aya::{Ebpf, EbpfLoader};
use aya::maps::{MapData, RingBuf};
use aya::programs::{KProbe, TracePoint};
use log::{debug, info};
use pollen_common::{AttachPoint, EventFamily, HookKind};

/// Bump the memlock rlimit for older kernels that still account BPF maps
/// against it.
pub fn bump_memlock_rlimit() {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!("remove limit on locked memory failed, ret is: {ret}");
    }
}

/// Directory the output maps are pinned under, one file per map name
pub const DEFAULT_PIN_DIR: &str = "/sys/fs/bpf/pollen";

/// Pinned location of the ring buffer a family publishes to
pub fn pin_path(pin_dir: &Path, family: EventFamily) -> PathBuf {
    pin_dir.join(family.map_name())
}

/// Load the object, pinning its output maps under `pin_dir`. Maps already
/// pinned there by an earlier run are reused.
pub fn load(object: &[u8], pin_dir: &Path) -> anyhow::Result<Ebpf> {
    fs::create_dir_all(pin_dir)
        .with_context(|| format!("create pin directory {}", pin_dir.display()))?;
    let ebpf = EbpfLoader::new()
        .map_pin_path(pin_dir)
        .load(object)
        .context("load eBPF object")?;
    info!("Output maps pinned under {}", pin_dir.display());
    Ok(ebpf)
}

/// Load and attach one program.
pub fn attach(ebpf: &mut Ebpf, point: &AttachPoint) -> anyhow::Result<()> {
    let program = ebpf
        .program_mut(point.program)
        .ok_or_else(|| anyhow!("program {} missing from eBPF object", point.program))?;

    match point.kind {
        HookKind::TracePoint { category } => {
            let tracepoint: &mut TracePoint = program.try_into()?;
            tracepoint.load()?;
            tracepoint
                .attach(category, point.target)
                .with_context(|| format!("attach tracepoint {category}/{}", point.target))?;
            info!("Attached tracepoint {}/{}", category, point.target);
        }
        HookKind::KProbe => {
            let kprobe: &mut KProbe = program.try_into()?;
            kprobe.load()?;
            kprobe
                .attach(point.target, 0)
                .with_context(|| format!("attach kprobe {}", point.target))?;
            info!("Attached kprobe {}", point.target);
        }
    }
    Ok(())
}

/// Take the ring buffer a family publishes to.
pub fn take_ring(
    ebpf: &mut Ebpf,
    family: EventFamily,
    pin_dir: &Path,
) -> anyhow::Result<RingBuf<MapData>> {
    let name = family.map_name();
    let map = ebpf
        .take_map(name)
        .ok_or_else(|| anyhow!("map {name} missing from eBPF object"))?;
    let ring = RingBuf::try_from(map).with_context(|| format!("{name} is not a ring buffer"))?;
    info!(
        "{name} ring buffer connected, pinned at {}",
        pin_path(pin_dir, family).display()
    );
    Ok(ring)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_path_uses_map_name() {
        let dir = Path::new(DEFAULT_PIN_DIR);
        assert_eq!(
            pin_path(dir, EventFamily::Process),
            Path::new("/sys/fs/bpf/pollen/PROC_EVENTS")
        );
        assert_eq!(
            pin_path(dir, EventFamily::Net),
            Path::new("/sys/fs/bpf/pollen/NET_EVENTS")
        );
    }
}
