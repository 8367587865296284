mod collector;
mod decode;
mod loader;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use log::{info, warn};
use pollen_common::{EventFamily, attach};

use crate::collector::Collector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Family {
    /// Process fork and exit
    Process,
    /// Socket bind and listen
    Net,
}

impl From<Family> for EventFamily {
    fn from(family: Family) -> Self {
        match family {
            Family::Process => EventFamily::Process,
            Family::Net => EventFamily::Net,
        }
    }
}

#[derive(Debug, Parser)]
struct Opt {
    /// Event families to capture; repeat for several (default: all)
    #[clap(short, long = "family", value_enum)]
    families: Vec<Family>,

    /// Delay between ring buffer polls
    #[clap(long, default_value_t = 10)]
    poll_interval_ms: u64,

    /// Directory the output ring buffers are pinned under (bpffs)
    #[clap(long, default_value = loader::DEFAULT_PIN_DIR)]
    pin_path: PathBuf,

    /// Do not print per-kind totals on exit
    #[clap(long)]
    no_summary: bool,
}

impl Opt {
    fn event_families(&self) -> Vec<EventFamily> {
        if self.families.is_empty() {
            return vec![EventFamily::Process, EventFamily::Net];
        }
        [Family::Process, Family::Net]
            .into_iter()
            .filter(|f| self.families.contains(f))
            .map(EventFamily::from)
            .collect()
    }
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();

    env_logger::init();

    loader::bump_memlock_rlimit();

    let mut ebpf = loader::load(
        aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/pollen")),
        &opt.pin_path,
    )?;

    // Only carries messages when the object was built with `trace`
    if let Err(e) = aya_log::EbpfLogger::init(&mut ebpf) {
        warn!("failed to initialize eBPF logger: {e}");
    }

    let families = opt.event_families();
    for point in attach::for_families(&families) {
        loader::attach(&mut ebpf, point)?;
    }

    let mut collector = Collector::new();
    for &family in &families {
        collector.add_source(family, loader::take_ring(&mut ebpf, family, &opt.pin_path)?);
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    info!("Waiting for events, press Ctrl+C to stop");
    let interval = Duration::from_millis(opt.poll_interval_ms);
    while running.load(Ordering::SeqCst) {
        collector.poll(|event| println!("{event}"));
        std::thread::sleep(interval);
    }
    // Whatever arrived between the last poll and Ctrl+C
    collector.poll(|event| println!("{event}"));

    if !opt.no_summary {
        let stats = collector.stats();
        println!();
        println!("===========================================");
        println!("  Summary");
        println!("===========================================");
        println!("  Process fork:   {}", stats.forks);
        println!("  Process exit:   {}", stats.exits);
        println!("  Socket bind:    {}", stats.binds);
        println!("  Socket listen:  {}", stats.listens);
        println!("  Undecodable:    {}", stats.decode_errors);
        println!("  Total events:   {}", stats.total());
        println!("===========================================");
    }

    info!("Exiting...");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_families_is_all() {
        let opt = Opt::parse_from(["pollen"]);
        assert_eq!(
            opt.event_families(),
            [EventFamily::Process, EventFamily::Net]
        );
        assert_eq!(opt.poll_interval_ms, 10);
        assert_eq!(opt.pin_path, PathBuf::from("/sys/fs/bpf/pollen"));
        assert!(!opt.no_summary);
    }

    #[test]
    fn test_family_flag_repeats() {
        let opt = Opt::parse_from(["pollen", "--family", "net", "-f", "net"]);
        assert_eq!(opt.event_families(), [EventFamily::Net]);
    }

    #[test]
    fn test_family_flag_repeats_non_adjacent() {
        let opt = Opt::parse_from(["pollen", "-f", "net", "-f", "process", "-f", "net"]);
        assert_eq!(
            opt.event_families(),
            [EventFamily::Process, EventFamily::Net]
        );
    }
}
