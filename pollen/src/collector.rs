//! Draining ring buffers into decoded events.

use std::sync::Arc;

use aya::maps::{MapData, RingBuf};
use log::warn;
use pollen_common::EventFamily;
use pollen_common::ringbuf::SoftRingBuf;

use crate::decode::{Event, decode};

/// Something records can be drained from without blocking.
pub trait RecordSource {
    /// Hand every record available now to `f`, returning how many.
    fn drain(&mut self, f: &mut dyn FnMut(&[u8])) -> usize;
}

impl RecordSource for RingBuf<MapData> {
    fn drain(&mut self, f: &mut dyn FnMut(&[u8])) -> usize {
        let mut count = 0;
        while let Some(item) = self.next() {
            f(&*item);
            count += 1;
        }
        count
    }
}

impl RecordSource for Arc<SoftRingBuf> {
    fn drain(&mut self, f: &mut dyn FnMut(&[u8])) -> usize {
        self.consume(|record| f(record))
    }
}

/// Per-kind event counts
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Stats {
    pub forks: u64,
    pub exits: u64,
    pub binds: u64,
    pub listens: u64,
    pub decode_errors: u64,
}

impl Stats {
    fn count(&mut self, event: &Event) {
        match event {
            Event::Fork { .. } => self.forks += 1,
            Event::Exit { .. } => self.exits += 1,
            Event::Bind(_) => self.binds += 1,
            Event::Listen(_) => self.listens += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.forks + self.exits + self.binds + self.listens
    }
}

/// Drains one source per event family and decodes what it finds.
pub struct Collector {
    sources: Vec<(EventFamily, Box<dyn RecordSource>)>,
    stats: Stats,
}

impl Collector {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            stats: Stats::default(),
        }
    }

    pub fn add_source<S: RecordSource + 'static>(&mut self, family: EventFamily, source: S) {
        self.sources.push((family, Box::new(source)));
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Drain every source once. Undecodable records are counted and skipped.
    pub fn poll<F: FnMut(Event)>(&mut self, mut on_event: F) -> usize {
        let Self { sources, stats } = self;
        let mut decoded = 0;
        for (family, source) in sources.iter_mut() {
            let family = *family;
            source.drain(&mut |bytes: &[u8]| match decode(family, bytes) {
                Ok(event) => {
                    stats.count(&event);
                    decoded += 1;
                    on_event(event);
                }
                Err(e) => {
                    stats.decode_errors += 1;
                    warn!("Skipping {} byte {:?} record: {}", bytes.len(), family, e);
                }
            });
        }
        decoded
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}
