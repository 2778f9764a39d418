//! Ring-Based Multi-Threaded Writer
//!
//! A bounded single-producer ring of record slots connects three roles:
//!
//! ```text
//!            claim/fill            build (compress)          write in order
//! producer ──────────────▶ slot ───────────────────▶ slot ────────────────▶ file
//!   (API caller)            ▲   compressor k owns                I/O thread
//!      ▲                    │   slots with seq % N == k              │
//!      └────────────────────┴──────────── release ◀─────────────────┘
//! ```
//!
//! Ownership of a slot moves producer → compressor → writer → producer,
//! gated by three sequence counters:
//!
//! - the producer may claim sequence `s` once `s < released + ring_size`;
//! - compressor `k` may build sequence `s` once `s < published` and
//!   `s % N == k` (a strided partition, so each slot has one owner);
//! - the I/O thread consumes sequences in order `0, 1, 2, ...`, waiting on
//!   the per-slot compressed marker.
//!
//! Compression runs out of order in wall time, but the I/O thread consumes
//! strictly in submission order, so on-disk record order equals `add_event`
//! call order — and since the sink patches record numbers as it writes, the
//! bytes on disk are identical for any number of compression workers.
//!
//! Each wait depends only on a strictly earlier sequence being made
//! available by a single other party, so the waits are bounded and the
//! pipeline cannot deadlock. Shutdown travels through the ring as a marker
//! on the last published slot; worker errors are latched and re-raised on
//! the next `add_event` or `close`, while the I/O thread keeps draining
//! (without writing) so no one blocks forever.
//!
//! Split decisions belong to the I/O thread's [`FileSink`]; the producer
//! and compressors never touch the file.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_utils::{Backoff, CachePadded};
use evio_core::ByteOrder;
use tracing::warn;

use crate::error::{Error, Result};
use crate::record::RecordOutput;
use crate::writer::{FileSink, WriterConfig};

/// Marker for "no sequence compressed yet" in a slot's gate.
const SEQ_EMPTY: u64 = u64::MAX;
/// Marker for "end not yet announced".
const NO_FINAL: u64 = u64::MAX;

/// One ring slot: a reusable record plus the end-of-stream flag.
struct RingItem {
    record: RecordOutput,
    last: bool,
}

struct RingShared {
    mask: u64,
    slots: Vec<Mutex<RingItem>>,
    /// Sequences `< published` are filled and visible to compressors.
    published: CachePadded<AtomicU64>,
    /// Per-slot gate: holds the sequence whose build completed.
    compressed: Vec<CachePadded<AtomicU64>>,
    /// Sequences `< released` have been written and their slots recycled.
    released: CachePadded<AtomicU64>,
    /// One past the last sequence that will ever be published.
    final_count: CachePadded<AtomicU64>,
    failed: Mutex<Option<Error>>,
    has_failed: AtomicBool,
}

impl RingShared {
    fn latch(&self, error: Error) {
        warn!(error = %error, "ring worker failure latched");
        let mut guard = self.failed.lock().unwrap();
        if guard.is_none() {
            *guard = Some(error);
        }
        self.has_failed.store(true, Ordering::Release);
    }

    fn check_failed(&self) -> Result<()> {
        if self.has_failed.load(Ordering::Acquire) {
            let guard = self.failed.lock().unwrap();
            if let Some(e) = guard.as_ref() {
                return Err(e.duplicate());
            }
        }
        Ok(())
    }
}

/// Multi-threaded writer: N compression workers and one I/O worker
/// producing records in submission order through a bounded ring.
pub struct RingWriter {
    shared: Arc<RingShared>,
    claimed: Option<u64>,
    next_seq: u64,
    byte_order: ByteOrder,
    compressors: Vec<JoinHandle<()>>,
    io_thread: Option<JoinHandle<()>>,
    closed: bool,
}

impl RingWriter {
    pub fn new(path_template: impl AsRef<str>, config: WriterConfig) -> Result<RingWriter> {
        config.validate()?;
        let sink = FileSink::new(path_template.as_ref(), config.clone())?;
        let byte_order = sink.byte_order();

        let ring_size = config.ring_size;
        let slots = (0..ring_size)
            .map(|_| {
                Mutex::new(RingItem {
                    record: RecordOutput::new(
                        byte_order,
                        config.max_event_count,
                        config.max_record_bytes,
                        config.compression,
                    ),
                    last: false,
                })
            })
            .collect();
        let compressed = (0..ring_size)
            .map(|_| CachePadded::new(AtomicU64::new(SEQ_EMPTY)))
            .collect();

        let shared = Arc::new(RingShared {
            mask: (ring_size - 1) as u64,
            slots,
            published: CachePadded::new(AtomicU64::new(0)),
            compressed,
            released: CachePadded::new(AtomicU64::new(0)),
            final_count: CachePadded::new(AtomicU64::new(NO_FINAL)),
            failed: Mutex::new(None),
            has_failed: AtomicBool::new(false),
        });

        let stride = config.comp_threads as u64;
        let mut compressors = Vec::with_capacity(config.comp_threads);
        for k in 0..config.comp_threads {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("evio-compressor-{k}"))
                .spawn(move || compressor_loop(&shared, k as u64, stride))
                .map_err(Error::Io)?;
            compressors.push(handle);
        }

        let io_shared = Arc::clone(&shared);
        let io_thread = thread::Builder::new()
            .name("evio-record-writer".to_string())
            .spawn(move || io_loop(io_shared, sink))
            .map_err(Error::Io)?;

        Ok(RingWriter {
            shared,
            claimed: None,
            next_seq: 0,
            byte_order,
            compressors,
            io_thread: Some(io_thread),
            closed: false,
        })
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Append one event. Blocks only when the ring is full (the I/O thread
    /// has not yet released the slot `ring_size` sequences back). A worker
    /// failure from earlier records is re-raised here.
    pub fn add_event(&mut self, event: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidConfig("writer is closed".into()));
        }
        self.shared.check_failed()?;

        loop {
            let seq = match self.claimed {
                Some(s) => s,
                None => {
                    let s = self.claim(true)?;
                    self.claimed = Some(s);
                    s
                }
            };

            {
                let mut item = self.shared.slots[(seq & self.shared.mask) as usize]
                    .lock()
                    .unwrap();
                if item.record.try_add_event(event) {
                    return Ok(());
                }
            }

            // slot is full: hand it to its compressor and claim the next
            self.shared
                .published
                .store(seq + 1, Ordering::Release);
            self.claimed = None;
        }
    }

    /// Wait for a free slot. `surface_errors` is false during shutdown,
    /// where the marker must go through even after a failure.
    fn claim(&mut self, surface_errors: bool) -> Result<u64> {
        let seq = self.next_seq;
        let backoff = Backoff::new();
        loop {
            let released = self.shared.released.load(Ordering::Acquire);
            if seq < released + (self.shared.mask + 1) {
                break;
            }
            if surface_errors {
                self.shared.check_failed()?;
            }
            backoff.snooze();
        }
        self.next_seq += 1;
        Ok(seq)
    }

    /// Publish an end-of-stream marker, drain the pipeline, join the
    /// workers, and surface any latched failure.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return self.shared.check_failed();
        }
        self.closed = true;

        // the marker must always be published, or the workers spin forever
        let seq = match self.claimed.take() {
            Some(s) => s,
            None => self.claim(false)?,
        };
        self.shared.slots[(seq & self.shared.mask) as usize]
            .lock()
            .unwrap()
            .last = true;
        self.shared.published.store(seq + 1, Ordering::Release);
        self.shared.final_count.store(seq + 1, Ordering::Release);

        if let Some(io) = self.io_thread.take() {
            let _ = io.join();
        }
        for handle in self.compressors.drain(..) {
            let _ = handle.join();
        }
        self.shared.check_failed()
    }
}

impl Drop for RingWriter {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                warn!(error = %e, "ring writer close failed in drop");
            }
        }
    }
}

/// Compressor `k` builds every published slot with `seq % stride == k`.
fn compressor_loop(shared: &RingShared, k: u64, stride: u64) {
    let backoff = Backoff::new();
    let mut seq = k;
    loop {
        loop {
            if seq < shared.published.load(Ordering::Acquire) {
                break;
            }
            let final_count = shared.final_count.load(Ordering::Acquire);
            if final_count != NO_FINAL && seq >= final_count {
                return;
            }
            backoff.snooze();
        }
        backoff.reset();

        {
            let mut item = shared.slots[(seq & shared.mask) as usize].lock().unwrap();
            if let Err(e) = item.record.build() {
                shared.latch(e);
            }
        }
        shared.compressed[(seq & shared.mask) as usize].store(seq, Ordering::Release);
        seq += stride;
    }
}

/// The single I/O worker: consume slots strictly in submission order,
/// write, reset, release. After a failure it keeps draining without
/// writing so the producer can always make progress to `close()`.
fn io_loop(shared: Arc<RingShared>, mut sink: FileSink) {
    let backoff = Backoff::new();
    let mut seq = 0u64;
    loop {
        loop {
            if shared.compressed[(seq & shared.mask) as usize].load(Ordering::Acquire) == seq {
                break;
            }
            backoff.snooze();
        }
        backoff.reset();

        let last = {
            let mut item = shared.slots[(seq & shared.mask) as usize].lock().unwrap();
            let last = item.last;
            let entries = item.record.entries() as u32;
            if entries > 0 && !shared.has_failed.load(Ordering::Acquire) {
                if let Err(e) = sink.write_record_bytes(item.record.as_mut_bytes(), entries) {
                    shared.latch(e);
                }
            }
            item.record.reset();
            item.last = false;
            last
        };

        shared.compressed[(seq & shared.mask) as usize].store(SEQ_EMPTY, Ordering::Release);
        shared.released.store(seq + 1, Ordering::Release);
        seq += 1;

        if last {
            if let Err(e) = sink.close() {
                shared.latch(e);
            }
            return;
        }
    }
}
