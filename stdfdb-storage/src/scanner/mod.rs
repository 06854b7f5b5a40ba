//! # Stream Scanner
//!
//! Single forward pass over a (possibly decompressed) STDF stream.
//!
//! ```text
//!  forward reader ──> produce_records ──[Vec<RawRecord>]──> IndexBuilder ──> IndexStore
//!        │                 │
//!   on-disk bytes     header loop: tracked kinds are captured with their
//!   (progress)        body offset, untracked kinds are skipped unread
//! ```
//!
//! The producer and the consumer are plain functions joined by a batch
//! callback, so the coordinator can put a channel between them and run each
//! on its own blocking task, while [`scan_source`] runs both inline.

pub mod builder;

use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use stdfdb_core::config::Config;
use stdfdb_core::error::Result;
use stdfdb_core::metrics::{Metrics, Timer};
use stdfdb_core::types::ByteOrder;

use crate::coordinator::CancellationFlag;
use crate::format::{detect_byte_order, RecordHeader, RecordKind};
use crate::index::IndexStore;
use crate::stream::{BlockIndex, BlockIndexBuilder, RecordingReader, StdfSource};

pub use builder::IndexBuilder;

/// A tracked record captured by the producer
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub kind: RecordKind,
    /// Offset of the body in the decompressed stream
    pub offset: u64,
    pub body: Bytes,
}

impl RawRecord {
    pub fn length(&self) -> u16 {
        self.body.len() as u16
    }
}

/// What the producer saw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProduceSummary {
    pub byte_order: ByteOrder,
    pub records: u64,
    pub skipped: u64,
    /// Decompressed bytes read
    pub bytes: u64,
    /// The stream ended inside a record
    pub truncated: bool,
}

/// Result of a completed scan
pub struct ScanOutput {
    pub store: IndexStore,
    /// Spill blocks for random access into compressed input
    pub blocks: Option<BlockIndex>,
}

/// Read until `buf` is full or the stream ends; returns bytes read
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Split a decompressed stream into batches of tracked records.
///
/// A clean end of stream between records ends the scan. A partial header or
/// a short body is logged as a truncated tail and also ends it.
pub fn produce_records(
    reader: &mut dyn Read,
    batch_size: usize,
    cancel: &CancellationFlag,
    metrics: &Metrics,
    mut emit: impl FnMut(Vec<RawRecord>) -> Result<()>,
) -> Result<ProduceSummary> {
    let mut prefix = [0u8; 5];
    let n = read_full(reader, &mut prefix)?;
    let byte_order = detect_byte_order(&mut &prefix[..n])?;
    debug!(order = byte_order.label(), "Detected byte order");

    let mut stream = (&prefix[..n]).chain(reader);
    let mut summary = ProduceSummary {
        byte_order,
        records: 0,
        skipped: 0,
        bytes: 0,
        truncated: false,
    };
    let mut batch = Vec::with_capacity(batch_size);
    let mut header_bytes = [0u8; 4];

    loop {
        cancel.check()?;

        let got = read_full(&mut stream, &mut header_bytes)?;
        if got == 0 {
            break;
        }
        if got < RecordHeader::SIZE {
            warn!(offset = summary.bytes, bytes = got, "Stream ends inside a record header");
            metrics.record_truncated();
            summary.truncated = true;
            break;
        }
        let header = RecordHeader::parse(&header_bytes, byte_order);
        summary.bytes += RecordHeader::SIZE as u64;
        summary.records += 1;
        metrics.record_scanned(RecordHeader::SIZE as u64 + header.length as u64);

        match header.kind().filter(RecordKind::is_tracked) {
            Some(kind) => {
                let offset = summary.bytes;
                let mut body = vec![0u8; header.length as usize];
                let got = read_full(&mut stream, &mut body)?;
                summary.bytes += got as u64;
                if got < body.len() {
                    warn!(
                        %kind,
                        offset,
                        needed = body.len(),
                        remaining = got,
                        "Stream ends inside a record body"
                    );
                    metrics.record_truncated();
                    summary.truncated = true;
                    break;
                }
                batch.push(RawRecord { kind, offset, body: Bytes::from(body) });
                if batch.len() >= batch_size {
                    emit(std::mem::replace(&mut batch, Vec::with_capacity(batch_size)))?;
                }
            }
            None => {
                if header.kind().is_none() {
                    debug!(typ = header.typ, sub = header.sub, offset = summary.bytes, "Unknown record type");
                }
                let wanted = header.length as u64;
                let skipped = io::copy(&mut (&mut stream).take(wanted), &mut io::sink())?;
                summary.bytes += skipped;
                summary.skipped += 1;
                metrics.record_skipped();
                if skipped < wanted {
                    warn!(offset = summary.bytes, "Stream ends inside a skipped record");
                    metrics.record_truncated();
                    summary.truncated = true;
                    break;
                }
            }
        }
    }

    if !batch.is_empty() {
        emit(batch)?;
    }
    Ok(summary)
}

/// Run the producer over a source, recording spill blocks for compressed input.
///
/// `spill` names the spill file; an anonymous temporary file is used when it
/// is `None`.
pub fn read_source(
    source: &StdfSource,
    spill: Option<&Path>,
    config: &Config,
    cancel: &CancellationFlag,
    metrics: &Metrics,
    consumed: Arc<AtomicU64>,
    emit: impl FnMut(Vec<RawRecord>) -> Result<()>,
) -> Result<(ProduceSummary, Option<BlockIndex>)> {
    let batch_size = config.scan.batch_size;
    if !source.compression().is_compressed() {
        let summary = source.with_forward_reader(consumed, |reader| {
            produce_records(reader, batch_size, cancel, metrics, emit)
        })?;
        return Ok((summary, None));
    }

    let stream = &config.stream;
    let mut blocks = match spill {
        Some(path) => BlockIndexBuilder::create(path, stream.block_size, stream.spill_level)?,
        None => BlockIndexBuilder::anonymous(stream.block_size, stream.spill_level)?,
    };
    let summary = source.with_forward_reader(consumed, |reader| {
        let mut recording = RecordingReader::new(reader, &mut blocks);
        produce_records(&mut recording, batch_size, cancel, metrics, emit)
    })?;
    Ok((summary, Some(blocks.finish()?)))
}

/// Scan a source on the calling thread
pub fn scan_source(
    source: &StdfSource,
    file_id: u32,
    config: &Config,
    spill: Option<&Path>,
    cancel: &CancellationFlag,
    metrics: &Metrics,
    consumed: Arc<AtomicU64>,
) -> Result<ScanOutput> {
    let timer = Timer::new("scan");
    let mut builder = IndexBuilder::new(file_id, source.compression(), source.size_hint(), metrics.clone());

    let (summary, blocks) = read_source(source, spill, config, cancel, metrics, consumed, |batch| {
        for record in &batch {
            cancel.check()?;
            builder.push(record)?;
        }
        Ok(())
    })?;

    let mut store = builder.finish(&summary);
    store.set_block_table(blocks.as_ref().map(|b| b.table.clone()));
    info!(
        path = %source.path().display(),
        records = summary.records,
        tests = store.tests().len(),
        duts = store.duts().len(),
        elapsed_ms = timer.stop().as_millis() as u64,
        "Scan finished"
    );
    Ok(ScanOutput { store, blocks })
}
