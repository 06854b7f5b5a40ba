//! # On-Demand Record Decoder
//!
//! Reconstructs test values from offset rows. Each row is looked up in the
//! [`DecodeCache`]; on a miss the body is read from the random-access stream
//! and decoded in full. Values are projected with the test's first-seen
//! metadata (scale and pin layout), never with fields of later records.
//!
//! A row that cannot be read or decoded becomes `NaN` with flag `-1`; the
//! rest of the batch is unaffected.

use std::io::{Read, Seek, SeekFrom};

use tracing::{debug, warn};

use stdfdb_core::error::{Error, Result};
use stdfdb_core::metrics::Metrics;
use stdfdb_core::types::{ByteOrder, TestKind};
use stdfdb_core::utils::scale_factor;

use crate::cache::{CacheKey, CacheStats, DecodeCache};
use crate::format::{RecordKind, StdfRecord};
use crate::index::{OffsetRow, TestMeta};
use crate::stream::StreamHandle;

/// Flag reported for rows without a usable record
pub const MISSING_FLAG: i16 = -1;

/// Values and flags in row order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedValues {
    pub values: Vec<f64>,
    pub flags: Vec<i16>,
}

impl DecodedValues {
    fn with_capacity(n: usize) -> Self {
        Self {
            values: Vec::with_capacity(n),
            flags: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, value: f64, flag: i16) {
        self.values.push(if value.is_finite() { value } else { f64::NAN });
        self.flags.push(flag);
    }
}

fn record_kind(kind: TestKind) -> RecordKind {
    match kind {
        TestKind::Parametric => RecordKind::Ptr,
        TestKind::MultiResult => RecordKind::Mpr,
        TestKind::Functional => RecordKind::Ftr,
    }
}

pub struct RecordDecoder {
    stream: Option<StreamHandle>,
    order: ByteOrder,
    cache: DecodeCache,
    metrics: Metrics,
}

impl RecordDecoder {
    pub fn new(stream: StreamHandle, order: ByteOrder, cache_entries: usize, metrics: Metrics) -> Self {
        Self {
            stream: Some(stream),
            order,
            cache: DecodeCache::new(cache_entries),
            metrics,
        }
    }

    /// Swap the underlying stream; cached records may no longer match it
    pub fn set_stream(&mut self, stream: StreamHandle) {
        self.stream = Some(stream);
        self.cache.clear();
    }

    /// Release the stream and drop cached records
    pub fn close(&mut self) {
        self.stream = None;
        self.cache.clear();
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Decode one test identity over `rows`.
    ///
    /// `pin_index` selects the RTN_RSLT element of multi-result tests.
    pub fn decode_rows(&mut self, meta: &TestMeta, pin_index: u32, rows: &[OffsetRow]) -> Result<DecodedValues> {
        if self.stream.is_none() {
            return Err(Error::Query {
                message: "File handle is closed".to_string(),
            });
        }
        let factor = scale_factor(meta.scale());
        let position = meta.result_position(pin_index);
        let mut out = DecodedValues::with_capacity(rows.len());

        for row in rows {
            match self.record_at(row) {
                Ok(record) => {
                    let (value, flag) = project(&record, factor, position);
                    out.push(value, flag);
                }
                Err(e) => {
                    self.metrics.record_decode_failure();
                    if e.is_recoverable() {
                        debug!(offset = row.offset, dut = row.dut, error = %e, "Row decodes as missing");
                    } else {
                        warn!(offset = row.offset, dut = row.dut, error = %e, "Row decodes as missing");
                    }
                    out.push(f64::NAN, MISSING_FLAG);
                }
            }
        }
        Ok(out)
    }

    /// Decode the record at one row, through the cache
    pub fn record_at(&mut self, row: &OffsetRow) -> Result<std::sync::Arc<StdfRecord>> {
        let key = CacheKey { offset: row.offset, length: row.length };
        if let Some(record) = self.cache.get(&key) {
            self.metrics.record_decode(true);
            return Ok(record);
        }
        self.metrics.record_decode(false);

        let stream = self.stream.as_mut().ok_or_else(|| Error::Query {
            message: "File handle is closed".to_string(),
        })?;
        stream.seek(SeekFrom::Start(row.offset))?;
        let mut body = vec![0u8; row.length as usize];
        let mut filled = 0;
        while filled < body.len() {
            let n = stream.read(&mut body[filled..])?;
            if n == 0 {
                return Err(Error::TruncatedRecord {
                    at: row.offset + filled as u64,
                    needed: body.len(),
                    remaining: filled,
                });
            }
            filled += n;
        }

        let record = StdfRecord::decode(record_kind(row.kind), &body, self.order)?;
        Ok(self.cache.insert(key, record))
    }
}

/// Value and flag of one decoded test record
fn project(record: &StdfRecord, factor: f64, position: Option<usize>) -> (f64, i16) {
    match record {
        StdfRecord::Ptr(ptr) => (
            ptr.result.map_or(f64::NAN, |v| v as f64 * factor),
            ptr.test_flg as i16,
        ),
        StdfRecord::Mpr(mpr) => {
            let value = position
                .and_then(|i| mpr.rtn_rslt.as_ref().and_then(|r| r.get(i)))
                .map_or(f64::NAN, |v| *v as f64 * factor);
            (value, mpr.test_flg as i16)
        }
        StdfRecord::Ftr(ftr) => (ftr.test_flg as f64, ftr.test_flg as i16),
        _ => (f64::NAN, MISSING_FLAG),
    }
}
