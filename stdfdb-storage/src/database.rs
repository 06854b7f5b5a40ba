//! # File Handles and Database
//!
//! The query surface over indexed files.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ StdfDatabase                                               │
//! │   file 0 ──> FileHandle ──┬── Arc<IndexStore>  (read-only) │
//! │   file 1 ──> FileHandle   └── Mutex<RecordDecoder>         │
//! │   ...                            │                         │
//! │                                  └── stream + DecodeCache  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Index lookups run concurrently; decoding serializes on the handle's
//! decoder because it owns a seekable stream.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use stdfdb_core::config::Config;
use stdfdb_core::error::{Error, Result};
use stdfdb_core::metrics::Metrics;
use stdfdb_core::types::{BinKind, FailCount, TestItem};

use crate::coordinator::{CancellationFlag, ScanCoordinator};
use crate::decoder::RecordDecoder;
use crate::index::{BinCount, DatalogEntry, DutInfo, IndexStore, PinGroup, PinInfo, WaferInfo};
use crate::scanner::{scan_source, ScanOutput};
use crate::statistics::{effective_fail_count, OutcomeCounts, Statistics};
use crate::stream::StdfSource;

/// Decoded values of one test identity with its limits and aggregates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestSeries {
    pub item: TestItem,
    pub values: Vec<f64>,
    /// TEST_FLG per value; -1 for a row that could not be decoded
    pub flags: Vec<i16>,
    pub duts: Vec<u32>,
    pub heads: Vec<u8>,
    pub sites: Vec<u8>,
    pub low_limit: Option<f64>,
    pub high_limit: Option<f64>,
    pub low_spec: Option<f64>,
    pub high_spec: Option<f64>,
    pub unit: String,
    pub statistics: Statistics,
    pub outcomes: OutcomeCounts,
    /// Fail count declared by TSR records
    pub declared_fail_count: FailCount,
    /// Declared count when known, else counted from flags
    pub fail_count: u32,
}

/// Per-DUT limit override, scaled like the test's limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DutLimits {
    pub dut: u32,
    pub low_limit: Option<f64>,
    pub high_limit: Option<f64>,
}

/// One indexed STDF file
pub struct FileHandle {
    source: StdfSource,
    store: Arc<IndexStore>,
    decoder: Mutex<RecordDecoder>,
    config: Config,
}

impl FileHandle {
    /// Scan `path` on the calling thread and open it for queries
    pub fn open_and_index(path: impl AsRef<Path>, file_id: u32, config: &Config) -> Result<Self> {
        Self::open_and_index_with(path, file_id, config, Metrics::new())
    }

    pub fn open_and_index_with(
        path: impl AsRef<Path>,
        file_id: u32,
        config: &Config,
        metrics: Metrics,
    ) -> Result<Self> {
        let source = StdfSource::open(path)?;
        let output = scan_source(
            &source,
            file_id,
            config,
            None,
            &CancellationFlag::new(),
            &metrics,
            Arc::new(AtomicU64::new(0)),
        )?;
        Self::from_scan(source, output, config, metrics)
    }

    /// Scan through a coordinator and open the result
    pub async fn open_with_coordinator(
        coordinator: &ScanCoordinator,
        path: impl AsRef<Path>,
        file_id: u32,
        config: &Config,
        metrics: Metrics,
    ) -> Result<Self> {
        let source = StdfSource::open(path)?;
        let output = coordinator.start(source.clone(), file_id).wait().await?;
        Self::from_scan(source, output, config, metrics)
    }

    /// Open a handle over a finished scan
    pub fn from_scan(source: StdfSource, output: ScanOutput, config: &Config, metrics: Metrics) -> Result<Self> {
        let ScanOutput { store, blocks } = output;
        let stream = source.open_random_access(blocks, &config.stream)?;
        let decoder = RecordDecoder::new(stream, store.byte_order(), config.decode.cache_entries, metrics);
        info!(
            path = %source.path().display(),
            file_id = store.file_id(),
            tests = store.tests().len(),
            duts = store.duts().len(),
            "File opened"
        );
        Ok(Self {
            source,
            store: Arc::new(store),
            decoder: Mutex::new(decoder),
            config: config.clone(),
        })
    }

    /// Open `path` with an index saved by [`IndexStore::save`]
    pub fn open_with_index(
        path: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
        config: &Config,
        metrics: Metrics,
    ) -> Result<Self> {
        let source = StdfSource::open(path)?;
        let store = IndexStore::load(index_path)?;
        if store.compression() != source.compression() {
            return Err(Error::index(format!(
                "Index was built from {:?} input but {} is {:?}",
                store.compression(),
                source.path().display(),
                source.compression()
            )));
        }
        // Spill blocks do not outlive the scan; rebuilt on open
        Self::from_scan(source, ScanOutput { store, blocks: None }, config, metrics)
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    pub fn file_id(&self) -> u32 {
        self.store.file_id()
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn save_index(&self, path: impl AsRef<Path>) -> Result<()> {
        self.store.save(path)
    }

    pub fn list_test_items(&self) -> Vec<TestItem> {
        self.store.test_items()
    }

    /// (wafer index, WAFER_ID) pairs
    pub fn list_wafers(&self) -> Vec<(u32, String)> {
        self.store
            .wafers()
            .iter()
            .map(|w| (w.index, w.wafer_id.clone()))
            .collect()
    }

    /// Decode one test over the selected heads and sites; empty slices select all
    pub fn get_test_series(&self, item: &TestItem, heads: &[u8], sites: &[u8]) -> Result<TestSeries> {
        let meta = self.store.resolve(item)?;
        let rows = self.store.offset_rows(meta.test_id, heads, sites);
        let decoded = self.decoder.lock().decode_rows(meta, item.pin_index, &rows)?;
        debug!(test_num = item.test_num, pin = item.pin_index, rows = rows.len(), "Decoded series");

        let low_limit = meta.low_limit();
        let high_limit = meta.high_limit();
        let statistics = Statistics::compute(&decoded.values, low_limit, high_limit);
        let outcomes = OutcomeCounts::from_flags(&decoded.flags);
        let declared_fail_count = meta.fail_count();

        Ok(TestSeries {
            item: item.clone(),
            values: decoded.values,
            flags: decoded.flags,
            duts: rows.iter().map(|r| r.dut).collect(),
            heads: rows.iter().map(|r| r.head).collect(),
            sites: rows.iter().map(|r| r.site).collect(),
            low_limit,
            high_limit,
            low_spec: meta.low_spec(),
            high_spec: meta.high_spec(),
            unit: meta.unit(),
            statistics,
            outcomes,
            declared_fail_count,
            fail_count: effective_fail_count(declared_fail_count, &outcomes),
        })
    }

    /// DUT counts per bin; `None` head or site selects all
    pub fn get_bin_distribution(&self, head: Option<u8>, site: Option<u8>, kind: BinKind) -> Vec<BinCount> {
        self.store.bin_distribution(head, site, kind)
    }

    pub fn file_info(&self) -> &[(String, String)] {
        self.store.file_info()
    }

    pub fn duts(&self) -> &[DutInfo] {
        self.store.duts()
    }

    pub fn dut(&self, index: u32) -> Option<&DutInfo> {
        self.store.dut(index)
    }

    pub fn wafer(&self, index: u32) -> Option<&WaferInfo> {
        self.store.wafer(index)
    }

    pub fn pin_map(&self) -> (Vec<&PinInfo>, Vec<&PinGroup>) {
        (self.store.pins().collect(), self.store.pin_groups().collect())
    }

    pub fn datalog(&self) -> &[DatalogEntry] {
        self.store.datalog()
    }

    /// Limits that changed for individual DUTs after the first record
    pub fn dynamic_limits(&self, item: &TestItem) -> Result<Vec<DutLimits>> {
        let meta = self.store.resolve(item)?;
        let scale = meta.scale();
        Ok(self
            .store
            .dynamic_limits(meta.test_id)
            .into_iter()
            .map(|(dut, limit)| {
                let (low_limit, high_limit) = limit.scaled(scale);
                DutLimits { dut, low_limit, high_limit }
            })
            .collect())
    }

    /// Point the decoder at a fresh random-access stream
    pub fn reopen_stream(&self) -> Result<()> {
        let stream = self.source.open_random_access(None, &self.config.stream)?;
        self.decoder.lock().set_stream(stream);
        Ok(())
    }

    /// Drop cached records and release the stream; index queries keep working
    pub fn close(&self) {
        self.decoder.lock().close();
        info!(path = %self.source.path().display(), "File closed");
    }

    pub fn is_open(&self) -> bool {
        self.decoder.lock().is_open()
    }
}

/// Several open files addressed by ordinal
pub struct StdfDatabase {
    config: Config,
    metrics: Metrics,
    files: Vec<FileHandle>,
}

impl StdfDatabase {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            metrics: Metrics::new(),
            files: Vec::new(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Index a file on the calling thread; returns its ordinal
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<u32> {
        let file_id = self.files.len() as u32;
        let handle = FileHandle::open_and_index_with(path, file_id, &self.config, self.metrics.clone())?;
        self.files.push(handle);
        Ok(file_id)
    }

    /// Index a file in the background; returns its ordinal
    pub async fn open_background(&mut self, path: impl AsRef<Path>) -> Result<u32> {
        let file_id = self.files.len() as u32;
        let coordinator = ScanCoordinator::new(self.config.clone(), self.metrics.clone());
        let handle =
            FileHandle::open_with_coordinator(&coordinator, path, file_id, &self.config, self.metrics.clone())
                .await?;
        self.files.push(handle);
        Ok(file_id)
    }

    pub fn file(&self, file_id: u32) -> Option<&FileHandle> {
        self.files.get(file_id as usize)
    }

    pub fn files(&self) -> &[FileHandle] {
        &self.files
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path().to_path_buf()).collect()
    }

    /// Union of the test identities of every file
    pub fn list_test_items(&self) -> Vec<TestItem> {
        let mut items: Vec<TestItem> = self.files.iter().flat_map(FileHandle::list_test_items).collect();
        items.sort();
        items.dedup();
        items
    }

    pub fn get_test_series(&self, file_id: u32, item: &TestItem, heads: &[u8], sites: &[u8]) -> Result<TestSeries> {
        let file = self.file(file_id).ok_or_else(|| Error::Query {
            message: format!("No file with ordinal {}", file_id),
        })?;
        file.get_test_series(item, heads, sites)
    }

    pub fn close_all(&mut self) {
        for file in &self.files {
            file.close();
        }
        self.files.clear();
    }
}
