//! # Scan Coordinator
//!
//! Runs a scan in the background with progress reporting and cancellation.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        ScanCoordinator                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   BackendSelector ──> ThreadBackend                              │
//! │         │               producer (spawn_blocking)                │
//! │         │                  │ mpsc<Vec<RawRecord>> (bounded)      │
//! │         │                  ▼                                     │
//! │         │               consumer (spawn_blocking) ──> IndexStore │
//! │         │                                                        │
//! │         └─────────> ProcessBackend                               │
//! │                         `stdfdb scan-worker` child               │
//! │                         stdout: "progress <bytes>"               │
//! │                         index + spill files ──> IndexStore       │
//! │                                                                  │
//! │   reporter: interval tick ──> consumed / file_size ──> watch     │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cancellation is a shared flag checked once per record on both sides of
//! the channel. The process backend kills its child instead.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use stdfdb_core::config::Config;
use stdfdb_core::error::{Error, Result};
use stdfdb_core::metrics::{Metrics, Timer};

use crate::index::IndexStore;
use crate::scanner::{read_source, IndexBuilder, RawRecord, ScanOutput};
use crate::stream::{BlockIndex, StdfSource};

/// How often the process backend checks for cancellation
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Prefix of the worker's progress lines
pub const PROGRESS_PREFIX: &str = "progress ";

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once the flag is set
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything a backend needs for one scan
#[derive(Clone)]
pub struct ScanRequest {
    pub source: StdfSource,
    pub file_id: u32,
    pub config: Arc<Config>,
    pub cancel: CancellationFlag,
    /// On-disk bytes consumed so far
    pub consumed: Arc<AtomicU64>,
    pub metrics: Metrics,
}

/// Strategy for executing a scan
#[async_trait]
pub trait ScanBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput>;
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Internal {
        message: format!("Scan task failed: {}", e),
    }
}

/// Producer and consumer on blocking threads joined by a bounded channel
#[derive(Debug, Default)]
pub struct ThreadBackend;

#[async_trait]
impl ScanBackend for ThreadBackend {
    fn name(&self) -> &'static str {
        "thread"
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput> {
        let ScanRequest { source, file_id, config, cancel, consumed, metrics } = request;
        let (tx, mut rx) = mpsc::channel::<Vec<RawRecord>>(config.scan.queue_capacity);

        let mut builder =
            IndexBuilder::new(file_id, source.compression(), source.size_hint(), metrics.clone());
        let consumer_cancel = cancel.clone();
        let consumer = tokio::task::spawn_blocking(move || -> Result<IndexBuilder> {
            while let Some(batch) = rx.blocking_recv() {
                debug!(records = batch.len(), "Consuming batch");
                for record in &batch {
                    consumer_cancel.check()?;
                    builder.push(record)?;
                }
            }
            Ok(builder)
        });

        let producer_source = source.clone();
        let producer_metrics = metrics.clone();
        let producer = tokio::task::spawn_blocking(move || {
            read_source(
                &producer_source,
                None,
                &config,
                &cancel,
                &producer_metrics,
                consumed,
                |batch| {
                    tx.blocking_send(batch).map_err(|_| Error::Internal {
                        message: "Scan consumer stopped".to_string(),
                    })
                },
            )
        });

        let (produced, built) = tokio::join!(producer, consumer);
        // The consumer's error explains a failed send on the producer side
        let builder = built.map_err(join_error)??;
        let (summary, blocks) = produced.map_err(join_error)??;

        let mut store = builder.finish(&summary);
        store.set_block_table(blocks.as_ref().map(|b| b.table.clone()));
        Ok(ScanOutput { store, blocks })
    }
}

/// Scan in a child `stdfdb scan-worker` process
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    exe: PathBuf,
}

impl ProcessBackend {
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }
}

#[async_trait]
impl ScanBackend for ProcessBackend {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput> {
        let work_dir = tempfile::Builder::new().prefix("stdfdb-scan-").tempdir()?;
        let index_path = work_dir.path().join("scan.sidx");
        let spill_path = spill_path_for(&index_path);
        let config_path = work_dir.path().join("worker.toml");
        let config_text = toml::to_string(request.config.as_ref()).map_err(|e| Error::Configuration {
            message: format!("Cannot serialize worker config: {}", e),
        })?;
        tokio::fs::write(&config_path, config_text).await?;

        let mut child = Command::new(&self.exe)
            .arg("--config")
            .arg(&config_path)
            .arg("scan-worker")
            .arg("--input")
            .arg(request.source.path())
            .arg("--output")
            .arg(&index_path)
            .arg("--file-id")
            .arg(request.file_id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Worker {
                message: format!("Failed to start {}: {}", self.exe.display(), e),
            })?;
        info!(exe = %self.exe.display(), pid = ?child.id(), "Started scan worker");

        let stdout = child.stdout.take().ok_or_else(|| Error::Worker {
            message: "Scan worker has no stdout".to_string(),
        })?;
        let mut lines = BufReader::new(stdout).lines();
        let mut poll = interval(CANCEL_POLL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => match parse_progress(&line) {
                        Some(bytes) => request.consumed.store(bytes, Ordering::Relaxed),
                        None => debug!(line = %line, "Scan worker output"),
                    },
                    None => break,
                },
                _ = poll.tick() => {
                    if request.cancel.is_cancelled() {
                        child.kill().await?;
                        return Err(Error::Cancelled);
                    }
                }
            }
        }

        let status = child.wait().await?;
        request.cancel.check()?;
        if !status.success() {
            return Err(Error::Worker {
                message: format!("Scan worker exited with {}", status),
            });
        }

        let store = IndexStore::load(&index_path)?;
        let blocks = match store.block_table() {
            Some(table) => Some(BlockIndex::open(table.clone(), &spill_path)?),
            None => None,
        };
        Ok(ScanOutput { store, blocks })
    }
}

/// Spill file written next to a worker's index
pub fn spill_path_for(index_path: &std::path::Path) -> PathBuf {
    let mut name = index_path.as_os_str().to_owned();
    name.push(".blocks");
    PathBuf::from(name)
}

/// `"progress <bytes>"` -> bytes
pub fn parse_progress(line: &str) -> Option<u64> {
    line.strip_prefix(PROGRESS_PREFIX)?.trim().parse().ok()
}

/// Chooses a backend from file size and configuration
#[derive(Debug, Clone)]
pub struct BackendSelector {
    threshold: u64,
    worker_exe: Option<PathBuf>,
}

impl BackendSelector {
    pub fn new(config: &Config) -> Self {
        Self {
            threshold: config.scan.process_threshold_bytes,
            worker_exe: config.scan.worker_exe.clone(),
        }
    }

    pub fn select(&self, source: &StdfSource) -> Arc<dyn ScanBackend> {
        match &self.worker_exe {
            Some(exe) if source.file_size() >= self.threshold => Arc::new(ProcessBackend::new(exe)),
            _ => Arc::new(ThreadBackend),
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Starts background scans
pub struct ScanCoordinator {
    config: Arc<Config>,
    metrics: Metrics,
    selector: BackendSelector,
    callback: Option<ProgressCallback>,
}

impl ScanCoordinator {
    pub fn new(config: Config, metrics: Metrics) -> Self {
        let selector = BackendSelector::new(&config);
        Self {
            config: Arc::new(config),
            metrics,
            selector,
            callback: None,
        }
    }

    /// Also deliver every progress sample to `callback`
    pub fn with_progress_callback(mut self, callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Start scanning with the configured backend choice
    pub fn start(&self, source: StdfSource, file_id: u32) -> ScanTask {
        let backend = self.selector.select(&source);
        self.start_with(backend, source, file_id)
    }

    /// Start scanning with an explicit backend
    pub fn start_with(&self, backend: Arc<dyn ScanBackend>, source: StdfSource, file_id: u32) -> ScanTask {
        let cancel = CancellationFlag::new();
        let consumed = Arc::new(AtomicU64::new(0));
        let (progress_tx, progress_rx) = watch::channel(0.0);
        let file_size = source.file_size();
        let path = source.path().to_path_buf();
        let request = ScanRequest {
            source,
            file_id,
            config: self.config.clone(),
            cancel: cancel.clone(),
            consumed: consumed.clone(),
            metrics: self.metrics.clone(),
        };
        let period = self.config.scan.progress_interval();
        let callback = self.callback.clone();
        let metrics = self.metrics.clone();

        info!(path = %path.display(), file_id, backend = backend.name(), "Starting scan");
        let handle = tokio::spawn(async move {
            let timer = Timer::new("background_scan");
            let publish = |fraction: f64| {
                progress_tx.send_replace(fraction);
                if let Some(callback) = &callback {
                    callback(fraction);
                }
            };

            let scan = backend.scan(request);
            tokio::pin!(scan);
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let result = loop {
                tokio::select! {
                    result = &mut scan => break result,
                    _ = ticker.tick() => publish(fraction(consumed.load(Ordering::Relaxed), file_size)),
                }
            };

            match &result {
                Ok(output) => {
                    publish(1.0);
                    metrics.record_scan_completed();
                    info!(
                        path = %path.display(),
                        tests = output.store.tests().len(),
                        duts = output.store.duts().len(),
                        elapsed_ms = timer.stop().as_millis() as u64,
                        "Scan completed"
                    );
                }
                Err(Error::Cancelled) => {
                    metrics.record_scan_cancelled();
                    warn!(path = %path.display(), "Scan cancelled");
                }
                Err(e) => error!(path = %path.display(), error = %e, "Scan failed"),
            }
            result
        });

        ScanTask { cancel, progress: progress_rx, handle }
    }
}

/// Fraction of the file consumed, clamped to [0, 1]
fn fraction(consumed: u64, file_size: u64) -> f64 {
    if file_size == 0 {
        return 0.0;
    }
    (consumed as f64 / file_size as f64).clamp(0.0, 1.0)
}

/// Handle to a running scan
pub struct ScanTask {
    cancel: CancellationFlag,
    progress: watch::Receiver<f64>,
    handle: JoinHandle<Result<ScanOutput>>,
}

impl ScanTask {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Latest progress fraction
    pub fn progress(&self) -> f64 {
        *self.progress.borrow()
    }

    /// Receiver notified on every progress update
    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.progress.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> Result<ScanOutput> {
        self.handle.await.map_err(join_error)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_flag_shared() {
        let flag = CancellationFlag::new();
        let other = flag.clone();
        assert!(flag.check().is_ok());
        other.cancel();
        assert!(matches!(flag.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_parse_progress() {
        assert_eq!(parse_progress("progress 1024"), Some(1024));
        assert_eq!(parse_progress("progress  7 "), Some(7));
        assert_eq!(parse_progress("INFO scanning"), None);
        assert_eq!(parse_progress("progress x"), None);
    }

    #[test]
    fn test_fraction_clamped() {
        assert_eq!(fraction(0, 0), 0.0);
        assert_eq!(fraction(50, 100), 0.5);
        assert_eq!(fraction(150, 100), 1.0);
    }

    #[test]
    fn test_spill_path() {
        let path = spill_path_for(std::path::Path::new("/tmp/a/scan.sidx"));
        assert_eq!(path, PathBuf::from("/tmp/a/scan.sidx.blocks"));
    }

    #[test]
    fn test_backend_selection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.stdf");
        std::fs::write(&path, [2u8, 0, 0, 10, 2, 4]).unwrap();
        let source = StdfSource::open(&path).unwrap();

        let mut config = Config::default();
        assert_eq!(BackendSelector::new(&config).select(&source).name(), "thread");

        config.scan.worker_exe = Some(PathBuf::from("stdfdb"));
        config.scan.process_threshold_bytes = 4;
        assert_eq!(BackendSelector::new(&config).select(&source).name(), "process");

        config.scan.process_threshold_bytes = 1 << 20;
        assert_eq!(BackendSelector::new(&config).select(&source).name(), "thread");
    }
}
