//! # stdfdb Storage
//!
//! Single-pass STDF v4 indexing with deferred, random-access decoding.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Scan Path                             │
//! │                                                             │
//! │  file (.stdf/.gz/.bz2/.zip) ──> stream ──> scanner          │
//! │                                   │          │              │
//! │                                   ▼          ▼              │
//! │                            spill blocks   IndexStore        │
//! │                           (compressed)   (offsets, DUTs,    │
//! │                                           bins, wafers)     │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Query Path                            │
//! │                                                             │
//! │  TestItem ──> IndexStore rows ──> decoder ──> statistics    │
//! │                                     │                       │
//! │                                     ▼                       │
//! │                              DecodeCache / seek             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod coordinator;
pub mod database;
pub mod decoder;
pub mod format;
pub mod index;
pub mod scanner;
pub mod statistics;
pub mod stream;

pub use cache::{CacheKey, CacheStats, DecodeCache};
pub use coordinator::{
    BackendSelector, CancellationFlag, ProcessBackend, ScanBackend, ScanCoordinator, ScanRequest,
    ScanTask, ThreadBackend,
};
pub use database::{DutLimits, FileHandle, StdfDatabase, TestSeries};
pub use decoder::{DecodedValues, RecordDecoder};
pub use format::{RecordKind, StdfRecord};
pub use index::IndexStore;
pub use scanner::{scan_source, ScanOutput};
pub use statistics::{OutcomeCounts, Statistics};
pub use stream::{Compression, StdfSource};
