//! # stdfdb Core
//!
//! Fundamental building blocks shared by the stdfdb crates:
//! - Error types
//! - Configuration
//! - Metrics
//! - Shared STDF value types
//! - Common utilities
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  stdfdb-core                    │
//! ├─────────────────────────────────────────────────┤
//! │  • error    - Error handling                    │
//! │  • config   - Scan / decode / stream tuning     │
//! │  • metrics  - Scan and decode counters          │
//! │  • types    - Byte order, bins, flags, counts   │
//! │  • utils    - Units, timestamps, formatting     │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use types::{
    BinClass, BinKind, ByteOrder, FailCount, PartStatus, TestItem, TestKind, TestOutcome,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
