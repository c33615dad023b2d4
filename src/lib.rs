//! Library crate for netrecon: concurrent TCP port reconnaissance.
//!
//! Target and port specs are parsed up front ([`targets`], [`ports`]), the
//! [`scanner`] drives a bounded pool of [`probe`] workers, and the
//! [`aggregator`] reassembles results into per-host reports.
pub mod aggregator;
pub mod config;
pub mod error;
pub mod ports;
pub mod probe;
pub mod report;
pub mod scanner;
pub mod server;
pub mod targets;
pub mod types;

pub use config::ScanConfig;
pub use error::{ParseError, ScanError};
pub use scanner::{scan_specs, scan_targets, scan_targets_with_cancel, SharedProgress};
pub use types::{HostReport, ProbeResult, ScanResult};
