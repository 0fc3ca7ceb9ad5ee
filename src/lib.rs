//! Library crate for mc-lan-scan: TCP connect sweep, status probing and LAN-world classification.
pub mod batch;
pub mod classify;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod probe;
pub mod progress;
pub mod scanner;
pub mod sink;
pub mod targets;
pub mod types;

pub use config::ScanConfig;
pub use error::{PortSpecError, ProbeError, ScanError};
pub use pipeline::{HostPipeline, HostReport};
pub use probe::{JavaProbe, ProbeClient};
pub use types::{Category, ClassifiedResult, ProbeReport, ServerStatus};
