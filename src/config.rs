use std::time::Duration;

use crate::error::PortSpecError;
use crate::ports;
use crate::scanner::ConnectOptions;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1200);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_CONNECT_CONCURRENCY: usize = 400;
pub const DEFAULT_PROBE_CONCURRENCY: usize = 50;
pub const DEFAULT_RESULTS_FILE: &str = "result.txt";

/// Tunables of the per-host pipeline.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Candidate ports, ascending and unique.
    pub ports: Vec<u16>,
    pub connect_timeout: Duration,
    pub probe_timeout: Duration,
    pub connect_concurrency: usize,
    pub probe_concurrency: usize,
    /// Draw a terminal progress bar during port sweeps.
    pub show_progress: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ports: ports::full_range(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            connect_concurrency: DEFAULT_CONNECT_CONCURRENCY,
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            show_progress: false,
        }
    }
}

impl ScanConfig {
    /// Defaults with the port set taken from a port specification string.
    pub fn with_port_spec(spec: &str) -> Result<Self, PortSpecError> {
        Ok(Self {
            ports: ports::parse_port_spec(spec)?,
            ..Self::default()
        })
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            timeout: self.connect_timeout,
            concurrency: self.connect_concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ScanConfig::default();
        assert_eq!(cfg.ports.len(), 65535);
        assert_eq!(cfg.connect_timeout, Duration::from_millis(1200));
        assert_eq!(cfg.probe_timeout, Duration::from_secs(3));
        assert_eq!(cfg.connect_concurrency, 400);
        assert_eq!(cfg.probe_concurrency, 50);
    }

    #[test]
    fn port_spec_override() {
        let cfg = ScanConfig::with_port_spec("25565-25567").unwrap();
        assert_eq!(cfg.ports, vec![25565, 25566, 25567]);
        assert!(ScanConfig::with_port_spec("25565-1").is_err());
    }
}
