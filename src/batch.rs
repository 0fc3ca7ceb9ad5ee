use std::net::IpAddr;

use tracing::{info, warn};

use crate::error::ScanError;
use crate::pipeline::HostPipeline;
use crate::types::{Category, ClassifiedResult};

/// Totals over a whole host list.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub hosts_total: usize,
    pub hosts_scanned: usize,
    pub open_ports: usize,
    pub results: Vec<ClassifiedResult>,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn lan_exposed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.category == Category::LanExposed)
            .count()
    }
}

/// Run `pipeline` over `hosts` one at a time; a host's probes finish before the
/// next host's port sweep starts.
///
/// Cancellation stops the batch and returns what was gathered so far. Other scan
/// errors are fatal.
pub async fn run_batch(pipeline: &HostPipeline, hosts: &[IpAddr]) -> Result<BatchSummary, ScanError> {
    let mut summary = BatchSummary {
        hosts_total: hosts.len(),
        ..BatchSummary::default()
    };

    for &host in hosts {
        if pipeline.cancel_token().is_cancelled() {
            summary.cancelled = true;
            break;
        }
        match pipeline.run_host(host).await {
            Ok(report) => {
                summary.hosts_scanned += 1;
                summary.open_ports += report.open_ports.len();
                summary.results.extend(report.results);
            }
            Err(ScanError::Cancelled) => {
                warn!(%host, "scan cancelled");
                summary.cancelled = true;
                break;
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        hosts = summary.hosts_scanned,
        servers = summary.results.len(),
        lan = summary.lan_exposed(),
        "batch finished"
    );
    Ok(summary)
}
