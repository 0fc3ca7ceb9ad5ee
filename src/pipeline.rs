use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use time::{format_description::well_known, OffsetDateTime};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::classify::{classify, normalize_motd};
use crate::config::ScanConfig;
use crate::error::{ProbeError, ScanError};
use crate::probe::ProbeClient;
use crate::progress::ScanProgress;
use crate::scanner;
use crate::sink::ResultSink;
use crate::types::{ClassifiedResult, ProbeReport};

/// Per-host lifecycle. A host only reaches `Probing` once its port sweep is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStage {
    Idle,
    PortScanning,
    Probing,
    Done,
}

impl HostStage {
    pub fn next(self) -> Self {
        match self {
            Self::Idle => Self::PortScanning,
            Self::PortScanning => Self::Probing,
            Self::Probing | Self::Done => Self::Done,
        }
    }
}

/// Result of one application probe as the pipeline sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Success(ProbeReport),
    NotThisProtocol,
}

impl From<Result<ProbeReport, ProbeError>> for ProbeOutcome {
    fn from(res: Result<ProbeReport, ProbeError>) -> Self {
        match res {
            Ok(report) => Self::Success(report),
            Err(_) => Self::NotThisProtocol,
        }
    }
}

enum ProbeTask {
    Skipped,
    Dropped,
    Found(ClassifiedResult),
}

/// Everything learned about one host.
#[derive(Debug, Clone, Default)]
pub struct HostReport {
    pub open_ports: Vec<u16>,
    pub results: Vec<ClassifiedResult>,
}

/// Port sweep followed by a status-probe sweep over the open ports, for one host at a time.
pub struct HostPipeline {
    config: ScanConfig,
    prober: Arc<dyn ProbeClient>,
    sink: Arc<dyn ResultSink>,
    cancel: CancellationToken,
}

impl HostPipeline {
    pub fn new(config: ScanConfig, prober: Arc<dyn ProbeClient>, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            config,
            prober,
            sink,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run both stages against `host`. Probe failures never surface here; only
    /// fatal scan errors and cancellation do.
    pub async fn run_host(&self, host: IpAddr) -> Result<HostReport, ScanError> {
        let mut stage = HostStage::Idle;

        stage = stage.next();
        info!(%host, ?stage, ports = self.config.ports.len(), "scanning ports");
        let total = self.config.ports.len() as u64;
        let progress = Arc::new(if self.config.show_progress {
            ScanProgress::with_terminal_bar(total, &host.to_string())
        } else {
            ScanProgress::new(total)
        });
        let swept = scanner::scan_ports(
            host,
            &self.config.ports,
            self.config.connect_options(),
            progress.clone(),
            &self.cancel,
        )
        .await;
        progress.finish();
        let open_ports = swept?;

        stage = stage.next();
        info!(%host, ?stage, open = open_ports.len(), "probing servers");
        let results = probe_ports(
            host,
            &open_ports,
            self.config.probe_timeout,
            self.config.probe_concurrency,
            self.prober.clone(),
            self.sink.clone(),
            &self.cancel,
        )
        .await?;

        stage = stage.next();
        info!(%host, ?stage, servers = results.len(), "host finished");
        Ok(HostReport { open_ports, results })
    }
}

/// Probe each open port with `prober`, at most `concurrency` at a time.
///
/// Each success is classified and handed to `sink` immediately; every failure is
/// dropped. Returns once all probes have finished.
pub async fn probe_ports(
    host: IpAddr,
    open_ports: &[u16],
    timeout: Duration,
    concurrency: usize,
    prober: Arc<dyn ProbeClient>,
    sink: Arc<dyn ResultSink>,
    cancel: &CancellationToken,
) -> Result<Vec<ClassifiedResult>, ScanError> {
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();

    for &port in open_ports {
        if cancel.is_cancelled() {
            break;
        }
        let permit = sem.clone().acquire_owned().await?;
        let prober = prober.clone();
        let sink = sink.clone();
        let cancel = cancel.clone();

        set.spawn(async move {
            let _permit = permit;

            if cancel.is_cancelled() {
                return ProbeTask::Skipped;
            }
            let addr = SocketAddr::new(host, port);
            let report = match ProbeOutcome::from(prober.probe_status(addr, timeout).await) {
                ProbeOutcome::Success(report) => report,
                ProbeOutcome::NotThisProtocol => {
                    trace!(%addr, "no status answer");
                    return ProbeTask::Dropped;
                }
            };

            let result = ClassifiedResult {
                host,
                port,
                category: classify(&report.status),
                motd: normalize_motd(&report.status.motd),
                query_ok: report.query_ok,
                status: report.status,
                observed_at: now_rfc3339(),
            };
            debug!(%addr, category = ?result.category, "server found");
            sink.emit(&result).await;
            ProbeTask::Found(result)
        });
    }

    let mut results = Vec::new();
    let mut attempted = 0usize;
    while let Some(res) = set.join_next().await {
        match res {
            Ok(ProbeTask::Found(result)) => {
                attempted += 1;
                results.push(result);
            }
            Ok(ProbeTask::Dropped) => attempted += 1,
            Ok(ProbeTask::Skipped) => {}
            // A panicking prober counts as a failed probe.
            Err(e) => {
                attempted += 1;
                warn!(%host, "probe task aborted: {e}");
            }
        }
    }

    if attempted < open_ports.len() {
        return Err(ScanError::Cancelled);
    }
    Ok(results)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_advance_in_order() {
        let mut stage = HostStage::Idle;
        let mut seen = vec![stage];
        for _ in 0..4 {
            stage = stage.next();
            seen.push(stage);
        }
        assert_eq!(
            seen,
            vec![
                HostStage::Idle,
                HostStage::PortScanning,
                HostStage::Probing,
                HostStage::Done,
                HostStage::Done,
            ]
        );
    }

    #[test]
    fn any_probe_error_is_not_this_protocol() {
        let outcome = ProbeOutcome::from(Err(ProbeError::TimedOut));
        assert_eq!(outcome, ProbeOutcome::NotThisProtocol);
        let outcome = ProbeOutcome::from(Err(ProbeError::Protocol("garbage".into())));
        assert_eq!(outcome, ProbeOutcome::NotThisProtocol);
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let ts = now_rfc3339();
        assert!(OffsetDateTime::parse(&ts, &well_known::Rfc3339).is_ok(), "{ts}");
    }
}
