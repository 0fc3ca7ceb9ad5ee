use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ScanError;
use crate::progress::ScanProgress;

/// Upper bound on simultaneous connect attempts regardless of what the caller asks for.
pub const MAX_CONNECT_CONCURRENCY: usize = 5_000;

/// How a single connect attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Open,
    Closed,
    TimedOut,
    Failed,
}

impl ConnectOutcome {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Parameters of one port sweep.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions {
    pub timeout: Duration,
    pub concurrency: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1200),
            concurrency: 400,
        }
    }
}

/// Attempt one TCP connect with a timeout. An accepted connection is closed immediately.
pub async fn connect_probe(addr: SocketAddr, timeout: Duration) -> ConnectOutcome {
    match time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            ConnectOutcome::Open
        }
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => ConnectOutcome::Closed,
        Ok(Err(_)) => ConnectOutcome::Failed,
        Err(_) => ConnectOutcome::TimedOut,
    }
}

/// Sweep `ports` on `host` using asynchronous TCP connects with a concurrency limit.
///
/// - A permit from a `Semaphore` is taken before each worker is spawned, so at most
///   `opts.concurrency` attempts are alive at once.
/// - Each attempt records exactly one tick in `progress`, whatever its outcome.
/// - Closed, refused, timed out and otherwise failed attempts are dropped; only
///   open ports are returned, ascending and deduplicated.
///
/// `progress` must have been sized for `ports.len()` attempts.
///
/// Fails only if the admission semaphore closes, a worker panics, or `cancel` fires.
pub async fn scan_ports(
    host: IpAddr,
    ports: &[u16],
    opts: ConnectOptions,
    progress: Arc<ScanProgress>,
    cancel: &CancellationToken,
) -> Result<Vec<u16>, ScanError> {
    scan_ports_with(host, ports, opts, progress, cancel, connect_probe).await
}

/// [`scan_ports`] with the single-port attempt supplied by the caller.
pub async fn scan_ports_with<F, Fut>(
    host: IpAddr,
    ports: &[u16],
    opts: ConnectOptions,
    progress: Arc<ScanProgress>,
    cancel: &CancellationToken,
    attempt: F,
) -> Result<Vec<u16>, ScanError>
where
    F: Fn(SocketAddr, Duration) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = ConnectOutcome> + Send + 'static,
{
    if progress.total() != ports.len() as u64 {
        return Err(ScanError::ProgressMismatch {
            progress: progress.total(),
            ports: ports.len(),
        });
    }

    let sem = Arc::new(Semaphore::new(opts.concurrency.clamp(1, MAX_CONNECT_CONCURRENCY)));
    let mut set = JoinSet::new();

    for &port in ports {
        if cancel.is_cancelled() {
            break;
        }
        let permit = sem.clone().acquire_owned().await?;
        let progress = progress.clone();
        let cancel = cancel.clone();
        let attempt = attempt.clone();
        let timeout = opts.timeout;

        set.spawn(async move {
            let _permit = permit; // released on every exit path

            if cancel.is_cancelled() {
                return None;
            }
            let outcome = attempt(SocketAddr::new(host, port), timeout).await;
            progress.record();
            Some((port, outcome))
        });
    }

    let mut open = Vec::new();
    let mut attempted = 0usize;
    while let Some(res) = set.join_next().await {
        if let Some((port, outcome)) = res? {
            attempted += 1;
            if outcome.is_open() {
                debug!(%host, port, "open");
                open.push(port);
            }
        }
    }

    if attempted < ports.len() {
        return Err(ScanError::Cancelled);
    }

    open.sort_unstable();
    open.dedup();

    let snap = progress.snapshot();
    info!(
        %host,
        open = open.len(),
        elapsed_ms = snap.elapsed.as_millis() as u64,
        "port sweep finished {}",
        snap.render()
    );
    Ok(open)
}
