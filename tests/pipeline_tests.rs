use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mc_lan_scan::batch::run_batch;
use mc_lan_scan::pipeline::probe_ports;
use mc_lan_scan::sink::{Reporter, ResultFile, ResultSink};
use mc_lan_scan::{
    Category, ClassifiedResult, HostPipeline, ProbeClient, ProbeError, ProbeReport, ScanConfig,
    ServerStatus,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Answers for a fixed set of ports, fails everywhere else.
struct StubProbe {
    servers: HashMap<u16, ServerStatus>,
}

#[async_trait]
impl ProbeClient for StubProbe {
    async fn probe_status(&self, addr: SocketAddr, _timeout: Duration) -> Result<ProbeReport, ProbeError> {
        match self.servers.get(&addr.port()) {
            Some(status) => Ok(ProbeReport {
                status: status.clone(),
                query_ok: false,
            }),
            None => Err(ProbeError::Protocol("not a game server".into())),
        }
    }
}

struct FailingProbe;

#[async_trait]
impl ProbeClient for FailingProbe {
    async fn probe_status(&self, _addr: SocketAddr, timeout: Duration) -> Result<ProbeReport, ProbeError> {
        tokio::time::sleep(timeout / 10).await;
        Err(ProbeError::TimedOut)
    }
}

/// Tracks how many probes run at once and the highest count seen.
#[derive(Default)]
struct CountingProbe {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl ProbeClient for CountingProbe {
    async fn probe_status(&self, _addr: SocketAddr, _timeout: Duration) -> Result<ProbeReport, ProbeError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Err(ProbeError::TimedOut)
    }
}

/// Keeps everything it sees and forwards to a file-backed reporter.
struct RecordingSink {
    seen: Mutex<Vec<ClassifiedResult>>,
    inner: Reporter,
}

impl RecordingSink {
    fn new(result_file: Option<ResultFile>) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            inner: Reporter {
                console: false,
                result_file,
            },
        }
    }

    fn seen(&self) -> Vec<ClassifiedResult> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn emit(&self, result: &ClassifiedResult) {
        self.seen.lock().unwrap().push(result.clone());
        self.inner.emit(result).await;
    }
}

fn status(motd: &str, online: u32, max: u32) -> ServerStatus {
    ServerStatus {
        version_name: "1.20.4".into(),
        online_players: online,
        max_players: max,
        motd: motd.into(),
        sample_names: vec!["bob".into()],
        latency_ms: Some(3.0),
    }
}

fn config(ports: Vec<u16>) -> ScanConfig {
    ScanConfig {
        ports,
        connect_timeout: Duration::from_millis(500),
        probe_timeout: Duration::from_millis(500),
        ..ScanConfig::default()
    }
}

#[tokio::test]
async fn lan_world_is_emitted_and_persisted() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let game_port = listener.local_addr().unwrap().port();
    let closed_port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };

    let dir = tempfile::tempdir().unwrap();
    let result_path = dir.path().join("result.txt");
    let sink = Arc::new(RecordingSink::new(Some(ResultFile::new(&result_path))));
    let prober = Arc::new(StubProbe {
        servers: HashMap::from([(game_port, status("§eBob§r - join up", 3, 8))]),
    });

    let mut ports = vec![game_port, closed_port];
    ports.sort_unstable();
    let pipeline = HostPipeline::new(config(ports), prober, sink.clone());
    let report = pipeline.run_host(LOCALHOST).await.unwrap();

    assert_eq!(report.open_ports, vec![game_port]);
    assert_eq!(report.results.len(), 1);
    let result = &report.results[0];
    assert_eq!(result.port, game_port);
    assert_eq!(result.category, Category::LanExposed);
    assert_eq!(result.motd, "Bob - join up");
    assert_eq!(sink.seen(), report.results);

    let persisted = std::fs::read_to_string(&result_path).unwrap();
    assert_eq!(persisted, format!("\n127.0.0.1:{game_port}"));
    drop(listener);
}

#[tokio::test]
async fn public_servers_without_players_are_not_persisted() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let dir = tempfile::tempdir().unwrap();
    let result_path = dir.path().join("result.txt");
    let sink = Arc::new(RecordingSink::new(Some(ResultFile::new(&result_path))));
    let prober = Arc::new(StubProbe {
        servers: HashMap::from([(port, status("A Minecraft Server", 0, 20))]),
    });

    let pipeline = HostPipeline::new(config(vec![port]), prober, sink.clone());
    let report = pipeline.run_host(LOCALHOST).await.unwrap();

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].category, Category::Public);
    assert!(!result_path.exists());
    drop(listener);
}

#[tokio::test]
async fn host_completes_when_every_probe_fails() {
    let listeners = [
        TcpListener::bind("127.0.0.1:0").await.unwrap(),
        TcpListener::bind("127.0.0.1:0").await.unwrap(),
        TcpListener::bind("127.0.0.1:0").await.unwrap(),
    ];
    let mut ports: Vec<u16> = listeners.iter().map(|l| l.local_addr().unwrap().port()).collect();
    ports.sort_unstable();

    let sink = Arc::new(RecordingSink::new(None));
    let pipeline = HostPipeline::new(config(ports.clone()), Arc::new(FailingProbe), sink.clone());
    let report = pipeline.run_host(LOCALHOST).await.unwrap();

    assert_eq!(report.open_ports, ports);
    assert!(report.results.is_empty());
    assert!(sink.seen().is_empty());
}

#[tokio::test]
async fn probes_in_flight_never_exceed_concurrency() {
    let ports: Vec<u16> = (30000..30100).collect();
    let prober = Arc::new(CountingProbe::default());

    let results = probe_ports(
        LOCALHOST,
        &ports,
        Duration::from_millis(200),
        3,
        prober.clone(),
        Arc::new(RecordingSink::new(None)),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(results.is_empty());
    let max_in_flight = prober.max_in_flight.load(Ordering::SeqCst);
    assert!(max_in_flight <= 3, "max_in_flight={max_in_flight}");
    assert!(max_in_flight >= 2, "probes never overlapped");
    assert_eq!(prober.calls.load(Ordering::SeqCst), ports.len());
    assert_eq!(prober.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn every_probe_success_is_classified_and_emitted() {
    let ports: Vec<u16> = (40000..40010).collect();
    let servers = ports
        .iter()
        .map(|&p| (p, status("Steve - World", 1, 8)))
        .collect::<HashMap<_, _>>();
    let sink = Arc::new(RecordingSink::new(None));

    let results = probe_ports(
        LOCALHOST,
        &ports,
        Duration::from_millis(200),
        2,
        Arc::new(StubProbe { servers }),
        sink.clone(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(results.len(), ports.len());
    assert!(results.iter().all(|r| r.category == Category::LanExposed));
    assert_eq!(sink.seen().len(), ports.len());
}

#[tokio::test]
async fn batch_runs_hosts_sequentially_and_aggregates() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let sink = Arc::new(RecordingSink::new(None));
    let prober = Arc::new(StubProbe {
        servers: HashMap::from([(port, status("Alex - Survival", 2, 8))]),
    });
    let pipeline = HostPipeline::new(config(vec![port]), prober, sink.clone());

    let hosts = [LOCALHOST, IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2))];
    let summary = run_batch(&pipeline, &hosts).await.unwrap();

    assert_eq!(summary.hosts_total, 2);
    assert_eq!(summary.hosts_scanned, 2);
    assert!(!summary.cancelled);
    assert!(summary.results.iter().any(|r| r.host == LOCALHOST && r.port == port));
    assert!(summary.lan_exposed() >= 1);
    drop(listener);
}

#[tokio::test]
async fn cancelled_batch_stops_early() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let pipeline = HostPipeline::new(
        config(vec![1, 2, 3]),
        Arc::new(FailingProbe),
        Arc::new(RecordingSink::new(None)),
    )
    .with_cancel(cancel);

    let summary = run_batch(&pipeline, &[LOCALHOST]).await.unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.hosts_scanned, 0);
    assert!(summary.results.is_empty());
}
