use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mc_lan_scan::batch::run_batch;
use mc_lan_scan::config::{
    ScanConfig, DEFAULT_CONNECT_CONCURRENCY, DEFAULT_PROBE_CONCURRENCY, DEFAULT_RESULTS_FILE,
};
use mc_lan_scan::ports::{parse_port_spec, DEFAULT_PORT_SPEC};
use mc_lan_scan::sink::{write_results_json, Reporter, ResultFile};
use mc_lan_scan::targets::CidrExpansion;
use mc_lan_scan::{targets, HostPipeline, JavaProbe};

/// mc-lan-scan — sweep hosts for open TCP ports, then ask each one for a Minecraft server status.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mc-lan-scan",
    version,
    about = "Sweep hosts for open TCP ports, then probe them for Minecraft servers and flag LAN worlds.",
    long_about = None
)]
struct Cli {
    /// IPv4 address, IPv4 CIDR, or path to a host-list file. If omitted, auto-detect local /24s.
    #[arg(long)]
    targets: Option<String>,

    /// Scan every address of a CIDR, network and broadcast included.
    #[arg(long = "all-addresses", default_value_t = false)]
    all_addresses: bool,

    /// Ports to sweep: comma-separated ports and inclusive ranges, e.g. `25565,25500-25600`.
    #[arg(long, default_value = DEFAULT_PORT_SPEC)]
    ports: String,

    /// Max concurrent TCP connect attempts.
    #[arg(long, default_value_t = DEFAULT_CONNECT_CONCURRENCY)]
    concurrency: usize,

    /// Max concurrent status probes.
    #[arg(long = "probe-concurrency", default_value_t = DEFAULT_PROBE_CONCURRENCY)]
    probe_concurrency: usize,

    /// TCP connect timeout in milliseconds.
    #[arg(long = "connect-timeout-ms", default_value_t = 1200)]
    connect_timeout_ms: u64,

    /// Status probe timeout in milliseconds.
    #[arg(long = "probe-timeout-ms", default_value_t = 3000)]
    probe_timeout_ms: u64,

    /// Append `host:port` of every server with players online to this file.
    #[arg(long = "results-file", default_value = DEFAULT_RESULTS_FILE)]
    results_file: PathBuf,

    /// Do not write the results file.
    #[arg(long = "no-results-file", default_value_t = false)]
    no_results_file: bool,

    /// Skip the UDP query attempt after a successful status probe.
    #[arg(long = "no-query", default_value_t = false)]
    no_query: bool,

    /// Write every result as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Hide the port sweep progress bar.
    #[arg(long = "no-progress", default_value_t = false)]
    no_progress: bool,

    /// More log output (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let ports = parse_port_spec(&cli.ports)?;
    let expansion = if cli.all_addresses {
        CidrExpansion::AllAddresses
    } else {
        CidrExpansion::UsableHosts
    };
    let hosts = targets::resolve_targets(cli.targets.as_deref(), expansion)?;

    eprintln!("mc-lan-scan configuration:");
    eprintln!(
        "  targets      : {} ({} hosts)",
        cli.targets.as_deref().unwrap_or("<auto-detect local IPv4 /24>"),
        hosts.len()
    );
    eprintln!("  ports        : {} ({} ports)", cli.ports, ports.len());
    eprintln!("  concurrency  : {} connect / {} probe", cli.concurrency, cli.probe_concurrency);
    eprintln!("  timeouts     : {} ms connect / {} ms probe", cli.connect_timeout_ms, cli.probe_timeout_ms);
    eprintln!(
        "  results file : {}",
        if cli.no_results_file {
            "<none>".to_string()
        } else {
            cli.results_file.display().to_string()
        }
    );

    let config = ScanConfig {
        ports,
        connect_timeout: Duration::from_millis(cli.connect_timeout_ms),
        probe_timeout: Duration::from_millis(cli.probe_timeout_ms),
        connect_concurrency: cli.concurrency,
        probe_concurrency: cli.probe_concurrency,
        show_progress: !cli.no_progress,
    };
    let reporter = Reporter {
        console: true,
        result_file: (!cli.no_results_file).then(|| ResultFile::new(&cli.results_file)),
    };

    // Ctrl-C cancels the scan at the next task boundary.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let pipeline = HostPipeline::new(
        config,
        Arc::new(JavaProbe { query: !cli.no_query }),
        Arc::new(reporter),
    )
    .with_cancel(cancel);

    let summary = run_batch(&pipeline, &hosts).await?;

    eprintln!(
        "\nScanned {}/{} hosts: {} open ports, {} servers ({} LAN worlds){}",
        summary.hosts_scanned,
        summary.hosts_total,
        summary.open_ports,
        summary.results.len(),
        summary.lan_exposed(),
        if summary.cancelled { " [cancelled]" } else { "" }
    );

    if let Some(path) = cli.output.as_deref() {
        write_results_json(path, &summary.results)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        eprintln!("Wrote JSON results to {}", path.display());
    }

    Ok(())
}
