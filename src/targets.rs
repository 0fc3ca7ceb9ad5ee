use anyhow::{bail, Context, Result};
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::{Ipv4AddrRange, Ipv4Net};
use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use tracing::warn;

/// Which addresses of a CIDR block become hosts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CidrExpansion {
    /// Usable hosts: network and broadcast excluded below /31.
    #[default]
    UsableHosts,
    /// Every address in the block, network and broadcast included.
    AllAddresses,
}

/// Resolve the `--targets` argument into a host list.
///
/// - `None`: every detected local IPv4 /24.
/// - an IPv4 literal or IPv4 CIDR: that host or network.
/// - anything else: path to a host-list file.
pub fn resolve_targets(arg: Option<&str>, expansion: CidrExpansion) -> Result<Vec<IpAddr>> {
    let Some(arg) = arg.map(str::trim) else {
        let cidrs = detect_local_cidrs()?;
        if cidrs.is_empty() {
            bail!("no non-loopback IPv4 interface found; pass --targets explicitly");
        }
        return Ok(cidrs
            .into_iter()
            .flat_map(|net| expand_cidr_to_ips(net, expansion))
            .collect());
    };

    match parse_target(arg, expansion) {
        Ok(ips) => Ok(ips),
        Err(_) if Path::new(arg).exists() => load_targets_from_path(arg, expansion),
        Err(e) => Err(e).with_context(|| format!("`{arg}` is neither a target nor a readable file")),
    }
}

/// Parse one host-list entry: an IPv4 literal (`10.0.0.5`) or an IPv4 CIDR (`10.0.0.0/24`).
pub fn parse_target(entry: &str, expansion: CidrExpansion) -> Result<Vec<IpAddr>> {
    if entry.contains('/') {
        let net: Ipv4Net = entry
            .parse()
            .with_context(|| format!("invalid IPv4 CIDR: {entry}"))?;
        return Ok(expand_cidr_to_ips(net, expansion));
    }
    let ip: Ipv4Addr = entry
        .parse()
        .with_context(|| format!("invalid IPv4 address: {entry}"))?;
    Ok(vec![IpAddr::V4(ip)])
}

/// Parse host-list file content. Blank lines and `#` comments are skipped;
/// entries that fail to parse are logged and skipped.
pub fn parse_targets_str(s: &str, expansion: CidrExpansion) -> Vec<IpAddr> {
    let mut out = Vec::new();
    for (idx, raw_line) in s.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_target(line, expansion) {
            Ok(ips) => out.extend(ips),
            Err(e) => warn!(line = idx + 1, "skipping host-list entry: {e:#}"),
        }
    }
    out
}

/// Load a host list from a file path. Errors if the file cannot be read.
pub fn load_targets_from_path(path: impl AsRef<Path>, expansion: CidrExpansion) -> Result<Vec<IpAddr>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read host list: {}", path.as_ref().display()))?;
    Ok(parse_targets_str(&content, expansion))
}

/// Detect local non-loopback IPv4 addresses and convert each to a default /24 CIDR network.
///
/// For example, an interface IP `192.168.1.42` becomes `192.168.1.0/24`.
/// Duplicates are removed.
pub fn detect_local_cidrs() -> Result<Vec<Ipv4Net>> {
    let mut set = HashSet::<Ipv4Net>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            set.insert(ipv4_to_default_cidr(v4.ip));
        }
    }
    let mut cidrs: Vec<Ipv4Net> = set.into_iter().collect();
    cidrs.sort_by_key(|n| (u32::from(n.network()), n.prefix_len()));
    Ok(cidrs)
}

/// Expand a CIDR into host addresses according to `expansion`.
pub fn expand_cidr_to_ips(net: Ipv4Net, expansion: CidrExpansion) -> Vec<IpAddr> {
    match expansion {
        CidrExpansion::UsableHosts => net.hosts().map(IpAddr::V4).collect(),
        CidrExpansion::AllAddresses => Ipv4AddrRange::new(net.network(), net.broadcast())
            .map(IpAddr::V4)
            .collect(),
    }
}

/// Convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    Ipv4Net::new(Ipv4Addr::new(o[0], o[1], o[2], 0), 24).expect("/24 is always valid")
}
