use crate::collectors::{ProbeError, ProbePaths};
use crate::snapshot::InterfaceStat;
use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::{Duration, Instant};
use sysinfo::Networks;

const IFF_UP: u64 = 0x1;

/// Enumerates `<sys>/class/net`, ordered by ifindex. Only directory entries are interfaces
/// (`bonding_masters` is a plain file). Unreadable counters read as zero; only a missing or
/// unreadable interface directory fails the probe.
pub fn read_interfaces(
    paths: &ProbePaths,
    ipv4: &HashMap<String, Ipv4Addr>,
) -> Result<Vec<InterfaceStat>, ProbeError> {
    let dir = paths.sys("class/net");
    let entries = fs::read_dir(&dir).map_err(|source| ProbeError::Read {
        path: dir.display().to_string(),
        source,
    })?;

    let mut names: Vec<(u64, String)> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .map(|name| {
            let index = read_number(&dir.join(&name).join("ifindex")).unwrap_or(u64::MAX);
            (index, name)
        })
        .collect();
    names.sort();

    Ok(names
        .into_iter()
        .map(|(_, name)| {
            let addr = ipv4.get(&name).copied();
            read_interface(&dir.join(&name), name, addr)
        })
        .collect())
}

fn read_interface(dir: &Path, name: String, addr: Option<Ipv4Addr>) -> InterfaceStat {
    let stats = dir.join("statistics");
    let counter = |file: &str| read_number(&stats.join(file)).unwrap_or(0);

    let operstate = fs::read_to_string(dir.join("operstate"))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    InterfaceStat {
        rx_bytes: counter("rx_bytes"),
        tx_bytes: counter("tx_bytes"),
        rx_packets: counter("rx_packets"),
        tx_packets: counter("tx_packets"),
        oper_up: resolve_oper_up(&operstate, || admin_up(dir)),
        addr_ipv4: addr.map(|a| a.to_string()),
        rx_bytes_per_sec: 0,
        tx_bytes_per_sec: 0,
        name,
    }
}

/// Some drivers (tun, loopback, many virtual NICs) never report an operstate; for those the
/// administrative flag is the best available hint.
pub fn resolve_oper_up(operstate: &str, admin_up: impl FnOnce() -> bool) -> bool {
    match operstate {
        "up" => true,
        "unknown" => admin_up(),
        _ => false,
    }
}

fn admin_up(dir: &Path) -> bool {
    fs::read_to_string(dir.join("flags"))
        .ok()
        .and_then(|s| u64::from_str_radix(s.trim().trim_start_matches("0x"), 16).ok())
        .is_some_and(|flags| flags & IFF_UP != 0)
}

fn read_number(path: &Path) -> Option<u64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// First IPv4 address bound to each interface. The OS answers for the daemon's own network
/// namespace, so with a relocated `sys_root` the lookup is skipped and no addresses are reported.
pub fn ipv4_addresses(paths: &ProbePaths) -> HashMap<String, Ipv4Addr> {
    if !paths.is_local_sys() {
        return HashMap::new();
    }
    let networks = Networks::new_with_refreshed_list();
    networks
        .iter()
        .filter_map(|(name, data)| {
            data.ip_networks()
                .iter()
                .find_map(|net| match net.addr {
                    IpAddr::V4(v4) => Some(v4),
                    IpAddr::V6(_) => None,
                })
                .map(|v4| (name.clone(), v4))
        })
        .collect()
}

/// Bytes per second between two readings of a cumulative counter. A counter that went backwards
/// (interface reset or replaced) yields zero.
pub fn counter_rate(prev: u64, cur: u64, elapsed: Duration) -> u64 {
    let millis = elapsed.as_millis();
    if millis == 0 {
        return 0;
    }
    let rate = u128::from(cur.saturating_sub(prev)) * 1000 / millis;
    u64::try_from(rate).unwrap_or(u64::MAX)
}

/// Remembers the previous byte counters per interface to fill in the per-second rates.
#[derive(Debug, Default)]
pub struct NetRates {
    prev: HashMap<String, (u64, u64)>,
    prev_at: Option<Instant>,
}

impl NetRates {
    pub fn apply(&mut self, net: &mut [InterfaceStat], now: Instant) {
        let elapsed = self
            .prev_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default();

        for iface in net.iter_mut() {
            if let Some((prev_rx, prev_tx)) = self.prev.get(&iface.name) {
                iface.rx_bytes_per_sec = counter_rate(*prev_rx, iface.rx_bytes, elapsed);
                iface.tx_bytes_per_sec = counter_rate(*prev_tx, iface.tx_bytes, elapsed);
            } else {
                iface.rx_bytes_per_sec = 0;
                iface.tx_bytes_per_sec = 0;
            }
        }

        self.prev = net
            .iter()
            .map(|n| (n.name.clone(), (n.rx_bytes, n.tx_bytes)))
            .collect();
        self.prev_at = Some(now);
    }
}
