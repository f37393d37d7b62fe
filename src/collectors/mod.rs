pub mod cpu;
pub mod net;
pub mod system;
pub mod thermal;

use crate::metrics::Metrics;
use crate::persist::Persister;
use crate::snapshot::{ProbeFailure, ProbeSource, Snapshot};
use crate::state::Store;
use chrono::Utc;
use cpu::CpuTimes;
use net::NetRates;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use system::{HostIdentity, LoadAvg, MemInfo};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("не удалось прочитать {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("{0}")]
    Missing(&'static str),
    #[error("{what}: ожидалось полей {expected}, получено {got}")]
    TooFewFields {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{what}: некорректное значение {value:?}")]
    Malformed { what: &'static str, value: String },
}

/// Mount points of procfs and sysfs. Containers watching their host bind-mount these elsewhere.
///
/// Interface addresses are not part of sysfs; they are only reported while `sys_root` is the
/// local `/sys`.
#[derive(Debug, Clone)]
pub struct ProbePaths {
    pub proc_root: PathBuf,
    pub sys_root: PathBuf,
}

impl ProbePaths {
    pub fn new(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
        }
    }

    pub fn proc(&self, rel: &str) -> PathBuf {
        self.proc_root.join(rel)
    }

    pub fn sys(&self, rel: &str) -> PathBuf {
        self.sys_root.join(rel)
    }

    pub fn is_local_sys(&self) -> bool {
        self.sys_root == Path::new("/sys")
    }
}

impl Default for ProbePaths {
    fn default() -> Self {
        Self::new("/proc", "/sys")
    }
}

pub(crate) fn read_source(path: &Path) -> Result<String, ProbeError> {
    fs::read_to_string(path).map_err(|source| ProbeError::Read {
        path: path.display().to_string(),
        source,
    })
}

/// One tick of sampling. Implementations do blocking I/O and are driven from the blocking pool.
pub trait Sampler: Send + 'static {
    fn sample(&mut self) -> Snapshot;
}

/// Runs every probe once per call and assembles the snapshot. Holds the counters that rates are
/// derived from, so there must be exactly one per process.
pub struct Collector {
    paths: ProbePaths,
    host: HostIdentity,
    prev_cpu: Option<CpuTimes>,
    net_rates: NetRates,
}

impl Collector {
    pub fn new(paths: ProbePaths) -> Self {
        Self::with_host(paths, HostIdentity::detect())
    }

    pub fn with_host(paths: ProbePaths, host: HostIdentity) -> Self {
        let prev_cpu = cpu::read_cpu_times(&paths).ok();
        Self {
            paths,
            host,
            prev_cpu,
            net_rates: NetRates::default(),
        }
    }

    pub fn sample(&mut self) -> Snapshot {
        let mut failures = Vec::new();

        let cpu_percent = match cpu::read_cpu_times(&self.paths) {
            Ok(cur) => {
                let pct = self
                    .prev_cpu
                    .map(|prev| cpu::cpu_percent(&prev, &cur))
                    .unwrap_or(0.0);
                self.prev_cpu = Some(cur);
                pct
            }
            Err(err) => {
                // without a trustworthy baseline the next delta would be meaningless
                self.prev_cpu = None;
                record(&mut failures, ProbeSource::Cpu, err);
                0.0
            }
        };

        let mem = system::read_meminfo(&self.paths).unwrap_or_else(|err| {
            record(&mut failures, ProbeSource::Memory, err);
            MemInfo::default()
        });
        let load = system::read_loadavg(&self.paths).unwrap_or_else(|err| {
            record(&mut failures, ProbeSource::LoadAvg, err);
            LoadAvg::default()
        });
        let uptime_sec = system::read_uptime(&self.paths).unwrap_or_else(|err| {
            record(&mut failures, ProbeSource::Uptime, err);
            0
        });

        let addrs = net::ipv4_addresses(&self.paths);
        let mut net = net::read_interfaces(&self.paths, &addrs).unwrap_or_else(|err| {
            record(&mut failures, ProbeSource::Net, err);
            Vec::new()
        });
        self.net_rates.apply(&mut net, std::time::Instant::now());

        let temps = thermal::read_thermal_zones(&self.paths).unwrap_or_else(|err| {
            record(&mut failures, ProbeSource::Thermal, err);
            Vec::new()
        });

        Snapshot {
            timestamp: Utc::now(),
            hostname: self.host.hostname.clone(),
            os: self.host.os.clone(),
            kernel: self.host.kernel.clone(),
            uptime_sec,
            load1: load.one,
            load5: load.five,
            load15: load.fifteen,
            cpu_percent,
            cpu_cores: self.host.cpu_cores,
            mem_total_bytes: mem.total_bytes,
            mem_available_bytes: mem.available_bytes,
            swap_total_bytes: mem.swap_total_bytes,
            swap_free_bytes: mem.swap_free_bytes,
            net,
            temps,
            failures,
        }
    }
}

impl Sampler for Collector {
    fn sample(&mut self) -> Snapshot {
        Collector::sample(self)
    }
}

fn record(failures: &mut Vec<ProbeFailure>, source: ProbeSource, err: ProbeError) {
    warn!(source = %source, error = %err, "сбой источника метрик");
    failures.push(ProbeFailure {
        source,
        cause: err.to_string(),
    });
}

/// The sampling loop. Each tick starts `interval` after the previous one started; a tick that
/// overran is followed by the next one right away.
///
/// Probe reads and the fsync of the persisted file run on the blocking pool so that HTTP readers
/// sharing the worker are not held up by a slow filesystem.
pub async fn run_collector<S: Sampler>(
    mut sampler: S,
    store: Arc<Store>,
    persister: Persister,
    metrics: Arc<Metrics>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let persister = Arc::new(persister);
    loop {
        let started = Instant::now();

        let tick = tokio::task::spawn_blocking(move || {
            let snapshot = sampler.sample();
            (sampler, snapshot)
        });
        let snapshot = match tick.await {
            Ok((returned, snapshot)) => {
                sampler = returned;
                Arc::new(snapshot)
            }
            Err(err) => {
                error!(error = %err, "сбор метрик аварийно завершился, цикл остановлен");
                break;
            }
        };
        for failure in &snapshot.failures {
            metrics.inc_probe_error(failure.source.as_str());
        }

        let history_len = store.publish(snapshot.clone()).await;
        metrics.update_from_snapshot(&snapshot, history_len);
        let save = {
            let persister = persister.clone();
            let snapshot = snapshot.clone();
            tokio::task::spawn_blocking(move || persister.save(&snapshot))
        };
        if let Err(err) = save.await {
            warn!(error = %err, "задача сохранения снимка завершилась с ошибкой");
        }

        debug!(
            cpu_percent = snapshot.cpu_percent,
            interfaces = snapshot.net.len(),
            sensors = snapshot.temps.len(),
            failures = snapshot.failures.len(),
            history_len,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "снимок метрик опубликован"
        );

        tokio::select! {
            _ = shutdown.changed() => {
                info!("получен сигнал остановки цикла сбора");
                break;
            }
            _ = tokio::time::sleep_until(started + interval) => {}
        }
    }
}
