use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// One tick worth of host metrics. Built once by the collector and never mutated afterwards;
/// the store hands out shared `Arc<Snapshot>` handles.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub hostname: String,
    pub os: String,
    pub kernel: String,
    pub uptime_sec: u64,
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
    pub cpu_percent: f64,
    pub cpu_cores: usize,
    pub mem_total_bytes: u64,
    pub mem_available_bytes: u64,
    pub swap_total_bytes: u64,
    pub swap_free_bytes: u64,
    pub net: Vec<InterfaceStat>,
    pub temps: Vec<TempReading>,
    #[serde(
        rename = "last_error",
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serialize_failures"
    )]
    pub failures: Vec<ProbeFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InterfaceStat {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub oper_up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr_ipv4: Option<String>,
    pub rx_bytes_per_sec: u64,
    pub tx_bytes_per_sec: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TempReading {
    pub sensor: String,
    pub celsius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeSource {
    Cpu,
    Memory,
    LoadAvg,
    Uptime,
    Net,
    Thermal,
}

impl ProbeSource {
    pub const ALL: [ProbeSource; 6] = [
        ProbeSource::Cpu,
        ProbeSource::Memory,
        ProbeSource::LoadAvg,
        ProbeSource::Uptime,
        ProbeSource::Net,
        ProbeSource::Thermal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProbeSource::Cpu => "cpustat",
            ProbeSource::Memory => "meminfo",
            ProbeSource::LoadAvg => "loadavg",
            ProbeSource::Uptime => "uptime",
            ProbeSource::Net => "net",
            ProbeSource::Thermal => "thermal",
        }
    }
}

impl fmt::Display for ProbeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub source: ProbeSource,
    pub cause: String,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.cause)
    }
}

pub fn render_failures(failures: &[ProbeFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn serialize_failures<S: Serializer>(
    failures: &[ProbeFailure],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&render_failures(failures))
}
