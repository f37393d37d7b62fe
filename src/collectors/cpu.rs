use crate::collectors::{read_source, ProbeError, ProbePaths};

/// Aggregate jiffy counters from the `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuTimes {
    fn idle_total(&self) -> u64 {
        self.idle.saturating_add(self.iowait)
    }

    // guest time is already accounted in user/nice by the kernel
    fn busy_total(&self) -> u64 {
        [
            self.user,
            self.nice,
            self.system,
            self.irq,
            self.softirq,
            self.steal,
        ]
        .iter()
        .fold(0_u64, |acc, v| acc.saturating_add(*v))
    }
}

pub fn read_cpu_times(paths: &ProbePaths) -> Result<CpuTimes, ProbeError> {
    parse_cpu_times(&read_source(&paths.proc("stat"))?)
}

pub fn parse_cpu_times(text: &str) -> Result<CpuTimes, ProbeError> {
    let line = text
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))
        .ok_or(ProbeError::Missing("строка cpu не найдена"))?;

    // Older kernels expose fewer columns; absent ones stay zero.
    let mut values = [0_u64; 10];
    for (slot, field) in values.iter_mut().zip(line.split_whitespace().skip(1)) {
        *slot = field.parse().map_err(|_| ProbeError::Malformed {
            what: "cpu",
            value: field.to_string(),
        })?;
    }

    Ok(CpuTimes {
        user: values[0],
        nice: values[1],
        system: values[2],
        idle: values[3],
        iowait: values[4],
        irq: values[5],
        softirq: values[6],
        steal: values[7],
        guest: values[8],
        guest_nice: values[9],
    })
}

/// Busy share of the time elapsed between two samples, in percent.
///
/// Counter resets and wraps make a delta go backwards; those are clamped to zero, so the result
/// is always within `0..=100` and is `0` when nothing elapsed.
pub fn cpu_percent(prev: &CpuTimes, cur: &CpuTimes) -> f64 {
    let idle = cur.idle_total().saturating_sub(prev.idle_total()) as f64;
    let busy = cur.busy_total().saturating_sub(prev.busy_total()) as f64;
    let total = idle + busy;
    if total <= 0.0 {
        return 0.0;
    }
    (100.0 * busy / total).clamp(0.0, 100.0)
}
