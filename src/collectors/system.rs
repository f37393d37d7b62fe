use crate::collectors::{read_source, ProbeError, ProbePaths};
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub swap_total_bytes: u64,
    pub swap_free_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadAvg {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Values that do not change while the process runs, captured once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostIdentity {
    pub hostname: String,
    pub os: String,
    pub kernel: String,
    pub cpu_cores: usize,
}

impl HostIdentity {
    pub fn detect() -> Self {
        Self {
            hostname: System::host_name().unwrap_or_default(),
            os: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
            kernel: kernel_identity(),
            cpu_cores: logical_cpu_count(),
        }
    }
}

pub fn read_meminfo(paths: &ProbePaths) -> Result<MemInfo, ProbeError> {
    parse_meminfo(&read_source(&paths.proc("meminfo"))?)
}

pub fn parse_meminfo(text: &str) -> Result<MemInfo, ProbeError> {
    let mut info = MemInfo::default();
    let mut saw_total = false;

    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let (Some(key), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        let slot = match key.trim_end_matches(':') {
            "MemTotal" => {
                saw_total = true;
                &mut info.total_bytes
            }
            "MemAvailable" => &mut info.available_bytes,
            "SwapTotal" => &mut info.swap_total_bytes,
            "SwapFree" => &mut info.swap_free_bytes,
            _ => continue,
        };
        let kib: u64 = value.parse().map_err(|_| ProbeError::Malformed {
            what: "meminfo",
            value: line.to_string(),
        })?;
        *slot = kib.saturating_mul(1024);
    }

    if !saw_total {
        return Err(ProbeError::Missing("MemTotal не найден"));
    }
    Ok(info)
}

pub fn read_loadavg(paths: &ProbePaths) -> Result<LoadAvg, ProbeError> {
    parse_loadavg(&read_source(&paths.proc("loadavg"))?)
}

pub fn parse_loadavg(text: &str) -> Result<LoadAvg, ProbeError> {
    let fields: Vec<&str> = text.split_whitespace().take(3).collect();
    let [one, five, fifteen] = fields[..] else {
        return Err(ProbeError::TooFewFields {
            what: "loadavg",
            expected: 3,
            got: fields.len(),
        });
    };
    let parse = |v: &str| {
        v.parse::<f64>().map_err(|_| ProbeError::Malformed {
            what: "loadavg",
            value: v.to_string(),
        })
    };
    Ok(LoadAvg {
        one: parse(one)?,
        five: parse(five)?,
        fifteen: parse(fifteen)?,
    })
}

pub fn read_uptime(paths: &ProbePaths) -> Result<u64, ProbeError> {
    parse_uptime(&read_source(&paths.proc("uptime"))?)
}

pub fn parse_uptime(text: &str) -> Result<u64, ProbeError> {
    let first = text
        .split_whitespace()
        .next()
        .ok_or(ProbeError::TooFewFields {
            what: "uptime",
            expected: 1,
            got: 0,
        })?;
    match first.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(secs.trunc() as u64),
        _ => Err(ProbeError::Malformed {
            what: "uptime",
            value: first.to_string(),
        }),
    }
}

/// `"<sysname> <release>"` from uname(2), e.g. `Linux 6.8.0-45-generic`.
#[cfg(unix)]
pub fn kernel_identity() -> String {
    match nix::sys::utsname::uname() {
        Ok(uts) => format!(
            "{} {}",
            uts.sysname().to_string_lossy(),
            uts.release().to_string_lossy()
        ),
        Err(err) => {
            debug!(error = %err, "uname недоступен, строка ядра будет пустой");
            String::new()
        }
    }
}

#[cfg(not(unix))]
pub fn kernel_identity() -> String {
    System::kernel_version().unwrap_or_default()
}

fn logical_cpu_count() -> usize {
    let system =
        System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::new()));
    let count = system.cpus().len();
    if count > 0 {
        return count;
    }
    debug!("sysinfo не вернул список CPU, используется available_parallelism");
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:       16384000 kB\n\
MemFree:         1234567 kB\n\
MemAvailable:    8192000 kB\n\
Buffers:          200000 kB\n\
SwapTotal:       2097148 kB\n\
SwapFree:        2097000 kB\n\
HugePages_Total:       0\n";

    #[test]
    fn meminfo_converts_kib_to_bytes() {
        let mem = parse_meminfo(MEMINFO).unwrap();
        assert_eq!(mem.total_bytes, 16_777_216_000);
        assert_eq!(mem.available_bytes, 8_388_608_000);
        assert_eq!(mem.swap_total_bytes, 2_097_148 * 1024);
        assert_eq!(mem.swap_free_bytes, 2_097_000 * 1024);
    }

    #[test]
    fn meminfo_without_total_fails() {
        let err = parse_meminfo("MemFree: 10 kB\n").unwrap_err();
        assert!(matches!(err, ProbeError::Missing(_)));
    }

    #[test]
    fn meminfo_without_swap_reads_zero() {
        let mem = parse_meminfo("MemTotal: 1024 kB\nMemAvailable: 512 kB\n").unwrap();
        assert_eq!(mem.total_bytes, 1024 * 1024);
        assert_eq!(mem.swap_total_bytes, 0);
        assert_eq!(mem.swap_free_bytes, 0);
    }

    #[test]
    fn loadavg_parses_three_values() {
        let load = parse_loadavg("0.52 0.58 0.59 1/1195 123456\n").unwrap();
        assert_eq!(
            load,
            LoadAvg {
                one: 0.52,
                five: 0.58,
                fifteen: 0.59
            }
        );
    }

    #[test]
    fn loadavg_with_two_fields_fails() {
        let err = parse_loadavg("0.52 0.58").unwrap_err();
        assert!(matches!(
            err,
            ProbeError::TooFewFields {
                expected: 3,
                got: 2,
                ..
            }
        ));
    }

    #[test]
    fn uptime_truncates_fraction() {
        assert_eq!(parse_uptime("350735.47 234388.90\n").unwrap(), 350735);
        assert_eq!(parse_uptime("0.99 0.10").unwrap(), 0);
    }

    #[test]
    fn uptime_rejects_empty_and_garbage() {
        assert!(parse_uptime("").is_err());
        assert!(parse_uptime("abc 1.0").is_err());
        assert!(parse_uptime("-5.0 1.0").is_err());
    }

    #[test]
    fn probes_read_from_proc_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("meminfo"), MEMINFO).unwrap();
        std::fs::write(dir.path().join("loadavg"), "1.00 2.00 3.00 1/1 1\n").unwrap();
        std::fs::write(dir.path().join("uptime"), "42.9 10.0\n").unwrap();
        let paths = ProbePaths::new(dir.path(), dir.path());

        assert_eq!(read_meminfo(&paths).unwrap().total_bytes, 16_777_216_000);
        assert_eq!(read_loadavg(&paths).unwrap().fifteen, 3.0);
        assert_eq!(read_uptime(&paths).unwrap(), 42);
    }

    #[test]
    fn missing_source_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProbePaths::new(dir.path(), dir.path());
        let err = read_uptime(&paths).unwrap_err();
        assert!(matches!(err, ProbeError::Read { .. }));
    }

    #[test]
    fn host_identity_has_os_and_cores() {
        let host = HostIdentity::detect();
        assert!(host.os.contains('/'));
        assert!(host.cpu_cores >= 1);
    }
}
