use crate::collectors::{ProbeError, ProbePaths};
use crate::snapshot::TempReading;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

/// Raw values above this are taken as millidegrees.
// TODO: calibrate against drivers that report plain Celsius above 200 (industrial sensors).
pub const MILLIDEGREE_THRESHOLD: f64 = 200.0;

/// Reads every `thermal_zone*` under `<sys>/class/thermal`, in zone number order.
///
/// Zones without a readable `type` or `temp` are skipped. A host without the thermal class at
/// all (most VMs) has no sensors, which is not a failure.
pub fn read_thermal_zones(paths: &ProbePaths) -> Result<Vec<TempReading>, ProbeError> {
    let dir = paths.sys("class/thermal");
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ProbeError::Read {
                path: dir.display().to_string(),
                source,
            })
        }
    };

    let mut zones: Vec<(u32, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            let index: u32 = name.strip_prefix("thermal_zone")?.parse().ok()?;
            Some((index, entry.path()))
        })
        .collect();
    zones.sort();

    let mut out = Vec::with_capacity(zones.len());
    for (_, zone) in zones {
        let (Ok(label), Ok(raw)) = (
            fs::read_to_string(zone.join("type")),
            fs::read_to_string(zone.join("temp")),
        ) else {
            continue;
        };
        let Ok(value) = raw.trim().parse::<f64>() else {
            debug!(zone = %zone.display(), raw = raw.trim(), "нечисловое значение температуры");
            continue;
        };
        out.push(TempReading {
            sensor: label.trim().to_string(),
            celsius: normalize_celsius(value),
        });
    }

    Ok(out)
}

pub fn normalize_celsius(raw: f64) -> f64 {
    if raw > MILLIDEGREE_THRESHOLD {
        raw / 1000.0
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_zone(sys: &Path, index: u32, label: Option<&str>, temp: Option<&str>) {
        let dir = sys.join(format!("class/thermal/thermal_zone{index}"));
        fs::create_dir_all(&dir).unwrap();
        if let Some(label) = label {
            fs::write(dir.join("type"), format!("{label}\n")).unwrap();
        }
        if let Some(temp) = temp {
            fs::write(dir.join("temp"), format!("{temp}\n")).unwrap();
        }
    }

    #[test]
    fn millidegrees_and_plain_celsius() {
        assert_eq!(normalize_celsius(45_000.0), 45.0);
        assert_eq!(normalize_celsius(45.0), 45.0);
        assert_eq!(normalize_celsius(200.0), 200.0);
        assert_eq!(normalize_celsius(201.0), 0.201);
    }

    #[test]
    fn reads_zones_in_numeric_order_and_skips_incomplete() {
        let root = tempfile::tempdir().unwrap();
        write_zone(root.path(), 10, Some("iwlwifi_1"), Some("38000"));
        write_zone(root.path(), 2, Some("x86_pkg_temp"), Some("45000"));
        write_zone(root.path(), 0, Some("acpitz"), Some("45"));
        write_zone(root.path(), 3, None, Some("50000"));
        write_zone(root.path(), 4, Some("no_temp"), None);
        fs::create_dir_all(root.path().join("class/thermal/cooling_device0")).unwrap();

        let paths = ProbePaths::new("/nonexistent-proc", root.path());
        let temps = read_thermal_zones(&paths).unwrap();
        assert_eq!(
            temps,
            vec![
                TempReading {
                    sensor: "acpitz".to_string(),
                    celsius: 45.0
                },
                TempReading {
                    sensor: "x86_pkg_temp".to_string(),
                    celsius: 45.0
                },
                TempReading {
                    sensor: "iwlwifi_1".to_string(),
                    celsius: 38.0
                },
            ]
        );
    }

    #[test]
    fn missing_thermal_class_means_no_sensors() {
        let root = tempfile::tempdir().unwrap();
        let paths = ProbePaths::new("/nonexistent-proc", root.path());
        assert!(read_thermal_zones(&paths).unwrap().is_empty());
    }
}
