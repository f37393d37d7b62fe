use crate::collectors::ProbePaths;
use crate::state::DEFAULT_HISTORY_LEN;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const MIN_INTERVAL: Duration = Duration::from_millis(100);
const MAX_HISTORY_LEN: usize = 10_000;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_interval", with = "humantime_duration")]
    pub interval: Duration,
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    #[serde(default = "default_out_file")]
    pub out_file: String,
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
    #[serde(default = "default_sys_root")]
    pub sys_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            interval: default_interval(),
            out_dir: default_out_dir(),
            out_file: default_out_file(),
            history_len: default_history_len(),
            proc_root: default_proc_root(),
            sys_root: default_sys_root(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

/// Command-line and environment values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub out_dir: Option<PathBuf>,
    pub interval: Option<Duration>,
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Applies overrides and re-validates the result.
    pub fn with_overrides(mut self, overrides: Overrides) -> Result<Self, ConfigError> {
        if let Some(port) = overrides.port {
            let mut addr = SocketAddr::from_str(&self.listen).map_err(|_| {
                ConfigError::Validation(
                    "поле listen должно быть корректным адресом host:port".to_string(),
                )
            })?;
            addr.set_port(port);
            self.listen = addr.to_string();
        }
        if let Some(out_dir) = overrides.out_dir {
            self.out_dir = out_dir;
        }
        if let Some(interval) = overrides.interval {
            self.interval = interval;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation(
                "поле listen обязательно".to_string(),
            ));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "поле listen должно быть корректным адресом host:port".to_string(),
            ));
        }
        if self.interval < MIN_INTERVAL {
            return Err(ConfigError::Validation(format!(
                "interval должен быть >= {}",
                humantime::format_duration(MIN_INTERVAL)
            )));
        }
        if self.out_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "out_dir не должен быть пустым".to_string(),
            ));
        }
        if !is_bare_file_name(&self.out_file) {
            return Err(ConfigError::Validation(format!(
                "out_file '{}' должен быть именем файла без каталогов",
                self.out_file
            )));
        }
        if !(1..=MAX_HISTORY_LEN).contains(&self.history_len) {
            return Err(ConfigError::Validation(format!(
                "history_len должно быть в диапазоне 1..{MAX_HISTORY_LEN}"
            )));
        }
        if self.proc_root.as_os_str().is_empty() || self.sys_root.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "proc_root и sys_root не должны быть пустыми".to_string(),
            ));
        }
        Ok(())
    }

    pub fn probe_paths(&self) -> ProbePaths {
        ProbePaths::new(&self.proc_root, &self.sys_root)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn is_bare_file_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty()
        && trimmed == name
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

fn default_listen() -> String {
    "0.0.0.0:8081".to_string()
}

const fn default_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("/var/lib/sysdash")
}

fn default_out_file() -> String {
    "metrics.json".to_string()
}

const fn default_history_len() -> usize {
    DEFAULT_HISTORY_LEN
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

fn default_sys_root() -> PathBuf {
    PathBuf::from("/sys")
}

/// `interval: 2s` / `interval: 500ms` in YAML.
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
