//! Read-only settings, loaded from `config.toml`.
//!
//! The file lives at `<config dir>/monitor-brightness/config.toml` unless a path is given on the command line. A
//! missing file means defaults. Every section and key is optional.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};
use crate::monitor::wmi::DEFAULT_SET_TIMEOUT_SECS;

const APP_DIR_NAME: &str = "monitor-brightness";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub log: LogConfig,
  pub wmi: WmiConfig,
  pub fade: FadeConfig,
  pub watch: WatchConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Filter directive for the log output, e.g. "info" or "monitor_brightness=debug". `RUST_LOG` takes precedence
  pub level: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self { level: "info".into() }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WmiConfig {
  /// Seconds the brightness change requested through WMI stays in effect
  pub timeout_secs: u32,
}

impl Default for WmiConfig {
  fn default() -> Self {
    Self { timeout_secs: DEFAULT_SET_TIMEOUT_SECS }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FadeConfig {
  pub duration_ms: u64,
  pub steps: usize,
}

impl Default for FadeConfig {
  fn default() -> Self {
    Self { duration_ms: 300, steps: 10 }
  }
}

impl FadeConfig {
  pub fn duration(&self) -> Duration {
    Duration::from_millis(self.duration_ms)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
  pub interval_ms: u64,
}

impl Default for WatchConfig {
  fn default() -> Self {
    Self { interval_ms: 1000 }
  }
}

impl WatchConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_millis(self.interval_ms)
  }
}

impl Config {
  /// Load the config from `path`, or from the default location when `path` is `None`
  pub fn load(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(path) => path.to_path_buf(),
      None => match config_path() {
        Some(path) => path,
        None => return Ok(Self::default()),
      },
    };

    let content = match std::fs::read_to_string(&path) {
      Ok(content) => content,
      Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
      Err(source) => return Err(MonitorError::Io { path, source }),
    };

    let mut config: Self = toml::from_str(&content).map_err(|err| MonitorError::Config {
      path: path.clone(),
      message: err.message().to_owned(),
    })?;
    config.validate();
    Ok(config)
  }

  /// Clamp values that would make the fade or the watch loop degenerate
  pub fn validate(&mut self) {
    self.fade.steps = self.fade.steps.clamp(1, 100);
    self.watch.interval_ms = self.watch.interval_ms.max(50);
    if self.log.level.trim().is_empty() {
      self.log.level = LogConfig::default().level;
    }
  }
}

/// `<config dir>/monitor-brightness/config.toml`
pub fn config_path() -> Option<PathBuf> {
  dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.wmi.timeout_secs, i32::MAX as u32);
  }

  #[test]
  fn partial_file_keeps_other_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "[fade]\nduration_ms = 1200\n\n[wmi]\ntimeout_secs = 5\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.fade.duration(), Duration::from_millis(1200));
    assert_eq!(config.fade.steps, 10);
    assert_eq!(config.wmi.timeout_secs, 5);
    assert_eq!(config.watch, WatchConfig::default());
  }

  #[test]
  fn out_of_range_values_are_clamped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "[fade]\nsteps = 0\n\n[watch]\ninterval_ms = 0\n\n[log]\nlevel = \"\"\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.fade.steps, 1);
    assert_eq!(config.watch.interval_ms, 50);
    assert_eq!(config.log.level, "info");
  }

  #[test]
  fn malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "[fade\nsteps = ten").unwrap();

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(matches!(err, MonitorError::Config { .. }));
  }
}
