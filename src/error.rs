use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the brightness API.
///
/// Hardware that simply refuses a request is not an error: those calls log and report `false` or an unknown
/// brightness instead. Variants here are either caller mistakes or failures to reach the OS subsystem at all.
#[derive(Debug, Error)]
pub enum MonitorError {
  #[error("the brightness must be within 0 to 100, got {0}")]
  BrightnessOutOfRange(i32),

  #[error("the device instance ID must not be blank")]
  BlankDeviceInstanceId,

  #[error("no monitor matches `{0}`")]
  MonitorNotFound(String),

  #[error("DDC/CI call failed: {0}")]
  Ddc(String),

  #[error("WMI {operation} failed: {message}")]
  Wmi { operation: &'static str, message: String },

  #[error("WMI {0} is not supported right now")]
  WmiNotSupported(&'static str),

  #[error("invalid config file {}: {message}", path.display())]
  Config { path: PathBuf, message: String },

  #[error("failed to read {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("brightness control is only available on Windows")]
  UnsupportedPlatform,
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;
