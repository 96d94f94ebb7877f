//! Read and adjust monitor brightness on Windows.
//!
//! External monitors are driven over DDC/CI, internal panels through the WMI brightness classes. Both end up behind
//! the [`monitor::MonitorItem`] trait.

pub mod brightness;
pub mod config;
pub mod error;
pub mod fade;
pub mod logging;
pub mod monitor;
pub mod watch;

#[cfg(windows)]
pub mod platform;

use crate::config::Config;
use crate::error::Result;
use crate::monitor::MonitorItem;

pub use crate::error::MonitorError;

/// Every monitor connected to the PC whose brightness can be controlled
#[cfg(windows)]
pub fn enumerate_monitors(config: &Config) -> Result<Vec<Box<dyn MonitorItem>>> {
  platform::enumerate_monitors(config)
}

#[cfg(not(windows))]
pub fn enumerate_monitors(_config: &Config) -> Result<Vec<Box<dyn MonitorItem>>> {
  Err(MonitorError::UnsupportedPlatform)
}
