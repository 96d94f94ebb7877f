//! Brightness of internal displays through the `root\wmi` monitor classes.
//!
//! Laptop panels (and a few externals that route brightness through ACPI) do not speak DDC/CI. For those, Windows
//! publishes the current brightness in `WmiMonitorBrightness` and accepts changes through the `WmiSetBrightness`
//! method of `WmiMonitorBrightnessMethods`. Instances are tied to monitors by their `InstanceName`, which starts with
//! the monitor's device instance ID.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::brightness::{check_brightness, nearest_level};
use crate::error::{MonitorError, Result};
use crate::monitor::{starts_with_ignore_case, MonitorInfo, MonitorItem, MonitorKind};

/// Timeout in seconds handed to `WmiSetBrightness` when the caller does not pick one
pub const DEFAULT_SET_TIMEOUT_SECS: u32 = i32::MAX as u32;

/// A row of `root\cimv2:Win32_DesktopMonitor`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename = "Win32_DesktopMonitor")]
#[serde(rename_all = "PascalCase")]
pub struct DesktopMonitor {
  #[serde(rename = "PNPDeviceID")]
  pub pnp_device_id: Option<String>,
  pub description: Option<String>,
}

/// A row of `root\wmi:WmiMonitorBrightness`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename = "WmiMonitorBrightness")]
#[serde(rename_all = "PascalCase")]
pub struct BrightnessInstance {
  pub instance_name: String,
  pub current_brightness: u8,
  /// Brightness levels the panel supports
  #[serde(default)]
  pub level: Vec<u8>,
}

/// A row of `root\wmi:WmiMonitorBrightnessMethods`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename = "WmiMonitorBrightnessMethods")]
pub struct BrightnessMethods {
  /// Object path used to invoke instance methods
  #[serde(rename = "__Path")]
  pub path: String,
  #[serde(rename = "InstanceName")]
  pub instance_name: String,
}

/// Input parameters of `WmiMonitorBrightnessMethods.WmiSetBrightness`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SetBrightnessParams {
  pub timeout: u32,
  pub brightness: u8,
}

/// Rows of a WMI query that may stop part way through
#[derive(Debug)]
pub struct QueryRows<T> {
  /// Rows read before the query stopped
  pub rows: Vec<T>,
  /// Why the query stopped early, if it did
  pub interrupted: Option<MonitorError>,
}

impl<T> QueryRows<T> {
  pub fn complete(rows: Vec<T>) -> Self {
    Self { rows, interrupted: None }
  }
}

/// Access to the WMI classes involved in monitor brightness
pub trait WmiSource: Send + Sync {
  fn desktop_monitors(&self) -> Result<Vec<DesktopMonitor>>;

  /// Right after the system resumes, iterating the instances may stop with [`MonitorError::WmiNotSupported`]. The rows
  /// read until then are still returned, with the error in [`QueryRows::interrupted`]
  fn brightness_instances(&self) -> Result<QueryRows<BrightnessInstance>>;

  fn brightness_methods(&self) -> Result<Vec<BrightnessMethods>>;

  fn invoke_set_brightness(&self, methods: &BrightnessMethods, params: SetBrightnessParams) -> Result<()>;
}

/// A display WMI can control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopItem {
  pub device_instance_id: String,
  pub description: String,
  pub brightness_levels: Vec<u8>,
}

fn non_blank(value: Option<String>) -> Option<String> {
  value.filter(|value| !value.trim().is_empty())
}

/// List the desktop monitors that expose their brightness through WMI
pub fn enumerate_desktop_monitors<S: WmiSource + ?Sized>(source: &S) -> Result<Vec<DesktopItem>> {
  let monitors: Vec<(String, String)> = source
    .desktop_monitors()?
    .into_iter()
    .filter_map(|monitor| Some((non_blank(monitor.pnp_device_id)?, non_blank(monitor.description)?)))
    .collect();

  let QueryRows { rows: instances, interrupted } = source.brightness_instances()?;
  if let Some(err) = interrupted {
    debug!("stopped reading WmiMonitorBrightness after {} instance(s): {}", instances.len(), err);
  }

  let items = instances
    .into_iter()
    .filter_map(|instance| {
      let (device_instance_id, description) = monitors
        .iter()
        .find(|(id, _)| starts_with_ignore_case(&instance.instance_name, id))?;

      Some(DesktopItem {
        device_instance_id: device_instance_id.clone(),
        description: description.clone(),
        brightness_levels: instance.level,
      })
    })
    .collect();

  Ok(items)
}

fn check_device_instance_id(device_instance_id: &str) -> Result<()> {
  if device_instance_id.trim().is_empty() {
    return Err(MonitorError::BlankDeviceInstanceId);
  }
  Ok(())
}

/// Current brightness of the monitor, or `None` if no WMI instance belongs to it
pub fn get_brightness<S: WmiSource + ?Sized>(source: &S, device_instance_id: &str) -> Result<Option<u8>> {
  check_device_instance_id(device_instance_id)?;

  let QueryRows { rows: instances, interrupted } = source.brightness_instances()?;
  let brightness = instances
    .into_iter()
    .find(|instance| starts_with_ignore_case(&instance.instance_name, device_instance_id))
    .map(|instance| instance.current_brightness);

  match (brightness, interrupted) {
    (None, Some(err)) => Err(err),
    (brightness, _) => Ok(brightness),
  }
}

/// Ask WMI to change the brightness of the monitor. Returns whether the change went through
pub fn set_brightness<S: WmiSource + ?Sized>(
  source: &S,
  device_instance_id: &str,
  brightness: i32,
  timeout: u32,
) -> Result<bool> {
  check_device_instance_id(device_instance_id)?;
  let brightness = check_brightness(brightness)?;

  let Some(methods) = source
    .brightness_methods()?
    .into_iter()
    .find(|methods| starts_with_ignore_case(&methods.instance_name, device_instance_id))
  else {
    return Ok(false);
  };

  match source.invoke_set_brightness(&methods, SetBrightnessParams { timeout, brightness }) {
    Ok(()) => Ok(true),
    Err(err) => {
      warn!("failed to set brightness of {}: {}", methods.instance_name, err);
      Ok(false)
    }
  }
}

/// Display controlled through WMI (internal panel)
pub struct WmiMonitorItem<S: ?Sized> {
  info: MonitorInfo,
  brightness_levels: Vec<u8>,
  timeout: u32,
  source: Arc<S>,
  brightness: Mutex<Option<u8>>,
}

impl<S: WmiSource + ?Sized> WmiMonitorItem<S> {
  pub fn new(item: DesktopItem, display_index: u8, source: Arc<S>, timeout: u32) -> Self {
    Self {
      info: MonitorInfo {
        device_instance_id: item.device_instance_id,
        description: item.description,
        display_index,
        monitor_index: 0,
        is_accessible: true,
        kind: MonitorKind::Wmi,
      },
      brightness_levels: item.brightness_levels,
      timeout,
      source,
      brightness: Mutex::new(None),
    }
  }

  pub fn brightness_levels(&self) -> &[u8] {
    &self.brightness_levels
  }
}

impl<S: WmiSource + ?Sized> MonitorItem for WmiMonitorItem<S> {
  fn info(&self) -> &MonitorInfo {
    &self.info
  }

  fn brightness(&self) -> Option<u8> {
    *self.brightness.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn update_brightness(&self) -> bool {
    let mut known = self.brightness.lock().unwrap_or_else(PoisonError::into_inner);

    *known = match get_brightness(self.source.as_ref(), &self.info.device_instance_id) {
      Ok(brightness) => brightness,
      Err(err) => {
        debug!("failed to read the brightness of {}: {}", self.info.description, err);
        None
      }
    };
    known.is_some()
  }

  fn set_brightness(&self, brightness: i32) -> Result<bool> {
    let brightness = nearest_level(&self.brightness_levels, check_brightness(brightness)?);

    let mut known = self.brightness.lock().unwrap_or_else(PoisonError::into_inner);
    let result =
      set_brightness(self.source.as_ref(), &self.info.device_instance_id, brightness as i32, self.timeout);

    match result {
      Ok(true) => {
        *known = Some(brightness);
        Ok(true)
      }
      Ok(false) => Ok(false),
      Err(err) => {
        warn!("failed to set the brightness of {}: {}", self.info.description, err);
        Ok(false)
      }
    }
  }
}
