//! Windows bindings: DDC/CI through the monitor configuration API and WMI through the `wmi` crate.

mod dxva;
mod wmi_source;

use std::sync::Arc;

use tracing::warn;

use crate::config::Config;
use crate::error::Result;
use crate::monitor::wmi::enumerate_desktop_monitors;
use crate::monitor::{append_unique, display_index_of, MonitorItem, WmiMonitorItem};

pub use self::dxva::{display_device_instance_ids, enumerate_ddc_monitors, DxvaMonitor};
pub use self::wmi_source::WmiConnectionSource;

/// Every monitor whose brightness can be controlled: DDC/CI monitors first, then WMI ones
///
/// A WMI monitor that is also reachable over DDC/CI is only listed once, as the DDC/CI monitor.
pub fn enumerate_monitors(config: &Config) -> Result<Vec<Box<dyn MonitorItem>>> {
  let mut monitors: Vec<Box<dyn MonitorItem>> = Vec::new();
  for monitor in enumerate_ddc_monitors() {
    monitors.push(Box::new(monitor));
  }

  let source = Arc::new(WmiConnectionSource);
  let desktop_items = match enumerate_desktop_monitors(source.as_ref()) {
    Ok(items) => items,
    Err(err) => {
      warn!("failed to enumerate WMI monitors: {}", err);
      Vec::new()
    }
  };
  if desktop_items.is_empty() {
    return Ok(monitors);
  }

  let displays = display_device_instance_ids();
  let wmi_monitors = desktop_items.into_iter().enumerate().map(|(index, item)| {
    let display_index = display_index_of(&displays, &item.device_instance_id).unwrap_or(index as u8);
    Box::new(WmiMonitorItem::new(item, display_index, Arc::clone(&source), config.wmi.timeout_secs))
      as Box<dyn MonitorItem>
  });
  append_unique(&mut monitors, wmi_monitors);

  Ok(monitors)
}
