use std::ffi::c_void;
use std::io;
use std::mem;

use ddc::{Ddc, FeatureCode};
use ddc_winapi::get_physical_monitors_from_hmonitor;
use tracing::{debug, warn};
use windows::core::{BOOL, PCWSTR};
use windows::Win32::Devices::Display::{GetMonitorBrightness, GetMonitorCapabilities, SetMonitorBrightness};
use windows::Win32::Foundation::{HANDLE, LPARAM, RECT};
use windows::Win32::Graphics::Gdi::{
  EnumDisplayDevicesW, EnumDisplayMonitors, GetMonitorInfoW, DISPLAY_DEVICEW, DISPLAY_DEVICE_ACTIVE, HDC, HMONITOR,
  MONITORINFO, MONITORINFOEXW
};

use crate::brightness::RawBrightness;
use crate::error::{MonitorError, Result};
use crate::monitor::{device_instance_id_from_interface, DdcMonitorItem, PhysicalMonitor};

const BRIGHTNESS_VCP_CODE: FeatureCode = 0x10;
const MC_CAPS_BRIGHTNESS: u32 = 0x0000_0002;
const EDD_GET_DEVICE_INTERFACE_NAME: u32 = 0x0000_0001;

/// A physical monitor handle obtained from the monitor configuration API
///
/// The wrapped `ddc_winapi::Monitor` calls `DestroyPhysicalMonitor` when dropped.
pub struct DxvaMonitor {
  ddc_handle: ddc_winapi::Monitor,
}

// SAFETY: physical monitor handles are not tied to the thread that opened them, and `DdcMonitorItem` only ever
// touches one behind its mutex
unsafe impl Send for DxvaMonitor {}

impl DxvaMonitor {
  fn new(ddc_handle: ddc_winapi::Monitor) -> Self {
    Self { ddc_handle }
  }

  fn raw_handle(&self) -> HANDLE {
    HANDLE(self.ddc_handle.handle() as *mut c_void)
  }

  /// Figure out how to drive the brightness of this monitor: `Some(false)` for the high-level API, `Some(true)` for
  /// raw VCP access, `None` if neither works
  fn brightness_access(&mut self) -> Option<bool> {
    let mut capabilities = 0u32;
    let mut color_temperatures = 0u32;
    let supported = unsafe { GetMonitorCapabilities(self.raw_handle(), &mut capabilities, &mut color_temperatures) };
    if supported != 0 && capabilities & MC_CAPS_BRIGHTNESS != 0 {
      return Some(false);
    }

    // Plenty of monitors answer VCP requests even though their capabilities report says otherwise
    match self.ddc_handle.get_vcp_feature(BRIGHTNESS_VCP_CODE) {
      Ok(_) => Some(true),
      Err(err) => {
        debug!("{} does not answer brightness requests: {}", self.ddc_handle.description(), err);
        None
      }
    }
  }
}

impl PhysicalMonitor for DxvaMonitor {
  fn read_brightness(&mut self, low_level: bool) -> Result<RawBrightness> {
    if low_level {
      // The current value sits in the low bytes of the VCP reply, the maximum in the high ones
      let value = self
        .ddc_handle
        .get_vcp_feature(BRIGHTNESS_VCP_CODE)
        .map_err(|err| MonitorError::Ddc(err.to_string()))?;
      return Ok(RawBrightness::new(0, value.value() as u32, value.maximum() as u32));
    }

    let (mut minimum, mut current, mut maximum) = (0u32, 0u32, 0u32);
    let read = unsafe { GetMonitorBrightness(self.raw_handle(), &mut minimum, &mut current, &mut maximum) };
    if read == 0 {
      return Err(MonitorError::Ddc(format!("GetMonitorBrightness failed: {}", io::Error::last_os_error())));
    }
    Ok(RawBrightness::new(minimum, current, maximum))
  }

  fn write_brightness(&mut self, raw: u32, low_level: bool) -> Result<()> {
    if low_level {
      let value = u16::try_from(raw).unwrap_or(u16::MAX);
      return self
        .ddc_handle
        .set_vcp_feature(BRIGHTNESS_VCP_CODE, value)
        .map_err(|err| MonitorError::Ddc(err.to_string()));
    }

    let written = unsafe { SetMonitorBrightness(self.raw_handle(), raw) };
    if written == 0 {
      return Err(MonitorError::Ddc(format!("SetMonitorBrightness failed: {}", io::Error::last_os_error())));
    }
    Ok(())
  }
}

/// Open every physical monitor that lets its brightness be controlled over DDC/CI
///
/// Monitors that answer neither the high-level nor the VCP brightness request are closed again right away
pub fn enumerate_ddc_monitors() -> Vec<DdcMonitorItem<DxvaMonitor>> {
  let mut items = Vec::new();

  for (display_index, hmonitor) in display_monitors().into_iter().enumerate() {
    let device_instance_ids = device_instance_ids(hmonitor);

    let physical_monitors = match get_physical_monitors_from_hmonitor(hmonitor.0 as *mut _) {
      Ok(physical_monitors) => physical_monitors,
      Err(err) => {
        warn!("failed to get the physical monitors of display {}: {}", display_index, err);
        continue;
      }
    };

    for (monitor_index, physical_monitor) in physical_monitors.into_iter().enumerate() {
      let mut monitor = DxvaMonitor::new(unsafe { ddc_winapi::Monitor::new(physical_monitor) });
      let description = monitor.ddc_handle.description();

      let Some(is_low_level) = monitor.brightness_access() else {
        continue;
      };

      let device_instance_id = device_instance_ids.get(monitor_index).cloned().unwrap_or_default();
      debug!(
        "found {} ({}) on display {}, low level: {}",
        description, device_instance_id, display_index, is_low_level
      );

      items.push(DdcMonitorItem::new(
        device_instance_id,
        description,
        display_index as u8,
        monitor_index as u8,
        monitor,
        is_low_level,
      ));
    }
  }

  items
}

/// Handles of all display monitors, in the order Windows reports them
fn display_monitors() -> Vec<HMONITOR> {
  let mut hmonitors: Vec<HMONITOR> = Vec::new();

  // SAFETY: the callback only runs while EnumDisplayMonitors is on the stack, so the Vec outlives every use of the
  // pointer passed through LPARAM
  let enumerated =
    unsafe { EnumDisplayMonitors(None, None, Some(collect_hmonitor), LPARAM(&mut hmonitors as *mut _ as isize)) };
  if !enumerated.as_bool() {
    debug!(
      "EnumDisplayMonitors failed after {} display(s): {}",
      hmonitors.len(),
      io::Error::last_os_error()
    );
  }

  hmonitors
}

/// Device instance IDs of the active monitors, grouped by display in the order Windows reports the displays
pub fn display_device_instance_ids() -> Vec<Vec<String>> {
  display_monitors().into_iter().map(device_instance_ids).collect()
}

unsafe extern "system" fn collect_hmonitor(hmonitor: HMONITOR, _hdc: HDC, _rect: *mut RECT, lparam: LPARAM) -> BOOL {
  let hmonitors = &mut *(lparam.0 as *mut Vec<HMONITOR>);
  hmonitors.push(hmonitor);
  BOOL(1)
}

/// Device instance IDs of the active monitors attached to a display, in physical monitor order
fn device_instance_ids(hmonitor: HMONITOR) -> Vec<String> {
  let mut info = MONITORINFOEXW::default();
  info.monitorInfo.cbSize = mem::size_of::<MONITORINFOEXW>() as u32;

  // SAFETY: MONITORINFOEXW starts with a MONITORINFO and cbSize tells the API which one it got
  let found = unsafe { GetMonitorInfoW(hmonitor, &mut info as *mut MONITORINFOEXW as *mut MONITORINFO) };
  if !found.as_bool() {
    return Vec::new();
  }

  let mut ids = Vec::new();
  for device_index in 0.. {
    let mut device = DISPLAY_DEVICEW { cb: mem::size_of::<DISPLAY_DEVICEW>() as u32, ..Default::default() };
    let found = unsafe {
      EnumDisplayDevicesW(PCWSTR(info.szDevice.as_ptr()), device_index, &mut device, EDD_GET_DEVICE_INTERFACE_NAME)
    };
    if !found.as_bool() {
      break;
    }
    if device.StateFlags.0 & DISPLAY_DEVICE_ACTIVE.0 == 0 {
      continue;
    }
    if let Some(id) = device_instance_id_from_interface(&from_wide(&device.DeviceID)) {
      ids.push(id);
    }
  }

  ids
}

fn from_wide(buffer: &[u16]) -> String {
  let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
  String::from_utf16_lossy(&buffer[..len])
}
