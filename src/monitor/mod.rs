pub mod ddc;
pub mod wmi;

use std::fmt;

use tracing::debug;

use crate::error::{MonitorError, Result};

pub use self::ddc::{DdcMonitorItem, PhysicalMonitor};
pub use self::wmi::{WmiMonitorItem, WmiSource};

/// Which OS subsystem drives a monitor's brightness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorKind {
  /// External monitor talking DDC/CI over the video cable
  Ddc,
  /// Internal panel (or ACPI-backed external) exposed through WMI
  Wmi,
}

impl fmt::Display for MonitorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Ddc => f.write_str("DDC/CI"),
      Self::Wmi => f.write_str("WMI"),
    }
  }
}

/// Identity of a monitor connected to the PC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorInfo {
  /// PnP device instance ID, e.g. `DISPLAY\DEL40B6\5&2a2ef2e0&0&UID4353`
  pub device_instance_id: String,
  pub description: String,
  /// Position of the display (HMONITOR) the monitor belongs to
  ///
  /// For WMI monitors that cannot be matched to an active display, this is the position in the WMI enumeration
  /// instead.
  pub display_index: u8,
  /// Position of the physical monitor within its display
  pub monitor_index: u8,
  pub is_accessible: bool,
  pub kind: MonitorKind,
}

/// A monitor whose brightness can be read and adjusted
///
/// Implementations serialize their own hardware access, so a single item can be shared between threads
pub trait MonitorItem: Send + Sync {
  fn info(&self) -> &MonitorInfo;

  /// The last brightness read from or written to the monitor, `None` if unknown
  fn brightness(&self) -> Option<u8>;

  /// Read the brightness from the hardware again. Returns whether the read succeeded
  fn update_brightness(&self) -> bool;

  /// Set the brightness, a value within 0 to 100
  ///
  /// Out-of-range values are rejected before touching the hardware. A monitor that refuses the request yields
  /// `Ok(false)` and keeps its previous brightness.
  fn set_brightness(&self, brightness: i32) -> Result<bool>;

  /// Release the native resources held by the monitor. Calling it more than once is harmless
  fn close(&self) {}
}

/// Pick monitors by list position or by device instance ID prefix. No selector means all of them
pub fn select_monitors<'a>(
  monitors: &'a [Box<dyn MonitorItem>],
  selector: Option<&str>,
) -> Result<Vec<&'a dyn MonitorItem>> {
  let Some(selector) = selector.map(str::trim) else {
    return Ok(monitors.iter().map(|monitor| monitor.as_ref()).collect());
  };

  let selected: Vec<&dyn MonitorItem> = match selector.parse::<usize>() {
    Ok(index) => monitors.get(index).map(|monitor| monitor.as_ref()).into_iter().collect(),
    Err(_) if selector.is_empty() => Vec::new(),
    Err(_) => monitors
      .iter()
      .filter(|monitor| starts_with_ignore_case(&monitor.info().device_instance_id, selector))
      .map(|monitor| monitor.as_ref())
      .collect(),
  };

  if selected.is_empty() {
    return Err(MonitorError::MonitorNotFound(selector.to_owned()));
  }
  Ok(selected)
}

/// Append monitors whose device instance ID is not in the list yet, compared ignoring ASCII case
///
/// Earlier entries win, so a panel reachable over both DDC/CI and WMI stays with whichever was listed first.
pub fn append_unique<I>(monitors: &mut Vec<Box<dyn MonitorItem>>, candidates: I)
where
  I: IntoIterator<Item = Box<dyn MonitorItem>>,
{
  for candidate in candidates {
    let id = &candidate.info().device_instance_id;
    let duplicate = monitors
      .iter()
      .any(|monitor| monitor.info().device_instance_id.eq_ignore_ascii_case(id));
    if duplicate {
      debug!("{} ({}) is already listed, skipping it", id, candidate.info().kind);
      continue;
    }
    monitors.push(candidate);
  }
}

/// Position of the display that lists `device_instance_id` among its monitors
///
/// `displays` holds the device instance IDs of each display, in display order.
pub fn display_index_of(displays: &[Vec<String>], device_instance_id: &str) -> Option<u8> {
  displays
    .iter()
    .position(|ids| ids.iter().any(|id| id.eq_ignore_ascii_case(device_instance_id)))
    .and_then(|index| u8::try_from(index).ok())
}

/// Ordinal, case-insensitive prefix test as used for PnP IDs
pub fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
  haystack
    .get(..prefix.len())
    .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Turn a display device interface path into the device instance ID WMI and PnP use
///
/// `\\?\DISPLAY#DEL40B6#5&2a2ef2e0&0&UID4353#{e6f07b5f-ee97-4a90-b076-33f57bf4eaa7}` becomes
/// `DISPLAY\DEL40B6\5&2a2ef2e0&0&UID4353`
pub fn device_instance_id_from_interface(interface_name: &str) -> Option<String> {
  let trimmed = interface_name.strip_prefix(r"\\?\").unwrap_or(interface_name);
  let without_class = match trimmed.rfind("#{") {
    Some(index) => &trimmed[..index],
    None => trimmed,
  };

  if without_class.is_empty() || !without_class.contains('#') {
    return None;
  }
  Some(without_class.replace('#', r"\"))
}

#[cfg(test)]
pub(crate) mod tests {
  use std::sync::Mutex;

  use super::*;

  /// In-memory monitor for exercising code that drives `MonitorItem`s
  pub(crate) struct FakeMonitor {
    info: MonitorInfo,
    pub(crate) hardware: Mutex<u8>,
    pub(crate) known: Mutex<Option<u8>>,
    pub(crate) writes: Mutex<Vec<u8>>,
    pub(crate) fail_after: Option<usize>,
  }

  impl FakeMonitor {
    pub(crate) fn new(device_instance_id: &str, brightness: u8) -> Self {
      Self {
        info: MonitorInfo {
          device_instance_id: device_instance_id.to_owned(),
          description: "Fake Monitor".to_owned(),
          display_index: 0,
          monitor_index: 0,
          is_accessible: true,
          kind: MonitorKind::Ddc,
        },
        hardware: Mutex::new(brightness),
        known: Mutex::new(None),
        writes: Mutex::new(Vec::new()),
        fail_after: None,
      }
    }

    pub(crate) fn with_kind(mut self, kind: MonitorKind) -> Self {
      self.info.kind = kind;
      self
    }
  }

  impl MonitorItem for FakeMonitor {
    fn info(&self) -> &MonitorInfo {
      &self.info
    }

    fn brightness(&self) -> Option<u8> {
      *self.known.lock().unwrap()
    }

    fn update_brightness(&self) -> bool {
      *self.known.lock().unwrap() = Some(*self.hardware.lock().unwrap());
      true
    }

    fn set_brightness(&self, brightness: i32) -> Result<bool> {
      let brightness = crate::brightness::check_brightness(brightness)?;
      let mut writes = self.writes.lock().unwrap();
      if self.fail_after.is_some_and(|limit| writes.len() >= limit) {
        return Ok(false);
      }
      writes.push(brightness);
      *self.hardware.lock().unwrap() = brightness;
      *self.known.lock().unwrap() = Some(brightness);
      Ok(true)
    }
  }

  fn sample() -> Vec<Box<dyn MonitorItem>> {
    vec![
      Box::new(FakeMonitor::new(r"DISPLAY\DEL40B6\5&2a2ef2e0&0&UID4353", 10)),
      Box::new(FakeMonitor::new(r"DISPLAY\SHP14C8\4&1b2c3d4&0&UID265988", 20)),
    ]
  }

  #[test]
  fn selects_all_without_selector() {
    let monitors = sample();
    assert_eq!(select_monitors(&monitors, None).unwrap().len(), 2);
  }

  #[test]
  fn selects_by_index_and_by_id_prefix() {
    let monitors = sample();

    let by_index = select_monitors(&monitors, Some("1")).unwrap();
    assert_eq!(by_index[0].info().device_instance_id, r"DISPLAY\SHP14C8\4&1b2c3d4&0&UID265988");

    let by_id = select_monitors(&monitors, Some(r"display\del40b6")).unwrap();
    assert_eq!(by_id.len(), 1);
    assert_eq!(by_id[0].info().device_instance_id, r"DISPLAY\DEL40B6\5&2a2ef2e0&0&UID4353");
  }

  #[test]
  fn unknown_selector_is_not_found() {
    let monitors = sample();
    assert!(matches!(select_monitors(&monitors, Some("7")), Err(MonitorError::MonitorNotFound(_))));
    assert!(matches!(select_monitors(&monitors, Some("DISPLAY\\ACR")), Err(MonitorError::MonitorNotFound(_))));
    assert!(matches!(select_monitors(&monitors, Some("  ")), Err(MonitorError::MonitorNotFound(_))));
  }

  #[test]
  fn append_unique_keeps_the_first_monitor_for_an_id() {
    let mut monitors = sample();
    let wmi: Vec<Box<dyn MonitorItem>> = vec![
      Box::new(FakeMonitor::new(r"display\shp14c8\4&1B2C3D4&0&uid265988", 80).with_kind(MonitorKind::Wmi)),
      Box::new(FakeMonitor::new(r"DISPLAY\BOE0A1B\4&1b2c3d4&0&UID8388688", 60).with_kind(MonitorKind::Wmi)),
    ];

    append_unique(&mut monitors, wmi);

    let listed: Vec<(&str, MonitorKind)> = monitors
      .iter()
      .map(|monitor| (monitor.info().device_instance_id.as_str(), monitor.info().kind))
      .collect();
    assert_eq!(
      listed,
      vec![
        (r"DISPLAY\DEL40B6\5&2a2ef2e0&0&UID4353", MonitorKind::Ddc),
        (r"DISPLAY\SHP14C8\4&1b2c3d4&0&UID265988", MonitorKind::Ddc),
        (r"DISPLAY\BOE0A1B\4&1b2c3d4&0&UID8388688", MonitorKind::Wmi),
      ]
    );
  }

  #[test]
  fn append_unique_drops_repeats_within_the_candidates() {
    let mut monitors: Vec<Box<dyn MonitorItem>> = Vec::new();
    let candidates: Vec<Box<dyn MonitorItem>> = vec![
      Box::new(FakeMonitor::new(r"DISPLAY\BOE0A1B\1", 10)),
      Box::new(FakeMonitor::new(r"DISPLAY\boe0a1b\1", 20)),
    ];

    append_unique(&mut monitors, candidates);

    assert_eq!(monitors.len(), 1);
    assert!(monitors[0].update_brightness());
    assert_eq!(monitors[0].brightness(), Some(10));
  }

  #[test]
  fn finds_the_display_listing_a_monitor() {
    let displays = vec![
      vec![r"DISPLAY\DEL40B6\5&2a2ef2e0&0&UID4353".to_owned()],
      Vec::new(),
      vec![r"DISPLAY\SHP14C8\4&1b2c3d4&0&UID265988".to_owned()],
    ];

    assert_eq!(display_index_of(&displays, r"display\shp14c8\4&1B2C3D4&0&uid265988"), Some(2));
    assert_eq!(display_index_of(&displays, r"DISPLAY\DEL40B6\5&2a2ef2e0&0&UID4353"), Some(0));
    assert_eq!(display_index_of(&displays, r"DISPLAY\BOE0A1B\1"), None);
    assert_eq!(display_index_of(&[], r"DISPLAY\BOE0A1B\1"), None);
  }

  #[test]
  fn prefix_test_ignores_ascii_case_and_short_haystacks() {
    assert!(starts_with_ignore_case(r"DISPLAY\SHP14C8\4&1b_0", r"display\shp14c8"));
    assert!(starts_with_ignore_case("abc", ""));
    assert!(!starts_with_ignore_case("abc", "abcd"));
    assert!(!starts_with_ignore_case("DISPLAY", "DISPLAZ"));
  }

  #[test]
  fn converts_interface_path_to_instance_id() {
    assert_eq!(
      device_instance_id_from_interface(
        r"\\?\DISPLAY#DEL40B6#5&2a2ef2e0&0&UID4353#{e6f07b5f-ee97-4a90-b076-33f57bf4eaa7}"
      )
      .as_deref(),
      Some(r"DISPLAY\DEL40B6\5&2a2ef2e0&0&UID4353")
    );
    assert_eq!(device_instance_id_from_interface(""), None);
    assert_eq!(device_instance_id_from_interface(r"\\?\{e6f07b5f}"), None);
  }
}
