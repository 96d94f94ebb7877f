use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::brightness::{check_brightness, RawBrightness};
use crate::error::{MonitorError, Result};
use crate::monitor::{MonitorInfo, MonitorItem, MonitorKind};

/// An open physical monitor handle
///
/// Dropping the value releases the handle, so ownership alone guarantees it is released exactly once.
pub trait PhysicalMonitor: Send {
  /// Read the brightness window, either through the high-level monitor configuration API or through VCP code 0x10
  fn read_brightness(&mut self, low_level: bool) -> Result<RawBrightness>;

  /// Write a raw brightness value in the monitor's own units
  fn write_brightness(&mut self, raw: u32, low_level: bool) -> Result<()>;
}

struct DdcState<P> {
  handle: Option<P>,
  brightness: Option<u8>,
}

/// Physical monitor controlled by DDC/CI (external monitor)
pub struct DdcMonitorItem<P> {
  info: MonitorInfo,
  is_low_level: bool,
  state: Mutex<DdcState<P>>,
}

impl<P: PhysicalMonitor> DdcMonitorItem<P> {
  pub fn new(
    device_instance_id: impl Into<String>,
    description: impl Into<String>,
    display_index: u8,
    monitor_index: u8,
    handle: P,
    is_low_level: bool,
  ) -> Self {
    Self {
      info: MonitorInfo {
        device_instance_id: device_instance_id.into(),
        description: description.into(),
        display_index,
        monitor_index,
        is_accessible: true,
        kind: MonitorKind::Ddc,
      },
      is_low_level,
      state: Mutex::new(DdcState { handle: Some(handle), brightness: None }),
    }
  }

  pub fn is_low_level(&self) -> bool {
    self.is_low_level
  }

  pub fn is_closed(&self) -> bool {
    self.state().handle.is_none()
  }

  // The state is plain data, so a panic on another thread does not leave it inconsistent
  fn state(&self) -> MutexGuard<'_, DdcState<P>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl<P: PhysicalMonitor> MonitorItem for DdcMonitorItem<P> {
  fn info(&self) -> &MonitorInfo {
    &self.info
  }

  fn brightness(&self) -> Option<u8> {
    self.state().brightness
  }

  fn update_brightness(&self) -> bool {
    let mut state = self.state();
    let low_level = self.is_low_level;

    let brightness = match state.handle.as_mut() {
      Some(handle) => match handle.read_brightness(low_level) {
        Ok(raw) => {
          let percent = raw.percent();
          if percent.is_none() {
            debug!("{} reported an unusable brightness window {:?}", self.info.description, raw);
          }
          percent
        }
        Err(err) => {
          debug!("failed to read the brightness of {}: {}", self.info.description, err);
          None
        }
      },
      None => None,
    };

    state.brightness = brightness;
    brightness.is_some()
  }

  fn set_brightness(&self, brightness: i32) -> Result<bool> {
    let brightness = check_brightness(brightness)?;

    let mut state = self.state();
    let low_level = self.is_low_level;
    let Some(handle) = state.handle.as_mut() else {
      debug!("ignoring brightness change for closed monitor {}", self.info.description);
      return Ok(false);
    };

    let written = handle.read_brightness(low_level).and_then(|raw| {
      if raw.percent().is_none() {
        return Err(MonitorError::Ddc(format!("unusable brightness window {raw:?}")));
      }
      handle.write_brightness(raw.raw_for(brightness), low_level)
    });

    match written {
      Ok(()) => {
        state.brightness = Some(brightness);
        Ok(true)
      }
      Err(err) => {
        warn!("failed to set the brightness of {} to {}: {}", self.info.description, brightness, err);
        Ok(false)
      }
    }
  }

  fn close(&self) {
    let mut state = self.state();
    if let Some(handle) = state.handle.take() {
      drop(handle);
      debug!("released physical monitor handle of {}", self.info.description);
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::sync::Arc;
  use std::thread;

  use super::*;

  #[derive(Default)]
  struct Tally {
    reads: AtomicUsize,
    writes: Mutex<Vec<(u32, bool)>>,
    releases: AtomicUsize,
    panic_on_read: AtomicBool,
  }

  struct FakeHandle {
    tally: Arc<Tally>,
    window: Option<RawBrightness>,
    accept_writes: bool,
  }

  impl FakeHandle {
    fn new(tally: &Arc<Tally>, window: RawBrightness) -> Self {
      Self { tally: Arc::clone(tally), window: Some(window), accept_writes: true }
    }
  }

  impl PhysicalMonitor for FakeHandle {
    fn read_brightness(&mut self, _low_level: bool) -> Result<RawBrightness> {
      if self.tally.panic_on_read.swap(false, Ordering::SeqCst) {
        panic!("driver crashed while reading the brightness");
      }
      self.tally.reads.fetch_add(1, Ordering::SeqCst);
      self.window.ok_or_else(|| MonitorError::Ddc("the monitor did not answer".into()))
    }

    fn write_brightness(&mut self, raw: u32, low_level: bool) -> Result<()> {
      if !self.accept_writes {
        return Err(MonitorError::Ddc("the monitor rejected the value".into()));
      }
      self.tally.writes.lock().unwrap().push((raw, low_level));
      if let Some(window) = self.window.as_mut() {
        window.current = raw;
      }
      Ok(())
    }
  }

  impl Drop for FakeHandle {
    fn drop(&mut self) {
      self.tally.releases.fetch_add(1, Ordering::SeqCst);
    }
  }

  fn item(handle: FakeHandle, low_level: bool) -> DdcMonitorItem<FakeHandle> {
    DdcMonitorItem::new(r"DISPLAY\DEL40B6\5&2a2ef2e0&0&UID4353", "DELL U2720Q", 0, 0, handle, low_level)
  }

  #[test]
  fn update_reads_and_normalizes() {
    let tally = Arc::new(Tally::default());
    let monitor = item(FakeHandle::new(&tally, RawBrightness::new(0, 30, 60)), false);

    assert_eq!(monitor.brightness(), None);
    assert!(monitor.update_brightness());
    assert_eq!(monitor.brightness(), Some(50));
  }

  #[test]
  fn update_failure_clears_known_brightness() {
    let tally = Arc::new(Tally::default());
    let mut handle = FakeHandle::new(&tally, RawBrightness::new(0, 30, 60));
    handle.window = None;
    let monitor = item(handle, false);

    assert!(!monitor.update_brightness());
    assert_eq!(monitor.brightness(), None);
  }

  #[test]
  fn update_rejects_degenerate_window() {
    let tally = Arc::new(Tally::default());
    let monitor = item(FakeHandle::new(&tally, RawBrightness::new(0, 0, 0)), true);

    assert!(!monitor.update_brightness());
    assert_eq!(monitor.brightness(), None);
  }

  #[test]
  fn set_refuses_degenerate_window() {
    let tally = Arc::new(Tally::default());
    let monitor = item(FakeHandle::new(&tally, RawBrightness::new(0, 0, 0)), false);

    assert!(!monitor.set_brightness(80).unwrap());
    assert_eq!(monitor.brightness(), None);
    assert!(tally.writes.lock().unwrap().is_empty());
  }

  #[test]
  fn set_refuses_current_outside_window() {
    let tally = Arc::new(Tally::default());
    let monitor = item(FakeHandle::new(&tally, RawBrightness::new(10, 5, 100)), true);

    assert!(!monitor.set_brightness(50).unwrap());
    assert!(tally.writes.lock().unwrap().is_empty());
  }

  #[test]
  fn set_scales_into_monitor_window() {
    let tally = Arc::new(Tally::default());
    let monitor = item(FakeHandle::new(&tally, RawBrightness::new(0, 0, 60)), true);

    assert!(monitor.set_brightness(50).unwrap());
    assert_eq!(monitor.brightness(), Some(50));
    assert_eq!(*tally.writes.lock().unwrap(), vec![(30, true)]);
  }

  #[test]
  fn set_rejects_out_of_range_before_io() {
    let tally = Arc::new(Tally::default());
    let monitor = item(FakeHandle::new(&tally, RawBrightness::new(0, 0, 100)), false);

    assert!(matches!(monitor.set_brightness(101), Err(MonitorError::BrightnessOutOfRange(101))));
    assert!(matches!(monitor.set_brightness(-1), Err(MonitorError::BrightnessOutOfRange(-1))));
    assert_eq!(tally.reads.load(Ordering::SeqCst), 0);
    assert!(tally.writes.lock().unwrap().is_empty());
  }

  #[test]
  fn failed_set_keeps_previous_brightness() {
    let tally = Arc::new(Tally::default());
    let mut handle = FakeHandle::new(&tally, RawBrightness::new(0, 40, 100));
    handle.accept_writes = false;
    let monitor = item(handle, false);

    assert!(monitor.update_brightness());
    assert!(!monitor.set_brightness(80).unwrap());
    assert_eq!(monitor.brightness(), Some(40));
  }

  #[test]
  fn close_releases_handle_exactly_once() {
    let tally = Arc::new(Tally::default());
    let monitor = item(FakeHandle::new(&tally, RawBrightness::new(0, 40, 100)), false);

    monitor.close();
    monitor.close();
    assert!(monitor.is_closed());
    assert_eq!(tally.releases.load(Ordering::SeqCst), 1);

    assert!(!monitor.update_brightness());
    assert!(!monitor.set_brightness(10).unwrap());

    drop(monitor);
    assert_eq!(tally.releases.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn drop_without_close_releases_handle() {
    let tally = Arc::new(Tally::default());
    drop(item(FakeHandle::new(&tally, RawBrightness::new(0, 40, 100)), false));
    assert_eq!(tally.releases.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn concurrent_sets_are_serialized() {
    let tally = Arc::new(Tally::default());
    let monitor = Arc::new(item(FakeHandle::new(&tally, RawBrightness::new(0, 0, 100)), false));

    let workers: Vec<_> = (0..8)
      .map(|value| {
        let monitor = Arc::clone(&monitor);
        thread::spawn(move || monitor.set_brightness(value * 10).unwrap())
      })
      .collect();
    for worker in workers {
      assert!(worker.join().unwrap());
    }

    // Every write must have been preceded by its own read
    assert_eq!(tally.reads.load(Ordering::SeqCst), 8);
    assert_eq!(tally.writes.lock().unwrap().len(), 8);
    let last = tally.writes.lock().unwrap().last().map(|(raw, _)| *raw as u8);
    assert_eq!(monitor.brightness(), last);
  }

  #[test]
  fn recovers_after_a_panic_while_locked() {
    let tally = Arc::new(Tally::default());
    let monitor = Arc::new(item(FakeHandle::new(&tally, RawBrightness::new(0, 40, 100)), false));
    tally.panic_on_read.store(true, Ordering::SeqCst);

    let crashed = {
      let monitor = Arc::clone(&monitor);
      thread::spawn(move || monitor.update_brightness()).join()
    };
    assert!(crashed.is_err());
    assert!(monitor.state.is_poisoned());

    assert!(monitor.update_brightness());
    assert_eq!(monitor.brightness(), Some(40));
    assert!(monitor.set_brightness(70).unwrap());
    assert_eq!(monitor.brightness(), Some(70));

    monitor.close();
    monitor.close();
    assert_eq!(tally.releases.load(Ordering::SeqCst), 1);
  }
}
