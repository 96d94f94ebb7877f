use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::brightness::{check_brightness, fade_steps};
use crate::error::Result;
use crate::monitor::MonitorItem;

/// Move the brightness of a monitor towards `target` in eased steps spread over `duration`
///
/// Returns whether every step was accepted. The fade stops at the first step the monitor refuses.
pub fn fade_to(monitor: &dyn MonitorItem, target: i32, duration: Duration, steps: usize) -> Result<bool> {
  let target = check_brightness(target)?;

  let current = match monitor.brightness() {
    Some(current) => Some(current),
    None if monitor.update_brightness() => monitor.brightness(),
    None => None,
  };

  // Without a starting point there is nothing to ease from, so jump straight to the target
  let Some(current) = current else {
    return monitor.set_brightness(target as i32);
  };

  let values = fade_steps(current, target, steps);
  let pause = match values.len() {
    0 | 1 => Duration::ZERO,
    len => duration / len as u32,
  };
  debug!("fading {} from {} to {} in {} steps", monitor.info().description, current, target, values.len());

  for (index, value) in values.iter().enumerate() {
    if index > 0 && !pause.is_zero() {
      thread::sleep(pause);
    }
    if !monitor.set_brightness(*value as i32)? {
      return Ok(false);
    }
  }

  Ok(true)
}
