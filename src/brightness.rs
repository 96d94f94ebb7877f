use keyframe::ease;
use keyframe::functions::EaseInOut;

use crate::error::{MonitorError, Result};

pub const MIN_BRIGHTNESS: u8 = 0;
pub const MAX_BRIGHTNESS: u8 = 100;

/// Make sure a requested brightness lies within 0 to 100 and narrow it to a byte
pub fn check_brightness(value: i32) -> Result<u8> {
  if (MIN_BRIGHTNESS as i32..=MAX_BRIGHTNESS as i32).contains(&value) {
    Ok(value as u8)
  } else {
    Err(MonitorError::BrightnessOutOfRange(value))
  }
}

/// Brightness as the monitor reports it, in its own units
///
/// Most monitors use 0-100 already, but the DDC/CI spec only guarantees a `[minimum, maximum]` window, so every
/// value crossing the API boundary is rescaled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBrightness {
  pub minimum: u32,
  pub current: u32,
  pub maximum: u32,
}

impl RawBrightness {
  pub fn new(minimum: u32, current: u32, maximum: u32) -> Self {
    Self { minimum, current, maximum }
  }

  /// The current value as a percentage, or `None` if the monitor reported a nonsensical window
  pub fn percent(&self) -> Option<u8> {
    if self.minimum >= self.maximum || self.current < self.minimum || self.current > self.maximum {
      return None;
    }

    let span = (self.maximum - self.minimum) as f64;
    let percent = (self.current - self.minimum) as f64 / span * 100.0;
    Some(percent.round() as u8)
  }

  /// The raw value to send to the monitor for the given percentage
  pub fn raw_for(&self, percent: u8) -> u32 {
    let span = self.maximum.saturating_sub(self.minimum) as f64;
    let raw = percent.min(MAX_BRIGHTNESS) as f64 / 100.0 * span + self.minimum as f64;
    raw.round() as u32
  }
}

/// Snap a brightness to the closest level the panel supports. Ties resolve to the lower level
pub fn nearest_level(levels: &[u8], value: u8) -> u8 {
  levels
    .iter()
    .copied()
    .min_by_key(|&level| (level.abs_diff(value), level))
    .unwrap_or(value)
}

/// Intermediate values for an eased transition from one brightness to another
///
/// The starting value is not included, consecutive duplicates are collapsed and the last value is always `to`
pub fn fade_steps(from: u8, to: u8, steps: usize) -> Vec<u8> {
  if from == to {
    return Vec::new();
  }

  let steps = steps.max(1);
  let mut values: Vec<u8> = (1..=steps)
    .map(|step| {
      let time = step as f64 / steps as f64;
      let value: f64 = ease(EaseInOut, from as f64, to as f64, time);
      value.round().clamp(MIN_BRIGHTNESS as f64, MAX_BRIGHTNESS as f64) as u8
    })
    .collect();

  values.dedup();
  if values.first() == Some(&from) {
    values.remove(0);
  }
  if values.last() != Some(&to) {
    values.push(to);
  }

  values
}
